use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::models::AddressMatch;
use crate::parsers::vocabulary::Vocabulary;

/// Highest value accepted as a house number; anything above reads as a price
const MAX_HOUSE_NUMBER: u32 = 250;
const MIN_STREET_CHARS: usize = 4;

/// House number: digits, optional letter, optional `/sub-number`, optional `lok. N`
const NUMBER_TOKEN: &str = r"\d+[a-zA-Z]?(?:/\d+[a-zA-Z]?)?(?:\s+lok\.?\s*\d+)?";

lazy_static! {
    // "200 metrów od", "50 m do" describe distance to a landmark, not an address
    static ref PROXIMITY_RE: Regex =
        Regex::new(r"(?i)\d+\s*(?:m|metr(?:y|ów|ow)?)\s+(?:od|do)\b").unwrap();

    static ref GENERAL_RE: Regex = Regex::new(&format!(
        r"\b(?:(?:ul\.|ulicy|ulica|al\.|alei|aleja|aleje|pl\.|plac|os\.|osiedle)\s*)?(\p{{Lu}}\p{{Ll}}+(?:\s+\p{{Lu}}\p{{Ll}}+)?)\s+({})\b",
        NUMBER_TOKEN
    ))
    .unwrap();
}

/// Why a candidate street/number pair was discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    ExcludedWord,
    StreetTooShort,
    NumberOutOfRange,
}

/// Pulls a street + house number pair out of listing text
#[derive(Debug, Clone)]
pub struct AddressExtractor {
    vocabulary: Vocabulary,
    special: Vec<(String, Regex)>,
}

impl AddressExtractor {
    pub fn new(vocabulary: Vocabulary) -> Self {
        let special = vocabulary
            .special_streets()
            .iter()
            .filter_map(|name| {
                let pattern = format!(r"(?i)\b{}\s+({})\b", regex::escape(name), NUMBER_TOKEN);
                Regex::new(&pattern).ok().map(|re| (name.clone(), re))
            })
            .collect();

        Self {
            vocabulary,
            special,
        }
    }

    /// Find the first acceptable address in `text`.
    ///
    /// Curated street names are tried before the general capitalised-words
    /// pattern. Returns `None` when nothing survives validation; callers
    /// should drop the listing rather than retry.
    pub fn extract(&self, text: &str) -> Option<AddressMatch> {
        if text.trim().is_empty() {
            return None;
        }

        if PROXIMITY_RE.is_match(text) {
            debug!("Text describes a distance, not an address");
            return None;
        }

        self.extract_special(text)
            .or_else(|| self.extract_general(text))
    }

    /// Curated streets; earliest occurrence in the text wins, longer names on ties
    fn extract_special(&self, text: &str) -> Option<AddressMatch> {
        let mut best: Option<(usize, usize, AddressMatch)> = None;

        for (name, re) in &self.special {
            let candidate = re.captures_iter(text).find_map(|caps| {
                let whole = caps.get(0)?;
                let number = caps.get(1)?.as_str();
                match self.validate(name, number, false) {
                    Ok(()) => Some((whole.start(), name.len(), AddressMatch::new(name, number))),
                    Err(reason) => {
                        debug!(street = %name, number, ?reason, "Rejected curated street candidate");
                        None
                    }
                }
            });

            if let Some((start, len, found)) = candidate {
                let better = match &best {
                    None => true,
                    Some((best_start, best_len, _)) => {
                        start < *best_start || (start == *best_start && len > *best_len)
                    }
                };
                if better {
                    best = Some((start, len, found));
                }
            }
        }

        best.map(|(_, _, found)| found)
    }

    fn extract_general(&self, text: &str) -> Option<AddressMatch> {
        for caps in GENERAL_RE.captures_iter(text) {
            let (Some(street), Some(number)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            let street = street.as_str();
            let number = number.as_str();

            match self.validate(street, number, true) {
                Ok(()) => return Some(AddressMatch::new(street, number)),
                Err(Rejection::ExcludedWord) => {
                    // "Pokój Narutowicza 5": the pattern swallowed a leading
                    // capitalised noun, the second word may still be a street
                    if let Some((first, second)) = street.split_once(char::is_whitespace) {
                        let second = second.trim();
                        if self.vocabulary.is_excluded_street_word(first)
                            && self.validate(second, number, true).is_ok()
                        {
                            return Some(AddressMatch::new(second, number));
                        }
                    }
                    debug!(street, number, "Street contains an excluded word");
                }
                Err(reason) => debug!(street, number, ?reason, "Rejected address candidate"),
            }
        }

        None
    }

    fn validate(&self, street: &str, number: &str, check_vocabulary: bool) -> Result<(), Rejection> {
        if check_vocabulary
            && street
                .split_whitespace()
                .any(|word| self.vocabulary.is_excluded_street_word(word))
        {
            return Err(Rejection::ExcludedWord);
        }

        if street.chars().filter(|c| !c.is_whitespace()).count() < MIN_STREET_CHARS {
            return Err(Rejection::StreetTooShort);
        }

        let leading: String = number.chars().take_while(|c| c.is_ascii_digit()).collect();
        match leading.parse::<u32>() {
            Ok(n) if (1..=MAX_HOUSE_NUMBER).contains(&n) => Ok(()),
            Ok(_) => Err(Rejection::NumberOutOfRange),
            // more digits than fit in a u32 is certainly not a house number
            Err(_) if !leading.is_empty() => Err(Rejection::NumberOutOfRange),
            Err(_) => Ok(()),
        }
    }
}

impl Default for AddressExtractor {
    fn default() -> Self {
        Self::new(Vocabulary::default())
    }
}
