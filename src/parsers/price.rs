use std::ops::RangeInclusive;

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{MediaClassification, MediaInfo, PriceProvenance, PriceSignal};
use crate::parsers::vocabulary::Vocabulary;

const AMOUNT: &str = r"\b(\d{1,2}[ \x{a0}]\d{3}|\d{3,4})\b";
const CURRENCY: &str = r"(?:zł|zl|pln|złotych|zlotych)";
const DASH: &str = r"[-–—:]";
const FEES: &str = r"(?:opłat\w*|oplat\w*|media\w*|rachunk\w*)";
const RENT_WORDS: &str = r"(?:pok[oó]j\w*|czynsz\w*|najem|najmu|wynajem|wynajmu|odstępne|cena\w*)";
/// Text allowed between a rent word and its amount: no digits, no sentence
/// breaks except inside common abbreviations
const RENT_GAP: &str = r"(?:[^\d\n.;!?]|\b(?:ok|ul|al|os|mies|np)\.)";

/// Characters inspected before a number when looking for street context
const STREET_CONTEXT_WINDOW: usize = 15;
const CONTEXT_RADIUS: usize = 50;
/// Characters before an amount checked for fee or deposit words
const LEAD_IN_WINDOW: usize = 20;

lazy_static! {
    // "850 zł – pokój + 250 zł – opłaty"
    static ref SPLIT_AMOUNT_FIRST: Regex = Regex::new(&format!(
        r"(?i){AMOUNT}\s*{CURRENCY}?\s*{DASH}\s*pok[oó]j\w*\s*\+\s*(\d{{2,4}})\s*{CURRENCY}?\s*{DASH}\s*{FEES}"
    ))
    .unwrap();

    // "pokój 850 zł + opłaty 250 zł"
    static ref SPLIT_ROOM_FIRST: Regex = Regex::new(&format!(
        r"(?i)pok[oó]j\w*\s*{DASH}?\s*{AMOUNT}\s*{CURRENCY}?\s*\+\s*{FEES}\s*{DASH}?\s*(\d{{2,4}})\s*{CURRENCY}?"
    ))
    .unwrap();

    // "Cena 800 zł", "Pokój za 1200 złotych", "czynsz: 900"
    static ref RENT_WORD_FIRST: Regex = Regex::new(&format!(
        r"(?i){RENT_WORDS}({RENT_GAP}{{0,25}}?){AMOUNT}"
    ))
    .unwrap();

    // "700 zł za pokój", "650 zł/mies. czynsz"
    static ref AMOUNT_FIRST: Regex = Regex::new(&format!(
        r"(?i){AMOUNT}\s*{CURRENCY}\s*(?:/\s*)?(?:mies\.|miesi\w*|mies|m-c|mc\.?|msc\.?)?\s*(?:za\s+)?(?:pok[oó]j|najem|wynajem|czynsz)"
    ))
    .unwrap();

    static ref FEE_AMOUNT: Regex = Regex::new(&format!(
        r"(?i)(?:\+|plus)\s*{FEES}[^\d\n]{{0,15}}?(\d{{2,4}})\s*{CURRENCY}"
    ))
    .unwrap();

    // amounts near these belong to utilities or a deposit, not the room
    static ref NOT_RENT: Regex = Regex::new(
        r"(?i)\b(?:opłat\w*|oplat\w*|medi\w+|rachun\w*|kaucj\w*|depozyt\w*)"
    )
    .unwrap();

    static ref AREA_UNIT: Regex = Regex::new(r"(?i)^\s*(?:m2|m²|m\^2|mkw|m\.\s*kw|m\s+kw|metr|kw\.|sqm)").unwrap();

    static ref STREET_CONTEXT: Regex =
        Regex::new(r"(?i)(?:\bul\.|\bulic\w*|\bal\.|\balej\w*|\bos\.|\bosiedl\w*|\bpl\.|\bplac\w*|\badres\w*)").unwrap();
}

/// Valid ranges for extracted amounts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PriceLimits {
    /// Bounds for a room price read from text
    pub room_min: u32,
    pub room_max: u32,
    /// Wider bounds for prices supplied as structured data
    pub structured_min: u32,
    pub structured_max: u32,
}

impl Default for PriceLimits {
    fn default() -> Self {
        Self {
            room_min: 200,
            room_max: 2500,
            structured_min: 100,
            structured_max: 10_000,
        }
    }
}

impl PriceLimits {
    fn room(&self) -> RangeInclusive<u32> {
        self.room_min..=self.room_max
    }

    fn structured(&self) -> RangeInclusive<u32> {
        self.structured_min..=self.structured_max
    }
}

/// Reads a room price and the utilities arrangement from listing text
#[derive(Debug, Clone)]
pub struct PriceExtractor {
    vocabulary: Vocabulary,
    limits: PriceLimits,
    partial_res: Vec<Regex>,
}

impl PriceExtractor {
    pub fn new(vocabulary: Vocabulary, limits: PriceLimits) -> Self {
        let utilities = vocabulary
            .partial_utilities()
            .iter()
            .map(|u| regex::escape(u))
            .collect::<Vec<_>>()
            .join("|");

        let partial_res = if utilities.is_empty() {
            Vec::new()
        } else {
            [
                // "tylko internet wliczony", "jedynie prąd w cenie"
                format!(r"(?:tylko|jedynie|wyłącznie)\s+(?:{utilities})\w*\s+(?:jest\s+)?(?:wliczon\w*|w\s+cenie)"),
                // "w cenie tylko internet"
                format!(r"(?:wliczon\w*|w\s+cenie)\s+(?:jest\s+)?(?:tylko|jedynie|wyłącznie)\s+(?:{utilities})\w*"),
                // "media wliczone oprócz prądu"
                format!(r"(?:wliczon\w*|w\s+cenie)\s+(?:oprócz|poza|bez)\s+(?:{utilities})\w*"),
            ]
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect()
        };

        Self {
            vocabulary,
            limits,
            partial_res,
        }
    }

    /// Extract a room price from free text.
    ///
    /// Only explicit room/rent constructions are considered. There is no
    /// "first number in the text" fallback: a text without such a
    /// construction yields `None`.
    pub fn extract(&self, text: &str) -> Option<PriceSignal> {
        if text.trim().is_empty() {
            return None;
        }

        if let Some(signal) = self.extract_split(text) {
            return Some(signal);
        }

        let (start, end, amount) = self.extract_rent_anchored(text)?;
        Some(PriceSignal {
            amount,
            media: self.classify_media(text),
            provenance: PriceProvenance::TextParse,
            context: context_around(text, start, end),
        })
    }

    /// Wrap a price supplied by the page itself, if it is within the
    /// structured-data bounds. Media info still comes from the text.
    pub fn from_structured(
        &self,
        amount: u32,
        provenance: PriceProvenance,
        text: &str,
    ) -> Option<PriceSignal> {
        if !self.limits.structured().contains(&amount) {
            debug!(amount, %provenance, "Structured price outside accepted bounds");
            return None;
        }

        Some(PriceSignal {
            amount,
            media: self.classify_media(text),
            provenance,
            context: String::new(),
        })
    }

    /// Tier 1: "room price + fees" spelled out with both amounts
    fn extract_split(&self, text: &str) -> Option<PriceSignal> {
        for re in [&*SPLIT_AMOUNT_FIRST, &*SPLIT_ROOM_FIRST] {
            for caps in re.captures_iter(text) {
                let Some((start, end, amount)) = self.room_amount(text, &caps, 1) else {
                    continue;
                };
                let Some(fee) = caps.get(2).and_then(|m| m.as_str().parse::<u32>().ok()) else {
                    continue;
                };

                let mut media = self.classify_media(text);
                if media.info == MediaInfo::Unknown {
                    media.info = MediaInfo::Separate;
                }
                media.note = Some(format!("+ opłaty {} zł", fee));

                return Some(PriceSignal {
                    amount,
                    media,
                    provenance: PriceProvenance::TextParse,
                    context: context_around(text, start, end),
                });
            }
        }
        None
    }

    /// Tier 2: a number tied to room/rent vocabulary; earliest valid one wins
    fn extract_rent_anchored(&self, text: &str) -> Option<(usize, usize, u32)> {
        let amount_first = AMOUNT_FIRST.captures_iter(text).find_map(|caps| {
            let m = caps.get(1)?;
            if NOT_RENT.is_match(lead_in(text, m.start())) {
                return None;
            }
            self.room_amount(text, &caps, 1)
        });

        [self.rent_word_first(text), amount_first]
            .into_iter()
            .flatten()
            .min_by_key(|(start, _, _)| *start)
    }

    /// "Cena 800 zł": resumes right after a rejected rent word so a later
    /// one swallowed by its gap still gets a chance
    fn rent_word_first(&self, text: &str) -> Option<(usize, usize, u32)> {
        let mut pos = 0;
        while let Some(caps) = RENT_WORD_FIRST.captures_at(text, pos) {
            let gap = caps.get(1)?;
            if !NOT_RENT.is_match(gap.as_str()) {
                if let Some(found) = self.room_amount(text, &caps, 2) {
                    return Some(found);
                }
            }
            pos = gap.start();
        }
        None
    }

    /// Parse capture `group` and keep it only if it is a plausible room price
    fn room_amount(&self, text: &str, caps: &Captures<'_>, group: usize) -> Option<(usize, usize, u32)> {
        let m = caps.get(group)?;
        amount_candidates(m.as_str())
            .into_iter()
            .find(|&value| {
                self.limits.room().contains(&value)
                    && !is_incidental_number(text, m.start(), m.end(), value)
            })
            .map(|value| (m.start(), m.end(), value))
    }

    /// Classify whether utilities are bundled into the price.
    ///
    /// Usable on its own when the price comes from a trusted source.
    pub fn classify_media(&self, text: &str) -> MediaClassification {
        let lower = text.to_lowercase();

        if let Some(m) = self.partial_res.iter().find_map(|re| re.find(&lower)) {
            return MediaClassification::with_note(MediaInfo::Partial, m.as_str());
        }

        if self
            .vocabulary
            .media_included()
            .iter()
            .any(|phrase| lower.contains(phrase.as_str()))
        {
            return MediaClassification::new(MediaInfo::Included);
        }

        if self
            .vocabulary
            .media_separate()
            .iter()
            .any(|phrase| lower.contains(phrase.as_str()))
        {
            let fee = FEE_AMOUNT
                .captures_iter(&lower)
                .filter_map(|caps| caps.get(1))
                .filter_map(|m| m.as_str().parse::<u32>().ok())
                .find(|fee| !(2020..=2030).contains(fee));

            return match fee {
                Some(fee) => {
                    MediaClassification::with_note(MediaInfo::Separate, format!("+ media (~{} zł)", fee))
                }
                None => MediaClassification::new(MediaInfo::Separate),
            };
        }

        MediaClassification::new(MediaInfo::Unknown)
    }
}

impl Default for PriceExtractor {
    fn default() -> Self {
        Self::new(Vocabulary::default(), PriceLimits::default())
    }
}

/// "1 200" → [1200, 200]; "850" → [850]
fn amount_candidates(raw: &str) -> Vec<u32> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    let mut out = Vec::new();
    if let Ok(v) = digits.parse::<u32>() {
        out.push(v);
    }
    if let Some((_, tail)) = raw.rsplit_once(|c: char| c.is_whitespace()) {
        if let Ok(v) = tail.parse::<u32>() {
            out.push(v);
        }
    }
    out
}

/// Whether the number at `start..end` of `text` is a year, a house number
/// or a floor area rather than an amount of money
pub fn is_incidental_number(text: &str, start: usize, end: usize, value: u32) -> bool {
    if (2020..=2030).contains(&value) {
        return true;
    }

    if let Some(after) = text.get(end..) {
        if AREA_UNIT.is_match(after) {
            return true;
        }
    }

    if (100..=300).contains(&value) {
        let before = text.get(..start).unwrap_or_default();
        let window_start = before
            .char_indices()
            .rev()
            .nth(STREET_CONTEXT_WINDOW - 1)
            .map(|(i, _)| i)
            .unwrap_or(0);
        if STREET_CONTEXT.is_match(&before[window_start..]) {
            return true;
        }
    }

    false
}

/// Text just before `start`, cut at the last sentence break
fn lead_in(text: &str, start: usize) -> &str {
    let before = &text[..start];
    let from = before
        .char_indices()
        .rev()
        .nth(LEAD_IN_WINDOW - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let window = &before[from..];
    match window.rfind(|c: char| matches!(c, '.' | ';' | '!' | '?' | '\n')) {
        Some(i) => &window[i + 1..],
        None => window,
    }
}

/// Up to `CONTEXT_RADIUS` characters on either side of `start..end`
fn context_around(text: &str, start: usize, end: usize) -> String {
    let from = text[..start]
        .char_indices()
        .rev()
        .nth(CONTEXT_RADIUS - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let to = text[end..]
        .char_indices()
        .nth(CONTEXT_RADIUS)
        .map(|(i, _)| end + i)
        .unwrap_or(text.len());

    let mut context = text[from..to].trim().to_string();
    if from > 0 {
        context.insert_str(0, "...");
    }
    if to < text.len() {
        context.push_str("...");
    }
    context
}
