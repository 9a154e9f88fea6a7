//! Word lists the extractors consult.
//!
//! Everything here is plain data handed to the extractors at construction,
//! so a deployment can extend the lists from its config file and tests can
//! build extractors with tiny custom vocabularies.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Words that can never be (part of) a street name
const EXCLUDED_STREET_WORDS: &[&str] = &[
    // rooms and housing
    "pokój", "pokoj", "pokoje", "pokoi", "pokoju", "mieszkanie", "mieszkania", "kawalerka",
    "stancja", "lokal", "łazienka", "kuchnia", "balkon", "piętro", "parter",
    // furniture and amenities
    "umeblowany", "umeblowane", "meble", "biurko", "łóżko", "szafa", "pralka", "lodówka",
    // internet
    "internet", "wifi", "światłowód",
    // districts
    "czechów", "wrotków", "bronowice", "kalinowszczyzna", "tatary", "felin", "sławin",
    "węglin", "ponikwoda", "czuby", "lsm", "śródmieście", "dziesiąta", "konstantynów",
    // generic
    "przy", "obok", "blisko", "centrum", "okolice", "okolicy", "minut", "minuty", "minutę",
    "rok", "lata", "lat", "cena", "czynsz", "kaucja", "media", "opłaty", "wynajmę", "wynajem",
    "dla", "studentki", "studenta", "studentów", "osoby", "kontakt", "tel", "telefon", "od",
    "do", "oferta", "lublin", "lublinie", "ulica", "osiedle",
];

/// Street names whose capitalisation in listings is too irregular for the
/// general pattern
const SPECIAL_STREETS: &[&str] = &[
    "Aleje Racławickie",
    "Al. Racławickie",
    "Racławickie",
    "Krakowskie Przedmieście",
    "Plac Litewski",
    "Plac Wolności",
    "Rynek",
    "Zana",
    "Głęboka",
    "Lipowa",
    "Narutowicza",
    "Nadbystrzycka",
    "Chodźki",
    "Jana Pawła II",
    "Aleja Kraśnicka",
    "Al. Kraśnicka",
    "Aleja Warszawska",
    "Al. Warszawska",
    "Al. Spółdzielczości Pracy",
    "Aleja Spółdzielczości Pracy",
    "Grunwaldzka",
    "Sowińskiego",
    "Radziszewskiego",
    "Idziego Radziszewskiego",
    "Marii Curie-Skłodowskiej",
    "Skłodowskiej",
    "Weteranów",
];

/// Phrases meaning every utility is bundled into the price
const MEDIA_INCLUDED: &[&str] = &[
    "wszystko wliczone",
    "media wliczone",
    "opłaty wliczone",
    "media w cenie",
    "opłaty w cenie",
    "wliczone w cenę",
    "wliczone w cene",
    "razem z mediami",
    "wraz z mediami",
    "łącznie z mediami",
    "z mediami",
    "w tym media",
    "all inclusive",
];

/// Utilities that may be named in an "only X included" phrase
const PARTIAL_UTILITIES: &[&str] = &[
    "internet", "prąd", "prad", "woda", "wodę", "gaz", "ogrzewanie", "śmieci", "wywóz",
];

/// Phrases meaning utilities are paid on top of the price
const MEDIA_SEPARATE: &[&str] = &[
    "+ media",
    "+media",
    "plus media",
    "+ opłaty",
    "+opłaty",
    "plus opłaty",
    "bez mediów",
    "bez opłat",
    "opłaty dodatkowe",
    "media dodatkowo",
    "media osobno",
    "media płatne osobno",
    "dodatkowo płatne",
    "do tego media",
    "media według zużycia",
    "media wg zużycia",
];

/// Immutable word lists used by the address and price extractors
#[derive(Debug, Clone)]
pub struct Vocabulary {
    excluded_street_words: HashSet<String>,
    special_streets: Vec<String>,
    media_included: Vec<String>,
    partial_utilities: Vec<String>,
    media_separate: Vec<String>,
}

/// User-supplied additions merged on top of the built-in lists
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VocabularyOverrides {
    pub excluded_street_words: Vec<String>,
    pub special_streets: Vec<String>,
}

impl Vocabulary {
    /// Build a vocabulary from explicit lists, ignoring the built-in ones
    pub fn new(
        excluded_street_words: &[&str],
        special_streets: &[&str],
        media_included: &[&str],
        partial_utilities: &[&str],
        media_separate: &[&str],
    ) -> Self {
        Self {
            excluded_street_words: excluded_street_words
                .iter()
                .map(|w| w.to_lowercase())
                .collect(),
            special_streets: special_streets.iter().map(|s| s.to_string()).collect(),
            media_included: media_included.iter().map(|p| p.to_lowercase()).collect(),
            partial_utilities: partial_utilities.iter().map(|p| p.to_lowercase()).collect(),
            media_separate: media_separate.iter().map(|p| p.to_lowercase()).collect(),
        }
    }

    /// Built-in lists extended with the given overrides
    pub fn with_overrides(overrides: &VocabularyOverrides) -> Self {
        let mut vocab = Self::default();
        vocab.excluded_street_words.extend(
            overrides
                .excluded_street_words
                .iter()
                .map(|w| w.to_lowercase()),
        );
        for street in &overrides.special_streets {
            if !vocab.special_streets.iter().any(|s| s == street) {
                vocab.special_streets.push(street.clone());
            }
        }
        vocab
    }

    pub fn is_excluded_street_word(&self, word: &str) -> bool {
        self.excluded_street_words.contains(&word.to_lowercase())
    }

    pub fn special_streets(&self) -> &[String] {
        &self.special_streets
    }

    pub fn media_included(&self) -> &[String] {
        &self.media_included
    }

    pub fn partial_utilities(&self) -> &[String] {
        &self.partial_utilities
    }

    pub fn media_separate(&self) -> &[String] {
        &self.media_separate
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::new(
            EXCLUDED_STREET_WORDS,
            SPECIAL_STREETS,
            MEDIA_INCLUDED,
            PARTIAL_UTILITIES,
            MEDIA_SEPARATE,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclusion_is_case_insensitive() {
        let vocab = Vocabulary::default();
        assert!(vocab.is_excluded_street_word("Pokój"));
        assert!(vocab.is_excluded_street_word("CENTRUM"));
        assert!(!vocab.is_excluded_street_word("Narutowicza"));
    }

    #[test]
    fn test_overrides_extend_defaults() {
        let overrides = VocabularyOverrides {
            excluded_street_words: vec!["Akademik".into()],
            special_streets: vec!["Zana".into(), "Nowy Świat".into()],
        };
        let vocab = Vocabulary::with_overrides(&overrides);
        assert!(vocab.is_excluded_street_word("akademik"));
        assert!(vocab.is_excluded_street_word("pokój"));
        assert_eq!(
            vocab.special_streets().iter().filter(|s| *s == "Zana").count(),
            1
        );
        assert!(vocab.special_streets().iter().any(|s| s == "Nowy Świat"));
    }
}
