//! Near-duplicate detection.
//!
//! Two listings are duplicates when their addresses are identical after
//! normalisation and their descriptions are nearly identical. The batch
//! filter is first-match: no clustering, no transitive grouping.

use crate::models::{collapse_whitespace, ProcessedListing};

/// Tolerance for floating point noise at the threshold boundary
const EPSILON: f64 = 1e-9;

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.95;

#[derive(Debug, Clone)]
pub struct DuplicateDetector {
    threshold: f64,
}

impl DuplicateDetector {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn is_duplicate(&self, a: &ProcessedListing, b: &ProcessedListing) -> bool {
        if a.address.normalized() != b.address.normalized() {
            return false;
        }
        similarity(&a.description, &b.description) + EPSILON >= self.threshold
    }

    /// True when `candidate` duplicates any listing accepted so far
    pub fn filter_against_batch(
        &self,
        candidate: &ProcessedListing,
        accepted: &[ProcessedListing],
    ) -> bool {
        accepted.iter().any(|other| self.is_duplicate(candidate, other))
    }
}

impl Default for DuplicateDetector {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_THRESHOLD)
    }
}

/// `1 - distance / max_len` on lower-cased, whitespace-collapsed text.
///
/// Two empty texts are identical (1.0); one empty text against a non-empty
/// one shares nothing (0.0).
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = collapse_whitespace(&a.to_lowercase()).chars().collect();
    let b: Vec<char> = collapse_whitespace(&b.to_lowercase()).chars().collect();

    match (a.is_empty(), b.is_empty()) {
        (true, true) => return 1.0,
        (true, false) | (false, true) => return 0.0,
        _ => {}
    }

    let max_len = a.len().max(b.len());
    1.0 - edit_distance(&a, &b) as f64 / max_len as f64
}

/// Levenshtein distance over chars, two-row table
fn edit_distance(a: &[char], b: &[char]) -> usize {
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AddressMatch, Coords, MediaClassification, PriceProvenance, PriceSignal};

    fn listing(id: &str, street: &str, number: &str, description: &str) -> ProcessedListing {
        ProcessedListing {
            id: id.to_string(),
            url: format!("https://example.com/{}.html", id),
            address: AddressMatch::new(street, number),
            coords: Coords { lat: 51.25, lon: 22.57 },
            price: PriceSignal {
                amount: 700,
                media: MediaClassification::default(),
                provenance: PriceProvenance::TextParse,
                context: String::new(),
            },
            description: description.to_string(),
        }
    }

    #[test]
    fn test_edit_distance() {
        let d = |a: &str, b: &str| {
            let a: Vec<char> = a.chars().collect();
            let b: Vec<char> = b.chars().collect();
            edit_distance(&a, &b)
        };
        assert_eq!(d("kitten", "sitting"), 3);
        assert_eq!(d("", "abc"), 3);
        assert_eq!(d("pokój", "pokoj"), 1);
        assert_eq!(d("same", "same"), 0);
    }

    #[test]
    fn test_similarity_edges() {
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("   ", ""), 1.0);
        assert_eq!(similarity("abc", ""), 0.0);
        assert_eq!(similarity("", "abc"), 0.0);
        assert_eq!(similarity("Pokój  PRZY Zana", "pokój przy zana"), 1.0);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        // 20 chars, one substitution: similarity exactly 0.95
        let a = "a".repeat(20);
        let b = format!("{}b", "a".repeat(19));
        assert!((similarity(&a, &b) - 0.95).abs() < 1e-12);

        let detector = DuplicateDetector::default();
        let x = listing("1", "Zana", "5", &a);
        let y = listing("2", "Zana", "5", &b);
        assert!(detector.is_duplicate(&x, &y));
    }

    #[test]
    fn test_just_below_threshold() {
        // 1999 chars, 100 substitutions: similarity ~0.94997
        let a = "a".repeat(1999);
        let b = format!("{}{}", "b".repeat(100), "a".repeat(1899));
        let s = similarity(&a, &b);
        assert!(s < 0.95 && s > 0.9499);

        let detector = DuplicateDetector::default();
        let x = listing("1", "Zana", "5", &a);
        let y = listing("2", "Zana", "5", &b);
        assert!(!detector.is_duplicate(&x, &y));
    }

    #[test]
    fn test_address_must_match() {
        let detector = DuplicateDetector::default();
        let text = "Pokój przy Narutowicza 5, 700 zł, umeblowany";
        let x = listing("1", "Narutowicza", "5", text);
        let y = listing("2", "Racławickie", "10", text);
        let z = listing("3", "narutowicza ", " 5", text);
        assert!(!detector.is_duplicate(&x, &y));
        assert!(detector.is_duplicate(&x, &z));
    }

    #[test]
    fn test_similar_but_reworded_is_not_duplicate() {
        let detector = DuplicateDetector::default();
        let x = listing("1", "Narutowicza", "5", "Pokój przy Narutowicza 5, 700 zł, umeblowany");
        let y = listing("2", "Narutowicza", "5", "Przytulny pokój Narutowicza 5, meble, 700zł");
        assert!(!detector.is_duplicate(&x, &y));
    }

    #[test]
    fn test_filter_against_batch() {
        let detector = DuplicateDetector::default();
        let text = "Pokój przy Narutowicza 5, 700 zł, umeblowany";
        let accepted = vec![
            listing("1", "Zana", "5", "Zupełnie inny opis"),
            listing("2", "Narutowicza", "5", text),
        ];
        assert!(detector.filter_against_batch(&listing("3", "Narutowicza", "5", text), &accepted));
        assert!(!detector.filter_against_batch(&listing("4", "Lipowa", "2", text), &accepted));
        assert!(!detector.filter_against_batch(&listing("5", "Zana", "5", text), &[]));
    }
}
