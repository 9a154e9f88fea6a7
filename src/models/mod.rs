use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which extraction path produced a price observation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PriceProvenance {
    /// Machine-readable metadata on the listing page (JSON-LD)
    #[serde(alias = "json-ld", alias = "JSON-LD (OLX)")]
    StructuredMarkup,
    /// Amount remembered from an earlier structured observation
    #[serde(alias = "cache")]
    CachedObservation,
    /// Visible price element scraped from the raw page
    #[serde(alias = "html")]
    HtmlFallback,
    /// Room-price pattern found in the free-text description
    #[serde(alias = "text")]
    TextParse,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Trust level of a provenance, totally ordered from least to most trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Trust {
    Unknown,
    TextParse,
    HtmlFallback,
    Authoritative,
}

impl PriceProvenance {
    pub fn trust(self) -> Trust {
        match self {
            PriceProvenance::StructuredMarkup | PriceProvenance::CachedObservation => {
                Trust::Authoritative
            }
            PriceProvenance::HtmlFallback => Trust::HtmlFallback,
            PriceProvenance::TextParse => Trust::TextParse,
            PriceProvenance::Unknown => Trust::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PriceProvenance::StructuredMarkup => "structured-markup",
            PriceProvenance::CachedObservation => "cached-observation",
            PriceProvenance::HtmlFallback => "html-fallback",
            PriceProvenance::TextParse => "text-parse",
            PriceProvenance::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for PriceProvenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether utility costs are bundled into the quoted price
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MediaInfo {
    Included,
    Partial,
    Separate,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Media classification plus an optional note such as the explicit fee amount
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MediaClassification {
    pub info: MediaInfo,
    pub note: Option<String>,
}

impl MediaClassification {
    pub fn new(info: MediaInfo) -> Self {
        Self { info, note: None }
    }

    pub fn with_note(info: MediaInfo, note: impl Into<String>) -> Self {
        Self {
            info,
            note: Some(note.into()),
        }
    }
}

/// Direction of the most recent accepted price change
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PriceTrend {
    Up,
    Down,
}

/// A listing as delivered by the scraping layer, before any parsing
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RawListing {
    pub url: String,
    pub title: String,
    pub description: String,
    /// Price supplied by the page itself rather than parsed from prose
    pub structured_price: Option<u32>,
    pub structured_price_provenance: Option<PriceProvenance>,
}

impl RawListing {
    /// Title and description joined, the text every extractor works on
    pub fn full_text(&self) -> String {
        if self.description.is_empty() {
            self.title.clone()
        } else {
            format!("{} {}", self.title, self.description)
        }
    }
}

/// Street and house number found in listing text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddressMatch {
    pub street: String,
    pub number: String,
    pub full: String,
}

impl AddressMatch {
    pub fn new(street: &str, number: &str) -> Self {
        let street = collapse_whitespace(street);
        let number = collapse_whitespace(number);
        let full = format!("{} {}", street, number);
        Self {
            street,
            number,
            full,
        }
    }

    /// Case-folded, whitespace-collapsed form used for equality checks
    pub fn normalized(&self) -> String {
        collapse_whitespace(&self.full.to_lowercase())
    }
}

/// A price observation from one extraction path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSignal {
    pub amount: u32,
    pub media: MediaClassification,
    pub provenance: PriceProvenance,
    /// Text around the matched amount, kept for operator review
    #[serde(default)]
    pub context: String,
}

/// Geographic coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coords {
    pub lat: f64,
    pub lon: f64,
}

/// A listing that passed extraction and geocoding in the current cycle
#[derive(Debug, Clone)]
pub struct ProcessedListing {
    pub id: String,
    pub url: String,
    pub address: AddressMatch,
    pub coords: Coords,
    pub price: PriceSignal,
    pub description: String,
}

/// Persisted offer, one per listing id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Offer {
    pub id: String,
    pub url: String,
    pub address: String,
    pub street: String,
    pub number: String,
    pub lat: f64,
    pub lon: f64,
    pub price: u32,
    pub price_history: Vec<u32>,
    #[serde(default)]
    pub previous_price: Option<u32>,
    #[serde(default)]
    pub price_changed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub price_trend: Option<PriceTrend>,
    #[serde(default)]
    pub price_source: PriceProvenance,
    #[serde(default)]
    pub media_info: MediaInfo,
    #[serde(default)]
    pub media_note: Option<String>,
    pub description: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub active: bool,
    #[serde(default)]
    pub days_active: i64,
}

impl Offer {
    /// Build a fresh offer from its first observation
    pub fn from_listing(listing: &ProcessedListing, now: DateTime<Utc>) -> Self {
        Self {
            id: listing.id.clone(),
            url: listing.url.clone(),
            address: listing.address.full.clone(),
            street: listing.address.street.clone(),
            number: listing.address.number.clone(),
            lat: listing.coords.lat,
            lon: listing.coords.lon,
            price: listing.price.amount,
            price_history: vec![listing.price.amount],
            previous_price: None,
            price_changed_at: None,
            price_trend: None,
            price_source: listing.price.provenance,
            media_info: listing.price.media.info,
            media_note: listing.price.media.note.clone(),
            description: listing.description.clone(),
            first_seen: now,
            last_seen: now,
            active: true,
            days_active: 0,
        }
    }
}

/// On-disk wrapper around the offer collection
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OfferDatabase {
    pub last_scan: Option<DateTime<Utc>>,
    pub next_scan: Option<DateTime<Utc>>,
    pub offers: Vec<Offer>,
}

/// Collapse runs of whitespace into single spaces and trim
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Derive a stable offer id from a listing URL: last path segment without extension
pub fn offer_id_from_url(raw: &str) -> String {
    let path = match url::Url::parse(raw) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => raw
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };

    let segment = path
        .rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or_default();

    match segment.split_once('.') {
        Some((stem, _)) => stem.to_string(),
        None => segment.to_string(),
    }
}
