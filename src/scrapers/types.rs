use serde::{Deserialize, Serialize};

use crate::config::ScanConfig;

/// Parameters for one scrape run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeParams {
    /// First page of the category listing
    pub base_url: String,
    /// Hard stop for pagination
    pub max_pages: usize,
    /// Concurrent detail page fetches
    pub max_detail_workers: usize,
    /// Delay range between requests, in seconds
    pub min_delay_secs: f64,
    pub max_delay_secs: f64,
}

impl Default for ScrapeParams {
    fn default() -> Self {
        Self::from(&ScanConfig::default())
    }
}

impl From<&ScanConfig> for ScrapeParams {
    fn from(scan: &ScanConfig) -> Self {
        Self {
            base_url: scan.base_url.clone(),
            max_pages: scan.max_pages,
            max_detail_workers: scan.max_detail_workers.max(1),
            min_delay_secs: scan.min_delay_secs,
            max_delay_secs: scan.max_delay_secs,
        }
    }
}

/// One card on a listing page
#[derive(Debug, Clone, PartialEq)]
pub struct ListingCard {
    pub url: String,
    pub title: String,
    pub snippet: String,
    /// Price as displayed on the card
    pub price: Option<u32>,
}

/// A parsed category listing page
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    pub cards: Vec<ListingCard>,
    pub next_page: Option<String>,
}

/// What a listing's own page contributes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailPage {
    pub description: String,
    /// `offers.price` from JSON-LD markup
    pub structured_price: Option<u32>,
    /// Visible price element
    pub visible_price: Option<u32>,
}
