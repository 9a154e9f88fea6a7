//! Runtime configuration loaded from an optional TOML file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{StoreError, StoreResult};
use crate::parsers::{PriceLimits, VocabularyOverrides};
use crate::reconcile::{DEFAULT_RETENTION_DAYS, DEFAULT_SIMILARITY_THRESHOLD};

pub const DEFAULT_CONFIG_FILE: &str = "room-sonar.toml";
const MAX_GEOCODER_RETRIES: u32 = 10;

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub scan: ScanConfig,
    pub prices: PriceLimits,
    pub geocoder: GeocoderConfig,
    pub vocabulary: VocabularyOverrides,
}

/// Where persisted files live
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
    pub offers_file: String,
    pub removed_file: String,
    pub geocode_cache_file: String,
    pub scan_history_file: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            offers_file: "offers.json".to_string(),
            removed_file: "removed_listings.json".to_string(),
            geocode_cache_file: "geocode_cache.json".to_string(),
            scan_history_file: "scan_history.json".to_string(),
        }
    }
}

impl PathsConfig {
    pub fn offers(&self) -> PathBuf {
        self.data_dir.join(&self.offers_file)
    }

    pub fn removed(&self) -> PathBuf {
        self.data_dir.join(&self.removed_file)
    }

    pub fn geocode_cache(&self) -> PathBuf {
        self.data_dir.join(&self.geocode_cache_file)
    }

    pub fn scan_history(&self) -> PathBuf {
        self.data_dir.join(&self.scan_history_file)
    }
}

/// Scan cycle behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// First listing page of the category to scan
    pub base_url: String,
    pub max_pages: usize,
    pub retention_days: i64,
    /// Local hours at which scans are scheduled
    pub scan_hours: Vec<u32>,
    pub similarity_threshold: f64,
    pub max_detail_workers: usize,
    pub min_delay_secs: f64,
    pub max_delay_secs: f64,
    pub history_length: usize,
    /// Move an unreadable offers file aside instead of failing
    pub recover_corrupt_store: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.olx.pl/nieruchomosci/stancje-pokoje/lublin/".to_string(),
            max_pages: 25,
            retention_days: DEFAULT_RETENTION_DAYS,
            scan_hours: vec![9, 15, 21],
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            max_detail_workers: 3,
            min_delay_secs: 2.0,
            max_delay_secs: 4.0,
            history_length: 100,
            recover_corrupt_store: false,
        }
    }
}

/// Nominatim client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    pub endpoint: String,
    /// Appended to every query, e.g. ", Lublin, Poland"
    pub city_suffix: String,
    pub user_agent: String,
    pub min_interval_secs: f64,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://nominatim.openstreetmap.org/search".to_string(),
            city_suffix: ", Lublin, Poland".to_string(),
            user_agent: "room-sonar/0.1 (rental listing monitor)".to_string(),
            min_interval_secs: 1.0,
            max_retries: 3,
            timeout_secs: 10,
        }
    }
}

impl Config {
    /// Load configuration from `path`. A missing file yields the defaults;
    /// a file that exists but does not parse is an error.
    pub fn load(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(StoreError::io(path, e)),
        };

        let config: Self = toml::from_str(&content).map_err(|source| StoreError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.scan.max_pages == 0 {
            return Err(StoreError::config("scan.max_pages must be > 0"));
        }
        if self.scan.max_detail_workers == 0 {
            return Err(StoreError::config("scan.max_detail_workers must be > 0"));
        }
        if self.scan.retention_days <= 0 {
            return Err(StoreError::config("scan.retention_days must be > 0"));
        }
        if self.scan.scan_hours.is_empty() || self.scan.scan_hours.iter().any(|h| *h > 23) {
            return Err(StoreError::config("scan.scan_hours must be hours in 0..=23"));
        }
        if !(0.0..=1.0).contains(&self.scan.similarity_threshold) {
            return Err(StoreError::config("scan.similarity_threshold must be in [0, 1]"));
        }
        if self.scan.min_delay_secs < 0.0 || self.scan.max_delay_secs < self.scan.min_delay_secs {
            return Err(StoreError::config("scan delay range is invalid"));
        }
        if self.geocoder.max_retries == 0 || self.geocoder.max_retries > MAX_GEOCODER_RETRIES {
            return Err(StoreError::config(format!(
                "geocoder.max_retries must be in 1..={}",
                MAX_GEOCODER_RETRIES
            )));
        }
        if self.prices.room_min > self.prices.room_max
            || self.prices.structured_min > self.prices.structured_max
        {
            return Err(StoreError::config("price bounds are inverted"));
        }
        Ok(())
    }
}
