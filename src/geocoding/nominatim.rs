use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::GeocoderConfig;
use crate::geocoding::Geocoder;
use crate::models::{collapse_whitespace, Coords};
use crate::scrapers::RateLimiter;
use crate::storage::{read_json_optional, write_json_atomic};

type Cache = HashMap<String, Option<Coords>>;

#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
}

/// OpenStreetMap Nominatim client with a JSON file cache.
///
/// Negative answers are cached too, so an unknown street is asked about once.
pub struct NominatimGeocoder {
    client: Client,
    config: GeocoderConfig,
    cache_path: PathBuf,
    cache: Mutex<Cache>,
    dirty: Mutex<bool>,
    limiter: RateLimiter,
}

impl NominatimGeocoder {
    pub async fn new(config: GeocoderConfig, cache_path: impl Into<PathBuf>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .context("Failed to create HTTP client")?;

        let cache_path = cache_path.into();
        let cache = load_cache(&cache_path).await?;
        info!(entries = cache.len(), "Loaded geocode cache");

        let limiter = RateLimiter::fixed(Duration::from_secs_f64(config.min_interval_secs.max(1.0)));

        Ok(Self {
            client,
            config,
            cache_path,
            cache: Mutex::new(cache),
            dirty: Mutex::new(false),
            limiter,
        })
    }

    async fn lookup(&self, query: &str) -> Result<Option<Coords>> {
        let mut attempt = 0;
        loop {
            self.limiter.wait().await;

            match self.request(query).await {
                Ok(coords) => return Ok(coords),
                Err(e) if attempt + 1 < self.config.max_retries => {
                    let backoff = retry_backoff(attempt);
                    warn!(query, attempt, error = %e, "Geocoding failed, retrying");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e).with_context(|| format!("Geocoding failed for {}", query)),
            }
        }
    }

    async fn request(&self, query: &str) -> Result<Option<Coords>> {
        let body = self
            .client
            .get(&self.config.endpoint)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("limit", "1"),
                ("accept-language", "pl"),
            ])
            .send()
            .await
            .context("Failed to send geocoding request")?
            .error_for_status()
            .context("Geocoding service returned an error")?
            .text()
            .await
            .context("Failed to read geocoding response")?;

        parse_response(&body)
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<Coords>> {
        let key = cache_key(address);
        if key.is_empty() {
            return Ok(None);
        }

        if let Some(cached) = self.cache.lock().await.get(&key) {
            debug!(address, "Geocode cache hit");
            return Ok(*cached);
        }

        let query = format!("{}{}", collapse_whitespace(address), self.config.city_suffix);
        let coords = self.lookup(&query).await?;
        if coords.is_none() {
            debug!(address, "Address not found");
        }

        self.cache.lock().await.insert(key, coords);
        *self.dirty.lock().await = true;
        Ok(coords)
    }

    async fn flush(&self) -> Result<()> {
        let mut dirty = self.dirty.lock().await;
        if !*dirty {
            return Ok(());
        }
        let cache = self.cache.lock().await;
        write_json_atomic(&self.cache_path, &*cache)
            .await
            .context("Failed to save geocode cache")?;
        *dirty = false;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "nominatim"
    }
}

async fn load_cache(path: &std::path::Path) -> Result<Cache> {
    match read_json_optional::<Cache>(path).await {
        Ok(cache) => Ok(cache.unwrap_or_default()),
        Err(e) if e.is_corrupt() => {
            warn!(error = %e, "Geocode cache unreadable, starting empty");
            Ok(Cache::new())
        }
        Err(e) => Err(e).context("Failed to load geocode cache"),
    }
}

/// 1 s, 2 s, 4 s ... capped at 64 s
fn retry_backoff(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt.min(6))
}

fn cache_key(address: &str) -> String {
    collapse_whitespace(&address.to_lowercase())
}

/// First search hit, or `None` for an empty result list
fn parse_response(body: &str) -> Result<Option<Coords>> {
    let places: Vec<Place> =
        serde_json::from_str(body).context("Failed to parse geocoding response")?;

    let Some(place) = places.into_iter().next() else {
        return Ok(None);
    };

    let lat = place.lat.parse().context("Invalid latitude")?;
    let lon = place.lon.parse().context("Invalid longitude")?;
    Ok(Some(Coords { lat, lon }))
}
