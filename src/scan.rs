//! One scan cycle, end to end.
//!
//! fetch → exclude removed → extract address → extract price → geocode →
//! dedupe → lifecycle (create / merge / deactivate) → evict → persist.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Local, TimeZone, Utc};
use serde_json::json;
use tracing::{info, warn};

use crate::config::Config;
use crate::geocoding::Geocoder;
use crate::models::{offer_id_from_url, ProcessedListing, RawListing};
use crate::parsers::{AddressExtractor, PriceExtractor, Vocabulary};
use crate::reconcile::{DuplicateDetector, OfferLifecycleManager, SuspiciousChange};
use crate::scrapers::ListingSource;
use crate::storage::{OfferStore, RemovedListings, ScanLogger, ScanRecord, ScanStats, ScanStatus};

/// Outcome of a successful cycle
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub stats: ScanStats,
    pub suspicious_changes: Vec<SuspiciousChange>,
    pub next_scan: DateTime<Utc>,
}

/// Why a raw listing did not make it into the cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Skip {
    Removed,
    NoAddress,
    NoPrice,
    NoCoords,
    Duplicate,
}

pub struct Scanner {
    config: Config,
    address: AddressExtractor,
    price: PriceExtractor,
    detector: DuplicateDetector,
    store: OfferStore,
    removed_path: PathBuf,
    logger: ScanLogger,
}

impl Scanner {
    pub fn new(config: Config) -> Self {
        let vocabulary = Vocabulary::with_overrides(&config.vocabulary);
        let store = OfferStore::new(config.paths.offers())
            .with_corrupt_recovery(config.scan.recover_corrupt_store);
        let logger = ScanLogger::new(config.paths.scan_history(), config.scan.history_length);

        Self {
            address: AddressExtractor::new(vocabulary.clone()),
            price: PriceExtractor::new(vocabulary, config.prices.clone()),
            detector: DuplicateDetector::new(config.scan.similarity_threshold),
            removed_path: config.paths.removed(),
            store,
            logger,
            config,
        }
    }

    /// Run one cycle and append it to the scan history, successful or not
    pub async fn run(
        &self,
        source: &dyn ListingSource,
        geocoder: &dyn Geocoder,
        now: DateTime<Utc>,
    ) -> Result<ScanReport> {
        let started = Instant::now();
        let mut record = ScanRecord::start(now);

        let result = self.cycle(source, geocoder, now, &mut record).await;

        let status = match &result {
            Ok(_) if record.errors.is_empty() => ScanStatus::Completed,
            Ok(_) => ScanStatus::Partial,
            Err(e) => {
                record.error(format!("{:#}", e), Utc::now());
                ScanStatus::Failed
            }
        };
        record.finish(status, Utc::now(), started.elapsed());

        if let Err(e) = self.logger.append(record).await {
            warn!(error = %e, "Failed to write scan history");
        }

        result
    }

    async fn cycle(
        &self,
        source: &dyn ListingSource,
        geocoder: &dyn Geocoder,
        now: DateTime<Utc>,
        record: &mut ScanRecord,
    ) -> Result<ScanReport> {
        let db = self
            .store
            .load(now)
            .await
            .with_context(|| format!("Failed to load offer store {}", self.store.path().display()))?;
        let mut manager = OfferLifecycleManager::from_database(db);
        let removed = RemovedListings::load(&self.removed_path)
            .await
            .context("Failed to load removed listings")?
            .id_set();

        // 1. scrape
        let phase = Instant::now();
        info!(source = source.source_name(), "Scraping listings");
        let raw = source
            .scrape(&manager.trusted_prices())
            .await
            .with_context(|| format!("Scraping {} failed", source.source_name()))?;
        record.phase("scraping", phase.elapsed(), json!({ "offers": raw.len() }));

        if raw.is_empty() {
            anyhow::bail!("No listings received from {}", source.source_name());
        }
        info!(raw = raw.len(), "Listings received");

        let mut stats = ScanStats {
            raw_offers: raw.len(),
            ..ScanStats::default()
        };

        // 2. extract, geocode, dedupe
        let phase = Instant::now();
        info!(
            geocoder = geocoder.name(),
            similarity_threshold = self.detector.threshold(),
            "Processing listings"
        );
        let mut accepted: Vec<ProcessedListing> = Vec::new();
        for listing in &raw {
            match self.process(listing, &removed, geocoder, record).await {
                Ok(processed) => {
                    if self.detector.filter_against_batch(&processed, &accepted) {
                        count_skip(&mut stats, Skip::Duplicate);
                        info!(offer_id = %processed.id, "Duplicate listing skipped");
                        continue;
                    }
                    info!(
                        offer_id = %processed.id,
                        address = %processed.address.full,
                        price = processed.price.amount,
                        provenance = %processed.price.provenance,
                        "Listing accepted"
                    );
                    accepted.push(processed);
                }
                Err(skip) => count_skip(&mut stats, skip),
            }
        }
        if let Err(e) = geocoder.flush().await {
            warn!(error = %e, "Failed to persist geocoder cache");
        }
        stats.processed = accepted.len();
        record.phase(
            "processing",
            phase.elapsed(),
            json!({
                "valid": accepted.len(),
                "geocoder": geocoder.name(),
                "rejected": raw.len() - accepted.len(),
            }),
        );

        // 3. lifecycle
        let lifecycle = manager.apply_cycle(&accepted, now);
        let evicted = manager.evict_expired(self.config.scan.retention_days, now);

        let next_scan = next_scan_after(&now.with_timezone(&Local), &self.config.scan.scan_hours)
            .map(|next| next.with_timezone(&Utc))
            .unwrap_or_else(|| now + Duration::days(1));
        manager.set_scan_times(now, next_scan);

        // 4. persist
        let phase = Instant::now();
        self.store
            .save(&manager.to_database())
            .await
            .context("Failed to save offer store")?;
        record.phase("saving", phase.elapsed(), json!({ "offers": manager.len() }));

        stats.new = lifecycle.created;
        stats.updated = lifecycle.updated;
        stats.price_changes = lifecycle.price_changes;
        stats.source_upgrades = lifecycle.source_upgrades;
        stats.suspicious = lifecycle.suspicious_changes.len();
        stats.deactivated = lifecycle.deactivated;
        stats.evicted = evicted;
        stats.total_in_store = manager.len();
        stats.active_in_store = manager.active_count();

        record.stats = stats.clone();
        record.suspicious_changes = lifecycle.suspicious_changes.clone();

        info!(
            raw = stats.raw_offers,
            processed = stats.processed,
            new = stats.new,
            updated = stats.updated,
            price_changes = stats.price_changes,
            suspicious = stats.suspicious,
            deactivated = stats.deactivated,
            evicted = stats.evicted,
            active = stats.active_in_store,
            total = stats.total_in_store,
            next_scan = %next_scan,
            "Scan finished"
        );
        info!(
            removed = stats.removed,
            no_address = stats.no_address,
            no_price = stats.no_price,
            no_coords = stats.no_coords,
            duplicates = stats.duplicates,
            "Skipped listings"
        );

        Ok(ScanReport {
            stats,
            suspicious_changes: lifecycle.suspicious_changes,
            next_scan,
        })
    }

    /// Turn one raw listing into a processed one, or say why not
    async fn process(
        &self,
        listing: &RawListing,
        removed: &std::collections::HashSet<String>,
        geocoder: &dyn Geocoder,
        record: &mut ScanRecord,
    ) -> std::result::Result<ProcessedListing, Skip> {
        let id = offer_id_from_url(&listing.url);
        if removed.contains(&id) {
            return Err(Skip::Removed);
        }

        let text = listing.full_text();
        let address = self.address.extract(&text).ok_or(Skip::NoAddress)?;

        let structured = listing.structured_price.and_then(|amount| {
            let provenance = listing.structured_price_provenance.unwrap_or_default();
            self.price.from_structured(amount, provenance, &text)
        });
        let price = structured
            .or_else(|| self.price.extract(&text))
            .ok_or(Skip::NoPrice)?;

        let coords = match geocoder.geocode(&address.full).await {
            Ok(Some(coords)) => coords,
            Ok(None) => {
                info!(address = %address.full, "Address could not be geocoded");
                return Err(Skip::NoCoords);
            }
            Err(e) => {
                warn!(address = %address.full, error = %e, "Geocoding failed");
                record.error(format!("geocoding {}: {:#}", address.full, e), Utc::now());
                return Err(Skip::NoCoords);
            }
        };

        Ok(ProcessedListing {
            id,
            url: listing.url.clone(),
            address,
            coords,
            price,
            description: text,
        })
    }
}

fn count_skip(stats: &mut ScanStats, skip: Skip) {
    match skip {
        Skip::Removed => stats.removed += 1,
        Skip::NoAddress => stats.no_address += 1,
        Skip::NoPrice => stats.no_price += 1,
        Skip::NoCoords => stats.no_coords += 1,
        Skip::Duplicate => stats.duplicates += 1,
    }
}

/// The first configured full hour strictly after `now`, today or on a later
/// day. Local times that do not exist (DST gaps) are skipped.
pub fn next_scan_after<Tz: TimeZone>(now: &DateTime<Tz>, hours: &[u32]) -> Option<DateTime<Tz>> {
    let mut hours: Vec<u32> = hours.iter().copied().filter(|h| *h < 24).collect();
    hours.sort_unstable();
    hours.dedup();

    let tz = now.timezone();
    for day in now.date_naive().iter_days().take(3) {
        for &hour in &hours {
            let Some(naive) = day.and_hms_opt(hour, 0, 0) else {
                continue;
            };
            if let Some(candidate) = tz.from_local_datetime(&naive).earliest() {
                if candidate > *now {
                    return Some(candidate);
                }
            }
        }
    }
    None
}
