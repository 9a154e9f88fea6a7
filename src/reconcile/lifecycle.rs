//! Ownership of the persisted offer collection across scan cycles.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::models::{Offer, OfferDatabase, ProcessedListing, Trust};
use crate::reconcile::resolver::{MergeOutcome, SourcePriorityResolver, SuspiciousChange};

/// Offers older than this (days since first seen) are purged
pub const DEFAULT_RETENTION_DAYS: i64 = 548;

/// Counters for one pass of [`OfferLifecycleManager::apply_cycle`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LifecycleReport {
    pub created: usize,
    pub updated: usize,
    pub price_changes: usize,
    pub source_upgrades: usize,
    pub suspicious_changes: Vec<SuspiciousChange>,
    pub deactivated: usize,
    pub evicted: usize,
}

/// Keyed collection of offers plus the scan timestamps stored with them
#[derive(Debug, Clone, Default)]
pub struct OfferLifecycleManager {
    offers: HashMap<String, Offer>,
    last_scan: Option<DateTime<Utc>>,
    next_scan: Option<DateTime<Utc>>,
    resolver: SourcePriorityResolver,
}

impl OfferLifecycleManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_database(db: OfferDatabase) -> Self {
        let offers = db
            .offers
            .into_iter()
            .map(|offer| (offer.id.clone(), offer))
            .collect();

        Self {
            offers,
            last_scan: db.last_scan,
            next_scan: db.next_scan,
            resolver: SourcePriorityResolver::new(),
        }
    }

    /// Snapshot for persistence, ordered by first sighting then id
    pub fn to_database(&self) -> OfferDatabase {
        let mut offers: Vec<Offer> = self.offers.values().cloned().collect();
        offers.sort_by(|a, b| a.first_seen.cmp(&b.first_seen).then_with(|| a.id.cmp(&b.id)));

        OfferDatabase {
            last_scan: self.last_scan,
            next_scan: self.next_scan,
            offers,
        }
    }

    pub fn get(&self, id: &str) -> Option<&Offer> {
        self.offers.get(id)
    }

    pub fn len(&self) -> usize {
        self.offers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offers.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.offers.values().filter(|o| o.active).count()
    }

    pub fn set_scan_times(&mut self, last: DateTime<Utc>, next: DateTime<Utc>) {
        self.last_scan = Some(last);
        self.next_scan = Some(next);
    }

    /// Prices from fully trusted sources, by offer id
    pub fn trusted_prices(&self) -> HashMap<String, u32> {
        self.offers
            .values()
            .filter(|o| o.price_source.trust() == Trust::Authoritative)
            .map(|o| (o.id.clone(), o.price))
            .collect()
    }

    /// Create or update every listing of the cycle, then deactivate the
    /// offers that were not observed.
    pub fn apply_cycle(&mut self, listings: &[ProcessedListing], now: DateTime<Utc>) -> LifecycleReport {
        let mut report = LifecycleReport::default();
        let mut observed = HashSet::with_capacity(listings.len());

        for listing in listings {
            observed.insert(listing.id.clone());

            match self.offers.get_mut(&listing.id) {
                None => {
                    debug!(offer_id = %listing.id, price = listing.price.amount, "New offer");
                    self.offers
                        .insert(listing.id.clone(), Offer::from_listing(listing, now));
                    report.created += 1;
                }
                Some(offer) => {
                    match self.resolver.merge(offer, &listing.price, now) {
                        MergeOutcome::PriceChanged { .. } => report.price_changes += 1,
                        MergeOutcome::SourceUpgraded => report.source_upgrades += 1,
                        MergeOutcome::SuspiciousChange(change) => {
                            report.suspicious_changes.push(change)
                        }
                        MergeOutcome::Unchanged | MergeOutcome::Downgrade => {}
                    }
                    offer.last_seen = now;
                    offer.active = true;
                    report.updated += 1;
                }
            }
        }

        report.deactivated = self.mark_inactive(&observed);
        report
    }

    /// Deactivate active offers missing from `observed`; returns how many
    pub fn mark_inactive(&mut self, observed: &HashSet<String>) -> usize {
        let mut count = 0;
        for offer in self.offers.values_mut() {
            if offer.active && !observed.contains(&offer.id) {
                offer.active = false;
                offer.days_active = (offer.last_seen - offer.first_seen).num_days();
                count += 1;
            }
        }
        count
    }

    /// Drop offers first seen before `now - retention_days`, active or not
    pub fn evict_expired(&mut self, retention_days: i64, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::days(retention_days);
        let before = self.offers.len();
        self.offers.retain(|_, offer| offer.first_seen >= cutoff);
        let removed = before - self.offers.len();
        if removed > 0 {
            info!(removed, retention_days, "Evicted expired offers");
        }
        removed
    }
}
