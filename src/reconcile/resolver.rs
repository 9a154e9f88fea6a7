//! Merges a new price observation into a persisted offer.
//!
//! Decision table, comparing the trust of the new provenance with the
//! stored one:
//!
//! | trust      | amount    | result                                   |
//! |------------|-----------|------------------------------------------|
//! | higher     | any       | accept (source upgrade)                  |
//! | equal      | unchanged | no-op                                    |
//! | equal      | changed   | accept if swing < 50%, else reject       |
//! | lower      | any       | reject, provenance never downgrades      |
//!
//! Media info is refreshed on every observation whatever the outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::models::{Offer, PriceProvenance, PriceSignal, PriceTrend};

/// What happened to the stored price
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Same trust, same amount
    Unchanged,
    /// Higher trust source, amount identical; only the provenance moved
    SourceUpgraded,
    /// Amount changed and was accepted
    PriceChanged { old: u32, new: u32 },
    /// Same trust, swing of 50% or more; stored value kept
    SuspiciousChange(SuspiciousChange),
    /// Lower trust source; stored value kept
    Downgrade,
}

/// A rejected price swing kept for operator review
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspiciousChange {
    pub offer_id: String,
    pub old_price: u32,
    pub new_price: u32,
    pub provenance: PriceProvenance,
}

#[derive(Debug, Clone, Default)]
pub struct SourcePriorityResolver;

impl SourcePriorityResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn merge(&self, offer: &mut Offer, signal: &PriceSignal, now: DateTime<Utc>) -> MergeOutcome {
        offer.media_info = signal.media.info;
        offer.media_note = signal.media.note.clone();

        let old_trust = offer.price_source.trust();
        let new_trust = signal.provenance.trust();

        if new_trust < old_trust {
            debug!(
                offer_id = %offer.id,
                stored = %offer.price_source,
                observed = %signal.provenance,
                "Ignoring price from a less trusted source"
            );
            return MergeOutcome::Downgrade;
        }

        let old = offer.price;
        let new = signal.amount;

        if new_trust > old_trust {
            if new == old {
                info!(
                    offer_id = %offer.id,
                    from = %offer.price_source,
                    to = %signal.provenance,
                    "Price source upgraded"
                );
                offer.price_source = signal.provenance;
                return MergeOutcome::SourceUpgraded;
            }
            apply_change(offer, signal, now);
            return MergeOutcome::PriceChanged { old, new };
        }

        if new == old {
            return MergeOutcome::Unchanged;
        }

        if !is_plausible_swing(old, new) {
            warn!(
                offer_id = %offer.id,
                old,
                new,
                provenance = %signal.provenance,
                "Suspicious price change rejected"
            );
            return MergeOutcome::SuspiciousChange(SuspiciousChange {
                offer_id: offer.id.clone(),
                old_price: old,
                new_price: new,
                provenance: signal.provenance,
            });
        }

        apply_change(offer, signal, now);
        MergeOutcome::PriceChanged { old, new }
    }
}

/// `|new - old| / old < 0.5`, in integers. A zero stored price accepts anything.
fn is_plausible_swing(old: u32, new: u32) -> bool {
    if old == 0 {
        return true;
    }
    2 * u64::from(old.abs_diff(new)) < u64::from(old)
}

fn apply_change(offer: &mut Offer, signal: &PriceSignal, now: DateTime<Utc>) {
    let old = offer.price;
    let new = signal.amount;

    offer.previous_price = Some(old);
    offer.price_changed_at = Some(now);
    offer.price_trend = Some(if new < old {
        PriceTrend::Down
    } else {
        PriceTrend::Up
    });
    offer.price = new;
    offer.price_history.push(new);
    offer.price_source = signal.provenance;

    info!(
        offer_id = %offer.id,
        old,
        new,
        provenance = %signal.provenance,
        "Price changed"
    );
}
