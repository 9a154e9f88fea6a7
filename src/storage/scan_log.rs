//! Per-cycle history used by the monitoring side.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::StoreResult;
use crate::reconcile::SuspiciousChange;
use crate::storage::{read_json_optional, write_json_atomic};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Running,
    Completed,
    Partial,
    Failed,
}

/// Counters for one cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanStats {
    pub raw_offers: usize,
    pub removed: usize,
    pub no_address: usize,
    pub no_price: usize,
    pub no_coords: usize,
    pub duplicates: usize,
    pub processed: usize,
    pub new: usize,
    pub updated: usize,
    pub price_changes: usize,
    pub source_upgrades: usize,
    pub suspicious: usize,
    pub deactivated: usize,
    pub evicted: usize,
    pub total_in_store: usize,
    pub active_in_store: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRecord {
    /// Seconds, rounded to two decimals
    pub duration: f64,
    #[serde(default)]
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// One entry of the history file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub end_timestamp: Option<DateTime<Utc>>,
    pub status: ScanStatus,
    #[serde(default)]
    pub phases: BTreeMap<String, PhaseRecord>,
    #[serde(default)]
    pub stats: ScanStats,
    #[serde(default)]
    pub suspicious_changes: Vec<SuspiciousChange>,
    #[serde(default)]
    pub errors: Vec<ScanErrorRecord>,
    #[serde(default)]
    pub total_duration: Option<f64>,
}

impl ScanRecord {
    pub fn start(now: DateTime<Utc>) -> Self {
        Self {
            timestamp: now,
            end_timestamp: None,
            status: ScanStatus::Running,
            phases: BTreeMap::new(),
            stats: ScanStats::default(),
            suspicious_changes: Vec::new(),
            errors: Vec::new(),
            total_duration: None,
        }
    }

    pub fn phase(&mut self, name: &str, duration: Duration, details: serde_json::Value) {
        self.phases.insert(
            name.to_string(),
            PhaseRecord {
                duration: round2(duration.as_secs_f64()),
                details,
            },
        );
    }

    pub fn error(&mut self, message: impl Into<String>, now: DateTime<Utc>) {
        self.errors.push(ScanErrorRecord {
            timestamp: now,
            message: message.into(),
        });
    }

    pub fn finish(&mut self, status: ScanStatus, now: DateTime<Utc>, total: Duration) {
        self.status = status;
        self.end_timestamp = Some(now);
        self.total_duration = Some(round2(total.as_secs_f64()));
    }
}

/// Aggregates over the whole history
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanStatistics {
    pub total_scans: usize,
    pub successful: usize,
    pub failed: usize,
    /// Percent of scans that completed
    pub success_rate: f64,
    pub avg_duration: f64,
    pub avg_offers_found: f64,
}

/// Append-only history file capped at `max_entries`
#[derive(Debug, Clone)]
pub struct ScanLogger {
    path: PathBuf,
    max_entries: usize,
}

impl ScanLogger {
    pub fn new(path: impl Into<PathBuf>, max_entries: usize) -> Self {
        Self {
            path: path.into(),
            max_entries: max_entries.max(1),
        }
    }

    pub async fn append(&self, record: ScanRecord) -> StoreResult<()> {
        let mut history = self.history().await?;
        history.push(record);
        if history.len() > self.max_entries {
            let excess = history.len() - self.max_entries;
            history.drain(..excess);
        }
        write_json_atomic(&self.path, &history).await
    }

    /// Whole history, oldest first. An unreadable file only loses history,
    /// so it is logged and treated as empty.
    pub async fn history(&self) -> StoreResult<Vec<ScanRecord>> {
        match read_json_optional(&self.path).await {
            Ok(history) => Ok(history.unwrap_or_default()),
            Err(err) if err.is_corrupt() => {
                warn!(error = %err, "Scan history unreadable, starting a new one");
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }

    /// The last `count` scans, newest first
    pub async fn recent(&self, count: usize) -> StoreResult<Vec<ScanRecord>> {
        let history = self.history().await?;
        Ok(history.into_iter().rev().take(count).collect())
    }

    pub async fn statistics(&self) -> StoreResult<ScanStatistics> {
        Ok(summarize(&self.history().await?))
    }
}

fn summarize(history: &[ScanRecord]) -> ScanStatistics {
    if history.is_empty() {
        return ScanStatistics::default();
    }

    let total = history.len();
    let successful = history
        .iter()
        .filter(|s| s.status == ScanStatus::Completed)
        .count();

    let durations: Vec<f64> = history.iter().filter_map(|s| s.total_duration).collect();
    let avg_duration = if durations.is_empty() {
        0.0
    } else {
        durations.iter().sum::<f64>() / durations.len() as f64
    };

    let avg_offers =
        history.iter().map(|s| s.stats.raw_offers as f64).sum::<f64>() / total as f64;

    ScanStatistics {
        total_scans: total,
        successful,
        failed: total - successful,
        success_rate: successful as f64 / total as f64 * 100.0,
        avg_duration: round2(avg_duration),
        avg_offers_found: (avg_offers * 10.0).round() / 10.0,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(minute: u32, status: ScanStatus, raw: usize, secs: u64) -> ScanRecord {
        let t = Utc.with_ymd_and_hms(2026, 4, 1, 9, minute, 0).unwrap();
        let mut r = ScanRecord::start(t);
        r.stats.raw_offers = raw;
        r.finish(status, t, Duration::from_secs(secs));
        r
    }

    #[tokio::test]
    async fn test_history_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        let logger = ScanLogger::new(dir.path().join("scan_history.json"), 3);

        for minute in 0..5 {
            logger
                .append(record(minute, ScanStatus::Completed, 10, 20))
                .await
                .unwrap();
        }

        let history = logger.history().await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].timestamp.format("%M").to_string(), "02");

        let recent = logger.recent(2).await.unwrap();
        assert_eq!(recent[0].timestamp.format("%M").to_string(), "04");
        assert_eq!(recent[1].timestamp.format("%M").to_string(), "03");
    }

    #[tokio::test]
    async fn test_statistics() {
        let dir = tempfile::tempdir().unwrap();
        let logger = ScanLogger::new(dir.path().join("scan_history.json"), 100);
        assert_eq!(logger.statistics().await.unwrap().total_scans, 0);

        logger.append(record(0, ScanStatus::Completed, 100, 30)).await.unwrap();
        logger.append(record(1, ScanStatus::Completed, 120, 50)).await.unwrap();
        logger.append(record(2, ScanStatus::Failed, 0, 10)).await.unwrap();
        logger.append(record(3, ScanStatus::Partial, 80, 10)).await.unwrap();

        let stats = logger.statistics().await.unwrap();
        assert_eq!(stats.total_scans, 4);
        assert_eq!(stats.successful, 2);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.success_rate, 50.0);
        assert_eq!(stats.avg_duration, 25.0);
        assert_eq!(stats.avg_offers_found, 75.0);
    }

    #[tokio::test]
    async fn test_phase_and_error_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let logger = ScanLogger::new(dir.path().join("h.json"), 10);
        let t = Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap();

        let mut r = ScanRecord::start(t);
        r.phase("scraping", Duration::from_millis(12_340), serde_json::json!({"pages": 5}));
        r.error("detail fetch failed", t);
        r.finish(ScanStatus::Partial, t, Duration::from_secs(20));
        logger.append(r).await.unwrap();

        let back = logger.recent(1).await.unwrap().remove(0);
        assert_eq!(back.phases["scraping"].duration, 12.34);
        assert_eq!(back.phases["scraping"].details["pages"], 5);
        assert_eq!(back.errors.len(), 1);
        assert_eq!(back.status, ScanStatus::Partial);
    }

    #[tokio::test]
    async fn test_corrupt_history_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("h.json");
        tokio::fs::write(&path, b"[{").await.unwrap();

        let logger = ScanLogger::new(&path, 10);
        logger.append(record(0, ScanStatus::Completed, 1, 1)).await.unwrap();
        assert_eq!(logger.history().await.unwrap().len(), 1);
    }
}
