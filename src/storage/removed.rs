use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;
use crate::storage::{read_json_optional, write_json_atomic};

/// Operator exclusion list: listings that must never enter the store again
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemovedListings {
    #[serde(default)]
    removed_ids: Vec<String>,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
}

impl RemovedListings {
    pub async fn load(path: &Path) -> StoreResult<Self> {
        Ok(read_json_optional(path).await?.unwrap_or_default())
    }

    pub async fn save(&self, path: &Path) -> StoreResult<()> {
        write_json_atomic(path, self).await
    }

    /// Returns false if the id was already excluded
    pub fn remove(&mut self, id: &str, now: DateTime<Utc>) -> bool {
        if self.contains(id) {
            return false;
        }
        self.removed_ids.push(id.to_string());
        self.last_updated = Some(now);
        true
    }

    /// Returns false if the id was not excluded
    pub fn restore(&mut self, id: &str, now: DateTime<Utc>) -> bool {
        let before = self.removed_ids.len();
        self.removed_ids.retain(|existing| existing != id);
        if self.removed_ids.len() == before {
            return false;
        }
        self.last_updated = Some(now);
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.removed_ids.iter().any(|existing| existing == id)
    }

    /// Ids in the order they were removed
    pub fn ids(&self) -> &[String] {
        &self.removed_ids
    }

    pub fn id_set(&self) -> HashSet<String> {
        self.removed_ids.iter().cloned().collect()
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    pub fn is_empty(&self) -> bool {
        self.removed_ids.is_empty()
    }
}
