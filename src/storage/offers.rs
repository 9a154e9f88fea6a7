use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::{StoreError, StoreResult};
use crate::models::OfferDatabase;
use crate::storage::{read_json_optional, write_json_atomic};

/// The persisted offer collection
#[derive(Debug, Clone)]
pub struct OfferStore {
    path: PathBuf,
    recover_corrupt: bool,
}

impl OfferStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            recover_corrupt: false,
        }
    }

    /// Move an unreadable file aside and start empty instead of failing
    pub fn with_corrupt_recovery(mut self, enabled: bool) -> Self {
        self.recover_corrupt = enabled;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the store. A missing file is an empty store; an unreadable one
    /// is an error unless recovery was enabled.
    pub async fn load(&self, now: DateTime<Utc>) -> StoreResult<OfferDatabase> {
        match read_json_optional::<OfferDatabase>(&self.path).await {
            Ok(Some(db)) => {
                info!(path = %self.path.display(), offers = db.offers.len(), "Loaded offer store");
                Ok(db)
            }
            Ok(None) => {
                info!(path = %self.path.display(), "No offer store yet, starting empty");
                Ok(OfferDatabase::default())
            }
            Err(err) if err.is_corrupt() && self.recover_corrupt => {
                let aside = self.quarantine(now).await?;
                warn!(
                    error = %err,
                    moved_to = %aside.display(),
                    "Offer store unreadable, moved aside and starting empty"
                );
                Ok(OfferDatabase::default())
            }
            Err(err) => Err(err),
        }
    }

    pub async fn save(&self, db: &OfferDatabase) -> StoreResult<()> {
        write_json_atomic(&self.path, db).await?;
        info!(path = %self.path.display(), offers = db.offers.len(), "Saved offer store");
        Ok(())
    }

    async fn quarantine(&self, now: DateTime<Utc>) -> StoreResult<PathBuf> {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".corrupt-{}", now.format("%Y%m%d%H%M%S")));
        let aside = PathBuf::from(name);

        tokio::fs::rename(&self.path, &aside)
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;
        Ok(aside)
    }
}
