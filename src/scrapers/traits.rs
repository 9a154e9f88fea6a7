use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::RawListing;

/// Common trait for all listing sources
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Fetch every listing the source currently shows.
    ///
    /// `known_prices` maps offer ids to prices already confirmed by
    /// structured markup; a source may reuse them instead of refetching.
    async fn scrape(&self, known_prices: &HashMap<String, u32>) -> Result<Vec<RawListing>>;

    /// Get the name of the listing source
    fn source_name(&self) -> &'static str;
}
