pub mod nominatim;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Coords;

pub use nominatim::NominatimGeocoder;

/// Turns an address into coordinates
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// `Ok(None)` when the address is unknown to the service
    async fn geocode(&self, address: &str) -> Result<Option<Coords>>;

    /// Persist any cached lookups
    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str;
}
