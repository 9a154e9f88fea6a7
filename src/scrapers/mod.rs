pub mod olx;
pub mod rate_limit;
pub mod traits;
pub mod types;

pub use olx::OlxScraper;
pub use rate_limit::RateLimiter;
pub use traits::ListingSource;
pub use types::ScrapeParams;
