//! Rental listing monitor: scrapes room offers, extracts street addresses and
//! room prices from free text, and keeps a deduplicated offer store with
//! price history across scans.

pub mod config;
pub mod error;
pub mod geocoding;
pub mod models;
pub mod parsers;
pub mod reconcile;
pub mod scan;
pub mod scrapers;
pub mod storage;
