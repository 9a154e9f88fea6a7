use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use room_sonar::config::Config;
use room_sonar::geocoding::Geocoder;
use room_sonar::models::{Coords, MediaInfo, PriceProvenance, PriceTrend, RawListing};
use room_sonar::scan::Scanner;
use room_sonar::scrapers::ListingSource;
use room_sonar::storage::{OfferStore, RemovedListings, ScanLogger, ScanStatus};

/// Serves a fixed batch and remembers the prices it was offered
struct FixedSource {
    listings: Vec<RawListing>,
    seen_known_prices: Mutex<HashMap<String, u32>>,
}

impl FixedSource {
    fn new(listings: Vec<RawListing>) -> Self {
        Self {
            listings,
            seen_known_prices: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ListingSource for FixedSource {
    async fn scrape(&self, known_prices: &HashMap<String, u32>) -> Result<Vec<RawListing>> {
        *self.seen_known_prices.lock().unwrap() = known_prices.clone();
        Ok(self.listings.clone())
    }

    fn source_name(&self) -> &'static str {
        "fixed"
    }
}

struct MapGeocoder {
    known: HashMap<String, Coords>,
}

impl MapGeocoder {
    fn new() -> Self {
        let mut known = HashMap::new();
        known.insert("Narutowicza 5".to_string(), Coords { lat: 51.2455, lon: 22.5528 });
        known.insert("Kościuszki 10".to_string(), Coords { lat: 51.2478, lon: 22.5589 });
        Self { known }
    }
}

#[async_trait]
impl Geocoder for MapGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<Coords>> {
        Ok(self.known.get(address).copied())
    }

    fn name(&self) -> &'static str {
        "map"
    }
}

fn listing(id: &str, title: &str, description: &str) -> RawListing {
    RawListing {
        url: format!("https://www.olx.pl/d/oferta/{}.html", id),
        title: title.to_string(),
        description: description.to_string(),
        structured_price: None,
        structured_price_provenance: None,
    }
}

fn with_markup(mut raw: RawListing, price: u32) -> RawListing {
    raw.structured_price = Some(price);
    raw.structured_price_provenance = Some(PriceProvenance::StructuredMarkup);
    raw
}

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
}

/// Config rooted in `dir`, with the last listing of `first_batch` removed
async fn config_in(dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.paths.data_dir = dir.to_path_buf();

    let mut removed = RemovedListings::default();
    removed.remove("usuniete-ID7", at(1, 8));
    removed.save(&config.paths.removed()).await.unwrap();
    config
}

fn first_batch() -> Vec<RawListing> {
    vec![
        listing("pokoj-narutowicza-ID1", "Pokój przy Narutowicza 5", "Czynsz 900 zł, umeblowany."),
        with_markup(
            listing("mieszkanie-kosciuszki-ID2", "Mieszkanie Kościuszki 10", "Jasny pokój, blisko centrum"),
            1100,
        ),
        // same address and text as the first one
        listing("pokoj-narutowicza-kopia-ID3", "Pokój przy Narutowicza 5", "Czynsz 900 zł, umeblowany."),
        listing("pokoj-zana-ID4", "Pokój blisko Zana, tanio", "Czynsz 700 zł"),
        listing("pokoj-bez-ceny-ID5", "Pokój przy Narutowicza 5", "Opis bez ceny, zapraszam"),
        listing("pokoj-bursztynowa-ID6", "Mieszkam na Bursztynowa 7a", "Czynsz 800 zł"),
        listing("usuniete-ID7", "Pokój przy Narutowicza 5", "Czynsz 500 zł"),
    ]
}

#[tokio::test]
async fn test_first_scan_populates_store() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path()).await;

    let scanner = Scanner::new(config.clone());
    let report = scanner
        .run(&FixedSource::new(first_batch()), &MapGeocoder::new(), at(1, 9))
        .await
        .unwrap();

    let stats = &report.stats;
    assert_eq!(stats.raw_offers, 7);
    assert_eq!(stats.removed, 1);
    assert_eq!(stats.no_address, 1);
    assert_eq!(stats.no_price, 1);
    assert_eq!(stats.no_coords, 1);
    assert_eq!(stats.duplicates, 1);
    assert_eq!(stats.processed, 2);
    assert_eq!(stats.new, 2);
    assert_eq!(stats.active_in_store, 2);

    let db = OfferStore::new(config.paths.offers()).load(at(1, 9)).await.unwrap();
    assert_eq!(db.last_scan, Some(at(1, 9)));
    assert!(db.next_scan.unwrap() > at(1, 9));
    assert_eq!(db.offers.len(), 2);

    let narutowicza = db.offers.iter().find(|o| o.id == "pokoj-narutowicza-ID1").unwrap();
    assert_eq!(narutowicza.price, 900);
    assert_eq!(narutowicza.price_source, PriceProvenance::TextParse);
    assert_eq!(narutowicza.address, "Narutowicza 5");
    assert_eq!(narutowicza.lat, 51.2455);

    let kosciuszki = db.offers.iter().find(|o| o.id == "mieszkanie-kosciuszki-ID2").unwrap();
    assert_eq!(kosciuszki.price, 1100);
    assert_eq!(kosciuszki.price_source, PriceProvenance::StructuredMarkup);
    assert_eq!(kosciuszki.media_info, MediaInfo::Unknown);

    let history = ScanLogger::new(config.paths.scan_history(), 100)
        .recent(1)
        .await
        .unwrap();
    assert_eq!(history[0].status, ScanStatus::Completed);
    assert_eq!(history[0].stats.processed, 2);
}

#[tokio::test]
async fn test_following_scans_merge_and_deactivate() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path()).await;
    let scanner = Scanner::new(config.clone());
    let geocoder = MapGeocoder::new();

    scanner
        .run(&FixedSource::new(first_batch()), &geocoder, at(1, 9))
        .await
        .unwrap();

    // text price moves a little, markup price collapses
    let second = FixedSource::new(vec![
        listing("pokoj-narutowicza-ID1", "Pokój przy Narutowicza 5", "Czynsz 950 zł, umeblowany."),
        with_markup(
            listing("mieszkanie-kosciuszki-ID2", "Mieszkanie Kościuszki 10", "Jasny pokój, blisko centrum"),
            300,
        ),
    ]);
    let report = scanner.run(&second, &geocoder, at(1, 15)).await.unwrap();

    assert_eq!(
        second.seen_known_prices.lock().unwrap().get("mieszkanie-kosciuszki-ID2"),
        Some(&1100)
    );
    assert_eq!(report.stats.updated, 2);
    assert_eq!(report.stats.price_changes, 1);
    assert_eq!(report.suspicious_changes.len(), 1);
    assert_eq!(report.suspicious_changes[0].old_price, 1100);
    assert_eq!(report.suspicious_changes[0].new_price, 300);

    let store = OfferStore::new(config.paths.offers());
    let db = store.load(at(1, 15)).await.unwrap();
    let narutowicza = db.offers.iter().find(|o| o.id == "pokoj-narutowicza-ID1").unwrap();
    assert_eq!(narutowicza.price, 950);
    assert_eq!(narutowicza.previous_price, Some(900));
    assert_eq!(narutowicza.price_trend, Some(PriceTrend::Up));
    assert_eq!(narutowicza.price_history, vec![900, 950]);
    let kosciuszki = db.offers.iter().find(|o| o.id == "mieszkanie-kosciuszki-ID2").unwrap();
    assert_eq!(kosciuszki.price, 1100);
    assert_eq!(kosciuszki.last_seen, at(1, 15));

    // the markup listing disappears
    let third = FixedSource::new(vec![listing(
        "pokoj-narutowicza-ID1",
        "Pokój przy Narutowicza 5",
        "Czynsz 950 zł, umeblowany.",
    )]);
    let report = scanner.run(&third, &geocoder, at(3, 9)).await.unwrap();
    assert_eq!(report.stats.deactivated, 1);
    assert_eq!(report.stats.active_in_store, 1);
    assert_eq!(report.stats.total_in_store, 2);

    let db = store.load(at(3, 9)).await.unwrap();
    let kosciuszki = db.offers.iter().find(|o| o.id == "mieszkanie-kosciuszki-ID2").unwrap();
    assert!(!kosciuszki.active);
    assert_eq!(kosciuszki.days_active, 0);
}

#[tokio::test]
async fn test_empty_scrape_aborts_without_touching_store() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path()).await;
    let scanner = Scanner::new(config.clone());
    let geocoder = MapGeocoder::new();

    scanner
        .run(&FixedSource::new(first_batch()), &geocoder, at(1, 9))
        .await
        .unwrap();
    let before = tokio::fs::read(config.paths.offers()).await.unwrap();

    let err = scanner
        .run(&FixedSource::new(Vec::new()), &geocoder, at(1, 15))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("No listings"));

    let after = tokio::fs::read(config.paths.offers()).await.unwrap();
    assert_eq!(before, after);

    let history = ScanLogger::new(config.paths.scan_history(), 100)
        .recent(1)
        .await
        .unwrap();
    assert_eq!(history[0].status, ScanStatus::Failed);
    assert_eq!(history[0].errors.len(), 1);
}

#[tokio::test]
async fn test_corrupt_store_stops_the_scan() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path()).await;
    tokio::fs::write(config.paths.offers(), b"{ broken").await.unwrap();

    let err = Scanner::new(config.clone())
        .run(&FixedSource::new(first_batch()), &MapGeocoder::new(), at(1, 9))
        .await
        .unwrap_err();
    assert!(format!("{:#}", err).contains("Corrupt"));
    assert_eq!(tokio::fs::read(config.paths.offers()).await.unwrap(), b"{ broken");

    let mut recovering = config.clone();
    recovering.scan.recover_corrupt_store = true;
    let report = Scanner::new(recovering)
        .run(&FixedSource::new(first_batch()), &MapGeocoder::new(), at(1, 9))
        .await
        .unwrap();
    assert_eq!(report.stats.new, 2);
}
