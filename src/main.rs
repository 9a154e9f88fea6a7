use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use room_sonar::config::{Config, DEFAULT_CONFIG_FILE};
use room_sonar::geocoding::NominatimGeocoder;
use room_sonar::scan::Scanner;
use room_sonar::scrapers::{OlxScraper, ScrapeParams};
use room_sonar::storage::{RemovedListings, ScanLogger};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Room offer monitor
#[derive(Parser, Debug)]
#[command(name = "room-sonar", version, about = "Tracks room rental offers and their prices")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one scan cycle (default)
    Scan,

    /// Exclude a listing from all future scans
    Remove {
        /// Offer id, e.g. pokoj-jednoosobowy-CID3-ID14gaar
        id: String,
    },

    /// Undo a previous remove
    Restore { id: String },

    /// List removed listings
    Removed,

    /// Summarize the scan history
    Stats {
        /// How many recent scans to show
        #[arg(short, long, default_value_t = 10)]
        recent: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    match cli.command.unwrap_or(Command::Scan) {
        Command::Scan => scan(config).await,
        Command::Remove { id } => remove(&config, &id).await,
        Command::Restore { id } => restore(&config, &id).await,
        Command::Removed => list_removed(&config).await,
        Command::Stats { recent } => stats(&config, recent).await,
    }
}

async fn scan(config: Config) -> Result<()> {
    info!("🏠 Room Sonar - scan started");

    let source = OlxScraper::new(ScrapeParams::from(&config.scan))?;
    let geocoder =
        NominatimGeocoder::new(config.geocoder.clone(), config.paths.geocode_cache()).await?;
    let scanner = Scanner::new(config);

    let report = scanner.run(&source, &geocoder, Utc::now()).await?;

    for change in &report.suspicious_changes {
        println!(
            "⚠️  {}: {} zł -> {} zł ({}) kept old price",
            change.offer_id, change.old_price, change.new_price, change.provenance
        );
    }
    println!(
        "✅ {} active / {} total offers, next scan at {}",
        report.stats.active_in_store,
        report.stats.total_in_store,
        report.next_scan.with_timezone(&Local).format("%Y-%m-%d %H:%M")
    );
    Ok(())
}

async fn remove(config: &Config, id: &str) -> Result<()> {
    let path = config.paths.removed();
    let mut removed = RemovedListings::load(&path).await?;

    if removed.remove(id, Utc::now()) {
        removed.save(&path).await?;
        println!("✅ {} added to removed listings, it will be skipped from the next scan", id);
    } else {
        println!("⚠️  {} is already removed", id);
    }
    Ok(())
}

async fn restore(config: &Config, id: &str) -> Result<()> {
    let path = config.paths.removed();
    let mut removed = RemovedListings::load(&path).await?;

    if removed.restore(id, Utc::now()) {
        removed.save(&path).await?;
        println!("✅ {} restored, it will reappear after the next scan", id);
    } else {
        println!("⚠️  {} is not on the removed list", id);
    }
    Ok(())
}

async fn list_removed(config: &Config) -> Result<()> {
    let removed = RemovedListings::load(&config.paths.removed()).await?;

    if removed.is_empty() {
        println!("📋 No removed listings");
        return Ok(());
    }

    println!("🗑️  Removed listings ({}):", removed.ids().len());
    for (i, id) in removed.ids().iter().enumerate() {
        println!("{}. {}", i + 1, id);
    }
    if let Some(updated) = removed.last_updated() {
        println!("Last updated: {}", updated.with_timezone(&Local).format("%Y-%m-%d %H:%M"));
    }
    Ok(())
}

async fn stats(config: &Config, recent: usize) -> Result<()> {
    let logger = ScanLogger::new(config.paths.scan_history(), config.scan.history_length);
    let summary = logger.statistics().await?;

    println!("📊 Scans: {} ({} ok, {} failed, {:.1}% success)",
        summary.total_scans, summary.successful, summary.failed, summary.success_rate);
    println!("   Average duration: {:.2}s, average offers found: {:.1}",
        summary.avg_duration, summary.avg_offers_found);

    for scan in logger.recent(recent).await? {
        println!(
            "{}  {:?}  raw {}  new {}  updated {}  suspicious {}  {:.1}s",
            scan.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
            scan.status,
            scan.stats.raw_offers,
            scan.stats.new,
            scan.stats.updated,
            scan.stats.suspicious,
            scan.total_duration.unwrap_or_default()
        );
    }
    Ok(())
}
