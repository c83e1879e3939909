//! Scrape one competition season with a real browser.
//!
//! Usage:
//! ```
//! cargo run --example scrape_season -- premier-league 2023-2024 [limit]
//! ```
//!
//! Paths and browser options come from `FBREF_*` environment variables
//! (see `ScraperConfig::from_env`).

use std::time::Duration;

use fbref_scraper::{JobState, Orchestrator, ScrapeRequest, ScraperConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let competition = args.next().unwrap_or_else(|| "premier-league".to_string());
    let season = args.next().unwrap_or_else(|| "2023-2024".to_string());
    let limit = args.next().and_then(|n| n.parse::<usize>().ok());

    let config = ScraperConfig::from_env();
    println!("=== FBref season scrape ===");
    println!("Competition: {} {}", competition, season);
    println!("Cache: {}", config.cache_dir.display());
    println!("Store: {}", config.store_path().display());

    let orchestrator = Orchestrator::with_browser(config)?;
    let mut request = ScrapeRequest::season(&competition, &season);
    if let Some(limit) = limit {
        request = request.with_limit(limit);
    }

    let job_id = orchestrator.start_scrape(request)?;
    println!("Job {} started (Ctrl-C stops after the current match)", job_id);

    let stopper = orchestrator.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stopper.stop_scrape();
        }
    });

    let mut printed = 0;
    loop {
        let status = orchestrator.status();
        for line in &status.log[printed.min(status.log.len())..] {
            println!("  {}", line);
        }
        printed = status.log.len();
        if status.state != JobState::Running {
            break;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    let status = orchestrator.wait().await;
    println!("\n=== {:?} ===", status.state);
    println!(
        "total={} done={} errors={} pending={}",
        status.total, status.counts.done, status.counts.error, status.counts.pending
    );

    Ok(())
}
