//! Rebuild the match store from cached pages, offline.
//!
//! Usage:
//! ```
//! FBREF_DATA_DIR=./data cargo run --example reparse_cache
//! ```

use fbref_scraper::{Orchestrator, ScraperConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ScraperConfig::from_env();
    println!("=== Re-parse {} ===", config.cache_dir.display());

    let orchestrator = Orchestrator::with_browser(config)?;
    let summary = orchestrator.reparse_cache().await?;

    println!(
        "pages={} saved={} unchanged={} errors={}",
        summary.total,
        summary.saved,
        summary.unchanged,
        summary.errors.len()
    );
    for (url, reason) in &summary.errors {
        println!("  ✗ {}: {}", url, reason);
    }

    Ok(())
}
