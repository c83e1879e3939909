//! FBref match-data acquisition.
//!
//! - Discover the match-report URLs of a competition season
//! - Fetch pages through a throttled, challenge-aware browser session
//! - Cache raw pages on disk so runs can resume and be re-parsed offline
//! - Extract match records and per-player stat tables
//!
//! # Usage
//!
//! ```rust,ignore
//! use fbref_scraper::{ControlRequest, Orchestrator, ScrapeRequest, ScraperConfig, ScraperService};
//! use tower::Service;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ScraperConfig::from_env();
//!     let mut service = ScraperService::new(Orchestrator::with_browser(config).unwrap());
//!
//!     service
//!         .call(ControlRequest::Start(ScrapeRequest::season("premier-league", "2023-2024")))
//!         .await
//!         .unwrap();
//!     let status = service.orchestrator().wait().await;
//!     println!("{:?}: {} done", status.state, status.counts.done);
//! }
//! ```

pub mod cache;
pub mod config;
pub mod discover;
pub mod error;
pub mod fetcher;
pub mod job;
pub mod orchestrator;
pub mod parser;
pub mod service;
pub mod store;
pub mod traits;
pub mod types;

pub use cache::{CacheEntry, PageCache};
pub use config::{ChallengeConfig, FetchPolicy, ScraperConfig};
pub use error::ScraperError;
pub use fetcher::{BrowserFetcher, BrowserLauncher};
pub use job::{JobId, JobState, JobStatus, UrlStatus};
pub use orchestrator::{Orchestrator, ReparseSummary, ScrapeRequest, ScrapeTarget};
pub use parser::extract;
pub use service::{ControlRequest, ControlResponse, ScraperService};
pub use store::{JsonFileStore, MemoryStore, StoredMatch};
pub use traits::{FetcherLauncher, MatchStore, PageFetcher, SaveOutcome};
pub use types::{MatchRecord, Outcome, ParsedMatch, PlayerStatTable, Side, TableKind, TeamStats};
