use async_trait::async_trait;

use crate::error::ScraperError;
use crate::types::{MatchRecord, PlayerStatTable};

/// A page source bound to one browser session.
#[async_trait]
pub trait PageFetcher: Send {
    /// Fetch raw markup for `url`, rate limited and challenge aware.
    async fn fetch(&mut self, url: &str) -> Result<String, ScraperError>;

    /// Release the session.
    async fn close(&mut self) -> Result<(), ScraperError>;
}

/// Opens a fresh fetch session for a job.
#[async_trait]
pub trait FetcherLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn PageFetcher>, ScraperError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// The identical record was already stored; nothing written.
    DuplicateIgnored,
}

/// Durable home of parsed matches, keyed by source URL.
#[async_trait]
pub trait MatchStore: Send + Sync {
    /// Insert or overwrite the record for `record.url`.
    async fn save(
        &self,
        record: &MatchRecord,
        tables: &[PlayerStatTable],
    ) -> Result<SaveOutcome, ScraperError>;

    async fn contains(&self, url: &str) -> bool;
}
