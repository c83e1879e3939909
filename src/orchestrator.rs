//! Scrape job driver: discovery, cache-first fetching, extraction, storage.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cache::PageCache;
use crate::config::ScraperConfig;
use crate::discover;
use crate::error::ScraperError;
use crate::fetcher::BrowserLauncher;
use crate::job::{JobContext, JobGuard, JobId, JobState, JobStatus, UrlStatus};
use crate::parser;
use crate::store::JsonFileStore;
use crate::traits::{FetcherLauncher, MatchStore, PageFetcher, SaveOutcome};
use crate::types::{match_id_from_url, url_slug, ParsedMatch};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeTarget {
    /// Explicit match-report URLs.
    Urls(Vec<String>),
    /// Every match of a competition season, found through its fixture list.
    Season { competition: String, season: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeRequest {
    pub target: ScrapeTarget,
    /// Process at most this many URLs.
    pub limit: Option<usize>,
}

impl ScrapeRequest {
    pub fn urls<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            target: ScrapeTarget::Urls(urls.into_iter().map(Into::into).collect()),
            limit: None,
        }
    }

    pub fn season(competition: impl Into<String>, season: impl Into<String>) -> Self {
        Self {
            target: ScrapeTarget::Season {
                competition: competition.into(),
                season: season.into(),
            },
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Result of an offline re-parse of the cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReparseSummary {
    pub total: usize,
    pub saved: usize,
    pub unchanged: usize,
    pub errors: Vec<(String, String)>,
}

/// Opens the browser on the first cache miss only.
struct LazySession {
    launcher: Arc<dyn FetcherLauncher>,
    session: Option<Box<dyn PageFetcher>>,
}

impl LazySession {
    fn new(launcher: Arc<dyn FetcherLauncher>) -> Self {
        Self {
            launcher,
            session: None,
        }
    }
}

#[async_trait]
impl PageFetcher for LazySession {
    async fn fetch(&mut self, url: &str) -> Result<String, ScraperError> {
        if self.session.is_none() {
            self.session = Some(self.launcher.launch().await?);
        }
        match self.session.as_mut() {
            Some(session) => session.fetch(url).await,
            None => Err(ScraperError::BrowserInit("no fetch session".to_string())),
        }
    }

    async fn close(&mut self) -> Result<(), ScraperError> {
        match self.session.take() {
            Some(mut session) => session.close().await,
            None => Ok(()),
        }
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    config: Arc<ScraperConfig>,
    cache: PageCache,
    store: Arc<dyn MatchStore>,
    launcher: Arc<dyn FetcherLauncher>,
    ctx: Arc<JobContext>,
}

impl Orchestrator {
    pub fn new(
        config: ScraperConfig,
        store: Arc<dyn MatchStore>,
        launcher: Arc<dyn FetcherLauncher>,
    ) -> Self {
        Self {
            cache: PageCache::new(&config.cache_dir),
            config: Arc::new(config),
            store,
            launcher,
            ctx: Arc::new(JobContext::new()),
        }
    }

    /// Real browser sessions and a `matches.json` store under `data_dir`.
    pub fn with_browser(config: ScraperConfig) -> Result<Self, ScraperError> {
        let store = Arc::new(JsonFileStore::open(config.store_path())?);
        let launcher = Arc::new(BrowserLauncher::new(config.clone()));
        Ok(Self::new(config, store, launcher))
    }

    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }

    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    /// Begin a job in the background. Fails synchronously while another runs.
    pub fn start_scrape(&self, request: ScrapeRequest) -> Result<JobId, ScraperError> {
        let (guard, token) = JobGuard::begin(&self.ctx)?;
        let job_id = guard.job_id();
        match &request.target {
            ScrapeTarget::Urls(urls) => self.ctx.set_urls(&limited(urls.clone(), request.limit)),
            ScrapeTarget::Season { competition, season } => {
                self.ctx.log(format!("Discovering {} {}", competition, season))
            }
        }

        let this = self.clone();
        tokio::spawn(async move {
            let state = this.run(request, token).await;
            guard.complete(state);
        });
        Ok(job_id)
    }

    /// Ask the running job to stop after its in-flight URL.
    pub fn stop_scrape(&self) -> bool {
        let stopping = self.ctx.cancel();
        if stopping {
            self.ctx.log("Stop requested");
        }
        stopping
    }

    pub fn status(&self) -> JobStatus {
        self.ctx.snapshot()
    }

    /// Resolve when no job is running, with the final status.
    pub async fn wait(&self) -> JobStatus {
        self.ctx.wait_until_finished().await;
        self.ctx.snapshot()
    }

    async fn run(&self, request: ScrapeRequest, token: CancellationToken) -> JobState {
        let mut session = LazySession::new(self.launcher.clone());
        let state = self.run_with(&mut session, request, &token).await;
        if let Err(e) = session.close().await {
            warn!("Failed to close fetch session: {}", e);
        }
        state
    }

    async fn run_with(
        &self,
        fetcher: &mut dyn PageFetcher,
        request: ScrapeRequest,
        token: &CancellationToken,
    ) -> JobState {
        let urls = match request.target {
            ScrapeTarget::Urls(urls) => limited(urls, request.limit),
            ScrapeTarget::Season { competition, season } => {
                match discover::discover(fetcher, &self.cache, &competition, &season).await {
                    Ok(urls) => {
                        let urls = limited(urls, request.limit);
                        self.ctx.set_urls(&urls);
                        self.ctx.log(format!("Found {} matches", urls.len()));
                        urls
                    }
                    Err(e) => {
                        self.ctx.log(format!("✗ discovery: {}", e));
                        return JobState::Failed;
                    }
                }
            }
        };

        for url in &urls {
            if token.is_cancelled() {
                self.ctx.log("Stopped");
                return JobState::Stopped;
            }
            if let Err(e) = self.process(fetcher, url).await {
                self.ctx.set_status(url, UrlStatus::Error(e.to_string()));
                self.ctx.log(format!("✗ {}: {}", url_slug(url), e));
            }
        }

        if token.is_cancelled() {
            self.ctx.log("Stopped");
            return JobState::Stopped;
        }
        let status = self.ctx.snapshot();
        self.ctx.log(format!(
            "Finished: {} done, {} errors",
            status.counts.done, status.counts.error
        ));
        JobState::Completed
    }

    async fn process(&self, fetcher: &mut dyn PageFetcher, url: &str) -> Result<(), ScraperError> {
        let slug = url_slug(url);
        let markup = if self.cache.has(url) {
            self.ctx.log(format!("[cache] {}", slug));
            self.cache.get(url)?
        } else {
            self.ctx.set_status(url, UrlStatus::Fetching);
            let markup = fetcher.fetch(url).await?;
            if let Err(e) = self.cache.put(url, &markup) {
                warn!("Failed to cache {}: {}", url, e);
            }
            self.ctx.log(format!("[fetched] {}", slug));
            markup
        };

        self.ctx.set_status(url, UrlStatus::Parsing);
        let parsed = parser::extract(url, &markup)?;
        self.store.save(&parsed.record, &parsed.tables).await?;

        self.ctx.set_status(url, UrlStatus::Done);
        self.ctx.log(format!("✓ {}", parsed.record.headline()));
        Ok(())
    }

    /// Parse markup supplied by hand, store it, and cache the page.
    pub async fn parse_manual(
        &self,
        url: &str,
        markup: &str,
    ) -> Result<(ParsedMatch, SaveOutcome), ScraperError> {
        // The running job is the only cache and store writer.
        if self.ctx.state().is_running() {
            return Err(ScraperError::AlreadyRunning);
        }
        let parsed = parser::extract(url, markup)?;
        self.cache.put(url, markup)?;
        let outcome = self.store.save(&parsed.record, &parsed.tables).await?;
        info!("Parsed {} manually: {}", url, parsed.record.headline());
        Ok((parsed, outcome))
    }

    /// Re-extract every cached match page into the store without any fetching.
    ///
    /// Runs as a job of its own so it cannot overlap a scrape. The work is
    /// spawned: dropping the returned future leaves it running to completion.
    pub async fn reparse_cache(&self) -> Result<ReparseSummary, ScraperError> {
        let (guard, token) = JobGuard::begin(&self.ctx)?;
        let this = self.clone();
        let handle = tokio::spawn(async move {
            let result = this.reparse_all(&token).await;
            guard.complete(match &result {
                Err(_) => JobState::Failed,
                Ok(_) if token.is_cancelled() => JobState::Stopped,
                Ok(_) => JobState::Completed,
            });
            result
        });
        handle
            .await
            .map_err(|e| ScraperError::TaskFailed(format!("re-parse task: {}", e)))?
    }

    async fn reparse_all(&self, token: &CancellationToken) -> Result<ReparseSummary, ScraperError> {
        let urls: Vec<String> = match self.cache.urls() {
            Ok(urls) => urls
                .into_iter()
                .filter(|url| match_id_from_url(url).is_some())
                .collect(),
            Err(e) => {
                self.ctx.log(format!("✗ cache: {}", e));
                return Err(e);
            }
        };
        self.ctx.set_urls(&urls);
        self.ctx.log(format!("Re-parsing {} cached pages", urls.len()));

        let mut summary = ReparseSummary {
            total: urls.len(),
            ..ReparseSummary::default()
        };
        for url in &urls {
            if token.is_cancelled() {
                break;
            }
            self.ctx.set_status(url, UrlStatus::Parsing);
            let result = match self.cache.get(url) {
                Ok(markup) => self.reparse_one(url, &markup).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(SaveOutcome::Saved) => summary.saved += 1,
                Ok(SaveOutcome::DuplicateIgnored) => summary.unchanged += 1,
                Err(e) => {
                    self.ctx.set_status(url, UrlStatus::Error(e.to_string()));
                    self.ctx.log(format!("✗ {}: {}", url_slug(url), e));
                    summary.errors.push((url.clone(), e.to_string()));
                }
            }
        }

        self.ctx.log(format!(
            "Re-parse finished: {} saved, {} unchanged, {} errors",
            summary.saved,
            summary.unchanged,
            summary.errors.len()
        ));
        Ok(summary)
    }

    async fn reparse_one(&self, url: &str, markup: &str) -> Result<SaveOutcome, ScraperError> {
        let parsed = parser::extract(url, markup)?;
        let outcome = self.store.save(&parsed.record, &parsed.tables).await?;
        self.ctx.set_status(url, UrlStatus::Done);
        self.ctx.log(format!("✓ {}", parsed.record.headline()));
        Ok(outcome)
    }
}

/// Drop repeated URLs (first occurrence wins), then apply `limit`.
fn limited(urls: Vec<String>, limit: Option<usize>) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.into_iter()
        .filter(|url| seen.insert(url.clone()))
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}
