//! Shared state of the current scrape job.
//!
//! A single [`JobContext`] is owned by the orchestrator and read by status
//! queries. All transitions go through its mutex, so `try_begin` is a
//! compare-and-set: at most one job is ever `Running`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::ScraperError;

pub type JobId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Idle,
    Running,
    Completed,
    Stopped,
    Failed,
}

impl JobState {
    pub fn is_running(&self) -> bool {
        *self == JobState::Running
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum UrlStatus {
    Pending,
    Fetching,
    Parsing,
    Done,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlProgress {
    pub url: String,
    #[serde(flatten)]
    pub status: UrlStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub fetching: usize,
    pub parsing: usize,
    pub done: usize,
    pub error: usize,
}

impl StatusCounts {
    fn tally(urls: &[UrlProgress]) -> Self {
        let mut counts = Self::default();
        for progress in urls {
            match progress.status {
                UrlStatus::Pending => counts.pending += 1,
                UrlStatus::Fetching => counts.fetching += 1,
                UrlStatus::Parsing => counts.parsing += 1,
                UrlStatus::Done => counts.done += 1,
                UrlStatus::Error(_) => counts.error += 1,
            }
        }
        counts
    }
}

/// Point-in-time copy of the job, safe to hand to any caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub state: JobState,
    pub job_id: Option<JobId>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub total: usize,
    pub counts: StatusCounts,
    pub urls: Vec<UrlProgress>,
    pub log: Vec<String>,
}

impl JobStatus {
    pub fn status_of(&self, url: &str) -> Option<&UrlStatus> {
        self.urls.iter().find(|p| p.url == url).map(|p| &p.status)
    }
}

struct Inner {
    state: JobState,
    job_id: Option<JobId>,
    next_id: JobId,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    urls: Vec<UrlProgress>,
    index: BTreeMap<String, usize>,
    log: Vec<String>,
    cancel: CancellationToken,
}

pub struct JobContext {
    inner: Mutex<Inner>,
    state_tx: watch::Sender<JobState>,
}

impl Default for JobContext {
    fn default() -> Self {
        Self::new()
    }
}

impl JobContext {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(JobState::Idle);
        Self {
            inner: Mutex::new(Inner {
                state: JobState::Idle,
                job_id: None,
                next_id: 1,
                started_at: None,
                finished_at: None,
                urls: Vec::new(),
                index: BTreeMap::new(),
                log: Vec::new(),
                cancel: CancellationToken::new(),
            }),
            state_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Move to `Running` unless a job already is. Clears the previous job's
    /// URLs and log and hands back a fresh cancellation token.
    pub fn try_begin(&self) -> Result<(JobId, CancellationToken), ScraperError> {
        let mut inner = self.lock();
        if inner.state.is_running() {
            return Err(ScraperError::AlreadyRunning);
        }

        let job_id = inner.next_id;
        inner.next_id += 1;
        inner.state = JobState::Running;
        inner.job_id = Some(job_id);
        inner.started_at = Some(Utc::now());
        inner.finished_at = None;
        inner.urls.clear();
        inner.index.clear();
        inner.log.clear();
        inner.cancel = CancellationToken::new();
        let token = inner.cancel.clone();
        drop(inner);

        self.state_tx.send_replace(JobState::Running);
        info!("Job {} started", job_id);
        Ok((job_id, token))
    }

    /// Register the job's URLs, all `Pending`. Duplicates are dropped.
    pub fn set_urls(&self, urls: &[String]) {
        let mut inner = self.lock();
        for url in urls {
            if inner.index.contains_key(url) {
                continue;
            }
            let position = inner.urls.len();
            inner.index.insert(url.clone(), position);
            inner.urls.push(UrlProgress {
                url: url.clone(),
                status: UrlStatus::Pending,
            });
        }
    }

    pub fn set_status(&self, url: &str, status: UrlStatus) {
        let mut inner = self.lock();
        let position = inner.index.get(url).copied();
        if let Some(position) = position {
            inner.urls[position].status = status;
        }
    }

    pub fn log(&self, line: impl Into<String>) {
        let line = line.into();
        info!("{}", line);
        self.lock().log.push(line);
    }

    /// Leave `Running` for a terminal state.
    pub fn finish(&self, state: JobState) {
        self.finish_where(None, state);
    }

    /// Like [`finish`](Self::finish), but only if `job_id` is still the running job.
    pub fn finish_job(&self, job_id: JobId, state: JobState) {
        self.finish_where(Some(job_id), state);
    }

    fn finish_where(&self, expected: Option<JobId>, state: JobState) {
        let mut inner = self.lock();
        if !inner.state.is_running() || expected.is_some_and(|id| inner.job_id != Some(id)) {
            return;
        }
        inner.state = state;
        inner.finished_at = Some(Utc::now());
        let job_id = inner.job_id;
        drop(inner);

        self.state_tx.send_replace(state);
        info!("Job {:?} finished: {:?}", job_id, state);
    }

    /// Request a cooperative stop. Returns whether a job was running.
    pub fn cancel(&self) -> bool {
        let inner = self.lock();
        if inner.state.is_running() {
            inner.cancel.cancel();
            true
        } else {
            false
        }
    }

    pub fn state(&self) -> JobState {
        self.lock().state
    }

    pub fn snapshot(&self) -> JobStatus {
        let inner = self.lock();
        JobStatus {
            state: inner.state,
            job_id: inner.job_id,
            started_at: inner.started_at,
            finished_at: inner.finished_at,
            total: inner.urls.len(),
            counts: StatusCounts::tally(&inner.urls),
            urls: inner.urls.clone(),
            log: inner.log.clone(),
        }
    }

    /// Resolve once no job is running.
    pub async fn wait_until_finished(&self) {
        let mut rx = self.state_tx.subscribe();
        let _ = rx.wait_for(|state| !state.is_running()).await;
    }
}

/// Owns one job's `Running` state. Dropping it without [`complete`](Self::complete)
/// (a cancelled caller, a panicking task) fails the job so a new one can start.
pub struct JobGuard {
    ctx: Arc<JobContext>,
    job_id: JobId,
    completed: bool,
}

impl JobGuard {
    /// Begin a job on `ctx`; `AlreadyRunning` if one is running.
    pub fn begin(ctx: &Arc<JobContext>) -> Result<(Self, CancellationToken), ScraperError> {
        let (job_id, token) = ctx.try_begin()?;
        let guard = Self {
            ctx: ctx.clone(),
            job_id,
            completed: false,
        };
        Ok((guard, token))
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn complete(mut self, state: JobState) {
        self.completed = true;
        self.ctx.finish_job(self.job_id, state);
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        if !self.completed {
            warn!("Job {} ended without finishing; marking failed", self.job_id);
            self.ctx.log("✗ job aborted");
            self.ctx.finish_job(self.job_id, JobState::Failed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_begin_is_exclusive() {
        let ctx = JobContext::new();
        let (first, _) = ctx.try_begin().unwrap();
        assert!(matches!(ctx.try_begin(), Err(ScraperError::AlreadyRunning)));

        ctx.finish(JobState::Completed);
        let (second, _) = ctx.try_begin().unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_statuses_and_counts() {
        let ctx = JobContext::new();
        ctx.try_begin().unwrap();
        let urls: Vec<String> = ["a", "b", "c", "a"].iter().map(|s| s.to_string()).collect();
        ctx.set_urls(&urls);
        ctx.set_status("a", UrlStatus::Done);
        ctx.set_status("b", UrlStatus::Error("boom".into()));
        ctx.set_status("unknown", UrlStatus::Done);

        let status = ctx.snapshot();
        assert_eq!(status.total, 3);
        assert_eq!(status.counts.done, 1);
        assert_eq!(status.counts.error, 1);
        assert_eq!(status.counts.pending, 1);
        assert_eq!(status.status_of("c"), Some(&UrlStatus::Pending));
        assert_eq!(status.urls[0].url, "a");
    }

    #[test]
    fn test_cancel_only_while_running() {
        let ctx = JobContext::new();
        assert!(!ctx.cancel());

        let (_, token) = ctx.try_begin().unwrap();
        assert!(ctx.cancel());
        assert!(token.is_cancelled());

        ctx.finish(JobState::Stopped);
        let (_, fresh) = ctx.try_begin().unwrap();
        assert!(!fresh.is_cancelled());
    }

    #[test]
    fn test_finish_is_ignored_when_not_running() {
        let ctx = JobContext::new();
        ctx.finish(JobState::Completed);
        assert_eq!(ctx.state(), JobState::Idle);
    }

    #[tokio::test]
    async fn test_wait_until_finished() {
        let ctx = Arc::new(JobContext::new());
        ctx.try_begin().unwrap();

        let finisher = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            finisher.finish(JobState::Completed);
        });

        tokio::time::timeout(Duration::from_secs(5), ctx.wait_until_finished())
            .await
            .unwrap();
        assert_eq!(ctx.state(), JobState::Completed);
    }

    #[test]
    fn test_dropped_guard_fails_job() {
        let ctx = Arc::new(JobContext::new());
        let (guard, _) = JobGuard::begin(&ctx).unwrap();
        assert!(matches!(JobGuard::begin(&ctx), Err(ScraperError::AlreadyRunning)));

        drop(guard);
        assert_eq!(ctx.state(), JobState::Failed);
        assert!(ctx.snapshot().log.iter().any(|l| l == "✗ job aborted"));
        assert!(JobGuard::begin(&ctx).is_ok());
    }

    #[test]
    fn test_completed_guard_keeps_state() {
        let ctx = Arc::new(JobContext::new());
        let (guard, _) = JobGuard::begin(&ctx).unwrap();
        guard.complete(JobState::Stopped);
        assert_eq!(ctx.state(), JobState::Stopped);
    }

    #[tokio::test]
    async fn test_panicking_task_fails_job() {
        let ctx = Arc::new(JobContext::new());
        let (guard, _) = JobGuard::begin(&ctx).unwrap();

        let handle = tokio::spawn(async move {
            let _guard = guard;
            panic!("extractor bug");
        });
        assert!(handle.await.is_err());
        assert_eq!(ctx.state(), JobState::Failed);
    }

    #[test]
    fn test_finish_job_ignores_stale_id() {
        let ctx = JobContext::new();
        let (first, _) = ctx.try_begin().unwrap();
        ctx.finish(JobState::Completed);
        let (_, _) = ctx.try_begin().unwrap();

        ctx.finish_job(first, JobState::Failed);
        assert_eq!(ctx.state(), JobState::Running);
    }

    #[test]
    fn test_status_serializes_url_progress() {
        let progress = UrlProgress {
            url: "u".into(),
            status: UrlStatus::Error("timeout".into()),
        };
        let json = serde_json::to_value(&progress).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["reason"], "timeout");
    }
}
