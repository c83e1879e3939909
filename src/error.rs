use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("browser init error: {0}")]
    BrowserInit(String),

    #[error("navigation error: {0}")]
    Navigation(String),

    /// The origin answered with an anti-automation page (challenge, 429).
    #[error("blocked by origin: {0}")]
    Blocked(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("network error: {0}")]
    Network(String),

    /// The page is not a match report at all (no score box).
    #[error("malformed page: {0}")]
    MalformedPage(String),

    #[error("missing field: {0}")]
    MissingField(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("a scrape job is already running")]
    AlreadyRunning,

    /// A spawned job task panicked or was cancelled by the runtime.
    #[error("task failed: {0}")]
    TaskFailed(String),

    #[error("file I/O error: {0}")]
    FileIO(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ScraperError {
    /// Errors worth another attempt against the same URL.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ScraperError::Timeout(_) | ScraperError::Network(_) | ScraperError::Navigation(_)
        )
    }

    /// Errors that signal origin-wide pressure and should slow the whole run.
    pub fn triggers_backoff(&self) -> bool {
        matches!(self, ScraperError::Blocked(_) | ScraperError::Timeout(_))
    }
}
