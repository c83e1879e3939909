use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Pacing and retry knobs for the fetcher.
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    /// Minimum spacing between the end of one request and the start of the next.
    pub min_interval: Duration,
    /// Upper bound of the random extra delay added to `min_interval`.
    pub jitter: Duration,
    /// Per-attempt navigation timeout.
    pub page_timeout: Duration,
    /// Time given to client-side scripts after navigation.
    pub render_wait: Duration,
    /// Attempts per URL for transient failures.
    pub max_attempts: u32,
    /// Delay between transient-failure attempts.
    pub retry_delay: Duration,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    /// Chance (0.0..=1.0) of visiting the homepage before a fetch.
    pub warmup_probability: f64,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(30),
            jitter: Duration::from_secs(45),
            page_timeout: Duration::from_secs(90),
            render_wait: Duration::from_secs(4),
            max_attempts: 3,
            retry_delay: Duration::from_secs(15),
            backoff_initial: Duration::from_secs(60),
            backoff_max: Duration::from_secs(15 * 60),
            warmup_probability: 0.25,
        }
    }
}

/// Challenge-page detection heuristics.
#[derive(Debug, Clone)]
pub struct ChallengeConfig {
    /// Case-insensitive title fragments of interstitial challenge pages.
    pub title_signatures: Vec<String>,
    /// Title fragments of rate-limit responses.
    pub rate_limit_signatures: Vec<String>,
    /// Title fragments of missing pages.
    pub not_found_signatures: Vec<String>,
    /// Wait before re-checking a challenge page.
    pub grace: Duration,
    /// Challenge re-checks per URL before giving up with `Blocked`.
    pub retries: u32,
    /// Pages shorter than this are treated as truncated.
    pub min_content_len: usize,
    /// At least one of these must appear in a usable page.
    pub expected_markers: Vec<String>,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            title_signatures: vec![
                "just a moment".to_string(),
                "attention required".to_string(),
                "security".to_string(),
            ],
            rate_limit_signatures: vec!["429".to_string(), "too many requests".to_string()],
            not_found_signatures: vec!["404".to_string(), "not found".to_string()],
            grace: Duration::from_secs(15),
            retries: 3,
            min_content_len: 1000,
            expected_markers: vec![
                "scorebox".to_string(),
                "team_stats".to_string(),
                "sched".to_string(),
                "scores".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScraperConfig {
    pub base_url: String,
    pub cache_dir: PathBuf,
    pub data_dir: PathBuf,
    /// Persistent browser profile; keeps challenge cookies across runs.
    pub profile_dir: Option<PathBuf>,
    pub chrome_path: Option<String>,
    pub user_agent: String,
    pub headless: bool,
    pub debug: bool,
    pub fetch: FetchPolicy,
    pub challenge: ChallengeConfig,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: "https://fbref.com".to_string(),
            cache_dir: PathBuf::from("./data/html_cache"),
            data_dir: PathBuf::from("./data"),
            profile_dir: None,
            chrome_path: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            headless: true,
            debug: false,
            fetch: FetchPolicy::default(),
            challenge: ChallengeConfig::default(),
        }
    }
}

impl ScraperConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            cache_dir: data_dir.join("html_cache"),
            data_dir,
            ..Default::default()
        }
    }

    /// Defaults overlaid with `FBREF_*` and `CHROME_PATH` environment variables.
    pub fn from_env() -> Self {
        let mut config = match std::env::var("FBREF_DATA_DIR") {
            Ok(dir) => Self::new(dir),
            Err(_) => Self::default(),
        };

        if let Ok(dir) = std::env::var("FBREF_CACHE_DIR") {
            config.cache_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("FBREF_PROFILE_DIR") {
            config.profile_dir = Some(PathBuf::from(dir));
        }
        if let Ok(path) = std::env::var("CHROME_PATH").or_else(|_| std::env::var("CHROMIUM_PATH")) {
            config.chrome_path = Some(path);
        }
        if let Ok(flag) = std::env::var("FBREF_HEADLESS") {
            config.headless = !matches!(flag.to_ascii_lowercase().as_str(), "0" | "false" | "no");
        }
        if let Some(secs) = std::env::var("FBREF_MIN_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            config.fetch.min_interval = Duration::from_secs(secs);
        }

        config
    }

    pub fn with_cache_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_dir = path.into();
        self
    }

    pub fn with_profile_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.profile_dir = Some(path.into());
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.fetch.min_interval = interval;
        self
    }

    pub fn with_page_timeout(mut self, timeout: Duration) -> Self {
        self.fetch.page_timeout = timeout;
        self
    }

    pub fn with_fetch_policy(mut self, policy: FetchPolicy) -> Self {
        self.fetch = policy;
        self
    }

    pub fn with_challenge_config(mut self, challenge: ChallengeConfig) -> Self {
        self.challenge = challenge;
        self
    }

    /// Location of the persisted match collection.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("matches.json")
    }
}
