//! chromiumoxide-backed fetcher with stealth settings.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::challenge::{ChallengeDetector, LoadedPage};
use super::throttle::Throttle;
use crate::config::ScraperConfig;
use crate::error::ScraperError;
use crate::traits::{FetcherLauncher, PageFetcher};

/// Injected before any page script runs.
const STEALTH_SCRIPT: &str = r#"
    Object.defineProperty(navigator, 'webdriver', { get: () => false });
    window.chrome = window.chrome || { runtime: {} };
    Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
    Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
"#;

pub struct BrowserFetcher {
    config: ScraperConfig,
    detector: ChallengeDetector,
    throttle: Throttle,
    browser: Option<Browser>,
    handler: Option<JoinHandle<()>>,
    fetched: u64,
}

impl BrowserFetcher {
    pub fn new(config: ScraperConfig) -> Self {
        Self {
            detector: ChallengeDetector::new(config.challenge.clone()),
            throttle: Throttle::new(&config.fetch),
            config,
            browser: None,
            handler: None,
            fetched: 0,
        }
    }

    /// Launch the browser session.
    pub async fn initialize(&mut self) -> Result<(), ScraperError> {
        info!("Initializing browser...");

        let user_data_dir = match &self.config.profile_dir {
            Some(dir) => dir.clone(),
            None => {
                let unique_id = format!(
                    "{}-{}",
                    std::process::id(),
                    std::time::SystemTime::now()
                        .duration_since(std::time::UNIX_EPOCH)
                        .unwrap_or_default()
                        .as_nanos()
                );
                std::env::temp_dir().join(format!("fbref-{}", unique_id))
            }
        };
        std::fs::create_dir_all(&user_data_dir)?;

        let mut builder = BrowserConfig::builder().user_data_dir(&user_data_dir);

        if let Some(chrome_path) = &self.config.chrome_path {
            builder = builder.chrome_executable(chrome_path);
        }

        if !self.config.headless {
            builder = builder.with_head();
        }

        builder = builder
            .no_sandbox()
            .window_size(1920, 1080)
            .request_timeout(self.config.fetch.page_timeout)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-features=IsolateOrigins,site-per-process")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--lang=en-US")
            .arg(format!("--user-agent={}", self.config.user_agent));

        if self.config.debug {
            builder = builder.arg("--enable-logging=stderr").arg("--v=1");
        }

        let browser_config = builder
            .build()
            .map_err(|e| ScraperError::BrowserInit(e.to_string()))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ScraperError::BrowserInit(e.to_string()))?;

        // The handler stream must be polled for the browser to make progress.
        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {}", e);
                }
            }
        });

        self.browser = Some(browser);
        self.handler = Some(handle);
        info!(
            "Browser initialized ({})",
            if self.config.headless { "headless" } else { "headful" }
        );

        Ok(())
    }

    fn get_browser(&self) -> Result<&Browser, ScraperError> {
        self.browser
            .as_ref()
            .ok_or_else(|| ScraperError::BrowserInit("browser not initialized".into()))
    }

    async fn apply_stealth(&self, page: &Page) -> Result<(), ScraperError> {
        page.execute(SetUserAgentOverrideParams::new(self.config.user_agent.clone()))
            .await
            .map_err(|e| ScraperError::BrowserInit(format!("user agent override: {}", e)))?;
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT))
            .await
            .map_err(|e| ScraperError::BrowserInit(format!("stealth script: {}", e)))?;
        Ok(())
    }

    async fn navigate(&self, page: &Page, url: &str) -> Result<(), ScraperError> {
        match tokio::time::timeout(self.config.fetch.page_timeout, page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(ScraperError::Navigation(format!("{}: {}", url, e))),
            Err(_) => Err(ScraperError::Timeout(format!(
                "{} did not load within {:?}",
                url, self.config.fetch.page_timeout
            ))),
        }
    }

    async fn log_screenshot(&self, page: &Page) {
        if !self.config.debug {
            return;
        }
        if let Ok(screenshot) = page
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
        {
            use base64::Engine;
            let encoded = base64::engine::general_purpose::STANDARD.encode(&screenshot);
            debug!("Blocked page screenshot: data:image/png;base64,{}", encoded);
        }
    }

    /// Occasionally open the homepage first, like a person browsing would.
    async fn maybe_warm_up(&self, page: &Page) {
        if self.fetched == 0 || fastrand::f64() >= self.config.fetch.warmup_probability {
            return;
        }
        let home = format!("{}/en/", self.config.base_url.trim_end_matches('/'));
        debug!("Visiting homepage first: {}", home);
        if let Err(e) = self.navigate(page, &home).await {
            debug!("Homepage visit failed: {}", e);
            return;
        }
        sleep(Duration::from_secs_f64(2.0 + 3.0 * fastrand::f64())).await;
    }

    /// Load `url` on `page`, sitting out challenge interstitials.
    async fn load(&self, page: &Page, url: &str) -> Result<String, ScraperError> {
        self.apply_stealth(page).await?;
        self.maybe_warm_up(page).await;

        let target = TargetPage {
            fetcher: self,
            page,
            url,
        };
        target.reload().await?;
        self.detector.await_clearance(&target, url).await
    }

    async fn fetch_once(&self, url: &str) -> Result<String, ScraperError> {
        let page = self
            .get_browser()?
            .new_page("about:blank")
            .await
            .map_err(|e| ScraperError::BrowserInit(e.to_string()))?;

        let result = self.load(&page, url).await;

        if let Err(e) = page.close().await {
            debug!("Failed to close page: {}", e);
        }
        result
    }

    async fn fetch_with_retries(&self, url: &str) -> Result<String, ScraperError> {
        let attempts = self.config.fetch.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            info!("Fetching {} (attempt {}/{})", url, attempt, attempts);
            match self.fetch_once(url).await {
                Ok(markup) => return Ok(markup),
                Err(e) if e.is_transient() => {
                    warn!("Attempt {} failed for {}: {}", attempt, url, e);
                    last_error = Some(e);
                    if attempt < attempts {
                        sleep(self.config.fetch.retry_delay).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| ScraperError::Network(format!("no attempt made: {}", url))))
    }
}

#[async_trait]
impl PageFetcher for BrowserFetcher {
    async fn fetch(&mut self, url: &str) -> Result<String, ScraperError> {
        let markup = self.throttle.run(self.fetch_with_retries(url)).await?;
        self.fetched += 1;
        info!("Fetched {} ({} chars)", url, markup.len());
        Ok(markup)
    }

    async fn close(&mut self) -> Result<(), ScraperError> {
        info!("Closing browser...");

        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                debug!("Browser close failed: {}", e);
            }
            let _ = browser.wait().await;
        }
        if let Some(handle) = self.handler.take() {
            handle.abort();
        }

        info!("Browser closed");
        Ok(())
    }
}

/// A browser tab bound to the URL it is loading.
struct TargetPage<'a> {
    fetcher: &'a BrowserFetcher,
    page: &'a Page,
    url: &'a str,
}

#[async_trait]
impl LoadedPage for TargetPage<'_> {
    async fn title(&self) -> String {
        self.page.get_title().await.ok().flatten().unwrap_or_default()
    }

    async fn content(&self) -> Result<String, ScraperError> {
        self.page
            .content()
            .await
            .map_err(|e| ScraperError::Network(format!("page content: {}", e)))
    }

    async fn reload(&self) -> Result<(), ScraperError> {
        self.fetcher.navigate(self.page, self.url).await?;
        sleep(self.fetcher.config.fetch.render_wait).await;
        Ok(())
    }

    async fn capture(&self) {
        self.fetcher.log_screenshot(self.page).await;
    }
}

/// Launches one [`BrowserFetcher`] per job.
#[derive(Debug, Clone)]
pub struct BrowserLauncher {
    config: ScraperConfig,
}

impl BrowserLauncher {
    pub fn new(config: ScraperConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl FetcherLauncher for BrowserLauncher {
    async fn launch(&self) -> Result<Box<dyn PageFetcher>, ScraperError> {
        let mut fetcher = BrowserFetcher::new(self.config.clone());
        fetcher.initialize().await?;
        Ok(Box::new(fetcher))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_browser_fetcher_new() {
        let fetcher = BrowserFetcher::new(ScraperConfig::default());
        assert!(fetcher.browser.is_none());
        assert!(fetcher.handler.is_none());
        assert_eq!(fetcher.fetched, 0);
    }

    #[tokio::test]
    async fn test_fetch_without_browser_fails() {
        let config = ScraperConfig::default().with_fetch_policy(crate::config::FetchPolicy {
            min_interval: Duration::ZERO,
            jitter: Duration::ZERO,
            max_attempts: 1,
            ..Default::default()
        });
        let mut fetcher = BrowserFetcher::new(config);
        let result = fetcher.fetch("https://fbref.com/en/").await;
        assert!(matches!(result, Err(ScraperError::BrowserInit(_))));
    }

    #[tokio::test]
    #[ignore] // live test: cargo test test_live_fetch -- --ignored --nocapture
    async fn test_live_fetch() {
        tracing_subscriber::fmt()
            .with_env_filter("info,fbref_scraper=debug")
            .init();

        let config = ScraperConfig::from_env().with_min_interval(Duration::ZERO);
        let mut fetcher = BrowserLauncher::new(config).launch().await.expect("launch browser");
        let html = fetcher
            .fetch("https://fbref.com/en/comps/9/schedule/Premier-League-Scores-and-Fixtures")
            .await;
        fetcher.close().await.expect("close browser");

        let html = html.expect("fetch schedule");
        assert!(html.contains("sched"));
    }
}
