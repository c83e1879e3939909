//! Classification of fetched pages: usable, challenge interstitial, or error.

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::info;

use crate::config::ChallengeConfig;
use crate::error::ScraperError;

/// A page that has been navigated to its target URL.
#[async_trait]
pub(crate) trait LoadedPage: Send + Sync {
    async fn title(&self) -> String;

    async fn content(&self) -> Result<String, ScraperError>;

    /// Navigate to the target again and let it render.
    async fn reload(&self) -> Result<(), ScraperError>;

    /// Called once when the page is given up on.
    async fn capture(&self) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageVerdict {
    Ok,
    Challenge,
    RateLimited,
    NotFound,
    TooShort(usize),
    /// Long enough but none of the expected markers.
    Unexpected,
}

#[derive(Debug, Clone)]
pub struct ChallengeDetector {
    config: ChallengeConfig,
}

impl ChallengeDetector {
    pub fn new(config: ChallengeConfig) -> Self {
        Self { config }
    }

    fn title_matches(title: &str, signatures: &[String]) -> bool {
        let title = title.to_lowercase();
        signatures
            .iter()
            .any(|sig| !sig.is_empty() && title.contains(&sig.to_lowercase()))
    }

    pub fn is_challenge_title(&self, title: &str) -> bool {
        Self::title_matches(title, &self.config.title_signatures)
    }

    pub fn classify(&self, title: &str, markup: &str) -> PageVerdict {
        if self.is_challenge_title(title) {
            return PageVerdict::Challenge;
        }
        if Self::title_matches(title, &self.config.rate_limit_signatures) {
            return PageVerdict::RateLimited;
        }
        if markup.len() < self.config.min_content_len {
            return PageVerdict::TooShort(markup.len());
        }

        let lower = markup.to_lowercase();
        let has_marker = self
            .config
            .expected_markers
            .iter()
            .any(|m| lower.contains(&m.to_lowercase()));
        if has_marker {
            return PageVerdict::Ok;
        }

        if Self::title_matches(title, &self.config.not_found_signatures) {
            PageVerdict::NotFound
        } else {
            PageVerdict::Unexpected
        }
    }

    /// Markup of `page` once it is usable.
    ///
    /// A challenge gets `grace` to clear on its own, then a reload if the
    /// title still shows it. After `retries` such rounds the URL is `Blocked`.
    pub(crate) async fn await_clearance(
        &self,
        page: &dyn LoadedPage,
        url: &str,
    ) -> Result<String, ScraperError> {
        let mut challenges = 0;
        loop {
            let title = page.title().await;
            let markup = page.content().await?;

            match self.classify(&title, &markup) {
                PageVerdict::Ok => return Ok(markup),
                PageVerdict::Challenge => {
                    challenges += 1;
                    if challenges > self.config.retries {
                        page.capture().await;
                        return Err(ScraperError::Blocked(format!(
                            "challenge page persisted after {} waits: {}",
                            self.config.retries, url
                        )));
                    }
                    info!(
                        "Challenge detected on {}, waiting {:?} ({}/{})",
                        url, self.config.grace, challenges, self.config.retries
                    );
                    sleep(self.config.grace).await;

                    if self.is_challenge_title(&page.title().await) {
                        page.reload().await?;
                    }
                }
                PageVerdict::RateLimited => {
                    return Err(ScraperError::Blocked(format!("rate limited: {}", url)))
                }
                PageVerdict::NotFound => return Err(ScraperError::NotFound(url.to_string())),
                PageVerdict::TooShort(len) => {
                    return Err(ScraperError::Network(format!(
                        "response too short ({} chars)",
                        len
                    )))
                }
                PageVerdict::Unexpected => {
                    return Err(ScraperError::Network(
                        "page is missing expected elements".into(),
                    ))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use tokio::time::{Duration, Instant};

    /// Shows a challenge until it has been reloaded `clears_after` times.
    struct ScriptedPage {
        clears_after: Option<u32>,
        title: &'static str,
        reloads: AtomicU32,
        captured: AtomicBool,
    }

    impl ScriptedPage {
        fn new(clears_after: Option<u32>) -> Self {
            Self {
                clears_after,
                title: "Just a moment...",
                reloads: AtomicU32::new(0),
                captured: AtomicBool::new(false),
            }
        }

        fn cleared(&self) -> bool {
            self.clears_after
                .map(|n| self.reloads.load(Ordering::SeqCst) >= n)
                .unwrap_or(false)
        }
    }

    #[async_trait]
    impl LoadedPage for ScriptedPage {
        async fn title(&self) -> String {
            if self.cleared() {
                "Arsenal vs. Wolves Match Report".to_string()
            } else {
                self.title.to_string()
            }
        }

        async fn content(&self) -> Result<String, ScraperError> {
            Ok(if self.cleared() {
                padded("<div class=\"scorebox\"></div>")
            } else {
                "<html>checking</html>".to_string()
            })
        }

        async fn reload(&self) -> Result<(), ScraperError> {
            self.reloads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn capture(&self) {
            self.captured.store(true, Ordering::SeqCst);
        }
    }

    fn patient_detector() -> ChallengeDetector {
        ChallengeDetector::new(ChallengeConfig {
            grace: Duration::from_secs(15),
            retries: 3,
            ..ChallengeConfig::default()
        })
    }

    fn detector() -> ChallengeDetector {
        ChallengeDetector::new(ChallengeConfig::default())
    }

    fn padded(body: &str) -> String {
        format!("<html><body>{}{}</body></html>", body, " ".repeat(2000))
    }

    #[test]
    fn test_challenge_titles() {
        let d = detector();
        assert_eq!(d.classify("Just a moment...", ""), PageVerdict::Challenge);
        assert_eq!(
            d.classify("Attention Required! | Cloudflare", &padded("scorebox")),
            PageVerdict::Challenge
        );
        assert!(d.is_challenge_title("JUST A MOMENT"));
        assert!(!d.is_challenge_title("Arsenal vs. Chelsea Match Report"));
    }

    #[test]
    fn test_rate_limited() {
        assert_eq!(
            detector().classify("429 Too Many Requests", ""),
            PageVerdict::RateLimited
        );
    }

    #[test]
    fn test_short_and_unexpected_pages() {
        let d = detector();
        assert_eq!(d.classify("FBref", "<html></html>"), PageVerdict::TooShort(13));
        assert_eq!(d.classify("FBref", &padded("nothing here")), PageVerdict::Unexpected);
        assert_eq!(
            d.classify("Page Not Found (404 Error)", &padded("nothing here")),
            PageVerdict::NotFound
        );
    }

    #[test]
    fn test_match_page_is_ok() {
        let d = detector();
        assert_eq!(
            d.classify(
                "Arsenal vs. Wolves Match Report",
                &padded("<div class=\"scorebox\"></div>")
            ),
            PageVerdict::Ok
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_challenge_is_blocked_after_retries() {
        let page = ScriptedPage::new(None);
        let start = Instant::now();

        let result = patient_detector().await_clearance(&page, "https://fbref.com/x").await;

        assert!(matches!(result, Err(ScraperError::Blocked(_))));
        assert_eq!(page.reloads.load(Ordering::SeqCst), 3);
        assert!(page.captured.load(Ordering::SeqCst));
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(45) && waited < Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_challenge_that_clears_returns_markup() {
        let page = ScriptedPage::new(Some(1));
        let start = Instant::now();

        let markup = patient_detector()
            .await_clearance(&page, "https://fbref.com/x")
            .await
            .unwrap();

        assert!(markup.contains("scorebox"));
        assert_eq!(page.reloads.load(Ordering::SeqCst), 1);
        assert!(!page.captured.load(Ordering::SeqCst));
        assert!(start.elapsed() >= Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_page_is_blocked_without_waiting() {
        let page = ScriptedPage {
            title: "429 Too Many Requests",
            ..ScriptedPage::new(None)
        };
        let start = Instant::now();

        let result = patient_detector().await_clearance(&page, "https://fbref.com/x").await;

        assert!(matches!(result, Err(ScraperError::Blocked(_))));
        assert_eq!(page.reloads.load(Ordering::SeqCst), 0);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_signatures_are_configurable() {
        let config = ChallengeConfig {
            title_signatures: vec!["checking your browser".to_string()],
            ..ChallengeConfig::default()
        };
        let d = ChallengeDetector::new(config);
        assert_eq!(d.classify("Checking your browser", ""), PageVerdict::Challenge);
        assert_ne!(d.classify("Just a moment...", ""), PageVerdict::Challenge);
    }
}
