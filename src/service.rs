use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tower::Service;
use tracing::info;

use crate::error::ScraperError;
use crate::job::{JobId, JobStatus};
use crate::orchestrator::{Orchestrator, ReparseSummary, ScrapeRequest};
use crate::traits::SaveOutcome;
use crate::types::ParsedMatch;

/// Control requests
#[derive(Debug, Clone)]
pub enum ControlRequest {
    Start(ScrapeRequest),
    Stop,
    Status,
    /// Manually supplied page markup.
    Parse { url: String, markup: String },
    ReparseCache,
}

#[derive(Debug, Clone)]
pub enum ControlResponse {
    Started(JobId),
    /// Whether a running job was asked to stop.
    Stopping(bool),
    Status(JobStatus),
    Parsed {
        parsed: Box<ParsedMatch>,
        outcome: SaveOutcome,
    },
    Reparsed(ReparseSummary),
}

/// Scraper control surface as a tower::Service
#[derive(Clone)]
pub struct ScraperService {
    orchestrator: Orchestrator,
}

impl ScraperService {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }
}

impl Service<ControlRequest> for ScraperService {
    type Response = ControlResponse;
    type Error = ScraperError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ControlRequest) -> Self::Future {
        let orchestrator = self.orchestrator.clone();

        Box::pin(async move {
            match req {
                ControlRequest::Start(request) => {
                    info!("Start request: {:?}", request.target);
                    orchestrator.start_scrape(request).map(ControlResponse::Started)
                }
                ControlRequest::Stop => Ok(ControlResponse::Stopping(orchestrator.stop_scrape())),
                ControlRequest::Status => Ok(ControlResponse::Status(orchestrator.status())),
                ControlRequest::Parse { url, markup } => {
                    info!("Parse request: {}", url);
                    let (parsed, outcome) = orchestrator.parse_manual(&url, &markup).await?;
                    Ok(ControlResponse::Parsed {
                        parsed: Box::new(parsed),
                        outcome,
                    })
                }
                ControlRequest::ReparseCache => {
                    info!("Re-parse request");
                    orchestrator.reparse_cache().await.map(ControlResponse::Reparsed)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::unique_temp_dir;
    use crate::config::ScraperConfig;
    use crate::job::JobState;
    use crate::store::MemoryStore;
    use crate::traits::{FetcherLauncher, PageFetcher};
    use async_trait::async_trait;
    use std::sync::Arc;
    use tower::ServiceExt;

    struct NoBrowser;

    #[async_trait]
    impl FetcherLauncher for NoBrowser {
        async fn launch(&self) -> Result<Box<dyn PageFetcher>, ScraperError> {
            Err(ScraperError::BrowserInit("no browser in tests".to_string()))
        }
    }

    const PAGE: &str = r#"<html><body><div class="scorebox">
        <div id="sb_team_0"><strong>Celtic</strong><div class="score">2</div></div>
        <div id="sb_team_1"><strong>Rangers</strong><div class="score">1</div></div>
        </div></body></html>"#;

    fn service(name: &str) -> ScraperService {
        let config = ScraperConfig::new(unique_temp_dir(name));
        ScraperService::new(Orchestrator::new(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(NoBrowser),
        ))
    }

    #[tokio::test]
    async fn test_status_when_idle() {
        let svc = service("svc-idle");
        match svc.oneshot(ControlRequest::Status).await.unwrap() {
            ControlResponse::Status(status) => {
                assert_eq!(status.state, JobState::Idle);
                assert_eq!(status.job_id, None);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stop_without_job() {
        let svc = service("svc-stop");
        assert!(matches!(
            svc.oneshot(ControlRequest::Stop).await.unwrap(),
            ControlResponse::Stopping(false)
        ));
    }

    #[tokio::test]
    async fn test_parse_then_reparse() {
        let mut svc = service("svc-parse");
        let url = "https://fbref.com/en/matches/0c1d/Celtic-Rangers".to_string();

        let response = svc
            .ready()
            .await
            .unwrap()
            .call(ControlRequest::Parse {
                url: url.clone(),
                markup: PAGE.to_string(),
            })
            .await
            .unwrap();
        match response {
            ControlResponse::Parsed { parsed, outcome } => {
                assert_eq!(parsed.record.headline(), "Celtic 2-1 Rangers");
                assert_eq!(outcome, SaveOutcome::Saved);
            }
            other => panic!("unexpected: {:?}", other),
        }

        match svc.call(ControlRequest::ReparseCache).await.unwrap() {
            ControlResponse::Reparsed(summary) => {
                assert_eq!(summary.total, 1);
                assert_eq!(summary.unchanged, 1);
            }
            other => panic!("unexpected: {:?}", other),
        }

        let _ = std::fs::remove_dir_all(&svc.orchestrator().config().data_dir);
    }

    #[tokio::test]
    async fn test_start_with_failing_browser_marks_url_error() {
        let svc = service("svc-start");
        let url = "https://fbref.com/en/matches/beef/A-B".to_string();

        let response = svc
            .clone()
            .oneshot(ControlRequest::Start(ScrapeRequest::urls([url.clone()])))
            .await
            .unwrap();
        assert!(matches!(response, ControlResponse::Started(_)));

        let status = svc.orchestrator().wait().await;
        assert_eq!(status.state, JobState::Completed);
        assert!(matches!(status.status_of(&url), Some(crate::job::UrlStatus::Error(_))));
    }
}
