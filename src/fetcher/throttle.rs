//! Global request pacing with exponential backoff.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};

use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, warn};

use crate::config::FetchPolicy;
use crate::error::ScraperError;

#[derive(Debug, Default)]
struct Pacing {
    last_done: Option<Instant>,
    penalty: Duration,
}

/// Spaces requests at least `min_interval` apart (measured from the end of the
/// previous request) and adds a growing penalty while the origin pushes back.
#[derive(Debug)]
pub struct Throttle {
    min_interval: Duration,
    jitter: Duration,
    backoff_initial: Duration,
    backoff_max: Duration,
    pacing: Mutex<Pacing>,
}

impl Throttle {
    pub fn new(policy: &FetchPolicy) -> Self {
        Self {
            min_interval: policy.min_interval,
            jitter: policy.jitter,
            backoff_initial: policy.backoff_initial,
            backoff_max: policy.backoff_max,
            pacing: Mutex::new(Pacing::default()),
        }
    }

    fn pacing(&self) -> MutexGuard<'_, Pacing> {
        self.pacing.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Delay still owed at `now`, without jitter.
    pub fn pending_delay(&self, now: Instant) -> Duration {
        let pacing = self.pacing();
        let spacing = match pacing.last_done {
            Some(done) => self.min_interval.saturating_sub(now.saturating_duration_since(done)),
            None => Duration::ZERO,
        };
        spacing + pacing.penalty
    }

    pub fn penalty(&self) -> Duration {
        self.pacing().penalty
    }

    /// Sleep until the next request may start.
    pub async fn wait(&self) {
        let mut delay = self.pending_delay(Instant::now());
        if self.pacing().last_done.is_some() && !self.jitter.is_zero() {
            delay += self.jitter.mul_f64(fastrand::f64());
        }
        if !delay.is_zero() {
            debug!("Throttle: sleeping {:?} (penalty {:?})", delay, self.penalty());
            sleep(delay).await;
        }
    }

    /// Mark the end of a request; spacing is measured from here.
    pub fn mark_done(&self) {
        self.pacing().last_done = Some(Instant::now());
    }

    pub fn record_success(&self) {
        self.pacing().penalty = Duration::ZERO;
    }

    /// Double the penalty (capped) after a block or timeout. Returns the new penalty.
    pub fn record_pressure(&self) -> Duration {
        let mut pacing = self.pacing();
        pacing.penalty = if pacing.penalty.is_zero() {
            self.backoff_initial
        } else {
            pacing.penalty.saturating_mul(2)
        }
        .min(self.backoff_max);
        pacing.penalty
    }

    /// Run one request under the throttle: wait for its slot, then settle the
    /// penalty from the outcome so the next request inherits any backoff.
    pub async fn run<T, F>(&self, request: F) -> Result<T, ScraperError>
    where
        F: Future<Output = Result<T, ScraperError>>,
    {
        self.wait().await;
        let result = request.await;
        self.mark_done();

        match &result {
            Ok(_) => self.record_success(),
            Err(e) if e.triggers_backoff() => {
                let penalty = self.record_pressure();
                warn!("{}; backing off {:?} before the next request", e, penalty);
            }
            Err(_) => {}
        }
        result
    }
}
