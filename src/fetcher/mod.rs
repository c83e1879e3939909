//! Rate-limited, challenge-aware page fetching.
//!
//! One [`BrowserFetcher`] wraps one browser session for the length of a job.
//! Requests are serialized through a [`Throttle`] and every response is
//! checked by the [`ChallengeDetector`] before it is handed back.

mod browser;
mod challenge;
mod throttle;

pub use browser::{BrowserFetcher, BrowserLauncher};
pub use challenge::{ChallengeDetector, PageVerdict};
pub use throttle::Throttle;
