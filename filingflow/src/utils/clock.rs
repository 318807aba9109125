//! Sleep abstraction so retry backoff is testable without real time.

use async_trait::async_trait;
use std::time::Duration;

/// Sleeps between retry attempts.
///
/// The executor never holds a lock across a sleep; tests inject a
/// recording implementation to assert on backoff delays instantly.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Sleeps for the given duration.
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by the tokio timer.
#[derive(Debug, Clone, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
