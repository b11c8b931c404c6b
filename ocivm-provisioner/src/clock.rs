use std::time::Duration;

use async_trait::async_trait;

/// Suspension point for the poll loop. Injected so tests can simulate
/// instantaneous state transitions instead of waiting out wall-clock delays.
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
