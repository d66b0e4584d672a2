use crate::domain::ports::Clock;
use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;

/// Production clock: wall time from chrono, waits on the tokio timer.
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
