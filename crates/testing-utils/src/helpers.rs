//! Async helpers for tests

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};

pub struct TestEnv;

impl TestEnv {
    /// Poll `condition` until it holds or `timeout` elapses
    pub async fn wait_for<F, Fut>(mut condition: F, timeout: Duration) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition().await {
                return true;
            }
            sleep(Duration::from_millis(20)).await;
        }
        condition().await
    }
}
