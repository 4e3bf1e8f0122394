//! Health predicates and the polling loop that waits on them.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

/// A zero-argument readiness predicate, invoked repeatedly while a server
/// starts up.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn check(&self) -> bool;
}

/// Healthy when a GET on the URL answers with HTTP 200.
pub struct HttpHealthCheck {
    url: String,
    client: reqwest::Client,
}

impl HttpHealthCheck {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(1))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            url: url.into(),
            client,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl HealthCheck for HttpHealthCheck {
    async fn check(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(response) => {
                debug!("Health check {} -> {}", self.url, response.status());
                response.status() == reqwest::StatusCode::OK
            }
            Err(e) => {
                debug!("Health check {} failed: {}", self.url, e);
                false
            }
        }
    }
}

/// Health check backed by a closure.
pub struct FnHealthCheck<F>(pub F);

#[async_trait]
impl<F> HealthCheck for FnHealthCheck<F>
where
    F: Fn() -> bool + Send + Sync,
{
    async fn check(&self) -> bool {
        (self.0)()
    }
}

/// Poll `check` every `interval` until it returns true or `timeout` elapses.
///
/// The predicate is always consulted at least once.
pub async fn wait_until_healthy(check: &dyn HealthCheck, timeout: Duration, interval: Duration) -> bool {
    let start = Instant::now();
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        if check.check().await {
            debug!("Healthy after {} attempt(s)", attempts);
            return true;
        }
        if start.elapsed() >= timeout {
            debug!("Not healthy after {} attempt(s) in {:?}", attempts, timeout);
            return false;
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_wait_until_healthy_eventually_true() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let check = FnHealthCheck(move || counter.fetch_add(1, Ordering::SeqCst) >= 2);

        let healthy = wait_until_healthy(&check, Duration::from_secs(2), Duration::from_millis(5)).await;

        assert!(healthy);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_wait_until_healthy_times_out() {
        let check = FnHealthCheck(|| false);

        let healthy = wait_until_healthy(&check, Duration::from_millis(30), Duration::from_millis(5)).await;

        assert!(!healthy);
    }

    #[tokio::test]
    async fn test_http_health_check_unreachable() {
        // Port 9 (discard) is almost never served over HTTP.
        let check = HttpHealthCheck::new("http://127.0.0.1:9/api/health");
        assert!(!check.check().await);
        assert_eq!(check.url(), "http://127.0.0.1:9/api/health");
    }
}
