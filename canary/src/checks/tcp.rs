//! TCP connectivity checker.

use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

use super::catalog::{kinds, TcpCheck};
use super::result::CheckResult;
use super::{evaluate_group, Checker};
use crate::crds::CanarySpec;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct TcpChecker;

impl TcpChecker {
    pub fn new() -> Self {
        Self
    }

    async fn check(&self, check: &TcpCheck) -> CheckResult {
        let start = Instant::now();
        let timeout = check
            .threshold_millis
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT);

        match tokio::time::timeout(timeout, TcpStream::connect(&check.endpoint)).await {
            Ok(Ok(_stream)) => {
                let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
                CheckResult::pass(check, start)
                    .with_detail(serde_json::json!({ "latencyMs": latency_ms }))
            }
            Ok(Err(err)) => {
                CheckResult::fail(check, format!("connect failed: {err}")).with_duration(start)
            }
            Err(_) => CheckResult::fail(check, format!("no connection within {timeout:?}"))
                .with_duration(start),
        }
    }
}

impl Default for TcpChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Checker for TcpChecker {
    fn kind(&self) -> &'static str {
        kinds::TCP
    }

    async fn run(&self, spec: &CanarySpec) -> Vec<CheckResult> {
        evaluate_group(&spec.tcp, |check| self.check(check)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::CheckStatus;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn passes_against_a_listening_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");

        let check = TcpCheck {
            endpoint: addr.to_string(),
            ..Default::default()
        };
        let result = TcpChecker::new().check(&check).await;
        assert_eq!(result.status, CheckStatus::Passed, "{}", result.message);
    }

    #[tokio::test]
    async fn fails_against_a_closed_port() {
        // Bind then drop to get a port with nothing listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let check = TcpCheck {
            endpoint: addr.to_string(),
            threshold_millis: Some(500),
            ..Default::default()
        };
        let result = TcpChecker::new().check(&check).await;
        assert_eq!(result.status, CheckStatus::Failed);
    }
}
