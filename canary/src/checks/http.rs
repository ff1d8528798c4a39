//! HTTP endpoint checker.

use async_trait::async_trait;
use reqwest::Method;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::catalog::{kinds, Check, HttpCheck};
use super::result::CheckResult;
use super::{evaluate_group, Checker};
use crate::cluster::ClusterOps;
use crate::crds::CanarySpec;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpChecker {
    client: reqwest::Client,
    cluster: Arc<dyn ClusterOps>,
    /// Namespace for resolving credential references.
    resolve_namespace: String,
}

impl HttpChecker {
    pub fn new(
        client: reqwest::Client,
        cluster: Arc<dyn ClusterOps>,
        resolve_namespace: String,
    ) -> Self {
        Self {
            client,
            cluster,
            resolve_namespace,
        }
    }

    async fn check(&self, check: &HttpCheck) -> CheckResult {
        let start = Instant::now();

        let Some(endpoint) = check.endpoint.as_deref() else {
            // Namespace-crawl declarations are resolved by the TLS crawler,
            // not this checker.
            return CheckResult::invalid(check, "endpoint is required for direct http checks");
        };

        let method = match check.method().parse::<Method>() {
            Ok(method) => method,
            Err(_) => {
                return CheckResult::invalid(
                    check,
                    format!("unsupported http method {:?}", check.method()),
                )
            }
        };

        // thresholdMillis classifies latency; the transport bound stays fixed.
        let mut request = self
            .client
            .request(method, endpoint)
            .timeout(DEFAULT_REQUEST_TIMEOUT);

        if let Some(body) = &check.body {
            request = request.body(body.clone());
        }

        let namespace = check.namespace().unwrap_or(&self.resolve_namespace);
        for header in &check.headers {
            let Some(name) = header.name.as_deref() else {
                continue;
            };
            match self.cluster.resolve_value(namespace, header).await {
                Ok(value) => request = request.header(name, value),
                Err(err) => {
                    return CheckResult::invalid(
                        check,
                        format!("failed to resolve header {name}: {err}"),
                    )
                }
            }
        }

        if let Some(auth) = &check.authentication {
            let username = match self.cluster.resolve_value(namespace, &auth.username).await {
                Ok(username) => username,
                Err(err) => {
                    return CheckResult::invalid(check, format!("failed to resolve username: {err}"))
                }
            };
            let password = match self.cluster.resolve_value(namespace, &auth.password).await {
                Ok(password) => password,
                Err(err) => {
                    return CheckResult::invalid(check, format!("failed to resolve password: {err}"))
                }
            };
            request = request.basic_auth(username, Some(password));
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                return CheckResult::fail(check, format!("request failed: {err}"))
                    .with_duration(start)
            }
        };

        let status = response.status().as_u16();
        let status_ok = if check.response_codes.is_empty() {
            response.status().is_success()
        } else {
            check.response_codes.contains(&status)
        };
        if !status_ok {
            return CheckResult::fail(check, format!("unexpected response code {status}"))
                .with_duration(start);
        }

        if let Some(expected) = &check.response_content {
            let body = match response.text().await {
                Ok(body) => body,
                Err(err) => {
                    return CheckResult::fail(check, format!("failed to read body: {err}"))
                        .with_duration(start)
                }
            };
            if !body.contains(expected) {
                return CheckResult::fail(check, "expected content not found in response")
                    .with_duration(start);
            }
        }

        let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        if let Some(threshold) = check.threshold_millis {
            if elapsed_ms > threshold {
                return CheckResult::fail(
                    check,
                    format!("request took {elapsed_ms}ms, threshold is {threshold}ms"),
                )
                .with_duration(start);
            }
        }

        CheckResult::pass(check, start)
            .with_detail(serde_json::json!({ "responseCode": status, "latencyMs": elapsed_ms }))
    }
}

#[async_trait]
impl Checker for HttpChecker {
    fn kind(&self) -> &'static str {
        kinds::HTTP
    }

    async fn run(&self, spec: &CanarySpec) -> Vec<CheckResult> {
        evaluate_group(&spec.http, |check| self.check(check)).await
    }
}
