//! Check execution core: the catalog of declarable kinds, the per-kind
//! checkers, and the dispatch engine that routes a declared batch to them.

use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

pub mod catalog;
pub mod http;
pub mod jmeter;
pub mod namespace;
pub mod pod;
pub mod result;
pub mod tcp;
pub mod workload;

pub use catalog::Check;
pub use result::{CheckResult, CheckStatus};

use crate::cluster::ClusterOps;
use crate::config::EngineConfig;
use crate::crds::CanarySpec;
use crate::exec::ProcessRunner;

/// Kind-specific executor. One `run` call evaluates every declared instance
/// of its kind, in declaration order, producing one result per instance.
///
/// Checkers must tolerate concurrent invocation for different check
/// instances; any state they hold is shared collaborators, never
/// per-evaluation scratch.
#[async_trait]
pub trait Checker: Send + Sync {
    fn kind(&self) -> &'static str;

    async fn run(&self, spec: &CanarySpec) -> Vec<CheckResult>;
}

/// Validates and evaluates each instance of one kind's group in order.
/// A declaration that fails validation yields an `invalid` result and is
/// never handed to the evaluator.
pub(crate) async fn evaluate_group<'a, T, F, Fut>(checks: &'a [T], evaluate: F) -> Vec<CheckResult>
where
    T: Check,
    F: Fn(&'a T) -> Fut,
    Fut: std::future::Future<Output = CheckResult> + 'a,
{
    let mut results = Vec::with_capacity(checks.len());
    for check in checks {
        if let Err(reason) = check.validate() {
            results.push(CheckResult::invalid(check, reason));
            continue;
        }
        results.push(evaluate(check).await);
    }
    results
}

/// Static kind-to-checker table, built once at startup and read-only
/// afterwards.
pub struct Registry {
    checkers: HashMap<&'static str, Box<dyn Checker>>,
}

impl Registry {
    /// Build the registry with every checker this engine ships.
    pub fn new(
        cluster: Arc<dyn ClusterOps>,
        runner: Arc<dyn ProcessRunner>,
        config: &EngineConfig,
    ) -> Self {
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .unwrap_or_default();

        Self::with_checkers(vec![
            Box::new(http::HttpChecker::new(
                http_client.clone(),
                cluster.clone(),
                config.namespace.clone(),
            )),
            Box::new(tcp::TcpChecker::new()),
            Box::new(pod::PodChecker::new(cluster.clone(), http_client.clone())),
            Box::new(namespace::NamespaceChecker::new(cluster.clone(), http_client)),
            Box::new(jmeter::JmeterChecker::new(cluster, runner, config)),
        ])
    }

    /// Build from an explicit checker list. Later entries for the same kind
    /// replace earlier ones.
    pub fn with_checkers(checkers: Vec<Box<dyn Checker>>) -> Self {
        let mut table: HashMap<&'static str, Box<dyn Checker>> = HashMap::new();
        for checker in checkers {
            table.insert(checker.kind(), checker);
        }
        Self { checkers: table }
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.checkers.keys().copied().collect()
    }

    /// Evaluate every declared check once and collect the results.
    ///
    /// Kind groups run concurrently; within one group, instance order is
    /// preserved. A declared kind with no registered checker produces one
    /// `invalid` result per instance and never disturbs the other groups.
    pub async fn dispatch(&self, spec: &CanarySpec) -> Vec<CheckResult> {
        let groups = spec.declared();
        info!(
            kinds = groups.len(),
            checks = spec.check_count(),
            "dispatching check batch"
        );

        let group_runs = groups.into_iter().map(|(kind, checks)| async move {
            match self.checkers.get(kind) {
                Some(checker) => checker.run(spec).await,
                None => {
                    warn!(kind, "no checker registered for declared kind");
                    checks
                        .iter()
                        .map(|check| {
                            CheckResult::invalid(
                                *check,
                                format!("no checker registered for kind {kind:?}"),
                            )
                        })
                        .collect()
                }
            }
        });

        join_all(group_runs).await.into_iter().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::catalog::{kinds, TcpCheck};
    use crate::crds::CanarySpec;
    use std::time::Instant;

    /// Marks every tcp instance passed, preserving order.
    struct StubTcpChecker;

    #[async_trait]
    impl Checker for StubTcpChecker {
        fn kind(&self) -> &'static str {
            kinds::TCP
        }

        async fn run(&self, spec: &CanarySpec) -> Vec<CheckResult> {
            evaluate_group(&spec.tcp, |check| async {
                CheckResult::pass(check, Instant::now())
            })
            .await
        }
    }

    fn spec_with_tcp(endpoints: &[&str]) -> CanarySpec {
        CanarySpec {
            tcp: endpoints
                .iter()
                .map(|endpoint| TcpCheck {
                    endpoint: (*endpoint).to_string(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn unregistered_kind_yields_invalid_without_blocking_others() {
        let registry = Registry::with_checkers(vec![Box::new(StubTcpChecker)]);

        let mut spec = spec_with_tcp(&["a:1", "b:2", "c:3"]);
        spec.redis = vec![crate::checks::catalog::RedisCheck {
            addr: "cache:6379".to_string(),
            ..Default::default()
        }];

        let results = registry.dispatch(&spec).await;
        assert_eq!(results.len(), 4);

        let invalid: Vec<_> = results
            .iter()
            .filter(|result| result.status == CheckStatus::Invalid)
            .collect();
        assert_eq!(invalid.len(), 1);
        assert_eq!(invalid[0].check.kind, "redis");
        assert!(invalid[0].message.contains("no checker registered"));

        let passed = results
            .iter()
            .filter(|result| result.status == CheckStatus::Passed)
            .count();
        assert_eq!(passed, 3);
    }

    #[tokio::test]
    async fn order_within_a_kind_is_preserved() {
        let registry = Registry::with_checkers(vec![Box::new(StubTcpChecker)]);
        let spec = spec_with_tcp(&["first:1", "second:2", "third:3"]);

        let results = registry.dispatch(&spec).await;
        let endpoints: Vec<_> = results
            .iter()
            .map(|result| result.check.endpoint.as_str())
            .collect();
        assert_eq!(endpoints, vec!["first:1", "second:2", "third:3"]);
    }

    #[tokio::test]
    async fn failed_validation_becomes_invalid_not_a_crash() {
        let registry = Registry::with_checkers(vec![Box::new(StubTcpChecker)]);
        // An empty endpoint fails TcpCheck validation.
        let spec = spec_with_tcp(&["good:1", ""]);

        let results = registry.dispatch(&spec).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].status, CheckStatus::Passed);
        assert_eq!(results[1].status, CheckStatus::Invalid);
    }
}
