//! Pod lifecycle checker: schedule the declared manifest, probe it, delete it.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use std::sync::Arc;
use std::time::Instant;

use super::catalog::{kinds, Check, PodCheck};
use super::result::CheckResult;
use super::workload::{outcome_to_result, Budgets, ProbeSpec, WorkloadEngine, WorkloadSpec};
use super::{evaluate_group, Checker};
use crate::cluster::ClusterOps;
use crate::crds::CanarySpec;

pub struct PodChecker {
    cluster: Arc<dyn ClusterOps>,
    http: reqwest::Client,
}

impl PodChecker {
    pub fn new(cluster: Arc<dyn ClusterOps>, http: reqwest::Client) -> Self {
        Self { cluster, http }
    }

    async fn check(&self, check: &PodCheck) -> CheckResult {
        let start = Instant::now();

        let mut pod: Pod = match serde_yaml::from_str(&check.spec) {
            Ok(pod) => pod,
            Err(err) => return CheckResult::invalid(check, format!("invalid pod manifest: {err}")),
        };
        let Some(pod_name) = pod.metadata.name.clone() else {
            return CheckResult::invalid(check, "pod manifest must set metadata.name");
        };

        let namespace = check.namespace().unwrap_or("default").to_string();
        // The declared namespace wins over whatever the manifest carries.
        pod.metadata.namespace = Some(namespace.clone());

        let workload = WorkloadSpec {
            namespace,
            create_namespace: None,
            pod,
            pod_name,
            probe: ProbeSpec::from_declared(&check.probe),
            budgets: Budgets::resolve(&check.timeouts),
        };

        let engine = WorkloadEngine::new(self.cluster.as_ref(), &self.http);
        let outcome = engine.evaluate(&workload).await;
        outcome_to_result(check, start, outcome)
    }
}

#[async_trait]
impl Checker for PodChecker {
    fn kind(&self) -> &'static str {
        kinds::POD
    }

    async fn run(&self, spec: &CanarySpec) -> Vec<CheckResult> {
        evaluate_group(&spec.pod, |check| self.check(check)).await
    }
}
