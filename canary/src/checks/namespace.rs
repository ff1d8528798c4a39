//! Namespace lifecycle checker. Identical lifecycle to the pod kind except
//! the workload gets a namespace of its own, created first and deleted last.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use super::catalog::{kinds, NamespaceCheck};
use super::result::CheckResult;
use super::workload::{
    outcome_to_result, Budgets, NamespaceManifest, ProbeSpec, WorkloadEngine, WorkloadSpec,
};
use super::{evaluate_group, Checker};
use crate::cluster::ClusterOps;
use crate::crds::CanarySpec;

const DEFAULT_NAMESPACE_PREFIX: &str = "canary-check-";

pub struct NamespaceChecker {
    cluster: Arc<dyn ClusterOps>,
    http: reqwest::Client,
}

impl NamespaceChecker {
    pub fn new(cluster: Arc<dyn ClusterOps>, http: reqwest::Client) -> Self {
        Self { cluster, http }
    }

    async fn check(&self, check: &NamespaceCheck) -> CheckResult {
        let start = Instant::now();

        let mut pod: Pod = match serde_yaml::from_str(&check.pod_spec) {
            Ok(pod) => pod,
            Err(err) => return CheckResult::invalid(check, format!("invalid podSpec: {err}")),
        };
        let Some(pod_name) = pod.metadata.name.clone() else {
            return CheckResult::invalid(check, "podSpec must set metadata.name");
        };

        let namespace = generated_namespace_name(check.namespace_name_prefix.as_deref());
        pod.metadata.namespace = Some(namespace.clone());

        let workload = WorkloadSpec {
            namespace: namespace.clone(),
            create_namespace: Some(NamespaceManifest {
                name: namespace,
                labels: check.namespace_labels.clone(),
                annotations: check.namespace_annotations.clone(),
            }),
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

/// Unique per evaluation so concurrent runs of the same declaration never
/// collide in the cluster.
fn generated_namespace_name(prefix: Option<&str>) -> String {
    let prefix = prefix
        .filter(|prefix| !prefix.is_empty())
        .unwrap_or(DEFAULT_NAMESPACE_PREFIX);
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{prefix}{}", &suffix[..8])
}

#[async_trait]
impl Checker for NamespaceChecker {
    fn kind(&self) -> &'static str {
        kinds::NAMESPACE
    }

    async fn run(&self, spec: &CanarySpec) -> Vec<CheckResult> {
        evaluate_group(&spec.namespace, |check| self.check(check)).await
    }
}
