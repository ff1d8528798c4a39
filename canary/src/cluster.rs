//! Cluster control collaborator: the narrow surface of the Kubernetes API
//! the checkers need. Injected into checkers at construction so the same
//! evaluation code runs against the real cluster or a test double.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Pod, Secret};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, PostParams};
use kube::Client;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

use crate::checks::catalog::ValueSource;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("kubernetes api error: {0}")]
    Api(#[from] kube::Error),

    #[error("manifest error: {0}")]
    Manifest(String),

    #[error("could not resolve {reference}: {reason}")]
    Resolve { reference: String, reason: String },
}

/// Operations the checkers perform against the cluster. Implementations must
/// be safe to share across concurrently running evaluations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterOps: Send + Sync {
    async fn create_namespace(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
        annotations: &BTreeMap<String, String>,
    ) -> Result<(), ClusterError>;

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<(), ClusterError>;

    /// Whether the pod has been placed onto a node.
    async fn pod_scheduled(&self, namespace: &str, name: &str) -> Result<bool, ClusterError>;

    /// Whether the pod's readiness condition is satisfied.
    async fn pod_ready(&self, namespace: &str, name: &str) -> Result<bool, ClusterError>;

    async fn pod_ip(&self, namespace: &str, name: &str) -> Result<Option<String>, ClusterError>;

    /// Whether the named ingress exists and is resolvable.
    async fn ingress_ready(&self, namespace: &str, name: &str) -> Result<bool, ClusterError>;

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;

    async fn delete_namespace(&self, name: &str) -> Result<(), ClusterError>;

    /// Reveal a declared value, reading the referenced secret or configmap
    /// key when the value is not inlined.
    async fn resolve_value(
        &self,
        namespace: &str,
        source: &ValueSource,
    ) -> Result<String, ClusterError>;
}

/// Production implementation backed by a shared `kube::Client`.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, ClusterError> {
        Ok(self.pods(namespace).get(name).await?)
    }
}

fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(response) if response.code == 404)
}

fn condition_true(pod: &Pod, condition_type: &str) -> bool {
    pod.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|condition| condition.type_ == condition_type && condition.status == "True")
        })
}

#[async_trait]
impl ClusterOps for KubeCluster {
    async fn create_namespace(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
        annotations: &BTreeMap<String, String>,
    ) -> Result<(), ClusterError> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(labels.clone()).filter(|labels| !labels.is_empty()),
                annotations: Some(annotations.clone()).filter(|annotations| !annotations.is_empty()),
                ..Default::default()
            },
            ..Default::default()
        };
        namespaces
            .create(&PostParams::default(), &namespace)
            .await?;
        debug!(namespace = name, "created namespace");
        Ok(())
    }

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<(), ClusterError> {
        self.pods(namespace)
            .create(&PostParams::default(), pod)
            .await?;
        Ok(())
    }

    async fn pod_scheduled(&self, namespace: &str, name: &str) -> Result<bool, ClusterError> {
        let pod = self.get_pod(namespace, name).await?;
        let placed = pod
            .spec
            .as_ref()
            .is_some_and(|spec| spec.node_name.is_some());
        Ok(placed || condition_true(&pod, "PodScheduled"))
    }

    async fn pod_ready(&self, namespace: &str, name: &str) -> Result<bool, ClusterError> {
        let pod = self.get_pod(namespace, name).await?;
        Ok(condition_true(&pod, "Ready"))
    }

    async fn pod_ip(&self, namespace: &str, name: &str) -> Result<Option<String>, ClusterError> {
        let pod = self.get_pod(namespace, name).await?;
        Ok(pod.status.and_then(|status| status.pod_ip))
    }

    async fn ingress_ready(&self, namespace: &str, name: &str) -> Result<bool, ClusterError> {
        let ingresses: Api<Ingress> = Api::namespaced(self.client.clone(), namespace);
        match ingresses.get(name).await {
            Ok(_) => Ok(true),
            Err(err) if is_not_found(&err) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        match self
            .pods(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            // Already gone counts as deleted.
            Err(err) if is_not_found(&err) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), ClusterError> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        match namespaces.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(err) if is_not_found(&err) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn resolve_value(
        &self,
        namespace: &str,
        source: &ValueSource,
    ) -> Result<String, ClusterError> {
        if let Some(value) = &source.value {
            return Ok(value.clone());
        }

        if let Some(secret_ref) = &source.secret_key_ref {
            let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
            let secret = secrets.get(&secret_ref.name).await?;
            let bytes = secret
                .data
                .as_ref()
                .and_then(|data| data.get(&secret_ref.key))
                .ok_or_else(|| ClusterError::Resolve {
                    reference: format!("secret {}/{}", secret_ref.name, secret_ref.key),
                    reason: "key not present".to_string(),
                })?;
            return String::from_utf8(bytes.0.clone()).map_err(|_| ClusterError::Resolve {
                reference: format!("secret {}/{}", secret_ref.name, secret_ref.key),
                reason: "value is not valid utf-8".to_string(),
            });
        }

        if let Some(configmap_ref) = &source.config_map_key_ref {
            let configmaps: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
            let configmap = configmaps.get(&configmap_ref.name).await?;
            return configmap
                .data
                .as_ref()
                .and_then(|data| data.get(&configmap_ref.key))
                .cloned()
                .ok_or_else(|| ClusterError::Resolve {
                    reference: format!("configmap {}/{}", configmap_ref.name, configmap_ref.key),
                    reason: "key not present".to_string(),
                });
        }

        Err(ClusterError::Resolve {
            reference: source.display_name().to_string(),
            reason: "no value, secretKeyRef or configMapKeyRef declared".to_string(),
        })
    }
}
