//! Ephemeral workload lifecycle engine.
//!
//! One engine instance walks one short-lived pod through
//! submit -> scheduled -> ready -> ingress -> probing, each phase bounded by
//! its own timeout, all of them bounded by one overall deadline, and tears
//! the workload down no matter how any phase ended. The workload never
//! outlives the evaluation that created it.

use k8s_openapi::api::core::v1::Pod;
use serde_json::json;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, warn};

use super::catalog::{Check, WorkloadProbe, WorkloadTimeouts};
use super::result::CheckResult;
use crate::cluster::{ClusterError, ClusterOps};

pub const DEFAULT_SCHEDULE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_INGRESS_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_DELETE_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(60);
pub const DEFAULT_HTTP_RETRY_INTERVAL: Duration = Duration::from_millis(200);

/// How often cluster state is re-read while waiting on a phase.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Per-phase budgets with the declared zero values replaced by the kind's
/// documented defaults. A zero timeout never means "no timeout".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budgets {
    pub schedule: Duration,
    pub ready: Duration,
    pub http: Duration,
    pub ingress: Duration,
    pub delete: Duration,
    pub deadline: Duration,
    pub http_retry_interval: Duration,
}

impl Budgets {
    pub fn resolve(timeouts: &WorkloadTimeouts) -> Self {
        Self {
            schedule: or_default(timeouts.schedule_timeout, DEFAULT_SCHEDULE_TIMEOUT),
            ready: or_default(timeouts.ready_timeout, DEFAULT_READY_TIMEOUT),
            http: or_default(timeouts.http_timeout, DEFAULT_HTTP_TIMEOUT),
            ingress: or_default(timeouts.ingress_timeout, DEFAULT_INGRESS_TIMEOUT),
            delete: or_default(timeouts.delete_timeout, DEFAULT_DELETE_TIMEOUT),
            deadline: or_default(timeouts.deadline, DEFAULT_DEADLINE),
            http_retry_interval: or_default(
                timeouts.http_retry_interval,
                DEFAULT_HTTP_RETRY_INTERVAL,
            ),
        }
    }
}

fn or_default(millis: u64, default: Duration) -> Duration {
    if millis == 0 {
        default
    } else {
        Duration::from_millis(millis)
    }
}

/// Lifecycle phases, in execution order. `DeadlineExceeded` is not a phase
/// of its own but the tag used when the overall deadline fires mid-phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Submit,
    Schedule,
    Ready,
    Ingress,
    Http,
    DeadlineExceeded,
}

impl Phase {
    pub fn tag(self) -> &'static str {
        match self {
            Phase::Submit => "submit",
            Phase::Schedule => "schedule",
            Phase::Ready => "ready",
            Phase::Ingress => "ingress",
            Phase::Http => "http",
            Phase::DeadlineExceeded => "deadline-exceeded",
        }
    }
}

/// Namespace created for the workload, deleted with it.
#[derive(Debug, Clone, Default)]
pub struct NamespaceManifest {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

/// HTTP expectations for the probing phase.
#[derive(Debug, Clone, Default)]
pub struct ProbeSpec {
    pub port: u16,
    pub path: String,
    pub ingress_name: Option<String>,
    pub ingress_host: Option<String>,
    pub expected_statuses: Vec<u16>,
    pub expected_content: Option<String>,
}

impl ProbeSpec {
    pub fn from_declared(probe: &WorkloadProbe) -> Self {
        Self {
            port: probe.port.unwrap_or(80),
            path: probe.path.clone().unwrap_or_default(),
            ingress_name: probe.ingress_name.clone(),
            ingress_host: probe.ingress_host.clone(),
            expected_statuses: probe.expected_http_statuses.clone(),
            expected_content: probe.expected_content.clone(),
        }
    }
}

/// Everything one evaluation needs: the manifest to submit, where to submit
/// it, what to probe, and how long each step may take.
pub struct WorkloadSpec {
    pub namespace: String,
    pub create_namespace: Option<NamespaceManifest>,
    pub pod: Pod,
    pub pod_name: String,
    pub probe: ProbeSpec,
    pub budgets: Budgets,
}

/// Terminal state of one evaluation. `failure` is `None` on a clean pass;
/// `cleanup_error` is carried separately so a teardown failure never
/// overturns the verdict and is never silently dropped.
#[derive(Debug)]
pub struct WorkloadOutcome {
    pub failure: Option<(Phase, String)>,
    pub cleanup_error: Option<String>,
    pub phase_timings_ms: Vec<(&'static str, u64)>,
}

impl WorkloadOutcome {
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }

    pub fn detail(&self) -> serde_json::Value {
        let timings: serde_json::Map<String, serde_json::Value> = self
            .phase_timings_ms
            .iter()
            .map(|(tag, ms)| ((*tag).to_string(), json!(ms)))
            .collect();
        json!({
            "phaseTimingsMs": timings,
            "failedPhase": self.failure.as_ref().map(|(phase, _)| phase.tag()),
        })
    }
}

/// Instantiated once per check evaluation, never shared across evaluations.
pub struct WorkloadEngine<'a> {
    cluster: &'a dyn ClusterOps,
    http: &'a reqwest::Client,
}

impl<'a> WorkloadEngine<'a> {
    pub fn new(cluster: &'a dyn ClusterOps, http: &'a reqwest::Client) -> Self {
        Self { cluster, http }
    }

    /// Run the full lifecycle. Teardown is attempted exactly once on every
    /// path, including a failed submit and an expired deadline.
    pub async fn evaluate(&self, spec: &WorkloadSpec) -> WorkloadOutcome {
        let deadline_at = Instant::now() + spec.budgets.deadline;
        let mut timings = Vec::new();

        let failure = self
            .run_phases(spec, deadline_at, &mut timings)
            .await
            .err();
        if let Some((phase, reason)) = &failure {
            debug!(phase = phase.tag(), reason = %reason, "workload phases ended in failure");
        }

        let cleanup_error = self.teardown(spec).await.err();
        if let Some(error) = &cleanup_error {
            warn!(pod = %spec.pod_name, error = %error, "workload teardown failed");
        }

        WorkloadOutcome {
            failure,
            cleanup_error,
            phase_timings_ms: timings,
        }
    }

    async fn run_phases(
        &self,
        spec: &WorkloadSpec,
        deadline_at: Instant,
        timings: &mut Vec<(&'static str, u64)>,
    ) -> Result<(), (Phase, String)> {
        let submit_started = Instant::now();
        if let Some(manifest) = &spec.create_namespace {
            self.cluster
                .create_namespace(&manifest.name, &manifest.labels, &manifest.annotations)
                .await
                .map_err(|err| {
                    (
                        Phase::Submit,
                        format!("failed to create namespace {}: {err}", manifest.name),
                    )
                })?;
        }
        self.cluster
            .create_pod(&spec.namespace, &spec.pod)
            .await
            .map_err(|err| {
                (
                    Phase::Submit,
                    format!("failed to create pod {}: {err}", spec.pod_name),
                )
            })?;
        timings.push((Phase::Submit.tag(), elapsed_ms(submit_started)));

        let phase_started = Instant::now();
        self.wait_until(Phase::Schedule, spec.budgets.schedule, deadline_at, || {
            self.cluster.pod_scheduled(&spec.namespace, &spec.pod_name)
        })
        .await?;
        timings.push((Phase::Schedule.tag(), elapsed_ms(phase_started)));

        let phase_started = Instant::now();
        self.wait_until(Phase::Ready, spec.budgets.ready, deadline_at, || {
            self.cluster.pod_ready(&spec.namespace, &spec.pod_name)
        })
        .await?;
        timings.push((Phase::Ready.tag(), elapsed_ms(phase_started)));

        if let Some(ingress_name) = spec.probe.ingress_name.as_deref() {
            let phase_started = Instant::now();
            self.wait_until(Phase::Ingress, spec.budgets.ingress, deadline_at, || {
                self.cluster.ingress_ready(&spec.namespace, ingress_name)
            })
            .await?;
            timings.push((Phase::Ingress.tag(), elapsed_ms(phase_started)));
        }

        let phase_started = Instant::now();
        self.probe(spec, deadline_at).await?;
        timings.push((Phase::Http.tag(), elapsed_ms(phase_started)));

        Ok(())
    }

    /// Poll until `poll` reports true. The overall deadline is checked before
    /// the phase budget at every step so a simultaneous expiry is always
    /// tagged `deadline-exceeded`.
    async fn wait_until<F, Fut>(
        &self,
        phase: Phase,
        budget: Duration,
        deadline_at: Instant,
        mut poll: F,
    ) -> Result<(), (Phase, String)>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, ClusterError>>,
    {
        let phase_deadline = Instant::now() + budget;
        loop {
            if Instant::now() >= deadline_at {
                return Err((
                    Phase::DeadlineExceeded,
                    format!("deadline reached while waiting for {}", phase.tag()),
                ));
            }

            match poll().await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                // Transient read failures are retried until the budget runs out.
                Err(err) => warn!(phase = phase.tag(), error = %err, "cluster poll failed"),
            }

            if Instant::now() >= deadline_at {
                return Err((
                    Phase::DeadlineExceeded,
                    format!("deadline reached while waiting for {}", phase.tag()),
                ));
            }
            if Instant::now() >= phase_deadline {
                return Err((
                    phase,
                    format!("{} not reached within {:?}", phase.tag(), budget),
                ));
            }

            let remaining = phase_deadline
                .min(deadline_at)
                .saturating_duration_since(Instant::now());
            sleep(POLL_INTERVAL.min(remaining)).await;
        }
    }

    async fn probe(&self, spec: &WorkloadSpec, deadline_at: Instant) -> Result<(), (Phase, String)> {
        let url = self.probe_url(spec).await?;
        debug!(%url, "probing workload over http");

        let http_deadline = Instant::now() + spec.budgets.http;
        let mut last_failure = "no probe attempt completed".to_string();
        loop {
            if Instant::now() >= deadline_at {
                return Err((
                    Phase::DeadlineExceeded,
                    format!("deadline reached while probing: {last_failure}"),
                ));
            }

            match self.attempt(&url, spec).await {
                Ok(()) => return Ok(()),
                Err(reason) => last_failure = reason,
            }

            if Instant::now() >= deadline_at {
                return Err((
                    Phase::DeadlineExceeded,
                    format!("deadline reached while probing: {last_failure}"),
                ));
            }
            if Instant::now() >= http_deadline {
                return Err((
                    Phase::Http,
                    format!(
                        "no matching response within {:?}: {last_failure}",
                        spec.budgets.http
                    ),
                ));
            }

            let remaining = http_deadline
                .min(deadline_at)
                .saturating_duration_since(Instant::now());
            sleep(spec.budgets.http_retry_interval.min(remaining)).await;
        }
    }

    async fn probe_url(&self, spec: &WorkloadSpec) -> Result<String, (Phase, String)> {
        let path = normalize_path(&spec.probe.path);
        if let Some(host) = spec.probe.ingress_host.as_deref() {
            return Ok(format!("http://{host}{path}"));
        }
        let ip = self
            .cluster
            .pod_ip(&spec.namespace, &spec.pod_name)
            .await
            .map_err(|err| (Phase::Http, format!("failed to read pod ip: {err}")))?
            .ok_or_else(|| (Phase::Http, "pod has no ip assigned".to_string()))?;
        Ok(format!("http://{ip}:{}{path}", spec.probe.port))
    }

    async fn attempt(&self, url: &str, spec: &WorkloadSpec) -> Result<(), String> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| format!("request failed: {err}"))?;

        let status = response.status().as_u16();
        let status_ok = if spec.probe.expected_statuses.is_empty() {
            response.status().is_success()
        } else {
            spec.probe.expected_statuses.contains(&status)
        };
        if !status_ok {
            return Err(format!("unexpected response code {status}"));
        }

        if let Some(expected) = &spec.probe.expected_content {
            let body = response
                .text()
                .await
                .map_err(|err| format!("failed to read body: {err}"))?;
            if !body.contains(expected) {
                return Err("expected content not found in response".to_string());
            }
        }

        Ok(())
    }

    /// Delete the workload and, when one was created, its namespace. Bounded
    /// by the delete budget; a failure here is reported, not swallowed.
    async fn teardown(&self, spec: &WorkloadSpec) -> Result<(), String> {
        let deletes = async {
            let mut errors = Vec::new();
            if let Err(err) = self
                .cluster
                .delete_pod(&spec.namespace, &spec.pod_name)
                .await
            {
                errors.push(format!("pod {}: {err}", spec.pod_name));
            }
            if let Some(manifest) = &spec.create_namespace {
                if let Err(err) = self.cluster.delete_namespace(&manifest.name).await {
                    errors.push(format!("namespace {}: {err}", manifest.name));
                }
            }
            errors
        };

        match tokio::time::timeout(spec.budgets.delete, deletes).await {
            Ok(errors) if errors.is_empty() => Ok(()),
            Ok(errors) => Err(format!("failed to delete {}", errors.join("; "))),
            Err(_) => Err(format!(
                "teardown did not finish within {:?}",
                spec.budgets.delete
            )),
        }
    }
}

/// Map an engine outcome onto the normalized result model.
pub fn outcome_to_result(
    check: &dyn Check,
    start: Instant,
    outcome: WorkloadOutcome,
) -> CheckResult {
    let detail = outcome.detail();
    let mut result = match &outcome.failure {
        None => CheckResult::pass(check, start),
        Some((phase, reason)) => {
            CheckResult::fail(check, format!("[{}] {reason}", phase.tag())).with_duration(start)
        }
    };
    result = result.with_detail(detail);
    if let Some(cleanup) = outcome.cleanup_error {
        result = result.with_cleanup_error(cleanup);
    }
    result
}

fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
