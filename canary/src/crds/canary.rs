//! `Canary` Custom Resource Definition: the declared set of checks, grouped
//! by kind, that one evaluation cycle runs.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::checks::catalog::{
    kinds, Check, CloudWatchCheck, ContainerdPullCheck, ContainerdPushCheck, DnsCheck,
    DockerPullCheck, DockerPushCheck, Ec2Check, GcsBucketCheck, HelmCheck, HttpCheck, IcmpCheck,
    JmeterCheck, JunitCheck, LdapCheck, MongoDbCheck, MssqlCheck, NamespaceCheck, PodCheck,
    PostgresCheck, PrometheusCheck, RedisCheck, ResticCheck, S3BucketCheck, S3Check, SmbCheck,
    TcpCheck,
};

/// `Canary` CRD: one document declaring every check a canary evaluates.
///
/// Each group is an ordered sequence of that kind's field sets. The schedule
/// fields are consumed by the scheduler layer, not by the engine.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(group = "canary.dev", version = "v1", kind = "Canary")]
#[kube(namespaced)]
#[kube(status = "CanaryStatus")]
#[kube(printcolumn = r#"{"name":"Interval","type":"string","jsonPath":".spec.interval"}"#)]
#[kube(printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.status"}"#)]
#[kube(printcolumn = r#"{"name":"Message","type":"string","jsonPath":".status.message"}"#)]
#[serde(rename_all = "camelCase", default)]
pub struct CanarySpec {
    /// Seconds between evaluation cycles.
    pub interval: Option<u64>,
    /// Cron expression, mutually exclusive with `interval` at the scheduler.
    pub schedule: Option<String>,

    pub http: Vec<HttpCheck>,
    pub tcp: Vec<TcpCheck>,
    pub icmp: Vec<IcmpCheck>,
    pub dns: Vec<DnsCheck>,
    pub s3: Vec<S3Check>,
    pub s3_bucket: Vec<S3BucketCheck>,
    pub gcs_bucket: Vec<GcsBucketCheck>,
    pub cloudwatch: Vec<CloudWatchCheck>,
    pub ec2: Vec<Ec2Check>,
    /// Registry pull checks, declared under the `docker` key.
    pub docker: Vec<DockerPullCheck>,
    pub docker_push: Vec<DockerPushCheck>,
    pub containerd: Vec<ContainerdPullCheck>,
    pub containerd_push: Vec<ContainerdPushCheck>,
    pub postgres: Vec<PostgresCheck>,
    pub mssql: Vec<MssqlCheck>,
    pub mongodb: Vec<MongoDbCheck>,
    pub redis: Vec<RedisCheck>,
    pub ldap: Vec<LdapCheck>,
    pub smb: Vec<SmbCheck>,
    pub helm: Vec<HelmCheck>,
    pub restic: Vec<ResticCheck>,
    pub prometheus: Vec<PrometheusCheck>,
    pub pod: Vec<PodCheck>,
    pub namespace: Vec<NamespaceCheck>,
    pub jmeter: Vec<JmeterCheck>,
    pub junit: Vec<JunitCheck>,
}

impl CanarySpec {
    /// Non-empty kind groups in declaration order, each preserving the order
    /// of its instances.
    pub fn declared(&self) -> Vec<(&'static str, Vec<&dyn Check>)> {
        fn group<'a, T: Check>(
            out: &mut Vec<(&'static str, Vec<&'a dyn Check>)>,
            kind: &'static str,
            checks: &'a [T],
        ) {
            if !checks.is_empty() {
                out.push((kind, checks.iter().map(|check| check as &dyn Check).collect()));
            }
        }

        let mut groups = Vec::new();
        group(&mut groups, kinds::HTTP, &self.http);
        group(&mut groups, kinds::TCP, &self.tcp);
        group(&mut groups, kinds::ICMP, &self.icmp);
        group(&mut groups, kinds::DNS, &self.dns);
        group(&mut groups, kinds::S3, &self.s3);
        group(&mut groups, kinds::S3_BUCKET, &self.s3_bucket);
        group(&mut groups, kinds::GCS_BUCKET, &self.gcs_bucket);
        group(&mut groups, kinds::CLOUDWATCH, &self.cloudwatch);
        group(&mut groups, kinds::EC2, &self.ec2);
        group(&mut groups, kinds::DOCKER_PULL, &self.docker);
        group(&mut groups, kinds::DOCKER_PUSH, &self.docker_push);
        group(&mut groups, kinds::CONTAINERD_PULL, &self.containerd);
        group(&mut groups, kinds::CONTAINERD_PUSH, &self.containerd_push);
        group(&mut groups, kinds::POSTGRES, &self.postgres);
        group(&mut groups, kinds::MSSQL, &self.mssql);
        group(&mut groups, kinds::MONGODB, &self.mongodb);
        group(&mut groups, kinds::REDIS, &self.redis);
        group(&mut groups, kinds::LDAP, &self.ldap);
        group(&mut groups, kinds::SMB, &self.smb);
        group(&mut groups, kinds::HELM, &self.helm);
        group(&mut groups, kinds::RESTIC, &self.restic);
        group(&mut groups, kinds::PROMETHEUS, &self.prometheus);
        group(&mut groups, kinds::POD, &self.pod);
        group(&mut groups, kinds::NAMESPACE, &self.namespace);
        group(&mut groups, kinds::JMETER, &self.jmeter);
        group(&mut groups, kinds::JUNIT, &self.junit);
        groups
    }

    /// Total number of declared check instances across every group.
    pub fn check_count(&self) -> usize {
        self.declared()
            .iter()
            .map(|(_, checks)| checks.len())
            .sum()
    }
}

/// Last observed outcome of a canary, written by the scheduler layer.
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct CanaryStatus {
    /// "Passed" or "Failed", from the last completed cycle.
    pub status: Option<String>,
    pub message: Option<String>,
    /// Timestamp of the last completed cycle.
    pub last_check: Option<String>,
    pub passed_count: Option<u32>,
    pub failed_count: Option<u32>,
    pub invalid_count: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_skips_empty_groups_and_preserves_order() {
        let spec = CanarySpec {
            tcp: vec![
                TcpCheck {
                    endpoint: "first:1".to_string(),
                    ..Default::default()
                },
                TcpCheck {
                    endpoint: "second:2".to_string(),
                    ..Default::default()
                },
            ],
            http: vec![HttpCheck {
                endpoint: Some("https://example.com".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        };

        let declared = spec.declared();
        assert_eq!(declared.len(), 2);
        assert_eq!(spec.check_count(), 3);

        let (kind, tcp_group) = declared
            .iter()
            .find(|(kind, _)| *kind == "tcp")
            .expect("tcp group declared");
        assert_eq!(*kind, "tcp");
        assert_eq!(tcp_group[0].endpoint(), "first:1");
        assert_eq!(tcp_group[1].endpoint(), "second:2");
    }

    #[test]
    fn spec_parses_from_grouped_yaml() {
        let yaml = r#"
interval: 30
http:
  - endpoint: https://httpstat.us/200
    thresholdMillis: 3000
    responseCodes: [200, 201, 301]
tcp:
  - endpoint: db.internal:5432
pod:
  - name: golang
    namespace: default
    spec: |
      apiVersion: v1
      kind: Pod
    port: 8080
    path: /ready
    scheduleTimeout: 2000
    deadline: 29000
    expectedHttpStatuses: [200, 202]
"#;
        let spec: CanarySpec = serde_yaml::from_str(yaml).expect("spec parses");
        assert_eq!(spec.interval, Some(30));
        assert_eq!(spec.http.len(), 1);
        assert_eq!(spec.http[0].response_codes, vec![200, 201, 301]);
        assert_eq!(spec.pod[0].timeouts.schedule_timeout, 2000);
        assert_eq!(spec.pod[0].timeouts.deadline, 29000);
        assert_eq!(spec.pod[0].probe.expected_http_statuses, vec![200, 202]);
        assert_eq!(spec.pod[0].probe.port, Some(8080));
    }
}
