//! Check catalog: every kind of probe the engine knows how to declare.
//!
//! Each variant is plain declared data plus the [`Check`] capability surface.
//! Computing `kind()` or `endpoint()` never touches shared state or performs
//! I/O; both are identity helpers used by dispatch and reporting.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Kind discriminators. Fixed at construction; selects the checker and the
/// result-classification rules.
pub mod kinds {
    pub const HTTP: &str = "http";
    pub const TCP: &str = "tcp";
    pub const ICMP: &str = "icmp";
    pub const DNS: &str = "dns";
    pub const S3: &str = "s3";
    pub const S3_BUCKET: &str = "s3Bucket";
    pub const GCS_BUCKET: &str = "gcsBucket";
    pub const CLOUDWATCH: &str = "cloudwatch";
    pub const EC2: &str = "ec2";
    pub const DOCKER_PULL: &str = "dockerPull";
    pub const DOCKER_PUSH: &str = "dockerPush";
    pub const CONTAINERD_PULL: &str = "containerdPull";
    pub const CONTAINERD_PUSH: &str = "containerdPush";
    pub const POSTGRES: &str = "postgres";
    pub const MSSQL: &str = "mssql";
    pub const MONGODB: &str = "mongodb";
    pub const REDIS: &str = "redis";
    pub const LDAP: &str = "ldap";
    pub const SMB: &str = "smb";
    pub const HELM: &str = "helm";
    pub const RESTIC: &str = "restic";
    pub const PROMETHEUS: &str = "prometheus";
    pub const POD: &str = "pod";
    pub const NAMESPACE: &str = "namespace";
    pub const JMETER: &str = "jmeter";
    pub const JUNIT: &str = "junit";
}

/// Capability surface every check variant implements.
pub trait Check: Send + Sync {
    /// Constant discriminator for this variant.
    fn kind(&self) -> &'static str;

    /// What was probed, derived purely from the check's own fields.
    fn endpoint(&self) -> String;

    fn meta(&self) -> &CheckMeta;

    /// Free-text label, falling back to the name and then the endpoint.
    fn description(&self) -> String {
        let meta = self.meta();
        meta.description
            .clone()
            .or_else(|| meta.name.clone())
            .unwrap_or_else(|| self.endpoint())
    }

    fn namespace(&self) -> Option<&str> {
        None
    }

    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Variant-local preconditions. A violation becomes an `invalid` result
    /// at dispatch, never a panic.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Label fields shared by every check kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct CheckMeta {
    pub description: Option<String>,
    pub name: Option<String>,
    pub icon: Option<String>,
}

/// Reference to one key inside a secret or configmap.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct KeyRef {
    pub name: String,
    pub key: String,
}

/// A value that is either inlined or resolved from a secret/configmap key.
/// Exactly one of the three sources must be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ValueSource {
    pub name: Option<String>,
    pub value: Option<String>,
    pub secret_key_ref: Option<KeyRef>,
    pub config_map_key_ref: Option<KeyRef>,
}

impl ValueSource {
    pub fn validate(&self) -> Result<(), String> {
        let sources = [
            self.value.is_some(),
            self.secret_key_ref.is_some(),
            self.config_map_key_ref.is_some(),
        ];
        match sources.iter().filter(|set| **set).count() {
            1 => Ok(()),
            0 => Err(format!(
                "value source {} has no value, secretKeyRef or configMapKeyRef",
                self.display_name()
            )),
            _ => Err(format!(
                "value source {} sets more than one of value, secretKeyRef and configMapKeyRef",
                self.display_name()
            )),
        }
    }

    pub fn display_name(&self) -> &str {
        if let Some(name) = self.name.as_deref() {
            return name;
        }
        if let Some(secret) = &self.secret_key_ref {
            return &secret.name;
        }
        if let Some(configmap) = &self.config_map_key_ref {
            return &configmap.name;
        }
        "(inline)"
    }
}

/// Credentials used by checks that authenticate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Authentication {
    pub username: ValueSource,
    pub password: ValueSource,
}

/// Freshness and size expectations for folder-like targets (buckets, shares).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct FolderTest {
    pub min_age: Option<String>,
    pub max_age: Option<String>,
    pub min_count: Option<u32>,
    pub max_count: Option<u32>,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct FolderFilter {
    pub regex: Option<String>,
    pub min_age: Option<String>,
    pub max_age: Option<String>,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct AwsConnection {
    pub access_key: ValueSource,
    pub secret_key: ValueSource,
    pub region: String,
    pub endpoint: Option<String>,
    pub skip_tls_verify: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct GcpConnection {
    pub endpoint: Option<String>,
    pub credentials: Option<ValueSource>,
}

/// HTTP endpoint probe with latency, status and content expectations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpCheck {
    #[serde(flatten)]
    pub meta: CheckMeta,
    /// Endpoint to check. Mutually exclusive with `namespace`.
    pub endpoint: Option<String>,
    /// Namespace to crawl for TLS endpoints. Mutually exclusive with `endpoint`.
    pub namespace: Option<String>,
    /// Fail the check when the request takes longer than this.
    pub threshold_millis: Option<u64>,
    /// Accepted response codes. Empty means any 2xx.
    pub response_codes: Vec<u16>,
    /// Content the response body must contain.
    pub response_content: Option<String>,
    /// Maximum number of days until the TLS certificate expires.
    pub max_ssl_expiry: Option<u32>,
    /// HTTP method, defaults to GET.
    pub method: Option<String>,
    pub body: Option<String>,
    pub headers: Vec<ValueSource>,
    pub authentication: Option<Authentication>,
}

impl HttpCheck {
    pub fn method(&self) -> &str {
        self.method.as_deref().unwrap_or("GET")
    }
}

impl Check for HttpCheck {
    fn kind(&self) -> &'static str {
        kinds::HTTP
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone().unwrap_or_default()
    }

    fn meta(&self) -> &CheckMeta {
        &self.meta
    }

    fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    fn validate(&self) -> Result<(), String> {
        match (self.endpoint.is_some(), self.namespace.is_some()) {
            (true, true) => Err("endpoint and namespace are mutually exclusive".to_string()),
            (false, false) => Err("one of endpoint or namespace is required".to_string()),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct TcpCheck {
    #[serde(flatten)]
    pub meta: CheckMeta,
    pub endpoint: String,
    pub threshold_millis: Option<u64>,
}

impl Check for TcpCheck {
    fn kind(&self) -> &'static str {
        kinds::TCP
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }

    fn meta(&self) -> &CheckMeta {
        &self.meta
    }

    fn validate(&self) -> Result<(), String> {
        if self.endpoint.is_empty() {
            return Err("endpoint is required".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct IcmpCheck {
    #[serde(flatten)]
    pub meta: CheckMeta,
    pub endpoint: String,
    pub threshold_millis: Option<u64>,
    pub packet_loss_threshold: Option<u64>,
    pub packet_count: Option<u32>,
}

impl Check for IcmpCheck {
    fn kind(&self) -> &'static str {
        kinds::ICMP
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }

    fn meta(&self) -> &CheckMeta {
        &self.meta
    }
}

/// DNS query with record-count and exact-reply expectations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct DnsCheck {
    #[serde(flatten)]
    pub meta: CheckMeta,
    pub server: Option<String>,
    pub port: Option<u16>,
    pub query: String,
    pub query_type: Option<String>,
    pub min_records: Option<u32>,
    pub exact_reply: Vec<String>,
    /// Query timeout in seconds.
    pub timeout: Option<u64>,
    pub threshold_millis: Option<u64>,
}

impl Check for DnsCheck {
    fn kind(&self) -> &'static str {
        kinds::DNS
    }

    fn endpoint(&self) -> String {
        let mut endpoint = format!(
            "{}/{}",
            self.query_type.as_deref().unwrap_or("A"),
            self.query
        );
        if let Some(server) = &self.server {
            endpoint.push('@');
            endpoint.push_str(server);
            if let Some(port) = self.port {
                endpoint.push_str(&format!(":{port}"));
            }
        }
        endpoint
    }

    fn meta(&self) -> &CheckMeta {
        &self.meta
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Bucket {
    pub name: String,
    pub region: String,
    pub endpoint: String,
}

/// Object storage round trip: list, put, get.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct S3Check {
    #[serde(flatten)]
    pub meta: CheckMeta,
    pub bucket: Bucket,
    pub access_key: String,
    pub secret_key: String,
    pub object_path: String,
    pub skip_tls_verify: bool,
}

impl Check for S3Check {
    fn kind(&self) -> &'static str {
        kinds::S3
    }

    fn endpoint(&self) -> String {
        format!("{}/{}", self.bucket.endpoint, self.bucket.name)
    }

    fn meta(&self) -> &CheckMeta {
        &self.meta
    }
}

/// Bucket freshness: newest matching object must satisfy the folder test.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct S3BucketCheck {
    #[serde(flatten)]
    pub meta: CheckMeta,
    #[serde(flatten)]
    pub aws: AwsConnection,
    #[serde(flatten)]
    pub folder_test: FolderTest,
    pub filter: FolderFilter,
    pub bucket: String,
    /// Use path-style addressing instead of virtual-hosted buckets.
    pub use_path_style: bool,
}

impl Check for S3BucketCheck {
    fn kind(&self) -> &'static str {
        kinds::S3_BUCKET
    }

    fn endpoint(&self) -> String {
        match self.aws.endpoint.as_deref() {
            Some(endpoint) if !endpoint.is_empty() => format!("{}/{}", endpoint, self.bucket),
            _ => self.bucket.clone(),
        }
    }

    fn meta(&self) -> &CheckMeta {
        &self.meta
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct GcsBucketCheck {
    #[serde(flatten)]
    pub meta: CheckMeta,
    #[serde(flatten)]
    pub gcp: GcpConnection,
    #[serde(flatten)]
    pub folder_test: FolderTest,
    pub filter: FolderFilter,
    pub bucket: String,
}

impl Check for GcsBucketCheck {
    fn kind(&self) -> &'static str {
        kinds::GCS_BUCKET
    }

    fn endpoint(&self) -> String {
        self.bucket.clone()
    }

    fn meta(&self) -> &CheckMeta {
        &self.meta
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct CloudWatchFilter {
    pub action_prefix: Option<String>,
    pub alarm_prefix: Option<String>,
    pub alarms: Vec<String>,
    pub state: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct CloudWatchCheck {
    #[serde(flatten)]
    pub meta: CheckMeta,
    #[serde(flatten)]
    pub aws: AwsConnection,
    pub filter: CloudWatchFilter,
}

impl Check for CloudWatchCheck {
    fn kind(&self) -> &'static str {
        kinds::CLOUDWATCH
    }

    fn endpoint(&self) -> String {
        let mut endpoint = self.aws.region.clone();
        if let Some(prefix) = &self.filter.action_prefix {
            endpoint.push('-');
            endpoint.push_str(prefix);
        }
        if let Some(prefix) = &self.filter.alarm_prefix {
            endpoint.push('-');
            endpoint.push_str(prefix);
        }
        endpoint
    }

    fn meta(&self) -> &CheckMeta {
        &self.meta
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Ec2Check {
    #[serde(flatten)]
    pub meta: CheckMeta,
    #[serde(flatten)]
    pub aws: AwsConnection,
    pub ami: Option<String>,
    pub user_data: Option<String>,
    pub security_group: Option<String>,
    pub keep_alive: bool,
    pub wait_time: Option<u64>,
    pub time_out: Option<u64>,
}

impl Check for Ec2Check {
    fn kind(&self) -> &'static str {
        kinds::EC2
    }

    fn endpoint(&self) -> String {
        self.aws.region.clone()
    }

    fn meta(&self) -> &CheckMeta {
        &self.meta
    }
}

/// Pull an image and verify digest and size.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct DockerPullCheck {
    #[serde(flatten)]
    pub meta: CheckMeta,
    pub image: String,
    pub auth: Option<Authentication>,
    pub expected_digest: Option<String>,
    pub expected_size: Option<u64>,
}

impl Check for DockerPullCheck {
    fn kind(&self) -> &'static str {
        kinds::DOCKER_PULL
    }

    fn endpoint(&self) -> String {
        self.image.clone()
    }

    fn meta(&self) -> &CheckMeta {
        &self.meta
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct DockerPushCheck {
    #[serde(flatten)]
    pub meta: CheckMeta,
    pub image: String,
    pub auth: Option<Authentication>,
}

impl Check for DockerPushCheck {
    fn kind(&self) -> &'static str {
        kinds::DOCKER_PUSH
    }

    fn endpoint(&self) -> String {
        self.image.clone()
    }

    fn meta(&self) -> &CheckMeta {
        &self.meta
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ContainerdPullCheck {
    #[serde(flatten)]
    pub meta: CheckMeta,
    pub image: String,
    pub auth: Option<Authentication>,
    pub expected_digest: Option<String>,
    pub expected_size: Option<u64>,
}

impl Check for ContainerdPullCheck {
    fn kind(&self) -> &'static str {
        kinds::CONTAINERD_PULL
    }

    fn endpoint(&self) -> String {
        self.image.clone()
    }

    fn meta(&self) -> &CheckMeta {
        &self.meta
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ContainerdPushCheck {
    #[serde(flatten)]
    pub meta: CheckMeta,
    pub image: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Check for ContainerdPushCheck {
    fn kind(&self) -> &'static str {
        kinds::CONTAINERD_PUSH
    }

    fn endpoint(&self) -> String {
        self.image.clone()
    }

    fn meta(&self) -> &CheckMeta {
        &self.meta
    }
}

/// Shared fields of the SQL kinds. An empty query defaults to `SELECT 1`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct SqlCheck {
    #[serde(flatten)]
    pub meta: CheckMeta,
    pub connection: String,
    pub query: Option<String>,
    /// Number of rows expected back.
    pub results: Option<u32>,
}

impl SqlCheck {
    pub fn query(&self) -> &str {
        match self.query.as_deref() {
            Some(query) if !query.is_empty() => query,
            _ => "SELECT 1",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct PostgresCheck {
    #[serde(flatten)]
    pub sql: SqlCheck,
}

impl Check for PostgresCheck {
    fn kind(&self) -> &'static str {
        kinds::POSTGRES
    }

    fn endpoint(&self) -> String {
        self.sql.connection.clone()
    }

    fn meta(&self) -> &CheckMeta {
        &self.sql.meta
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct MssqlCheck {
    #[serde(flatten)]
    pub sql: SqlCheck,
}

impl Check for MssqlCheck {
    fn kind(&self) -> &'static str {
        kinds::MSSQL
    }

    fn endpoint(&self) -> String {
        self.sql.connection.clone()
    }

    fn meta(&self) -> &CheckMeta {
        &self.sql.meta
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct MongoDbCheck {
    #[serde(flatten)]
    pub meta: CheckMeta,
    pub connection: String,
}

impl Check for MongoDbCheck {
    fn kind(&self) -> &'static str {
        kinds::MONGODB
    }

    fn endpoint(&self) -> String {
        self.connection.clone()
    }

    fn meta(&self) -> &CheckMeta {
        &self.meta
    }
}

/// Ping a Redis instance and expect a pong.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct RedisCheck {
    #[serde(flatten)]
    pub meta: CheckMeta,
    pub addr: String,
    pub auth: Option<Authentication>,
    pub db: i64,
}

impl Check for RedisCheck {
    fn kind(&self) -> &'static str {
        kinds::REDIS
    }

    fn endpoint(&self) -> String {
        self.addr.clone()
    }

    fn meta(&self) -> &CheckMeta {
        &self.meta
    }
}

/// Bind to an LDAP host and search the given DN.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct LdapCheck {
    #[serde(flatten)]
    pub meta: CheckMeta,
    pub host: String,
    pub auth: Option<Authentication>,
    pub bind_dn: String,
    pub user_search: Option<String>,
    pub skip_tls_verify: bool,
}

impl Check for LdapCheck {
    fn kind(&self) -> &'static str {
        kinds::LDAP
    }

    fn endpoint(&self) -> String {
        self.host.clone()
    }

    fn meta(&self) -> &CheckMeta {
        &self.meta
    }
}

/// Samba share freshness. Port defaults to 445.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct SmbCheck {
    #[serde(flatten)]
    pub meta: CheckMeta,
    #[serde(flatten)]
    pub folder_test: FolderTest,
    pub filter: FolderFilter,
    pub server: String,
    pub port: Option<u16>,
    pub auth: Option<Authentication>,
    pub domain: Option<String>,
    pub workstation: Option<String>,
    pub sharename: Option<String>,
    pub search_path: Option<String>,
}

impl SmbCheck {
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(445)
    }
}

impl Check for SmbCheck {
    fn kind(&self) -> &'static str {
        kinds::SMB
    }

    fn endpoint(&self) -> String {
        format!(
            "{}:{}/{}",
            self.server,
            self.port(),
            self.sharename.as_deref().unwrap_or_default()
        )
    }

    fn meta(&self) -> &CheckMeta {
        &self.meta
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct HelmCheck {
    #[serde(flatten)]
    pub meta: CheckMeta,
    pub chartmuseum: String,
    pub project: Option<String>,
    pub auth: Option<Authentication>,
    pub ca_file: Option<String>,
}

impl Check for HelmCheck {
    fn kind(&self) -> &'static str {
        kinds::HELM
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}",
            self.chartmuseum,
            self.project.as_deref().unwrap_or_default()
        )
    }

    fn meta(&self) -> &CheckMeta {
        &self.meta
    }
}

/// Backup repository integrity and freshness.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ResticCheck {
    #[serde(flatten)]
    pub meta: CheckMeta,
    pub repository: String,
    pub password: ValueSource,
    /// Maximum age of the newest backup, e.g. "5h30m".
    pub max_age: String,
    pub check_integrity: bool,
    pub access_key: Option<ValueSource>,
    pub secret_key: Option<ValueSource>,
    pub ca_cert: Option<String>,
}

impl Check for ResticCheck {
    fn kind(&self) -> &'static str {
        kinds::RESTIC
    }

    fn endpoint(&self) -> String {
        self.repository.clone()
    }

    fn meta(&self) -> &CheckMeta {
        &self.meta
    }

    fn validate(&self) -> Result<(), String> {
        self.password.validate()?;
        if !self.max_age.is_empty() {
            humantime::parse_duration(&self.max_age)
                .map_err(|err| format!("invalid maxAge {:?}: {err}", self.max_age))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct PrometheusCheck {
    #[serde(flatten)]
    pub meta: CheckMeta,
    pub host: String,
    pub query: String,
}

impl Check for PrometheusCheck {
    fn kind(&self) -> &'static str {
        kinds::PROMETHEUS
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}",
            self.host,
            self.meta.description.as_deref().unwrap_or_default()
        )
    }

    fn meta(&self) -> &CheckMeta {
        &self.meta
    }
}

/// Lifecycle timeouts shared by the pod and namespace kinds, all in
/// milliseconds. A zero value means the kind's documented default applies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkloadTimeouts {
    pub schedule_timeout: u64,
    pub ready_timeout: u64,
    pub http_timeout: u64,
    pub delete_timeout: u64,
    pub ingress_timeout: u64,
    pub http_retry_interval: u64,
    /// Hard upper bound on the whole evaluation, spanning every phase.
    pub deadline: u64,
}

/// HTTP expectations probed once the workload is ready.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkloadProbe {
    pub port: Option<u16>,
    pub path: Option<String>,
    pub ingress_name: Option<String>,
    pub ingress_host: Option<String>,
    pub expected_content: Option<String>,
    pub expected_http_statuses: Vec<u16>,
}

/// Schedule a pod from the declared manifest, probe it over HTTP, then
/// delete it. The pod never outlives one evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct PodCheck {
    #[serde(flatten)]
    pub meta: CheckMeta,
    pub namespace: String,
    /// Pod manifest as YAML.
    pub spec: String,
    #[serde(flatten)]
    pub timeouts: WorkloadTimeouts,
    #[serde(flatten)]
    pub probe: WorkloadProbe,
    pub priority_class: Option<String>,
}

impl Check for PodCheck {
    fn kind(&self) -> &'static str {
        kinds::POD
    }

    fn endpoint(&self) -> String {
        self.meta.name.clone().unwrap_or_default()
    }

    fn meta(&self) -> &CheckMeta {
        &self.meta
    }

    fn namespace(&self) -> Option<&str> {
        Some(self.namespace.as_str()).filter(|namespace| !namespace.is_empty())
    }

    fn validate(&self) -> Result<(), String> {
        if self.spec.trim().is_empty() {
            return Err("pod manifest is required".to_string());
        }
        Ok(())
    }
}

/// Same lifecycle as the pod kind, but the workload gets a namespace of its
/// own, created with the declared labels and annotations and deleted with it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct NamespaceCheck {
    #[serde(flatten)]
    pub meta: CheckMeta,
    pub check_name: Option<String>,
    pub namespace_name_prefix: Option<String>,
    pub namespace_labels: BTreeMap<String, String>,
    pub namespace_annotations: BTreeMap<String, String>,
    /// Pod manifest as YAML, scheduled inside the generated namespace.
    pub pod_spec: String,
    #[serde(flatten)]
    pub timeouts: WorkloadTimeouts,
    #[serde(flatten)]
    pub probe: WorkloadProbe,
    pub priority_class: Option<String>,
}

impl Check for NamespaceCheck {
    fn kind(&self) -> &'static str {
        kinds::NAMESPACE
    }

    fn endpoint(&self) -> String {
        self.check_name
            .clone()
            .or_else(|| self.meta.name.clone())
            .unwrap_or_default()
    }

    fn meta(&self) -> &CheckMeta {
        &self.meta
    }

    fn validate(&self) -> Result<(), String> {
        if self.pod_spec.trim().is_empty() {
            return Err("podSpec is required".to_string());
        }
        Ok(())
    }
}

/// Run a jmeter test plan against the declared host and judge its log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct JmeterCheck {
    #[serde(flatten)]
    pub meta: CheckMeta,
    /// Where the jmx test plan comes from.
    pub jmx: ValueSource,
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Local jmeter properties, passed as -J flags.
    pub properties: Vec<String>,
    /// Java system properties, passed as -D flags.
    pub system_properties: Vec<String>,
    /// All samples together must finish within this, e.g. "4s".
    pub response_duration: Option<String>,
    pub namespace: Option<String>,
}

impl Check for JmeterCheck {
    fn kind(&self) -> &'static str {
        kinds::JMETER
    }

    fn endpoint(&self) -> String {
        format!(
            "{}:{}",
            self.host.as_deref().unwrap_or_default(),
            self.port.map(|port| port.to_string()).unwrap_or_default()
        )
    }

    fn meta(&self) -> &CheckMeta {
        &self.meta
    }

    fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    fn validate(&self) -> Result<(), String> {
        self.jmx.validate()
    }
}

/// Wait for the declared pod to finish, then judge the junit reports it
/// wrote. Timeout is in minutes and defaults to 5.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct JunitCheck {
    #[serde(flatten)]
    pub meta: CheckMeta,
    pub test_results: String,
    pub timeout: Option<u64>,
    /// Pod spec as YAML.
    pub spec: String,
}

impl Check for JunitCheck {
    fn kind(&self) -> &'static str {
        kinds::JUNIT
    }

    fn endpoint(&self) -> String {
        self.meta
            .description
            .clone()
            .or_else(|| self.meta.name.clone())
            .unwrap_or_else(|| self.test_results.clone())
    }

    fn meta(&self) -> &CheckMeta {
        &self.meta
    }

    fn timeout(&self) -> Option<Duration> {
        Some(Duration::from_secs(self.timeout.unwrap_or(5) * 60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_are_pure_and_deterministic() {
        let dns = DnsCheck {
            server: Some("8.8.8.8".to_string()),
            port: Some(53),
            query: "example.com".to_string(),
            query_type: Some("A".to_string()),
            ..Default::default()
        };
        assert_eq!(dns.endpoint(), "A/example.com@8.8.8.8:53");
        assert_eq!(dns.endpoint(), dns.endpoint());

        let smb = SmbCheck {
            server: "192.168.1.9".to_string(),
            sharename: Some("public".to_string()),
            ..Default::default()
        };
        assert_eq!(smb.endpoint(), "192.168.1.9:445/public");

        let s3 = S3Check {
            bucket: Bucket {
                name: "test-bucket".to_string(),
                region: "us-east-1".to_string(),
                endpoint: "https://s3.us-east-1.amazonaws.com".to_string(),
            },
            ..Default::default()
        };
        assert_eq!(
            s3.endpoint(),
            "https://s3.us-east-1.amazonaws.com/test-bucket"
        );
    }

    #[test]
    fn kinds_are_constant() {
        assert_eq!(HttpCheck::default().kind(), "http");
        assert_eq!(PodCheck::default().kind(), "pod");
        assert_eq!(NamespaceCheck::default().kind(), "namespace");
        assert_eq!(JmeterCheck::default().kind(), "jmeter");
        assert_eq!(S3BucketCheck::default().kind(), "s3Bucket");
        assert_eq!(ContainerdPullCheck::default().kind(), "containerdPull");
    }

    #[test]
    fn http_endpoint_and_namespace_are_mutually_exclusive() {
        let both = HttpCheck {
            endpoint: Some("https://example.com".to_string()),
            namespace: Some("default".to_string()),
            ..Default::default()
        };
        assert!(both.validate().is_err());

        let neither = HttpCheck::default();
        assert!(neither.validate().is_err());

        let endpoint_only = HttpCheck {
            endpoint: Some("https://example.com".to_string()),
            ..Default::default()
        };
        assert!(endpoint_only.validate().is_ok());
    }

    #[test]
    fn value_source_requires_exactly_one_origin() {
        let none = ValueSource::default();
        assert!(none.validate().is_err());

        let inline = ValueSource {
            value: Some("plan".to_string()),
            ..Default::default()
        };
        assert!(inline.validate().is_ok());

        let both = ValueSource {
            value: Some("plan".to_string()),
            secret_key_ref: Some(KeyRef {
                name: "secret".to_string(),
                key: "plan.jmx".to_string(),
            }),
            ..Default::default()
        };
        assert!(both.validate().is_err());
    }

    #[test]
    fn sql_query_defaults_to_select_one() {
        let check = PostgresCheck::default();
        assert_eq!(check.sql.query(), "SELECT 1");
    }

    #[test]
    fn description_falls_back_to_name_then_endpoint() {
        let named = TcpCheck {
            meta: CheckMeta {
                name: Some("primary-db".to_string()),
                ..Default::default()
            },
            endpoint: "db:5432".to_string(),
            ..Default::default()
        };
        assert_eq!(named.description(), "primary-db");

        let bare = TcpCheck {
            endpoint: "db:5432".to_string(),
            ..Default::default()
        };
        assert_eq!(bare.description(), "db:5432");
    }

    #[test]
    fn check_documents_ignore_unknown_fields() {
        let yaml = "endpoint: cache:6379\nthresholdMillis: 100\nnotARealField: true\n";
        let check: TcpCheck = serde_yaml::from_str(yaml).expect("extra fields are ignored");
        assert_eq!(check.endpoint, "cache:6379");
        assert_eq!(check.threshold_millis, Some(100));
    }
}
