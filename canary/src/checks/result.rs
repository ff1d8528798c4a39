//! Normalized outcome record produced by every checker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

use super::catalog::Check;

/// Classification of one check evaluation.
///
/// `Invalid` means the check could not even be attempted (bad declaration,
/// unresolvable reference) and is distinct from `Failed`, which means the
/// probe ran and the dependency was unhealthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Passed,
    Failed,
    Invalid,
}

/// Identity of the check that produced a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRef {
    pub kind: String,
    pub endpoint: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl CheckRef {
    pub fn from_check(check: &dyn Check) -> Self {
        Self {
            kind: check.kind().to_string(),
            endpoint: check.endpoint(),
            description: check.description(),
            namespace: check.namespace().map(str::to_string),
        }
    }
}

/// One evaluation outcome. Created by a checker, immutable afterwards,
/// owned by the dispatcher and consumed by the exporter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub check: CheckRef,
    pub status: CheckStatus,
    pub message: String,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
    /// Structured measurements (per-phase timings, record counts).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
    /// Teardown failure recorded alongside the verdict. A passed check with a
    /// cleanup error is not a clean pass: cluster resources were orphaned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup_error: Option<String>,
}

impl CheckResult {
    fn new(check: &dyn Check, status: CheckStatus, message: String) -> Self {
        Self {
            check: CheckRef::from_check(check),
            status,
            message,
            duration_ms: 0,
            timestamp: Utc::now(),
            detail: None,
            cleanup_error: None,
        }
    }

    /// Passing result with duration measured from `start`.
    pub fn pass(check: &dyn Check, start: Instant) -> Self {
        let mut result = Self::new(check, CheckStatus::Passed, String::new());
        result.duration_ms = elapsed_ms(start);
        result
    }

    /// Failing result. The probe ran; the dependency is unhealthy.
    pub fn fail(check: &dyn Check, message: impl Into<String>) -> Self {
        Self::new(check, CheckStatus::Failed, message.into())
    }

    /// The check could not be attempted at all.
    pub fn invalid(check: &dyn Check, message: impl Into<String>) -> Self {
        Self::new(check, CheckStatus::Invalid, message.into())
    }

    pub fn with_duration(mut self, start: Instant) -> Self {
        self.duration_ms = elapsed_ms(start);
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn with_cleanup_error(mut self, error: impl Into<String>) -> Self {
        self.cleanup_error = Some(error.into());
        self
    }

    pub fn passed(&self) -> bool {
        self.status == CheckStatus::Passed
    }
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = match self.status {
            CheckStatus::Passed => "passed",
            CheckStatus::Failed => "failed",
            CheckStatus::Invalid => "invalid",
        };
        write!(
            f,
            "[{}] {} {} in {}ms",
            self.check.kind, self.check.endpoint, verdict, self.duration_ms
        )?;
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(cleanup) = &self.cleanup_error {
            write!(f, " (cleanup failed: {cleanup})")?;
        }
        Ok(())
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::catalog::TcpCheck;

    fn tcp_check() -> TcpCheck {
        TcpCheck {
            endpoint: "db.internal:5432".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn pass_records_duration() {
        let check = tcp_check();
        let result = CheckResult::pass(&check, Instant::now());
        assert_eq!(result.status, CheckStatus::Passed);
        assert!(result.passed());
        assert_eq!(result.check.kind, "tcp");
        assert_eq!(result.check.endpoint, "db.internal:5432");
    }

    #[test]
    fn fail_and_invalid_are_distinct() {
        let check = tcp_check();
        let failed = CheckResult::fail(&check, "connection refused");
        let invalid = CheckResult::invalid(&check, "endpoint missing");
        assert_eq!(failed.status, CheckStatus::Failed);
        assert_eq!(invalid.status, CheckStatus::Invalid);
        assert_ne!(failed.status, invalid.status);
    }

    #[test]
    fn cleanup_error_does_not_overturn_verdict() {
        let check = tcp_check();
        let result =
            CheckResult::pass(&check, Instant::now()).with_cleanup_error("delete timed out");
        assert!(result.passed());
        assert!(result.cleanup_error.is_some());
        let rendered = result.to_string();
        assert!(rendered.contains("cleanup failed"));
    }

    #[test]
    fn results_serialize_as_plain_data() {
        let check = tcp_check();
        let result = CheckResult::fail(&check, "no route to host");
        let json = serde_json::to_value(&result).expect("serializable");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["check"]["kind"], "tcp");
    }
}
