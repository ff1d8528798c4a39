//! Jmeter checker: resolve the declared test plan, run the jmeter cli
//! against the target host, and judge the results log it writes.
//!
//! Scratch files are named per invocation, not per declaration, so two
//! concurrent evaluations of the same declared check never race on the same
//! paths. Both files are removed on every exit path.

use async_trait::async_trait;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;
use uuid::Uuid;

use super::catalog::{kinds, Check, JmeterCheck};
use super::result::CheckResult;
use super::{evaluate_group, Checker};
use crate::cluster::ClusterOps;
use crate::config::EngineConfig;
use crate::crds::CanarySpec;
use crate::exec::ProcessRunner;

pub struct JmeterChecker {
    cluster: Arc<dyn ClusterOps>,
    runner: Arc<dyn ProcessRunner>,
    scratch_dir: PathBuf,
    resolve_namespace: String,
    process_timeout: Duration,
}

impl JmeterChecker {
    pub fn new(
        cluster: Arc<dyn ClusterOps>,
        runner: Arc<dyn ProcessRunner>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            cluster,
            runner,
            scratch_dir: config.scratch_dir.clone(),
            resolve_namespace: config.namespace.clone(),
            process_timeout: config.process_timeout(),
        }
    }

    async fn check(&self, check: &JmeterCheck) -> CheckResult {
        let start = Instant::now();
        let namespace = check.namespace().unwrap_or(&self.resolve_namespace);

        let plan = match self.cluster.resolve_value(namespace, &check.jmx).await {
            Ok(plan) => plan,
            Err(err) => {
                return CheckResult::invalid(check, format!("failed to resolve jmx plan: {err}"))
            }
        };

        let max_duration = match &check.response_duration {
            Some(raw) => match humantime::parse_duration(raw) {
                Ok(duration) => Some(duration),
                Err(err) => {
                    return CheckResult::invalid(
                        check,
                        format!("invalid responseDuration {raw:?}: {err}"),
                    )
                }
            },
            None => None,
        };

        let run_id = Uuid::new_v4().simple().to_string();
        let plan_path = self
            .scratch_dir
            .join(format!("jmx-{}-{}-{run_id}.jmx", namespace, check.jmx.display_name()));
        let log_path = self
            .scratch_dir
            .join(format!("jmx-{}-{}-{run_id}.jtl", namespace, check.jmx.display_name()));
        let _scratch = ScratchGuard::new(vec![plan_path.clone(), log_path.clone()]);

        if let Err(err) = tokio::fs::write(&plan_path, &plan).await {
            return CheckResult::fail(check, format!("unable to write test plan: {err}"))
                .with_duration(start);
        }

        let args = build_args(check, &plan_path, &log_path);
        let output = match self.runner.run("jmeter", &args, self.process_timeout).await {
            Ok(output) => output,
            Err(err) => {
                return CheckResult::fail(check, format!("error running jmeter: {err}"))
                    .with_duration(start)
            }
        };
        if !output.success {
            return CheckResult::fail(
                check,
                format!(
                    "jmeter exited with status {:?}: {}",
                    output.exit_code,
                    output.stderr.trim()
                ),
            )
            .with_duration(start);
        }

        let raw = match tokio::fs::read_to_string(&log_path).await {
            Ok(raw) => raw,
            Err(err) => {
                return CheckResult::fail(check, format!("error opening the results log: {err}"))
                    .with_duration(start)
            }
        };
        let records = match parse_jtl(&raw) {
            Ok(records) => records,
            Err(err) => {
                return CheckResult::fail(check, format!("unable to parse the results log: {err}"))
                    .with_duration(start)
            }
        };

        let total_elapsed_ms: u64 = records.iter().map(|record| record.elapsed_ms).sum();
        let duration_ms = total_elapsed_ms.max(elapsed_ms(start));

        let failure_messages: Vec<&str> = records
            .iter()
            .filter(|record| !record.success)
            .map(|record| record.failure_message.as_str())
            .collect();
        if !failure_messages.is_empty() {
            return CheckResult::fail(check, failure_messages.join("\n"))
                .with_duration_ms(duration_ms);
        }

        if let Some(max) = max_duration {
            let total = Duration::from_millis(total_elapsed_ms);
            if total > max {
                return CheckResult::fail(
                    check,
                    format!(
                        "the test plan took {} longer than the declared {}",
                        humantime::format_duration(total - max),
                        humantime::format_duration(max)
                    ),
                )
                .with_duration_ms(duration_ms);
            }
        }

        CheckResult::pass(check, start)
            .with_duration_ms(duration_ms)
            .with_detail(json!({
                "samples": records.len(),
                "totalElapsedMs": total_elapsed_ms,
            }))
    }
}

#[async_trait]
impl Checker for JmeterChecker {
    fn kind(&self) -> &'static str {
        kinds::JMETER
    }

    async fn run(&self, spec: &CanarySpec) -> Vec<CheckResult> {
        evaluate_group(&spec.jmeter, |check| self.check(check)).await
    }
}

/// Removes the scratch files when the evaluation ends, whichever way it ends.
struct ScratchGuard {
    paths: Vec<PathBuf>,
}

impl ScratchGuard {
    fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }
}

impl Drop for ScratchGuard {
    fn drop(&mut self) {
        for path in &self.paths {
            if let Err(err) = std::fs::remove_file(path) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %err, "failed to remove scratch file");
                }
            }
        }
    }
}

/// Argument vector for the jmeter cli. Declared values land in argv slots,
/// never in a shell string.
fn build_args(check: &JmeterCheck, plan_path: &Path, log_path: &Path) -> Vec<String> {
    let mut args = vec![
        "-n".to_string(),
        "-t".to_string(),
        plan_path.display().to_string(),
    ];
    for property in &check.properties {
        args.push(format!("-J{property}"));
    }
    for property in &check.system_properties {
        args.push(format!("-D{property}"));
    }
    if let Some(host) = &check.host {
        args.push("-H".to_string());
        args.push(host.clone());
    }
    if let Some(port) = check.port {
        args.push("-P".to_string());
        args.push(port.to_string());
    }
    args.push("-l".to_string());
    args.push(log_path.display().to_string());
    args
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct JtlRecord {
    elapsed_ms: u64,
    success: bool,
    failure_message: String,
}

/// Parse the jtl results log: a csv header naming at least `elapsed` and
/// `success`, then one record per sample.
fn parse_jtl(raw: &str) -> Result<Vec<JtlRecord>, String> {
    let mut lines = raw.lines().filter(|line| !line.trim().is_empty());
    let header = lines.next().ok_or_else(|| "results log is empty".to_string())?;
    let columns = split_csv_line(header);

    let elapsed_col = columns
        .iter()
        .position(|column| column == "elapsed")
        .ok_or_else(|| "results log has no elapsed column".to_string())?;
    let success_col = columns
        .iter()
        .position(|column| column == "success")
        .ok_or_else(|| "results log has no success column".to_string())?;
    let failure_col = columns.iter().position(|column| column == "failureMessage");

    let mut records = Vec::new();
    for line in lines {
        let fields = split_csv_line(line);
        let elapsed_ms = fields
            .get(elapsed_col)
            .and_then(|field| field.parse::<u64>().ok())
            .ok_or_else(|| format!("bad elapsed value in line {line:?}"))?;
        let success = fields
            .get(success_col)
            .map(|field| field.eq_ignore_ascii_case("true"))
            .ok_or_else(|| format!("missing success value in line {line:?}"))?;
        let failure_message = failure_col
            .and_then(|col| fields.get(col))
            .cloned()
            .unwrap_or_default();
        records.push(JtlRecord {
            elapsed_ms,
            success,
            failure_message,
        });
    }
    Ok(records)
}

/// Split one csv line, honoring double-quoted fields with doubled quotes as
/// escapes.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut field));
            }
            c => field.push(c),
        }
    }
    fields.push(field);
    fields
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::catalog::ValueSource;
    use crate::checks::CheckStatus;
    use crate::cluster::MockClusterOps;
    use crate::exec::{MockProcessRunner, ProcessOutput};
    use std::sync::Mutex;

    const HEADER: &str =
        "timeStamp,elapsed,label,responseCode,responseMessage,threadName,success,failureMessage";

    fn jmeter_check() -> JmeterCheck {
        JmeterCheck {
            jmx: ValueSource {
                name: Some("jmx-test-plan".to_string()),
                value: Some("<jmeterTestPlan/>".to_string()),
                ..Default::default()
            },
            host: Some("some-host".to_string()),
            port: Some(8080),
            ..Default::default()
        }
    }

    fn resolving_cluster() -> MockClusterOps {
        let mut cluster = MockClusterOps::new();
        cluster
            .expect_resolve_value()
            .returning(|_, source| Ok(source.value.clone().unwrap_or_default()));
        cluster
    }

    /// Pull the results-log path out of the argument vector.
    fn log_path_from_args(args: &[String]) -> PathBuf {
        let position = args
            .iter()
            .position(|arg| arg == "-l")
            .expect("-l flag present");
        PathBuf::from(&args[position + 1])
    }

    fn checker_with(
        cluster: MockClusterOps,
        runner: MockProcessRunner,
        scratch_dir: &Path,
    ) -> JmeterChecker {
        let config = EngineConfig {
            scratch_dir: scratch_dir.to_path_buf(),
            ..Default::default()
        };
        JmeterChecker::new(Arc::new(cluster), Arc::new(runner), &config)
    }

    fn ok_output() -> ProcessOutput {
        ProcessOutput {
            stdout: String::new(),
            stderr: String::new(),
            success: true,
            exit_code: Some(0),
        }
    }

    #[test]
    fn parses_records_with_quoted_failure_messages() {
        let raw = format!(
            "{HEADER}\n1,500,home,200,OK,t1,true,\n2,300,login,500,ERR,t1,false,\"timeout, upstream\"\n"
        );
        let records = parse_jtl(&raw).expect("parses");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].elapsed_ms, 500);
        assert!(records[0].success);
        assert!(!records[1].success);
        assert_eq!(records[1].failure_message, "timeout, upstream");
    }

    #[test]
    fn rejects_logs_without_the_expected_columns() {
        assert!(parse_jtl("").is_err());
        assert!(parse_jtl("timeStamp,label\n1,home\n").is_err());
    }

    #[tokio::test]
    async fn passing_run_reports_at_least_the_summed_elapsed_time() {
        let scratch = tempfile::tempdir().expect("tempdir");
        let mut runner = MockProcessRunner::new();
        runner.expect_run().returning(|_, args, _| {
            let log = log_path_from_args(args);
            std::fs::write(log, format!("{HEADER}\n1,500,home,200,OK,t1,true,\n"))
                .expect("write log");
            Ok(ok_output())
        });

        let checker = checker_with(resolving_cluster(), runner, scratch.path());
        let result = checker.check(&jmeter_check()).await;

        assert_eq!(result.status, CheckStatus::Passed, "{}", result.message);
        assert!(result.duration_ms >= 500);
    }

    #[tokio::test]
    async fn failed_record_fails_the_check_with_its_message() {
        let scratch = tempfile::tempdir().expect("tempdir");
        let mut runner = MockProcessRunner::new();
        runner.expect_run().returning(|_, args, _| {
            let log = log_path_from_args(args);
            std::fs::write(
                log,
                format!("{HEADER}\n1,500,home,200,OK,t1,true,\n2,300,login,504,ERR,t1,false,timeout\n"),
            )
            .expect("write log");
            Ok(ok_output())
        });

        let checker = checker_with(resolving_cluster(), runner, scratch.path());
        let result = checker.check(&jmeter_check()).await;

        assert_eq!(result.status, CheckStatus::Failed);
        assert!(result.message.contains("timeout"));
    }

    #[tokio::test]
    async fn exceeding_the_declared_response_duration_fails() {
        let scratch = tempfile::tempdir().expect("tempdir");
        let mut runner = MockProcessRunner::new();
        runner.expect_run().returning(|_, args, _| {
            let log = log_path_from_args(args);
            std::fs::write(
                log,
                format!("{HEADER}\n1,800,home,200,OK,t1,true,\n2,700,login,200,OK,t1,true,\n"),
            )
            .expect("write log");
            Ok(ok_output())
        });

        let mut check = jmeter_check();
        check.response_duration = Some("1s".to_string());

        let checker = checker_with(resolving_cluster(), runner, scratch.path());
        let result = checker.check(&check).await;

        assert_eq!(result.status, CheckStatus::Failed);
        assert!(result.message.contains("longer than"));
    }

    #[tokio::test]
    async fn unresolvable_plan_is_invalid_not_failed() {
        let scratch = tempfile::tempdir().expect("tempdir");
        let mut cluster = MockClusterOps::new();
        cluster.expect_resolve_value().returning(|_, _| {
            Err(crate::cluster::ClusterError::Resolve {
                reference: "configmap jmeter/jmeter-test.xml".to_string(),
                reason: "key not present".to_string(),
            })
        });

        let checker = checker_with(cluster, MockProcessRunner::new(), scratch.path());
        let result = checker.check(&jmeter_check()).await;

        assert_eq!(result.status, CheckStatus::Invalid);
    }

    #[tokio::test]
    async fn concurrent_evaluations_use_distinct_scratch_files_and_remove_them() {
        let scratch = tempfile::tempdir().expect("tempdir");
        let seen_plans: Arc<Mutex<Vec<PathBuf>>> = Arc::new(Mutex::new(Vec::new()));

        let mut runner = MockProcessRunner::new();
        let seen = seen_plans.clone();
        runner.expect_run().returning(move |_, args, _| {
            // Record the plan path and confirm it exists while we run.
            let plan = PathBuf::from(&args[2]);
            assert!(plan.exists(), "plan file must exist during the run");
            seen.lock().expect("lock").push(plan);

            let log = log_path_from_args(args);
            std::fs::write(log, format!("{HEADER}\n1,100,home,200,OK,t1,true,\n"))
                .expect("write log");
            Ok(ok_output())
        });

        // Two evaluations of the same declaration, run concurrently.
        let checker = checker_with(resolving_cluster(), runner, scratch.path());
        let check = jmeter_check();
        let (first, second) = tokio::join!(checker.check(&check), checker.check(&check));

        assert!(first.passed(), "{}", first.message);
        assert!(second.passed(), "{}", second.message);

        let plans = seen_plans.lock().expect("lock");
        assert_eq!(plans.len(), 2);
        assert_ne!(plans[0], plans[1], "scratch names must be per invocation");

        // Everything is cleaned up afterwards, pass or fail.
        let leftovers: Vec<_> = std::fs::read_dir(scratch.path())
            .expect("read scratch dir")
            .collect();
        assert!(leftovers.is_empty(), "scratch files were not removed");
    }

    #[tokio::test]
    async fn scratch_files_are_removed_when_the_run_fails() {
        let scratch = tempfile::tempdir().expect("tempdir");
        let mut runner = MockProcessRunner::new();
        runner.expect_run().returning(|_, _, _| {
            Ok(ProcessOutput {
                stdout: String::new(),
                stderr: "jmeter: boom".to_string(),
                success: false,
                exit_code: Some(1),
            })
        });

        let checker = checker_with(resolving_cluster(), runner, scratch.path());
        let result = checker.check(&jmeter_check()).await;

        assert_eq!(result.status, CheckStatus::Failed);
        let leftovers: Vec<_> = std::fs::read_dir(scratch.path())
            .expect("read scratch dir")
            .collect();
        assert!(leftovers.is_empty(), "scratch files were not removed");
    }
}
