#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! Synthetic monitoring check engine.
//!
//! A canary declares a batch of checks grouped by kind; the dispatch engine
//! routes each group to its registered checker and collects one normalized
//! result per check instance. The pod and namespace kinds provision a
//! short-lived workload in the cluster and walk it through a timed
//! schedule/ready/probe/teardown lifecycle; the jmeter kind delegates its
//! verdict to an external process and judges the log it writes.

pub mod checks;
pub mod cluster;
pub mod config;
pub mod crds;
pub mod exec;

// Re-export commonly used types
pub use checks::{Check, CheckResult, CheckStatus, Checker, Registry};
pub use cluster::{ClusterOps, KubeCluster};
pub use config::EngineConfig;
pub use crds::{Canary, CanarySpec, CanaryStatus};
pub use exec::{ProcessRunner, TokioProcessRunner};
