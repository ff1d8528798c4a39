//! One-shot canary runner: load a declared check document, evaluate every
//! check once, log the results, and exit non-zero when anything failed.

use anyhow::{Context, Result};
use canary::{CanarySpec, CheckStatus, EngineConfig, KubeCluster, Registry, TokioProcessRunner};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "canary-runner", version, about = "Run a canary's checks once")]
struct Cli {
    /// Canary document (a Canary spec or bare CanarySpec, YAML).
    #[arg(long)]
    canary: PathBuf,

    /// Engine configuration file.
    #[arg(long, default_value = "/config/config.yaml")]
    config: PathBuf,

    /// Override the configured resolve namespace.
    #[arg(long)]
    namespace: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,canary=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    info!("Starting canary-runner v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match EngineConfig::from_mounted_file(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            warn!(error = %err, "failed to load configuration, using defaults");
            EngineConfig::default()
        }
    };
    if let Some(namespace) = cli.namespace {
        config.namespace = namespace;
    }

    let raw = std::fs::read_to_string(&cli.canary)
        .with_context(|| format!("failed to read {}", cli.canary.display()))?;
    let spec = parse_canary_document(&raw)
        .with_context(|| format!("failed to parse {}", cli.canary.display()))?;
    info!(checks = spec.check_count(), "loaded canary document");

    let client = kube::Client::try_default()
        .await
        .context("failed to build kubernetes client")?;
    let cluster = Arc::new(KubeCluster::new(client));
    let registry = Registry::new(cluster, Arc::new(TokioProcessRunner), &config);

    let results = registry.dispatch(&spec).await;

    let mut failed = 0usize;
    for result in &results {
        match result.status {
            CheckStatus::Passed => info!("{result}"),
            CheckStatus::Failed | CheckStatus::Invalid => {
                failed += 1;
                error!("{result}");
            }
        }
    }
    info!(
        total = results.len(),
        passed = results.len() - failed,
        failed,
        "canary run complete"
    );

    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Accept either a full `Canary` resource or a bare spec document.
fn parse_canary_document(raw: &str) -> Result<CanarySpec> {
    if let Ok(resource) = serde_yaml::from_str::<canary::Canary>(raw) {
        return Ok(resource.spec);
    }
    serde_yaml::from_str::<CanarySpec>(raw).context("not a Canary resource or CanarySpec")
}
