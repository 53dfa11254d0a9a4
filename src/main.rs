use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use converge_engine::{Executor, ExecutorConfig, RunReport};
use converge_graph::DependencyGraph;
use converge_manifest::Manifest;
use converge_target::{DryRunTarget, MemoryTarget};

/// Converge - dependency-ordered, concurrent provisioning of declared tasks
#[derive(Parser)]
#[command(name = "converge")]
#[command(version, about, long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Print the execution levels of a manifest
  Graph {
    /// Path to the manifest file (JSON)
    manifest: PathBuf,
  },

  /// Show what applying a manifest would change, without writing anything
  Plan {
    /// Path to the manifest file (JSON)
    manifest: PathBuf,

    /// State file to plan against
    #[arg(long)]
    state: Option<PathBuf>,
  },

  /// Apply a manifest
  Apply {
    /// Path to the manifest file (JSON)
    manifest: PathBuf,

    /// State file to read and update
    #[arg(long)]
    state: Option<PathBuf>,

    /// Refuse every write; lifecycles decide whether that fails a task
    #[arg(long)]
    read_only: bool,

    /// Maximum number of tasks rendering at once
    #[arg(long)]
    max_concurrency: Option<usize>,

    /// Per-task timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
    .with_writer(std::io::stderr)
    .init();

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async {
    match cli.command {
      Commands::Graph { manifest } => show_graph(manifest).await,
      Commands::Plan { manifest, state } => plan(manifest, state).await,
      Commands::Apply {
        manifest,
        state,
        read_only,
        max_concurrency,
        timeout_ms,
      } => {
        let overrides = ExecutorOverrides {
          max_concurrency,
          timeout_ms,
        };
        apply(manifest, state, read_only, overrides).await
      }
    }
  })
}

/// Executor settings given on the command line; they win over the manifest.
struct ExecutorOverrides {
  max_concurrency: Option<usize>,
  timeout_ms: Option<u64>,
}

impl ExecutorOverrides {
  fn apply_to(&self, mut config: ExecutorConfig) -> ExecutorConfig {
    if let Some(max_concurrency) = self.max_concurrency {
      config.max_concurrency = Some(max_concurrency);
    }
    if let Some(timeout_ms) = self.timeout_ms {
      config.task_timeout = Some(Duration::from_millis(timeout_ms));
    }
    config
  }
}

async fn show_graph(manifest_file: PathBuf) -> Result<()> {
  let manifest = load_manifest(&manifest_file).await?;
  let graph = DependencyGraph::build(&manifest.tasks).context("invalid task graph")?;
  let plan = graph.plan();

  eprintln!(
    "{} tasks in {} levels ({} edges)",
    plan.len(),
    plan.depth(),
    graph.edge_count()
  );
  println!("{}", serde_json::to_string_pretty(&plan)?);

  Ok(())
}

async fn plan(manifest_file: PathBuf, state_file: Option<PathBuf>) -> Result<()> {
  let manifest = load_manifest(&manifest_file).await?;
  let state = load_state(state_file.as_deref()).await?;

  let target = Arc::new(DryRunTarget::new(state));
  let executor = Executor::new(manifest.executor_config());
  let report = executor
    .build_and_execute(
      Arc::new(manifest.tasks),
      target.clone(),
      cancel_on_ctrl_c(),
    )
    .await
    .context("invalid task graph")?;

  println!("{}", serde_json::to_string_pretty(&target.changes().await)?);
  finish(&report)
}

async fn apply(
  manifest_file: PathBuf,
  state_file: Option<PathBuf>,
  read_only: bool,
  overrides: ExecutorOverrides,
) -> Result<()> {
  let manifest = load_manifest(&manifest_file).await?;
  let state = load_state(state_file.as_deref()).await?;

  let mut target = MemoryTarget::from_snapshot(state);
  if read_only {
    target = target.read_only();
  }
  let target = Arc::new(target);

  let config = overrides.apply_to(manifest.executor_config());
  let executor = Executor::new(config);
  let report = executor
    .build_and_execute(
      Arc::new(manifest.tasks),
      target.clone(),
      cancel_on_ctrl_c(),
    )
    .await
    .context("invalid task graph")?;

  println!("{}", serde_json::to_string_pretty(&report)?);

  if let Some(state_file) = state_file.filter(|_| !read_only) {
    let snapshot = serde_json::to_string_pretty(&target.snapshot().await)?;
    tokio::fs::write(&state_file, snapshot)
      .await
      .with_context(|| format!("failed to write state file: {}", state_file.display()))?;
    info!(path = %state_file.display(), "saved state");
  }

  finish(&report)
}

async fn load_manifest(path: &Path) -> Result<Manifest> {
  let manifest = Manifest::load(path)
    .await
    .with_context(|| format!("failed to load manifest: {}", path.display()))?;
  eprintln!("Loaded manifest with {} tasks", manifest.tasks.len());
  Ok(manifest)
}

/// Read a state file. A missing file is an empty state.
async fn load_state(path: Option<&Path>) -> Result<BTreeMap<String, Value>> {
  let Some(path) = path else {
    return Ok(BTreeMap::new());
  };

  match tokio::fs::read_to_string(path).await {
    Ok(content) => serde_json::from_str(&content)
      .with_context(|| format!("failed to parse state file: {}", path.display())),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
      warn!(path = %path.display(), "state file not found, starting empty");
      Ok(BTreeMap::new())
    }
    Err(e) => {
      Err(e).with_context(|| format!("failed to read state file: {}", path.display()))
    }
  }
}

/// Cancel the run on the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
  let cancel = CancellationToken::new();
  let token = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      warn!("interrupted, cancelling run");
      token.cancel();
    }
  });
  cancel
}

fn finish(report: &RunReport) -> Result<()> {
  let summary = report.summary();
  eprintln!("Run {}: {}", report.run_id, summary);

  if !report.is_success() {
    for key in report.failed() {
      if let Some(outcome) = report.get(key) {
        eprintln!("  {key}: {outcome:?}");
      }
    }
    if summary.failed == 0 {
      bail!("run cancelled: {} of {} tasks skipped", summary.skipped, summary.total);
    }
    bail!("run failed: {} of {} tasks failed", summary.failed, summary.total);
  }

  Ok(())
}
