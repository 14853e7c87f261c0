//! gridmedicd — the GridMedic daemon/CLI.
//!
//! Single binary that assembles the health manager:
//! - Reboot history store (redb)
//! - SSH remote executor
//! - Cluster orchestrator (diagnosis fan-out + recovery)
//! - CSV/HTML reports, GHR submission, Teams notification
//!
//! # Usage
//!
//! ```text
//! gridmedicd sweep                      # proactive full-cluster run
//! gridmedicd epilog --job 4217 ...      # reactive, from the scheduler epilog
//! gridmedicd clear --node gpu-17        # operator releases a quarantine
//! gridmedicd show                       # dump the persisted history
//! ```

mod slurm;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use gridmedic_config::Config;
use gridmedic_ghr::{HttpGhrClient, SubmissionLog, run_ghr_if_needed};
use gridmedic_notify::{JobFailure, TeamsNotifier, job_failure_card, run_summary_card};
use gridmedic_orchestrator::{ClusterVerdict, Orchestrator, Target};
use gridmedic_remote::SshExecutor;
use gridmedic_state::HistoryStore;

use crate::slurm::SlurmNodeLister;

#[derive(Parser)]
#[command(name = "gridmedicd", about = "GPU cluster health manager")]
struct Cli {
    /// Data directory for persistent state (reboot history, GHR log).
    #[arg(long, default_value = "/var/lib/gridmedic")]
    data_dir: PathBuf,

    /// Directory where per-run reports are written.
    #[arg(long, default_value = "/var/lib/gridmedic/results")]
    result_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Proactive health sweep over the whole cluster inventory.
    Sweep,

    /// Reactive check from the scheduler epilog hook. Without a job id,
    /// falls back to a full-cluster sweep.
    Epilog {
        /// The failed job's id.
        #[arg(long)]
        job: Option<String>,

        /// The job's owner, for the notification card.
        #[arg(long, default_value = "")]
        user: String,

        /// The job's exit code, for the notification card.
        #[arg(long, default_value = "0")]
        exit_code: i32,
    },

    /// Clear a node's reboot history, releasing its quarantine.
    Clear {
        /// Node hostname.
        #[arg(long)]
        node: String,
    },

    /// Print the persisted reboot history.
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,gridmedicd=debug,gridmedic=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Command::Sweep => {
            let healthy =
                run_health(&config, &cli.data_dir, &cli.result_dir, Target::FullCluster, None)
                    .await?;
            if !healthy {
                std::process::exit(1);
            }
        }
        Command::Epilog { job, user, exit_code } => {
            let target = match &job {
                Some(id) => Target::Job(id.clone()),
                None => Target::FullCluster,
            };
            let context = job.map(|job_id| JobFailure {
                job_id,
                user,
                exit_code,
                nodes: Vec::new(),
            });
            let healthy =
                run_health(&config, &cli.data_dir, &cli.result_dir, target, context).await?;
            if !healthy {
                std::process::exit(1);
            }
        }
        Command::Clear { node } => {
            let store = open_store(&cli.data_dir)?;
            if store.clear(&node)? {
                info!(%node, "reboot history cleared");
            } else {
                info!(%node, "no history to clear");
            }
        }
        Command::Show => {
            let store = open_store(&cli.data_dir)?;
            for record in store.list()? {
                println!(
                    "{}\tattempts={}\tlast_reboot={}\t{:?}",
                    record.node, record.attempt_count, record.last_reboot_at, record.lifecycle
                );
            }
        }
    }

    Ok(())
}

fn open_store(data_dir: &Path) -> anyhow::Result<HistoryStore> {
    std::fs::create_dir_all(data_dir)?;
    Ok(HistoryStore::open(&data_dir.join("gridmedic.redb"))?)
}

/// One full health run: diagnose, recover, report, submit, notify.
///
/// Returns whether the cluster came out healthy.
async fn run_health(
    config: &Config,
    data_dir: &Path,
    result_dir: &Path,
    target: Target,
    mut job_context: Option<JobFailure>,
) -> anyhow::Result<bool> {
    info!(?target, "health run requested");

    let store = open_store(data_dir)?;
    let executor = Arc::new(SshExecutor::new());
    let orchestrator = Orchestrator::new(config.clone(), executor, store);
    let lister = SlurmNodeLister::new(config.inventory());

    let verdict = orchestrator.run(&target, &lister).await?;

    // Reports are written even for a clean run.
    let run_dir = result_dir.join(format!("run-{}", verdict.started_at));
    let (csv_path, html_path) = gridmedic_report::write_summary(&verdict, &run_dir)?;
    info!(csv = %csv_path.display(), html = %html_path.display(), "reports written");

    submit_ghr(config, data_dir, &verdict).await;
    notify_teams(config, &verdict, job_context.take()).await;

    let healthy = verdict.all_passing();
    if healthy {
        info!(nodes = verdict.nodes.len(), "cluster healthy");
    } else {
        warn!(
            failed = verdict.failed_nodes().len(),
            quarantined = verdict.quarantined_nodes().len(),
            "cluster has unhealthy nodes"
        );
    }
    Ok(healthy)
}

/// GHR submission is best-effort; a dead endpoint never fails the run.
async fn submit_ghr(config: &Config, data_dir: &Path, verdict: &ClusterVerdict) {
    let log = SubmissionLog::new(data_dir.join("ghr_log.ndjson"));
    let client = HttpGhrClient::new(&config.ghr.endpoint);
    match run_ghr_if_needed(
        config.enable_ghr,
        &config.ghr,
        verdict,
        &log,
        &client,
        epoch_secs(),
    )
    .await
    {
        Ok(outcome) => info!(?outcome, "ghr controller finished"),
        Err(e) => warn!(error = %e, "ghr submission errored"),
    }
}

/// Teams notification is best-effort and only fires for unhealthy runs.
async fn notify_teams(config: &Config, verdict: &ClusterVerdict, job_context: Option<JobFailure>) {
    let Some(url) = &config.teams_webhook_url else {
        return;
    };
    if verdict.all_passing() {
        return;
    }

    let card = match job_context {
        Some(mut failure) => {
            failure.nodes = verdict
                .nodes
                .iter()
                .map(|n| n.result.node.clone())
                .collect();
            job_failure_card(&failure)
        }
        None => run_summary_card(verdict),
    };

    if let Err(e) = TeamsNotifier::new(url).post(&card).await {
        warn!(error = %e, "teams notification failed");
    }
}

/// Current Unix epoch in seconds.
fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
