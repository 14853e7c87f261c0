//! Slurm-backed node list resolution.
//!
//! The cluster inventory comes from configuration (`{prefix}-{i}`); job
//! node sets come from the scheduler — the epilog exports
//! `SLURM_JOB_NODELIST`, and completed jobs are resolved through
//! accounting. Compressed host lists (`gpu-[1-4]`) are expanded with
//! `scontrol show hostnames`.

use anyhow::Context;
use async_trait::async_trait;
use tracing::{debug, warn};

use gridmedic_orchestrator::{NodeLister, parse_node_list};

pub struct SlurmNodeLister {
    inventory: Vec<String>,
}

impl SlurmNodeLister {
    pub fn new(inventory: Vec<String>) -> Self {
        Self { inventory }
    }
}

#[async_trait]
impl NodeLister for SlurmNodeLister {
    async fn cluster_nodes(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.inventory.clone())
    }

    async fn job_nodes(&self, job_id: &str) -> anyhow::Result<Vec<String>> {
        // The epilog hook exports the allocation directly.
        let raw = match std::env::var("SLURM_JOB_NODELIST") {
            Ok(value) if !value.trim().is_empty() => value,
            _ => {
                local_command("sacct", &["-j", job_id, "-X", "-n", "-o", "NodeList%200"])
                    .await
                    .with_context(|| format!("resolving nodes of job {job_id}"))?
            }
        };

        // "(null)" and empty answers mean no allocation, not an error.
        if parse_node_list(&raw).is_empty() {
            debug!(%job_id, "job resolved to no nodes");
            return Ok(Vec::new());
        }

        expand_nodelist(raw.trim()).await
    }
}

/// Expand a (possibly compressed) Slurm node list into hostnames.
async fn expand_nodelist(nodelist: &str) -> anyhow::Result<Vec<String>> {
    match local_command("scontrol", &["show", "hostnames", nodelist]).await {
        Ok(stdout) => Ok(parse_node_list(&stdout)),
        Err(e) => {
            // Without scontrol, uncompressed comma lists still work.
            warn!(error = %e, "scontrol expansion failed, splitting verbatim");
            Ok(split_nodelist(nodelist))
        }
    }
}

/// Verbatim fallback split for uncompressed `a,b,c` lists.
fn split_nodelist(nodelist: &str) -> Vec<String> {
    nodelist
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Run a local scheduler command and capture stdout.
async fn local_command(program: &str, args: &[&str]) -> anyhow::Result<String> {
    let output = tokio::process::Command::new(program)
        .args(args)
        .output()
        .await
        .with_context(|| format!("spawning {program}"))?;

    if !output.status.success() {
        anyhow::bail!(
            "{program} exited {}: {}",
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
