//! Target node resolution.

use async_trait::async_trait;
use tracing::debug;

/// What a run should cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Every node in the cluster inventory.
    FullCluster,
    /// Only the nodes that executed the given job.
    Job(String),
}

/// Resolves node sets. The scheduler-specific implementation lives in the
/// daemon; the orchestrator only consumes the trait.
#[async_trait]
pub trait NodeLister: Send + Sync {
    /// All nodes in the cluster inventory.
    async fn cluster_nodes(&self) -> anyhow::Result<Vec<String>>;

    /// The nodes that executed `job_id`. An unknown job resolves to the
    /// empty set, not an error.
    async fn job_nodes(&self, job_id: &str) -> anyhow::Result<Vec<String>>;
}

/// Fixed inventory lister: `{prefix}-1` … `{prefix}-{count}`.
#[derive(Debug, Clone)]
pub struct StaticNodeList {
    nodes: Vec<String>,
}

impl StaticNodeList {
    pub fn new(nodes: Vec<String>) -> Self {
        Self { nodes }
    }

    pub fn from_inventory(prefix: &str, count: u32) -> Self {
        Self {
            nodes: (1..=count).map(|i| format!("{prefix}-{i}")).collect(),
        }
    }
}

#[async_trait]
impl NodeLister for StaticNodeList {
    async fn cluster_nodes(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.nodes.clone())
    }

    async fn job_nodes(&self, job_id: &str) -> anyhow::Result<Vec<String>> {
        // A static inventory knows nothing about jobs.
        debug!(%job_id, "static node list cannot resolve jobs");
        Ok(Vec::new())
    }
}

/// Parse a scheduler node-list answer into hostnames.
///
/// The scheduler reports `(null)` for jobs with no recorded allocation;
/// that and the empty string mean "no nodes", not an error.
pub fn parse_node_list(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "(null)" || trimmed == "None assigned" {
        return Vec::new();
    }
    trimmed
        .split_whitespace()
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inventory_expansion() {
        let lister = StaticNodeList::from_inventory("gpu", 3);
        let nodes = lister.cluster_nodes().await.unwrap();
        assert_eq!(nodes, vec!["gpu-1", "gpu-2", "gpu-3"]);
    }

    #[tokio::test]
    async fn static_lister_resolves_jobs_to_nothing() {
        let lister = StaticNodeList::from_inventory("gpu", 3);
        assert!(lister.job_nodes("J123").await.unwrap().is_empty());
    }

    #[test]
    fn null_node_list_is_empty_not_an_error() {
        assert!(parse_node_list("(null)").is_empty());
        assert!(parse_node_list("").is_empty());
        assert!(parse_node_list("   \n").is_empty());
    }

    #[test]
    fn node_list_splits_lines_and_spaces() {
        assert_eq!(
            parse_node_list("gpu-1\ngpu-2\n"),
            vec!["gpu-1", "gpu-2"]
        );
        assert_eq!(parse_node_list("gpu-1 gpu-2"), vec!["gpu-1", "gpu-2"]);
    }
}
