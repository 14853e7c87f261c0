//! GHR payload construction.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::json;

use gridmedic_orchestrator::ClusterVerdict;

/// A failed node and the diagnostic error codes it reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedNode {
    pub node: String,
    pub errors: Vec<String>,
}

/// Extract the nodes worth reporting: those whose diagnosis emitted
/// error codes.
pub fn failed_entries(verdict: &ClusterVerdict) -> Vec<FailedNode> {
    verdict
        .nodes
        .iter()
        .filter_map(|report| {
            let errors = report.result.error_codes();
            (!errors.is_empty()).then(|| FailedNode {
                node: report.result.node.clone(),
                errors,
            })
        })
        .collect()
}

/// Build the submission payload.
///
/// `timestamp` is Unix epoch seconds; the request id is derived from the
/// submission wall clock so retried batches stay correlated.
pub fn build_payload(
    category: &str,
    description: &str,
    nodes: &[FailedNode],
    timestamp: u64,
    request_id: &str,
) -> serde_json::Value {
    json!({
        "properties": {
            "category": category,
            "description": description,
            "timestamp": timestamp,
            "nodes": nodes,
            "requestId": request_id,
        }
    })
}

/// Generate a request id from the current wall clock.
pub fn new_request_id() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
        .to_string()
}
