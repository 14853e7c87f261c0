//! NDJSON submission log.
//!
//! Append-only record of every GHR submission attempt. The
//! recent-success gate scans it newest-first.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::GhrResult;
use crate::payload::FailedNode;

#[derive(Debug, Serialize, Deserialize)]
struct LogEntry {
    /// Unix epoch seconds of the attempt.
    epoch: u64,
    /// "success" or "failure".
    status: String,
    #[serde(rename = "requestId")]
    request_id: String,
    nodes: Vec<FailedNode>,
}

/// Append-only NDJSON log of submission attempts.
#[derive(Debug, Clone)]
pub struct SubmissionLog {
    path: PathBuf,
}

impl SubmissionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Append one attempt.
    pub fn record(
        &self,
        epoch: u64,
        status: &str,
        request_id: &str,
        nodes: &[FailedNode],
    ) -> GhrResult<()> {
        let entry = LogEntry {
            epoch,
            status: status.to_string(),
            request_id: request_id.to_string(),
            nodes: nodes.to_vec(),
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        debug!(path = %self.path.display(), status, "ghr attempt recorded");
        Ok(())
    }

    /// Whether a successful submission happened within `window` of `now`.
    ///
    /// Unparseable lines are skipped — a corrupted log never blocks the
    /// gate decision.
    pub fn has_recent_success(&self, now: u64, window: Duration) -> bool {
        let Ok(content) = std::fs::read_to_string(&self.path) else {
            return false;
        };
        let cutoff = now.saturating_sub(window.as_secs());

        for line in content.lines().rev() {
            let Ok(entry) = serde_json::from_str::<LogEntry>(line) else {
                continue;
            };
            if entry.status == "success" && entry.epoch >= cutoff {
                return true;
            }
        }
        false
    }
}
