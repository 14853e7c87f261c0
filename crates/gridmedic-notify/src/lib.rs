//! gridmedic-notify — Teams webhook notifications.
//!
//! Builds MessageCard payloads for failed scheduler jobs and failed
//! health runs and posts them to the configured webhook. Notification is
//! best-effort: a webhook outage is logged, never allowed to fail a run.

use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper_util::rt::TokioIo;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use gridmedic_orchestrator::ClusterVerdict;

const POST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invalid webhook url {0:?}")]
    Webhook(String),

    #[error("webhook post failed: {0}")]
    Post(String),
}

pub type NotifyResult<T> = Result<T, NotifyError>;

/// Context of a failed scheduler job, as the epilog hook reports it.
#[derive(Debug, Clone)]
pub struct JobFailure {
    pub job_id: String,
    pub user: String,
    pub exit_code: i32,
    pub nodes: Vec<String>,
}

/// MessageCard for a failed job.
pub fn job_failure_card(failure: &JobFailure) -> serde_json::Value {
    json!({
        "@type": "MessageCard",
        "@context": "https://schema.org/extensions",
        "themeColor": "FF0000",
        "summary": format!("Job {} failed", failure.job_id),
        "sections": [{
            "activityTitle": "Scheduler job failure detected",
            "facts": [
                {"name": "Job ID", "value": failure.job_id},
                {"name": "User", "value": failure.user},
                {"name": "Exit Code", "value": failure.exit_code.to_string()},
                {"name": "Nodes", "value": failure.nodes.join(", ")},
            ],
            "markdown": true,
        }],
    })
}

/// MessageCard summarizing a health run with failed nodes.
pub fn run_summary_card(verdict: &ClusterVerdict) -> serde_json::Value {
    let failed: Vec<String> = verdict
        .failed_nodes()
        .iter()
        .map(|n| n.result.node.clone())
        .collect();
    let quarantined: Vec<String> = verdict
        .quarantined_nodes()
        .iter()
        .map(|n| n.result.node.clone())
        .collect();

    json!({
        "@type": "MessageCard",
        "@context": "https://schema.org/extensions",
        "themeColor": "FF0000",
        "summary": format!("{} of {} nodes unhealthy", failed.len(), verdict.nodes.len()),
        "sections": [{
            "activityTitle": "Cluster health run found unhealthy nodes",
            "facts": [
                {"name": "Nodes Checked", "value": verdict.nodes.len().to_string()},
                {"name": "Failed", "value": failed.join(", ")},
                {"name": "Quarantined", "value": quarantined.join(", ")},
            ],
            "markdown": true,
        }],
    })
}

/// Posts MessageCards to a Teams incoming webhook.
pub struct TeamsNotifier {
    webhook_url: String,
}

impl TeamsNotifier {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            webhook_url: webhook_url.into(),
        }
    }

    /// Post a card. Errors are returned for the caller to log; callers
    /// treat notification as best-effort.
    pub async fn post(&self, card: &serde_json::Value) -> NotifyResult<()> {
        let (authority, path) = parse_webhook(&self.webhook_url)?;
        let body = card.to_string();

        let result = tokio::time::timeout(POST_TIMEOUT, async {
            let stream = tokio::net::TcpStream::connect(&authority)
                .await
                .map_err(|e| NotifyError::Post(format!("connect {authority}: {e}")))?;

            let io = TokioIo::new(stream);
            let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
                .await
                .map_err(|e| NotifyError::Post(format!("handshake: {e}")))?;

            tokio::spawn(async move {
                let _ = conn.await;
            });

            let req = http::Request::builder()
                .method("POST")
                .uri(&path)
                .header("host", &authority)
                .header("content-type", "application/json")
                .body(Full::new(Bytes::from(body)))
                .unwrap();

            let resp = sender
                .send_request(req)
                .await
                .map_err(|e| NotifyError::Post(format!("request: {e}")))?;

            if resp.status().is_success() {
                info!("teams notification sent");
                Ok(())
            } else {
                Err(NotifyError::Post(format!("webhook returned {}", resp.status())))
            }
        })
        .await;

        match result {
            Ok(inner) => inner,
            Err(_) => {
                warn!(timeout_secs = POST_TIMEOUT.as_secs(), "teams post timed out");
                Err(NotifyError::Post("timed out".to_string()))
            }
        }
    }
}

/// Split `http://host[:port]/path` into (`host:port`, `/path`).
fn parse_webhook(url: &str) -> NotifyResult<(String, String)> {
    let rest = url
        .strip_prefix("http://")
        .ok_or_else(|| NotifyError::Webhook(url.to_string()))?;

    let (authority, path) = match rest.split_once('/') {
        Some((authority, path)) => (authority, format!("/{path}")),
        None => (rest, "/".to_string()),
    };
    if authority.is_empty() {
        return Err(NotifyError::Webhook(url.to_string()));
    }

    let authority = if authority.contains(':') {
        authority.to_string()
    } else {
        format!("{authority}:80")
    };
    Ok((authority, path))
}
