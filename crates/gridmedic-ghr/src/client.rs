//! GHR submission client.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::Full;
use hyper_util::rt::TokioIo;
use tracing::debug;

use crate::{GhrError, GhrResult};

const SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport seam for GHR submission; tests inject fakes.
#[async_trait]
pub trait GhrClient: Send + Sync {
    async fn submit(&self, payload: &serde_json::Value) -> GhrResult<()>;
}

/// HTTP/1.1 POST client for the GHR endpoint.
pub struct HttpGhrClient {
    endpoint: String,
}

impl HttpGhrClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl GhrClient for HttpGhrClient {
    async fn submit(&self, payload: &serde_json::Value) -> GhrResult<()> {
        let (authority, path) = parse_http_endpoint(&self.endpoint)?;
        let body = serde_json::to_vec(payload)?;

        let result = tokio::time::timeout(SUBMIT_TIMEOUT, async {
            let stream = tokio::net::TcpStream::connect(&authority)
                .await
                .map_err(|e| GhrError::Submit(format!("connect {authority}: {e}")))?;

            let io = TokioIo::new(stream);
            let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
                .await
                .map_err(|e| GhrError::Submit(format!("handshake: {e}")))?;

            // Drive the connection in the background.
            tokio::spawn(async move {
                let _ = conn.await;
            });

            let req = http::Request::builder()
                .method("POST")
                .uri(&path)
                .header("host", &authority)
                .header("content-type", "application/json")
                .header("user-agent", "gridmedic-ghr/0.1")
                .body(Full::new(Bytes::from(body)))
                .unwrap();

            let resp = sender
                .send_request(req)
                .await
                .map_err(|e| GhrError::Submit(format!("request: {e}")))?;

            if resp.status().is_success() {
                debug!(status = %resp.status(), "ghr submission accepted");
                Ok(())
            } else {
                Err(GhrError::Submit(format!("endpoint returned {}", resp.status())))
            }
        })
        .await;

        match result {
            Ok(inner) => inner,
            Err(_) => Err(GhrError::Submit(format!(
                "timed out after {}s",
                SUBMIT_TIMEOUT.as_secs()
            ))),
        }
    }
}

/// Split `http://host[:port]/path` into (`host:port`, `/path`).
fn parse_http_endpoint(endpoint: &str) -> GhrResult<(String, String)> {
    let rest = endpoint
        .strip_prefix("http://")
        .ok_or_else(|| GhrError::Endpoint(endpoint.to_string()))?;

    let (authority, path) = match rest.split_once('/') {
        Some((authority, path)) => (authority, format!("/{path}")),
        None => (rest, "/".to_string()),
    };
    if authority.is_empty() {
        return Err(GhrError::Endpoint(endpoint.to_string()));
    }

    let authority = if authority.contains(':') {
        authority.to_string()
    } else {
        format!("{authority}:80")
    };
    Ok((authority, path))
}
