//! Remote authority client.
//!
//! The remote authority is the central coordination service an agent
//! synchronizes with in federated mode. This module defines the trait
//! seam the engine consumes — merge-request delegation and sync-event
//! acknowledgement — plus an HTTP implementation. Tests inject fakes.

use async_trait::async_trait;
use federated_state::{RepoId, StreamId, SyncEvent};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Transport-level failures talking to the remote authority.
///
/// A timeout is classified identically to a network failure — the caller
/// must treat both as "not delivered", never as success.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("remote rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
}

impl RemoteError {
    /// Whether this failure means the remote was unreachable (as opposed
    /// to an explicit negative answer).
    pub fn is_unreachable(&self) -> bool {
        matches!(self, RemoteError::Network(_) | RemoteError::Timeout(_))
    }
}

/// The remote authority's answer to a delegated merge request.
///
/// The decision is authoritative: permission and consensus were verified
/// server-side and must not be re-checked locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeDecision {
    pub approved: bool,
    /// Server-side consensus weight, when the server computed one.
    pub consensus: Option<f64>,
    /// Buffer branch the server expects the merge to land in.
    pub buffer_branch: Option<String>,
    pub reason: Option<String>,
}

/// Per-event acknowledgement from a flush delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventAck {
    pub seq: u64,
    pub accepted: bool,
    pub reason: Option<String>,
}

/// Client seam for the remote authority endpoints the engine consumes.
#[async_trait]
pub trait RemoteAuthority: Send + Sync {
    /// Delegate a gated merge decision to the remote authority, which
    /// independently verifies permission and recomputes consensus.
    async fn request_merge(
        &self,
        repo_id: &RepoId,
        stream_id: &StreamId,
    ) -> Result<MergeDecision, RemoteError>;

    /// Deliver a batch of sync events for acknowledgement. Returns one
    /// ack/nack per delivered event.
    async fn ack_events(&self, batch: &[SyncEvent]) -> Result<Vec<EventAck>, RemoteError>;
}

/// HTTP implementation of [`RemoteAuthority`].
pub struct HttpRemoteAuthority {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpRemoteAuthority {
    /// Build a client for the authority at `base_url`.
    ///
    /// Requests carry a bearer token when one is provided and time out
    /// after 30 seconds.
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RemoteError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn request(&self, url: String) -> reqwest::RequestBuilder {
        let req = self.client.post(url);
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    fn classify(err: reqwest::Error) -> RemoteError {
        if err.is_timeout() {
            RemoteError::Timeout(err.to_string())
        } else {
            RemoteError::Network(err.to_string())
        }
    }
}

#[derive(Serialize)]
struct MergeRequestBody<'a> {
    repo_id: &'a str,
    stream_id: &'a str,
}

#[derive(Serialize)]
struct AckBatchBody<'a> {
    events: &'a [SyncEvent],
}

#[derive(Deserialize)]
struct AckBatchResponse {
    acks: Vec<EventAck>,
}

#[async_trait]
impl RemoteAuthority for HttpRemoteAuthority {
    async fn request_merge(
        &self,
        repo_id: &RepoId,
        stream_id: &StreamId,
    ) -> Result<MergeDecision, RemoteError> {
        let url = format!("{}/federation/merge-requests", self.base_url);
        debug!(repo_id = %repo_id, stream_id = %stream_id, "delegating merge request");

        let response = self
            .request(url)
            .json(&MergeRequestBody {
                repo_id: &repo_id.0,
                stream_id: &stream_id.0,
            })
            .send()
            .await
            .map_err(Self::classify)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RemoteError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<MergeDecision>()
            .await
            .map_err(|e| RemoteError::Network(format!("malformed merge decision: {e}")))
    }

    async fn ack_events(&self, batch: &[SyncEvent]) -> Result<Vec<EventAck>, RemoteError> {
        let url = format!("{}/federation/events", self.base_url);
        debug!(count = batch.len(), "delivering sync events");

        let response = self
            .request(url)
            .json(&AckBatchBody { events: batch })
            .send()
            .await
            .map_err(Self::classify)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RemoteError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let body = response
            .json::<AckBatchResponse>()
            .await
            .map_err(|e| RemoteError::Network(format!("malformed ack response: {e}")))?;
        Ok(body.acks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_classification() {
        assert!(RemoteError::Network("down".into()).is_unreachable());
        assert!(RemoteError::Timeout("slow".into()).is_unreachable());
        assert!(!RemoteError::Rejected {
            status: 403,
            message: "no".into()
        }
        .is_unreachable());
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = HttpRemoteAuthority::new("https://hive.example/", None).unwrap();
        assert_eq!(client.base_url, "https://hive.example");
    }
}
