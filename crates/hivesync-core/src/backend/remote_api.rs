//! Remote code-hosting API backend.
//!
//! Operations are expressed through the hosting service's request model.
//! A merge can complete synchronously when the service accepts it; a
//! revert is modeled as creating a new revert request (never an in-place
//! operation), so `revert` always comes back `executed: false` with the
//! authoritative signal left to the remote status flag. Promotion records
//! intent only — the actual fast-forward happens remotely.
//!
//! Transport failures are folded into `Deferred` outcomes: the operation
//! is retryable and the failure is carried in the outcome, never thrown.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use federated_state::{GitBackendKind, RepoRecord, StreamRecord};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::{BackendOutcome, MergeBackend};
use crate::error::Result;
use crate::remote::RemoteError;

/// Response from a hosting API request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostingResponse {
    pub accepted: bool,
    pub merge_ref: Option<String>,
    pub message: Option<String>,
}

/// Client seam for the code-hosting service's request endpoints.
#[async_trait]
pub trait HostingApi: Send + Sync {
    /// Ask the service to merge the stream's branch into the buffer.
    async fn merge_request(
        &self,
        repo: &RepoRecord,
        stream: &StreamRecord,
    ) -> std::result::Result<HostingResponse, RemoteError>;

    /// Create a revert request for the stream's merged change.
    async fn create_revert_request(
        &self,
        repo: &RepoRecord,
        stream: &StreamRecord,
    ) -> std::result::Result<HostingResponse, RemoteError>;

    /// Record the intent to promote buffer → target; the fast-forward
    /// itself happens remotely.
    async fn record_promote_intent(
        &self,
        repo: &RepoRecord,
    ) -> std::result::Result<HostingResponse, RemoteError>;
}

/// Merge backend over a [`HostingApi`].
pub struct RemoteApiBackend {
    api: Arc<dyn HostingApi>,
}

impl RemoteApiBackend {
    pub fn new(api: Arc<dyn HostingApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl MergeBackend for RemoteApiBackend {
    fn kind(&self) -> GitBackendKind {
        GitBackendKind::RemoteApi
    }

    async fn merge(&self, stream: &StreamRecord, repo: &RepoRecord) -> Result<BackendOutcome> {
        debug!(stream = %stream.stream_id, repo = %repo.repo_id, "remote-api merge");

        match self.api.merge_request(repo, stream).await {
            Ok(response) if response.accepted => {
                Ok(BackendOutcome::completed(response.merge_ref))
            }
            Ok(response) => Ok(BackendOutcome::conflicted(
                response
                    .message
                    .unwrap_or_else(|| "merge request rejected by hosting service".to_string()),
            )),
            Err(err) => Ok(BackendOutcome::deferred(format!(
                "merge request not delivered: {err}"
            ))),
        }
    }

    async fn revert(&self, stream: &StreamRecord, repo: &RepoRecord) -> Result<BackendOutcome> {
        debug!(stream = %stream.stream_id, repo = %repo.repo_id, "remote-api revert request");

        // Never executed in place: the remote status flag stays
        // authoritative regardless of how request creation went.
        match self.api.create_revert_request(repo, stream).await {
            Ok(response) if response.accepted => Ok(BackendOutcome::deferred(
                "revert request created; remote status flag is authoritative",
            )),
            Ok(response) => Ok(BackendOutcome::deferred(format!(
                "revert request rejected: {}",
                response.message.unwrap_or_default()
            ))),
            Err(err) => Ok(BackendOutcome::deferred(format!(
                "revert request not delivered: {err}"
            ))),
        }
    }

    async fn fast_forward_promote(&self, repo: &RepoRecord) -> Result<BackendOutcome> {
        debug!(repo = %repo.repo_id, "remote-api promote intent");

        match self.api.record_promote_intent(repo).await {
            Ok(response) if response.accepted => Ok(BackendOutcome::deferred(
                "promote intent recorded; fast-forward happens remotely",
            )),
            Ok(response) => Ok(BackendOutcome::deferred(format!(
                "promote intent rejected: {}",
                response.message.unwrap_or_default()
            ))),
            Err(err) => Ok(BackendOutcome::deferred(format!(
                "promote intent not delivered: {err}"
            ))),
        }
    }
}

/// HTTP implementation of [`HostingApi`].
pub struct HttpHostingApi {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpHostingApi {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> std::result::Result<Self, RemoteError> {
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

    async fn post(
        &self,
        path: String,
        body: serde_json::Value,
    ) -> std::result::Result<HostingResponse, RemoteError> {
        let req = self.client.post(format!("{}{}", self.base_url, path));
        let req = match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        };

        let response = req.json(&body).send().await.map_err(|e| {
            if e.is_timeout() {
                RemoteError::Timeout(e.to_string())
            } else {
                RemoteError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RemoteError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<HostingResponse>()
            .await
            .map_err(|e| RemoteError::Network(format!("malformed hosting response: {e}")))
    }
}

#[async_trait]
impl HostingApi for HttpHostingApi {
    async fn merge_request(
        &self,
        repo: &RepoRecord,
        stream: &StreamRecord,
    ) -> std::result::Result<HostingResponse, RemoteError> {
        self.post(
            format!("/repos/{}/merges", repo.repo_id),
            serde_json::json!({
                "branch": stream.branch,
                "target": repo.buffer_branch,
                "stream_id": stream.stream_id,
            }),
        )
        .await
    }

    async fn create_revert_request(
        &self,
        repo: &RepoRecord,
        stream: &StreamRecord,
    ) -> std::result::Result<HostingResponse, RemoteError> {
        self.post(
            format!("/repos/{}/reverts", repo.repo_id),
            serde_json::json!({
                "stream_id": stream.stream_id,
                "merge_ref": stream.merge_ref,
            }),
        )
        .await
    }

    async fn record_promote_intent(
        &self,
        repo: &RepoRecord,
    ) -> std::result::Result<HostingResponse, RemoteError> {
        self.post(
            format!("/repos/{}/promotions", repo.repo_id),
            serde_json::json!({
                "from": repo.buffer_branch,
                "to": repo.promote_target,
            }),
        )
        .await
    }
}
