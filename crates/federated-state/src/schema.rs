//! Schema definitions for hivesync SurrealDB tables
//!
//! Tables:
//! - repos: governance configuration per federated repo
//! - streams: review streams and their status
//! - reviews: individual reviews feeding consensus
//! - proposals: council proposals
//! - sync_events: ordered outbound event queue
//! - merge_records: append-only merge audit log
//!
//! Rows carry string statuses; conversion to/from the typed
//! `storage_traits` enums happens at the store boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bridges chrono timestamps to SurrealDB's native datetime type so
/// time-ordered indexes work server-side.
mod surreal_dt {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        SurrealDatetime::from(*ts).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        Ok(DateTime::from(SurrealDatetime::deserialize(d)?))
    }

    pub mod opt {
        use super::*;

        pub fn serialize<S: Serializer>(
            ts: &Option<DateTime<Utc>>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            ts.map(SurrealDatetime::from).serialize(s)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            Ok(Option::<SurrealDatetime>::deserialize(d)?.map(DateTime::from))
        }
    }
}

/// DB row for the `repos` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoRow {
    pub repo_id: String,
    pub merge_mode: String,
    pub git_backend: String,
    pub buffer_branch: String,
    pub promote_target: String,
    pub require_human_approval: bool,
    pub human_review_weight: f64,
    pub review_quorum: f64,
    pub maintainers: Vec<String>,
    /// `[{ plugin_id, requires_remote }]`
    pub plugins: serde_json::Value,
    #[serde(with = "surreal_dt")]
    pub created_at: DateTime<Utc>,
}

/// DB row for the `streams` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamRow {
    pub stream_id: String,
    pub repo_id: String,
    pub branch: String,
    pub title: String,
    pub author: String,
    pub review_status: String,
    pub merge_ref: Option<String>,
    #[serde(with = "surreal_dt")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "surreal_dt")]
    pub updated_at: DateTime<Utc>,
}

/// DB row for the `reviews` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRow {
    pub review_id: String,
    pub stream_id: String,
    pub reviewer: String,
    pub approved: bool,
    pub human: bool,
    pub comment: Option<String>,
    #[serde(with = "surreal_dt")]
    pub created_at: DateTime<Utc>,
}

/// DB row for the `proposals` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalRow {
    pub proposal_id: String,
    pub kind: String,
    pub repo_id: String,
    pub stream_id: Option<String>,
    pub votes_for: u32,
    pub votes_against: u32,
    pub status: String,
    #[serde(with = "surreal_dt")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "surreal_dt::opt")]
    #[serde(default)]
    pub decided_at: Option<DateTime<Utc>>,
}

/// DB row for the `sync_events` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncEventRow {
    pub seq: u64,
    pub kind: String,
    pub payload: serde_json::Value,
    #[serde(with = "surreal_dt")]
    pub created_at: DateTime<Utc>,
    pub attempts: u32,
    pub last_error: Option<String>,
}

/// DB row for the `merge_records` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRecordRow {
    pub record_id: String,
    pub proposal_id: String,
    pub repo_id: String,
    pub stream_id: Option<String>,
    pub operation: String,
    pub backend: String,
    pub executed: bool,
    pub outcome: String,
    pub merge_ref: Option<String>,
    pub detail: Option<String>,
    pub digest: String,
    #[serde(with = "surreal_dt")]
    pub created_at: DateTime<Utc>,
}
