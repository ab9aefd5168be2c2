//! SurrealDB-backed implementation of the hivesync storage traits
//!
//! Uses the `schema` row types for persistence, converting to/from
//! `storage_traits` types at the boundary. One handle implements every
//! store trait so a single connection backs the whole engine.

use async_trait::async_trait;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::{StateError, StorageError};
use crate::migrations;
use crate::schema::{
    MergeRecordRow, ProposalRow, RepoRow, ReviewRow, StreamRow, SyncEventRow,
};
use crate::storage_traits::*;

/// SurrealDB-backed federation state store.
pub struct SurrealFederationStore {
    db: Surreal<Any>,
}

impl SurrealFederationStore {
    /// Create an in-memory instance for testing.
    ///
    /// Connects to `mem://`, selects `hivesync/main`, and runs `init_schema`.
    pub async fn in_memory() -> crate::Result<Self> {
        let db = surrealdb::engine::any::connect("mem://")
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        db.use_ns("hivesync")
            .use_db("main")
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;

        info!("SurrealFederationStore connected (in-memory)");
        Ok(Self { db })
    }

    /// Create from environment variables.
    ///
    /// Reads `SURREALDB_URL`; when unset, falls back to local persistence
    /// in `.hivesync/db` via surrealkv.
    pub async fn from_env() -> crate::Result<Self> {
        if let Ok(url) = std::env::var("SURREALDB_URL") {
            let db = surrealdb::engine::any::connect(&url)
                .await
                .map_err(|e| StateError::Connection(e.to_string()))?;

            db.use_ns("hivesync")
                .use_db("main")
                .await
                .map_err(|e| StateError::Connection(e.to_string()))?;

            migrations::init_schema(&db).await?;
            info!("SurrealFederationStore connected ({})", url);
            return Ok(Self { db });
        }

        let path = ".hivesync/db";
        std::fs::create_dir_all(path).map_err(|e| {
            StateError::Connection(format!(
                "Failed to create database directory {}: {}",
                path, e
            ))
        })?;
        let url = format!("surrealkv://{}", path);
        info!("No SURREALDB_URL found, using local persistence: {}", url);

        let db = surrealdb::engine::any::connect(&url)
            .await
            .map_err(|e| StateError::Connection(format!("Failed to connect to {}: {}", url, e)))?;

        db.use_ns("hivesync")
            .use_db("main")
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;
        Ok(Self { db })
    }

    // -- row fetch helpers ---------------------------------------------------

    async fn fetch_repo(&self, rid: &str) -> StorageResult<RepoRow> {
        let rid_owned = rid.to_string();
        let mut res = self
            .db
            .query("SELECT * FROM repos WHERE repo_id = $rid")
            .bind(("rid", rid_owned))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<RepoRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::RepoNotFound {
                repo_id: rid.to_string(),
            })
    }

    async fn fetch_stream(&self, sid: &str) -> StorageResult<StreamRow> {
        let sid_owned = sid.to_string();
        let mut res = self
            .db
            .query("SELECT * FROM streams WHERE stream_id = $sid")
            .bind(("sid", sid_owned))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<StreamRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::StreamNotFound {
                stream_id: sid.to_string(),
            })
    }

    async fn fetch_proposal(&self, pid: &str) -> StorageResult<ProposalRow> {
        let pid_owned = pid.to_string();
        let mut res = self
            .db
            .query("SELECT * FROM proposals WHERE proposal_id = $pid")
            .bind(("pid", pid_owned))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<ProposalRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::ProposalNotFound {
                proposal_id: pid.to_string(),
            })
    }

    // -- row <-> record conversion -------------------------------------------

    fn repo_to_row(repo: &RepoRecord) -> StorageResult<RepoRow> {
        Ok(RepoRow {
            repo_id: repo.repo_id.0.clone(),
            merge_mode: repo.merge_mode.as_str().to_string(),
            git_backend: repo.git_backend.as_str().to_string(),
            buffer_branch: repo.buffer_branch.clone(),
            promote_target: repo.promote_target.clone(),
            require_human_approval: repo.require_human_approval,
            human_review_weight: repo.human_review_weight,
            review_quorum: repo.review_quorum,
            maintainers: repo.maintainers.clone(),
            plugins: serde_json::to_value(&repo.plugins)?,
            created_at: repo.created_at,
        })
    }

    fn row_to_repo(row: RepoRow) -> StorageResult<RepoRecord> {
        let merge_mode = match row.merge_mode.as_str() {
            "swarm" => MergeMode::Swarm,
            "review" => MergeMode::Review,
            "gated" => MergeMode::Gated,
            other => {
                return Err(StorageError::Backend(format!(
                    "unknown merge mode: {other}"
                )))
            }
        };
        let git_backend = match row.git_backend.as_str() {
            "cascade" => GitBackendKind::Cascade,
            "remote_api" => GitBackendKind::RemoteApi,
            other => {
                return Err(StorageError::Backend(format!(
                    "unknown git backend: {other}"
                )))
            }
        };
        let plugins: Vec<PluginDeclaration> = serde_json::from_value(row.plugins)?;

        Ok(RepoRecord {
            repo_id: RepoId(row.repo_id),
            merge_mode,
            git_backend,
            buffer_branch: row.buffer_branch,
            promote_target: row.promote_target,
            require_human_approval: row.require_human_approval,
            human_review_weight: row.human_review_weight,
            review_quorum: row.review_quorum,
            maintainers: row.maintainers,
            plugins,
            created_at: row.created_at,
        })
    }

    fn row_to_stream(row: StreamRow) -> StorageResult<StreamRecord> {
        let review_status = ReviewStatus::parse(&row.review_status).ok_or_else(|| {
            StorageError::Backend(format!("unknown review status: {}", row.review_status))
        })?;
        Ok(StreamRecord {
            stream_id: StreamId(row.stream_id),
            repo_id: RepoId(row.repo_id),
            branch: row.branch,
            title: row.title,
            author: row.author,
            review_status,
            merge_ref: row.merge_ref,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    fn stream_to_row(stream: &StreamRecord) -> StreamRow {
        StreamRow {
            stream_id: stream.stream_id.0.clone(),
            repo_id: stream.repo_id.0.clone(),
            branch: stream.branch.clone(),
            title: stream.title.clone(),
            author: stream.author.clone(),
            review_status: stream.review_status.as_str().to_string(),
            merge_ref: stream.merge_ref.clone(),
            created_at: stream.created_at,
            updated_at: stream.updated_at,
        }
    }

    fn row_to_proposal(row: ProposalRow) -> StorageResult<ProposalRecord> {
        let kind = match row.kind.as_str() {
            "merge_stream" => ProposalKind::MergeStream,
            "revert_stream" => ProposalKind::RevertStream,
            "promote" => ProposalKind::Promote,
            other => {
                return Err(StorageError::Backend(format!(
                    "unknown proposal kind: {other}"
                )))
            }
        };
        let status = match row.status.as_str() {
            "open" => ProposalStatus::Open,
            "passed" => ProposalStatus::Passed,
            "failed" => ProposalStatus::Failed,
            "executed" => ProposalStatus::Executed,
            other => {
                return Err(StorageError::Backend(format!(
                    "unknown proposal status: {other}"
                )))
            }
        };
        Ok(ProposalRecord {
            proposal_id: ProposalId(row.proposal_id),
            kind,
            repo_id: RepoId(row.repo_id),
            stream_id: row.stream_id.map(StreamId),
            votes_for: row.votes_for,
            votes_against: row.votes_against,
            status,
            created_at: row.created_at,
            decided_at: row.decided_at,
        })
    }

    fn row_to_event(row: SyncEventRow) -> SyncEvent {
        SyncEvent {
            seq: row.seq,
            kind: row.kind,
            payload: row.payload,
            created_at: row.created_at,
            attempts: row.attempts,
            last_error: row.last_error,
        }
    }

    fn row_to_merge_record(row: MergeRecordRow) -> StorageResult<MergeRecord> {
        Ok(MergeRecord {
            record_id: row.record_id,
            proposal_id: ProposalId(row.proposal_id),
            repo_id: RepoId(row.repo_id),
            stream_id: row.stream_id.map(StreamId),
            operation: row.operation,
            backend: row.backend,
            executed: row.executed,
            outcome: row.outcome,
            merge_ref: row.merge_ref,
            detail: row.detail,
            digest: ContentDigest::try_from(row.digest)?,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl RepoStore for SurrealFederationStore {
    async fn put_repo(&self, repo: RepoRecord) -> StorageResult<()> {
        let row = Self::repo_to_row(&repo)?;
        let rid_owned = repo.repo_id.0.clone();

        debug!(repo_id = %repo.repo_id, "storing repo config");

        // Upsert: delete any existing row for the id, then create.
        self.db
            .query("DELETE FROM repos WHERE repo_id = $rid")
            .bind(("rid", rid_owned))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let _created: Option<RepoRow> = self
            .db
            .create("repos")
            .content(row)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn get_repo(&self, repo_id: &RepoId) -> StorageResult<RepoRecord> {
        let row = self.fetch_repo(&repo_id.0).await?;
        Self::row_to_repo(row)
    }

    async fn list_repos(&self) -> StorageResult<Vec<RepoRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM repos ORDER BY repo_id ASC")
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<RepoRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter().map(Self::row_to_repo).collect()
    }
}

#[async_trait]
impl StreamStore for SurrealFederationStore {
    async fn put_stream(&self, stream: StreamRecord) -> StorageResult<()> {
        let row = Self::stream_to_row(&stream);
        let sid_owned = stream.stream_id.0.clone();

        self.db
            .query("DELETE FROM streams WHERE stream_id = $sid")
            .bind(("sid", sid_owned))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let _created: Option<StreamRow> = self
            .db
            .create("streams")
            .content(row)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn get_stream(&self, stream_id: &StreamId) -> StorageResult<StreamRecord> {
        let row = self.fetch_stream(&stream_id.0).await?;
        Self::row_to_stream(row)
    }

    async fn update_status(
        &self,
        stream_id: &StreamId,
        next: ReviewStatus,
    ) -> StorageResult<StreamRecord> {
        let row = self.fetch_stream(&stream_id.0).await?;
        let current = ReviewStatus::parse(&row.review_status).ok_or_else(|| {
            StorageError::Backend(format!("unknown review status: {}", row.review_status))
        })?;

        if !current.can_transition_to(next) {
            return Err(StorageError::IllegalTransition {
                stream_id: stream_id.0.clone(),
                from: current.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }

        let mut updated = row;
        updated.review_status = next.as_str().to_string();
        updated.updated_at = chrono::Utc::now();
        let sid_owned = stream_id.0.clone();

        self.db
            .query("UPDATE streams CONTENT $row WHERE stream_id = $sid")
            .bind(("row", updated.clone()))
            .bind(("sid", sid_owned))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Self::row_to_stream(updated)
    }

    async fn set_merge_ref(&self, stream_id: &StreamId, merge_ref: &str) -> StorageResult<()> {
        let mut row = self.fetch_stream(&stream_id.0).await?;
        row.merge_ref = Some(merge_ref.to_string());
        row.updated_at = chrono::Utc::now();
        let sid_owned = stream_id.0.clone();

        self.db
            .query("UPDATE streams CONTENT $row WHERE stream_id = $sid")
            .bind(("row", row))
            .bind(("sid", sid_owned))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn list_streams(&self, repo_id: Option<&RepoId>) -> StorageResult<Vec<StreamRecord>> {
        let rows: Vec<StreamRow> = if let Some(rid) = repo_id {
            let rid_owned = rid.0.clone();
            let mut res = self
                .db
                .query("SELECT * FROM streams WHERE repo_id = $rid ORDER BY created_at ASC")
                .bind(("rid", rid_owned))
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            res.take(0)
                .map_err(|e| StorageError::Backend(e.to_string()))?
        } else {
            let mut res = self
                .db
                .query("SELECT * FROM streams ORDER BY created_at ASC")
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            res.take(0)
                .map_err(|e| StorageError::Backend(e.to_string()))?
        };

        rows.into_iter().map(Self::row_to_stream).collect()
    }
}

#[async_trait]
impl ReviewStore for SurrealFederationStore {
    async fn put_review(&self, review: ReviewRecord) -> StorageResult<()> {
        let row = ReviewRow {
            review_id: review.review_id,
            stream_id: review.stream_id.0,
            reviewer: review.reviewer,
            approved: review.approved,
            human: review.human,
            comment: review.comment,
            created_at: review.created_at,
        };

        let _created: Option<ReviewRow> = self
            .db
            .create("reviews")
            .content(row)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn reviews_for_stream(&self, stream_id: &StreamId) -> StorageResult<Vec<ReviewRecord>> {
        let sid_owned = stream_id.0.clone();
        let mut res = self
            .db
            .query("SELECT * FROM reviews WHERE stream_id = $sid ORDER BY created_at ASC")
            .bind(("sid", sid_owned))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<ReviewRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| ReviewRecord {
                review_id: row.review_id,
                stream_id: StreamId(row.stream_id),
                reviewer: row.reviewer,
                approved: row.approved,
                human: row.human,
                comment: row.comment,
                created_at: row.created_at,
            })
            .collect())
    }
}

#[async_trait]
impl ProposalStore for SurrealFederationStore {
    async fn put_proposal(&self, proposal: ProposalRecord) -> StorageResult<()> {
        let row = ProposalRow {
            proposal_id: proposal.proposal_id.0.clone(),
            kind: proposal.kind.as_str().to_string(),
            repo_id: proposal.repo_id.0,
            stream_id: proposal.stream_id.map(|s| s.0),
            votes_for: proposal.votes_for,
            votes_against: proposal.votes_against,
            status: proposal.status.as_str().to_string(),
            created_at: proposal.created_at,
            decided_at: proposal.decided_at,
        };
        let pid_owned = proposal.proposal_id.0;

        self.db
            .query("DELETE FROM proposals WHERE proposal_id = $pid")
            .bind(("pid", pid_owned))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let _created: Option<ProposalRow> = self
            .db
            .create("proposals")
            .content(row)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn get_proposal(&self, proposal_id: &ProposalId) -> StorageResult<ProposalRecord> {
        let row = self.fetch_proposal(&proposal_id.0).await?;
        Self::row_to_proposal(row)
    }

    async fn set_status(
        &self,
        proposal_id: &ProposalId,
        status: ProposalStatus,
    ) -> StorageResult<()> {
        let mut row = self.fetch_proposal(&proposal_id.0).await?;
        row.status = status.as_str().to_string();
        if row.decided_at.is_none()
            && matches!(status, ProposalStatus::Passed | ProposalStatus::Failed)
        {
            row.decided_at = Some(chrono::Utc::now());
        }
        let pid_owned = proposal_id.0.clone();

        self.db
            .query("UPDATE proposals CONTENT $row WHERE proposal_id = $pid")
            .bind(("row", row))
            .bind(("pid", pid_owned))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl SyncEventQueue for SurrealFederationStore {
    async fn enqueue(&self, kind: &str, payload: serde_json::Value) -> StorageResult<SyncEvent> {
        // Highest existing seq + 1; single-writer per agent by contract.
        let mut res = self
            .db
            .query("SELECT seq FROM sync_events ORDER BY seq DESC LIMIT 1")
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        #[derive(serde::Deserialize)]
        struct SeqRow {
            seq: u64,
        }
        let rows: Vec<SeqRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let next_seq = rows.first().map(|r| r.seq + 1).unwrap_or(1);

        let row = SyncEventRow {
            seq: next_seq,
            kind: kind.to_string(),
            payload,
            created_at: chrono::Utc::now(),
            attempts: 0,
            last_error: None,
        };

        let _created: Option<SyncEventRow> = self
            .db
            .create("sync_events")
            .content(row.clone())
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(Self::row_to_event(row))
    }

    async fn pending(&self) -> StorageResult<Vec<SyncEvent>> {
        let mut res = self
            .db
            .query("SELECT * FROM sync_events ORDER BY seq ASC")
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<SyncEventRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(rows.into_iter().map(Self::row_to_event).collect())
    }

    async fn ack(&self, seq: u64) -> StorageResult<()> {
        let mut res = self
            .db
            .query("SELECT * FROM sync_events WHERE seq = $seq")
            .bind(("seq", seq))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let rows: Vec<SyncEventRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        if rows.is_empty() {
            return Err(StorageError::EventNotFound { seq });
        }

        self.db
            .query("DELETE FROM sync_events WHERE seq = $seq")
            .bind(("seq", seq))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn mark_failed(&self, seq: u64, error: &str) -> StorageResult<()> {
        let mut res = self
            .db
            .query("SELECT * FROM sync_events WHERE seq = $seq")
            .bind(("seq", seq))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let rows: Vec<SyncEventRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let mut row = rows
            .into_iter()
            .next()
            .ok_or(StorageError::EventNotFound { seq })?;

        row.attempts += 1;
        row.last_error = Some(error.to_string());

        self.db
            .query("UPDATE sync_events CONTENT $row WHERE seq = $seq")
            .bind(("row", row))
            .bind(("seq", seq))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl MergeLedger for SurrealFederationStore {
    async fn append(&self, record: MergeRecord) -> StorageResult<()> {
        if self.find_by_proposal(&record.proposal_id).await?.is_some() {
            return Err(StorageError::DuplicateMergeRecord {
                proposal_id: record.proposal_id.0.clone(),
            });
        }

        let row = MergeRecordRow {
            record_id: record.record_id,
            proposal_id: record.proposal_id.0,
            repo_id: record.repo_id.0,
            stream_id: record.stream_id.map(|s| s.0),
            operation: record.operation,
            backend: record.backend,
            executed: record.executed,
            outcome: record.outcome,
            merge_ref: record.merge_ref,
            detail: record.detail,
            digest: record.digest.as_str().to_string(),
            created_at: record.created_at,
        };

        let _created: Option<MergeRecordRow> = self
            .db
            .create("merge_records")
            .content(row)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn find_by_proposal(
        &self,
        proposal_id: &ProposalId,
    ) -> StorageResult<Option<MergeRecord>> {
        let pid_owned = proposal_id.0.clone();
        let mut res = self
            .db
            .query("SELECT * FROM merge_records WHERE proposal_id = $pid")
            .bind(("pid", pid_owned))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<MergeRecordRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter()
            .next()
            .map(Self::row_to_merge_record)
            .transpose()
    }

    async fn history(&self, repo_id: &RepoId) -> StorageResult<Vec<MergeRecord>> {
        let rid_owned = repo_id.0.clone();
        let mut res = self
            .db
            .query("SELECT * FROM merge_records WHERE repo_id = $rid ORDER BY created_at ASC")
            .bind(("rid", rid_owned))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<MergeRecordRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter().map(Self::row_to_merge_record).collect()
    }
}
