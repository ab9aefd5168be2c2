//! SurrealDB schema migrations and initialization
//!
//! Initialization functions that set up all hivesync tables with their
//! constraints and indexes. Safe to call multiple times (idempotent).

use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all hivesync tables in SurrealDB
///
/// This should be called once on first connection to set up the schema.
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing hivesync SurrealDB schema");

    init_repos_table(db).await?;
    init_streams_table(db).await?;
    init_reviews_table(db).await?;
    init_proposals_table(db).await?;
    init_sync_events_table(db).await?;
    init_merge_records_table(db).await?;

    info!("hivesync schema initialization complete");
    Ok(())
}

/// Initialize `repos` table.
///
/// Governance configuration; update-in-place allowed (owned by the repo
/// administrator), delete denied.
async fn init_repos_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing repos table");

    let sql = r#"
        DEFINE TABLE repos AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE INDEX idx_repo_id ON TABLE repos COLUMNS repo_id UNIQUE;
        DEFINE INDEX idx_merge_mode ON TABLE repos COLUMNS merge_mode;
    "#;

    db.query(sql).await?;
    info!("✓ repos table initialized");
    Ok(())
}

/// Initialize `streams` table.
///
/// `review_status` transitions are enforced at the store layer; the table
/// allows update-in-place for status/merge_ref but never delete.
async fn init_streams_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing streams table");

    let sql = r#"
        DEFINE TABLE streams AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE INDEX idx_stream_id ON TABLE streams COLUMNS stream_id UNIQUE;
        DEFINE INDEX idx_stream_repo ON TABLE streams COLUMNS repo_id;
        DEFINE INDEX idx_stream_status ON TABLE streams COLUMNS review_status;
        DEFINE INDEX idx_stream_repo_status ON TABLE streams COLUMNS repo_id, review_status;
    "#;

    db.query(sql).await?;
    info!("✓ streams table initialized");
    Ok(())
}

/// Initialize `reviews` table (append-only).
async fn init_reviews_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing reviews table");

    let sql = r#"
        DEFINE TABLE reviews AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE INDEX idx_review_id ON TABLE reviews COLUMNS review_id UNIQUE;
        DEFINE INDEX idx_review_stream ON TABLE reviews COLUMNS stream_id;
        DEFINE INDEX idx_review_stream_created ON TABLE reviews COLUMNS stream_id, created_at;
    "#;

    db.query(sql).await?;
    info!("✓ reviews table initialized");
    Ok(())
}

/// Initialize `proposals` table.
async fn init_proposals_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing proposals table");

    let sql = r#"
        DEFINE TABLE proposals AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE INDEX idx_proposal_id ON TABLE proposals COLUMNS proposal_id UNIQUE;
        DEFINE INDEX idx_proposal_repo ON TABLE proposals COLUMNS repo_id;
        DEFINE INDEX idx_proposal_status ON TABLE proposals COLUMNS status;
    "#;

    db.query(sql).await?;
    info!("✓ proposals table initialized");
    Ok(())
}

/// Initialize `sync_events` table.
///
/// The `(seq)` unique index is the critical constraint: delivery order is
/// strict and sequence numbers never repeat. Acked events are deleted,
/// so delete stays enabled; failed events are updated in place
/// (attempts/last_error).
async fn init_sync_events_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing sync_events table");

    let sql = r#"
        DEFINE TABLE sync_events AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update FULL
                FOR delete FULL;

        DEFINE INDEX idx_event_seq ON TABLE sync_events COLUMNS seq UNIQUE;
        DEFINE INDEX idx_event_kind ON TABLE sync_events COLUMNS kind;
    "#;

    db.query(sql).await?;
    info!("✓ sync_events table initialized");
    Ok(())
}

/// Initialize `merge_records` table (append-only audit log).
///
/// One record per proposal; records are never updated or deleted.
async fn init_merge_records_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing merge_records table");

    let sql = r#"
        DEFINE TABLE merge_records AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE INDEX idx_record_id ON TABLE merge_records COLUMNS record_id UNIQUE;
        DEFINE INDEX idx_record_proposal ON TABLE merge_records COLUMNS proposal_id UNIQUE;
        DEFINE INDEX idx_record_repo ON TABLE merge_records COLUMNS repo_id;
        DEFINE INDEX idx_record_repo_created ON TABLE merge_records COLUMNS repo_id, created_at;
    "#;

    db.query(sql).await?;
    info!("✓ merge_records table initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    // Schema creation is exercised end-to-end by the surreal_store tests,
    // which run init_schema against a mem:// instance.
}
