//! hivesync - Federated merge coordination CLI
//!
//! The `hivesync` command drives the federation engine against a local
//! or remote SurrealDB store.
//!
//! ## Commands
//!
//! - `repo`: configure repo governance (merge mode, backend, quorum)
//! - `stream`: open streams and move them through review
//! - `review`: submit reviews feeding consensus
//! - `merge`: attempt a gated/consensus merge of a stream
//! - `execute`: execute a passed council proposal
//! - `flush`: drain the sync queue to the remote authority
//! - `history`: show the merge audit log for a repo

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, Level};

use federated_state::{
    GitBackendKind, MergeLedger, MergeMode, PluginDeclaration, ProposalId, RepoId, RepoRecord,
    RepoStore, ReviewStatus, StreamId, StreamRecord, StreamStore, SurrealFederationStore,
};
use hivesync_core::{
    AgentSession, BackendRegistry, CascadeBackend, EngineStores, FederationEngine, HostingApi,
    HttpHostingApi, HttpRemoteAuthority, MergeAttempt, MergeBackend, RemoteApiBackend,
    RemoteAuthority,
};

#[derive(Parser)]
#[command(name = "hivesync")]
#[command(author = "Hivesync Maintainers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Federated merge coordination for agent hives", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Agent identity used for gating checks
    #[arg(long, global = true, env = "HIVESYNC_AGENT", default_value = "local-agent")]
    agent: String,

    /// Remote authority base URL; presence switches to federated mode
    #[arg(long, global = true, env = "HIVESYNC_AUTHORITY")]
    authority: Option<String>,

    /// Remote authority bearer token
    #[arg(long, global = true, env = "HIVESYNC_TOKEN")]
    token: Option<String>,

    /// Git work tree the cascade backend operates on
    #[arg(long, global = true, env = "HIVESYNC_WORK_TREE", default_value = ".")]
    work_tree: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum MergeModeArg {
    Swarm,
    Review,
    Gated,
}

impl From<MergeModeArg> for MergeMode {
    fn from(arg: MergeModeArg) -> Self {
        match arg {
            MergeModeArg::Swarm => MergeMode::Swarm,
            MergeModeArg::Review => MergeMode::Review,
            MergeModeArg::Gated => MergeMode::Gated,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    Cascade,
    RemoteApi,
}

impl From<BackendArg> for GitBackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Cascade => GitBackendKind::Cascade,
            BackendArg::RemoteApi => GitBackendKind::RemoteApi,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Configure a repo's governance
    Repo {
        /// Repo identifier
        repo_id: String,

        #[arg(long, value_enum, default_value = "review")]
        merge_mode: MergeModeArg,

        #[arg(long, value_enum, default_value = "cascade")]
        git_backend: BackendArg,

        #[arg(long, default_value = "buffer")]
        buffer_branch: String,

        #[arg(long, default_value = "main")]
        promote_target: String,

        /// Approving review weight required for consensus
        #[arg(long, default_value = "2.0")]
        quorum: f64,

        /// Weight multiplier for human-authored reviews
        #[arg(long, default_value = "2.0")]
        human_weight: f64,

        /// Require at least one human approval
        #[arg(long)]
        require_human: bool,

        /// Maintainer agent ids (repeatable)
        #[arg(long)]
        maintainer: Vec<String>,
    },

    /// Open a stream for a proposed change
    Open {
        /// Repo the stream belongs to
        #[arg(long)]
        repo: String,

        /// Branch holding the change
        branch: String,

        #[arg(long, default_value = "")]
        title: String,
    },

    /// Move a draft stream into review
    Submit {
        /// Stream id
        stream: String,
    },

    /// Submit a review on a stream
    Review {
        /// Stream id
        stream: String,

        /// Approve (omit for a rejection)
        #[arg(long)]
        approve: bool,

        /// Flag the review as human-authored
        #[arg(long)]
        human: bool,

        #[arg(long)]
        comment: Option<String>,
    },

    /// Attempt to merge a stream under its repo's governance policy
    Merge {
        /// Stream id
        stream: String,
    },

    /// Execute a passed council proposal
    Execute {
        /// Proposal id
        proposal: String,
    },

    /// Flush queued sync events to the remote authority
    Flush,

    /// Show the merge audit log for a repo
    History {
        /// Repo id
        repo: String,
    },
}

fn build_engine(cli: &Cli, store: Arc<SurrealFederationStore>) -> Result<FederationEngine> {
    let session = match &cli.authority {
        Some(_) => AgentSession::federated(cli.agent.clone()),
        None => AgentSession::local(cli.agent.clone()),
    };

    // Without a configured authority the client still exists; delegation
    // and flushes against it surface as unreachable, which the engine
    // handles (queueing, stale-data refusal).
    let authority_url = cli
        .authority
        .clone()
        .unwrap_or_else(|| "http://127.0.0.1:7341".to_string());
    let remote: Arc<dyn RemoteAuthority> = Arc::new(
        HttpRemoteAuthority::new(authority_url.clone(), cli.token.clone())
            .context("building remote authority client")?,
    );

    let hosting: Arc<dyn HostingApi> = Arc::new(
        HttpHostingApi::new(authority_url, cli.token.clone())
            .context("building hosting API client")?,
    );
    let backends = Arc::new(BackendRegistry::new(
        Arc::new(CascadeBackend::new(cli.work_tree.clone())) as Arc<dyn MergeBackend>,
        Arc::new(RemoteApiBackend::new(hosting)) as Arc<dyn MergeBackend>,
    ));

    let stores = EngineStores {
        repos: store.clone(),
        streams: store.clone(),
        reviews: store.clone(),
        proposals: store.clone(),
        queue: store.clone(),
        ledger: store,
    };

    Ok(FederationEngine::new(
        stores,
        remote,
        backends,
        session,
        Vec::new(),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    hivesync_core::init_tracing(cli.json, level);

    let store = Arc::new(
        SurrealFederationStore::from_env()
            .await
            .context("connecting to federation state store")?,
    );
    let engine = build_engine(&cli, store.clone())?;

    let diagnostics = engine.open().await?;
    for diagnostic in &diagnostics {
        eprintln!(
            "warning: plugin {}: {}",
            diagnostic.plugin_id, diagnostic.reason
        );
    }

    match cli.command {
        Commands::Repo {
            repo_id,
            merge_mode,
            git_backend,
            buffer_branch,
            promote_target,
            quorum,
            human_weight,
            require_human,
            maintainer,
        } => {
            let repo = RepoRecord {
                repo_id: RepoId(repo_id.clone()),
                merge_mode: merge_mode.into(),
                git_backend: git_backend.into(),
                buffer_branch,
                promote_target,
                require_human_approval: require_human,
                human_review_weight: human_weight,
                review_quorum: quorum,
                maintainers: maintainer,
                plugins: Vec::<PluginDeclaration>::new(),
                created_at: Utc::now(),
            };
            store.put_repo(repo).await?;
            info!(repo_id = %repo_id, "repo configured");
            println!("configured repo {repo_id}");
        }

        Commands::Open { repo, branch, title } => {
            let now = Utc::now();
            let stream = StreamRecord {
                stream_id: StreamId::new(),
                repo_id: RepoId(repo),
                branch: branch.clone(),
                title,
                author: cli.agent.clone(),
                review_status: ReviewStatus::Draft,
                merge_ref: None,
                created_at: now,
                updated_at: now,
            };
            let stream_id = stream.stream_id.clone();
            store.put_stream(stream).await?;
            println!("opened stream {stream_id} for {branch}");
        }

        Commands::Submit { stream } => {
            let updated = store
                .update_status(&StreamId(stream), ReviewStatus::Pending)
                .await?;
            println!(
                "stream {} is now {}",
                updated.stream_id, updated.review_status
            );
        }

        Commands::Review {
            stream,
            approve,
            human,
            comment,
        } => {
            let review = engine
                .submit_review(&StreamId(stream), &cli.agent, approve, human, comment)
                .await?;
            println!(
                "recorded {} review {} (queued for sync)",
                if review.approved { "approving" } else { "rejecting" },
                review.review_id
            );
        }

        Commands::Merge { stream } => match engine.attempt_merge(&StreamId(stream)).await? {
            MergeAttempt::Executed(outcome) => {
                println!("merge attempt: {}", outcome.status.as_str());
                if let Some(detail) = outcome.detail {
                    println!("detail: {detail}");
                }
            }
            MergeAttempt::Queued { seq } => {
                println!("remote authority unreachable; merge request queued (seq {seq})");
            }
        },

        Commands::Execute { proposal } => {
            let outcome = engine.execute_proposal(&ProposalId(proposal)).await?;
            println!(
                "proposal {}: {}{}",
                outcome.proposal_id,
                outcome.status.as_str(),
                if outcome.replayed { " (replayed)" } else { "" }
            );
        }

        Commands::Flush => {
            let report = engine.flush().await?;
            println!(
                "flushed {} event(s), {} remaining",
                report.flushed, report.remaining
            );
            if !report.failed_kinds.is_empty() {
                println!("failed kinds: {}", report.failed_kinds_vec().join(", "));
            }
        }

        Commands::History { repo } => {
            let records = store.history(&RepoId(repo)).await?;
            if records.is_empty() {
                println!("no merge records");
            }
            for record in records {
                println!(
                    "{}  {:<8} {:<10} executed={} {} {}",
                    record.created_at.format("%Y-%m-%d %H:%M:%S"),
                    record.operation,
                    record.backend,
                    record.executed,
                    record.outcome,
                    record.merge_ref.unwrap_or_default(),
                );
            }
        }
    }

    Ok(())
}
