//! Local cascading-merge backend.
//!
//! Operates directly on a git work tree through the `git` binary. All
//! operations are synchronous and report definitive success or failure:
//! a merge conflict comes back as a `Conflicted` outcome, not an error.
//! Errors are reserved for the git binary itself being unusable.

use std::path::{Path, PathBuf};
use std::process::Command;

use async_trait::async_trait;
use federated_state::{GitBackendKind, RepoRecord, StreamRecord};
use tracing::{debug, warn};

use crate::backend::{BackendOutcome, MergeBackend};
use crate::error::{HivesyncError, Result};

/// Cascading-merge engine over a local git work tree.
pub struct CascadeBackend {
    work_tree: PathBuf,
}

impl CascadeBackend {
    pub fn new(work_tree: impl Into<PathBuf>) -> Self {
        Self {
            work_tree: work_tree.into(),
        }
    }

    pub fn work_tree(&self) -> &Path {
        &self.work_tree
    }

    /// Run a git command in the work tree, returning (success, stdout, stderr).
    fn git(&self, args: &[&str]) -> Result<(bool, String, String)> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.work_tree)
            .output()
            .map_err(|e| HivesyncError::Git(format!("failed to run git {args:?}: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Ok((output.status.success(), stdout, stderr))
    }

    /// Require a git command to succeed.
    fn git_ok(&self, args: &[&str]) -> Result<String> {
        let (ok, stdout, stderr) = self.git(args)?;
        if !ok {
            return Err(HivesyncError::Git(format!("git {args:?} failed: {stderr}")));
        }
        Ok(stdout)
    }

    fn head_sha(&self) -> Result<String> {
        let sha = self.git_ok(&["rev-parse", "HEAD"])?;
        if sha.is_empty() {
            return Err(HivesyncError::Git(
                "git rev-parse HEAD returned empty output".to_string(),
            ));
        }
        Ok(sha)
    }
}

#[async_trait]
impl MergeBackend for CascadeBackend {
    fn kind(&self) -> GitBackendKind {
        GitBackendKind::Cascade
    }

    async fn merge(&self, stream: &StreamRecord, repo: &RepoRecord) -> Result<BackendOutcome> {
        debug!(
            stream = %stream.stream_id,
            branch = %stream.branch,
            buffer = %repo.buffer_branch,
            "cascade merge"
        );

        self.git_ok(&["checkout", &repo.buffer_branch])?;

        let message = format!("merge stream {} ({})", stream.stream_id, stream.branch);
        let (ok, _stdout, stderr) =
            self.git(&["merge", "--no-ff", "-m", &message, &stream.branch])?;

        if !ok {
            // Leave the work tree clean for the next attempt.
            let (aborted, _, abort_err) = self.git(&["merge", "--abort"])?;
            if !aborted {
                warn!(stream = %stream.stream_id, error = %abort_err, "merge --abort failed");
            }
            return Ok(BackendOutcome::conflicted(format!(
                "merge of {} into {} failed: {}",
                stream.branch, repo.buffer_branch, stderr
            )));
        }

        let merge_ref = self.head_sha()?;
        Ok(BackendOutcome::completed(Some(merge_ref)))
    }

    async fn revert(&self, stream: &StreamRecord, repo: &RepoRecord) -> Result<BackendOutcome> {
        let merge_ref = match &stream.merge_ref {
            Some(r) => r.clone(),
            None => {
                return Ok(BackendOutcome::conflicted(
                    "no merge ref recorded for stream",
                ))
            }
        };

        debug!(
            stream = %stream.stream_id,
            merge_ref = %merge_ref,
            "cascade revert"
        );

        self.git_ok(&["checkout", &repo.buffer_branch])?;

        // Streams merge with --no-ff, so the recorded ref is a merge commit.
        let (ok, _stdout, stderr) =
            self.git(&["revert", "--no-edit", "-m", "1", &merge_ref])?;

        if !ok {
            let (aborted, _, abort_err) = self.git(&["revert", "--abort"])?;
            if !aborted {
                warn!(stream = %stream.stream_id, error = %abort_err, "revert --abort failed");
            }
            return Ok(BackendOutcome::conflicted(format!(
                "revert of {merge_ref} failed: {stderr}"
            )));
        }

        let revert_ref = self.head_sha()?;
        Ok(BackendOutcome::completed(Some(revert_ref)))
    }

    async fn fast_forward_promote(&self, repo: &RepoRecord) -> Result<BackendOutcome> {
        debug!(
            buffer = %repo.buffer_branch,
            target = %repo.promote_target,
            "cascade fast-forward promote"
        );

        self.git_ok(&["checkout", &repo.promote_target])?;

        // --ff-only: a target that cannot fast-forward fails outright;
        // a three-way merge is never attempted.
        let (ok, _stdout, stderr) = self.git(&["merge", "--ff-only", &repo.buffer_branch])?;

        if !ok {
            return Ok(BackendOutcome::conflicted(format!(
                "{} cannot fast-forward to {}: {}",
                repo.promote_target, repo.buffer_branch, stderr
            )));
        }

        let promoted_ref = self.head_sha()?;
        Ok(BackendOutcome::completed(Some(promoted_ref)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendDisposition;
    use chrono::Utc;
    use federated_state::{MergeMode, RepoId, StreamId};
    use std::process::Command as StdCommand;

    fn run_git(repo_dir: &Path, args: &[&str]) {
        let output = StdCommand::new("git")
            .args(args)
            .current_dir(repo_dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    fn write_file(repo_dir: &Path, name: &str, content: &str) {
        std::fs::write(repo_dir.join(name), content).unwrap();
    }

    /// Repo with a `buffer` branch and a `stream/s1` branch that adds a file.
    fn make_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path();
        run_git(path, &["init", "-b", "main"]);
        run_git(path, &["config", "user.name", "test-user"]);
        run_git(path, &["config", "user.email", "test@example.com"]);
        write_file(path, "base.txt", "base\n");
        run_git(path, &["add", "."]);
        run_git(path, &["commit", "-m", "initial"]);
        run_git(path, &["branch", "buffer"]);
        run_git(path, &["checkout", "-b", "stream/s1"]);
        write_file(path, "feature.txt", "feature\n");
        run_git(path, &["add", "."]);
        run_git(path, &["commit", "-m", "add feature"]);
        run_git(path, &["checkout", "main"]);
        dir
    }

    fn repo_record() -> RepoRecord {
        RepoRecord {
            repo_id: RepoId("repo-1".to_string()),
            merge_mode: MergeMode::Swarm,
            git_backend: GitBackendKind::Cascade,
            buffer_branch: "buffer".to_string(),
            promote_target: "main".to_string(),
            require_human_approval: false,
            human_review_weight: 1.0,
            review_quorum: 1.0,
            maintainers: vec![],
            plugins: vec![],
            created_at: Utc::now(),
        }
    }

    fn stream_record(branch: &str, merge_ref: Option<String>) -> StreamRecord {
        let now = Utc::now();
        StreamRecord {
            stream_id: StreamId("s1".to_string()),
            repo_id: RepoId("repo-1".to_string()),
            branch: branch.to_string(),
            title: "feature".to_string(),
            author: "agent-1".to_string(),
            review_status: federated_state::ReviewStatus::Approved,
            merge_ref,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn merge_clean_branch_completes() {
        let repo_dir = make_repo();
        let backend = CascadeBackend::new(repo_dir.path());

        let outcome = backend
            .merge(&stream_record("stream/s1", None), &repo_record())
            .await
            .unwrap();

        assert!(outcome.executed);
        assert!(outcome.merge_ref.is_some());
    }

    #[tokio::test]
    async fn merge_conflict_reports_conflicted() {
        let repo_dir = make_repo();
        let path = repo_dir.path();
        // Create a conflicting change on buffer.
        run_git(path, &["checkout", "buffer"]);
        write_file(path, "feature.txt", "different\n");
        run_git(path, &["add", "."]);
        run_git(path, &["commit", "-m", "conflicting feature"]);

        let backend = CascadeBackend::new(path);
        let outcome = backend
            .merge(&stream_record("stream/s1", None), &repo_record())
            .await
            .unwrap();

        assert!(!outcome.executed);
        assert!(matches!(
            outcome.disposition,
            BackendDisposition::Conflicted { .. }
        ));
        // Work tree is clean after the aborted merge.
        let status = StdCommand::new("git")
            .args(["status", "--porcelain"])
            .current_dir(path)
            .output()
            .unwrap();
        assert!(String::from_utf8_lossy(&status.stdout).trim().is_empty());
    }

    #[tokio::test]
    async fn revert_without_merge_ref_is_conflicted() {
        let repo_dir = make_repo();
        let backend = CascadeBackend::new(repo_dir.path());

        let outcome = backend
            .revert(&stream_record("stream/s1", None), &repo_record())
            .await
            .unwrap();

        assert!(!outcome.executed);
        assert_eq!(outcome.reason(), Some("no merge ref recorded for stream"));
    }

    #[tokio::test]
    async fn revert_of_merged_stream_completes() {
        let repo_dir = make_repo();
        let backend = CascadeBackend::new(repo_dir.path());
        let repo = repo_record();

        let merged = backend
            .merge(&stream_record("stream/s1", None), &repo)
            .await
            .unwrap();
        let merge_ref = merged.merge_ref.clone().unwrap();

        let outcome = backend
            .revert(&stream_record("stream/s1", Some(merge_ref)), &repo)
            .await
            .unwrap();

        assert!(outcome.executed);
        assert!(!repo_dir.path().join("feature.txt").exists());
    }

    #[tokio::test]
    async fn promote_fast_forwards_when_linear() {
        let repo_dir = make_repo();
        let path = repo_dir.path();
        // Advance buffer past main with a commit.
        run_git(path, &["checkout", "buffer"]);
        write_file(path, "buffered.txt", "staged\n");
        run_git(path, &["add", "."]);
        run_git(path, &["commit", "-m", "staged change"]);

        let backend = CascadeBackend::new(path);
        let outcome = backend.fast_forward_promote(&repo_record()).await.unwrap();

        assert!(outcome.executed);
        assert!(path.join("buffered.txt").exists());
    }

    #[tokio::test]
    async fn promote_refuses_three_way_merge() {
        let repo_dir = make_repo();
        let path = repo_dir.path();
        // Diverge: commit on buffer and on main.
        run_git(path, &["checkout", "buffer"]);
        write_file(path, "buffered.txt", "staged\n");
        run_git(path, &["add", "."]);
        run_git(path, &["commit", "-m", "staged change"]);
        run_git(path, &["checkout", "main"]);
        write_file(path, "hotfix.txt", "hotfix\n");
        run_git(path, &["add", "."]);
        run_git(path, &["commit", "-m", "hotfix"]);

        let backend = CascadeBackend::new(path);
        let outcome = backend.fast_forward_promote(&repo_record()).await.unwrap();

        assert!(!outcome.executed);
        assert!(matches!(
            outcome.disposition,
            BackendDisposition::Conflicted { .. }
        ));
        // No merge commit was created on main.
        assert!(!path.join("buffered.txt").exists());
    }
}
