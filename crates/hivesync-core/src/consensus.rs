//! Review consensus evaluation.
//!
//! Computes whether a stream has sufficient approving review weight to
//! merge under `merge_mode = review`. Reviews flagged as human-authored
//! are weighted by the repo's `human_review_weight`; the total approving
//! weight is checked against the repo's `review_quorum`.
//!
//! The evaluator only reads — it must run against fully synchronized
//! review data, which the gating coordinator guarantees by flushing the
//! sync queue first.

use federated_state::{RepoRecord, ReviewRecord};
use serde::{Deserialize, Serialize};

/// The outcome of evaluating review consensus for one stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusOutcome {
    /// Total weight of approving reviews after human weighting.
    pub approving_weight: f64,
    /// Weight required to pass.
    pub quorum: f64,
    pub human_approvals: usize,
    pub agent_approvals: usize,
    /// True when a human approval was required but none was present.
    pub missing_human_approval: bool,
    pub passed: bool,
}

impl ConsensusOutcome {
    /// Human-readable explanation of a failed evaluation.
    pub fn failure_reason(&self) -> String {
        if self.missing_human_approval {
            return "repo requires at least one human approval".to_string();
        }
        format!(
            "approving weight {:.1} below quorum {:.1}",
            self.approving_weight, self.quorum
        )
    }
}

/// Evaluate review consensus for a stream under a repo's policy.
///
/// Only approving reviews count toward the quorum; a non-approving
/// review contributes nothing (it neither blocks nor subtracts — gating
/// policy, not review arithmetic, decides what blocks).
pub fn evaluate(repo: &RepoRecord, reviews: &[ReviewRecord]) -> ConsensusOutcome {
    let mut approving_weight = 0.0;
    let mut human_approvals = 0;
    let mut agent_approvals = 0;

    for review in reviews.iter().filter(|r| r.approved) {
        if review.human {
            approving_weight += repo.human_review_weight;
            human_approvals += 1;
        } else {
            approving_weight += 1.0;
            agent_approvals += 1;
        }
    }

    let missing_human_approval = repo.require_human_approval && human_approvals == 0;
    let passed = approving_weight >= repo.review_quorum && !missing_human_approval;

    ConsensusOutcome {
        approving_weight,
        quorum: repo.review_quorum,
        human_approvals,
        agent_approvals,
        missing_human_approval,
        passed,
    }
}
