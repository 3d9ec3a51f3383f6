//! Branch Tracking Controller for Tab Groups.
//!
//! Turns branch-change signals into plans: which group to save the outgoing
//! layout into, whether to close everything, and which group to restore. The
//! transition itself is pure; the command layer carries the plan out.

use tracing::debug;

use crate::types::settings::GitBranchGroups;

/// Name of the group kept for a branch.
pub fn branch_group_name(branch: &str) -> String {
    format!("Branch: {}", branch)
}

/// What the controller knows about the checked-out branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchState {
    /// No branch observed yet.
    Idle,
    Tracking(String),
    /// HEAD is not on a branch.
    Detached,
}

/// Work to do for one branch change, in field order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchPlan {
    /// Group to save the live layout into before anything else.
    pub save: Option<String>,
    pub close_all: bool,
    /// Group to restore, if it exists.
    pub restore: Option<String>,
}

impl BranchPlan {
    pub fn is_empty(&self) -> bool {
        self.save.is_none() && !self.close_all && self.restore.is_none()
    }
}

/// Computes the next state and the plan for a signal. `None` or an empty name
/// means a detached HEAD.
pub fn transition(
    state: &BranchState,
    branch: Option<&str>,
    policy: GitBranchGroups,
) -> (BranchState, BranchPlan) {
    if policy == GitBranchGroups::Nothing {
        return (BranchState::Idle, BranchPlan::default());
    }
    let restores = policy == GitBranchGroups::SaveAndRestore;
    let branch = branch.filter(|b| !b.is_empty());

    match (state, branch) {
        (BranchState::Idle, Some(next)) => (BranchState::Tracking(next.to_string()), BranchPlan::default()),
        (BranchState::Idle, None) => (BranchState::Detached, BranchPlan::default()),
        (BranchState::Tracking(current), Some(next)) if current == next => {
            (state.clone(), BranchPlan::default())
        }
        (BranchState::Tracking(current), Some(next)) => (
            BranchState::Tracking(next.to_string()),
            BranchPlan {
                save: Some(branch_group_name(current)),
                close_all: restores,
                restore: restores.then(|| branch_group_name(next)),
            },
        ),
        (BranchState::Tracking(current), None) => (
            BranchState::Detached,
            BranchPlan {
                save: Some(branch_group_name(current)),
                close_all: restores,
                restore: None,
            },
        ),
        (BranchState::Detached, Some(next)) => (
            BranchState::Tracking(next.to_string()),
            BranchPlan {
                save: None,
                close_all: restores,
                restore: restores.then(|| branch_group_name(next)),
            },
        ),
        (BranchState::Detached, None) => (BranchState::Detached, BranchPlan::default()),
    }
}

/// Holds the branch state between signals.
#[derive(Debug, Clone)]
pub struct BranchTracker {
    state: BranchState,
}

impl BranchTracker {
    pub fn new() -> Self {
        Self {
            state: BranchState::Idle,
        }
    }

    pub fn state(&self) -> &BranchState {
        &self.state
    }

    /// Applies a signal and returns the plan to carry out.
    pub fn on_branch(&mut self, branch: Option<&str>, policy: GitBranchGroups) -> BranchPlan {
        let (next, plan) = transition(&self.state, branch, policy);
        if next != self.state {
            debug!("Branch state {:?} -> {:?}", self.state, next);
        }
        self.state = next;
        plan
    }
}

impl Default for BranchTracker {
    fn default() -> Self {
        Self::new()
    }
}
