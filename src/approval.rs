//! Approval steps and the router that materializes and resolves them
use crate::tier::{Role, Tier};
use crate::types::TimeStamp;
use chrono::Utc;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    #[n(0)]
    Pending,
    #[n(1)]
    Approve,
    #[n(2)]
    Reject,
}

/// Outcome an approver hands to `resolve_current_step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Approve,
    Reject,
}

impl From<StepOutcome> for StepAction {
    fn from(outcome: StepOutcome) -> Self {
        match outcome {
            StepOutcome::Approve => StepAction::Approve,
            StepOutcome::Reject => StepAction::Reject,
        }
    }
}

/// One role's decision slot in a request's ordered approval chain. Created
/// `Pending` at submission time and mutated exactly once.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct ApprovalStep {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub request_id: String,
    /// Which submission attempt this step belongs to.
    #[n(2)]
    pub attempt: u32,
    /// 1-based, gap-free within one attempt.
    #[n(3)]
    pub step_number: u32,
    #[n(4)]
    pub approver_role: Role,
    #[n(5)]
    pub action: StepAction,
    #[n(6)]
    pub approver_id: Option<String>,
    #[n(7)]
    pub comments: Option<String>,
    #[n(8)]
    pub resolved_at: Option<TimeStamp<Utc>>,
}

impl ApprovalStep {
    pub fn is_pending(&self) -> bool {
        self.action == StepAction::Pending
    }

    /// Write the terminal outcome onto this step.
    pub fn resolve(&mut self, outcome: StepOutcome, approver_id: &str, comments: Option<String>) {
        self.action = outcome.into();
        self.approver_id = Some(approver_id.to_string());
        self.comments = comments;
        self.resolved_at = Some(TimeStamp::now());
    }
}

/// Storage key for a step: orders steps of one attempt contiguously and lets
/// the resolver address each slot directly inside a transaction.
pub fn step_key(request_id: &str, attempt: u32, step_number: u32) -> String {
    format!("{request_id}/{attempt:04}/{step_number:02}")
}

/// Materialize the pending step sequence for one submission attempt.
pub fn build_steps(
    request_id: &str,
    attempt: u32,
    tier: Tier,
    mut mint_id: impl FnMut() -> String,
) -> Vec<ApprovalStep> {
    tier.approval_chain()
        .iter()
        .enumerate()
        .map(|(i, role)| ApprovalStep {
            id: mint_id(),
            request_id: request_id.to_string(),
            attempt,
            step_number: i as u32 + 1,
            approver_role: *role,
            action: StepAction::Pending,
            approver_id: None,
            comments: None,
            resolved_at: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_one_pending_step_per_role() {
        let mut n = 0;
        let steps = build_steps("req_x", 1, Tier::T3, || {
            n += 1;
            format!("step_{n}")
        });

        assert_eq!(steps.len(), 3);
        for (i, step) in steps.iter().enumerate() {
            assert_eq!(step.step_number, i as u32 + 1);
            assert!(step.is_pending());
            assert_eq!(step.attempt, 1);
        }
        assert_eq!(steps[0].approver_role, Role::UnitHead);
        assert_eq!(steps[2].approver_role, Role::Ppspm);
    }

    #[test]
    fn step_keys_sort_in_step_order() {
        let a = step_key("req_x", 1, 1);
        let b = step_key("req_x", 1, 2);
        let c = step_key("req_x", 2, 1);

        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn resolve_writes_terminal_outcome() {
        let mut step = build_steps("req_x", 1, Tier::T1, || "step_1".into())
            .pop()
            .unwrap();
        step.resolve(StepOutcome::Approve, "u1", Some("ok".into()));

        assert_eq!(step.action, StepAction::Approve);
        assert_eq!(step.approver_id.as_deref(), Some("u1"));
        assert!(step.resolved_at.is_some());
    }
}
