use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::super::completion::{self, CompletionReport};
use super::super::domain::{
    Actor, PerformedByType, Policy, PolicyActivity, PolicyStatus, RequestContext,
};

use PolicyStatus::*;

/// Rules that must hold, beyond the edge existing, before a policy may enter a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Precondition {
    ActorsComplete,
    ContractGenerated,
    ReasonProvided,
}

/// Allow-list adjacency table of the policy lifecycle.
pub const fn allowed_targets(from: PolicyStatus) -> &'static [PolicyStatus] {
    match from {
        Draft => &[CollectingInfo, Cancelled],
        CollectingInfo => &[UnderInvestigation, Cancelled],
        UnderInvestigation => &[PendingApproval, InvestigationRejected, Cancelled],
        InvestigationRejected => &[CollectingInfo, Cancelled],
        PendingApproval => &[Approved, InvestigationRejected, Cancelled],
        Approved => &[ContractPending, Cancelled],
        ContractPending => &[ContractSigned, Cancelled],
        ContractSigned => &[Active, Cancelled],
        Active => &[Expired, Cancelled],
        Expired | Cancelled => &[],
    }
}

pub fn is_allowed(from: PolicyStatus, to: PolicyStatus) -> bool {
    allowed_targets(from).contains(&to)
}

pub fn preconditions(to: PolicyStatus) -> &'static [Precondition] {
    match to {
        UnderInvestigation => &[Precondition::ActorsComplete],
        ContractPending => &[Precondition::ContractGenerated],
        InvestigationRejected | Cancelled => &[Precondition::ReasonProvided],
        _ => &[],
    }
}

/// Activity action written when a policy enters the status.
pub const fn activity_action(to: PolicyStatus) -> &'static str {
    match to {
        Draft => "returned_to_draft",
        CollectingInfo => "info_collection_started",
        UnderInvestigation => "investigation_started",
        InvestigationRejected => "investigation_rejected",
        PendingApproval => "approval_requested",
        Approved => "policy_approved",
        ContractPending => "contract_pending",
        ContractSigned => "contract_signed",
        Active => "policy_activated",
        Expired => "policy_expired",
        Cancelled => "policy_cancelled",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("{}", describe_invalid(*from, *to))]
    Invalid { from: PolicyStatus, to: PolicyStatus },
    #[error("the policy cannot move to {target} yet: {}", report.summary())]
    ActorsIncomplete {
        target: PolicyStatus,
        report: CompletionReport,
    },
    #[error("a contract document must be generated before the policy can move to {target}")]
    ContractMissing { target: PolicyStatus },
    #[error("a reason is required to move the policy to {target}")]
    ReasonRequired { target: PolicyStatus },
    #[error("only administrators may override the policy status")]
    OverrideNotPermitted,
}

fn describe_invalid(from: PolicyStatus, to: PolicyStatus) -> String {
    if from.is_terminal() {
        return format!(
            "the policy cannot move from {from} to {to} because {from} is a final status"
        );
    }

    let allowed: Vec<&str> = allowed_targets(from)
        .iter()
        .map(|status| status.as_str())
        .collect();
    format!(
        "the policy cannot move from {from} to {to}; from {from} it may only move to {}",
        allowed.join(", ")
    )
}

/// A requested status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub target: PolicyStatus,
    #[serde(default)]
    pub reason: Option<String>,
    /// Skip edge and precondition checks. Administrators only; a reason is mandatory.
    #[serde(default)]
    pub admin_override: bool,
}

impl TransitionRequest {
    pub fn to(target: PolicyStatus) -> Self {
        Self {
            target,
            reason: None,
            admin_override: false,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn overriding(mut self) -> Self {
        self.admin_override = true;
        self
    }

    fn trimmed_reason(&self) -> Option<&str> {
        self.reason
            .as_deref()
            .map(str::trim)
            .filter(|reason| !reason.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionOutcome {
    pub from: PolicyStatus,
    pub to: PolicyStatus,
    /// `None` when the policy already sat in the target status.
    pub activity: Option<PolicyActivity>,
}

impl TransitionOutcome {
    pub fn changed(&self) -> bool {
        self.activity.is_some()
    }
}

/// Check a request against the current policy without touching it.
pub fn check(
    policy: &Policy,
    actors: &[Actor],
    request: &TransitionRequest,
    context: &RequestContext,
) -> Result<(), TransitionError> {
    let from = policy.status;
    let to = request.target;

    if from == to {
        return Ok(());
    }

    if request.admin_override {
        if context.performer.kind != PerformedByType::Admin {
            return Err(TransitionError::OverrideNotPermitted);
        }
        if request.trimmed_reason().is_none() {
            return Err(TransitionError::ReasonRequired { target: to });
        }
        return Ok(());
    }

    if !is_allowed(from, to) {
        return Err(TransitionError::Invalid { from, to });
    }

    for precondition in preconditions(to) {
        match precondition {
            Precondition::ActorsComplete => {
                let report = completion::evaluate(policy.guarantor_type, actors);
                if !report.is_complete() {
                    return Err(TransitionError::ActorsIncomplete { target: to, report });
                }
            }
            Precondition::ContractGenerated => {
                if policy.contract.is_none() {
                    return Err(TransitionError::ContractMissing { target: to });
                }
            }
            Precondition::ReasonProvided => {
                if request.trimmed_reason().is_none() {
                    return Err(TransitionError::ReasonRequired { target: to });
                }
            }
        }
    }

    Ok(())
}

/// Validate and apply a transition. On error the policy is left untouched; a
/// request for the current status succeeds without producing an activity.
pub fn apply(
    policy: &mut Policy,
    actors: &[Actor],
    request: &TransitionRequest,
    context: &RequestContext,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, TransitionError> {
    check(policy, actors, request, context)?;

    let from = policy.status;
    let to = request.target;
    if from == to {
        return Ok(TransitionOutcome {
            from,
            to,
            activity: None,
        });
    }

    policy.status = to;
    policy.updated_at = now;
    match to {
        UnderInvestigation => policy.submitted_at = Some(now),
        Approved => policy.approved_at = Some(now),
        Active => policy.activated_at = Some(now),
        _ => {}
    }

    let overridden = request.admin_override;
    let description = if overridden {
        format!(
            "Administrative override moved the policy from {} to {}",
            from.label(),
            to.label()
        )
    } else {
        format!("Policy moved from {} to {}", from.label(), to.label())
    };

    let activity = PolicyActivity::record(
        &policy.id,
        activity_action(to),
        description,
        json!({
            "from": from,
            "to": to,
            "reason": request.trimmed_reason(),
            "override": overridden,
        }),
        context,
        now,
    );

    Ok(TransitionOutcome {
        from,
        to,
        activity: Some(activity),
    })
}
