use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use super::super::completion::{self, CompletionReport};
use super::super::domain::{Actor, Performer, Policy, PolicyStatus, RequestContext};
use super::super::events::PolicyEvent;
use super::transitions::{self, TransitionError, TransitionOutcome, TransitionRequest};
use crate::config::LifecycleConfig;

/// What the coordinator did with an event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum CoordinatorDecision {
    Advanced { outcome: TransitionOutcome },
    AwaitingActors { report: CompletionReport },
    /// Every actor is complete but automatic advancement is switched off.
    ReadyForReview { report: CompletionReport },
    NotCollecting { status: PolicyStatus },
}

impl CoordinatorDecision {
    pub fn advanced(&self) -> bool {
        matches!(self, Self::Advanced { .. })
    }
}

/// Single consumer of [`PolicyEvent`]s, re-evaluating the completion
/// predicate and opening the investigation once every actor is done.
#[derive(Debug, Clone)]
pub struct LifecycleCoordinator {
    auto_advance: bool,
}

impl LifecycleCoordinator {
    pub fn new(config: &LifecycleConfig) -> Self {
        Self {
            auto_advance: config.auto_advance,
        }
    }

    pub fn handle(
        &self,
        event: &PolicyEvent,
        policy: &mut Policy,
        actors: &[Actor],
        now: DateTime<Utc>,
    ) -> Result<CoordinatorDecision, TransitionError> {
        if policy.status != PolicyStatus::CollectingInfo {
            debug!(policy = %policy.id, status = %policy.status, "event ignored outside collection");
            return Ok(CoordinatorDecision::NotCollecting {
                status: policy.status,
            });
        }

        let report = completion::evaluate(policy.guarantor_type, actors);
        if !event.may_complete_policy() || !report.is_complete() {
            debug!(policy = %policy.id, blocking = %report.summary(), "policy still collecting");
            return Ok(CoordinatorDecision::AwaitingActors { report });
        }

        if !self.auto_advance {
            info!(policy = %policy.id, "actor set complete; awaiting staff to open investigation");
            return Ok(CoordinatorDecision::ReadyForReview { report });
        }

        let context = RequestContext::new(Performer::system());
        let mut outcome = transitions::apply(
            policy,
            actors,
            &TransitionRequest::to(PolicyStatus::UnderInvestigation),
            &context,
            now,
        )?;

        if let Some(details) = outcome
            .activity
            .as_mut()
            .and_then(|activity| activity.details.as_object_mut())
        {
            if let Ok(trigger) = serde_json::to_value(event) {
                details.insert("trigger".to_string(), trigger);
            }
        }

        info!(
            policy = %policy.id,
            number = %policy.policy_number,
            "all actors complete; investigation started"
        );
        Ok(CoordinatorDecision::Advanced { outcome })
    }
}
