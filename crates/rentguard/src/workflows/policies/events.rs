use serde::Serialize;

use super::domain::{DocumentOwner, GuarantorType, PolicyId};

/// Signals emitted by actor-level writes. The lifecycle coordinator is the only
/// consumer; actor handlers never call the transition engine themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PolicyEvent {
    ActorInformationCompleted {
        policy_id: PolicyId,
        actor: DocumentOwner,
    },
    ActorInformationReopened {
        policy_id: PolicyId,
        actor: DocumentOwner,
    },
    GuarantorsChanged {
        policy_id: PolicyId,
        guarantor_type: GuarantorType,
    },
}

impl PolicyEvent {
    pub fn policy_id(&self) -> &PolicyId {
        match self {
            Self::ActorInformationCompleted { policy_id, .. }
            | Self::ActorInformationReopened { policy_id, .. }
            | Self::GuarantorsChanged { policy_id, .. } => policy_id,
        }
    }

    /// Whether the event can flip the completion predicate to true.
    pub fn may_complete_policy(&self) -> bool {
        !matches!(self, Self::ActorInformationReopened { .. })
    }
}
