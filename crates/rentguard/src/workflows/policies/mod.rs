//! Rental-guarantee policy lifecycle: guarantor requirements, actor completion,
//! the status state machine, and per-document validation.
//!
//! Actor-level writes emit [`PolicyEvent`]s; the [`LifecycleCoordinator`] is the
//! only component that reacts to them by moving the policy forward. Document
//! validation is tracked next to the lifecycle and never gates it.

pub mod actors;
pub mod completion;
pub mod documents;
pub mod domain;
pub mod events;
pub mod lifecycle;
pub mod pricing;
pub mod repository;
pub mod requirements;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use actors::{profile_for, ActorProfile, ActorSubmission, ProfileIncomplete};
pub use completion::{CompletionReport, IncompleteActor, RoleShortfall};
pub use documents::{
    ActorChecklist, ChecklistItem, DocumentRequirement, DocumentValidationError,
    PolicyDocumentSummary, ValidationDecision,
};
pub use domain::{
    AccessToken, Actor, ActorDocument, ActorId, ActorIdentity, ActorKind, ActorReference,
    ActorRole, ContactInfo, ContractDocument, DocumentCategory, DocumentId, DocumentOwner,
    Employment, Guarantee, GuaranteeMethod, GuarantorType, MaritalStatus, Nationality,
    PackageId, PerformedByType, Performer, PersonName, Policy, PolicyActivity, PolicyId,
    PolicyStatus, ReferenceKind, RequestContext, ValidationStatus,
};
pub use events::PolicyEvent;
pub use lifecycle::{
    allowed_targets, is_allowed, CoordinatorDecision, LifecycleCoordinator, TransitionError,
    TransitionOutcome, TransitionRequest,
};
pub use pricing::{Package, PackagePricing};
pub use repository::{
    CommitReceipt, NotificationError, NotificationPublisher, PolicyChangeset, PolicyNotification,
    PolicyRepository, PolicyWrite, RepositoryError, WriteResolution,
};
pub use requirements::{required_roles, Cardinality, RoleRequirement};
pub use router::{policy_router, STAFF_HEADER};
pub use service::{
    ActorUpdate, Invitation, NewDocument, NewPolicy, PolicyService, PolicyServiceError,
    PolicySnapshot, PolicyTransition, PortalView,
};
