use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::{
    Actor, ActorDocument, ActorId, DocumentId, PackageId, Policy, PolicyActivity, PolicyId,
    PolicyStatus,
};
use super::pricing::Package;

/// A policy write guarded by the status and row version the caller read.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyWrite {
    /// The row as the caller wants it stored; `version` is the one it read.
    pub policy: Policy,
    /// `None` for inserts.
    pub expected_status: Option<PolicyStatus>,
    /// Only the status and its timestamps differ from the row that was read.
    pub status_only: bool,
}

/// How a [`PolicyWrite`] lands on the stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteResolution {
    Apply,
    /// Another request already moved the row to the status this write carries.
    AlreadyApplied,
}

impl PolicyWrite {
    /// Check the write against the stored row. A read is current only while
    /// both its status and version still match. A stale status-only write whose
    /// target status is already stored counts as applied; any other stale
    /// write is a [`RepositoryError::Conflict`].
    pub fn resolve(&self, stored: Option<&Policy>) -> Result<WriteResolution, RepositoryError> {
        let Some(expected) = self.expected_status else {
            return match stored {
                None => Ok(WriteResolution::Apply),
                Some(_) => Err(RepositoryError::Conflict),
            };
        };
        let Some(current) = stored else {
            return Err(RepositoryError::NotFound);
        };

        if current.version == self.policy.version && current.status == expected {
            Ok(WriteResolution::Apply)
        } else if self.status_only
            && current.status != expected
            && current.status == self.policy.status
        {
            Ok(WriteResolution::AlreadyApplied)
        } else {
            Err(RepositoryError::Conflict)
        }
    }

    /// The row to store. Updates move the version past the one read.
    pub fn into_row(self) -> Policy {
        let mut policy = self.policy;
        if self.expected_status.is_some() {
            policy.version += 1;
        }
        policy
    }
}

/// Everything one request changes, committed atomically.
///
/// The policy write is resolved first (see [`PolicyWrite::resolve`]). When it
/// conflicts nothing is written. When it was already applied by another
/// request, the policy row and `status_activities` are dropped and the rest of
/// the changeset still lands.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyChangeset {
    pub policy_id: PolicyId,
    pub policy: Option<PolicyWrite>,
    pub actors: Vec<Actor>,
    pub documents: Vec<ActorDocument>,
    pub activities: Vec<PolicyActivity>,
    /// Activities describing the status change carried by `policy`.
    pub status_activities: Vec<PolicyActivity>,
}

impl PolicyChangeset {
    pub fn new(policy_id: PolicyId) -> Self {
        Self {
            policy_id,
            policy: None,
            actors: Vec::new(),
            documents: Vec::new(),
            activities: Vec::new(),
            status_activities: Vec::new(),
        }
    }

    pub fn insert_policy(&mut self, policy: Policy) {
        self.policy = Some(PolicyWrite {
            policy,
            expected_status: None,
            status_only: false,
        });
    }

    /// Write a policy whose fields beyond the status changed.
    pub fn update_policy(&mut self, policy: Policy, expected_status: PolicyStatus) {
        self.policy = Some(PolicyWrite {
            policy,
            expected_status: Some(expected_status),
            status_only: false,
        });
    }

    /// Write a status move produced by the transition engine.
    pub fn update_status(&mut self, policy: Policy, expected_status: PolicyStatus) {
        self.policy = Some(PolicyWrite {
            policy,
            expected_status: Some(expected_status),
            status_only: true,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.policy.is_none()
            && self.actors.is_empty()
            && self.documents.is_empty()
            && self.activities.is_empty()
            && self.status_activities.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitReceipt {
    pub policy_written: bool,
    /// The policy was already in the requested status when the commit landed.
    pub status_already_applied: bool,
    /// Version of the stored row when `policy_written`.
    pub policy_version: Option<u64>,
}

/// Storage abstraction so the service module can be exercised in isolation.
pub trait PolicyRepository: Send + Sync {
    fn fetch_policy(&self, id: &PolicyId) -> Result<Option<Policy>, RepositoryError>;
    fn list_policies(&self) -> Result<Vec<Policy>, RepositoryError>;
    /// Every actor on the policy, archived ones included.
    fn actors_for_policy(&self, id: &PolicyId) -> Result<Vec<Actor>, RepositoryError>;
    fn fetch_actor(&self, id: &ActorId) -> Result<Option<Actor>, RepositoryError>;
    fn actor_by_token(&self, token: &str) -> Result<Option<Actor>, RepositoryError>;
    fn fetch_document(&self, id: &DocumentId) -> Result<Option<ActorDocument>, RepositoryError>;
    fn documents_for_policy(&self, id: &PolicyId)
        -> Result<Vec<ActorDocument>, RepositoryError>;
    /// Activities in the order they were written.
    fn activities(&self, id: &PolicyId) -> Result<Vec<PolicyActivity>, RepositoryError>;
    fn fetch_package(&self, id: &PackageId) -> Result<Option<Package>, RepositoryError>;
    fn packages(&self) -> Result<Vec<Package>, RepositoryError>;
    /// Next value of the policy number sequence; never handed out twice.
    fn next_policy_sequence(&self) -> Result<u64, RepositoryError>;
    fn commit(&self, changeset: PolicyChangeset) -> Result<CommitReceipt, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("the record was changed by another request")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Outbound notification hooks (e-mail, broker webhooks).
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, notification: PolicyNotification) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyNotification {
    pub template: String,
    pub policy_id: PolicyId,
    pub recipient: Option<String>,
    pub details: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
