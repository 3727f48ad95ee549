//! Document requirement matrix, per-document validation, and the aggregated
//! checklist shown next to a policy. None of it gates the policy status.

mod matrix;
pub mod validation;

use std::collections::BTreeMap;

use serde::Serialize;

use super::domain::{Actor, ActorDocument, ActorId, ActorRole, DocumentCategory, ValidationStatus};

pub use matrix::{requirements_for, DocumentRequirement, RequirementProfile};
pub use validation::{DocumentValidationError, ValidationDecision};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChecklistItem {
    pub category: DocumentCategory,
    pub required: bool,
    pub uploaded: usize,
    pub approved: usize,
    pub rejected: usize,
}

impl ChecklistItem {
    pub fn satisfied(&self) -> bool {
        self.approved > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActorChecklist {
    pub actor_id: ActorId,
    pub role: ActorRole,
    pub name: String,
    pub information_complete: bool,
    pub items: Vec<ChecklistItem>,
    pub missing_required: Vec<DocumentCategory>,
    pub all_required_approved: bool,
}

/// Document progress across every active actor of a policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyDocumentSummary {
    pub actors: Vec<ActorChecklist>,
    pub status_counts: BTreeMap<ValidationStatus, usize>,
}

impl PolicyDocumentSummary {
    pub fn all_required_approved(&self) -> bool {
        self.actors.iter().all(|actor| actor.all_required_approved)
    }
}

pub fn actor_checklist(actor: &Actor, documents: &[ActorDocument]) -> ActorChecklist {
    let owned: Vec<&ActorDocument> = documents
        .iter()
        .filter(|document| document.owner.actor_id() == &actor.id)
        .collect();

    let mut rows = requirements_for(&RequirementProfile::of(actor));
    // Uploads outside the matrix still show up so staff can review them.
    for document in &owned {
        if !rows.iter().any(|row| row.category == document.category) {
            rows.push(DocumentRequirement {
                category: document.category,
                required: false,
            });
        }
    }

    let items: Vec<ChecklistItem> = rows
        .into_iter()
        .map(|row| {
            let count = |status: Option<ValidationStatus>| {
                owned
                    .iter()
                    .filter(|document| document.category == row.category)
                    .filter(|document| status.map_or(true, |status| document.status == status))
                    .count()
            };
            ChecklistItem {
                category: row.category,
                required: row.required,
                uploaded: count(None),
                approved: count(Some(ValidationStatus::Approved)),
                rejected: count(Some(ValidationStatus::Rejected)),
            }
        })
        .collect();

    let missing_required: Vec<DocumentCategory> = items
        .iter()
        .filter(|item| item.required && item.uploaded == 0)
        .map(|item| item.category)
        .collect();
    let all_required_approved = items
        .iter()
        .filter(|item| item.required)
        .all(ChecklistItem::satisfied);

    ActorChecklist {
        actor_id: actor.id.clone(),
        role: actor.role,
        name: actor.display_name(),
        information_complete: actor.information_complete,
        items,
        missing_required,
        all_required_approved,
    }
}

pub fn summarize(actors: &[Actor], documents: &[ActorDocument]) -> PolicyDocumentSummary {
    let mut active: Vec<&Actor> = actors.iter().filter(|actor| actor.is_active()).collect();
    active.sort_by_key(|actor| actor.role);

    let mut status_counts = BTreeMap::new();
    for document in documents
        .iter()
        .filter(|document| active.iter().any(|actor| &actor.id == document.owner.actor_id()))
    {
        *status_counts.entry(document.status).or_insert(0) += 1;
    }

    PolicyDocumentSummary {
        actors: active
            .into_iter()
            .map(|actor| actor_checklist(actor, documents))
            .collect(),
        status_counts,
    }
}
