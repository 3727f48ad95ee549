use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::actors::{profile_for, ActorSubmission, ProfileIncomplete};
use super::completion::{self, CompletionReport};
use super::documents::validation::{self as document_validation, DocumentValidationError};
use super::documents::{self, DocumentRequirement, PolicyDocumentSummary, ValidationDecision};
use super::domain::{
    AccessToken, Actor, ActorDocument, ActorId, ActorRole, ContractDocument, DocumentCategory,
    DocumentId, DocumentOwner, GuarantorType, PackageId, Performer, Policy, PolicyActivity,
    PolicyId, PolicyStatus, RequestContext, ValidationStatus,
};
use super::events::PolicyEvent;
use super::lifecycle::{
    allowed_targets, transitions, CoordinatorDecision, LifecycleCoordinator, TransitionError,
    TransitionOutcome, TransitionRequest,
};
use super::pricing::Package;
use super::repository::{
    CommitReceipt, NotificationPublisher, PolicyChangeset, PolicyNotification, PolicyRepository,
    RepositoryError,
};
use super::requirements::{required_roles, requires_role};
use crate::config::LifecycleConfig;

/// Payload a broker submits to open a policy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewPolicy {
    pub broker_id: String,
    pub rent_amount: Decimal,
    pub guarantor_type: GuarantorType,
    #[serde(default)]
    pub package_id: Option<PackageId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewDocument {
    pub category: DocumentCategory,
    pub file_name: String,
    pub storage_key: String,
}

/// Policy plus its active actors and whatever blocks the investigation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicySnapshot {
    pub policy: Policy,
    pub actors: Vec<Actor>,
    pub completion: CompletionReport,
    pub allowed_transitions: Vec<PolicyStatus>,
}

impl PolicySnapshot {
    fn build(policy: Policy, actors: Vec<Actor>) -> Self {
        let completion = completion::evaluate(policy.guarantor_type, &actors);
        let allowed_transitions = allowed_targets(policy.status).to_vec();
        Self {
            actors: actors.into_iter().filter(Actor::is_active).collect(),
            completion,
            allowed_transitions,
            policy,
        }
    }
}

/// Portal link issued to one actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invitation {
    pub actor_id: ActorId,
    pub role: ActorRole,
    pub recipient: Option<String>,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActorUpdate {
    pub actor: Actor,
    pub policy: Policy,
    pub decision: Option<CoordinatorDecision>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyTransition {
    pub policy: Policy,
    pub outcome: TransitionOutcome,
}

/// What an actor sees when opening their portal link.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortalView {
    pub actor: Actor,
    pub policy_number: String,
    pub policy_status: PolicyStatus,
    pub missing_fields: Vec<&'static str>,
    pub required_documents: Vec<DocumentRequirement>,
    pub documents: Vec<ActorDocument>,
}

/// Service composing the repository, lifecycle coordinator and notifications.
pub struct PolicyService<R, N> {
    repository: Arc<R>,
    notifications: Arc<N>,
    coordinator: LifecycleCoordinator,
    lifecycle: LifecycleConfig,
}

fn policy_number(sequence: u64, now: DateTime<Utc>) -> String {
    format!("POL-{}-{sequence:06}", now.format("%Y%m%d"))
}

const PORTAL_OPEN: [PolicyStatus; 2] = [
    PolicyStatus::CollectingInfo,
    PolicyStatus::InvestigationRejected,
];

const ACTOR_SET_EDITABLE: [PolicyStatus; 3] = [
    PolicyStatus::Draft,
    PolicyStatus::CollectingInfo,
    PolicyStatus::InvestigationRejected,
];

impl<R, N> PolicyService<R, N>
where
    R: PolicyRepository + 'static,
    N: NotificationPublisher + 'static,
{
    pub fn new(repository: Arc<R>, notifications: Arc<N>, lifecycle: LifecycleConfig) -> Self {
        Self {
            repository,
            notifications,
            coordinator: LifecycleCoordinator::new(&lifecycle),
            lifecycle,
        }
    }

    /// Open a policy in `DRAFT` with empty actor records for every required role.
    pub fn create_policy(
        &self,
        request: NewPolicy,
        context: &RequestContext,
    ) -> Result<PolicySnapshot, PolicyServiceError> {
        let broker_id = request.broker_id.trim();
        if broker_id.is_empty() {
            return Err(PolicyServiceError::InvalidRequest(
                "a broker id is required".to_string(),
            ));
        }
        if request.rent_amount <= Decimal::ZERO {
            return Err(PolicyServiceError::InvalidRequest(
                "the monthly rent must be greater than zero".to_string(),
            ));
        }

        let package = match &request.package_id {
            Some(id) => Some(self.load_package(id)?),
            None => None,
        };

        let now = Utc::now();
        let sequence = self.repository.next_policy_sequence()?;
        let policy = Policy {
            id: PolicyId::generate(),
            policy_number: policy_number(sequence, now),
            broker_id: broker_id.to_string(),
            rent_amount: request.rent_amount,
            guarantor_type: request.guarantor_type,
            status: PolicyStatus::Draft,
            package_id: package.as_ref().map(|package| package.id.clone()),
            package_price: package
                .as_ref()
                .map(|package| package.price_for(request.rent_amount)),
            contract: None,
            submitted_at: None,
            approved_at: None,
            activated_at: None,
            created_at: now,
            updated_at: now,
            version: 1,
        };

        let actors: Vec<Actor> = required_roles(policy.guarantor_type)
            .iter()
            .map(|requirement| Actor::shell(policy.id.clone(), requirement.role, now))
            .collect();

        let mut changeset = PolicyChangeset::new(policy.id.clone());
        changeset.activities.push(PolicyActivity::record(
            &policy.id,
            "policy_created",
            format!("Policy {} created", policy.policy_number),
            json!({
                "guarantor_type": policy.guarantor_type,
                "rent_amount": policy.rent_amount,
                "package_id": policy.package_id,
                "package_price": policy.package_price,
            }),
            context,
            now,
        ));
        changeset.actors = actors.clone();
        changeset.insert_policy(policy.clone());
        self.repository.commit(changeset)?;

        info!(
            policy = %policy.id,
            number = %policy.policy_number,
            guarantor_type = %policy.guarantor_type,
            "policy created"
        );
        Ok(PolicySnapshot::build(policy, actors))
    }

    pub fn get(&self, policy_id: &PolicyId) -> Result<PolicySnapshot, PolicyServiceError> {
        let policy = self.load_policy(policy_id)?;
        let actors = self.repository.actors_for_policy(policy_id)?;
        Ok(PolicySnapshot::build(policy, actors))
    }

    pub fn list(&self) -> Result<Vec<Policy>, PolicyServiceError> {
        Ok(self.repository.list_policies()?)
    }

    pub fn packages(&self) -> Result<Vec<Package>, PolicyServiceError> {
        Ok(self.repository.packages()?)
    }

    /// Issue fresh portal links to every active actor and start collecting
    /// information if the policy is still a draft.
    pub fn send_invitations(
        &self,
        policy_id: &PolicyId,
        context: &RequestContext,
    ) -> Result<Vec<Invitation>, PolicyServiceError> {
        let mut policy = self.load_policy(policy_id)?;
        ensure_open(&policy)?;
        if !ACTOR_SET_EDITABLE.contains(&policy.status) {
            return Err(PolicyServiceError::PortalClosed {
                status: policy.status,
            });
        }

        let now = Utc::now();
        let from = policy.status;
        let mut changeset = PolicyChangeset::new(policy.id.clone());

        if policy.status == PolicyStatus::Draft {
            let actors = self.repository.actors_for_policy(policy_id)?;
            let outcome = transitions::apply(
                &mut policy,
                &actors,
                &TransitionRequest::to(PolicyStatus::CollectingInfo),
                context,
                now,
            )?;
            changeset.status_activities.extend(outcome.activity);
            changeset.update_status(policy.clone(), from);
        }

        let mut invitations = Vec::new();
        for mut actor in self
            .repository
            .actors_for_policy(policy_id)?
            .into_iter()
            .filter(Actor::is_active)
        {
            let invitation = self.issue_token(&mut actor, now);
            changeset.actors.push(actor);
            invitations.push(invitation);
        }

        changeset.activities.push(PolicyActivity::record(
            &policy.id,
            "invitations_sent",
            format!("Portal invitations sent to {} actors", invitations.len()),
            json!({
                "actors": invitations
                    .iter()
                    .map(|invitation| {
                        json!({ "actor_id": invitation.actor_id, "role": invitation.role })
                    })
                    .collect::<Vec<_>>(),
            }),
            context,
            now,
        ));

        let receipt = self.repository.commit(changeset)?;
        self.announce_status_change(&policy, from, receipt);
        for invitation in &invitations {
            self.notify_invitation(&policy, invitation);
        }

        info!(policy = %policy.id, count = invitations.len(), "invitations sent");
        Ok(invitations)
    }

    /// Staff edit of an actor record.
    pub fn submit_actor_information(
        &self,
        actor_id: &ActorId,
        submission: ActorSubmission,
        context: &RequestContext,
    ) -> Result<ActorUpdate, PolicyServiceError> {
        let actor = self.load_actor(actor_id)?;
        if !actor.is_active() {
            return Err(PolicyServiceError::ActorNotFound(actor_id.clone()));
        }
        let policy = self.load_policy(&actor.policy_id)?;
        ensure_open(&policy)?;
        self.apply_submission(policy, actor, submission, context)
    }

    /// Self-service edit through a portal link.
    pub fn submit_via_token(
        &self,
        token: &str,
        submission: ActorSubmission,
        ip_address: Option<String>,
    ) -> Result<ActorUpdate, PolicyServiceError> {
        let actor = self.actor_for_token(token, Utc::now())?;
        let policy = self.load_policy(&actor.policy_id)?;
        ensure_portal_open(&policy)?;
        let context = RequestContext::new(Performer::actor(&actor.id)).with_ip(ip_address);
        self.apply_submission(policy, actor, submission, &context)
    }

    pub fn portal_view(&self, token: &str) -> Result<PortalView, PolicyServiceError> {
        let actor = self.actor_for_token(token, Utc::now())?;
        let policy = self.load_policy(&actor.policy_id)?;
        let profile = profile_for(actor.role);
        let documents = self
            .repository
            .documents_for_policy(&policy.id)?
            .into_iter()
            .filter(|document| document.owner.actor_id() == &actor.id)
            .collect();

        Ok(PortalView {
            missing_fields: profile.missing_fields(&actor),
            required_documents: profile.required_documents(&actor),
            documents,
            policy_number: policy.policy_number,
            policy_status: policy.status,
            actor,
        })
    }

    fn apply_submission(
        &self,
        mut policy: Policy,
        mut actor: Actor,
        submission: ActorSubmission,
        context: &RequestContext,
    ) -> Result<ActorUpdate, PolicyServiceError> {
        let now = Utc::now();
        let from = policy.status;
        let was_complete = actor.information_complete;
        let marking_complete = submission.information_complete;

        submission.merge_into(&mut actor);
        actor.updated_at = now;

        let (action, event) = if marking_complete {
            profile_for(actor.role).ensure_complete(&actor)?;
            actor.information_complete = true;
            if !was_complete {
                actor.completed_at = Some(now);
            }
            (
                "actor_information_completed",
                Some(PolicyEvent::ActorInformationCompleted {
                    policy_id: policy.id.clone(),
                    actor: actor.owner(),
                }),
            )
        } else if was_complete {
            actor.information_complete = false;
            actor.completed_at = None;
            (
                "actor_information_reopened",
                Some(PolicyEvent::ActorInformationReopened {
                    policy_id: policy.id.clone(),
                    actor: actor.owner(),
                }),
            )
        } else {
            ("actor_information_updated", None)
        };

        let mut changeset = PolicyChangeset::new(policy.id.clone());
        changeset.activities.push(PolicyActivity::record(
            &policy.id,
            action,
            format!(
                "{} {} updated their information",
                capitalize(actor.role.label()),
                actor.display_name()
            ),
            json!({
                "actor_id": actor.id,
                "role": actor.role,
                "information_complete": actor.information_complete,
            }),
            context,
            now,
        ));

        let actors: Vec<Actor> = self
            .repository
            .actors_for_policy(&policy.id)?
            .into_iter()
            .map(|stored| if stored.id == actor.id { actor.clone() } else { stored })
            .collect();

        let decision = match event {
            Some(event) => {
                Some(self.coordinate(&event, &mut policy, &actors, &mut changeset, now)?)
            }
            None => None,
        };

        changeset.actors.push(actor.clone());
        let receipt = self.repository.commit(changeset)?;
        settle_version(&mut policy, receipt);
        self.announce_status_change(&policy, from, receipt);

        info!(
            policy = %policy.id,
            actor = %actor.id,
            role = %actor.role,
            complete = actor.information_complete,
            "actor information saved"
        );

        Ok(ActorUpdate {
            actor,
            policy,
            decision: decision.map(|decision| settle_decision(decision, receipt)),
        })
    }

    /// Add another joint obligor or aval when the guarantor type calls for one.
    pub fn add_guarantor(
        &self,
        policy_id: &PolicyId,
        role: ActorRole,
        context: &RequestContext,
    ) -> Result<Actor, PolicyServiceError> {
        let policy = self.load_policy(policy_id)?;
        ensure_open(&policy)?;
        ensure_actor_set_editable(&policy, "add a guarantor")?;
        if !role.is_guarantor() || !requires_role(policy.guarantor_type, role) {
            return Err(PolicyServiceError::GuarantorNotRequired {
                role,
                guarantor_type: policy.guarantor_type,
            });
        }

        let now = Utc::now();
        let mut actor = Actor::shell(policy.id.clone(), role, now);
        let invitation = (policy.status != PolicyStatus::Draft)
            .then(|| self.issue_token(&mut actor, now));

        let mut changeset = PolicyChangeset::new(policy.id.clone());
        changeset.activities.push(PolicyActivity::record(
            &policy.id,
            "guarantor_added",
            format!("Added a {}", role.label()),
            json!({ "actor_id": actor.id, "role": role }),
            context,
            now,
        ));
        changeset.actors.push(actor.clone());
        self.repository.commit(changeset)?;

        if let Some(invitation) = &invitation {
            self.notify_invitation(&policy, invitation);
        }
        info!(policy = %policy.id, actor = %actor.id, role = %role, "guarantor added");
        Ok(actor)
    }

    /// Switch the guarantor configuration, archiving actors whose role is no
    /// longer required and creating shells for newly required roles.
    pub fn change_guarantor_type(
        &self,
        policy_id: &PolicyId,
        guarantor_type: GuarantorType,
        context: &RequestContext,
    ) -> Result<PolicySnapshot, PolicyServiceError> {
        let mut policy = self.load_policy(policy_id)?;
        ensure_open(&policy)?;
        ensure_actor_set_editable(&policy, "change the guarantor type")?;

        let mut actors = self.repository.actors_for_policy(policy_id)?;
        if policy.guarantor_type == guarantor_type {
            return Ok(PolicySnapshot::build(policy, actors));
        }

        let now = Utc::now();
        let from_status = policy.status;
        let previous_type = policy.guarantor_type;
        let mut changeset = PolicyChangeset::new(policy.id.clone());

        let mut archived = Vec::new();
        for actor in actors.iter_mut().filter(|actor| actor.is_active()) {
            if actor.role.is_guarantor() && !requires_role(guarantor_type, actor.role) {
                actor.archived_at = Some(now);
                actor.access = None;
                actor.updated_at = now;
                archived.push(actor.id.clone());
                changeset.actors.push(actor.clone());
            }
        }

        let mut added = Vec::new();
        let mut invitations = Vec::new();
        for requirement in required_roles(guarantor_type) {
            let present = actors
                .iter()
                .any(|actor| actor.is_active() && actor.role == requirement.role);
            if present {
                continue;
            }
            let mut shell = Actor::shell(policy.id.clone(), requirement.role, now);
            if policy.status != PolicyStatus::Draft {
                invitations.push(self.issue_token(&mut shell, now));
            }
            added.push(shell.id.clone());
            changeset.actors.push(shell.clone());
            actors.push(shell);
        }

        policy.guarantor_type = guarantor_type;
        policy.updated_at = now;
        changeset.activities.push(PolicyActivity::record(
            &policy.id,
            "guarantor_type_changed",
            format!("Guarantor type changed from {previous_type} to {guarantor_type}"),
            json!({
                "from": previous_type,
                "to": guarantor_type,
                "archived": archived,
                "added": added,
            }),
            context,
            now,
        ));

        let event = PolicyEvent::GuarantorsChanged {
            policy_id: policy.id.clone(),
            guarantor_type,
        };
        self.coordinate(&event, &mut policy, &actors, &mut changeset, now)?;
        changeset.update_policy(policy.clone(), from_status);

        let receipt = self.repository.commit(changeset)?;
        settle_version(&mut policy, receipt);
        self.announce_status_change(&policy, from_status, receipt);
        for invitation in &invitations {
            self.notify_invitation(&policy, invitation);
        }

        info!(
            policy = %policy.id,
            from = %previous_type,
            to = %guarantor_type,
            archived = archived.len(),
            added = added.len(),
            "guarantor type changed"
        );
        Ok(PolicySnapshot::build(policy, actors))
    }

    /// Move a policy to another status through the transition engine.
    pub fn transition(
        &self,
        policy_id: &PolicyId,
        request: TransitionRequest,
        context: &RequestContext,
    ) -> Result<PolicyTransition, PolicyServiceError> {
        let mut policy = self.load_policy(policy_id)?;
        let actors = self.repository.actors_for_policy(policy_id)?;
        let from = policy.status;

        let mut outcome = transitions::apply(&mut policy, &actors, &request, context, Utc::now())?;
        if !outcome.changed() {
            return Ok(PolicyTransition { policy, outcome });
        }

        let mut changeset = PolicyChangeset::new(policy.id.clone());
        changeset.status_activities.extend(outcome.activity.clone());
        changeset.update_status(policy.clone(), from);
        let receipt = self.repository.commit(changeset)?;

        if receipt.status_already_applied {
            outcome.activity = None;
            policy = self.load_policy(policy_id)?;
        } else {
            settle_version(&mut policy, receipt);
            self.announce_status_change(&policy, from, receipt);
        }

        info!(
            policy = %policy.id,
            from = %from,
            to = %outcome.to,
            admin_override = request.admin_override,
            recorded = outcome.changed(),
            "policy transition"
        );
        Ok(PolicyTransition { policy, outcome })
    }

    /// Attach the generated lease contract so the policy may enter `CONTRACT_PENDING`.
    pub fn attach_contract(
        &self,
        policy_id: &PolicyId,
        storage_key: &str,
        context: &RequestContext,
    ) -> Result<Policy, PolicyServiceError> {
        let storage_key = storage_key.trim();
        if storage_key.is_empty() {
            return Err(PolicyServiceError::InvalidRequest(
                "a contract storage key is required".to_string(),
            ));
        }

        let mut policy = self.load_policy(policy_id)?;
        if !matches!(
            policy.status,
            PolicyStatus::Approved | PolicyStatus::ContractPending
        ) {
            return Err(PolicyServiceError::PolicyLocked {
                action: "attach a contract",
                status: policy.status,
            });
        }

        let now = Utc::now();
        let replaced = policy.contract.is_some();
        policy.contract = Some(ContractDocument {
            storage_key: storage_key.to_string(),
            generated_at: now,
        });
        policy.updated_at = now;

        let mut changeset = PolicyChangeset::new(policy.id.clone());
        changeset.activities.push(PolicyActivity::record(
            &policy.id,
            "contract_attached",
            "Contract document attached",
            json!({ "storage_key": storage_key, "replaced": replaced }),
            context,
            now,
        ));
        changeset.update_policy(policy.clone(), policy.status);
        let receipt = self.repository.commit(changeset)?;
        settle_version(&mut policy, receipt);

        info!(policy = %policy.id, replaced, "contract attached");
        Ok(policy)
    }

    /// Assign or replace the guarantee package and reprice the policy.
    pub fn assign_package(
        &self,
        policy_id: &PolicyId,
        package_id: &PackageId,
        context: &RequestContext,
    ) -> Result<Policy, PolicyServiceError> {
        let mut policy = self.load_policy(policy_id)?;
        ensure_open(&policy)?;
        if policy.approved_at.is_some() {
            return Err(PolicyServiceError::PolicyLocked {
                action: "change the package",
                status: policy.status,
            });
        }

        let package = self.load_package(package_id)?;
        let now = Utc::now();
        let price = package.price_for(policy.rent_amount);
        let previous_price = policy.package_price;
        policy.package_id = Some(package.id.clone());
        policy.package_price = Some(price);
        policy.updated_at = now;

        let mut changeset = PolicyChangeset::new(policy.id.clone());
        changeset.activities.push(PolicyActivity::record(
            &policy.id,
            "package_assigned",
            format!("Package {} assigned", package.name),
            json!({
                "package_id": package.id,
                "price": price,
                "previous_price": previous_price,
            }),
            context,
            now,
        ));
        changeset.update_policy(policy.clone(), policy.status);
        let receipt = self.repository.commit(changeset)?;
        settle_version(&mut policy, receipt);

        info!(policy = %policy.id, package = %package.id, %price, "package assigned");
        Ok(policy)
    }

    /// Staff upload on behalf of an actor.
    pub fn upload_document(
        &self,
        actor_id: &ActorId,
        upload: NewDocument,
        context: &RequestContext,
    ) -> Result<ActorDocument, PolicyServiceError> {
        let actor = self.load_actor(actor_id)?;
        if !actor.is_active() {
            return Err(PolicyServiceError::ActorNotFound(actor_id.clone()));
        }
        let policy = self.load_policy(&actor.policy_id)?;
        ensure_open(&policy)?;
        self.register_document(&policy, &actor, upload, context)
    }

    pub fn upload_via_token(
        &self,
        token: &str,
        upload: NewDocument,
        ip_address: Option<String>,
    ) -> Result<ActorDocument, PolicyServiceError> {
        let actor = self.actor_for_token(token, Utc::now())?;
        let policy = self.load_policy(&actor.policy_id)?;
        ensure_portal_open(&policy)?;
        let context = RequestContext::new(Performer::actor(&actor.id)).with_ip(ip_address);
        self.register_document(&policy, &actor, upload, &context)
    }

    fn register_document(
        &self,
        policy: &Policy,
        actor: &Actor,
        upload: NewDocument,
        context: &RequestContext,
    ) -> Result<ActorDocument, PolicyServiceError> {
        let file_name = upload.file_name.trim();
        let storage_key = upload.storage_key.trim();
        if file_name.is_empty() || storage_key.is_empty() {
            return Err(PolicyServiceError::InvalidRequest(
                "a file name and storage key are required".to_string(),
            ));
        }

        let now = Utc::now();
        let document = ActorDocument {
            id: DocumentId::generate(),
            policy_id: policy.id.clone(),
            owner: DocumentOwner::new(actor.role, actor.id.clone()),
            category: upload.category,
            file_name: file_name.to_string(),
            storage_key: storage_key.to_string(),
            status: ValidationStatus::Pending,
            rejection_reason: None,
            validated_by: None,
            validated_at: None,
            uploaded_at: now,
        };

        let mut changeset = PolicyChangeset::new(policy.id.clone());
        changeset.activities.push(PolicyActivity::record(
            &policy.id,
            "document_uploaded",
            format!(
                "{} uploaded for {} {}",
                capitalize(document.category.label()),
                actor.role.label(),
                actor.display_name()
            ),
            json!({
                "document_id": document.id,
                "owner": document.owner,
                "category": document.category,
            }),
            context,
            now,
        ));
        changeset.documents.push(document.clone());
        self.repository.commit(changeset)?;

        info!(
            policy = %policy.id,
            document = %document.id,
            category = ?document.category,
            "document uploaded"
        );
        Ok(document)
    }

    /// Record a staff verdict on one document. The decision is checked before
    /// anything is read from or written to storage.
    pub fn validate_document(
        &self,
        document_id: &DocumentId,
        decision: ValidationDecision,
        context: &RequestContext,
    ) -> Result<ActorDocument, PolicyServiceError> {
        let checked = document_validation::check(decision)?;

        let mut document = self
            .repository
            .fetch_document(document_id)?
            .ok_or_else(|| PolicyServiceError::DocumentNotFound(document_id.clone()))?;

        let now = Utc::now();
        let previous = document_validation::apply(
            &mut document,
            checked,
            &context.performer.id,
            now,
        );

        let mut changeset = PolicyChangeset::new(document.policy_id.clone());
        changeset.activities.push(PolicyActivity::record(
            &document.policy_id,
            "document_validated",
            format!(
                "{} marked {}",
                capitalize(document.category.label()),
                document.status.as_str()
            ),
            json!({
                "document_id": document.id,
                "owner": document.owner,
                "category": document.category,
                "previous_status": previous,
                "status": document.status,
                "rejection_reason": document.rejection_reason,
            }),
            context,
            now,
        ));
        changeset.documents.push(document.clone());
        self.repository.commit(changeset)?;

        info!(
            document = %document.id,
            from = previous.as_str(),
            to = document.status.as_str(),
            "document validated"
        );
        Ok(document)
    }

    pub fn document_checklist(
        &self,
        policy_id: &PolicyId,
    ) -> Result<PolicyDocumentSummary, PolicyServiceError> {
        self.load_policy(policy_id)?;
        let actors = self.repository.actors_for_policy(policy_id)?;
        let documents = self.repository.documents_for_policy(policy_id)?;
        Ok(documents::summarize(&actors, &documents))
    }

    pub fn activities(
        &self,
        policy_id: &PolicyId,
    ) -> Result<Vec<PolicyActivity>, PolicyServiceError> {
        self.load_policy(policy_id)?;
        Ok(self.repository.activities(policy_id)?)
    }

    fn coordinate(
        &self,
        event: &PolicyEvent,
        policy: &mut Policy,
        actors: &[Actor],
        changeset: &mut PolicyChangeset,
        now: DateTime<Utc>,
    ) -> Result<CoordinatorDecision, PolicyServiceError> {
        let expected_status = policy.status;
        let decision = self.coordinator.handle(event, policy, actors, now)?;
        if let CoordinatorDecision::Advanced { outcome } = &decision {
            changeset.status_activities.extend(outcome.activity.clone());
            changeset.update_status(policy.clone(), expected_status);
        }
        Ok(decision)
    }

    fn issue_token(&self, actor: &mut Actor, now: DateTime<Utc>) -> Invitation {
        let access = AccessToken::issue(now, self.lifecycle.token_ttl());
        let invitation = Invitation {
            actor_id: actor.id.clone(),
            role: actor.role,
            recipient: actor.contact.email.clone(),
            token: access.token.clone(),
            expires_at: access.expires_at,
        };
        actor.access = Some(access);
        actor.updated_at = now;
        invitation
    }

    fn actor_for_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Actor, PolicyServiceError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(PolicyServiceError::InvalidToken);
        }
        let actor = self
            .repository
            .actor_by_token(token)?
            .filter(Actor::is_active)
            .ok_or(PolicyServiceError::InvalidToken)?;
        match &actor.access {
            Some(access) if access.is_valid_at(now) => Ok(actor),
            Some(_) => Err(PolicyServiceError::TokenExpired),
            None => Err(PolicyServiceError::InvalidToken),
        }
    }

    fn announce_status_change(&self, policy: &Policy, from: PolicyStatus, receipt: CommitReceipt) {
        if from == policy.status || !receipt.policy_written || receipt.status_already_applied {
            return;
        }

        let mut details = BTreeMap::new();
        details.insert("policy_number".to_string(), policy.policy_number.clone());
        details.insert("from".to_string(), from.as_str().to_string());
        details.insert("to".to_string(), policy.status.as_str().to_string());
        self.publish(PolicyNotification {
            template: "policy_status_changed".to_string(),
            policy_id: policy.id.clone(),
            recipient: None,
            details,
        });
    }

    fn notify_invitation(&self, policy: &Policy, invitation: &Invitation) {
        let mut details = BTreeMap::new();
        details.insert("policy_number".to_string(), policy.policy_number.clone());
        details.insert("role".to_string(), invitation.role.label().to_string());
        details.insert("token".to_string(), invitation.token.clone());
        details.insert("expires_at".to_string(), invitation.expires_at.to_rfc3339());
        self.publish(PolicyNotification {
            template: "actor_invitation".to_string(),
            policy_id: policy.id.clone(),
            recipient: invitation.recipient.clone(),
            details,
        });
    }

    /// Notifications never fail a request once its changes are committed.
    fn publish(&self, notification: PolicyNotification) {
        let template = notification.template.clone();
        let policy_id = notification.policy_id.clone();
        if let Err(error) = self.notifications.publish(notification) {
            warn!(policy = %policy_id, %template, %error, "notification not delivered");
        }
    }

    fn load_policy(&self, id: &PolicyId) -> Result<Policy, PolicyServiceError> {
        self.repository
            .fetch_policy(id)?
            .ok_or_else(|| PolicyServiceError::PolicyNotFound(id.clone()))
    }

    fn load_actor(&self, id: &ActorId) -> Result<Actor, PolicyServiceError> {
        self.repository
            .fetch_actor(id)?
            .ok_or_else(|| PolicyServiceError::ActorNotFound(id.clone()))
    }

    fn load_package(&self, id: &PackageId) -> Result<Package, PolicyServiceError> {
        self.repository
            .fetch_package(id)?
            .ok_or_else(|| PolicyServiceError::PackageNotFound(id.clone()))
    }
}

fn ensure_open(policy: &Policy) -> Result<(), PolicyServiceError> {
    if policy.status.is_terminal() {
        return Err(PolicyServiceError::PolicyClosed {
            status: policy.status,
        });
    }
    Ok(())
}

fn ensure_portal_open(policy: &Policy) -> Result<(), PolicyServiceError> {
    if PORTAL_OPEN.contains(&policy.status) {
        Ok(())
    } else {
        Err(PolicyServiceError::PortalClosed {
            status: policy.status,
        })
    }
}

fn ensure_actor_set_editable(
    policy: &Policy,
    action: &'static str,
) -> Result<(), PolicyServiceError> {
    if ACTOR_SET_EDITABLE.contains(&policy.status) {
        Ok(())
    } else {
        Err(PolicyServiceError::PolicyLocked {
            action,
            status: policy.status,
        })
    }
}

fn settle_version(policy: &mut Policy, receipt: CommitReceipt) {
    if let Some(version) = receipt.policy_version {
        policy.version = version;
    }
}

/// Drop the activity from an advance another request already applied.
fn settle_decision(
    decision: CoordinatorDecision,
    receipt: CommitReceipt,
) -> CoordinatorDecision {
    match decision {
        CoordinatorDecision::Advanced { mut outcome } if receipt.status_already_applied => {
            outcome.activity = None;
            CoordinatorDecision::Advanced { outcome }
        }
        other => other,
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Error raised by the policy service.
#[derive(Debug, thiserror::Error)]
pub enum PolicyServiceError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Profile(#[from] ProfileIncomplete),
    #[error(transparent)]
    DocumentValidation(#[from] DocumentValidationError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("policy {0} was not found")]
    PolicyNotFound(PolicyId),
    #[error("actor {0} was not found")]
    ActorNotFound(ActorId),
    #[error("document {0} was not found")]
    DocumentNotFound(DocumentId),
    #[error("package {0} was not found")]
    PackageNotFound(PackageId),
    #[error("the access link is not valid")]
    InvalidToken,
    #[error("the access link has expired; ask the broker for a new invitation")]
    TokenExpired,
    #[error("the policy is {status} and no longer accepts changes from actors")]
    PortalClosed { status: PolicyStatus },
    #[error("a {role} is not required for guarantor type {guarantor_type}")]
    GuarantorNotRequired {
        role: ActorRole,
        guarantor_type: GuarantorType,
    },
    #[error("cannot {action} while the policy is {status}")]
    PolicyLocked {
        action: &'static str,
        status: PolicyStatus,
    },
    #[error("the policy is {status} and can no longer change")]
    PolicyClosed { status: PolicyStatus },
    #[error("{0}")]
    InvalidRequest(String),
}
