//! Integration specifications for the rental-guarantee policy lifecycle.
//!
//! Scenarios drive the public service facade and HTTP router from the outside: a broker opens a
//! policy, actors complete their information through portal links, and the coordinator decides
//! when the policy leaves information collection.

mod common {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use rust_decimal::Decimal;

    use rentguard::config::LifecycleConfig;
    use rentguard::workflows::policies::{
        Actor, ActorDocument, ActorId, ActorIdentity, ActorReference, ActorRole, ActorSubmission,
        CommitReceipt, ContactInfo, DocumentId, Employment, Guarantee, GuaranteeMethod,
        GuarantorType, MaritalStatus, NewPolicy, NotificationError, NotificationPublisher,
        Package, PackageId, Performer, PersonName, Policy, PolicyActivity, PolicyChangeset,
        PolicyId, PolicyNotification, PolicyRepository, PolicyService, ReferenceKind,
        RepositoryError, RequestContext, WriteResolution,
    };

    #[derive(Default)]
    struct Store {
        policies: HashMap<PolicyId, Policy>,
        actors: Vec<Actor>,
        documents: Vec<ActorDocument>,
        activities: Vec<PolicyActivity>,
        policy_sequence: u64,
    }

    #[derive(Default, Clone)]
    pub(super) struct MemoryRepository {
        store: Arc<Mutex<Store>>,
    }

    impl MemoryRepository {
        pub(super) fn actions(&self, policy_id: &PolicyId) -> Vec<String> {
            self.store
                .lock()
                .expect("repository mutex poisoned")
                .activities
                .iter()
                .filter(|activity| &activity.policy_id == policy_id)
                .map(|activity| activity.action.clone())
                .collect()
        }
    }

    impl PolicyRepository for MemoryRepository {
        fn fetch_policy(&self, id: &PolicyId) -> Result<Option<Policy>, RepositoryError> {
            let store = self.store.lock().expect("repository mutex poisoned");
            Ok(store.policies.get(id).cloned())
        }

        fn list_policies(&self) -> Result<Vec<Policy>, RepositoryError> {
            let store = self.store.lock().expect("repository mutex poisoned");
            Ok(store.policies.values().cloned().collect())
        }

        fn actors_for_policy(&self, id: &PolicyId) -> Result<Vec<Actor>, RepositoryError> {
            let store = self.store.lock().expect("repository mutex poisoned");
            Ok(store
                .actors
                .iter()
                .filter(|actor| &actor.policy_id == id)
                .cloned()
                .collect())
        }

        fn fetch_actor(&self, id: &ActorId) -> Result<Option<Actor>, RepositoryError> {
            let store = self.store.lock().expect("repository mutex poisoned");
            Ok(store.actors.iter().find(|actor| &actor.id == id).cloned())
        }

        fn actor_by_token(&self, token: &str) -> Result<Option<Actor>, RepositoryError> {
            let store = self.store.lock().expect("repository mutex poisoned");
            Ok(store
                .actors
                .iter()
                .find(|actor| actor.access.as_ref().is_some_and(|a| a.token == token))
                .cloned())
        }

        fn fetch_document(
            &self,
            id: &DocumentId,
        ) -> Result<Option<ActorDocument>, RepositoryError> {
            let store = self.store.lock().expect("repository mutex poisoned");
            Ok(store.documents.iter().find(|doc| &doc.id == id).cloned())
        }

        fn documents_for_policy(
            &self,
            id: &PolicyId,
        ) -> Result<Vec<ActorDocument>, RepositoryError> {
            let store = self.store.lock().expect("repository mutex poisoned");
            Ok(store
                .documents
                .iter()
                .filter(|doc| &doc.policy_id == id)
                .cloned()
                .collect())
        }

        fn activities(&self, id: &PolicyId) -> Result<Vec<PolicyActivity>, RepositoryError> {
            let store = self.store.lock().expect("repository mutex poisoned");
            Ok(store
                .activities
                .iter()
                .filter(|activity| &activity.policy_id == id)
                .cloned()
                .collect())
        }

        fn fetch_package(&self, _id: &PackageId) -> Result<Option<Package>, RepositoryError> {
            Ok(None)
        }

        fn packages(&self) -> Result<Vec<Package>, RepositoryError> {
            Ok(Vec::new())
        }

        fn next_policy_sequence(&self) -> Result<u64, RepositoryError> {
            let mut store = self.store.lock().expect("repository mutex poisoned");
            store.policy_sequence += 1;
            Ok(store.policy_sequence)
        }

        fn commit(&self, changeset: PolicyChangeset) -> Result<CommitReceipt, RepositoryError> {
            let mut store = self.store.lock().expect("repository mutex poisoned");
            let mut receipt = CommitReceipt::default();

            let mut write = None;
            if let Some(policy_write) = changeset.policy {
                match policy_write.resolve(store.policies.get(&changeset.policy_id))? {
                    WriteResolution::Apply => write = Some(policy_write.into_row()),
                    WriteResolution::AlreadyApplied => receipt.status_already_applied = true,
                }
            }

            for actor in changeset.actors {
                store.actors.retain(|existing| existing.id != actor.id);
                store.actors.push(actor);
            }
            for document in changeset.documents {
                store.documents.retain(|existing| existing.id != document.id);
                store.documents.push(document);
            }
            store.activities.extend(changeset.activities);
            if let Some(policy) = write {
                receipt.policy_written = true;
                receipt.policy_version = Some(policy.version);
                store.policies.insert(policy.id.clone(), policy);
                store.activities.extend(changeset.status_activities);
            }
            Ok(receipt)
        }
    }

    #[derive(Default)]
    pub(super) struct RecordingNotifications {
        events: Mutex<Vec<PolicyNotification>>,
    }

    impl RecordingNotifications {
        pub(super) fn count(&self, template: &str) -> usize {
            self.events
                .lock()
                .expect("notification mutex poisoned")
                .iter()
                .filter(|event| event.template == template)
                .count()
        }
    }

    impl NotificationPublisher for RecordingNotifications {
        fn publish(&self, notification: PolicyNotification) -> Result<(), NotificationError> {
            self.events
                .lock()
                .expect("notification mutex poisoned")
                .push(notification);
            Ok(())
        }
    }

    pub(super) type Service = PolicyService<MemoryRepository, RecordingNotifications>;

    pub(super) fn service() -> (Service, MemoryRepository, Arc<RecordingNotifications>) {
        let repository = MemoryRepository::default();
        let notifications = Arc::new(RecordingNotifications::default());
        let service = PolicyService::new(
            Arc::new(repository.clone()),
            notifications.clone(),
            LifecycleConfig::default(),
        );
        (service, repository, notifications)
    }

    pub(super) fn broker() -> RequestContext {
        RequestContext::new(Performer::admin("broker-desk"))
    }

    pub(super) fn new_policy(guarantor_type: GuarantorType) -> NewPolicy {
        NewPolicy {
            broker_id: "broker-03".to_string(),
            rent_amount: Decimal::new(24_500, 0),
            guarantor_type,
            package_id: None,
        }
    }

    pub(super) fn submission(role: ActorRole) -> ActorSubmission {
        let mut submission = ActorSubmission {
            identity: Some(ActorIdentity::Individual(PersonName {
                first_name: "Marta".to_string(),
                middle_name: None,
                paternal_last_name: "Salgado".to_string(),
                maternal_last_name: Some("Ruiz".to_string()),
            })),
            contact: Some(ContactInfo {
                email: Some("marta@example.com".to_string()),
                phone: Some("+52 33 4000 1200".to_string()),
            }),
            information_complete: true,
            ..ActorSubmission::default()
        };
        let employment = Employment {
            employer: "Cervecería del Valle".to_string(),
            position: "Controller".to_string(),
            monthly_income: Decimal::new(82_000, 0),
        };
        match role {
            ActorRole::Landlord => {}
            ActorRole::Tenant => {
                submission.employment = Some(employment);
                submission.references = Some(vec![ActorReference {
                    kind: ReferenceKind::Personal,
                    name: "Héctor Villa".to_string(),
                    phone: "+52 33 4000 9900".to_string(),
                    relationship: Some("former landlord".to_string()),
                }]);
            }
            ActorRole::JointObligor => {
                submission.guarantee = Some(Guarantee {
                    method: GuaranteeMethod::Income,
                    property_address: None,
                    property_value: None,
                });
                submission.employment = Some(employment);
            }
            ActorRole::Aval => {
                submission.guarantee = Some(Guarantee {
                    method: GuaranteeMethod::Property,
                    property_address: Some("Av. Chapultepec 210, Guadalajara".to_string()),
                    property_value: Some(Decimal::new(3_100_000, 0)),
                });
                submission.marital_status = Some(MaritalStatus::Married);
            }
        }
        submission
    }
}

use common::*;
use rentguard::workflows::policies::{
    ActorRole, CoordinatorDecision, GuarantorType, PolicyServiceError, PolicyStatus,
    TransitionError, TransitionRequest,
};

#[test]
fn joint_obligor_policy_moves_to_investigation_once_every_actor_completes() {
    let (service, repository, notifications) = service();
    let created = service
        .create_policy(new_policy(GuarantorType::JointObligor), &broker())
        .expect("policy created");
    let invitations = service
        .send_invitations(&created.policy.id, &broker())
        .expect("invitations sent");
    assert_eq!(invitations.len(), 3);

    let mut last_decision = None;
    for invitation in &invitations {
        let update = service
            .submit_via_token(&invitation.token, submission(invitation.role), None)
            .expect("submission accepted");
        last_decision = update.decision;
    }

    assert!(matches!(last_decision, Some(CoordinatorDecision::Advanced { .. })));
    let snapshot = service.get(&created.policy.id).expect("policy loads");
    assert_eq!(snapshot.policy.status, PolicyStatus::UnderInvestigation);
    assert!(snapshot.completion.is_complete());
    assert!(snapshot.policy.submitted_at.is_some());

    let actions = repository.actions(&created.policy.id);
    assert_eq!(
        actions
            .iter()
            .filter(|action| action.as_str() == "investigation_started")
            .count(),
        1
    );
    assert_eq!(notifications.count("actor_invitation"), 3);
    assert_eq!(notifications.count("policy_status_changed"), 2);
}

#[test]
fn both_guarantors_block_until_the_second_obligor_completes() {
    let (service, _, _) = service();
    let created = service
        .create_policy(new_policy(GuarantorType::Both), &broker())
        .expect("policy created");
    service
        .send_invitations(&created.policy.id, &broker())
        .expect("invitations sent");
    let extra = service
        .add_guarantor(&created.policy.id, ActorRole::JointObligor, &broker())
        .expect("second obligor added");

    let snapshot = service.get(&created.policy.id).expect("policy loads");
    for actor in snapshot.actors.iter().filter(|actor| actor.id != extra.id) {
        service
            .submit_actor_information(&actor.id, submission(actor.role), &broker())
            .expect("submission accepted");
    }

    let blocked = service
        .transition(
            &created.policy.id,
            TransitionRequest::to(PolicyStatus::UnderInvestigation),
            &broker(),
        )
        .expect_err("second obligor is still incomplete");
    match blocked {
        PolicyServiceError::Transition(TransitionError::ActorsIncomplete { report, .. }) => {
            assert_eq!(report.blocking_roles(), vec![ActorRole::JointObligor]);
        }
        other => panic!("unexpected error: {other}"),
    }

    let token = extra
        .access
        .as_ref()
        .map(|access| access.token.clone())
        .expect("collecting policies issue links immediately");
    let update = service
        .submit_via_token(&token, submission(ActorRole::JointObligor), None)
        .expect("second obligor completes");
    assert_eq!(update.policy.status, PolicyStatus::UnderInvestigation);
}

#[test]
fn repeating_a_transition_is_a_no_op() {
    let (service, repository, _) = service();
    let created = service
        .create_policy(new_policy(GuarantorType::None), &broker())
        .expect("policy created");
    let request = TransitionRequest::to(PolicyStatus::Cancelled).with_reason("broker withdrew");

    let first = service
        .transition(&created.policy.id, request.clone(), &broker())
        .expect("cancelled");
    let second = service
        .transition(&created.policy.id, request, &broker())
        .expect("same status is accepted");

    assert!(first.outcome.activity.is_some());
    assert!(second.outcome.activity.is_none());
    assert_eq!(second.policy.status, PolicyStatus::Cancelled);
    let cancellations = repository
        .actions(&created.policy.id)
        .into_iter()
        .filter(|action| action == "policy_cancelled")
        .count();
    assert_eq!(cancellations, 1);
}
