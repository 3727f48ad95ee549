use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::response::Response;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::config::LifecycleConfig;
use crate::workflows::policies::actors::ActorSubmission;
use crate::workflows::policies::domain::{
    Actor, ActorDocument, ActorId, ActorIdentity, ActorReference, ActorRole, ContactInfo,
    DocumentId, Employment, Guarantee, GuaranteeMethod, GuarantorType, MaritalStatus, PackageId,
    Performer, PersonName, Policy, PolicyActivity, PolicyId, PolicyStatus, ReferenceKind,
    RequestContext,
};
use crate::workflows::policies::pricing::{Package, PackagePricing};
use crate::workflows::policies::repository::{
    CommitReceipt, NotificationError, NotificationPublisher, PolicyChangeset, PolicyNotification,
    PolicyRepository, RepositoryError, WriteResolution,
};
use crate::workflows::policies::service::{NewPolicy, PolicyService, PolicySnapshot};

#[derive(Default)]
pub(super) struct Store {
    pub(super) policies: HashMap<PolicyId, Policy>,
    pub(super) actors: Vec<Actor>,
    pub(super) documents: Vec<ActorDocument>,
    pub(super) activities: Vec<PolicyActivity>,
    pub(super) packages: Vec<Package>,
    pub(super) policy_sequence: u64,
}

#[derive(Default, Clone)]
pub(super) struct MemoryRepository {
    pub(super) store: Arc<Mutex<Store>>,
}

impl MemoryRepository {
    pub(super) fn with_packages() -> Self {
        let repository = Self::default();
        repository
            .store
            .lock()
            .expect("repository mutex poisoned")
            .packages = packages();
        repository
    }

    pub(super) fn activity_actions(&self, policy_id: &PolicyId) -> Vec<String> {
        self.store
            .lock()
            .expect("repository mutex poisoned")
            .activities
            .iter()
            .filter(|activity| &activity.policy_id == policy_id)
            .map(|activity| activity.action.clone())
            .collect()
    }

    /// Move the stored policy behind the service's back.
    pub(super) fn force_status(&self, policy_id: &PolicyId, status: PolicyStatus) {
        let mut store = self.store.lock().expect("repository mutex poisoned");
        if let Some(policy) = store.policies.get_mut(policy_id) {
            policy.status = status;
            policy.version += 1;
        }
    }
}

fn upsert<T, K: PartialEq>(items: &mut Vec<T>, item: T, key: impl Fn(&T) -> K) {
    match items.iter().position(|existing| key(existing) == key(&item)) {
        Some(index) => items[index] = item,
        None => items.push(item),
    }
}

impl PolicyRepository for MemoryRepository {
    fn fetch_policy(&self, id: &PolicyId) -> Result<Option<Policy>, RepositoryError> {
        let store = self.store.lock().expect("repository mutex poisoned");
        Ok(store.policies.get(id).cloned())
    }

    fn list_policies(&self) -> Result<Vec<Policy>, RepositoryError> {
        let store = self.store.lock().expect("repository mutex poisoned");
        let mut policies: Vec<Policy> = store.policies.values().cloned().collect();
        policies.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(policies)
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
            .find(|actor| {
                actor
                    .access
                    .as_ref()
                    .is_some_and(|access| access.token == token)
            })
            .cloned())
    }

    fn fetch_document(&self, id: &DocumentId) -> Result<Option<ActorDocument>, RepositoryError> {
        let store = self.store.lock().expect("repository mutex poisoned");
        Ok(store
            .documents
            .iter()
            .find(|document| &document.id == id)
            .cloned())
    }

    fn documents_for_policy(
        &self,
        id: &PolicyId,
    ) -> Result<Vec<ActorDocument>, RepositoryError> {
        let store = self.store.lock().expect("repository mutex poisoned");
        Ok(store
            .documents
            .iter()
            .filter(|document| &document.policy_id == id)
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

    fn fetch_package(&self, id: &PackageId) -> Result<Option<Package>, RepositoryError> {
        let store = self.store.lock().expect("repository mutex poisoned");
        Ok(store.packages.iter().find(|package| &package.id == id).cloned())
    }

    fn packages(&self) -> Result<Vec<Package>, RepositoryError> {
        let store = self.store.lock().expect("repository mutex poisoned");
        Ok(store.packages.clone())
    }

    fn next_policy_sequence(&self) -> Result<u64, RepositoryError> {
        let mut store = self.store.lock().expect("repository mutex poisoned");
        store.policy_sequence += 1;
        Ok(store.policy_sequence)
    }

    fn commit(&self, changeset: PolicyChangeset) -> Result<CommitReceipt, RepositoryError> {
        let mut store = self.store.lock().expect("repository mutex poisoned");
        let mut receipt = CommitReceipt::default();

        let mut policy_write = None;
        if let Some(write) = changeset.policy {
            match write.resolve(store.policies.get(&changeset.policy_id))? {
                WriteResolution::Apply => policy_write = Some(write.into_row()),
                WriteResolution::AlreadyApplied => receipt.status_already_applied = true,
            }
        }

        for actor in changeset.actors {
            upsert(&mut store.actors, actor, |actor| actor.id.clone());
        }
        for document in changeset.documents {
            upsert(&mut store.documents, document, |document| document.id.clone());
        }
        store.activities.extend(changeset.activities);
        if let Some(policy) = policy_write {
            receipt.policy_written = true;
            receipt.policy_version = Some(policy.version);
            store.policies.insert(policy.id.clone(), policy);
            store.activities.extend(changeset.status_activities);
        }
        Ok(receipt)
    }
}

/// Serves a stale policy snapshot to simulate a request that loaded the
/// policy just before a concurrent request advanced it.
pub(super) struct StaleReadRepository {
    pub(super) inner: MemoryRepository,
    pub(super) stale: Mutex<Option<Policy>>,
}

impl PolicyRepository for StaleReadRepository {
    fn fetch_policy(&self, id: &PolicyId) -> Result<Option<Policy>, RepositoryError> {
        match self.stale.lock().expect("stale mutex poisoned").take() {
            Some(policy) => Ok(Some(policy)),
            None => self.inner.fetch_policy(id),
        }
    }

    fn list_policies(&self) -> Result<Vec<Policy>, RepositoryError> {
        self.inner.list_policies()
    }

    fn actors_for_policy(&self, id: &PolicyId) -> Result<Vec<Actor>, RepositoryError> {
        self.inner.actors_for_policy(id)
    }

    fn fetch_actor(&self, id: &ActorId) -> Result<Option<Actor>, RepositoryError> {
        self.inner.fetch_actor(id)
    }

    fn actor_by_token(&self, token: &str) -> Result<Option<Actor>, RepositoryError> {
        self.inner.actor_by_token(token)
    }

    fn fetch_document(&self, id: &DocumentId) -> Result<Option<ActorDocument>, RepositoryError> {
        self.inner.fetch_document(id)
    }

    fn documents_for_policy(
        &self,
        id: &PolicyId,
    ) -> Result<Vec<ActorDocument>, RepositoryError> {
        self.inner.documents_for_policy(id)
    }

    fn activities(&self, id: &PolicyId) -> Result<Vec<PolicyActivity>, RepositoryError> {
        self.inner.activities(id)
    }

    fn fetch_package(&self, id: &PackageId) -> Result<Option<Package>, RepositoryError> {
        self.inner.fetch_package(id)
    }

    fn packages(&self) -> Result<Vec<Package>, RepositoryError> {
        self.inner.packages()
    }

    fn next_policy_sequence(&self) -> Result<u64, RepositoryError> {
        self.inner.next_policy_sequence()
    }

    fn commit(&self, changeset: PolicyChangeset) -> Result<CommitReceipt, RepositoryError> {
        self.inner.commit(changeset)
    }
}

/// Fails every read and write, for error mapping tests.
pub(super) struct UnavailableRepository;

impl PolicyRepository for UnavailableRepository {
    fn fetch_policy(&self, _id: &PolicyId) -> Result<Option<Policy>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list_policies(&self) -> Result<Vec<Policy>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn actors_for_policy(&self, _id: &PolicyId) -> Result<Vec<Actor>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch_actor(&self, _id: &ActorId) -> Result<Option<Actor>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn actor_by_token(&self, _token: &str) -> Result<Option<Actor>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch_document(&self, _id: &DocumentId) -> Result<Option<ActorDocument>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn documents_for_policy(
        &self,
        _id: &PolicyId,
    ) -> Result<Vec<ActorDocument>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn activities(&self, _id: &PolicyId) -> Result<Vec<PolicyActivity>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch_package(&self, _id: &PackageId) -> Result<Option<Package>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn packages(&self) -> Result<Vec<Package>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn next_policy_sequence(&self) -> Result<u64, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn commit(&self, _changeset: PolicyChangeset) -> Result<CommitReceipt, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryNotifications {
    events: Arc<Mutex<Vec<PolicyNotification>>>,
}

impl MemoryNotifications {
    pub(super) fn events(&self) -> Vec<PolicyNotification> {
        self.events.lock().expect("notification mutex poisoned").clone()
    }

    pub(super) fn templates(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .map(|notification| notification.template)
            .collect()
    }
}

impl NotificationPublisher for MemoryNotifications {
    fn publish(&self, notification: PolicyNotification) -> Result<(), NotificationError> {
        self.events
            .lock()
            .expect("notification mutex poisoned")
            .push(notification);
        Ok(())
    }
}

pub(super) struct OfflineNotifications;

impl NotificationPublisher for OfflineNotifications {
    fn publish(&self, _notification: PolicyNotification) -> Result<(), NotificationError> {
        Err(NotificationError::Transport("smtp relay down".to_string()))
    }
}

pub(super) fn packages() -> Vec<Package> {
    vec![
        Package {
            id: PackageId("pkg-basic".to_string()),
            name: "Basic".to_string(),
            pricing: PackagePricing::Flat {
                amount: Decimal::new(3_500, 0),
            },
        },
        Package {
            id: PackageId("pkg-premium".to_string()),
            name: "Premium".to_string(),
            pricing: PackagePricing::PercentageOfRent {
                percent: Decimal::new(40, 0),
                minimum: Decimal::new(5_000, 0),
            },
        },
    ]
}

pub(super) fn staff() -> RequestContext {
    RequestContext::new(Performer::admin("staff-1")).with_ip(Some("10.0.0.8".to_string()))
}

pub(super) fn new_policy(guarantor_type: GuarantorType) -> NewPolicy {
    NewPolicy {
        broker_id: "broker-17".to_string(),
        rent_amount: Decimal::new(18_000, 0),
        guarantor_type,
        package_id: None,
    }
}

pub(super) fn build_service() -> (
    PolicyService<MemoryRepository, MemoryNotifications>,
    Arc<MemoryRepository>,
    Arc<MemoryNotifications>,
) {
    let repository = Arc::new(MemoryRepository::with_packages());
    let notifications = Arc::new(MemoryNotifications::default());
    let service = PolicyService::new(
        repository.clone(),
        notifications.clone(),
        LifecycleConfig::default(),
    );
    (service, repository, notifications)
}

pub(super) fn person(first: &str, last: &str) -> ActorIdentity {
    ActorIdentity::Individual(PersonName {
        first_name: first.to_string(),
        middle_name: None,
        paternal_last_name: last.to_string(),
        maternal_last_name: None,
    })
}

fn contact(handle: &str) -> ContactInfo {
    ContactInfo {
        email: Some(format!("{handle}@example.com")),
        phone: Some("+52 55 1234 5678".to_string()),
    }
}

/// A submission that satisfies the profile rules of `role`.
pub(super) fn complete_submission(role: ActorRole) -> ActorSubmission {
    let mut submission = ActorSubmission {
        identity: Some(person("Ana", role.label())),
        contact: Some(contact("ana")),
        information_complete: true,
        ..ActorSubmission::default()
    };
    match role {
        ActorRole::Landlord => {}
        ActorRole::Tenant => {
            submission.employment = Some(Employment {
                employer: "Grupo Delta".to_string(),
                position: "Engineer".to_string(),
                monthly_income: Decimal::new(60_000, 0),
            });
            submission.references = Some(vec![ActorReference {
                kind: ReferenceKind::Personal,
                name: "Luis Mora".to_string(),
                phone: "+52 55 9999 0000".to_string(),
                relationship: None,
            }]);
        }
        ActorRole::JointObligor => {
            submission.guarantee = Some(Guarantee {
                method: GuaranteeMethod::Income,
                property_address: None,
                property_value: None,
            });
            submission.employment = Some(Employment {
                employer: "Hospital Ángeles".to_string(),
                position: "Surgeon".to_string(),
                monthly_income: Decimal::new(95_000, 0),
            });
        }
        ActorRole::Aval => {
            submission.guarantee = Some(Guarantee {
                method: GuaranteeMethod::Property,
                property_address: Some("Calle Durango 45, Roma Norte".to_string()),
                property_value: Some(Decimal::new(4_200_000, 0)),
            });
            submission.marital_status = Some(MaritalStatus::Single);
        }
    }
    submission
}

pub(super) fn actor_of(snapshot: &PolicySnapshot, role: ActorRole) -> Actor {
    snapshot
        .actors
        .iter()
        .find(|actor| actor.role == role)
        .cloned()
        .expect("actor for role")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
