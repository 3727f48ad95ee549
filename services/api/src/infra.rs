use metrics_exporter_prometheus::PrometheusHandle;
use rentguard::workflows::policies::{
    Actor, ActorDocument, ActorId, CommitReceipt, DocumentId, NotificationError,
    NotificationPublisher, Package, PackageId, PackagePricing, Policy, PolicyActivity,
    PolicyChangeset, PolicyId, PolicyNotification, PolicyRepository, RepositoryError,
    WriteResolution,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default)]
struct Store {
    policies: HashMap<PolicyId, Policy>,
    actors: Vec<Actor>,
    documents: Vec<ActorDocument>,
    activities: Vec<PolicyActivity>,
    packages: Vec<Package>,
    policy_sequence: u64,
}

/// Process-local policy store. One lock covers every table so a changeset
/// lands atomically.
#[derive(Default, Clone)]
pub(crate) struct InMemoryPolicyRepository {
    store: Arc<Mutex<Store>>,
}

impl InMemoryPolicyRepository {
    pub(crate) fn with_packages(packages: Vec<Package>) -> Self {
        let repository = Self::default();
        if let Ok(mut store) = repository.store.lock() {
            store.packages = packages;
        }
        repository
    }

    fn lock(&self) -> Result<MutexGuard<'_, Store>, RepositoryError> {
        self.store
            .lock()
            .map_err(|_| RepositoryError::Unavailable("policy store lock poisoned".to_string()))
    }
}

fn upsert<T, K: PartialEq>(rows: &mut Vec<T>, row: T, key: impl Fn(&T) -> K) {
    match rows.iter().position(|existing| key(existing) == key(&row)) {
        Some(index) => rows[index] = row,
        None => rows.push(row),
    }
}

impl PolicyRepository for InMemoryPolicyRepository {
    fn fetch_policy(&self, id: &PolicyId) -> Result<Option<Policy>, RepositoryError> {
        Ok(self.lock()?.policies.get(id).cloned())
    }

    fn list_policies(&self) -> Result<Vec<Policy>, RepositoryError> {
        let mut policies: Vec<Policy> = self.lock()?.policies.values().cloned().collect();
        policies.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(policies)
    }

    fn actors_for_policy(&self, id: &PolicyId) -> Result<Vec<Actor>, RepositoryError> {
        Ok(self
            .lock()?
            .actors
            .iter()
            .filter(|actor| &actor.policy_id == id)
            .cloned()
            .collect())
    }

    fn fetch_actor(&self, id: &ActorId) -> Result<Option<Actor>, RepositoryError> {
        Ok(self.lock()?.actors.iter().find(|actor| &actor.id == id).cloned())
    }

    fn actor_by_token(&self, token: &str) -> Result<Option<Actor>, RepositoryError> {
        Ok(self
            .lock()?
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
        Ok(self
            .lock()?
            .documents
            .iter()
            .find(|document| &document.id == id)
            .cloned())
    }

    fn documents_for_policy(
        &self,
        id: &PolicyId,
    ) -> Result<Vec<ActorDocument>, RepositoryError> {
        Ok(self
            .lock()?
            .documents
            .iter()
            .filter(|document| &document.policy_id == id)
            .cloned()
            .collect())
    }

    fn activities(&self, id: &PolicyId) -> Result<Vec<PolicyActivity>, RepositoryError> {
        Ok(self
            .lock()?
            .activities
            .iter()
            .filter(|activity| &activity.policy_id == id)
            .cloned()
            .collect())
    }

    fn fetch_package(&self, id: &PackageId) -> Result<Option<Package>, RepositoryError> {
        Ok(self
            .lock()?
            .packages
            .iter()
            .find(|package| &package.id == id)
            .cloned())
    }

    fn packages(&self) -> Result<Vec<Package>, RepositoryError> {
        Ok(self.lock()?.packages.clone())
    }

    fn next_policy_sequence(&self) -> Result<u64, RepositoryError> {
        let mut store = self.lock()?;
        store.policy_sequence += 1;
        Ok(store.policy_sequence)
    }

    fn commit(&self, changeset: PolicyChangeset) -> Result<CommitReceipt, RepositoryError> {
        let mut store = self.lock()?;
        let mut receipt = CommitReceipt::default();

        let mut policy_row = None;
        if let Some(write) = changeset.policy {
            let inserting = write.expected_status.is_none();
            // policy_number is a unique key.
            if inserting
                && store
                    .policies
                    .values()
                    .any(|policy| policy.policy_number == write.policy.policy_number)
            {
                return Err(RepositoryError::Conflict);
            }
            match write.resolve(store.policies.get(&changeset.policy_id))? {
                WriteResolution::Apply => policy_row = Some(write.into_row()),
                // A concurrent request already moved the policy where this one wanted it.
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
        if let Some(policy) = policy_row {
            receipt.policy_written = true;
            receipt.policy_version = Some(policy.version);
            store.policies.insert(policy.id.clone(), policy);
            store.activities.extend(changeset.status_activities);
        }
        Ok(receipt)
    }
}

/// Records notifications and logs them; stands in for the mail relay.
#[derive(Default, Clone)]
pub(crate) struct InMemoryNotificationPublisher {
    events: Arc<Mutex<Vec<PolicyNotification>>>,
}

impl NotificationPublisher for InMemoryNotificationPublisher {
    fn publish(&self, notification: PolicyNotification) -> Result<(), NotificationError> {
        info!(
            template = %notification.template,
            policy = %notification.policy_id,
            recipient = notification.recipient.as_deref().unwrap_or("-"),
            "notification queued"
        );
        let mut guard = self
            .events
            .lock()
            .map_err(|_| NotificationError::Transport("outbox lock poisoned".to_string()))?;
        guard.push(notification);
        Ok(())
    }
}

impl InMemoryNotificationPublisher {
    pub(crate) fn events(&self) -> Vec<PolicyNotification> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

pub(crate) fn default_packages() -> Vec<Package> {
    vec![
        Package {
            id: PackageId("essential".to_string()),
            name: "Essential".to_string(),
            pricing: PackagePricing::Flat {
                amount: Decimal::new(4_500, 0),
            },
        },
        Package {
            id: PackageId("complete".to_string()),
            name: "Complete".to_string(),
            pricing: PackagePricing::PercentageOfRent {
                percent: Decimal::new(35, 0),
                minimum: Decimal::new(6_000, 0),
            },
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rentguard::workflows::policies::{GuarantorType, PolicyStatus};

    fn policy(status: PolicyStatus) -> Policy {
        Policy {
            id: PolicyId("pol-1".to_string()),
            policy_number: "POL-20250101-000001".to_string(),
            broker_id: "broker-1".to_string(),
            rent_amount: Decimal::new(15_000, 0),
            guarantor_type: GuarantorType::None,
            status,
            package_id: None,
            package_price: None,
            contract: None,
            submitted_at: None,
            approved_at: None,
            activated_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            version: 1,
        }
    }

    #[test]
    fn commit_reports_already_applied_status() {
        let repository = InMemoryPolicyRepository::default();
        let mut insert = PolicyChangeset::new(PolicyId("pol-1".to_string()));
        insert.insert_policy(policy(PolicyStatus::UnderInvestigation));
        repository.commit(insert).expect("insert succeeds");

        let mut update = PolicyChangeset::new(PolicyId("pol-1".to_string()));
        update.update_status(
            policy(PolicyStatus::UnderInvestigation),
            PolicyStatus::CollectingInfo,
        );
        let receipt = repository.commit(update).expect("commit succeeds");

        assert!(receipt.status_already_applied);
        assert!(!receipt.policy_written);
    }

    #[test]
    fn commit_bumps_the_row_version_and_rejects_stale_writes() {
        let repository = InMemoryPolicyRepository::default();
        let mut insert = PolicyChangeset::new(PolicyId("pol-1".to_string()));
        insert.insert_policy(policy(PolicyStatus::Draft));
        repository.commit(insert).expect("insert succeeds");

        let mut first = policy(PolicyStatus::Draft);
        first.package_id = Some(PackageId("essential".to_string()));
        let mut update = PolicyChangeset::new(PolicyId("pol-1".to_string()));
        update.update_policy(first, PolicyStatus::Draft);
        let receipt = repository.commit(update).expect("first write lands");
        assert_eq!(receipt.policy_version, Some(2));

        let mut second = policy(PolicyStatus::Draft);
        second.guarantor_type = GuarantorType::Aval;
        let mut stale = PolicyChangeset::new(PolicyId("pol-1".to_string()));
        stale.update_policy(second, PolicyStatus::Draft);
        assert!(matches!(
            repository.commit(stale),
            Err(RepositoryError::Conflict)
        ));

        let stored = repository
            .fetch_policy(&PolicyId("pol-1".to_string()))
            .expect("fetch succeeds")
            .expect("policy present");
        assert_eq!(stored.package_id, Some(PackageId("essential".to_string())));
        assert_eq!(stored.guarantor_type, GuarantorType::None);
    }

    #[test]
    fn policy_numbers_are_allocated_once_and_kept_unique() {
        let repository = InMemoryPolicyRepository::default();
        let first = repository.next_policy_sequence().expect("sequence");
        let second = repository.next_policy_sequence().expect("sequence");
        assert_eq!((first, second), (1, 2));

        let mut insert = PolicyChangeset::new(PolicyId("pol-1".to_string()));
        insert.insert_policy(policy(PolicyStatus::Draft));
        repository.commit(insert).expect("insert succeeds");

        let mut duplicate = policy(PolicyStatus::Draft);
        duplicate.id = PolicyId("pol-2".to_string());
        let mut insert = PolicyChangeset::new(PolicyId("pol-2".to_string()));
        insert.insert_policy(duplicate);
        assert!(matches!(
            repository.commit(insert),
            Err(RepositoryError::Conflict)
        ));
        assert_eq!(repository.list_policies().expect("list").len(), 1);
    }

    #[test]
    fn commit_rejects_diverging_status() {
        let repository = InMemoryPolicyRepository::default();
        let mut insert = PolicyChangeset::new(PolicyId("pol-1".to_string()));
        insert.insert_policy(policy(PolicyStatus::PendingApproval));
        repository.commit(insert).expect("insert succeeds");

        let mut update = PolicyChangeset::new(PolicyId("pol-1".to_string()));
        update.update_policy(policy(PolicyStatus::Cancelled), PolicyStatus::Approved);

        assert!(matches!(
            repository.commit(update),
            Err(RepositoryError::Conflict)
        ));
    }

    #[test]
    fn seeded_packages_are_listed() {
        let repository = InMemoryPolicyRepository::with_packages(default_packages());

        let packages = repository.packages().expect("packages load");

        assert_eq!(packages.len(), 2);
        assert!(repository
            .fetch_package(&PackageId("complete".to_string()))
            .expect("lookup succeeds")
            .is_some());
    }
}
