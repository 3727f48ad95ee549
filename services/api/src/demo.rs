use crate::infra::{default_packages, InMemoryNotificationPublisher, InMemoryPolicyRepository};
use clap::Args;
use rentguard::config::LifecycleConfig;
use rentguard::error::AppError;
use rentguard::workflows::policies::{
    ActorIdentity, ActorReference, ActorRole, ActorSubmission, ContactInfo, CoordinatorDecision,
    DocumentCategory, Employment, Guarantee, GuaranteeMethod, GuarantorType, MaritalStatus,
    NewDocument, NewPolicy, PackageId, Performer, PersonName, PolicyService, PolicyStatus,
    ReferenceKind, RequestContext, TransitionRequest, ValidationDecision,
};
use rust_decimal::Decimal;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Guarantor arrangement: NONE, JOINT_OBLIGOR, AVAL or BOTH.
    #[arg(long, default_value = "JOINT_OBLIGOR")]
    pub(crate) guarantor_type: GuarantorType,
    /// Monthly rent for the demo policy.
    #[arg(long, default_value = "18500")]
    pub(crate) rent: Decimal,
    /// Package to assign when the policy is opened.
    #[arg(long, default_value = "complete")]
    pub(crate) package: String,
    /// Keep the policy in COLLECTING_INFO once complete and advance it by hand.
    #[arg(long)]
    pub(crate) manual_review: bool,
    /// Print the final policy snapshot as JSON.
    #[arg(long)]
    pub(crate) json: bool,
}

type DemoService = PolicyService<InMemoryPolicyRepository, InMemoryNotificationPublisher>;

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        guarantor_type,
        rent,
        package,
        manual_review,
        json,
    } = args;

    let notifications = Arc::new(InMemoryNotificationPublisher::default());
    let service: DemoService = PolicyService::new(
        Arc::new(InMemoryPolicyRepository::with_packages(default_packages())),
        notifications.clone(),
        LifecycleConfig {
            auto_advance: !manual_review,
            ..LifecycleConfig::default()
        },
    );
    let staff = RequestContext::new(Performer::admin("demo-broker"));

    println!("Rental guarantee policy demo");
    let created = service.create_policy(
        NewPolicy {
            broker_id: "demo-broker".to_string(),
            rent_amount: rent,
            guarantor_type,
            package_id: Some(PackageId(package)),
        },
        &staff,
    )?;
    let policy_id = created.policy.id.clone();
    println!(
        "- Opened {} ({}) for rent {} | package price {}",
        created.policy.policy_number,
        guarantor_type,
        created.policy.rent_amount,
        created
            .policy
            .package_price
            .map(|price| price.to_string())
            .unwrap_or_else(|| "-".to_string())
    );

    let invitations = service.send_invitations(&policy_id, &staff)?;
    println!("\nInvitations");
    for invitation in &invitations {
        println!(
            "  - {} link expires {}",
            invitation.role,
            invitation.expires_at.format("%Y-%m-%d")
        );
    }

    println!("\nActor submissions");
    for invitation in &invitations {
        let update = service.submit_via_token(
            &invitation.token,
            demo_submission(invitation.role),
            Some("203.0.113.7".to_string()),
        )?;
        println!(
            "  - {} completed -> {}",
            invitation.role,
            describe(update.decision.as_ref())
        );
    }

    let snapshot = service.get(&policy_id)?;
    if snapshot.policy.status == PolicyStatus::CollectingInfo {
        println!("\nStaff review");
        let moved = service.transition(
            &policy_id,
            TransitionRequest::to(PolicyStatus::UnderInvestigation),
            &staff,
        )?;
        println!("  - moved to {}", moved.policy.status);
    }

    let tenant = snapshot
        .actors
        .iter()
        .find(|actor| actor.role == ActorRole::Tenant)
        .map(|actor| actor.id.clone());
    if let Some(tenant_id) = tenant {
        println!("\nDocuments");
        let document = service.upload_document(
            &tenant_id,
            NewDocument {
                category: DocumentCategory::Identification,
                file_name: "tenant-id.pdf".to_string(),
                storage_key: format!("demo/{policy_id}/tenant-id.pdf"),
            },
            &staff,
        )?;
        let document =
            service.validate_document(&document.id, ValidationDecision::approve(), &staff)?;
        println!(
            "  - tenant {} -> {}",
            document.category.label(),
            document.status.as_str()
        );
        let checklist = service.document_checklist(&policy_id)?;
        for actor in &checklist.actors {
            println!(
                "  - {} missing {} required categories",
                actor.role,
                actor.missing_required.len()
            );
        }
    }

    println!("\nLifecycle");
    for target in [PolicyStatus::PendingApproval, PolicyStatus::Approved] {
        advance(&service, &policy_id, target, &staff)?;
    }
    service.attach_contract(&policy_id, &format!("contracts/{policy_id}.pdf"), &staff)?;
    println!("  - contract attached");
    for target in [
        PolicyStatus::ContractPending,
        PolicyStatus::ContractSigned,
        PolicyStatus::Active,
    ] {
        advance(&service, &policy_id, target, &staff)?;
    }

    println!("\nActivity log");
    for activity in service.activities(&policy_id)? {
        println!(
            "  - {} [{}:{}] {}",
            activity.created_at.format("%H:%M:%S"),
            activity.performed_by_type.as_str(),
            activity.performed_by_id,
            activity.description
        );
    }

    let events = notifications.events();
    println!("\nNotifications: {} queued", events.len());
    for event in events {
        println!(
            "  - {} -> {}",
            event.template,
            event.recipient.as_deref().unwrap_or("staff")
        );
    }

    if json {
        let snapshot = service.get(&policy_id)?;
        match serde_json::to_string_pretty(&snapshot) {
            Ok(body) => println!("\n{body}"),
            Err(err) => println!("\nSnapshot unavailable: {err}"),
        }
    }

    Ok(())
}

fn advance(
    service: &DemoService,
    policy_id: &rentguard::workflows::policies::PolicyId,
    target: PolicyStatus,
    staff: &RequestContext,
) -> Result<(), AppError> {
    let moved = service.transition(policy_id, TransitionRequest::to(target), staff)?;
    println!("  - {} -> {}", moved.outcome.from, moved.outcome.to);
    Ok(())
}

fn describe(decision: Option<&CoordinatorDecision>) -> String {
    match decision {
        None => "saved".to_string(),
        Some(CoordinatorDecision::Advanced { outcome }) => {
            format!("policy advanced to {}", outcome.to)
        }
        Some(CoordinatorDecision::AwaitingActors { report }) => report.summary(),
        Some(CoordinatorDecision::ReadyForReview { .. }) => {
            "all actors complete, waiting for staff review".to_string()
        }
        Some(CoordinatorDecision::NotCollecting { status }) => {
            format!("policy is {status}, no change")
        }
    }
}

fn demo_submission(role: ActorRole) -> ActorSubmission {
    let (first, last) = match role {
        ActorRole::Landlord => ("Elena", "Cisneros"),
        ActorRole::Tenant => ("Jorge", "Alcántara"),
        ActorRole::JointObligor => ("Patricia", "Leyva"),
        ActorRole::Aval => ("Ramón", "Orozco"),
    };
    let handle = first.to_lowercase();
    let mut submission = ActorSubmission {
        identity: Some(ActorIdentity::Individual(PersonName {
            first_name: first.to_string(),
            middle_name: None,
            paternal_last_name: last.to_string(),
            maternal_last_name: None,
        })),
        contact: Some(ContactInfo {
            email: Some(format!("{handle}@example.com")),
            phone: Some("+52 55 5000 0000".to_string()),
        }),
        information_complete: true,
        ..ActorSubmission::default()
    };

    let employment = Employment {
        employer: "Distribuidora Norte".to_string(),
        position: "Operations lead".to_string(),
        monthly_income: Decimal::new(70_000, 0),
    };
    match role {
        ActorRole::Landlord => {}
        ActorRole::Tenant => {
            submission.employment = Some(employment);
            submission.references = Some(vec![ActorReference {
                kind: ReferenceKind::Personal,
                name: "Lucía Tapia".to_string(),
                phone: "+52 55 5000 1111".to_string(),
                relationship: Some("colleague".to_string()),
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
                property_address: Some("Río Lerma 88, Cuauhtémoc".to_string()),
                property_value: Some(Decimal::new(5_600_000, 0)),
            });
            submission.marital_status = Some(MaritalStatus::Single);
        }
    }
    submission
}
