use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Identifier wrapper for rental-guarantee policies.
    PolicyId
);
string_id!(
    /// Identifier shared by all four actor roles.
    ActorId
);
string_id!(DocumentId);
string_id!(ActivityId);
string_id!(PackageId);

/// Error returned when a persisted enum string does not match the schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Lifecycle status of a policy. The serialized strings are compared by
/// equality against the persisted schema, so they must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyStatus {
    Draft,
    CollectingInfo,
    UnderInvestigation,
    InvestigationRejected,
    PendingApproval,
    Approved,
    ContractPending,
    ContractSigned,
    Active,
    Expired,
    Cancelled,
}

impl PolicyStatus {
    pub const ALL: [Self; 11] = [
        Self::Draft,
        Self::CollectingInfo,
        Self::UnderInvestigation,
        Self::InvestigationRejected,
        Self::PendingApproval,
        Self::Approved,
        Self::ContractPending,
        Self::ContractSigned,
        Self::Active,
        Self::Expired,
        Self::Cancelled,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::CollectingInfo => "COLLECTING_INFO",
            Self::UnderInvestigation => "UNDER_INVESTIGATION",
            Self::InvestigationRejected => "INVESTIGATION_REJECTED",
            Self::PendingApproval => "PENDING_APPROVAL",
            Self::Approved => "APPROVED",
            Self::ContractPending => "CONTRACT_PENDING",
            Self::ContractSigned => "CONTRACT_SIGNED",
            Self::Active => "ACTIVE",
            Self::Expired => "EXPIRED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::CollectingInfo => "Collecting information",
            Self::UnderInvestigation => "Under investigation",
            Self::InvestigationRejected => "Investigation rejected",
            Self::PendingApproval => "Pending approval",
            Self::Approved => "Approved",
            Self::ContractPending => "Contract pending",
            Self::ContractSigned => "Contract signed",
            Self::Active => "Active",
            Self::Expired => "Expired",
            Self::Cancelled => "Cancelled",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Expired | Self::Cancelled)
    }
}

impl fmt::Display for PolicyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyStatus {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| UnknownVariant {
                kind: "policy status",
                value: value.to_string(),
            })
    }
}

/// Which guarantors back the policy besides landlord and tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GuarantorType {
    None,
    JointObligor,
    Aval,
    Both,
}

impl GuarantorType {
    pub const ALL: [Self; 4] = [Self::None, Self::JointObligor, Self::Aval, Self::Both];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::JointObligor => "JOINT_OBLIGOR",
            Self::Aval => "AVAL",
            Self::Both => "BOTH",
        }
    }
}

impl fmt::Display for GuarantorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GuarantorType {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| UnknownVariant {
                kind: "guarantor type",
                value: value.to_string(),
            })
    }
}

/// Party to a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActorRole {
    Landlord,
    Tenant,
    JointObligor,
    Aval,
}

impl ActorRole {
    pub const ALL: [Self; 4] = [Self::Landlord, Self::Tenant, Self::JointObligor, Self::Aval];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Landlord => "landlord",
            Self::Tenant => "tenant",
            Self::JointObligor => "joint obligor",
            Self::Aval => "aval",
        }
    }

    /// Guarantor roles can be archived or multiplied; landlord and tenant cannot.
    pub const fn is_guarantor(self) -> bool {
        matches!(self, Self::JointObligor | Self::Aval)
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Owner of an uploaded document. Exactly one actor owns each document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "camelCase")]
pub enum DocumentOwner {
    Landlord(ActorId),
    Tenant(ActorId),
    JointObligor(ActorId),
    Aval(ActorId),
}

impl DocumentOwner {
    pub fn new(role: ActorRole, actor_id: ActorId) -> Self {
        match role {
            ActorRole::Landlord => Self::Landlord(actor_id),
            ActorRole::Tenant => Self::Tenant(actor_id),
            ActorRole::JointObligor => Self::JointObligor(actor_id),
            ActorRole::Aval => Self::Aval(actor_id),
        }
    }

    pub fn role(&self) -> ActorRole {
        match self {
            Self::Landlord(_) => ActorRole::Landlord,
            Self::Tenant(_) => ActorRole::Tenant,
            Self::JointObligor(_) => ActorRole::JointObligor,
            Self::Aval(_) => ActorRole::Aval,
        }
    }

    pub fn actor_id(&self) -> &ActorId {
        match self {
            Self::Landlord(id) | Self::Tenant(id) | Self::JointObligor(id) | Self::Aval(id) => id,
        }
    }
}

/// Who performed an action recorded in the activity log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformedByType {
    Actor,
    Admin,
    System,
}

impl PerformedByType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Actor => "actor",
            Self::Admin => "admin",
            Self::System => "system",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Performer {
    pub kind: PerformedByType,
    pub id: String,
}

impl Performer {
    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            kind: PerformedByType::Admin,
            id: id.into(),
        }
    }

    pub fn actor(id: &ActorId) -> Self {
        Self {
            kind: PerformedByType::Actor,
            id: id.0.clone(),
        }
    }

    pub fn system() -> Self {
        Self {
            kind: PerformedByType::System,
            id: "system".to_string(),
        }
    }
}

/// Caller identity plus transport metadata carried into activity entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub performer: Performer,
    pub ip_address: Option<String>,
}

impl RequestContext {
    pub fn new(performer: Performer) -> Self {
        Self {
            performer,
            ip_address: None,
        }
    }

    pub fn with_ip(mut self, ip_address: Option<String>) -> Self {
        self.ip_address = ip_address;
        self
    }
}

/// Reference to the generated lease contract attached before signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractDocument {
    pub storage_key: String,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub id: PolicyId,
    pub policy_number: String,
    pub broker_id: String,
    pub rent_amount: Decimal,
    pub guarantor_type: GuarantorType,
    pub status: PolicyStatus,
    pub package_id: Option<PackageId>,
    pub package_price: Option<Decimal>,
    pub contract: Option<ContractDocument>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub activated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Row version; the repository bumps it on every committed update.
    #[serde(default)]
    pub version: u64,
}

/// Legal name parts of a natural person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonName {
    pub first_name: String,
    #[serde(default)]
    pub middle_name: Option<String>,
    pub paternal_last_name: String,
    #[serde(default)]
    pub maternal_last_name: Option<String>,
}

impl PersonName {
    pub fn full_name(&self) -> String {
        [
            Some(self.first_name.as_str()),
            self.middle_name.as_deref(),
            Some(self.paternal_last_name.as_str()),
            self.maternal_last_name.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
    }

    pub fn is_filled(&self) -> bool {
        !self.first_name.trim().is_empty() && !self.paternal_last_name.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActorIdentity {
    Individual(PersonName),
    Company {
        company_name: String,
        legal_representative: PersonName,
    },
}

impl ActorIdentity {
    pub fn kind(&self) -> ActorKind {
        match self {
            Self::Individual(_) => ActorKind::Individual,
            Self::Company { .. } => ActorKind::Company,
        }
    }

    pub fn display_name(&self) -> String {
        match self {
            Self::Individual(name) => name.full_name(),
            Self::Company { company_name, .. } => company_name.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorKind {
    Individual,
    Company,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employment {
    pub employer: String,
    pub position: String,
    pub monthly_income: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GuaranteeMethod {
    Income,
    Property,
}

/// How a joint obligor or aval backs the policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guarantee {
    pub method: GuaranteeMethod,
    #[serde(default)]
    pub property_address: Option<String>,
    #[serde(default)]
    pub property_value: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Nationality {
    #[default]
    National,
    Foreign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MaritalStatus {
    Single,
    Married,
    Divorced,
    Widowed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferenceKind {
    Personal,
    Commercial,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorReference {
    pub kind: ReferenceKind,
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub relationship: Option<String>,
}

/// Self-service portal credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn issue(now: DateTime<Utc>, ttl: chrono::Duration) -> Self {
        Self {
            token: Uuid::new_v4().simple().to_string(),
            expires_at: now + ttl,
        }
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub policy_id: PolicyId,
    pub role: ActorRole,
    pub identity: Option<ActorIdentity>,
    pub contact: ContactInfo,
    pub employment: Option<Employment>,
    pub guarantee: Option<Guarantee>,
    pub nationality: Nationality,
    pub marital_status: Option<MaritalStatus>,
    pub references: Vec<ActorReference>,
    pub information_complete: bool,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub access: Option<AccessToken>,
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Actor {
    /// Empty record awaiting the actor's own submission.
    pub fn shell(policy_id: PolicyId, role: ActorRole, now: DateTime<Utc>) -> Self {
        Self {
            id: ActorId::generate(),
            policy_id,
            role,
            identity: None,
            contact: ContactInfo::default(),
            employment: None,
            guarantee: None,
            nationality: Nationality::National,
            marital_status: None,
            references: Vec::new(),
            information_complete: false,
            completed_at: None,
            access: None,
            archived_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.archived_at.is_none()
    }

    pub fn kind(&self) -> Option<ActorKind> {
        self.identity.as_ref().map(ActorIdentity::kind)
    }

    pub fn owner(&self) -> DocumentOwner {
        DocumentOwner::new(self.role, self.id.clone())
    }

    pub fn display_name(&self) -> String {
        self.identity
            .as_ref()
            .map(ActorIdentity::display_name)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| format!("unnamed {}", self.role.label()))
    }
}

/// Fixed document categories shared by every actor role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentCategory {
    Identification,
    IncomeProof,
    AddressProof,
    BankStatement,
    PropertyDeed,
    TaxReturn,
    EmploymentLetter,
    PropertyTaxStatement,
    MarriageCertificate,
    CompanyConstitution,
    LegalPowers,
    TaxStatusCertificate,
    CreditReport,
    PropertyRegistry,
    PropertyAppraisal,
    Passport,
    ImmigrationDocument,
    UtilityBill,
    PayrollReceipt,
    Other,
}

impl DocumentCategory {
    pub const ALL: [Self; 20] = [
        Self::Identification,
        Self::IncomeProof,
        Self::AddressProof,
        Self::BankStatement,
        Self::PropertyDeed,
        Self::TaxReturn,
        Self::EmploymentLetter,
        Self::PropertyTaxStatement,
        Self::MarriageCertificate,
        Self::CompanyConstitution,
        Self::LegalPowers,
        Self::TaxStatusCertificate,
        Self::CreditReport,
        Self::PropertyRegistry,
        Self::PropertyAppraisal,
        Self::Passport,
        Self::ImmigrationDocument,
        Self::UtilityBill,
        Self::PayrollReceipt,
        Self::Other,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Identification => "official identification",
            Self::IncomeProof => "proof of income",
            Self::AddressProof => "proof of address",
            Self::BankStatement => "bank statement",
            Self::PropertyDeed => "property deed",
            Self::TaxReturn => "tax return",
            Self::EmploymentLetter => "employment letter",
            Self::PropertyTaxStatement => "property tax statement",
            Self::MarriageCertificate => "marriage certificate",
            Self::CompanyConstitution => "company constitution",
            Self::LegalPowers => "legal representative powers",
            Self::TaxStatusCertificate => "tax status certificate",
            Self::CreditReport => "credit report",
            Self::PropertyRegistry => "public property registry certificate",
            Self::PropertyAppraisal => "property appraisal",
            Self::Passport => "passport",
            Self::ImmigrationDocument => "immigration document",
            Self::UtilityBill => "utility bill",
            Self::PayrollReceipt => "payroll receipt",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    #[default]
    Pending,
    InReview,
    Approved,
    Rejected,
}

impl ValidationStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InReview => "IN_REVIEW",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorDocument {
    pub id: DocumentId,
    pub policy_id: PolicyId,
    pub owner: DocumentOwner,
    pub category: DocumentCategory,
    pub file_name: String,
    pub storage_key: String,
    pub status: ValidationStatus,
    pub rejection_reason: Option<String>,
    pub validated_by: Option<String>,
    pub validated_at: Option<DateTime<Utc>>,
    pub uploaded_at: DateTime<Utc>,
}

/// Append-only audit entry. Never updated or deleted once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyActivity {
    pub id: ActivityId,
    pub policy_id: PolicyId,
    pub action: String,
    pub description: String,
    pub details: Value,
    pub performed_by_type: PerformedByType,
    pub performed_by_id: String,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PolicyActivity {
    pub fn record(
        policy_id: &PolicyId,
        action: impl Into<String>,
        description: impl Into<String>,
        details: Value,
        context: &RequestContext,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ActivityId::generate(),
            policy_id: policy_id.clone(),
            action: action.into(),
            description: description.into(),
            details,
            performed_by_type: context.performer.kind,
            performed_by_id: context.performer.id.clone(),
            ip_address: context.ip_address.clone(),
            created_at: now,
        }
    }
}
