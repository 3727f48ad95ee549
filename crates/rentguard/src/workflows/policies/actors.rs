//! Role-specific rules for actor records, selected by [`ActorRole`].

use rust_decimal::Decimal;
use serde::Deserialize;

use super::documents::{requirements_for, DocumentRequirement, RequirementProfile};
use super::domain::{
    Actor, ActorIdentity, ActorKind, ActorReference, ActorRole, ContactInfo, Employment,
    Guarantee, GuaranteeMethod, MaritalStatus, Nationality, ReferenceKind,
};

/// Raised when an actor asks to be marked complete with required fields missing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{role} information is incomplete; missing: {}", missing.join(", "))]
pub struct ProfileIncomplete {
    pub role: ActorRole,
    pub missing: Vec<&'static str>,
}

/// Behavior that differs between landlords, tenants, joint obligors and avals.
pub trait ActorProfile: Send + Sync {
    fn role(&self) -> ActorRole;

    /// Role-specific fields still missing, on top of identity and contact.
    fn role_fields_missing(&self, actor: &Actor) -> Vec<&'static str>;

    fn missing_fields(&self, actor: &Actor) -> Vec<&'static str> {
        let mut missing = common_fields_missing(actor);
        missing.extend(self.role_fields_missing(actor));
        missing
    }

    fn ensure_complete(&self, actor: &Actor) -> Result<(), ProfileIncomplete> {
        let missing = self.missing_fields(actor);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ProfileIncomplete {
                role: self.role(),
                missing,
            })
        }
    }

    fn required_documents(&self, actor: &Actor) -> Vec<DocumentRequirement> {
        requirements_for(&RequirementProfile::of(actor))
    }
}

pub struct LandlordProfile;
pub struct TenantProfile;
pub struct JointObligorProfile;
pub struct AvalProfile;

static LANDLORD: LandlordProfile = LandlordProfile;
static TENANT: TenantProfile = TenantProfile;
static JOINT_OBLIGOR: JointObligorProfile = JointObligorProfile;
static AVAL: AvalProfile = AvalProfile;

pub fn profile_for(role: ActorRole) -> &'static dyn ActorProfile {
    match role {
        ActorRole::Landlord => &LANDLORD,
        ActorRole::Tenant => &TENANT,
        ActorRole::JointObligor => &JOINT_OBLIGOR,
        ActorRole::Aval => &AVAL,
    }
}

fn filled(value: &Option<String>) -> bool {
    value
        .as_deref()
        .map(str::trim)
        .is_some_and(|value| !value.is_empty())
}

fn positive(value: Option<Decimal>) -> bool {
    value.is_some_and(|value| value > Decimal::ZERO)
}

fn common_fields_missing(actor: &Actor) -> Vec<&'static str> {
    let mut missing = Vec::new();
    match &actor.identity {
        None => missing.push("name"),
        Some(ActorIdentity::Individual(name)) => {
            if !name.is_filled() {
                missing.push("name");
            }
        }
        Some(ActorIdentity::Company {
            company_name,
            legal_representative,
        }) => {
            if company_name.trim().is_empty() {
                missing.push("company name");
            }
            if !legal_representative.is_filled() {
                missing.push("legal representative");
            }
        }
    }
    if !filled(&actor.contact.email) {
        missing.push("email");
    }
    if !filled(&actor.contact.phone) {
        missing.push("phone");
    }
    missing
}

fn employment_missing(actor: &Actor, missing: &mut Vec<&'static str>) {
    match &actor.employment {
        None => missing.push("employment"),
        Some(employment) => {
            if employment.employer.trim().is_empty() {
                missing.push("employer");
            }
            if !positive(Some(employment.monthly_income)) {
                missing.push("monthly income");
            }
        }
    }
}

fn property_missing(guarantee: &Guarantee, missing: &mut Vec<&'static str>) {
    if !filled(&guarantee.property_address) {
        missing.push("guarantee property address");
    }
    if !positive(guarantee.property_value) {
        missing.push("guarantee property value");
    }
}

fn has_reference(actor: &Actor, kind: ReferenceKind) -> bool {
    actor.references.iter().any(|reference| {
        reference.kind == kind
            && !reference.name.trim().is_empty()
            && !reference.phone.trim().is_empty()
    })
}

impl ActorProfile for LandlordProfile {
    fn role(&self) -> ActorRole {
        ActorRole::Landlord
    }

    fn role_fields_missing(&self, _actor: &Actor) -> Vec<&'static str> {
        Vec::new()
    }
}

impl ActorProfile for TenantProfile {
    fn role(&self) -> ActorRole {
        ActorRole::Tenant
    }

    fn role_fields_missing(&self, actor: &Actor) -> Vec<&'static str> {
        let mut missing = Vec::new();
        match actor.kind() {
            Some(ActorKind::Company) => {
                if !has_reference(actor, ReferenceKind::Commercial) {
                    missing.push("commercial reference");
                }
            }
            _ => {
                employment_missing(actor, &mut missing);
                if !has_reference(actor, ReferenceKind::Personal) {
                    missing.push("personal reference");
                }
            }
        }
        missing
    }
}

impl ActorProfile for JointObligorProfile {
    fn role(&self) -> ActorRole {
        ActorRole::JointObligor
    }

    fn role_fields_missing(&self, actor: &Actor) -> Vec<&'static str> {
        let mut missing = Vec::new();
        match &actor.guarantee {
            None => missing.push("guarantee method"),
            Some(guarantee) => match guarantee.method {
                GuaranteeMethod::Income => employment_missing(actor, &mut missing),
                GuaranteeMethod::Property => {
                    property_missing(guarantee, &mut missing);
                    if actor.marital_status.is_none() {
                        missing.push("marital status");
                    }
                }
            },
        }
        missing
    }
}

impl ActorProfile for AvalProfile {
    fn role(&self) -> ActorRole {
        ActorRole::Aval
    }

    fn role_fields_missing(&self, actor: &Actor) -> Vec<&'static str> {
        let mut missing = Vec::new();
        match &actor.guarantee {
            Some(guarantee) if guarantee.method == GuaranteeMethod::Property => {
                property_missing(guarantee, &mut missing);
            }
            _ => missing.push("property guarantee"),
        }
        if actor.marital_status.is_none() {
            missing.push("marital status");
        }
        missing
    }
}

/// Partial update submitted by an actor through the portal or by staff.
/// Absent fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ActorSubmission {
    #[serde(default)]
    pub identity: Option<ActorIdentity>,
    #[serde(default)]
    pub contact: Option<ContactInfo>,
    #[serde(default)]
    pub employment: Option<Employment>,
    #[serde(default)]
    pub guarantee: Option<Guarantee>,
    #[serde(default)]
    pub nationality: Option<Nationality>,
    #[serde(default)]
    pub marital_status: Option<MaritalStatus>,
    #[serde(default)]
    pub references: Option<Vec<ActorReference>>,
    #[serde(default)]
    pub information_complete: bool,
}

impl ActorSubmission {
    pub fn merge_into(self, actor: &mut Actor) {
        if let Some(identity) = self.identity {
            actor.identity = Some(identity);
        }
        if let Some(contact) = self.contact {
            actor.contact = contact;
        }
        if let Some(employment) = self.employment {
            actor.employment = Some(employment);
        }
        if let Some(guarantee) = self.guarantee {
            actor.guarantee = Some(guarantee);
        }
        if let Some(nationality) = self.nationality {
            actor.nationality = nationality;
        }
        if let Some(marital_status) = self.marital_status {
            actor.marital_status = Some(marital_status);
        }
        if let Some(references) = self.references {
            actor.references = references;
        }
    }
}
