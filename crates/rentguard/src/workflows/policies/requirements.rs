use serde::Serialize;

use super::domain::{ActorRole, GuarantorType};

/// How many active actors of a role a policy must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    ExactlyOne,
    AtLeastOne,
}

impl Cardinality {
    pub const fn admits(self, count: usize) -> bool {
        match self {
            Self::ExactlyOne => count == 1,
            Self::AtLeastOne => count >= 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoleRequirement {
    pub role: ActorRole,
    pub cardinality: Cardinality,
}

const LANDLORD: RoleRequirement = RoleRequirement {
    role: ActorRole::Landlord,
    cardinality: Cardinality::ExactlyOne,
};
const TENANT: RoleRequirement = RoleRequirement {
    role: ActorRole::Tenant,
    cardinality: Cardinality::ExactlyOne,
};
const JOINT_OBLIGOR: RoleRequirement = RoleRequirement {
    role: ActorRole::JointObligor,
    cardinality: Cardinality::AtLeastOne,
};
const AVAL: RoleRequirement = RoleRequirement {
    role: ActorRole::Aval,
    cardinality: Cardinality::AtLeastOne,
};

/// Roles that must be present and complete for a guarantor configuration.
pub fn required_roles(guarantor_type: GuarantorType) -> &'static [RoleRequirement] {
    match guarantor_type {
        GuarantorType::None => &[LANDLORD, TENANT],
        GuarantorType::JointObligor => &[LANDLORD, TENANT, JOINT_OBLIGOR],
        GuarantorType::Aval => &[LANDLORD, TENANT, AVAL],
        GuarantorType::Both => &[LANDLORD, TENANT, JOINT_OBLIGOR, AVAL],
    }
}

pub fn requires_role(guarantor_type: GuarantorType, role: ActorRole) -> bool {
    required_roles(guarantor_type)
        .iter()
        .any(|requirement| requirement.role == role)
}
