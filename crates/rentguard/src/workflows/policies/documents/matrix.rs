use serde::Serialize;

use super::super::domain::{
    Actor, ActorKind, ActorRole, DocumentCategory, GuaranteeMethod, MaritalStatus, Nationality,
};

use DocumentCategory::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DocumentRequirement {
    pub category: DocumentCategory,
    pub required: bool,
}

/// Facts about an actor that decide which documents they must upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequirementProfile {
    pub role: ActorRole,
    pub kind: ActorKind,
    pub guarantee: Option<GuaranteeMethod>,
    pub nationality: Nationality,
    pub married: bool,
}

impl RequirementProfile {
    pub fn of(actor: &Actor) -> Self {
        Self {
            role: actor.role,
            kind: actor.kind().unwrap_or(ActorKind::Individual),
            guarantee: actor.guarantee.as_ref().map(|guarantee| guarantee.method),
            nationality: actor.nationality,
            married: actor.marital_status == Some(MaritalStatus::Married),
        }
    }

    /// Avals always pledge property, whatever the submission says.
    fn pledges_property(&self) -> bool {
        match self.role {
            ActorRole::Aval => true,
            ActorRole::JointObligor => self.guarantee == Some(GuaranteeMethod::Property),
            ActorRole::Landlord | ActorRole::Tenant => false,
        }
    }
}

struct Matrix {
    rows: Vec<DocumentRequirement>,
}

impl Matrix {
    fn new() -> Self {
        Self { rows: Vec::new() }
    }

    fn require(&mut self, categories: &[DocumentCategory]) {
        self.push(categories, true);
    }

    fn accept(&mut self, categories: &[DocumentCategory]) {
        self.push(categories, false);
    }

    fn push(&mut self, categories: &[DocumentCategory], required: bool) {
        for category in categories {
            match self.rows.iter_mut().find(|row| row.category == *category) {
                Some(row) => row.required |= required,
                None => self.rows.push(DocumentRequirement {
                    category: *category,
                    required,
                }),
            }
        }
    }
}

/// Required and optional document categories for an actor.
pub fn requirements_for(profile: &RequirementProfile) -> Vec<DocumentRequirement> {
    let mut matrix = Matrix::new();

    match profile.kind {
        ActorKind::Individual => {
            matrix.require(&[Identification, AddressProof]);
            if profile.nationality == Nationality::Foreign {
                matrix.require(&[Passport, ImmigrationDocument]);
            }
        }
        ActorKind::Company => {
            matrix.require(&[
                CompanyConstitution,
                LegalPowers,
                TaxStatusCertificate,
                Identification,
                AddressProof,
            ]);
        }
    }

    match (profile.role, profile.kind) {
        (ActorRole::Landlord, _) => {
            matrix.require(&[PropertyDeed, BankStatement]);
            matrix.accept(&[PropertyTaxStatement, UtilityBill]);
        }
        (ActorRole::Tenant, ActorKind::Individual) => {
            matrix.require(&[IncomeProof, EmploymentLetter]);
            matrix.accept(&[PayrollReceipt, BankStatement, CreditReport]);
        }
        (ActorRole::Tenant, ActorKind::Company) => {
            matrix.require(&[BankStatement, TaxReturn]);
            matrix.accept(&[CreditReport]);
        }
        (ActorRole::JointObligor, _) | (ActorRole::Aval, _) => {
            if profile.pledges_property() {
                matrix.require(&[PropertyDeed, PropertyRegistry, PropertyTaxStatement]);
                matrix.accept(&[PropertyAppraisal]);
                if profile.married && profile.kind == ActorKind::Individual {
                    matrix.require(&[MarriageCertificate]);
                }
            } else {
                matrix.require(&[IncomeProof, BankStatement]);
                matrix.accept(&[PayrollReceipt, EmploymentLetter]);
            }
            matrix.accept(&[CreditReport]);
        }
    }

    matrix.accept(&[Other]);
    matrix.rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(role: ActorRole, kind: ActorKind) -> RequirementProfile {
        RequirementProfile {
            role,
            kind,
            guarantee: None,
            nationality: Nationality::National,
            married: false,
        }
    }

    fn required(profile: &RequirementProfile) -> Vec<DocumentCategory> {
        requirements_for(profile)
            .into_iter()
            .filter(|row| row.required)
            .map(|row| row.category)
            .collect()
    }

    #[test]
    fn individual_tenant_needs_income_evidence() {
        let categories = required(&profile(ActorRole::Tenant, ActorKind::Individual));
        assert_eq!(
            categories,
            vec![Identification, AddressProof, IncomeProof, EmploymentLetter]
        );
    }

    #[test]
    fn company_tenant_needs_corporate_paperwork() {
        let categories = required(&profile(ActorRole::Tenant, ActorKind::Company));
        for category in [CompanyConstitution, LegalPowers, TaxStatusCertificate, TaxReturn] {
            assert!(categories.contains(&category), "{category:?} missing");
        }
        assert!(!categories.contains(&EmploymentLetter));
    }

    #[test]
    fn foreign_individuals_add_immigration_papers() {
        let mut landlord = profile(ActorRole::Landlord, ActorKind::Individual);
        landlord.nationality = Nationality::Foreign;
        let categories = required(&landlord);
        assert!(categories.contains(&Passport));
        assert!(categories.contains(&ImmigrationDocument));
        assert!(categories.contains(&PropertyDeed));
    }

    #[test]
    fn joint_obligor_requirements_follow_guarantee_method() {
        let mut obligor = profile(ActorRole::JointObligor, ActorKind::Individual);
        obligor.guarantee = Some(GuaranteeMethod::Income);
        assert!(required(&obligor).contains(&IncomeProof));
        assert!(!required(&obligor).contains(&PropertyDeed));

        obligor.guarantee = Some(GuaranteeMethod::Property);
        obligor.married = true;
        let categories = required(&obligor);
        assert!(categories.contains(&PropertyRegistry));
        assert!(categories.contains(&MarriageCertificate));
        assert!(!categories.contains(&IncomeProof));
    }

    #[test]
    fn aval_always_pledges_property() {
        let aval = profile(ActorRole::Aval, ActorKind::Individual);
        let categories = required(&aval);
        assert!(categories.contains(&PropertyDeed));
        assert!(categories.contains(&PropertyTaxStatement));
        assert!(!categories.contains(&MarriageCertificate));
    }

    #[test]
    fn categories_are_never_listed_twice() {
        let mut company_landlord = profile(ActorRole::Landlord, ActorKind::Company);
        company_landlord.nationality = Nationality::Foreign;
        let rows = requirements_for(&company_landlord);
        let mut categories: Vec<_> = rows.iter().map(|row| row.category).collect();
        let before = categories.len();
        categories.sort();
        categories.dedup();
        assert_eq!(categories.len(), before);
        assert!(rows.iter().any(|row| row.category == Other && !row.required));
    }
}
