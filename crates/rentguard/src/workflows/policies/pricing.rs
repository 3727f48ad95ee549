use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::domain::PackageId;

/// How a guarantee package is priced against the monthly rent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PackagePricing {
    Flat { amount: Decimal },
    /// `percent` of the monthly rent, never below `minimum`.
    PercentageOfRent { percent: Decimal, minimum: Decimal },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub id: PackageId,
    pub name: String,
    pub pricing: PackagePricing,
}

impl Package {
    pub fn price_for(&self, rent: Decimal) -> Decimal {
        let price = match &self.pricing {
            PackagePricing::Flat { amount } => *amount,
            PackagePricing::PercentageOfRent { percent, minimum } => {
                (rent * *percent / Decimal::ONE_HUNDRED).max(*minimum)
            }
        };
        price.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }
}
