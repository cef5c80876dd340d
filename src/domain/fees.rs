//! Marketplace selling fee schedule

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::marketplace::Marketplace;

/// Per-marketplace fee fraction (0-1) plus one flat amount applied to every sale.
///
/// Field names stay snake_case: the layered loader lowercases every key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    #[serde(default)]
    pub marketplace_fees: BTreeMap<Marketplace, Decimal>,
    #[serde(default)]
    pub additional_fees: Decimal,
}

impl FeeSchedule {
    pub fn new(marketplace_fees: BTreeMap<Marketplace, Decimal>, additional_fees: Decimal) -> Self {
        Self {
            marketplace_fees,
            additional_fees,
        }
    }

    /// Uniform fraction for every known marketplace
    pub fn uniform(fraction: Decimal, additional_fees: Decimal) -> Self {
        Self::new(
            Marketplace::ALL.into_iter().map(|m| (m, fraction)).collect(),
            additional_fees,
        )
    }

    /// Fee fraction for a marketplace; zero when the schedule does not list it
    pub fn fee_fraction(&self, marketplace: Marketplace) -> Decimal {
        self.marketplace_fees
            .get(&marketplace)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn validate(&self) -> Result<(), String> {
        for (marketplace, fee) in &self.marketplace_fees {
            if *fee < Decimal::ZERO || *fee > Decimal::ONE {
                return Err(format!("fee for {marketplace} must be within 0..=1, got {fee}"));
            }
        }
        if self.additional_fees < Decimal::ZERO {
            return Err(format!("additional fees must not be negative, got {}", self.additional_fees));
        }
        Ok(())
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self::uniform(Decimal::new(15, 2), Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_marketplace_has_zero_fee() {
        let schedule = FeeSchedule::new(BTreeMap::from([(Marketplace::Walmart, Decimal::new(8, 2))]), Decimal::ZERO);
        assert_eq!(schedule.fee_fraction(Marketplace::Walmart), Decimal::new(8, 2));
        assert_eq!(schedule.fee_fraction(Marketplace::Target), Decimal::ZERO);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let schedule = FeeSchedule::uniform(Decimal::new(15, 1), Decimal::ZERO);
        assert!(schedule.validate().is_err());
        assert!(FeeSchedule::default().validate().is_ok());
    }
}
