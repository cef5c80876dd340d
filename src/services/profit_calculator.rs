//! Fee-aware resale profit
//!
//! Arithmetic stays in full `Decimal` precision; only the reported figures are
//! rounded to two places.

use rust_decimal::Decimal;
use tracing::debug;

use crate::domain::{CandidateRecord, FeeBreakdown, FeeSchedule, MatchResult, Profit, ProductRecord};

const OUTPUT_DP: u32 = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct ProfitCalculator {
    fees: FeeSchedule,
}

impl ProfitCalculator {
    pub const fn new(fees: FeeSchedule) -> Self {
        Self { fees }
    }

    pub const fn fees(&self) -> &FeeSchedule {
        &self.fees
    }

    /// Profit from buying at `source_price` and selling the candidate's
    /// listing on its marketplace. `None` when the candidate has no price.
    pub fn calculate(&self, source_price: Decimal, candidate: &CandidateRecord) -> Option<(Profit, FeeBreakdown)> {
        let price = candidate.price?;
        let total_price = price + candidate.shipping_price.unwrap_or(Decimal::ZERO);

        let fraction = self.fees.fee_fraction(candidate.marketplace);
        let marketplace_fee = total_price * fraction;
        let total_fees = marketplace_fee + self.fees.additional_fees;

        let amount = total_price - source_price - total_fees;
        let percentage = if source_price.is_zero() {
            Decimal::ZERO
        } else {
            amount / source_price * Decimal::ONE_HUNDRED
        };

        Some((
            Profit {
                amount: amount.round_dp(OUTPUT_DP),
                percentage: percentage.round_dp(OUTPUT_DP),
            },
            FeeBreakdown {
                marketplace_fee_percent: (fraction * Decimal::ONE_HUNDRED).round_dp(OUTPUT_DP),
                marketplace_fee_amount: marketplace_fee.round_dp(OUTPUT_DP),
                additional_fees: self.fees.additional_fees.round_dp(OUTPUT_DP),
                total_fees: total_fees.round_dp(OUTPUT_DP),
            },
        ))
    }

    /// Fill `profit` and `fee_breakdown` on every match.
    ///
    /// Without a source price nothing is computed. A candidate without a price
    /// gets the zero profit sentinel.
    pub fn annotate(&self, source: &ProductRecord, matches: &mut [MatchResult]) {
        let Some(source_price) = source.price else {
            debug!("No source price for '{}', skipping profit", source.title);
            return;
        };

        for result in matches {
            match self.calculate(source_price, &result.candidate) {
                Some((profit, fees)) => {
                    result.profit = Some(profit);
                    result.fee_breakdown = Some(fees);
                }
                None => {
                    result.profit = Some(Profit::ZERO);
                    result.fee_breakdown = None;
                }
            }
        }
    }
}

impl Default for ProfitCalculator {
    fn default() -> Self {
        Self::new(FeeSchedule::default())
    }
}
