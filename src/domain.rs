use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::errors::ServiceError;

/// Scale used when storing and comparing unit prices.
pub const PRICE_SCALE: u32 = 2;

/// Scale used when storing ledger quantities.
pub const QUANTITY_SCALE: u32 = 4;

/// Per-item costing strategy.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CostingMethod {
    LastCost,
    WeightedAverage,
}

/// Lifecycle state of a transaction document. Soft delete is an explicit
/// state transition with a defined reverse effect, not a query scope.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Active,
    Deleted,
}

/// Approval workflow state of a customer return. Only an approved return
/// can be marked as received.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Draft,
    Approved,
}

/// Direction of a stock adjustment.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentType {
    Add,
    Subtract,
}

/// Provenance of a price change in the history log.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    Initial,
    Purchase,
    PurchaseReturn,
}

/// Rounds a price to the stored precision.
pub fn round_price(value: Decimal) -> Decimal {
    value.round_dp(PRICE_SCALE)
}

pub fn ensure_positive(field: &str, value: Decimal) -> Result<(), ServiceError> {
    if value <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(format!(
            "{} must be greater than zero, got {}",
            field, value
        )));
    }
    Ok(())
}

pub fn ensure_non_negative(field: &str, value: Decimal) -> Result<(), ServiceError> {
    if value < Decimal::ZERO {
        return Err(ServiceError::ValidationError(format!(
            "{} must not be negative, got {}",
            field, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn enum_round_trips_through_storage_strings() {
        assert_eq!(CostingMethod::WeightedAverage.as_ref(), "weighted_average");
        assert_eq!(
            "last_cost".parse::<CostingMethod>().unwrap(),
            CostingMethod::LastCost
        );
        assert_eq!(DocumentStatus::Deleted.as_ref(), "deleted");
        assert_eq!(
            "active".parse::<DocumentStatus>().unwrap(),
            DocumentStatus::Active
        );
        assert_eq!(PriceSource::PurchaseReturn.as_ref(), "purchase_return");
    }

    #[test]
    fn round_price_uses_two_decimal_places() {
        assert_eq!(round_price(dec!(112.005)), dec!(112.00));
        assert_eq!(round_price(dec!(64.0049)), dec!(64.00));
    }

    #[test]
    fn sign_checks() {
        assert!(ensure_positive("quantity", dec!(0.0001)).is_ok());
        assert!(ensure_positive("quantity", Decimal::ZERO).is_err());
        assert!(ensure_non_negative("unit_cost", Decimal::ZERO).is_ok());
        assert!(ensure_non_negative("unit_cost", dec!(-1)).is_err());
    }
}
