use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

pub type Id = String;

pub fn generate_id() -> Id {
    Uuid::new_v4().to_string()
}

/// Round a money amount to cents, half away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Largest amount a `NUMERIC(12,2)` money column holds.
pub fn max_money() -> Decimal {
    Decimal::new(999_999_999_999, 2)
}

/// Money coming in from a request: whole cents and within column range.
pub fn check_money(amount: Decimal, field: &str) -> Result<Decimal, AppError> {
    if amount.normalize().scale() > 2 {
        return Err(AppError::validation(format!(
            "{} must have at most two decimal places",
            field
        )));
    }
    if amount.abs() > max_money() {
        return Err(AppError::validation(format!("{} is too large", field)));
    }
    Ok(amount)
}

/// Returned when a stored enum column holds a value this build does not know.
#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} value '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Inclusive calendar-day range used by list and report queries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<chrono::NaiveDate>,
    pub to: Option<chrono::NaiveDate>,
}

impl DateRange {
    pub fn contains(&self, at: &chrono::DateTime<chrono::Utc>) -> bool {
        let day = at.date_naive();
        self.from.map_or(true, |from| day >= from) && self.to.map_or(true, |to| day <= to)
    }

    /// Lower bound as an instant (start of `from`).
    pub fn start(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        use chrono::TimeZone;
        self.from
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| chrono::Utc.from_utc_datetime(&dt))
    }

    /// Exclusive upper bound as an instant (start of the day after `to`).
    pub fn end(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        use chrono::TimeZone;
        self.to
            .and_then(|d| d.succ_opt())
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| chrono::Utc.from_utc_datetime(&dt))
    }
}
