use crate::model::{generate_id, DateRange, Id, UnknownVariant};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const BILL_NUMBER_PREFIX: &str = "BILL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    Card,
    BankTransfer,
    EWallet,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "CASH",
            PaymentMethod::Card => "CARD",
            PaymentMethod::BankTransfer => "BANK_TRANSFER",
            PaymentMethod::EWallet => "E_WALLET",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CASH" => Ok(PaymentMethod::Cash),
            "CARD" => Ok(PaymentMethod::Card),
            "BANK_TRANSFER" => Ok(PaymentMethod::BankTransfer),
            "E_WALLET" => Ok(PaymentMethod::EWallet),
            other => Err(UnknownVariant::new("payment method", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "UNPAID",
            PaymentStatus::Paid => "PAID",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UNPAID" => Ok(PaymentStatus::Unpaid),
            "PAID" => Ok(PaymentStatus::Paid),
            other => Err(UnknownVariant::new("payment status", other)),
        }
    }
}

/// Amounts computed from a job's items and labor at completion time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BillTotals {
    pub subtotal: Decimal,
    pub labor: Decimal,
    pub vat_rate: Decimal,
    pub vat_amount: Decimal,
    pub grand_total: Decimal,
}

/// Financial snapshot of a completed job order. Amounts never change after
/// creation; only the payment status moves from UNPAID to PAID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bill {
    pub id: Id,
    pub tenant_id: Id,
    pub job_order_id: Id,
    pub bill_number: String,
    pub subtotal: Decimal,
    pub labor: Decimal,
    pub vat_rate: Decimal,
    pub vat_amount: Decimal,
    pub grand_total: Decimal,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub created_by: Id,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Bill {
    pub fn issue(
        tenant_id: Id,
        job_order_id: Id,
        bill_number: String,
        totals: BillTotals,
        payment_method: PaymentMethod,
        payment_status: PaymentStatus,
        created_by: Id,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(),
            tenant_id,
            job_order_id,
            bill_number,
            subtotal: totals.subtotal,
            labor: totals.labor,
            vat_rate: totals.vat_rate,
            vat_amount: totals.vat_amount,
            grand_total: totals.grand_total,
            payment_method,
            payment_status,
            created_by,
            created_at: now,
            paid_at: (payment_status == PaymentStatus::Paid).then_some(now),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BillFilter {
    pub payment_status: Option<PaymentStatus>,
    #[serde(flatten)]
    pub range: DateRange,
}

impl BillFilter {
    pub fn matches(&self, bill: &Bill) -> bool {
        self.payment_status.map_or(true, |s| bill.payment_status == s)
            && self.range.contains(&bill.created_at)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayBillRequest {
    pub payment_method: Option<PaymentMethod>,
}
