use crate::model::{Id, PaymentMethod};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalesSummary {
    pub bill_count: usize,
    pub subtotal: Decimal,
    pub labor: Decimal,
    pub vat_amount: Decimal,
    pub grand_total: Decimal,
    pub paid_total: Decimal,
    pub unpaid_total: Decimal,
    pub by_day: Vec<DailySales>,
    pub by_payment_method: Vec<PaymentMethodTotal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySales {
    pub date: NaiveDate,
    pub bill_count: usize,
    pub grand_total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentMethodTotal {
    pub payment_method: PaymentMethod,
    pub bill_count: usize,
    pub grand_total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LowStockEntry {
    pub product_id: Id,
    pub branch_id: Id,
    pub sku: String,
    pub name: String,
    pub stock_quantity: i32,
    pub reorder_level: i32,
    /// How far below the reorder level the product is (0 when exactly at it).
    pub shortfall: i32,
}

/// Ledger totals for one product over a period. `sold` is reported as a
/// positive count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductMovement {
    pub product_id: Id,
    pub sku: String,
    pub name: String,
    pub purchased: i32,
    pub sold: i32,
    pub adjusted: i32,
    pub net: i32,
}
