use crate::error::AppError;
use crate::model::{check_money, max_money, round_money, BillTotals, JobOrderItem};
use rust_decimal::Decimal;

/// Default VAT rate (12%).
pub fn default_vat_rate() -> Decimal {
    Decimal::new(12, 2)
}

/// Totals for a bill: parts subtotal plus labor, with VAT added on top.
pub fn compute_totals(
    items: &[JobOrderItem],
    labor: Decimal,
    vat_rate: Decimal,
) -> Result<BillTotals, AppError> {
    if labor < Decimal::ZERO {
        return Err(AppError::validation("labor cost cannot be negative"));
    }
    check_money(labor, "labor cost")?;
    if vat_rate < Decimal::ZERO {
        return Err(AppError::validation("VAT rate cannot be negative"));
    }

    let subtotal = round_money(items.iter().map(JobOrderItem::line_total).sum());
    let labor = round_money(labor);
    let taxable = subtotal + labor;
    let vat_amount = round_money(taxable * vat_rate);
    let grand_total = taxable + vat_amount;
    if grand_total > max_money() {
        return Err(AppError::validation(format!(
            "bill total {} is too large",
            grand_total
        )));
    }

    Ok(BillTotals {
        subtotal,
        labor,
        vat_rate,
        vat_amount,
        grand_total,
    })
}
