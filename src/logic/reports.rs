use std::collections::HashMap;

use itertools::Itertools;
use rust_decimal::Decimal;

use crate::model::{
    Bill, DailySales, LowStockEntry, PaymentMethodTotal, PaymentStatus, Product, ProductMovement,
    SalesSummary, StockTransaction, TransactionKind,
};

pub fn sales_summary(bills: &[Bill]) -> SalesSummary {
    let sum = |f: fn(&Bill) -> Decimal| bills.iter().map(f).sum::<Decimal>();

    let by_day = bills
        .iter()
        .into_group_map_by(|b| b.created_at.date_naive())
        .into_iter()
        .sorted_by_key(|(date, _)| *date)
        .map(|(date, day)| DailySales {
            date,
            bill_count: day.len(),
            grand_total: day.iter().map(|b| b.grand_total).sum(),
        })
        .collect();

    let by_payment_method = bills
        .iter()
        .into_group_map_by(|b| b.payment_method)
        .into_iter()
        .sorted_by_key(|(method, _)| *method)
        .map(|(payment_method, group)| PaymentMethodTotal {
            payment_method,
            bill_count: group.len(),
            grand_total: group.iter().map(|b| b.grand_total).sum(),
        })
        .collect();

    let (paid, unpaid): (Vec<&Bill>, Vec<&Bill>) = bills
        .iter()
        .partition(|b| b.payment_status == PaymentStatus::Paid);

    SalesSummary {
        bill_count: bills.len(),
        subtotal: sum(|b| b.subtotal),
        labor: sum(|b| b.labor),
        vat_amount: sum(|b| b.vat_amount),
        grand_total: sum(|b| b.grand_total),
        paid_total: paid.iter().map(|b| b.grand_total).sum(),
        unpaid_total: unpaid.iter().map(|b| b.grand_total).sum(),
        by_day,
        by_payment_method,
    }
}

/// Active products at or below their reorder level, most depleted first.
pub fn low_stock(products: &[Product]) -> Vec<LowStockEntry> {
    products
        .iter()
        .filter(|p| p.is_active && p.is_low_stock())
        .map(|p| LowStockEntry {
            product_id: p.id.clone(),
            branch_id: p.branch_id.clone(),
            sku: p.sku.clone(),
            name: p.name.clone(),
            stock_quantity: p.stock_quantity,
            reorder_level: p.reorder_level,
            shortfall: p.reorder_level - p.stock_quantity,
        })
        .sorted_by(|a, b| b.shortfall.cmp(&a.shortfall).then_with(|| a.sku.cmp(&b.sku)))
        .collect()
}

/// Per-product ledger totals, ordered by SKU. Products that no longer exist
/// in `products` are reported with an empty SKU and name.
pub fn product_movements(
    transactions: &[StockTransaction],
    products: &[Product],
) -> Vec<ProductMovement> {
    let catalog: HashMap<&str, &Product> = products.iter().map(|p| (p.id.as_str(), p)).collect();

    transactions
        .iter()
        .into_group_map_by(|t| t.product_id.as_str())
        .into_iter()
        .map(|(product_id, rows)| {
            let total = |kind: TransactionKind| -> i32 {
                rows.iter()
                    .filter(|t| t.kind == kind)
                    .map(|t| t.quantity)
                    .sum()
            };
            let purchased = total(TransactionKind::Purchase);
            let sold = -total(TransactionKind::Sale);
            let adjusted = total(TransactionKind::Adjust);
            let product = catalog.get(product_id);
            ProductMovement {
                product_id: product_id.to_string(),
                sku: product.map(|p| p.sku.clone()).unwrap_or_default(),
                name: product.map(|p| p.name.clone()).unwrap_or_default(),
                purchased,
                sold,
                adjusted,
                net: purchased - sold + adjusted,
            }
        })
        .sorted_by(|a, b| a.sku.cmp(&b.sku).then_with(|| a.product_id.cmp(&b.product_id)))
        .collect()
}
