//! Planning for every stock-ledger workflow.
//!
//! Each `plan_*` function takes the rows a store has read (and locked) inside
//! its transaction, validates the whole request up front and returns the full
//! set of rows to write. Nothing is written when planning fails, and the
//! planned product balances and ledger rows always agree: every product in a
//! plan carries the counter value recorded as `balance_after` on its ledger
//! row.

use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::Decimal;

use crate::error::AppError;
use crate::logic::billing::compute_totals;
use crate::model::{
    check_money, Bill, CompletionRequest, Id, JobOrder, JobOrderItem, JobStatus, PaymentStatus,
    Product, SessionUser, StockLine, StockTransaction, TransactionKind,
};

#[derive(Debug, Clone)]
pub struct StockInPlan {
    pub products: Vec<Product>,
    pub transactions: Vec<StockTransaction>,
}

#[derive(Debug, Clone)]
pub struct AdjustmentPlan {
    pub product: Product,
    pub transaction: StockTransaction,
}

/// Item row to write for one issued line.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemChange {
    pub item: JobOrderItem,
    /// False when an existing item for the same product absorbed the quantity.
    pub is_new: bool,
}

#[derive(Debug, Clone)]
pub struct StockOutPlan {
    pub job_order: JobOrder,
    pub promoted: bool,
    pub products: Vec<Product>,
    pub transactions: Vec<StockTransaction>,
    pub item_changes: Vec<ItemChange>,
}

#[derive(Debug, Clone)]
pub struct ItemReturnPlan {
    pub removed_item_id: Id,
    pub product: Product,
    pub transaction: StockTransaction,
}

#[derive(Debug, Clone)]
pub struct CancellationPlan {
    pub job_order: JobOrder,
    pub removed_item_ids: Vec<Id>,
    pub products: Vec<Product>,
    pub transactions: Vec<StockTransaction>,
}

#[derive(Debug, Clone)]
pub struct CompletionPlan {
    pub job_order: JobOrder,
    pub bill: Bill,
}

/// Merge lines for the same product, keeping first-seen order.
///
/// Quantities are summed; the first explicit unit price wins.
pub fn merge_lines(lines: &[StockLine]) -> Result<Vec<StockLine>, AppError> {
    if lines.is_empty() {
        return Err(AppError::validation("at least one line is required"));
    }

    let mut merged: Vec<StockLine> = Vec::with_capacity(lines.len());
    for line in lines {
        if line.quantity <= 0 {
            return Err(AppError::validation(format!(
                "quantity for product {} must be positive",
                line.product_id
            )));
        }
        if let Some(price) = line.unit_price {
            if price < Decimal::ZERO {
                return Err(AppError::validation(format!(
                    "unit price for product {} cannot be negative",
                    line.product_id
                )));
            }
            check_money(price, "unit price")?;
        }

        match merged.iter_mut().find(|m| m.product_id == line.product_id) {
            Some(existing) => {
                existing.quantity =
                    existing.quantity.checked_add(line.quantity).ok_or_else(|| {
                        AppError::validation(format!(
                            "quantity for product {} is too large",
                            line.product_id
                        ))
                    })?;
                if existing.unit_price.is_none() {
                    existing.unit_price = line.unit_price;
                }
            }
            None => merged.push(line.clone()),
        }
    }
    Ok(merged)
}

/// Distinct product ids referenced by `lines`, in request order.
pub fn product_ids(lines: &[StockLine]) -> Vec<Id> {
    let mut ids: Vec<Id> = Vec::new();
    for line in lines {
        if !ids.contains(&line.product_id) {
            ids.push(line.product_id.clone());
        }
    }
    ids
}

fn index_products(products: &[Product]) -> HashMap<&str, &Product> {
    products.iter().map(|p| (p.id.as_str(), p)).collect()
}

fn lookup<'a>(
    index: &HashMap<&str, &'a Product>,
    product_id: &str,
) -> Result<&'a Product, AppError> {
    index
        .get(product_id)
        .copied()
        .ok_or_else(|| AppError::not_found(format!("product {}", product_id)))
}

fn apply_delta(product: &Product, delta: i32) -> Result<Product, AppError> {
    let balance = product
        .stock_quantity
        .checked_add(delta)
        .ok_or_else(|| AppError::validation(format!("stock for {} would overflow", product.sku)))?;
    let mut updated = product.clone();
    updated.stock_quantity = balance;
    updated.updated_at = Utc::now();
    Ok(updated)
}

/// Receive purchased stock.
pub fn plan_stock_in(
    actor: &SessionUser,
    products: &[Product],
    lines: &[StockLine],
    note: Option<&str>,
) -> Result<StockInPlan, AppError> {
    let lines = merge_lines(lines)?;
    let index = index_products(products);

    let mut plan = StockInPlan {
        products: Vec::with_capacity(lines.len()),
        transactions: Vec::with_capacity(lines.len()),
    };
    for line in &lines {
        let product = lookup(&index, &line.product_id)?;
        if !product.is_active {
            return Err(AppError::validation(format!(
                "product {} is inactive",
                product.sku
            )));
        }
        let updated = apply_delta(product, line.quantity)?;
        plan.transactions.push(StockTransaction::record(
            actor,
            &updated,
            TransactionKind::Purchase,
            line.quantity,
            None,
            note.map(str::to_string),
        ));
        plan.products.push(updated);
    }
    Ok(plan)
}

/// Opening stock for a freshly created product, booked as a purchase.
pub fn plan_opening_stock(
    actor: &SessionUser,
    product: &Product,
    quantity: i32,
) -> Result<Option<AdjustmentPlan>, AppError> {
    if quantity < 0 {
        return Err(AppError::validation("opening stock cannot be negative"));
    }
    if quantity == 0 {
        return Ok(None);
    }
    let updated = apply_delta(product, quantity)?;
    let transaction = StockTransaction::record(
        actor,
        &updated,
        TransactionKind::Purchase,
        quantity,
        None,
        Some("opening stock".to_string()),
    );
    Ok(Some(AdjustmentPlan {
        product: updated,
        transaction,
    }))
}

/// Set a product's stock to a physically counted quantity.
pub fn plan_adjustment(
    actor: &SessionUser,
    product: &Product,
    counted_quantity: i32,
    note: Option<&str>,
) -> Result<AdjustmentPlan, AppError> {
    if counted_quantity < 0 {
        return Err(AppError::validation("counted quantity cannot be negative"));
    }
    let delta = counted_quantity - product.stock_quantity;
    if delta == 0 {
        return Err(AppError::validation(format!(
            "stock for {} is already {}",
            product.sku, counted_quantity
        )));
    }
    let updated = apply_delta(product, delta)?;
    let transaction = StockTransaction::record(
        actor,
        &updated,
        TransactionKind::Adjust,
        delta,
        None,
        note.map(str::to_string),
    );
    Ok(AdjustmentPlan {
        product: updated,
        transaction,
    })
}

/// Issue parts to a job order.
///
/// `existing_items` are the job's current items; issuing a product already on
/// the job adds to that item's quantity and keeps its unit price.
pub fn plan_stock_out(
    actor: &SessionUser,
    job: &JobOrder,
    products: &[Product],
    existing_items: &[JobOrderItem],
    lines: &[StockLine],
) -> Result<StockOutPlan, AppError> {
    job.ensure_workable()?;
    let lines = merge_lines(lines)?;
    let index = index_products(products);

    // Validate every line before producing any row.
    let mut checked: Vec<(&StockLine, &Product)> = Vec::with_capacity(lines.len());
    for line in &lines {
        let product = lookup(&index, &line.product_id)?;
        if !product.is_active {
            return Err(AppError::validation(format!(
                "product {} is inactive",
                product.sku
            )));
        }
        if product.branch_id != job.branch_id {
            return Err(AppError::validation(format!(
                "product {} is not stocked at the job order's branch",
                product.sku
            )));
        }
        if product.stock_quantity < line.quantity {
            return Err(AppError::InsufficientStock {
                product_id: product.id.clone(),
                sku: product.sku.clone(),
                requested: line.quantity,
                available: product.stock_quantity,
            });
        }
        checked.push((line, product));
    }

    let mut plan = StockOutPlan {
        job_order: job.clone(),
        promoted: false,
        products: Vec::with_capacity(checked.len()),
        transactions: Vec::with_capacity(checked.len()),
        item_changes: Vec::with_capacity(checked.len()),
    };

    for (line, product) in checked {
        let updated = apply_delta(product, -line.quantity)?;
        plan.transactions.push(StockTransaction::record(
            actor,
            &updated,
            TransactionKind::Sale,
            -line.quantity,
            Some(job.id.clone()),
            Some(format!("issued to {}", job.job_number)),
        ));

        let change = match existing_items.iter().find(|i| i.product_id == product.id) {
            Some(existing) => {
                let mut item = existing.clone();
                item.quantity = item.quantity.checked_add(line.quantity).ok_or_else(|| {
                    AppError::validation(format!("quantity for {} is too large", product.sku))
                })?;
                ItemChange {
                    item,
                    is_new: false,
                }
            }
            None => ItemChange {
                item: JobOrderItem::new(
                    job.id.clone(),
                    product.id.clone(),
                    line.quantity,
                    line.unit_price.unwrap_or(product.selling_price),
                ),
                is_new: true,
            },
        };
        plan.item_changes.push(change);
        plan.products.push(updated);
    }

    if plan.job_order.status == JobStatus::Open {
        plan.job_order.status = JobStatus::InProgress;
        plan.job_order.updated_at = Utc::now();
        plan.promoted = true;
    }

    Ok(plan)
}

fn return_item(
    actor: &SessionUser,
    job: &JobOrder,
    item: &JobOrderItem,
    product: &Product,
) -> Result<(Product, StockTransaction), AppError> {
    let updated = apply_delta(product, item.quantity)?;
    let transaction = StockTransaction::record(
        actor,
        &updated,
        TransactionKind::Adjust,
        item.quantity,
        Some(job.id.clone()),
        Some(format!("returned from {}", job.job_number)),
    );
    Ok((updated, transaction))
}

/// Take an issued item back off a job and return it to stock.
pub fn plan_item_removal(
    actor: &SessionUser,
    job: &JobOrder,
    item: &JobOrderItem,
    product: &Product,
) -> Result<ItemReturnPlan, AppError> {
    job.ensure_workable()?;
    if item.job_order_id != job.id {
        return Err(AppError::not_found(format!(
            "item {} on job order {}",
            item.id, job.job_number
        )));
    }
    if item.product_id != product.id {
        return Err(AppError::not_found(format!("product {}", item.product_id)));
    }
    let (product, transaction) = return_item(actor, job, item, product)?;
    Ok(ItemReturnPlan {
        removed_item_id: item.id.clone(),
        product,
        transaction,
    })
}

/// Cancel a job order, returning every issued item to stock.
pub fn plan_cancellation(
    actor: &SessionUser,
    job: &JobOrder,
    items: &[JobOrderItem],
    products: &[Product],
) -> Result<CancellationPlan, AppError> {
    job.ensure_workable()?;
    let index = index_products(products);

    let mut plan = CancellationPlan {
        job_order: job.clone(),
        removed_item_ids: Vec::with_capacity(items.len()),
        products: Vec::with_capacity(items.len()),
        transactions: Vec::with_capacity(items.len()),
    };
    for item in items {
        let product = lookup(&index, &item.product_id)?;
        let (product, transaction) = return_item(actor, job, item, product)?;
        plan.removed_item_ids.push(item.id.clone());
        plan.products.push(product);
        plan.transactions.push(transaction);
    }

    let now = Utc::now();
    plan.job_order.status = JobStatus::Cancelled;
    plan.job_order.updated_at = now;
    Ok(plan)
}

/// Close a job order and snapshot its bill.
pub fn plan_completion(
    actor: &SessionUser,
    job: &JobOrder,
    items: &[JobOrderItem],
    request: &CompletionRequest,
    vat_rate: Decimal,
    bill_number: String,
    already_billed: bool,
) -> Result<CompletionPlan, AppError> {
    job.ensure_workable()?;
    if already_billed {
        return Err(AppError::Conflict(format!(
            "job order {} already has a bill",
            job.job_number
        )));
    }

    let labor = request.labor_cost.unwrap_or(job.labor_cost);
    let totals = compute_totals(items, labor, vat_rate)?;
    let bill = Bill::issue(
        job.tenant_id.clone(),
        job.id.clone(),
        bill_number,
        totals,
        request.payment_method,
        request.payment_status.unwrap_or(PaymentStatus::Unpaid),
        actor.user_id.clone(),
    );

    let mut job_order = job.clone();
    job_order.labor_cost = totals.labor;
    job_order.status = JobStatus::Completed;
    job_order.updated_at = bill.created_at;
    job_order.completed_at = Some(bill.created_at);

    Ok(CompletionPlan { job_order, bill })
}
