use crate::error::AppError;
use crate::model::{
    generate_id, DateRange, Id, JobOrder, JobOrderItem, NewCustomer, Product, SessionUser,
    UnknownVariant,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Purchase,
    Sale,
    Adjust,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Purchase => "PURCHASE",
            TransactionKind::Sale => "SALE",
            TransactionKind::Adjust => "ADJUST",
        }
    }
}

impl FromStr for TransactionKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PURCHASE" => Ok(TransactionKind::Purchase),
            "SALE" => Ok(TransactionKind::Sale),
            "ADJUST" => Ok(TransactionKind::Adjust),
            other => Err(UnknownVariant::new("transaction kind", other)),
        }
    }
}

/// Append-only audit row for one change of a product's stock counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockTransaction {
    pub id: Id,
    pub tenant_id: Id,
    pub product_id: Id,
    pub branch_id: Id,
    /// Signed delta applied to the stock counter.
    pub quantity: i32,
    pub kind: TransactionKind,
    pub job_order_id: Option<Id>,
    /// Stock counter value right after this row's delta was applied.
    pub balance_after: i32,
    pub note: Option<String>,
    pub created_by: Id,
    pub created_at: DateTime<Utc>,
}

impl StockTransaction {
    /// Record a delta that has already been applied to `product`.
    pub fn record(
        actor: &SessionUser,
        product: &Product,
        kind: TransactionKind,
        quantity: i32,
        job_order_id: Option<Id>,
        note: Option<String>,
    ) -> Self {
        Self {
            id: generate_id(),
            tenant_id: product.tenant_id.clone(),
            product_id: product.id.clone(),
            branch_id: product.branch_id.clone(),
            quantity,
            kind,
            job_order_id,
            balance_after: product.stock_quantity,
            note,
            created_by: actor.user_id.clone(),
            created_at: Utc::now(),
        }
    }
}

/// One requested movement line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockLine {
    pub product_id: Id,
    pub quantity: i32,
    /// Only meaningful for issues; overrides the product's selling price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StockInRequest {
    pub lines: Vec<StockLine>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StockAdjustRequest {
    pub product_id: Id,
    pub counted_quantity: i32,
    pub note: Option<String>,
}

/// Walk-in issue: the customer and job order are found or created in the
/// same transaction as the stock movement.
#[derive(Debug, Clone, Deserialize)]
pub struct WalkIn {
    pub branch_id: Id,
    pub customer: NewCustomer,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub enum StockOutTarget {
    JobOrder(Id),
    WalkIn(WalkIn),
}

#[derive(Debug, Clone, Deserialize)]
pub struct StockOutRequest {
    pub job_order_id: Option<Id>,
    pub walk_in: Option<WalkIn>,
    pub lines: Vec<StockLine>,
}

impl StockOutRequest {
    pub fn into_parts(self) -> Result<(StockOutTarget, Vec<StockLine>), AppError> {
        let target = match (self.job_order_id, self.walk_in) {
            (Some(id), None) => StockOutTarget::JobOrder(id),
            (None, Some(walk_in)) => StockOutTarget::WalkIn(walk_in),
            (Some(_), Some(_)) => {
                return Err(AppError::Validation(
                    "give either job_order_id or walk_in, not both".to_string(),
                ))
            }
            (None, None) => {
                return Err(AppError::Validation(
                    "job_order_id or walk_in is required".to_string(),
                ))
            }
        };
        Ok((target, self.lines))
    }
}

/// Body of `POST /job-orders/:id/stock-out`.
#[derive(Debug, Clone, Deserialize)]
pub struct IssueRequest {
    pub lines: Vec<StockLine>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StockOutReceipt {
    pub job_order: JobOrder,
    pub items: Vec<JobOrderItem>,
    pub transactions: Vec<StockTransaction>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StockTransactionFilter {
    pub product_id: Option<Id>,
    pub job_order_id: Option<Id>,
    pub kind: Option<TransactionKind>,
    #[serde(flatten)]
    pub range: DateRange,
}

impl StockTransactionFilter {
    pub fn matches(&self, txn: &StockTransaction) -> bool {
        self.product_id.as_ref().map_or(true, |id| &txn.product_id == id)
            && self
                .job_order_id
                .as_ref()
                .map_or(true, |id| txn.job_order_id.as_ref() == Some(id))
            && self.kind.map_or(true, |kind| txn.kind == kind)
            && self.range.contains(&txn.created_at)
    }
}
