use axum::{
    extract::{Query, State},
    response::Json,
};

use crate::api::handlers::{AppState, ListResponse};
use crate::error::AppError;
use crate::logic::{low_stock, product_movements, sales_summary};
use crate::model::{
    BillFilter, DateRange, LowStockEntry, ProductFilter, ProductMovement, Role, SalesSummary,
    SessionUser, StockTransactionFilter,
};
use crate::store::traits::Store;

/// GET /reports/sales?from&to
pub async fn sales_report<S: Store>(
    State(state): State<AppState<S>>,
    actor: SessionUser,
    Query(range): Query<DateRange>,
) -> Result<Json<SalesSummary>, AppError> {
    actor.require_role(Role::Manager)?;
    let filter = BillFilter {
        payment_status: None,
        range,
    };
    let bills = state.store.list_bills(&actor.tenant_id, &filter).await?;
    Ok(Json(sales_summary(&bills)))
}

/// GET /reports/low-stock
pub async fn low_stock_report<S: Store>(
    State(state): State<AppState<S>>,
    actor: SessionUser,
) -> Result<Json<ListResponse<LowStockEntry>>, AppError> {
    actor.require_role(Role::Manager)?;
    let products = state
        .store
        .list_products(&actor.tenant_id, &ProductFilter::default())
        .await?;
    Ok(Json(low_stock(&products).into()))
}

/// GET /reports/stock-movements?from&to
pub async fn stock_movement_report<S: Store>(
    State(state): State<AppState<S>>,
    actor: SessionUser,
    Query(range): Query<DateRange>,
) -> Result<Json<ListResponse<ProductMovement>>, AppError> {
    actor.require_role(Role::Manager)?;
    let filter = StockTransactionFilter {
        range,
        ..Default::default()
    };
    let rows = state
        .store
        .list_stock_transactions(&actor.tenant_id, &filter)
        .await?;
    let products = state
        .store
        .list_products(
            &actor.tenant_id,
            &ProductFilter {
                include_inactive: true,
                ..Default::default()
            },
        )
        .await?;
    Ok(Json(product_movements(&rows, &products).into()))
}
