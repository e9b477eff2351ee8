use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    Json as RequestJson,
};

use crate::api::handlers::{found, AppState, ListResponse};
use crate::error::AppError;
use crate::model::{
    Role, SessionUser, StockAdjustRequest, StockInRequest, StockLine, StockOutReceipt,
    StockOutRequest, StockOutTarget, StockTransaction, StockTransactionFilter,
};
use crate::store::traits::Store;

/// POST /stock/in
pub async fn stock_in<S: Store>(
    State(state): State<AppState<S>>,
    actor: SessionUser,
    RequestJson(req): RequestJson<StockInRequest>,
) -> Result<(StatusCode, Json<ListResponse<StockTransaction>>), AppError> {
    actor.require_role(Role::Manager)?;
    let rows = state
        .store
        .stock_in(&actor, &req.lines, req.note.as_deref())
        .await?;
    log::info!(
        "tenant {}: {} received stock for {} products",
        actor.tenant_id,
        actor.username,
        rows.len()
    );
    Ok((StatusCode::CREATED, Json(rows.into())))
}

/// POST /stock/adjust
pub async fn adjust_stock<S: Store>(
    State(state): State<AppState<S>>,
    actor: SessionUser,
    RequestJson(req): RequestJson<StockAdjustRequest>,
) -> Result<(StatusCode, Json<StockTransaction>), AppError> {
    actor.require_role(Role::Manager)?;
    let row = state
        .store
        .adjust_stock(&actor, &req.product_id, req.counted_quantity, req.note.as_deref())
        .await?;
    log::info!(
        "tenant {}: {} adjusted product {} by {} to {}",
        actor.tenant_id,
        actor.username,
        row.product_id,
        row.quantity,
        row.balance_after
    );
    Ok((StatusCode::CREATED, Json(row)))
}

/// POST /stock/out
/// Issue parts to an existing job order or to a walk-in customer.
pub async fn stock_out<S: Store>(
    State(state): State<AppState<S>>,
    actor: SessionUser,
    RequestJson(req): RequestJson<StockOutRequest>,
) -> Result<(StatusCode, Json<StockOutReceipt>), AppError> {
    let (target, lines) = req.into_parts()?;
    let receipt = issue_stock(&state.store, &actor, target, &lines).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

pub(crate) async fn issue_stock<S: Store>(
    store: &S,
    actor: &SessionUser,
    target: StockOutTarget,
    lines: &[StockLine],
) -> Result<StockOutReceipt, AppError> {
    match &target {
        StockOutTarget::JobOrder(job_id) => {
            let job = found(
                store.get_job_order(&actor.tenant_id, job_id).await?,
                format!("job order {}", job_id),
            )?;
            actor.require_branch(&job.branch_id)?;
        }
        StockOutTarget::WalkIn(walk_in) => actor.require_branch(&walk_in.branch_id)?,
    }

    let receipt = store.stock_out(actor, target, lines).await?;
    log::info!(
        "tenant {}: {} issued {} lines to {} ({})",
        actor.tenant_id,
        actor.username,
        receipt.transactions.len(),
        receipt.job_order.job_number,
        receipt.job_order.status
    );
    Ok(receipt)
}

/// GET /stock/transactions
pub async fn list_stock_transactions<S: Store>(
    State(state): State<AppState<S>>,
    actor: SessionUser,
    Query(filter): Query<StockTransactionFilter>,
) -> Result<Json<ListResponse<StockTransaction>>, AppError> {
    let rows = state
        .store
        .list_stock_transactions(&actor.tenant_id, &filter)
        .await?;
    Ok(Json(rows.into()))
}
