use axum::{
    extract::{Path, Query, State},
    response::Json,
    Json as RequestJson,
};

use crate::api::handlers::{found, AppState, ListResponse};
use crate::error::AppError;
use crate::model::{Bill, BillFilter, Id, PayBillRequest, Role, SessionUser};
use crate::store::traits::Store;

/// GET /bills?payment_status&from&to
pub async fn list_bills<S: Store>(
    State(state): State<AppState<S>>,
    actor: SessionUser,
    Query(filter): Query<BillFilter>,
) -> Result<Json<ListResponse<Bill>>, AppError> {
    let bills = state.store.list_bills(&actor.tenant_id, &filter).await?;
    Ok(Json(bills.into()))
}

/// GET /bills/:id
pub async fn get_bill<S: Store>(
    State(state): State<AppState<S>>,
    actor: SessionUser,
    Path(bill_id): Path<Id>,
) -> Result<Json<Bill>, AppError> {
    let bill = state.store.get_bill(&actor.tenant_id, &bill_id).await?;
    Ok(Json(found(bill, format!("bill {}", bill_id))?))
}

/// POST /bills/:id/pay
pub async fn pay_bill<S: Store>(
    State(state): State<AppState<S>>,
    actor: SessionUser,
    Path(bill_id): Path<Id>,
    RequestJson(req): RequestJson<PayBillRequest>,
) -> Result<Json<Bill>, AppError> {
    actor.require_role(Role::Manager)?;
    let bill = state
        .store
        .mark_bill_paid(&actor.tenant_id, &bill_id, req.payment_method)
        .await?;
    log::info!(
        "tenant {}: {} recorded payment of {} by {}",
        actor.tenant_id,
        actor.username,
        bill.bill_number,
        bill.payment_method.as_str()
    );
    Ok(Json(bill))
}
