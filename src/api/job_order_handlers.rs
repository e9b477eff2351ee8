use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Json as RequestJson,
};

use crate::api::handlers::{found, resolve_branch, AppState, ListResponse};
use crate::api::stock_handlers::issue_stock;
use crate::error::AppError;
use crate::model::{
    Bill, CompletionRequest, Id, IssueRequest, JobOrder, JobOrderDetail, JobOrderFilter,
    JobOrderUpdate, NewJobOrder, Role, SessionUser, StockOutReceipt, StockOutTarget,
    StockTransaction,
};
use crate::store::traits::Store;

/// Load a job order the caller may work on.
async fn workable_job<S: Store>(
    store: &S,
    actor: &SessionUser,
    job_id: &Id,
) -> Result<JobOrder, AppError> {
    let job = found(
        store.get_job_order(&actor.tenant_id, job_id).await?,
        format!("job order {}", job_id),
    )?;
    actor.require_branch(&job.branch_id)?;
    Ok(job)
}

/// GET /job-orders
pub async fn list_job_orders<S: Store>(
    State(state): State<AppState<S>>,
    actor: SessionUser,
    Query(mut filter): Query<JobOrderFilter>,
) -> Result<Json<ListResponse<JobOrder>>, AppError> {
    if let Some(branch_id) = &filter.branch_id {
        actor.require_branch(branch_id)?;
    } else if actor.role == Role::Staff {
        filter.branch_id = actor.branch_id.clone();
    }
    let jobs = state.store.list_job_orders(&actor.tenant_id, &filter).await?;
    Ok(Json(jobs.into()))
}

/// POST /job-orders
pub async fn create_job_order<S: Store>(
    State(state): State<AppState<S>>,
    actor: SessionUser,
    RequestJson(req): RequestJson<NewJobOrder>,
) -> Result<(StatusCode, Json<JobOrder>), AppError> {
    let branch_id = resolve_branch(&actor, req.branch_id)?;
    let job = state
        .store
        .open_job_order(&actor, &branch_id, req.customer, req.description)
        .await?;
    log::info!(
        "tenant {}: {} opened job order {}",
        actor.tenant_id,
        actor.username,
        job.job_number
    );
    Ok((StatusCode::CREATED, Json(job)))
}

/// GET /job-orders/:id
/// The job with its customer, issued items and bill (once completed).
pub async fn get_job_order<S: Store>(
    State(state): State<AppState<S>>,
    actor: SessionUser,
    Path(job_id): Path<Id>,
) -> Result<Json<JobOrderDetail>, AppError> {
    let job_order = found(
        state.store.get_job_order(&actor.tenant_id, &job_id).await?,
        format!("job order {}", job_id),
    )?;
    let customer = state
        .store
        .get_customer(&actor.tenant_id, &job_order.customer_id)
        .await?;
    let items = state.store.list_job_order_items(&job_order.id).await?;
    let bill = state
        .store
        .get_bill_for_job(&actor.tenant_id, &job_order.id)
        .await?;

    Ok(Json(JobOrderDetail {
        job_order,
        customer,
        items,
        bill,
    }))
}

/// PATCH /job-orders/:id
pub async fn update_job_order<S: Store>(
    State(state): State<AppState<S>>,
    actor: SessionUser,
    Path(job_id): Path<Id>,
    RequestJson(req): RequestJson<JobOrderUpdate>,
) -> Result<Json<JobOrder>, AppError> {
    let job = state
        .store
        .update_job_details(&actor, &job_id, &req)
        .await?;
    log::info!(
        "tenant {}: {} updated job order {}",
        actor.tenant_id,
        actor.username,
        job.job_number
    );
    Ok(Json(job))
}

/// POST /job-orders/:id/stock-out
pub async fn issue_to_job_order<S: Store>(
    State(state): State<AppState<S>>,
    actor: SessionUser,
    Path(job_id): Path<Id>,
    RequestJson(req): RequestJson<IssueRequest>,
) -> Result<(StatusCode, Json<StockOutReceipt>), AppError> {
    let receipt = issue_stock(
        &state.store,
        &actor,
        StockOutTarget::JobOrder(job_id),
        &req.lines,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// DELETE /job-orders/:id/items/:item_id
pub async fn remove_job_item<S: Store>(
    State(state): State<AppState<S>>,
    actor: SessionUser,
    Path((job_id, item_id)): Path<(Id, Id)>,
) -> Result<Json<StockTransaction>, AppError> {
    workable_job(&state.store, &actor, &job_id).await?;
    let row = state
        .store
        .remove_job_item(&actor, &job_id, &item_id)
        .await?;
    log::info!(
        "tenant {}: {} returned {} of product {} from job order {}",
        actor.tenant_id,
        actor.username,
        row.quantity,
        row.product_id,
        job_id
    );
    Ok(Json(row))
}

/// POST /job-orders/:id/complete
pub async fn complete_job_order<S: Store>(
    State(state): State<AppState<S>>,
    actor: SessionUser,
    Path(job_id): Path<Id>,
    RequestJson(req): RequestJson<CompletionRequest>,
) -> Result<(StatusCode, Json<Bill>), AppError> {
    workable_job(&state.store, &actor, &job_id).await?;
    let bill = state
        .store
        .complete_job_order(&actor, &job_id, &req, state.settings.vat_rate)
        .await?;
    log::info!(
        "tenant {}: {} completed job order {} with bill {} for {}",
        actor.tenant_id,
        actor.username,
        job_id,
        bill.bill_number,
        bill.grand_total
    );
    Ok((StatusCode::CREATED, Json(bill)))
}

/// POST /job-orders/:id/cancel
pub async fn cancel_job_order<S: Store>(
    State(state): State<AppState<S>>,
    actor: SessionUser,
    Path(job_id): Path<Id>,
) -> Result<Json<JobOrder>, AppError> {
    actor.require_role(Role::Manager)?;
    let job = state.store.cancel_job_order(&actor, &job_id).await?;
    log::info!(
        "tenant {}: {} cancelled job order {}",
        actor.tenant_id,
        actor.username,
        job.job_number
    );
    Ok(Json(job))
}
