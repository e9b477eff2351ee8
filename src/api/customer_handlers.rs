use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Json as RequestJson,
};

use crate::api::handlers::{found, AppState, ListResponse};
use crate::error::AppError;
use crate::model::{Customer, CustomerFilter, CustomerUpdate, Id, NewCustomer, SessionUser};
use crate::store::traits::Store;

/// GET /customers?q=
pub async fn list_customers<S: Store>(
    State(state): State<AppState<S>>,
    actor: SessionUser,
    Query(filter): Query<CustomerFilter>,
) -> Result<Json<ListResponse<Customer>>, AppError> {
    let customers = state.store.list_customers(&actor.tenant_id, &filter).await?;
    Ok(Json(customers.into()))
}

/// GET /customers/:id
pub async fn get_customer<S: Store>(
    State(state): State<AppState<S>>,
    actor: SessionUser,
    Path(customer_id): Path<Id>,
) -> Result<Json<Customer>, AppError> {
    let customer = state.store.get_customer(&actor.tenant_id, &customer_id).await?;
    Ok(Json(found(customer, format!("customer {}", customer_id))?))
}

/// POST /customers
/// Returns the existing customer when the plate is already known.
pub async fn create_customer<S: Store>(
    State(state): State<AppState<S>>,
    actor: SessionUser,
    RequestJson(req): RequestJson<NewCustomer>,
) -> Result<(StatusCode, Json<Customer>), AppError> {
    let (customer, created) = state
        .store
        .find_or_create_customer(&actor.tenant_id, req)
        .await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(customer)))
}

/// PATCH /customers/:id
pub async fn update_customer<S: Store>(
    State(state): State<AppState<S>>,
    actor: SessionUser,
    Path(customer_id): Path<Id>,
    RequestJson(req): RequestJson<CustomerUpdate>,
) -> Result<Json<Customer>, AppError> {
    let mut customer = found(
        state.store.get_customer(&actor.tenant_id, &customer_id).await?,
        format!("customer {}", customer_id),
    )?;
    req.apply_to(&mut customer);
    if customer.plate_number.is_empty() {
        return Err(AppError::validation("plate number is required"));
    }
    if customer.name.is_empty() {
        return Err(AppError::validation("customer name is required"));
    }

    state.store.update_customer(customer.clone()).await?;
    Ok(Json(customer))
}
