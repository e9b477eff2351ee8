use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Json as RequestJson,
};
use rust_decimal::Decimal;

use crate::api::handlers::{found, resolve_branch, AppState, ListResponse};
use crate::error::AppError;
use crate::logic::{normalize_code, normalize_sku};
use crate::model::{
    check_money, Category, Id, NewCategory, NewProduct, Product, ProductFilter, ProductUpdate,
    Role, SessionUser, DEFAULT_SKU_PREFIX,
};
use crate::store::traits::Store;

/// GET /categories
pub async fn list_categories<S: Store>(
    State(state): State<AppState<S>>,
    actor: SessionUser,
) -> Result<Json<ListResponse<Category>>, AppError> {
    let categories = state.store.list_categories(&actor.tenant_id).await?;
    Ok(Json(categories.into()))
}

/// POST /categories
pub async fn create_category<S: Store>(
    State(state): State<AppState<S>>,
    actor: SessionUser,
    RequestJson(req): RequestJson<NewCategory>,
) -> Result<(StatusCode, Json<Category>), AppError> {
    actor.require_role(Role::Manager)?;
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::validation("category name is required"));
    }
    let code = normalize_code(&req.code)?;

    let category = Category::new(actor.tenant_id.clone(), name.to_string(), code);
    state.store.insert_category(category.clone()).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// GET /products
pub async fn list_products<S: Store>(
    State(state): State<AppState<S>>,
    actor: SessionUser,
    Query(filter): Query<ProductFilter>,
) -> Result<Json<ListResponse<Product>>, AppError> {
    let products = state.store.list_products(&actor.tenant_id, &filter).await?;
    Ok(Json(products.into()))
}

/// GET /products/:id
pub async fn get_product<S: Store>(
    State(state): State<AppState<S>>,
    actor: SessionUser,
    Path(product_id): Path<Id>,
) -> Result<Json<Product>, AppError> {
    let product = state.store.get_product(&actor.tenant_id, &product_id).await?;
    Ok(Json(found(product, format!("product {}", product_id))?))
}

fn validate_pricing(
    cost_price: Decimal,
    selling_price: Decimal,
    reorder_level: i32,
) -> Result<(), AppError> {
    if cost_price < Decimal::ZERO || selling_price < Decimal::ZERO {
        return Err(AppError::validation("prices cannot be negative"));
    }
    check_money(cost_price, "cost_price")?;
    check_money(selling_price, "selling_price")?;
    if reorder_level < 0 {
        return Err(AppError::validation("reorder_level cannot be negative"));
    }
    Ok(())
}

/// POST /products
/// SKUs are numbered from the category code when none is given.
pub async fn create_product<S: Store>(
    State(state): State<AppState<S>>,
    actor: SessionUser,
    RequestJson(req): RequestJson<NewProduct>,
) -> Result<(StatusCode, Json<Product>), AppError> {
    actor.require_role(Role::Manager)?;
    if req.name.trim().is_empty() {
        return Err(AppError::validation("product name is required"));
    }
    validate_pricing(req.cost_price, req.selling_price, req.reorder_level)?;

    let branch_id = resolve_branch(&actor, req.branch_id.clone())?;
    found(
        state.store.get_branch(&actor.tenant_id, &branch_id).await?,
        format!("branch {}", branch_id),
    )?;

    let sku_prefix = match &req.category_id {
        Some(category_id) => {
            found(
                state.store.get_category(&actor.tenant_id, category_id).await?,
                format!("category {}", category_id),
            )?
            .code
        }
        None => DEFAULT_SKU_PREFIX.to_string(),
    };
    let sku = match req.sku.as_deref().map(str::trim) {
        Some(sku) if !sku.is_empty() => normalize_sku(sku)?,
        _ => String::new(),
    };

    let opening_stock = req.opening_stock;
    let product = req.into_product(actor.tenant_id.clone(), branch_id, sku);
    let product = state
        .store
        .create_product(&actor, product, &sku_prefix, opening_stock)
        .await?;
    log::info!(
        "tenant {}: {} created product {} with opening stock {}",
        actor.tenant_id,
        actor.username,
        product.sku,
        opening_stock
    );
    Ok((StatusCode::CREATED, Json(product)))
}

/// PATCH /products/:id
/// Catalog fields only; stock moves through the ledger endpoints.
pub async fn update_product<S: Store>(
    State(state): State<AppState<S>>,
    actor: SessionUser,
    Path(product_id): Path<Id>,
    RequestJson(req): RequestJson<ProductUpdate>,
) -> Result<Json<Product>, AppError> {
    actor.require_role(Role::Manager)?;
    let mut product = found(
        state.store.get_product(&actor.tenant_id, &product_id).await?,
        format!("product {}", product_id),
    )?;
    if let Some(category_id) = &req.category_id {
        found(
            state.store.get_category(&actor.tenant_id, category_id).await?,
            format!("category {}", category_id),
        )?;
    }
    if req.name.as_deref().map_or(false, |n| n.trim().is_empty()) {
        return Err(AppError::validation("product name cannot be empty"));
    }

    req.apply_to(&mut product);
    validate_pricing(product.cost_price, product.selling_price, product.reorder_level)?;
    state.store.update_product(product.clone()).await?;
    Ok(Json(product))
}

/// DELETE /products/:id
/// Soft delete; ledger history keeps pointing at the product.
pub async fn deactivate_product<S: Store>(
    State(state): State<AppState<S>>,
    actor: SessionUser,
    Path(product_id): Path<Id>,
) -> Result<StatusCode, AppError> {
    actor.require_role(Role::Manager)?;
    let mut product = found(
        state.store.get_product(&actor.tenant_id, &product_id).await?,
        format!("product {}", product_id),
    )?;
    product.is_active = false;
    product.updated_at = chrono::Utc::now();
    state.store.update_product(product).await?;
    log::info!(
        "tenant {}: {} deactivated product {}",
        actor.tenant_id,
        actor.username,
        product_id
    );
    Ok(StatusCode::NO_CONTENT)
}
