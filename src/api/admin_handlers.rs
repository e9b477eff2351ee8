use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    Json as RequestJson,
};

use crate::api::handlers::{found, AppState, ListResponse};
use crate::error::AppError;
use crate::logic::{hash_password, validate_password};
use crate::model::{
    normalize_username, Branch, Id, NewBranch, NewUser, Role, SessionUser, User, UserUpdate,
};
use crate::store::traits::Store;

/// GET /branches
pub async fn list_branches<S: Store>(
    State(state): State<AppState<S>>,
    actor: SessionUser,
) -> Result<Json<ListResponse<Branch>>, AppError> {
    let branches = state.store.list_branches(&actor.tenant_id).await?;
    Ok(Json(branches.into()))
}

/// POST /branches
pub async fn create_branch<S: Store>(
    State(state): State<AppState<S>>,
    actor: SessionUser,
    RequestJson(req): RequestJson<NewBranch>,
) -> Result<(StatusCode, Json<Branch>), AppError> {
    actor.require_role(Role::Admin)?;
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::validation("branch name is required"));
    }

    let branch = Branch::new(actor.tenant_id.clone(), name.to_string(), req.address);
    state.store.insert_branch(branch.clone()).await?;
    log::info!("tenant {}: {} opened branch {}", actor.tenant_id, actor.username, branch.name);
    Ok((StatusCode::CREATED, Json(branch)))
}

/// GET /users
pub async fn list_users<S: Store>(
    State(state): State<AppState<S>>,
    actor: SessionUser,
) -> Result<Json<ListResponse<User>>, AppError> {
    actor.require_role(Role::Admin)?;
    let users = state.store.list_users(&actor.tenant_id).await?;
    Ok(Json(users.into()))
}

/// POST /users
pub async fn create_user<S: Store>(
    State(state): State<AppState<S>>,
    actor: SessionUser,
    RequestJson(req): RequestJson<NewUser>,
) -> Result<(StatusCode, Json<User>), AppError> {
    actor.require_role(Role::Admin)?;
    if normalize_username(&req.username).is_empty() {
        return Err(AppError::validation("username is required"));
    }
    validate_password(&req.password)?;
    if let Some(branch_id) = &req.branch_id {
        found(
            state.store.get_branch(&actor.tenant_id, branch_id).await?,
            format!("branch {}", branch_id),
        )?;
    }

    let user = User::new(
        actor.tenant_id.clone(),
        req.branch_id,
        &req.username,
        req.display_name,
        hash_password(&req.password),
        req.role,
    );
    state.store.insert_user(user.clone()).await?;
    log::info!(
        "tenant {}: {} created {} user {}",
        actor.tenant_id,
        actor.username,
        user.role.as_str(),
        user.username
    );
    Ok((StatusCode::CREATED, Json(user)))
}

/// PATCH /users/:id
pub async fn update_user<S: Store>(
    State(state): State<AppState<S>>,
    actor: SessionUser,
    Path(user_id): Path<Id>,
    RequestJson(req): RequestJson<UserUpdate>,
) -> Result<Json<User>, AppError> {
    actor.require_role(Role::Admin)?;
    let mut user = state
        .store
        .get_user(&user_id)
        .await?
        .filter(|u| u.tenant_id == actor.tenant_id)
        .ok_or_else(|| AppError::not_found(format!("user {}", user_id)))?;

    if user.id == actor.user_id
        && (req.is_active == Some(false) || req.role.map_or(false, |r| r < Role::Admin))
    {
        return Err(AppError::Conflict(
            "administrators cannot deactivate or demote themselves".to_string(),
        ));
    }

    if let Some(branch_id) = req.branch_id {
        found(
            state.store.get_branch(&actor.tenant_id, &branch_id).await?,
            format!("branch {}", branch_id),
        )?;
        user.branch_id = Some(branch_id);
    }
    if let Some(display_name) = req.display_name {
        user.display_name = display_name;
    }
    if let Some(role) = req.role {
        user.role = role;
    }
    if let Some(is_active) = req.is_active {
        user.is_active = is_active;
    }
    if let Some(password) = req.password {
        validate_password(&password)?;
        user.password_hash = hash_password(&password);
    }

    state.store.update_user(user.clone()).await?;
    log::info!(
        "tenant {}: {} updated user {}",
        actor.tenant_id,
        actor.username,
        user.username
    );
    Ok(Json(user))
}
