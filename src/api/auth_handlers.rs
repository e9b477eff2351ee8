use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    Json as RequestJson,
};
use chrono::Utc;
use serde::Serialize;

use crate::api::handlers::AppState;
use crate::api::session::{cookie_value, expired_cookie, session_cookie};
use crate::error::AppError;
use crate::logic::{
    generate_session_token, hash_password, hash_token, validate_password, verify_password,
};
use crate::model::{
    normalize_username, Branch, LoginRequest, Role, Session, SessionUser, Tenant,
    TenantRegistration, User,
};
use crate::store::traits::Store;

#[derive(Debug, Serialize)]
pub struct RegistrationResponse {
    pub tenant: Tenant,
    pub branch: Branch,
    pub admin: User,
}

/// POST /tenants
/// Register a shop with its first branch and admin account.
pub async fn register_tenant<S: Store>(
    State(state): State<AppState<S>>,
    RequestJson(req): RequestJson<TenantRegistration>,
) -> Result<(StatusCode, Json<RegistrationResponse>), AppError> {
    let shop_name = req.shop_name.trim();
    if shop_name.is_empty() {
        return Err(AppError::validation("shop_name is required"));
    }
    if normalize_username(&req.admin.username).is_empty() {
        return Err(AppError::validation("admin username is required"));
    }
    validate_password(&req.admin.password)?;

    let tenant = Tenant::new(shop_name.to_string());
    let branch_name = req
        .branch_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or("Main")
        .to_string();
    let branch = Branch::new(tenant.id.clone(), branch_name, None);
    let admin = User::new(
        tenant.id.clone(),
        Some(branch.id.clone()),
        &req.admin.username,
        req.admin.display_name,
        hash_password(&req.admin.password),
        Role::Admin,
    );

    state
        .store
        .register_tenant(tenant.clone(), branch.clone(), admin.clone())
        .await?;
    log::info!(
        "registered tenant {} ({}) with admin {}",
        tenant.id,
        tenant.name,
        admin.username
    );

    Ok((
        StatusCode::CREATED,
        Json(RegistrationResponse {
            tenant,
            branch,
            admin,
        }),
    ))
}

/// POST /auth/login
pub async fn login<S: Store>(
    State(state): State<AppState<S>>,
    RequestJson(req): RequestJson<LoginRequest>,
) -> Result<Response, AppError> {
    let username = normalize_username(&req.username);
    let user = state
        .store
        .find_user_by_username(&username)
        .await?
        .filter(|user| user.is_active && verify_password(&req.password, &user.password_hash))
        .ok_or_else(|| {
            log::warn!("failed login for '{}'", username);
            AppError::Unauthorized
        })?;

    let now = Utc::now();
    let purged = state.store.delete_expired_sessions(now).await?;
    if purged > 0 {
        log::debug!("purged {} expired sessions", purged);
    }

    let token = generate_session_token();
    state
        .store
        .insert_session(Session {
            token_hash: hash_token(&token),
            user_id: user.id.clone(),
            tenant_id: user.tenant_id.clone(),
            created_at: now,
            expires_at: now + state.settings.session_ttl,
        })
        .await?;
    log::info!("user {} signed in to tenant {}", user.username, user.tenant_id);

    let cookie = session_cookie(&state.settings, &token)?;
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(SessionUser::from_user(&user)),
    )
        .into_response())
}

/// POST /auth/logout
pub async fn logout<S: Store>(
    State(state): State<AppState<S>>,
    actor: SessionUser,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    if let Some(token) = cookie_value(&headers, &state.settings.cookie_name) {
        state.store.delete_session(&hash_token(&token)).await?;
    }
    log::info!("user {} signed out", actor.username);

    let cookie = expired_cookie(&state.settings)?;
    Ok((StatusCode::NO_CONTENT, [(header::SET_COOKIE, cookie)]).into_response())
}

/// GET /auth/me
pub async fn me(actor: SessionUser) -> Json<SessionUser> {
    Json(actor)
}
