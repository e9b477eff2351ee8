use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use crate::api::handlers::{ApiSettings, AppState};
use crate::error::AppError;
use crate::logic::hash_token;
use crate::model::SessionUser;
use crate::store::traits::Store;

/// Handlers behind `require_session` take the caller as an argument.
#[async_trait]
impl<S> FromRequestParts<S> for SessionUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionUser>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

/// Resolve the session cookie to an active user or answer 401.
pub async fn require_session<S: Store>(
    State(state): State<AppState<S>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = cookie_value(request.headers(), &state.settings.cookie_name)
        .ok_or(AppError::Unauthorized)?;
    let actor = resolve_session(&state.store, &token).await?;
    request.extensions_mut().insert(actor);
    Ok(next.run(request).await)
}

pub async fn resolve_session<S: Store>(store: &S, token: &str) -> Result<SessionUser, AppError> {
    let token_hash = hash_token(token);
    let session = store
        .get_session(&token_hash)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if session.is_expired(Utc::now()) {
        store.delete_session(&token_hash).await?;
        return Err(AppError::Unauthorized);
    }

    match store.get_user(&session.user_id).await? {
        Some(user) if user.is_active && user.tenant_id == session.tenant_id => {
            Ok(SessionUser::from_user(&user))
        }
        _ => Err(AppError::Unauthorized),
    }
}

/// Value of a named cookie across every `Cookie` header.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

pub fn session_cookie(settings: &ApiSettings, token: &str) -> Result<HeaderValue, AppError> {
    build_cookie(settings, token, settings.session_ttl.num_seconds())
}

pub fn expired_cookie(settings: &ApiSettings) -> Result<HeaderValue, AppError> {
    build_cookie(settings, "", 0)
}

fn build_cookie(
    settings: &ApiSettings,
    value: &str,
    max_age: i64,
) -> Result<HeaderValue, AppError> {
    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        settings.cookie_name, value, max_age
    );
    if settings.secure_cookie {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid cookie header: {}", e)))
}
