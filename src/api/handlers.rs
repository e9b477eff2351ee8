use axum::response::Json;
use chrono::Duration;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::model::{Id, SessionUser};

/// Request-independent settings the handlers need.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub cookie_name: String,
    pub session_ttl: Duration,
    pub secure_cookie: bool,
    pub vat_rate: Decimal,
    pub static_dir: Option<String>,
}

impl ApiSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            cookie_name: config.auth.cookie_name.clone(),
            session_ttl: Duration::hours(config.auth.session_ttl_hours),
            secure_cookie: config.auth.secure_cookie,
            vat_rate: config.billing.vat_rate,
            static_dir: config.server.static_dir.clone(),
        }
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

pub struct AppContext<S> {
    pub store: S,
    pub settings: ApiSettings,
}

pub type AppState<S> = Arc<AppContext<S>>;

pub fn app_state<S>(store: S, settings: ApiSettings) -> AppState<S> {
    Arc::new(AppContext { store, settings })
}

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(items: Vec<T>) -> Self {
        let total = items.len();
        Self { items, total }
    }
}

/// Branch a request works in: the explicit one, else the caller's own.
pub fn resolve_branch(actor: &SessionUser, requested: Option<Id>) -> Result<Id, AppError> {
    let branch_id = requested
        .or_else(|| actor.branch_id.clone())
        .ok_or_else(|| AppError::validation("branch_id is required"))?;
    actor.require_branch(&branch_id)?;
    Ok(branch_id)
}

/// Turn a missing row into a 404 for the given description.
pub fn found<T>(row: Option<T>, what: impl Into<String>) -> Result<T, AppError> {
    row.ok_or_else(|| AppError::not_found(what))
}
