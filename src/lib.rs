pub mod api;
pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod seed;
pub mod store;

// Export API types
pub use api::handlers;
pub use api::routes;

pub use error::{AppError, AppResult};

// Export all model types
pub use model::*;

// Export store types
pub use store::{MemoryStore, PostgresStore, Store};

use axum::Router;

use crate::api::{app_state, create_router, ApiSettings};
use crate::config::{AppConfig, StorageBackend};

/// Build the application router on the configured storage backend, running
/// migrations and (with `LOAD_SEED_DATA=true`) loading the demo shop.
pub async fn build_app(config: &AppConfig) -> anyhow::Result<Router> {
    let settings = ApiSettings::from_config(config);
    let load_seed = std::env::var("LOAD_SEED_DATA").unwrap_or_default() == "true";

    match config.database.backend {
        StorageBackend::Memory => {
            log::info!("Using in-memory storage; data is lost on exit");
            let store = MemoryStore::new();
            if load_seed {
                seed::load_seed_data(&store, config.billing.vat_rate).await?;
            }
            Ok(create_router(app_state(store, settings)))
        }
        StorageBackend::Postgres => {
            log::info!("Connecting to PostgreSQL...");
            let store = PostgresStore::new(
                &config.database_url(),
                config.database.max_connections,
            )
            .await?;

            log::info!("Running database migrations...");
            store.migrate().await?;

            if load_seed {
                log::info!("Loading seed data...");
                seed::load_seed_data(&store, config.billing.vat_rate).await?;
            }
            Ok(create_router(app_state(store, settings)))
        }
    }
}
