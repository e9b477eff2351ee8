use axum::{
    middleware,
    routing::{delete, get, patch, post},
    Router,
};
use tower_http::services::ServeDir;

use crate::api::handlers::{self, AppState};
use crate::api::{
    admin_handlers, auth_handlers, billing_handlers, catalog_handlers, customer_handlers,
    job_order_handlers, report_handlers, session, stock_handlers,
};
use crate::store::traits::Store;

pub fn create_router<S: Store + 'static>(state: AppState<S>) -> Router {
    let public = Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Shop registration and sign-in
        .route("/tenants", post(auth_handlers::register_tenant::<S>))
        .route("/auth/login", post(auth_handlers::login::<S>));

    let protected = Router::new()
        .route("/auth/logout", post(auth_handlers::logout::<S>))
        .route("/auth/me", get(auth_handlers::me))
        // Shop administration
        .route(
            "/branches",
            get(admin_handlers::list_branches::<S>).post(admin_handlers::create_branch::<S>),
        )
        .route(
            "/users",
            get(admin_handlers::list_users::<S>).post(admin_handlers::create_user::<S>),
        )
        .route("/users/:id", patch(admin_handlers::update_user::<S>))
        // Catalog
        .route(
            "/categories",
            get(catalog_handlers::list_categories::<S>)
                .post(catalog_handlers::create_category::<S>),
        )
        .route(
            "/products",
            get(catalog_handlers::list_products::<S>).post(catalog_handlers::create_product::<S>),
        )
        .route(
            "/products/:id",
            get(catalog_handlers::get_product::<S>)
                .patch(catalog_handlers::update_product::<S>)
                .delete(catalog_handlers::deactivate_product::<S>),
        )
        // Stock ledger
        .route("/stock/in", post(stock_handlers::stock_in::<S>))
        .route("/stock/adjust", post(stock_handlers::adjust_stock::<S>))
        .route("/stock/out", post(stock_handlers::stock_out::<S>))
        .route(
            "/stock/transactions",
            get(stock_handlers::list_stock_transactions::<S>),
        )
        // Customers
        .route(
            "/customers",
            get(customer_handlers::list_customers::<S>)
                .post(customer_handlers::create_customer::<S>),
        )
        .route(
            "/customers/:id",
            get(customer_handlers::get_customer::<S>)
                .patch(customer_handlers::update_customer::<S>),
        )
        // Job orders
        .route(
            "/job-orders",
            get(job_order_handlers::list_job_orders::<S>)
                .post(job_order_handlers::create_job_order::<S>),
        )
        .route(
            "/job-orders/:id",
            get(job_order_handlers::get_job_order::<S>)
                .patch(job_order_handlers::update_job_order::<S>),
        )
        .route(
            "/job-orders/:id/stock-out",
            post(job_order_handlers::issue_to_job_order::<S>),
        )
        .route(
            "/job-orders/:id/items/:item_id",
            delete(job_order_handlers::remove_job_item::<S>),
        )
        .route(
            "/job-orders/:id/complete",
            post(job_order_handlers::complete_job_order::<S>),
        )
        .route(
            "/job-orders/:id/cancel",
            post(job_order_handlers::cancel_job_order::<S>),
        )
        // Billing
        .route("/bills", get(billing_handlers::list_bills::<S>))
        .route("/bills/:id", get(billing_handlers::get_bill::<S>))
        .route("/bills/:id/pay", post(billing_handlers::pay_bill::<S>))
        // Reports
        .route("/reports/sales", get(report_handlers::sales_report::<S>))
        .route(
            "/reports/low-stock",
            get(report_handlers::low_stock_report::<S>),
        )
        .route(
            "/reports/stock-movements",
            get(report_handlers::stock_movement_report::<S>),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            session::require_session::<S>,
        ));

    let router = public.merge(protected).with_state(state.clone());

    match &state.settings.static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    }
}
