pub mod admin_handlers;
pub mod auth_handlers;
pub mod billing_handlers;
pub mod catalog_handlers;
pub mod customer_handlers;
pub mod handlers;
pub mod job_order_handlers;
pub mod report_handlers;
pub mod routes;
pub mod session;
pub mod stock_handlers;

pub use handlers::*;
pub use routes::*;
