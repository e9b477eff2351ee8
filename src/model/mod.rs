pub mod bill;
pub mod common;
pub mod customer;
pub mod job_order;
pub mod ledger;
pub mod product;
pub mod report;
pub mod tenant;
pub mod user;

pub use bill::*;
pub use common::*;
pub use customer::*;
pub use job_order::*;
pub use ledger::*;
pub use product::*;
pub use report::*;
pub use tenant::*;
pub use user::*;
