pub mod billing;
pub mod credentials;
pub mod ledger;
pub mod numbering;
pub mod reports;

pub use billing::*;
pub use credentials::*;
pub use ledger::*;
pub use numbering::*;
pub use reports::*;
