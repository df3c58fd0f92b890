pub mod audit;
pub mod models;

pub use audit::AuditLedger;
pub use models::{LoanHistory, NewLoanHistory};
