//! Domain types and models
//!
//! Everything here is a value type: tokens are replaced wholesale, report jobs
//! live for one fetch call, and tables are immutable once built.

pub mod report;
pub mod table;
pub mod token;

pub use report::{ReportJob, ReportPhase};
pub use table::{TableRecord, TabularTable};
pub use token::BearerToken;
