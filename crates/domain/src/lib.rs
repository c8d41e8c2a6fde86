//! # BrokerLink Domain
//!
//! Data types shared by every BrokerLink crate.
//!
//! This crate contains:
//! - The error taxonomy and `Result` alias
//! - Configuration structures (with serde defaults)
//! - Token, identity, report-job and table types
//! - Wire-level constants (envelope markers, payload failure markers)
//!
//! ## Architecture
//! - No dependencies on other BrokerLink crates
//! - No I/O; pure data and invariants

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
