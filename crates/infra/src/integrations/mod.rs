//! External service integrations

pub mod brokerage;
pub mod flex;
