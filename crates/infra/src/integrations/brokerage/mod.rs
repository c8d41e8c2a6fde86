//! Brokerage REST API client with a supervised, identity-bound session

mod client;

pub use client::{BrokerageClient, BrokerageSession};
