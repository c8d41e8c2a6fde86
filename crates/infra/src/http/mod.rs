//! HTTP transport shared by the token manager, the report fetcher and the
//! brokerage client.

pub mod client;
mod factory;

pub use client::{read_body, read_bytes, HttpClient, HttpClientBuilder};
pub use factory::{supervised_http, HttpHandleFactory};
