//! Generic utilities shared across BrokerLink crates.
//!
//! Nothing in this crate knows about brokerages, tokens or reports; it is
//! generic over handle and error types so the same supervisor can wrap a
//! REST session, a storage client or a mail client.
//!
//! # Feature Tiers
//!
//! - `foundation`: clocks, backoff arithmetic and the transient-error
//!   vocabulary
//! - `runtime`: async [`resilience::ConnectionSupervisor`] (tokio)

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

#[cfg(feature = "foundation")]
pub mod resilience;

#[cfg(feature = "foundation")]
pub use resilience::{BackoffStrategy, Clock, MockClock, SystemClock};
#[cfg(feature = "runtime")]
pub use resilience::{ConnectionSupervisor, HandleFactory, SupervisorError};
