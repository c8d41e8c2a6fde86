//! Resilience primitives for supervised remote handles
//!
//! - [`clock`]: `Clock` abstraction with a `MockClock` for deterministic tests
//! - [`backoff`]: fixed and linear delay schedules
//! - [`transient`]: the transient connection-error vocabulary
//! - [`supervisor`]: `ConnectionSupervisor`, which rebuilds a handle and
//!   retries an idempotent operation when it fails transiently
//!
//! Everything here is generic over the handle and error types.

pub mod backoff;
pub mod clock;
#[cfg(feature = "runtime")]
pub mod supervisor;
pub mod transient;

pub use backoff::BackoffStrategy;
pub use clock::{Clock, MockClock, SystemClock};
#[cfg(feature = "runtime")]
pub use supervisor::{ConnectionSupervisor, HandleFactory, SupervisorBuilder, SupervisorError};
pub use transient::{VocabularyClassifier, DEFAULT_TRANSIENT_MARKERS};
