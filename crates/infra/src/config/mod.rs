//! Configuration loading
//!
//! The configuration shape lives in `brokerlink-domain`; this module reads it
//! from the environment or a file.

pub mod loader;

// Re-export commonly used items
pub use loader::{load, load_from_env, load_from_file, probe_config_paths};
