//! Configuration loader
//!
//! Loads integration-layer configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. Reads a `.env` file into the process environment, if one exists
//! 2. Attempts to load from environment variables
//! 3. If `BROKERLINK_TOKEN_URL` is absent, falls back to a config file
//! 4. Probes multiple paths for config files (JSON or TOML)
//! 5. Validates the result
//!
//! ## Environment Variables
//! - `BROKERLINK_TOKEN_URL`: OAuth token endpoint (required)
//! - `BROKERLINK_SCOPE`: Scope requested with every token
//! - `BROKERLINK_REFRESH_BUFFER_SECS`: Token refresh buffer in seconds
//! - `BROKERLINK_IDENTITIES`: `name=secret_id:client_id:key_id` entries,
//!   comma separated
//! - `BROKERLINK_MAX_RETRIES`: Supervisor attempts per operation
//! - `BROKERLINK_RETRY_DELAY_MS`: Supervisor base backoff in milliseconds
//! - `BROKERLINK_STALE_TIMEOUT_SECS`: Handle staleness threshold in seconds
//! - `BROKERLINK_REPORT_TEMPLATE_URL`: Flex `SendRequest` endpoint
//! - `BROKERLINK_REPORT_MAX_ATTEMPTS`: Attempts per report phase
//! - `BROKERLINK_REPORT_RETRY_DELAY_MS`: Delay between report attempts
//! - `BROKERLINK_HTTP_TIMEOUT_SECS`: Per-request timeout in seconds
//! - `BROKERLINK_API_BASE_URL`: Brokerage REST base URL
//!
//! Unset optional variables keep their documented defaults.
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./brokerlink.toml` or `./brokerlink.json` (current working directory)
//! 2. `./config.toml` or `./config.json` (current working directory)
//! 3. The same names in the parent and grandparent directories
//! 4. The same names next to the executable

use std::path::{Path, PathBuf};
use std::str::FromStr;

use brokerlink_domain::{BrokerLinkConfig, BrokerLinkError, IdentityProfile, Result};

const CONFIG_FILE_NAMES: [&str; 4] =
    ["brokerlink.toml", "brokerlink.json", "config.toml", "config.json"];

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `BrokerLinkError::Config` if neither source yields a valid
/// configuration.
pub fn load() -> Result<BrokerLinkConfig> {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "Loaded .env file");
    }

    let config = match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            config
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to load from environment, trying file");
            load_from_file(None)?
        }
    };

    config.validate()?;
    Ok(config)
}

/// Load configuration from environment variables
///
/// # Errors
/// Returns `BrokerLinkError::Config` if `BROKERLINK_TOKEN_URL` is missing or
/// any set variable has an invalid value.
pub fn load_from_env() -> Result<BrokerLinkConfig> {
    let mut config = BrokerLinkConfig::default();

    config.auth.token_url = env_var("BROKERLINK_TOKEN_URL")?;
    if let Some(scope) = env_opt("BROKERLINK_SCOPE") {
        config.auth.scope = scope;
    }
    if let Some(buffer) = env_parse("BROKERLINK_REFRESH_BUFFER_SECS")? {
        config.auth.refresh_buffer_secs = buffer;
    }
    if let Some(identities) = env_opt("BROKERLINK_IDENTITIES") {
        config.identities = parse_identities(&identities)?;
    }

    if let Some(retries) = env_parse("BROKERLINK_MAX_RETRIES")? {
        config.supervisor.max_retries = retries;
    }
    if let Some(delay) = env_parse("BROKERLINK_RETRY_DELAY_MS")? {
        config.supervisor.retry_delay_ms = delay;
    }
    if let Some(stale) = env_parse("BROKERLINK_STALE_TIMEOUT_SECS")? {
        config.supervisor.stale_timeout_secs = stale;
    }

    if let Some(url) = env_opt("BROKERLINK_REPORT_TEMPLATE_URL") {
        config.report.template_url = url;
    }
    if let Some(attempts) = env_parse("BROKERLINK_REPORT_MAX_ATTEMPTS")? {
        config.report.max_attempts = attempts;
    }
    if let Some(delay) = env_parse("BROKERLINK_REPORT_RETRY_DELAY_MS")? {
        config.report.retry_delay_ms = delay;
    }

    if let Some(timeout) = env_parse("BROKERLINK_HTTP_TIMEOUT_SECS")? {
        config.http.timeout_secs = timeout;
    }
    if let Some(base_url) = env_opt("BROKERLINK_API_BASE_URL") {
        config.api.base_url = base_url;
    }

    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations.
///
/// # Errors
/// Returns `BrokerLinkError::Config` if the file is missing, unreadable or
/// not valid JSON/TOML.
pub fn load_from_file(path: Option<PathBuf>) -> Result<BrokerLinkConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(BrokerLinkError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            BrokerLinkError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| BrokerLinkError::Config(format!("Failed to read config file: {}", e)))?;

    parse_config(&contents, &config_path)
}

fn parse_config(contents: &str, path: &Path) -> Result<BrokerLinkConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| BrokerLinkError::Config(format!("Invalid TOML format: {}", e))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| BrokerLinkError::Config(format!("Invalid JSON format: {}", e))),
        _ => Err(BrokerLinkError::Config(format!("Unsupported config format: {}", extension))),
    }
}

/// Probe the standard locations for a configuration file
///
/// Returns the first existing candidate, or `None`.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut roots = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        roots.extend([cwd.clone(), cwd.join(".."), cwd.join("../..")]);
    }
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            roots.extend([exe_dir.to_path_buf(), exe_dir.join(".."), exe_dir.join("../..")]);
        }
    }

    roots
        .iter()
        .flat_map(|root| CONFIG_FILE_NAMES.iter().map(move |name| root.join(name)))
        .find(|path| path.exists())
}

/// Parse `name=secret_id:client_id:key_id` entries separated by commas.
fn parse_identities(raw: &str) -> Result<Vec<IdentityProfile>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let invalid = || {
                BrokerLinkError::Config(format!(
                    "Invalid identity entry '{entry}', expected name=secret_id:client_id:key_id"
                ))
            };
            let (name, rest) = entry.split_once('=').ok_or_else(invalid)?;
            let mut parts = rest.split(':');
            match (parts.next(), parts.next(), parts.next(), parts.next()) {
                (Some(secret_id), Some(client_id), Some(key_id), None)
                    if !name.trim().is_empty() && !secret_id.is_empty() =>
                {
                    Ok(IdentityProfile::new(name.trim(), secret_id, client_id, key_id))
                }
                _ => Err(invalid()),
            }
        })
        .collect()
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| {
        BrokerLinkError::Config(format!("Missing required environment variable: {}", key))
    })
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_opt(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| BrokerLinkError::Config(format!("Invalid value for {}: {}", key, e)))
        })
        .transpose()
}
