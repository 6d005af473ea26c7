//! Configuration loader
//!
//! Loads [`Settings`] from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If a required variable is missing, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! Whatever the source, the result is validated before it is returned.
//!
//! ## Environment Variables
//! Required:
//! - `RESILEX_POOL_CAPACITY`: Number of pool slots
//! - `RESILEX_QUEUE_CAPACITY`: Work queue capacity
//! - `RESILEX_WORKERS`: Number of worker tasks
//!
//! Optional (component defaults apply when unset):
//! - `RESILEX_RETRY_MAX_ATTEMPTS`: Total attempts including the first
//! - `RESILEX_RETRY_BASE_DELAY_MS`: Delay after the first failure
//! - `RESILEX_RETRY_MAX_DELAY_MS`: Cap on any single retry delay
//! - `RESILEX_BREAKER_FAILURE_THRESHOLD`: Consecutive failures that open the
//!   circuit
//! - `RESILEX_BREAKER_COOLDOWN_MS`: Open period before a trial call
//! - `RESILEX_ACQUIRE_TIMEOUT_MS`: Longest wait for a pool slot
//! - `RESILEX_LOG_FILTER`: `EnvFilter` directive
//! - `RESILEX_LOG_JSON`: JSON log output (true/false)
//!
//! Millisecond values are parsed as signed integers so that a negative delay
//! is reported as invalid configuration rather than a parse error.
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./resilex.toml`, `./resilex.json` (current working directory)
//! 2. `./config.toml`, `./config.json` (current working directory)
//! 3. The same names next to the executable

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use resilex_common::ResilienceError;
use tracing::{debug, info};

use super::Settings;
use crate::errors::{InfraError, InfraResult};

const CONFIG_FILE_NAMES: [&str; 4] = ["resilex.toml", "resilex.json", "config.toml", "config.json"];

/// Load settings with automatic fallback strategy
///
/// First attempts to load from environment variables. If any required
/// variables are missing, falls back to loading from a config file. A
/// variable that is present but invalid is reported, not skipped.
///
/// # Errors
/// Returns `InfraError` if:
/// - Settings cannot be loaded from either source
/// - An environment variable or file has an invalid value
/// - The loaded settings fail validation
pub fn load() -> InfraResult<Settings> {
    // Try loading from environment first
    match load_from_env() {
        Ok(settings) => {
            info!("Configuration loaded from environment variables");
            Ok(settings)
        }
        Err(InfraError::MissingEnv(key)) => {
            debug!(missing = %key, "Environment incomplete, trying file");
            load_from_file(None)
        }
        Err(e) => Err(e),
    }
}

/// Load settings from environment variables
///
/// # Environment Variables
/// See module documentation for the complete list.
///
/// # Errors
/// Returns `InfraError::MissingEnv` if a required variable is missing,
/// `InfraError::InvalidEnv` if one does not parse, and
/// `InfraError::Validation` if the resulting settings are rejected.
pub fn load_from_env() -> InfraResult<Settings> {
    let mut settings = Settings::default();

    settings.pool.capacity = env_parse("RESILEX_POOL_CAPACITY")?;
    settings.queue.capacity = env_parse("RESILEX_QUEUE_CAPACITY")?;
    settings.workers = env_parse("RESILEX_WORKERS")?;

    if let Some(max_attempts) = env_parse_opt("RESILEX_RETRY_MAX_ATTEMPTS")? {
        settings.retry.max_attempts = max_attempts;
    }
    if let Some(base_delay) = env_millis("RESILEX_RETRY_BASE_DELAY_MS")? {
        settings.retry.base_delay = base_delay;
    }
    if let Some(max_delay) = env_millis("RESILEX_RETRY_MAX_DELAY_MS")? {
        settings.retry.max_delay = Some(max_delay);
    }
    if let Some(threshold) = env_parse_opt("RESILEX_BREAKER_FAILURE_THRESHOLD")? {
        settings.breaker.failure_threshold = threshold;
    }
    if let Some(cooldown) = env_millis("RESILEX_BREAKER_COOLDOWN_MS")? {
        settings.breaker.cooldown = cooldown;
    }
    settings.acquire_timeout = env_millis("RESILEX_ACQUIRE_TIMEOUT_MS")?;

    settings.logging.filter = std::env::var("RESILEX_LOG_FILTER").ok();
    settings.logging.json = env_bool("RESILEX_LOG_JSON", false);

    settings.validate()?;
    Ok(settings)
}

/// Load settings from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Arguments
/// * `path` - Optional path to config file. If `None`, uses
///   [`probe_config_paths`].
///
/// # Errors
/// Returns `InfraError` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
/// - The parsed settings fail validation
pub fn load_from_file(path: Option<PathBuf>) -> InfraResult<Settings> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(InfraError::NotFound(p));
            }
            p
        }
        None => probe_config_paths().ok_or(InfraError::NoConfigFile)?,
    };

    info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)?;
    let settings = parse_settings(&contents, &config_path)?;
    settings.validate()?;
    Ok(settings)
}

/// Parse settings from string content
///
/// Format is detected by file extension (`.json` or `.toml`); a path without
/// an extension is treated as JSON.
fn parse_settings(contents: &str, path: &Path) -> InfraResult<Settings> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => Ok(toml::from_str(contents)?),
        "json" => Ok(serde_json::from_str(contents)?),
        other => Err(InfraError::UnsupportedFormat(other.to_string())),
    }
}

/// Probe standard paths for configuration files
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend(CONFIG_FILE_NAMES.iter().map(|name| cwd.join(name)));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.extend(CONFIG_FILE_NAMES.iter().map(|name| exe_dir.join(name)));
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

/// Get required environment variable
fn env_var(key: &str) -> InfraResult<String> {
    std::env::var(key).map_err(|_| InfraError::MissingEnv(key.to_string()))
}

/// Parse a required environment variable
fn env_parse<T>(key: &str) -> InfraResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_var(key)?.trim().parse::<T>().map_err(|e| InfraError::invalid_env(key, e))
}

/// Parse an optional environment variable
fn env_parse_opt<T>(key: &str) -> InfraResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => {
            value.trim().parse::<T>().map(Some).map_err(|e| InfraError::invalid_env(key, e))
        }
        Err(_) => Ok(None),
    }
}

/// Parse an optional millisecond duration, rejecting negative values
fn env_millis(key: &str) -> InfraResult<Option<Duration>> {
    match env_parse_opt::<i64>(key)? {
        Some(millis) if millis < 0 => Err(InfraError::Validation(ResilienceError::invalid_config(
            format!("{key} must not be negative, got {millis}"),
        ))),
        Some(millis) => Ok(Some(Duration::from_millis(millis.unsigned_abs()))),
        None => Ok(None),
    }
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
