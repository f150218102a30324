// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Client configuration loaded from environment variables.
//!
//! A `.env` file in the working directory is honoured for local use.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::resilience::RetryPolicy;

/// Storage key under which the auth session is persisted.
pub const DEFAULT_STORAGE_KEY: &str = "supabase.auth.token";

/// Default deadline for a single backend call.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Delay between a successful sign-up and the first profile fetch.
pub const DEFAULT_SETTLE_MS: u64 = 1_000;

/// Client configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the hosted backend (no trailing slash)
    pub backend_url: String,
    /// Public (anon) API key sent with every request
    pub anon_key: String,
    /// Deadline applied to each bounded backend call
    pub timeout: Duration,
    /// Key of the persisted session record
    pub storage_key: String,
    /// Directory holding the file-backed session record
    pub token_store_dir: PathBuf,
    /// Wait after registration before the profile row is read
    pub registration_settle: Duration,
    /// Retry policy for idempotent reads and uploads
    pub retry: RetryPolicy,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:54321".to_string(),
            anon_key: "test_anon_key".to_string(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            token_store_dir: env::temp_dir().join("novel-client-test"),
            registration_settle: Duration::from_millis(DEFAULT_SETTLE_MS),
            retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let retry_defaults = RetryPolicy::default();

        Ok(Self {
            backend_url: env::var("SUPABASE_URL")
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .map_err(|_| ConfigError::Missing("SUPABASE_URL"))?,
            anon_key: env::var("SUPABASE_ANON_KEY")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("SUPABASE_ANON_KEY"))?,
            timeout: Duration::from_millis(parse_or("SUPABASE_TIMEOUT_MS", DEFAULT_TIMEOUT_MS)?),
            storage_key: env::var("AUTH_STORAGE_KEY")
                .unwrap_or_else(|_| DEFAULT_STORAGE_KEY.to_string()),
            token_store_dir: match env::var("TOKEN_STORE_DIR") {
                Ok(dir) => PathBuf::from(dir),
                Err(_) => default_token_dir()?,
            },
            registration_settle: Duration::from_millis(parse_or(
                "REGISTRATION_SETTLE_MS",
                DEFAULT_SETTLE_MS,
            )?),
            retry: RetryPolicy {
                max_attempts: parse_or("RETRY_MAX_ATTEMPTS", retry_defaults.max_attempts)?,
                initial_delay: Duration::from_millis(parse_or(
                    "RETRY_INITIAL_DELAY_MS",
                    retry_defaults.initial_delay.as_millis() as u64,
                )?),
            },
        })
    }
}

fn default_token_dir() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join("novel-client"))
        .ok_or(ConfigError::Missing("TOKEN_STORE_DIR"))
}

/// Parse an optional numeric variable, falling back to `default` when unset.
fn parse_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}
