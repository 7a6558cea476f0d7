use std::str::FromStr;
use std::{env, io};

use serde::Serialize;
use tracing::debug;

pub const DEFAULT_GEOCODER_ENDPOINT: &str = "https://nominatim.openstreetmap.org/search";
const DEFAULT_TIMEOUT_MS: u64 = 8_000;
const DEFAULT_MAX_ATTEMPTS: u32 = 2;
const DEFAULT_BACKOFF_BASE_MS: u64 = 500;
const DEFAULT_MAX_CONCURRENCY: usize = 8;
const DEFAULT_RESULT_LIMIT: usize = 1;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub geocoder_endpoint: String,
    pub geocoder_user_agent: String,
    pub geocoder_accept_language: Option<String>,
    pub geocoder_timeout_ms: u64,
    pub geocoder_max_attempts: u32,
    pub geocoder_backoff_base_ms: u64,
    pub geocoder_max_concurrency: usize,
    pub geocoder_result_limit: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct PublicAppConfig {
    pub geocoder_endpoint: String,
    pub geocoder_user_agent: String,
    pub geocoder_timeout_ms: u64,
    pub geocoder_max_attempts: u32,
    pub geocoder_backoff_base_ms: u64,
    pub geocoder_max_concurrency: usize,
    pub geocoder_result_limit: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        Self {
            geocoder_endpoint: env_text("GEOCODER_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_GEOCODER_ENDPOINT.to_string()),
            geocoder_user_agent: env_text("GEOCODER_USER_AGENT")
                .unwrap_or_else(default_user_agent),
            geocoder_accept_language: env_text("GEOCODER_ACCEPT_LANGUAGE"),
            geocoder_timeout_ms: env_number("GEOCODER_TIMEOUT_MS", DEFAULT_TIMEOUT_MS).max(1),
            geocoder_max_attempts: env_number("GEOCODER_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)
                .max(1),
            geocoder_backoff_base_ms: env_number(
                "GEOCODER_BACKOFF_BASE_MS",
                DEFAULT_BACKOFF_BASE_MS,
            ),
            geocoder_max_concurrency: env_number(
                "GEOCODER_MAX_CONCURRENCY",
                DEFAULT_MAX_CONCURRENCY,
            )
            .max(1),
            geocoder_result_limit: env_number("GEOCODER_RESULT_LIMIT", DEFAULT_RESULT_LIMIT)
                .max(1),
        }
    }

    pub fn public_profile(&self) -> PublicAppConfig {
        PublicAppConfig {
            geocoder_endpoint: self.geocoder_endpoint.clone(),
            geocoder_user_agent: self.geocoder_user_agent.clone(),
            geocoder_timeout_ms: self.geocoder_timeout_ms,
            geocoder_max_attempts: self.geocoder_max_attempts,
            geocoder_backoff_base_ms: self.geocoder_backoff_base_ms,
            geocoder_max_concurrency: self.geocoder_max_concurrency,
            geocoder_result_limit: self.geocoder_result_limit,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            geocoder_endpoint: DEFAULT_GEOCODER_ENDPOINT.to_string(),
            geocoder_user_agent: default_user_agent(),
            geocoder_accept_language: None,
            geocoder_timeout_ms: DEFAULT_TIMEOUT_MS,
            geocoder_max_attempts: DEFAULT_MAX_ATTEMPTS,
            geocoder_backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            geocoder_max_concurrency: DEFAULT_MAX_CONCURRENCY,
            geocoder_result_limit: DEFAULT_RESULT_LIMIT,
        }
    }
}

fn default_user_agent() -> String {
    format!("destino/{}", env!("CARGO_PKG_VERSION"))
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    if cfg!(debug_assertions) {
        return true;
    }
    env_text("ALLOW_DOTENV")
        .map(|flag| flag == "1" || flag.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Trimmed value of `key`; unset and blank both read as `None`.
fn env_text(key: &str) -> Option<String> {
    let value = env::var(key).ok()?;
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Unparseable values fall back to `default`.
fn env_number<T: FromStr>(key: &str, default: T) -> T {
    env_text(key)
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Only test that mutates process env.
    #[test]
    fn reads_overrides_and_clamps_minimums() {
        env::set_var("GEOCODER_ENDPOINT", "http://localhost:9999/search");
        env::set_var("GEOCODER_TIMEOUT_MS", "1500");
        env::set_var("GEOCODER_MAX_ATTEMPTS", "0");
        env::set_var("GEOCODER_MAX_CONCURRENCY", "not-a-number");
        env::set_var("GEOCODER_USER_AGENT", "   ");
        env::set_var("GEOCODER_RESULT_LIMIT", " 3 ");

        let config = AppConfig::from_env();
        let public = config.public_profile();

        assert_eq!(public.geocoder_endpoint, "http://localhost:9999/search");
        assert_eq!(public.geocoder_timeout_ms, 1500);
        assert_eq!(public.geocoder_max_attempts, 1);
        assert_eq!(public.geocoder_max_concurrency, DEFAULT_MAX_CONCURRENCY);
        assert!(public.geocoder_user_agent.starts_with("destino/"));
        assert_eq!(public.geocoder_backoff_base_ms, DEFAULT_BACKOFF_BASE_MS);
        assert_eq!(public.geocoder_result_limit, 3);

        for key in [
            "GEOCODER_ENDPOINT",
            "GEOCODER_TIMEOUT_MS",
            "GEOCODER_MAX_ATTEMPTS",
            "GEOCODER_MAX_CONCURRENCY",
            "GEOCODER_USER_AGENT",
            "GEOCODER_RESULT_LIMIT",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn defaults_match_lookup_policy() {
        let config = AppConfig::default();
        assert_eq!(config.geocoder_timeout_ms, 8_000);
        assert_eq!(config.geocoder_max_attempts, 2);
        assert_eq!(config.geocoder_max_concurrency, 8);
        assert_eq!(config.geocoder_result_limit, 1);
        assert!(config.geocoder_accept_language.is_none());
    }
}
