use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Secrets shorter than this are refused in production.
pub const MIN_SECRET_BYTES: usize = 32;

/// Upper bound on every configured token lifetime.
pub const MAX_TOKEN_EXPIRY_DAYS: i64 = 3650;

#[derive(Debug, Clone)]
pub struct MembershipConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub store: StoreConfig,
    pub tokens: TokenConfig,
    pub credentials: CredentialConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Required for the postgres backend.
    pub database_url: Option<Secret<String>>,
    pub max_connections: u32,
    pub min_connections: u32,
    /// Upper bound on a single core operation, store round-trips included.
    pub operation_timeout_ms: u64,
}

impl StoreConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub signing_key: Secret<String>,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
    pub opaque_token_expiry_days: i64,
    pub purge_interval_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct CredentialConfig {
    /// Mixed into every password hash as the Argon2 secret.
    pub server_salt: Secret<String>,
    pub min_entropy_bits: f64,
    pub max_password_bytes: usize,
    pub hash_concurrency: usize,
}

impl MembershipConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let backend: StoreBackend = get_env("STORE_BACKEND", Some("postgres"), false)?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let database_url = match backend {
            StoreBackend::Postgres => Some(Secret::new(get_env("DATABASE_URL", None, is_prod)?)),
            StoreBackend::Memory => None,
        };

        let default_concurrency = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
            .to_string();

        let config = MembershipConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("membership-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            store: StoreConfig {
                backend,
                database_url,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "20", is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "2", is_prod)?,
                operation_timeout_ms: parse_env("STORE_TIMEOUT_MS", "5000", is_prod)?,
            },
            tokens: TokenConfig {
                signing_key: Secret::new(get_env(
                    "TOKEN_SIGNING_KEY",
                    Some("dev-only-signing-key-change-me-0000000000"),
                    is_prod,
                )?),
                access_token_expiry_minutes: parse_env(
                    "ACCESS_TOKEN_EXPIRY_MINUTES",
                    "15",
                    is_prod,
                )?,
                refresh_token_expiry_days: parse_env("REFRESH_TOKEN_EXPIRY_DAYS", "7", is_prod)?,
                opaque_token_expiry_days: parse_env("OPAQUE_TOKEN_EXPIRY_DAYS", "30", is_prod)?,
                purge_interval_seconds: parse_env("TOKEN_PURGE_INTERVAL_SECONDS", "3600", is_prod)?,
            },
            credentials: CredentialConfig {
                server_salt: Secret::new(get_env(
                    "PASSWORD_SERVER_SALT",
                    Some("dev-only-server-salt-change-me-00000000"),
                    is_prod,
                )?),
                min_entropy_bits: parse_env("PASSWORD_MIN_ENTROPY_BITS", "60", is_prod)?,
                max_password_bytes: parse_env("PASSWORD_MAX_BYTES", "72", is_prod)?,
                hash_concurrency: parse_env("HASH_CONCURRENCY", &default_concurrency, is_prod)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(config_error("PORT must be greater than 0"));
        }

        let max_minutes = MAX_TOKEN_EXPIRY_DAYS * 24 * 60;
        if !(1..=max_minutes).contains(&self.tokens.access_token_expiry_minutes) {
            return Err(config_error(&format!(
                "ACCESS_TOKEN_EXPIRY_MINUTES must be between 1 and {}",
                max_minutes
            )));
        }

        for (key, days) in [
            ("REFRESH_TOKEN_EXPIRY_DAYS", self.tokens.refresh_token_expiry_days),
            ("OPAQUE_TOKEN_EXPIRY_DAYS", self.tokens.opaque_token_expiry_days),
        ] {
            if !(1..=MAX_TOKEN_EXPIRY_DAYS).contains(&days) {
                return Err(config_error(&format!(
                    "{} must be between 1 and {}",
                    key, MAX_TOKEN_EXPIRY_DAYS
                )));
            }
        }

        let min_entropy = self.credentials.min_entropy_bits;
        if !min_entropy.is_finite() || min_entropy < 0.0 {
            return Err(config_error(
                "PASSWORD_MIN_ENTROPY_BITS must be a non-negative number",
            ));
        }

        if self.store.operation_timeout_ms == 0 {
            return Err(config_error("STORE_TIMEOUT_MS must be positive"));
        }

        if self.credentials.max_password_bytes == 0 {
            return Err(config_error("PASSWORD_MAX_BYTES must be positive"));
        }

        if self.tokens.signing_key.expose_secret().is_empty() {
            return Err(config_error("TOKEN_SIGNING_KEY must not be empty"));
        }

        if self.store.backend == StoreBackend::Postgres && self.store.database_url.is_none() {
            return Err(config_error("DATABASE_URL is required for the postgres backend"));
        }

        if self.environment == Environment::Prod {
            if self.tokens.signing_key.expose_secret().len() < MIN_SECRET_BYTES {
                return Err(config_error(&format!(
                    "TOKEN_SIGNING_KEY must be at least {} bytes in production",
                    MIN_SECRET_BYTES
                )));
            }

            if self.credentials.server_salt.expose_secret().len() < MIN_SECRET_BYTES {
                return Err(config_error(&format!(
                    "PASSWORD_SERVER_SALT must be at least {} bytes in production",
                    MIN_SECRET_BYTES
                )));
            }

            if self.store.backend == StoreBackend::Memory {
                tracing::error!("In-memory store in production - all data is lost on restart");
            }
        }

        Ok(())
    }
}

fn config_error(message: &str) -> AppError {
    AppError::ConfigError(anyhow::anyhow!(message.to_string()))
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{}: {}", key, e)))
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(format!("Invalid store backend: {}", s)),
        }
    }
}
