//! Configuration module for environment variables and application settings

use std::env;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};

use crate::database::connection::DatabaseConfig;

/// Minimum accepted length of the token signing secret, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct Config {
    /// Database configuration
    pub database: DatabaseConfig,

    /// Server configuration
    pub server: ServerConfig,

    /// Token issuance configuration
    pub auth: AuthConfig,

    /// HTTP layer configuration
    pub http: HttpConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Free-form environment label ("development", "production", ...)
    pub env: String,
    /// Apply embedded migrations at startup
    pub run_migrations: bool,
}

#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl: Duration,
    pub issuer: String,
}

// Keep the secret out of debug output.
impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"[REDACTED]")
            .field("token_ttl", &self.token_ttl)
            .field("issuer", &self.issuer)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub cors_origins: Vec<String>,
    pub request_timeout: Duration,
    /// Log redacted request bodies. Off unless explicitly enabled.
    pub log_request_bodies: bool,
    pub upload_path: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok().filter(|v| !v.is_empty()))
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("JWT_SECRET")
            .ok_or_else(|| anyhow!("JWT_SECRET environment variable is required"))?;
        if jwt_secret.len() < MIN_SECRET_LEN {
            bail!("JWT_SECRET must be at least {MIN_SECRET_LEN} bytes long");
        }

        let ttl_hours: u64 = parse_or(&lookup, "JWT_TTL_HOURS", 24)?;
        let token_ttl = match ttl_hours.checked_mul(3600) {
            Some(secs) if secs > 0 => Duration::from_secs(secs),
            _ => bail!("JWT_TTL_HOURS must be a positive number of hours, got {ttl_hours}"),
        };

        let timeout_secs: u64 = parse_or(&lookup, "REQUEST_TIMEOUT_SECS", 30)?;
        if timeout_secs == 0 {
            bail!("REQUEST_TIMEOUT_SECS must be positive");
        }

        let cors_origins = lookup("CORS_ORIGINS")
            .unwrap_or_else(|| "http://localhost:3000,http://localhost:5173".to_string())
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();

        Ok(Self {
            database: DatabaseConfig::from_lookup(&lookup)?,

            server: ServerConfig {
                host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(&lookup, "PORT", 8082)?,
                env: lookup("ENV").unwrap_or_else(|| "development".to_string()),
                run_migrations: parse_or(&lookup, "RUN_MIGRATIONS", true)?,
            },

            auth: AuthConfig {
                jwt_secret,
                token_ttl,
                issuer: lookup("JWT_ISSUER").unwrap_or_else(|| "storefront-server".to_string()),
            },

            http: HttpConfig {
                cors_origins,
                request_timeout: Duration::from_secs(timeout_secs),
                log_request_bodies: parse_or(&lookup, "REQUEST_LOG_BODIES", false)?,
                upload_path: lookup("UPLOAD_PATH").unwrap_or_else(|| "./uploads".to_string()),
            },
        })
    }
}

/// Parse an optional variable, falling back to `default` when it is unset.
/// A present but unparsable value is an error rather than a silent default.
pub(crate) fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("{e}"))
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}
