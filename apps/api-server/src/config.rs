//! Centralized configuration for api-server.
//!
//! All environment variables are loaded and validated at startup to fail fast
//! on misconfiguration rather than at request time. The same loader runs again
//! when `--reload` picks up a changed `.env` file.

use axum::http::HeaderValue;
use postgres_adapter::DbConfig;
use std::fmt;
use std::path::PathBuf;

/// Where dashboard data is read from.
#[derive(Debug, Clone)]
pub enum Storage {
    /// The factory Postgres database (RDS).
    Postgres(DbConfig),
    /// A static dataset held in memory, for local development and demos.
    Memory { dataset_path: Option<PathBuf> },
}

impl Storage {
    pub fn name(&self) -> &'static str {
        match self {
            Storage::Postgres(_) => "postgres",
            Storage::Memory { .. } => "memory",
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub struct ConfigError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configuration error for {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

impl From<postgres_adapter::DbConfigError> for ConfigError {
    fn from(e: postgres_adapter::DbConfigError) -> Self {
        let message = match &e {
            postgres_adapter::DbConfigError::Missing(_) => {
                "Required when STORAGE_PROVIDER=postgres".to_string()
            }
            postgres_adapter::DbConfigError::Invalid { .. } => e.to_string(),
        };
        Self {
            field: e.field(),
            message,
        }
    }
}

/// Server configuration loaded from environment variables.
///
/// Host and port come from the command line (see `main.rs`).
#[derive(Debug, Clone)]
pub struct Config {
    /// CORS allow origin
    pub cors_allow_origin: HeaderValue,
    /// Storage backend and its settings
    pub storage: Storage,
    /// Log format
    pub log_format: LogFormat,
}

impl Config {
    /// Load and validate configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load and validate configuration, resolving variables with `lookup`.
    ///
    /// Fails fast on invalid configuration.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // CORS allow origin
        let cors_origin_str = lookup("CORS_ALLOW_ORIGIN").unwrap_or_else(|| "*".into());
        let cors_allow_origin = if cors_origin_str == "*" {
            HeaderValue::from_static("*")
        } else {
            HeaderValue::from_str(&cors_origin_str).map_err(|e| ConfigError {
                field: "CORS_ALLOW_ORIGIN",
                message: format!("Invalid header value '{}': {}", cors_origin_str, e),
            })?
        };

        // Storage provider
        let provider = lookup("STORAGE_PROVIDER")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "postgres".into());
        let storage = if provider.eq_ignore_ascii_case("memory") {
            Storage::Memory {
                dataset_path: lookup("MEMORY_DATASET_PATH")
                    .filter(|s| !s.is_empty())
                    .map(PathBuf::from),
            }
        } else if provider.eq_ignore_ascii_case("postgres") {
            Storage::Postgres(DbConfig::from_lookup(&lookup)?)
        } else {
            return Err(ConfigError {
                field: "STORAGE_PROVIDER",
                message: format!("Unknown provider '{}', expected postgres or memory", provider),
            });
        };

        // Log format
        let log_format =
            LogFormat::from_str(&lookup("LOG_FORMAT").unwrap_or_else(|| "pretty".into()));

        Ok(Self {
            cors_allow_origin,
            storage,
            log_format,
        })
    }

    /// Log warnings about configuration that is fine for development only.
    pub fn warn_if_insecure(&self) {
        if let Storage::Memory { dataset_path } = &self.storage {
            tracing::warn!(
                dataset = ?dataset_path,
                "STORAGE_PROVIDER=memory: serving a static dataset, not the factory database."
            );
        }
        if let Storage::Postgres(db) = &self.storage {
            if matches!(
                db.ssl_mode,
                sqlx::postgres::PgSslMode::Disable | sqlx::postgres::PgSslMode::Allow
            ) {
                tracing::warn!(
                    ssl_mode = ?db.ssl_mode,
                    "DB_SSLMODE permits unencrypted connections to the database."
                );
            }
        }
    }
}
