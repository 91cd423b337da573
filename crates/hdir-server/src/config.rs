//! Configuration management

use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8000;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/hospital_directory";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

/// Default CORS allowed origin.
pub const DEFAULT_CORS_ALLOWED_ORIGIN: &str = "*";

// ============================================================================
// Ingestion Configuration Constants
// ============================================================================

/// Default maximum rows per CSV upload.
pub const DEFAULT_MAX_CSV_ROWS: usize = hdir_ingest::DEFAULT_MAX_ROWS;

/// Rows between progress checkpoints for synchronous uploads.
pub const DEFAULT_CHECKPOINT_INTERVAL: usize = 10;

/// Per-row delay for background uploads when none is requested, in seconds.
pub const DEFAULT_ROW_DELAY_SECS: f64 = 0.5;

/// Largest per-row delay a caller may request, in seconds.
pub const DEFAULT_MAX_ROW_DELAY_SECS: f64 = 5.0;

/// Extra attempts at the batch activation update after the first failure.
pub const DEFAULT_ACTIVATION_RETRIES: u32 = 2;

/// Default page size when listing bulk operations.
pub const DEFAULT_BULK_LIST_LIMIT: i64 = 50;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreBackend,
    pub database: DatabaseConfig,
    pub cors: CorsConfig,
    pub ingest: IngestConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

/// Which record store backs the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(anyhow::anyhow!("Invalid store backend: {}", other)),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

/// Bulk ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub max_csv_rows: usize,
    pub checkpoint_interval: usize,
    pub default_row_delay_secs: f64,
    pub max_row_delay_secs: f64,
    /// Keep raw upload bytes on background batches so they can be resumed
    pub retain_content: bool,
    /// Reject uploads with short headerless rows instead of failing the row
    pub strict_columns: bool,
    pub activation_retries: u32,
    pub list_limit: i64,
}

impl IngestConfig {
    pub fn interpret_options(&self) -> hdir_ingest::InterpretOptions {
        hdir_ingest::InterpretOptions {
            max_rows: self.max_csv_rows,
            strict_columns: self.strict_columns,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_csv_rows: DEFAULT_MAX_CSV_ROWS,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            default_row_delay_secs: DEFAULT_ROW_DELAY_SECS,
            max_row_delay_secs: DEFAULT_MAX_ROW_DELAY_SECS,
            retain_content: true,
            strict_columns: false,
            activation_retries: DEFAULT_ACTIVATION_RETRIES,
            list_limit: DEFAULT_BULK_LIST_LIMIT,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let store = match std::env::var("HDIR_STORE") {
            Ok(value) => value.parse()?,
            Err(_) => StoreBackend::Postgres,
        };

        let config = Config {
            server: ServerConfig {
                host: std::env::var("HDIR_HOST")
                    .unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
                port: env_or("HDIR_PORT", DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: env_or(
                    "HDIR_SHUTDOWN_TIMEOUT",
                    DEFAULT_SHUTDOWN_TIMEOUT_SECS,
                ),
            },
            store,
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: env_or(
                    "DATABASE_MAX_CONNECTIONS",
                    DEFAULT_DATABASE_MAX_CONNECTIONS,
                ),
                min_connections: env_or(
                    "DATABASE_MIN_CONNECTIONS",
                    DEFAULT_DATABASE_MIN_CONNECTIONS,
                ),
                connect_timeout_secs: env_or(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
                idle_timeout_secs: env_or(
                    "DATABASE_IDLE_TIMEOUT",
                    DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
                ),
            },
            cors: CorsConfig {
                allowed_origins: std::env::var("CORS_ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| DEFAULT_CORS_ALLOWED_ORIGIN.to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                allow_credentials: env_or("CORS_ALLOW_CREDENTIALS", false),
            },
            ingest: IngestConfig {
                max_csv_rows: env_or("MAX_CSV_ROWS", DEFAULT_MAX_CSV_ROWS),
                checkpoint_interval: env_or(
                    "INGEST_CHECKPOINT_INTERVAL",
                    DEFAULT_CHECKPOINT_INTERVAL,
                ),
                default_row_delay_secs: env_or("INGEST_DEFAULT_ROW_DELAY", DEFAULT_ROW_DELAY_SECS),
                max_row_delay_secs: env_or("INGEST_MAX_ROW_DELAY", DEFAULT_MAX_ROW_DELAY_SECS),
                retain_content: env_or("INGEST_RETAIN_CONTENT", true),
                strict_columns: env_or("INGEST_STRICT_COLUMNS", false),
                activation_retries: env_or(
                    "INGEST_ACTIVATION_RETRIES",
                    DEFAULT_ACTIVATION_RETRIES,
                ),
                list_limit: env_or("BULK_LIST_LIMIT", DEFAULT_BULK_LIST_LIMIT),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.store == StoreBackend::Postgres {
            if self.database.url.is_empty() {
                anyhow::bail!("Database URL cannot be empty");
            }

            if self.database.max_connections == 0 {
                anyhow::bail!("Database max_connections must be greater than 0");
            }

            if self.database.min_connections > self.database.max_connections {
                anyhow::bail!(
                    "Database min_connections ({}) cannot be greater than max_connections ({})",
                    self.database.min_connections,
                    self.database.max_connections
                );
            }
        }

        let ingest = &self.ingest;
        if ingest.max_csv_rows == 0 {
            anyhow::bail!("MAX_CSV_ROWS must be at least 1");
        }

        if ingest.checkpoint_interval == 0 {
            anyhow::bail!("Checkpoint interval must be at least 1");
        }

        if !(ingest.max_row_delay_secs.is_finite() && ingest.max_row_delay_secs >= 0.0) {
            anyhow::bail!("Maximum row delay must be a non-negative number of seconds");
        }

        if !(0.0..=ingest.max_row_delay_secs).contains(&ingest.default_row_delay_secs) {
            anyhow::bail!(
                "Default row delay ({}s) must be between 0 and the maximum row delay ({}s)",
                ingest.default_row_delay_secs,
                ingest.max_row_delay_secs
            );
        }

        if ingest.list_limit <= 0 {
            anyhow::bail!("BULK_LIST_LIMIT must be greater than 0");
        }

        if self.cors.allowed_origins.is_empty() {
            tracing::warn!("No CORS origins configured - all origins will be allowed");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            },
            store: StoreBackend::Postgres,
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
            },
            cors: CorsConfig {
                allowed_origins: vec![DEFAULT_CORS_ALLOWED_ORIGIN.to_string()],
                allow_credentials: false,
            },
            ingest: IngestConfig::default(),
        }
    }
}
