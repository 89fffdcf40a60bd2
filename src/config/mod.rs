//! Configuration management for trialscope
//!
//! Settings are resolved from environment variables. The `ENVIRONMENT`
//! variable selects which dotenv file is loaded first (`.env.local` or
//! `.env.production`), mirroring how the service is deployed: a hosted
//! production instance and a local development instance resolve to
//! different database locations and credentials.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Deployment environment the process runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    /// Resolve from the `ENVIRONMENT` variable; unknown values fall back to local
    pub fn from_env() -> Self {
        match std::env::var("ENVIRONMENT").as_deref() {
            Ok("production") | Ok("railway") => Self::Production,
            _ => Self::Local,
        }
    }

    /// The dotenv file loaded for this environment
    pub fn env_file(&self) -> &'static str {
        match self {
            Self::Local => ".env.local",
            Self::Production => ".env.production",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Production => "production",
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Deployment environment
    pub environment: Environment,

    /// HTTP server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Trial registry client configuration
    pub registry: RegistryConfig,

    /// Background ingestion configuration
    pub ingest: IngestConfig,

    /// Admin console credentials
    pub admin: AdminConfig,

    /// Third-party API key for summary generation (unused by the core
    /// service, carried for deployment parity)
    pub openai_api_key: Option<String>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_address: SocketAddr,

    /// Origins allowed by CORS; a single "*" entry allows any origin
    pub cors_origins: Vec<String>,

    /// Explicit frontend bundle location, overriding the search order
    pub static_dir: Option<PathBuf>,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string
    pub url: String,

    /// Maximum pool size
    pub pool_size: usize,
}

/// Trial registry (ClinicalTrials.gov v2 API) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// API base URL
    pub base_url: String,

    /// Condition the study search is restricted to
    pub condition: String,

    /// Page size for study listing requests
    pub page_size: u32,

    /// Rate limit towards the registry (requests per second)
    pub requests_per_second: u32,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,
}

/// Background ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Hours between scheduled ingestion runs
    pub interval_hours: u64,

    /// Seconds to wait for an in-flight run during shutdown
    pub shutdown_grace_secs: u64,
}

/// Admin console credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    pub username: String,
    pub password: String,
}

impl Settings {
    /// Load configuration from environment variables
    ///
    /// Loads the environment-specific dotenv file first; a missing file is
    /// not an error (hosted deployments inject variables directly).
    pub fn from_env() -> Result<Self> {
        let environment = Environment::from_env();
        let _ = dotenvy::from_filename(environment.env_file());

        let bind_address = std::env::var("TRIALSCOPE_BIND_ADDRESS")
            .unwrap_or_else(|_| String::from("0.0.0.0:8000"))
            .parse::<SocketAddr>()
            .context("Invalid TRIALSCOPE_BIND_ADDRESS")?;

        let cors_origins = std::env::var("TRIALSCOPE_CORS_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_else(|_| {
                vec![
                    String::from("http://localhost:5173"),
                    String::from("http://localhost:3000"),
                ]
            });

        let static_dir = std::env::var("TRIALSCOPE_STATIC_DIR").ok().map(PathBuf::from);

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| String::from("postgresql://localhost/trialscope"));

        let pool_size = std::env::var("TRIALSCOPE_POOL_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(10);

        let registry_base_url = std::env::var("TRIALSCOPE_REGISTRY_URL")
            .unwrap_or_else(|_| String::from("https://clinicaltrials.gov/api/v2"));

        let condition = std::env::var("TRIALSCOPE_CONDITION")
            .unwrap_or_else(|_| String::from("osteosarcoma"));

        let page_size = std::env::var("TRIALSCOPE_PAGE_SIZE")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(100);

        let requests_per_second = std::env::var("TRIALSCOPE_REGISTRY_RPS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(2);

        let request_timeout_secs = std::env::var("TRIALSCOPE_REQUEST_TIMEOUT")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(30);

        let interval_hours = std::env::var("TRIALSCOPE_INGEST_INTERVAL_HOURS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(24);

        let shutdown_grace_secs = std::env::var("TRIALSCOPE_SHUTDOWN_GRACE_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(30);

        let admin_username =
            std::env::var("ADMIN_USERNAME").unwrap_or_else(|_| String::from("admin"));
        let admin_password =
            std::env::var("ADMIN_PASSWORD").unwrap_or_else(|_| String::from("password"));

        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();

        let settings = Self {
            environment,
            server: ServerConfig {
                bind_address,
                cors_origins,
                static_dir,
            },
            database: DatabaseConfig {
                url: database_url,
                pool_size,
            },
            registry: RegistryConfig {
                base_url: registry_base_url,
                condition,
                page_size,
                requests_per_second,
                request_timeout_secs,
            },
            ingest: IngestConfig {
                interval_hours,
                shutdown_grace_secs,
            },
            admin: AdminConfig {
                username: admin_username,
                password: admin_password,
            },
            openai_api_key,
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            anyhow::bail!("database url must not be empty");
        }

        if self.database.pool_size == 0 {
            anyhow::bail!("pool_size must be greater than 0");
        }

        if self.registry.page_size == 0 {
            anyhow::bail!("registry page_size must be greater than 0");
        }

        if self.registry.requests_per_second == 0 {
            anyhow::bail!("registry requests_per_second must be positive");
        }

        if self.ingest.interval_hours == 0 {
            anyhow::bail!("ingest interval_hours must be greater than 0");
        }

        Ok(())
    }

    /// Get scheduled ingestion period as Duration
    #[must_use]
    pub fn ingest_period(&self) -> Duration {
        Duration::from_secs(self.ingest.interval_hours * 3600)
    }

    /// Get shutdown grace period as Duration
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.ingest.shutdown_grace_secs)
    }

    /// Get registry request timeout as Duration
    #[must_use]
    pub fn registry_timeout(&self) -> Duration {
        Duration::from_secs(self.registry.request_timeout_secs)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: Environment::Local,
            server: ServerConfig {
                bind_address: "0.0.0.0:8000".parse().unwrap(),
                cors_origins: vec![
                    String::from("http://localhost:5173"),
                    String::from("http://localhost:3000"),
                ],
                static_dir: None,
            },
            database: DatabaseConfig {
                url: String::from("postgresql://localhost/trialscope"),
                pool_size: 10,
            },
            registry: RegistryConfig {
                base_url: String::from("https://clinicaltrials.gov/api/v2"),
                condition: String::from("osteosarcoma"),
                page_size: 100,
                requests_per_second: 2,
                request_timeout_secs: 30,
            },
            ingest: IngestConfig {
                interval_hours: 24,
                shutdown_grace_secs: 30,
            },
            admin: AdminConfig {
                username: String::from("admin"),
                password: String::from("password"),
            },
            openai_api_key: None,
        }
    }
}
