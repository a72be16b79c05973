//! Configuration management for Teleharvest.
//!
//! Loads configuration from environment variables (and a `.env` file when
//! present) for:
//! - The HTTP server and its CORS policy
//! - The Postgres connection and the analytics schema
//! - The raw data lake, scraper pacing, and the object detector

use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use sqlx::postgres::PgConnectOptions;

use crate::{Error, Result};

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Load configuration from the environment (call once at startup).
///
/// Later calls return the configuration loaded by the first one.
pub fn init() -> Result<&'static Config> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }
    let config = Config::from_env()?;
    Ok(CONFIG.get_or_init(|| config))
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub analytics: AnalyticsConfig,
    pub scraper: ScraperConfig,
    pub enrichment: EnrichmentConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed origins; `*` allows any origin without credentials.
    pub cors_allow_origins: Vec<String>,
}

/// Postgres connection settings.
///
/// Fields are optional so the API can report every missing variable at
/// once, while the batch tools fall back to local defaults.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: Option<String>,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub min_connections: u32,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    /// Schema holding the modelled tables the API reads.
    pub schema: String,
}

#[derive(Debug, Clone)]
pub struct ScraperConfig {
    /// Root of the raw data lake.
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub telegram_web_url: String,
    pub requests_per_second: u32,
}

#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    /// Object detection endpoint; enrichment is skipped without one.
    pub detector_url: Option<String>,
    pub confidence: f32,
    pub image_size: u32,
    /// Files smaller than this are treated as corrupted downloads.
    pub min_image_bytes: u64,
}

impl DatabaseConfig {
    /// Names of the required variables that are not set.
    pub fn missing(&self) -> Vec<&'static str> {
        [
            ("POSTGRES_HOST", self.host.is_none()),
            ("POSTGRES_USER", self.user.is_none()),
            ("POSTGRES_PASSWORD", self.password.is_none()),
            ("POSTGRES_DB", self.database.is_none()),
        ]
        .into_iter()
        .filter(|(_, missing)| *missing)
        .map(|(name, _)| name)
        .collect()
    }

    /// Connection options, failing when any variable is missing.
    pub fn connect_options(&self) -> Result<PgConnectOptions> {
        let missing = self.missing();
        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "Missing DB environment variables: {:?}",
                missing
            )));
        }
        Ok(self.connect_options_with_defaults())
    }

    /// Connection options with local defaults for anything unset.
    pub fn connect_options_with_defaults(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(self.host.as_deref().unwrap_or("localhost"))
            .port(self.port)
            .username(self.user.as_deref().unwrap_or("postgres"))
            .password(self.password.as_deref().unwrap_or("root"))
            .database(self.database.as_deref().unwrap_or("postgres"))
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let schema = var("ANALYTICS_SCHEMA", "analytics");
        if !is_sql_identifier(&schema) {
            return Err(Error::Config(format!(
                "ANALYTICS_SCHEMA is not a valid identifier: {:?}",
                schema
            )));
        }

        Ok(Self {
            server: ServerConfig {
                host: var("HOST", "0.0.0.0"),
                port: parse_var("PORT", &var("PORT", "8000"))?,
                cors_allow_origins: var("CORS_ALLOW_ORIGINS", "*")
                    .split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect(),
            },
            database: DatabaseConfig {
                host: lookup("POSTGRES_HOST"),
                port: parse_var("POSTGRES_PORT", &var("POSTGRES_PORT", "5432"))?,
                user: lookup("POSTGRES_USER"),
                password: lookup("POSTGRES_PASSWORD"),
                database: lookup("POSTGRES_DB"),
                min_connections: parse_var("DB_MIN_CONNECTIONS", &var("DB_MIN_CONNECTIONS", "1"))?,
                max_connections: parse_var(
                    "DB_MAX_CONNECTIONS",
                    &var("DB_MAX_CONNECTIONS", "10"),
                )?,
            },
            analytics: AnalyticsConfig { schema },
            scraper: ScraperConfig {
                data_dir: PathBuf::from(var("DATA_DIR", "data/raw")),
                log_dir: PathBuf::from(var("LOG_DIR", "logs")),
                telegram_web_url: var("TELEGRAM_WEB_URL", "https://t.me"),
                requests_per_second: parse_var(
                    "TELEGRAM_REQUESTS_PER_SECOND",
                    &var("TELEGRAM_REQUESTS_PER_SECOND", "2"),
                )?,
            },
            enrichment: EnrichmentConfig {
                detector_url: lookup("DETECTOR_URL").filter(|u| !u.trim().is_empty()),
                confidence: parse_var("DETECTOR_CONFIDENCE", &var("DETECTOR_CONFIDENCE", "0.35"))?,
                image_size: parse_var("DETECTOR_IMAGE_SIZE", &var("DETECTOR_IMAGE_SIZE", "640"))?,
                min_image_bytes: parse_var("MIN_IMAGE_BYTES", &var("MIN_IMAGE_BYTES", "500"))?,
            },
        })
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("Invalid {}: {:?}", key, value)))
}

/// True for plain (unquoted) SQL identifiers.
pub fn is_sql_identifier(s: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("static regex"))
        .is_match(s)
}
