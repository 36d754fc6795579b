//! Configuration management for DocShare Server

use serde::Deserialize;
use std::env;
use std::path::PathBuf;

/// Default per-file upload limit: 10MB
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Default per-user storage quota: 1GB
pub const DEFAULT_STORAGE_LIMIT: i64 = 1024 * 1024 * 1024;

/// Extensions accepted for upload when `ALLOWED_FILE_TYPES` is unset
pub const DEFAULT_ALLOWED_TYPES: &[&str] = &["pdf", "doc", "docx", "txt", "ppt", "pptx", "xls", "xlsx"];

const DEV_JWT_SECRET: &str = "docshare-development-secret";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub uploads: UploadConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    /// Allowed CORS origins; empty means any origin
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expire_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub dir: PathBuf,
    pub max_file_size: u64,
    pub allowed_types: Vec<String>,
    pub default_storage_limit: i64,
}

/// Per-client request budgets. A `max_requests` of 0 turns that limiter off.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub general: RateLimitRule,
    pub upload: RateLimitRule,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RateLimitRule {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl RateLimitRule {
    pub const fn new(max_requests: u32, window_secs: u64) -> Self {
        Self { max_requests, window_secs }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_requests > 0 && self.window_secs > 0
    }
}

/// 100 requests per 15 minutes for everything
pub const DEFAULT_GENERAL_LIMIT: RateLimitRule = RateLimitRule::new(100, 15 * 60);

/// 20 uploads per hour
pub const DEFAULT_UPLOAD_LIMIT: RateLimitRule = RateLimitRule::new(20, 60 * 60);

/// Errors raised while reading configuration from the environment
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("JWT_SECRET must be set when APP_ENV=production")]
    MissingJwtSecret,

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5000,
                environment: "development".to_string(),
                cors_origins: Vec::new(),
            },
            database: DatabaseConfig {
                url: "sqlite:./docshare.db".to_string(),
            },
            auth: AuthConfig {
                jwt_secret: DEV_JWT_SECRET.to_string(),
                jwt_expire_days: 7,
            },
            uploads: UploadConfig {
                dir: PathBuf::from("./uploads"),
                max_file_size: DEFAULT_MAX_FILE_SIZE,
                allowed_types: DEFAULT_ALLOWED_TYPES.iter().map(|t| t.to_string()).collect(),
                default_storage_limit: DEFAULT_STORAGE_LIMIT,
            },
            rate_limit: RateLimitConfig {
                general: DEFAULT_GENERAL_LIMIT,
                upload: DEFAULT_UPLOAD_LIMIT,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ if environment == "production" => return Err(ConfigError::MissingJwtSecret),
            _ => DEV_JWT_SECRET.to_string(),
        };

        let port = env::var("SERVER_PORT")
            .or_else(|_| env::var("PORT"))
            .unwrap_or_else(|_| "5000".to_string());

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_var("SERVER_PORT", &port)?,
                environment,
                cors_origins: env::var("CORS_ORIGINS")
                    .map(|v| split_list(&v))
                    .unwrap_or_default(),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:./docshare.db".to_string()),
            },
            auth: AuthConfig {
                jwt_secret,
                jwt_expire_days: env_or("JWT_EXPIRE_DAYS", 7)?,
            },
            uploads: UploadConfig {
                dir: PathBuf::from(env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string())),
                max_file_size: env_or("MAX_FILE_SIZE", DEFAULT_MAX_FILE_SIZE)?,
                allowed_types: env::var("ALLOWED_FILE_TYPES")
                    .map(|v| split_list(&v).into_iter().map(|t| t.to_lowercase()).collect())
                    .unwrap_or_else(|_| DEFAULT_ALLOWED_TYPES.iter().map(|t| t.to_string()).collect()),
                default_storage_limit: env_or("DEFAULT_STORAGE_LIMIT", DEFAULT_STORAGE_LIMIT)?,
            },
            rate_limit: RateLimitConfig {
                general: RateLimitRule::new(
                    env_or("RATE_LIMIT_MAX_REQUESTS", DEFAULT_GENERAL_LIMIT.max_requests)?,
                    env_or("RATE_LIMIT_WINDOW_SECS", DEFAULT_GENERAL_LIMIT.window_secs)?,
                ),
                upload: RateLimitRule::new(
                    env_or("UPLOAD_RATE_LIMIT_MAX_REQUESTS", DEFAULT_UPLOAD_LIMIT.max_requests)?,
                    env_or("UPLOAD_RATE_LIMIT_WINDOW_SECS", DEFAULT_UPLOAD_LIMIT.window_secs)?,
                ),
            },
        })
    }

    pub fn is_production(&self) -> bool {
        self.server.environment == "production"
    }
}

fn env_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => parse_var(name, &value),
        Err(_) => Ok(default),
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name,
        value: value.to_string(),
    })
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
