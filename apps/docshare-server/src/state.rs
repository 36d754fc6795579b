//! Application state management

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::auth::JwtKeys;
use crate::config::Config;
use crate::db;
use crate::error::{AppError, StorageError};
use crate::storage::FileStore;

/// Error type for state initialization
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Failed to initialize database: {0}")]
    Database(#[from] AppError),

    #[error("Failed to prepare upload directory: {0}")]
    Storage(#[from] StorageError),
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    pub config: Config,
    pub db: SqlitePool,
    pub files: FileStore,
    pub jwt: JwtKeys,
}

impl AppState {
    /// Create a new application state from already-opened resources
    pub fn new(config: Config, db: SqlitePool, files: FileStore) -> Self {
        let jwt = JwtKeys::new(
            &config.auth.jwt_secret,
            chrono::Duration::days(config.auth.jwt_expire_days),
        );

        Self {
            inner: Arc::new(AppStateInner {
                config,
                db,
                files,
                jwt,
            }),
        }
    }

    /// Open the database and upload directory named in `config`
    pub async fn initialize(config: Config) -> Result<Self, StateError> {
        let pool = db::create_pool(&config.database.url).await?;
        tracing::info!("Database initialized at {}", config.database.url);

        let files = FileStore::open(&config.uploads).await?;

        Ok(Self::new(config, pool, files))
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the database pool
    pub fn db(&self) -> &SqlitePool {
        &self.inner.db
    }

    /// Get the upload store
    pub fn files(&self) -> &FileStore {
        &self.inner.files
    }

    /// Get the token keys
    pub fn jwt(&self) -> &JwtKeys {
        &self.inner.jwt
    }
}
