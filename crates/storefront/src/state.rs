//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use sqlx::PgPool;

use crate::config::StorefrontConfig;
use crate::db::RepositoryError;
use crate::db::stores::StoreRepository;
use crate::models::Store;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: PgPool,
    stores: Cache<String, Store>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Storefront configuration
    /// * `pool` - `PostgreSQL` connection pool
    #[must_use]
    pub fn new(config: StorefrontConfig, pool: PgPool) -> Self {
        let stores = Cache::builder()
            .max_capacity(100)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                stores,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// The store serving `host`, falling back to the default store.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no store matches and no default
    /// store exists.
    pub async fn current_store(&self, host: &str) -> Result<Store, RepositoryError> {
        let host = host.split(':').next().unwrap_or(host).to_ascii_lowercase();

        if let Some(store) = self.inner.stores.get(&host).await {
            return Ok(store);
        }

        let store = StoreRepository::new(self.pool())
            .for_host(&host)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        tracing::debug!(host = %host, store = %store.code, "Resolved store");
        self.inner.stores.insert(host, store.clone()).await;
        Ok(store)
    }
}
