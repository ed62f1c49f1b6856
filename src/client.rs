//! Public client facade.
//!
//! `WarehouseClient` ties the execution coordinator, the cache backend
//! adapter and the statement registry together behind one handle. Everything
//! that touches the warehouse goes through the configured [`Connector`].

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::{self, CacheKey, CacheStore};
use crate::config::{CacheConfig, ClientConfig};
use crate::connector::{
    Bind, Column, ColumnIdent, Connector, ExecutionOptions, RowStream, StatementStatus,
};
use crate::coordinator::{ExecutionCoordinator, SharedRows};
use crate::error::WarehouseError;
use crate::registry::{drive_statement, CompletionCallback, Delivery, StatementRegistry};

/// Per-call overrides for [`WarehouseClient::execute_with`].
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Result TTL; `None` uses the client default, `Some(Duration::ZERO)`
    /// disables caching for this call.
    pub ttl: Option<Duration>,
    /// Digest the cache key; `None` uses the client default.
    pub use_digest_key: Option<bool>,
    /// Fold bind values into the cache key. Off by default: keys are derived
    /// from SQL text alone, so identical templates with different binds share
    /// a key. Enabling this changes which calls coalesce.
    pub include_binds_in_key: bool,
}

struct ClientInner {
    connector: Arc<dyn Connector>,
    coordinator: ExecutionCoordinator,
    registry: StatementRegistry,
    store: Option<Arc<dyn CacheStore>>,
    default_ttl: Duration,
    digest_keys: bool,
    shutdown: CancellationToken,
}

/// Async client wrapping a remote warehouse query connector with a
/// request-coalescing result cache and a statement handle registry.
///
/// Cheap to clone; clones share the same record table, registry and backend
/// connection.
#[derive(Clone)]
pub struct WarehouseClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for WarehouseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WarehouseClient")
            .field("connector", &self.inner.connector)
            .field("store", &self.inner.store)
            .field("default_ttl", &self.inner.default_ttl)
            .field("digest_keys", &self.inner.digest_keys)
            .finish()
    }
}

impl WarehouseClient {
    pub fn builder() -> WarehouseClientBuilder {
        WarehouseClientBuilder::new()
    }

    /// Execute `sql_text` with the client's default TTL and key policy.
    ///
    /// Concurrent calls with the same SQL text while one is in flight
    /// coalesce into a single submission; within the TTL window after
    /// completion the cached result is served. Note that bind values are not
    /// part of the cache key by default (see [`ExecuteOptions`]).
    pub async fn execute(
        &self,
        sql_text: &str,
        binds: Option<Vec<Bind>>,
    ) -> Result<SharedRows, WarehouseError> {
        self.execute_with(sql_text, binds, ExecuteOptions::default())
            .await
    }

    /// Execute with per-call cache policy overrides.
    pub async fn execute_with(
        &self,
        sql_text: &str,
        binds: Option<Vec<Bind>>,
        options: ExecuteOptions,
    ) -> Result<SharedRows, WarehouseError> {
        let ttl = options.ttl.unwrap_or(self.inner.default_ttl);
        let digest = options.use_digest_key.unwrap_or(self.inner.digest_keys);
        let key = if options.include_binds_in_key {
            CacheKey::with_binds(sql_text, binds.as_deref(), digest)
        } else {
            CacheKey::new(sql_text, digest)
        };
        self.inner.coordinator.execute(sql_text, binds, ttl, key).await
    }

    /// Execute and stream rows lazily. Bypasses the cache entirely; dropping
    /// the returned stream releases the underlying connector resource.
    pub async fn execute_stream(
        &self,
        sql_text: &str,
        binds: Option<Vec<Bind>>,
    ) -> Result<RowStream, WarehouseError> {
        self.inner.coordinator.execute_stream(sql_text, binds).await
    }

    /// Submit a statement uncached and register its handle.
    ///
    /// Returns the statement id synchronously; execution is asynchronous and
    /// delivered through `on_complete` (or the raw-stream consumer). When the
    /// server has not assigned an id yet, a local `stmt`-prefixed id is
    /// synthesized.
    pub fn create_statement(
        &self,
        sql_text: &str,
        binds: Option<Vec<Bind>>,
        on_complete: CompletionCallback,
        delivery: Delivery,
    ) -> Result<String, WarehouseError> {
        let stream_result = !matches!(delivery, Delivery::Rows);
        let submission = self.inner.connector.execute(ExecutionOptions {
            sql_text: sql_text.to_string(),
            binds,
            stream_result,
        })?;

        let statement_id = submission
            .handle
            .statement_id()
            .unwrap_or_else(crate::id::generate_statement_id);
        self.inner
            .registry
            .insert(&statement_id, Arc::clone(&submission.handle));
        debug!(statement_id = %statement_id, "statement registered");

        let shutdown = self.inner.shutdown.clone();
        let handle = submission.handle;
        let completion = submission.completion;
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("statement driver stopped at shutdown");
                }
                _ = drive_statement(handle, completion, on_complete, delivery) => {}
            }
        });

        Ok(statement_id)
    }

    pub fn statement_sql_text(&self, statement_id: &str) -> Result<String, WarehouseError> {
        Ok(self.inner.registry.get(statement_id)?.sql_text())
    }

    pub fn statement_status(
        &self,
        statement_id: &str,
    ) -> Result<StatementStatus, WarehouseError> {
        Ok(self.inner.registry.get(statement_id)?.status())
    }

    pub fn statement_columns(&self, statement_id: &str) -> Result<Vec<Column>, WarehouseError> {
        Ok(self.inner.registry.get(statement_id)?.columns())
    }

    pub fn statement_column(
        &self,
        statement_id: &str,
        ident: &ColumnIdent,
    ) -> Result<Option<Column>, WarehouseError> {
        Ok(self.inner.registry.get(statement_id)?.column(ident))
    }

    pub fn statement_num_rows(&self, statement_id: &str) -> Result<Option<u64>, WarehouseError> {
        Ok(self.inner.registry.get(statement_id)?.num_rows())
    }

    pub fn statement_num_updated_rows(
        &self,
        statement_id: &str,
    ) -> Result<Option<u64>, WarehouseError> {
        Ok(self.inner.registry.get(statement_id)?.num_updated_rows())
    }

    pub fn statement_session_state(
        &self,
        statement_id: &str,
    ) -> Result<Option<serde_json::Value>, WarehouseError> {
        Ok(self.inner.registry.get(statement_id)?.session_state())
    }

    pub fn statement_request_id(&self, statement_id: &str) -> Result<String, WarehouseError> {
        Ok(self.inner.registry.get(statement_id)?.request_id())
    }

    /// Cancel a registered statement. On success the registry entry is
    /// removed; on failure it stays intact and the error surfaces.
    pub async fn cancel_statement(&self, statement_id: &str) -> Result<(), WarehouseError> {
        let handle = self.inner.registry.get(statement_id)?;
        handle.cancel().await?;
        self.inner.registry.remove(statement_id);
        debug!(statement_id = %statement_id, "statement cancelled and removed");
        Ok(())
    }

    /// Probe the cache backend. `Ok(None)` when no backend is configured.
    pub async fn cache_ping(&self) -> Result<Option<String>, WarehouseError> {
        match &self.inner.store {
            None => Ok(None),
            Some(store) => store
                .ping()
                .await
                .map(Some)
                .map_err(|e| WarehouseError::CacheBackend(e.to_string())),
        }
    }

    /// Stop statement driver tasks and release the cache backend connection.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        if let Some(store) = &self.inner.store {
            if let Err(err) = store.disconnect().await {
                warn!(error = %err, "cache disconnect failed");
            }
        }
    }
}

/// Builder for [`WarehouseClient`].
#[derive(Debug, Default)]
pub struct WarehouseClientBuilder {
    connector: Option<Arc<dyn Connector>>,
    store: Option<Arc<dyn CacheStore>>,
    config: ClientConfig,
}

impl WarehouseClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The execution connector. Required.
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Cache backend selection and connection parameters.
    pub fn cache_config(mut self, cache: CacheConfig) -> Self {
        self.config.cache = cache;
        self
    }

    /// Inject a pre-built cache store, bypassing backend selection.
    pub fn cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Default result TTL applied when a call does not override it.
    /// Durations beyond `u64::MAX` milliseconds saturate.
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.config.default_ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Whether cache keys are digested by default.
    pub fn digest_keys(mut self, digest: bool) -> Self {
        self.config.digest_keys = digest;
        self
    }

    /// Validate the configuration, open the cache backend and build the
    /// client. Fails fast on a missing connector or an invalid backend.
    pub async fn build(self) -> Result<WarehouseClient, WarehouseError> {
        let connector = self.connector.ok_or_else(|| {
            WarehouseError::NotInitialized(
                "no connector configured; call connector() before build()".to_string(),
            )
        })?;
        self.config.validate()?;

        let store = match self.store {
            Some(store) => Some(store),
            None => cache::open_store(&self.config.cache).await?,
        };
        let coordinator = ExecutionCoordinator::new(
            Arc::clone(&connector),
            store.clone(),
            self.config.cache.key_prefix.clone(),
        );

        Ok(WarehouseClient {
            inner: Arc::new(ClientInner {
                connector,
                coordinator,
                registry: StatementRegistry::new(),
                store,
                default_ttl: self.config.default_ttl(),
                digest_keys: self.config.digest_keys,
                shutdown: CancellationToken::new(),
            }),
        })
    }
}
