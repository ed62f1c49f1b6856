//! Error types for warehouse client operations.

use thiserror::Error;

/// Errors surfaced by the warehouse client.
///
/// Cache backend failures are deliberately absent from most paths: the cache
/// is an optimization layer, so `get` failures degrade to misses and `set`
/// failures are logged and dropped. Only explicit backend operations such as
/// `ping` report [`WarehouseError::CacheBackend`].
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// No execution connector is configured.
    #[error("connector is not initialized: {0}")]
    NotInitialized(String),

    /// The connector reported a failure while executing a statement.
    #[error("query execution failed: {0}")]
    Execution(String),

    /// Accessor or cancel invoked with an identifier the registry does not know.
    #[error("statement id '{0}' is invalid or expired")]
    UnknownStatement(String),

    /// Cache backend selector names a backend this crate does not provide.
    #[error("unsupported cache backend: {0}")]
    InvalidCacheBackend(String),

    /// An explicit cache backend operation (ping, connect) failed.
    #[error("cache backend error: {0}")]
    CacheBackend(String),
}
