//! Execution coordinator: single-flight deduplication and the time-windowed
//! result cache.
//!
//! One [`ExecutionRecord`] exists per distinct cache key at a time. A record
//! is created `running` in the same critical section that decides a call is a
//! miss, so any concurrent caller for the key joins the already-registered
//! shared future instead of submitting a second time. Completion flips the
//! record to idle and either stores rows or marks it failed; an expired or
//! failed record is overwritten by the next submission, never mutated by two
//! submissions at once.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, CacheStore, CachedRows};
use crate::connector::{Bind, Connector, ExecutionOptions, Row, RowStream};
use crate::error::WarehouseError;

/// Rows shared by every waiter of one execution.
pub type SharedRows = Arc<Vec<Row>>;

/// Cloneable failure carried through the shared future to every waiter.
#[derive(Debug, Clone)]
struct ExecutionFailure {
    message: String,
}

type SharedExecution = Shared<BoxFuture<'static, Result<SharedRows, ExecutionFailure>>>;

struct ExecutionRecord {
    running: bool,
    failed: bool,
    /// The single future all concurrent callers for this key observe.
    result: SharedExecution,
    rows: Option<SharedRows>,
    completed_at: Option<Instant>,
    ttl: Duration,
}

impl ExecutionRecord {
    fn is_fresh(&self) -> bool {
        match (self.completed_at, &self.rows) {
            (Some(completed_at), Some(_)) => completed_at.elapsed() < self.ttl,
            _ => false,
        }
    }
}

enum Lookup {
    Join(SharedExecution),
    Fresh(SharedRows),
    Miss,
}

pub(crate) struct ExecutionCoordinator {
    connector: Arc<dyn Connector>,
    store: Option<Arc<dyn CacheStore>>,
    key_prefix: String,
    records: Arc<Mutex<HashMap<CacheKey, ExecutionRecord>>>,
}

impl ExecutionCoordinator {
    pub fn new(
        connector: Arc<dyn Connector>,
        store: Option<Arc<dyn CacheStore>>,
        key_prefix: String,
    ) -> Self {
        Self {
            connector,
            store,
            key_prefix,
            records: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Execute `sql_text`, coalescing with any in-flight execution for `key`
    /// and serving a cached result while one is fresh. `ttl == 0` disables
    /// caching for this call both ways: the result is not stored, and a
    /// result cached by an earlier call for the same key is not served. An
    /// in-flight execution is still joined.
    pub async fn execute(
        &self,
        sql_text: &str,
        binds: Option<Vec<Bind>>,
        ttl: Duration,
        key: CacheKey,
    ) -> Result<SharedRows, WarehouseError> {
        let lookup = {
            let mut records = self.records.lock().unwrap();
            let found = match records.get(&key) {
                Some(record) if record.running => Lookup::Join(record.result.clone()),
                // is_fresh implies rows are present; they are set together.
                Some(record) if !ttl.is_zero() && !record.failed && record.is_fresh() => {
                    Lookup::Fresh(record.rows.clone().unwrap_or_default())
                }
                _ => Lookup::Miss,
            };
            match found {
                Lookup::Miss => {
                    Lookup::Join(self.submit(&mut records, key.clone(), sql_text, binds, ttl))
                }
                other => other,
            }
        };

        match lookup {
            Lookup::Join(shared) => shared
                .await
                .map_err(|failure| WarehouseError::Execution(failure.message)),
            Lookup::Fresh(rows) => Ok(self.read_through(&key, rows).await),
            Lookup::Miss => unreachable!("miss resolved to a submission above"),
        }
    }

    /// Streaming variant: bypasses the record table and the cache entirely.
    pub async fn execute_stream(
        &self,
        sql_text: &str,
        binds: Option<Vec<Bind>>,
    ) -> Result<RowStream, WarehouseError> {
        let submission = self.connector.execute(ExecutionOptions {
            sql_text: sql_text.to_string(),
            binds,
            stream_result: true,
        })?;
        submission.completion.await?;
        submission.handle.stream_rows()
    }

    /// Register a running record for `key` and spawn the execution. Must be
    /// called with the record table locked so the check-and-insert is atomic.
    fn submit(
        &self,
        records: &mut HashMap<CacheKey, ExecutionRecord>,
        key: CacheKey,
        sql_text: &str,
        binds: Option<Vec<Bind>>,
        ttl: Duration,
    ) -> SharedExecution {
        info!(key = %key, "submitting query to connector");

        let connector = Arc::clone(&self.connector);
        let store = self.store.clone();
        let table = Arc::clone(&self.records);
        let storage_key = key.storage_key(&self.key_prefix);
        let task_key = key.clone();
        let sql_text = sql_text.to_string();

        let task = async move {
            let outcome = match connector.execute(ExecutionOptions {
                sql_text,
                binds,
                stream_result: false,
            }) {
                Ok(submission) => submission.completion.await,
                Err(err) => Err(err),
            };

            match outcome {
                Ok(rows) => {
                    let rows = Arc::new(rows);
                    {
                        let mut records = table.lock().unwrap();
                        if let Some(record) = records.get_mut(&task_key) {
                            record.running = false;
                            if !ttl.is_zero() {
                                record.rows = Some(Arc::clone(&rows));
                                record.completed_at = Some(Instant::now());
                            }
                        }
                    }
                    if !ttl.is_zero() {
                        if let Some(store) = store {
                            write_through(store.as_ref(), &storage_key, &rows, ttl).await;
                        }
                    }
                    Ok(rows)
                }
                Err(err) => {
                    let mut records = table.lock().unwrap();
                    if let Some(record) = records.get_mut(&task_key) {
                        record.running = false;
                        record.failed = true;
                    }
                    Err(ExecutionFailure {
                        message: err.to_string(),
                    })
                }
            }
        };

        // Spawned so the execution proceeds even if every waiter is dropped.
        let handle = tokio::spawn(task);
        let shared = handle
            .map(|joined| match joined {
                Ok(result) => result,
                Err(err) => Err(ExecutionFailure {
                    message: format!("execution task aborted: {err}"),
                }),
            })
            .boxed()
            .shared();

        records.insert(
            key,
            ExecutionRecord {
                running: true,
                failed: false,
                result: shared.clone(),
                rows: None,
                completed_at: None,
                ttl,
            },
        );
        shared
    }

    /// Fresh-cache hit: prefer the backend copy for cross-process
    /// consistency, falling back to the in-process rows on any miss or error.
    async fn read_through(&self, key: &CacheKey, local: SharedRows) -> SharedRows {
        let Some(store) = &self.store else {
            debug!(key = %key, "cache hit (in-process)");
            return local;
        };
        let storage_key = key.storage_key(&self.key_prefix);
        match store.get(&storage_key).await {
            Ok(Some(json)) => match serde_json::from_str::<CachedRows>(&json) {
                Ok(envelope) => {
                    debug!(key = %storage_key, "cache hit (backend)");
                    return Arc::new(envelope.data);
                }
                Err(err) => {
                    warn!(key = %storage_key, error = %err, "corrupt cache entry; serving in-process rows");
                }
            },
            Ok(None) => {
                debug!(key = %storage_key, "backend miss; serving in-process rows");
            }
            Err(err) => {
                warn!(key = %storage_key, error = %err, "cache read failed; serving in-process rows");
            }
        }
        local
    }
}

/// Best-effort cache write. A cache-write failure must not fail the query.
async fn write_through(store: &dyn CacheStore, storage_key: &str, rows: &[Row], ttl: Duration) {
    let envelope = CachedRows::new(rows.to_vec());
    match serde_json::to_string(&envelope) {
        Ok(json) => {
            if let Err(err) = store.set(storage_key, &json, ttl).await {
                warn!(key = %storage_key, error = %err, "cache write failed; result held in memory only");
            }
        }
        Err(err) => {
            warn!(key = %storage_key, error = %err, "failed to serialize rows for cache");
        }
    }
}
