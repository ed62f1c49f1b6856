//! Statement handle registry.
//!
//! Maps statement identifiers to the live handles the connector returned, so
//! long-running or streamed statements issued without caching semantics can
//! be polled for metadata and cancelled later. Entries for completed,
//! never-cancelled statements are retained until explicitly removed; callers
//! must not assume automatic expiry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use tracing::debug;

use crate::connector::{Completion, Row, RowStream, StatementHandle};
use crate::error::WarehouseError;

/// Invoked exactly once with the statement's outcome.
pub type CompletionCallback = Box<dyn FnOnce(Result<Vec<Row>, WarehouseError>) + Send + 'static>;

/// Receives the raw row stream in [`Delivery::RawStream`] mode.
pub type RowConsumer = Box<dyn FnOnce(RowStream) + Send + 'static>;

/// How a statement's rows reach the caller.
pub enum Delivery {
    /// The connector buffers rows; they arrive through the completion
    /// callback.
    Rows,
    /// Rows are pulled from the statement's row stream, buffered, and handed
    /// to the completion callback once after end-of-stream. Stream errors
    /// route to the callback as an error.
    StreamedRows,
    /// The raw row stream is handed to the consumer instead of being
    /// buffered. Submission errors still route to the completion callback.
    RawStream(RowConsumer),
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Delivery::Rows => "Rows",
            Delivery::StreamedRows => "StreamedRows",
            Delivery::RawStream(_) => "RawStream",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatementRegistry {
    statements: Mutex<HashMap<String, Arc<dyn StatementHandle>>>,
}

impl StatementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, statement_id: &str, handle: Arc<dyn StatementHandle>) {
        self.statements
            .lock()
            .unwrap()
            .insert(statement_id.to_string(), handle);
    }

    pub fn get(&self, statement_id: &str) -> Result<Arc<dyn StatementHandle>, WarehouseError> {
        self.statements
            .lock()
            .unwrap()
            .get(statement_id)
            .cloned()
            .ok_or_else(|| WarehouseError::UnknownStatement(statement_id.to_string()))
    }

    pub fn remove(&self, statement_id: &str) {
        self.statements.lock().unwrap().remove(statement_id);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.statements.lock().unwrap().len()
    }
}

/// Drive one statement to delivery. Runs as a background task per statement.
pub(crate) async fn drive_statement(
    handle: Arc<dyn StatementHandle>,
    completion: Completion,
    on_complete: CompletionCallback,
    delivery: Delivery,
) {
    match delivery {
        Delivery::Rows => {
            on_complete(completion.await);
        }
        Delivery::StreamedRows => match completion.await {
            Err(err) => on_complete(Err(err)),
            Ok(_) => match handle.stream_rows() {
                Err(err) => on_complete(Err(err)),
                Ok(mut stream) => {
                    let mut rows = Vec::new();
                    while let Some(item) = stream.next().await {
                        match item {
                            Ok(row) => rows.push(row),
                            Err(err) => {
                                debug!(error = %err, "row stream failed; routing to completion callback");
                                on_complete(Err(err));
                                return;
                            }
                        }
                    }
                    on_complete(Ok(rows));
                }
            },
        },
        Delivery::RawStream(consumer) => match completion.await {
            Err(err) => on_complete(Err(err)),
            Ok(_) => match handle.stream_rows() {
                Err(err) => on_complete(Err(err)),
                Ok(stream) => consumer(stream),
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::mock::{row, MockConnector};
    use crate::connector::{Connector, ExecutionOptions};
    use serde_json::json;

    fn submit(connector: &MockConnector, sql: &str) -> Arc<dyn StatementHandle> {
        connector
            .execute(ExecutionOptions {
                sql_text: sql.to_string(),
                binds: None,
                stream_result: false,
            })
            .unwrap()
            .handle
    }

    #[tokio::test]
    async fn unknown_id_is_an_error() {
        let registry = StatementRegistry::new();
        let err = registry.get("stmt000000").unwrap_err();
        assert!(matches!(err, WarehouseError::UnknownStatement(id) if id == "stmt000000"));
    }

    #[tokio::test]
    async fn insert_get_remove_round_trip() {
        let connector = MockConnector::new();
        connector.script_rows("SELECT 1", vec![row(&[("one", json!(1))])]);
        let handle = submit(&connector, "SELECT 1");

        let registry = StatementRegistry::new();
        registry.insert("stmt-a", handle);
        assert_eq!(registry.get("stmt-a").unwrap().sql_text(), "SELECT 1");
        assert_eq!(registry.len(), 1);

        registry.remove("stmt-a");
        assert!(registry.get("stmt-a").is_err());
        assert_eq!(registry.len(), 0);
    }
}
