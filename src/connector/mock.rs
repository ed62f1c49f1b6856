//! Mock connector implementation for testing.
//!
//! Provides a configurable mock implementation of [`Connector`] that can be
//! used in tests to avoid needing a real warehouse: per-SQL scripted results,
//! failure injection, completion delay and submission counting.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;

use super::{
    Column, Connector, ExecutionOptions, Row, RowStream, StatementHandle, StatementStatus,
    Submission,
};
use crate::error::WarehouseError;

/// Build a [`Row`] from name/value pairs.
pub fn row(pairs: &[(&str, Value)]) -> Row {
    let mut row = Row::new();
    for (name, value) in pairs {
        row.insert((*name).to_string(), value.clone());
    }
    row
}

#[derive(Debug, Clone, Default)]
struct Script {
    rows: Option<Vec<Row>>,
    error: Option<String>,
    stream_error: Option<String>,
    statement_id: Option<String>,
}

/// Mock connector that can be scripted to succeed, fail, or stream for
/// testing error handling and coalescing behavior.
#[derive(Debug, Default)]
pub struct MockConnector {
    scripts: Mutex<HashMap<String, Script>>,
    default_rows: Mutex<Vec<Row>>,
    delay: Mutex<Duration>,
    submissions: AtomicUsize,
    per_sql: Mutex<HashMap<String, usize>>,
    cancel_fails: Arc<AtomicBool>,
    next_request: AtomicUsize,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows returned for SQL text with no script entry.
    pub fn set_default_rows(&self, rows: Vec<Row>) {
        *self.default_rows.lock().unwrap() = rows;
    }

    /// Delay between submission and completion.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Script a successful result for the given SQL text.
    pub fn script_rows(&self, sql_text: &str, rows: Vec<Row>) {
        let mut scripts = self.scripts.lock().unwrap();
        scripts.entry(sql_text.to_string()).or_default().rows = Some(rows);
    }

    /// Script an execution failure for the given SQL text.
    pub fn script_error(&self, sql_text: &str, message: &str) {
        let mut scripts = self.scripts.lock().unwrap();
        scripts.entry(sql_text.to_string()).or_default().error = Some(message.to_string());
    }

    /// Script a mid-stream failure delivered through the row stream.
    pub fn script_stream_error(&self, sql_text: &str, message: &str) {
        let mut scripts = self.scripts.lock().unwrap();
        scripts.entry(sql_text.to_string()).or_default().stream_error = Some(message.to_string());
    }

    /// Script a server-assigned statement id for the given SQL text.
    /// Without this, handles report no statement id and the registry
    /// synthesizes one.
    pub fn script_statement_id(&self, sql_text: &str, statement_id: &str) {
        let mut scripts = self.scripts.lock().unwrap();
        scripts.entry(sql_text.to_string()).or_default().statement_id =
            Some(statement_id.to_string());
    }

    /// Configure whether cancel operations should fail.
    pub fn set_cancel_fails(&self, fail: bool) {
        self.cancel_fails.store(fail, Ordering::SeqCst);
    }

    /// Total number of submissions observed.
    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    /// Number of submissions observed for the given SQL text.
    pub fn submissions_for(&self, sql_text: &str) -> usize {
        self.per_sql
            .lock()
            .unwrap()
            .get(sql_text)
            .copied()
            .unwrap_or(0)
    }
}

impl Connector for MockConnector {
    fn execute(&self, options: ExecutionOptions) -> Result<Submission, WarehouseError> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        *self
            .per_sql
            .lock()
            .unwrap()
            .entry(options.sql_text.clone())
            .or_insert(0) += 1;

        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&options.sql_text)
            .cloned()
            .unwrap_or_default();
        let rows = script
            .rows
            .unwrap_or_else(|| self.default_rows.lock().unwrap().clone());
        let delay = *self.delay.lock().unwrap();

        let request_id = format!("req-{}", self.next_request.fetch_add(1, Ordering::SeqCst));
        let handle = Arc::new(MockStatementHandle {
            sql_text: options.sql_text,
            request_id,
            statement_id: script.statement_id,
            stream_error: script.stream_error,
            cancel_fails: Arc::clone(&self.cancel_fails),
            state: Mutex::new(HandleState::default()),
        });

        let stream_result = options.stream_result;
        let completion_handle = Arc::clone(&handle);
        let completion = async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match script.error {
                Some(message) => {
                    completion_handle.fail();
                    Err(WarehouseError::Execution(message))
                }
                None => {
                    completion_handle.complete(rows.clone());
                    if stream_result {
                        Ok(Vec::new())
                    } else {
                        Ok(rows)
                    }
                }
            }
        }
        .boxed();

        Ok(Submission { handle, completion })
    }
}

#[derive(Debug)]
struct HandleState {
    status: StatementStatus,
    rows: Option<Vec<Row>>,
    columns: Vec<Column>,
}

impl Default for HandleState {
    fn default() -> Self {
        Self {
            status: StatementStatus::Running,
            rows: None,
            columns: Vec::new(),
        }
    }
}

/// Statement handle produced by [`MockConnector`].
#[derive(Debug)]
pub struct MockStatementHandle {
    sql_text: String,
    request_id: String,
    statement_id: Option<String>,
    stream_error: Option<String>,
    cancel_fails: Arc<AtomicBool>,
    state: Mutex<HandleState>,
}

impl MockStatementHandle {
    fn complete(&self, rows: Vec<Row>) {
        let mut state = self.state.lock().unwrap();
        state.columns = derive_columns(&rows);
        state.rows = Some(rows);
        state.status = StatementStatus::Complete;
    }

    fn fail(&self) {
        let mut state = self.state.lock().unwrap();
        state.status = StatementStatus::Failed;
    }
}

#[async_trait]
impl StatementHandle for MockStatementHandle {
    fn sql_text(&self) -> String {
        self.sql_text.clone()
    }

    fn status(&self) -> StatementStatus {
        self.state.lock().unwrap().status
    }

    fn columns(&self) -> Vec<Column> {
        self.state.lock().unwrap().columns.clone()
    }

    fn num_rows(&self) -> Option<u64> {
        self.state
            .lock()
            .unwrap()
            .rows
            .as_ref()
            .map(|rows| rows.len() as u64)
    }

    fn num_updated_rows(&self) -> Option<u64> {
        match self.state.lock().unwrap().status {
            StatementStatus::Complete => Some(0),
            _ => None,
        }
    }

    fn session_state(&self) -> Option<serde_json::Value> {
        match self.state.lock().unwrap().status {
            StatementStatus::Complete => Some(serde_json::json!({
                "warehouse": "mock",
                "database": "mock",
            })),
            _ => None,
        }
    }

    fn request_id(&self) -> String {
        self.request_id.clone()
    }

    fn statement_id(&self) -> Option<String> {
        self.statement_id.clone()
    }

    async fn cancel(&self) -> Result<(), WarehouseError> {
        if self.cancel_fails.load(Ordering::SeqCst) {
            return Err(WarehouseError::Execution(
                "cancel refused by mock".to_string(),
            ));
        }
        let mut state = self.state.lock().unwrap();
        state.status = StatementStatus::Cancelled;
        Ok(())
    }

    fn stream_rows(&self) -> Result<RowStream, WarehouseError> {
        let state = self.state.lock().unwrap();
        let rows = match &state.rows {
            Some(rows) => rows.clone(),
            None => {
                return Err(WarehouseError::Execution(
                    "statement has not completed; no rows to stream".to_string(),
                ))
            }
        };
        let mut items: Vec<Result<Row, WarehouseError>> = rows.into_iter().map(Ok).collect();
        if let Some(message) = &self.stream_error {
            items.push(Err(WarehouseError::Execution(message.clone())));
        }
        Ok(Box::pin(futures::stream::iter(items)))
    }
}

fn derive_columns(rows: &[Row]) -> Vec<Column> {
    rows.first()
        .map(|row| {
            row.iter()
                .enumerate()
                .map(|(index, (name, value))| Column {
                    name: name.clone(),
                    index,
                    type_name: json_type_name(value).to_string(),
                    nullable: true,
                })
                .collect()
        })
        .unwrap_or_default()
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "text",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
