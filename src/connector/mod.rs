//! The execution connector seam.
//!
//! Everything that actually talks to the warehouse lives behind
//! [`Connector`] and [`StatementHandle`]: connection lifecycle,
//! authentication, the wire protocol and row decoding are all the
//! implementor's concern. The client only coordinates submissions and tracks
//! the handles the connector returns.

use std::fmt::Debug;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::error::WarehouseError;

pub mod mock;

pub use mock::MockConnector;

/// A single result row, as returned by the warehouse.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// A bind parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum Bind {
    Text(String),
    Int(i64),
    Float(f64),
}

impl Bind {
    /// Canonical string form, unambiguous across variants. Used when binds
    /// are folded into a cache key.
    pub(crate) fn canonical(&self) -> String {
        match self {
            Bind::Text(v) => format!("s:{}", v),
            Bind::Int(v) => format!("i:{}", v),
            Bind::Float(v) => format!("f:{}", v),
        }
    }
}

impl From<&str> for Bind {
    fn from(v: &str) -> Self {
        Bind::Text(v.to_string())
    }
}

impl From<String> for Bind {
    fn from(v: String) -> Self {
        Bind::Text(v)
    }
}

impl From<i64> for Bind {
    fn from(v: i64) -> Self {
        Bind::Int(v)
    }
}

impl From<f64> for Bind {
    fn from(v: f64) -> Self {
        Bind::Float(v)
    }
}

/// Options for one submission to the connector.
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    pub sql_text: String,
    pub binds: Option<Vec<Bind>>,
    /// When true the connector leaves rows on the server side and the caller
    /// pulls them through [`StatementHandle::stream_rows`] after completion.
    pub stream_result: bool,
}

/// Resolves once the warehouse reports the statement finished.
///
/// For buffered submissions it carries the full row set; for streamed
/// submissions it resolves with an empty row set once the statement is ready
/// to stream.
pub type Completion = BoxFuture<'static, Result<Vec<Row>, WarehouseError>>;

/// A lazy, finite, single-pass sequence of rows. Dropping the stream releases
/// the underlying connector resource.
pub type RowStream = BoxStream<'static, Result<Row, WarehouseError>>;

/// What `Connector::execute` hands back: the live handle immediately, plus
/// the completion future that fires exactly once.
pub struct Submission {
    pub handle: std::sync::Arc<dyn StatementHandle>,
    pub completion: Completion,
}

impl Debug for Submission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Submission")
            .field("handle", &self.handle)
            .field("completion", &"<future>")
            .finish()
    }
}

/// Fire-and-forget submission to the warehouse.
///
/// `execute` must return without waiting for the network round trip; the
/// round trip is observed through `Submission::completion`.
pub trait Connector: Debug + Send + Sync {
    fn execute(&self, options: ExecutionOptions) -> Result<Submission, WarehouseError>;
}

/// Execution status of an issued statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementStatus {
    Running,
    Complete,
    Failed,
    Cancelled,
}

impl std::fmt::Display for StatementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StatementStatus::Running => "running",
            StatementStatus::Complete => "complete",
            StatementStatus::Failed => "failed",
            StatementStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Column metadata reported by the connector.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Column {
    pub name: String,
    pub index: usize,
    pub type_name: String,
    pub nullable: bool,
}

/// Identifies a column by name or positional index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnIdent {
    Name(String),
    Index(usize),
}

impl From<&str> for ColumnIdent {
    fn from(name: &str) -> Self {
        ColumnIdent::Name(name.to_string())
    }
}

impl From<usize> for ColumnIdent {
    fn from(index: usize) -> Self {
        ColumnIdent::Index(index)
    }
}

/// A live handle to one issued statement.
///
/// Metadata accessors return `None` while the server has not reported the
/// value yet (a statement id, for example, is unknown until the server
/// assigns one).
#[async_trait]
pub trait StatementHandle: Debug + Send + Sync {
    fn sql_text(&self) -> String;
    fn status(&self) -> StatementStatus;
    fn columns(&self) -> Vec<Column>;

    /// Returns the first column matching the identifier, if any.
    fn column(&self, ident: &ColumnIdent) -> Option<Column> {
        let columns = self.columns();
        match ident {
            ColumnIdent::Name(name) => columns.into_iter().find(|c| &c.name == name),
            ColumnIdent::Index(index) => columns.into_iter().find(|c| c.index == *index),
        }
    }

    fn num_rows(&self) -> Option<u64>;
    fn num_updated_rows(&self) -> Option<u64>;
    fn session_state(&self) -> Option<serde_json::Value>;
    fn request_id(&self) -> String;

    /// Server-assigned statement id; `None` while still unknown.
    fn statement_id(&self) -> Option<String>;

    /// Cancel the statement if possible.
    async fn cancel(&self) -> Result<(), WarehouseError>;

    /// Open the row stream for a submission made with `stream_result: true`.
    fn stream_rows(&self) -> Result<RowStream, WarehouseError>;
}
