pub mod cache;
pub mod client;
pub mod config;
pub mod connector;
mod coordinator;
pub mod error;
pub mod id;
pub mod logging;
pub mod registry;

pub use client::{ExecuteOptions, WarehouseClient, WarehouseClientBuilder};
pub use connector::{
    Bind, Column, ColumnIdent, Completion, Connector, ExecutionOptions, Row, RowStream,
    StatementHandle, StatementStatus, Submission,
};
pub use coordinator::SharedRows;
pub use error::WarehouseError;
pub use registry::{CompletionCallback, Delivery, RowConsumer};
