//! Integration tests for the statement registry: id assignment, metadata
//! accessors, delivery modes and cancellation.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::json;
use tokio::sync::oneshot;

use warebridge::connector::mock::{row, MockConnector};
use warebridge::{
    ColumnIdent, Delivery, StatementStatus, WarehouseClient, WarehouseError,
};

async fn build_client(connector: Arc<MockConnector>) -> WarehouseClient {
    WarehouseClient::builder()
        .connector(connector)
        .build()
        .await
        .unwrap()
}

#[tokio::test]
async fn create_statement_returns_id_before_completion() {
    let connector = Arc::new(MockConnector::new());
    connector.script_rows("SELECT 1", vec![row(&[("one", json!(1))])]);
    connector.set_delay(Duration::from_millis(50));
    let client = build_client(connector.clone()).await;

    let (tx, rx) = oneshot::channel();
    let id = client
        .create_statement(
            "SELECT 1",
            None,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
            Delivery::Rows,
        )
        .unwrap();

    // The identifier is available immediately, while execution is pending.
    assert_eq!(
        client.statement_status(&id).unwrap(),
        StatementStatus::Running
    );

    let rows = rx.await.unwrap().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["one"], json!(1));
    assert_eq!(
        client.statement_status(&id).unwrap(),
        StatementStatus::Complete
    );
}

#[tokio::test]
async fn statement_id_is_synthesized_when_server_has_none() {
    let connector = Arc::new(MockConnector::new());
    let client = build_client(connector).await;

    let (tx, _rx) = oneshot::channel();
    let id = client
        .create_statement(
            "SELECT 1",
            None,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
            Delivery::Rows,
        )
        .unwrap();

    assert_eq!(id.len(), 30);
    assert!(id.starts_with("stmt"));
}

#[tokio::test]
async fn server_assigned_statement_id_is_used() {
    let connector = Arc::new(MockConnector::new());
    connector.script_statement_id("SELECT 1", "01b2fc34-srv");
    let client = build_client(connector).await;

    let (tx, _rx) = oneshot::channel();
    let id = client
        .create_statement(
            "SELECT 1",
            None,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
            Delivery::Rows,
        )
        .unwrap();

    assert_eq!(id, "01b2fc34-srv");
}

#[tokio::test]
async fn accessors_report_statement_metadata() {
    let connector = Arc::new(MockConnector::new());
    connector.script_rows(
        "SELECT a, b FROM t",
        vec![row(&[("a", json!(1)), ("b", json!("x"))])],
    );
    let client = build_client(connector).await;

    let (tx, rx) = oneshot::channel();
    let id = client
        .create_statement(
            "SELECT a, b FROM t",
            None,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
            Delivery::Rows,
        )
        .unwrap();
    rx.await.unwrap().unwrap();

    assert_eq!(client.statement_sql_text(&id).unwrap(), "SELECT a, b FROM t");
    assert_eq!(client.statement_num_rows(&id).unwrap(), Some(1));
    assert_eq!(client.statement_num_updated_rows(&id).unwrap(), Some(0));
    assert!(client.statement_session_state(&id).unwrap().is_some());
    assert!(client.statement_request_id(&id).unwrap().starts_with("req-"));

    let columns = client.statement_columns(&id).unwrap();
    assert_eq!(columns.len(), 2);
    let by_name = client
        .statement_column(&id, &ColumnIdent::Name("b".to_string()))
        .unwrap()
        .unwrap();
    assert_eq!(by_name.type_name, "text");
    let by_index = client
        .statement_column(&id, &ColumnIdent::Index(0))
        .unwrap()
        .unwrap();
    assert_eq!(by_index.name, "a");
    assert!(client
        .statement_column(&id, &ColumnIdent::Name("missing".to_string()))
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn unknown_statement_id_fails_every_accessor() {
    let connector = Arc::new(MockConnector::new());
    let client = build_client(connector).await;

    for result in [
        client.statement_sql_text("stmt-unknown").err(),
        client.statement_status("stmt-unknown").err(),
        client.statement_columns("stmt-unknown").err(),
        client.statement_num_rows("stmt-unknown").err(),
        client.statement_request_id("stmt-unknown").err(),
    ] {
        assert!(matches!(
            result,
            Some(WarehouseError::UnknownStatement(id)) if id == "stmt-unknown"
        ));
    }
}

#[tokio::test]
async fn cancel_removes_the_registry_entry() {
    let connector = Arc::new(MockConnector::new());
    connector.set_delay(Duration::from_millis(100));
    let client = build_client(connector).await;

    let (tx, _rx) = oneshot::channel();
    let id = client
        .create_statement(
            "SELECT pg_sleep(10)",
            None,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
            Delivery::Rows,
        )
        .unwrap();

    client.cancel_statement(&id).await.unwrap();
    assert!(matches!(
        client.statement_status(&id),
        Err(WarehouseError::UnknownStatement(_))
    ));
    assert!(matches!(
        client.cancel_statement(&id).await,
        Err(WarehouseError::UnknownStatement(_))
    ));
}

#[tokio::test]
async fn failed_cancel_keeps_the_registry_entry() {
    let connector = Arc::new(MockConnector::new());
    connector.set_cancel_fails(true);
    connector.set_delay(Duration::from_millis(100));
    let client = build_client(connector).await;

    let (tx, _rx) = oneshot::channel();
    let id = client
        .create_statement(
            "SELECT 1",
            None,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
            Delivery::Rows,
        )
        .unwrap();

    assert!(client.cancel_statement(&id).await.is_err());
    // Entry survives a failed cancel.
    assert!(client.statement_status(&id).is_ok());
}

#[tokio::test]
async fn streamed_rows_are_buffered_and_delivered_once() {
    let connector = Arc::new(MockConnector::new());
    connector.script_rows(
        "SELECT * FROM t",
        vec![row(&[("id", json!(1))]), row(&[("id", json!(2))])],
    );
    let client = build_client(connector).await;

    let (tx, rx) = oneshot::channel();
    client
        .create_statement(
            "SELECT * FROM t",
            None,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
            Delivery::StreamedRows,
        )
        .unwrap();

    let rows = rx.await.unwrap().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["id"], json!(1));
}

#[tokio::test]
async fn stream_error_routes_to_completion_callback() {
    let connector = Arc::new(MockConnector::new());
    connector.script_rows("SELECT * FROM t", vec![row(&[("id", json!(1))])]);
    connector.script_stream_error("SELECT * FROM t", "stream interrupted");
    let client = build_client(connector).await;

    let (tx, rx) = oneshot::channel();
    client
        .create_statement(
            "SELECT * FROM t",
            None,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
            Delivery::StreamedRows,
        )
        .unwrap();

    match rx.await.unwrap() {
        Err(WarehouseError::Execution(message)) => {
            assert!(message.contains("stream interrupted"));
        }
        other => panic!("expected stream error, got {:?}", other),
    }
}

#[tokio::test]
async fn raw_stream_is_handed_to_the_consumer() {
    let connector = Arc::new(MockConnector::new());
    connector.script_rows(
        "SELECT * FROM t",
        vec![row(&[("id", json!(1))]), row(&[("id", json!(2))])],
    );
    let client = build_client(connector).await;

    let (done_tx, _done_rx) = oneshot::channel();
    let (stream_tx, stream_rx) = oneshot::channel();
    client
        .create_statement(
            "SELECT * FROM t",
            None,
            Box::new(move |result| {
                let _ = done_tx.send(result);
            }),
            Delivery::RawStream(Box::new(move |stream| {
                let _ = stream_tx.send(stream);
            })),
        )
        .unwrap();

    let stream = stream_rx.await.unwrap();
    let rows: Vec<_> = stream.map(|item| item.unwrap()).collect().await;
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn submission_error_reaches_completion_callback() {
    let connector = Arc::new(MockConnector::new());
    connector.script_error("SELECT broken", "syntax error");
    let client = build_client(connector).await;

    let (tx, rx) = oneshot::channel();
    client
        .create_statement(
            "SELECT broken",
            None,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
            Delivery::Rows,
        )
        .unwrap();

    match rx.await.unwrap() {
        Err(WarehouseError::Execution(message)) => assert!(message.contains("syntax error")),
        other => panic!("expected execution error, got {:?}", other),
    }
}

#[tokio::test]
async fn shutdown_stops_pending_statement_drivers() {
    let connector = Arc::new(MockConnector::new());
    connector.script_rows("SELECT 1", vec![row(&[("one", json!(1))])]);
    connector.set_delay(Duration::from_millis(200));
    let client = build_client(connector).await;

    let (tx, rx) = oneshot::channel();
    let id = client
        .create_statement(
            "SELECT 1",
            None,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
            Delivery::Rows,
        )
        .unwrap();

    client.shutdown().await;

    // The driver task stops without delivering; the callback is dropped
    // unfired, so the receiver observes a closed channel.
    assert!(rx.await.is_err());
    // The registry entry itself is untouched by shutdown.
    assert_eq!(
        client.statement_status(&id).unwrap(),
        StatementStatus::Running
    );
}

#[tokio::test]
async fn registry_and_coordinator_identifier_spaces_are_disjoint() {
    let connector = Arc::new(MockConnector::new());
    connector.script_rows("SELECT 1", vec![row(&[("one", json!(1))])]);
    let client = build_client(connector.clone()).await;

    // A coordinator execution never registers a statement.
    client.execute("SELECT 1", None).await.unwrap();
    assert!(matches!(
        client.statement_sql_text("SELECT 1"),
        Err(WarehouseError::UnknownStatement(_))
    ));
}
