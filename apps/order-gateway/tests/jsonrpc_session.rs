//! JSON-RPC Session Integration Tests
//!
//! Runs the WebSocket session loop against a real tungstenite client over an
//! in-memory duplex transport, with a mock trading core behind the router.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tokio::io::DuplexStream;
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use order_gateway::application::model::{
    CoreEvent, CoreEventPayload, ExecutionUpdate, MassCancelReport,
};
use order_gateway::application::router::{RequestRouter, run_event_dispatch};
use order_gateway::application::sessions::SessionRegistry;
use order_gateway::domain::order::{ClOrdId, ExecType, OrderStatus, Side};
use order_gateway::domain::session::ClientRequestId;
use order_gateway::infrastructure::auth::StaticCredentialStore;
use order_gateway::infrastructure::config::{SessionSettings, WsSettings};
use order_gateway::{GatewayDeps, MockCore, SessionId, WsServer};

struct Harness {
    ws: WebSocketStream<DuplexStream>,
    mock: MockCore,
    registry: Arc<SessionRegistry>,
    _cancel: CancellationToken,
}

async fn start() -> Harness {
    start_with(WsSettings {
        listen_addr: "unused".to_string(),
        logon_timeout: Duration::from_secs(5),
    })
    .await
}

async fn start_with(settings: WsSettings) -> Harness {
    let registry = Arc::new(SessionRegistry::new());
    let (mock, event_rx) = MockCore::new();
    let credentials = Arc::new(StaticCredentialStore::new([(
        "trader".to_string(),
        "secret".to_string(),
    )]));
    let cancel = CancellationToken::new();

    tokio::spawn(run_event_dispatch(
        event_rx,
        RequestRouter::new(),
        Arc::clone(&registry),
    ));

    let deps = GatewayDeps {
        registry: Arc::clone(&registry),
        core: Arc::new(mock.clone()),
        credentials,
    };
    let server = WsServer::new(deps, settings, SessionSettings::default(), cancel.clone());

    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    tokio::spawn(async move { server.handle_connection(server_io).await });

    let (ws, _response) = tokio_tungstenite::client_async("ws://gateway.test/", client_io)
        .await
        .unwrap();

    Harness {
        ws,
        mock,
        registry,
        _cancel: cancel,
    }
}

impl Harness {
    async fn send(&mut self, value: Value) {
        self.ws
            .send(Message::text(value.to_string()))
            .await
            .unwrap();
    }

    async fn recv(&mut self) -> Value {
        loop {
            let frame = timeout(Duration::from_secs(2), self.ws.next())
                .await
                .expect("timed out waiting for a frame")
                .expect("connection closed while waiting for a frame")
                .unwrap();
            match frame {
                Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
                Message::Ping(_) | Message::Pong(_) => {}
                other => panic!("unexpected frame: {other:?}"),
            }
        }
    }

    async fn expect_closed(&mut self) {
        loop {
            match timeout(Duration::from_secs(2), self.ws.next())
                .await
                .expect("timed out waiting for close")
            {
                None | Some(Ok(Message::Close(_))) => return,
                Some(Ok(_)) => {}
                Some(Err(_)) => return,
            }
        }
    }

    async fn logon(&mut self) {
        self.send(json!({
            "jsonrpc": "2.0",
            "method": "logon",
            "params": {"username": "trader", "password": "secret"},
            "id": 1000,
        }))
        .await;
        let reply = self.recv().await;
        assert_eq!(reply["id"], 1000);
        assert_eq!(reply["result"]["status"], "ok");
    }

    fn session_id(&self) -> SessionId {
        self.mock.operations()[0].session_id
    }

    async fn wait_for_operations(&self, count: usize) {
        for _ in 0..100 {
            if self.mock.operations().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("core never saw {count} operations");
    }
}

fn new_order_params() -> Value {
    json!({
        "cl_ord_id": "test_001",
        "exchange": "deribit",
        "symbol": "BTC-PERPETUAL",
        "side": "BUY",
        "ord_type": "LIMIT",
        "time_in_force": "GTC",
        "quantity": "1.0",
        "price": "123.45",
    })
}

#[tokio::test]
async fn logon_gets_result() {
    let mut harness = start().await;
    harness.logon().await;
}

#[tokio::test]
async fn wrong_password_gets_error_and_close() {
    let mut harness = start().await;
    harness
        .send(json!({
            "jsonrpc": "2.0",
            "method": "logon",
            "params": {"username": "trader", "password": "wrong"},
            "id": 1,
        }))
        .await;

    let reply = harness.recv().await;
    assert_eq!(reply["error"]["code"], -32001);
    harness.expect_closed().await;
}

#[tokio::test]
async fn order_before_logon_is_refused() {
    let mut harness = start().await;
    harness
        .send(json!({
            "jsonrpc": "2.0",
            "method": "new_order_single",
            "params": new_order_params(),
            "id": 1002,
        }))
        .await;

    let reply = harness.recv().await;
    assert_eq!(reply["id"], 1002);
    assert_eq!(reply["error"]["code"], -32001);
    assert!(harness.mock.operations().is_empty());
}

#[tokio::test]
async fn missing_id_is_invalid_request() {
    let mut harness = start().await;
    harness
        .send(json!({
            "jsonrpc": "2.0",
            "method": "logout",
            "params": {},
        }))
        .await;

    let reply = harness.recv().await;
    assert_eq!(reply["error"]["code"], -32600);
    assert_eq!(reply["id"], Value::Null);
}

#[tokio::test]
async fn unknown_method_not_found() {
    let mut harness = start().await;
    harness.logon().await;
    harness
        .send(json!({
            "jsonrpc": "2.0",
            "method": "frobnicate",
            "params": {},
            "id": 9,
        }))
        .await;

    let reply = harness.recv().await;
    assert_eq!(reply["error"]["code"], -32601);
}

#[tokio::test]
async fn order_flow_with_execution_notification_before_cancel_reply() {
    let mut harness = start().await;
    harness.logon().await;

    // Route the order; the gateway acknowledges acceptance directly.
    harness
        .send(json!({
            "jsonrpc": "2.0",
            "method": "new_order_single",
            "params": new_order_params(),
            "id": 1002,
        }))
        .await;
    let accepted = harness.recv().await;
    assert_eq!(accepted["id"], 1002);
    assert_eq!(accepted["result"]["status"], "ok");

    harness.wait_for_operations(1).await;
    let session_id = harness.session_id();

    // The execution report for the order lands before any cancel reply.
    harness
        .mock
        .emit(CoreEvent {
            session_id,
            payload: CoreEventPayload::Execution(ExecutionUpdate {
                cl_ord_id: ClOrdId::from("test_001"),
                orig_cl_ord_id: None,
                exec_id: "e1".to_string(),
                exec_type: ExecType::New,
                ord_status: OrderStatus::New,
                exchange: "deribit".to_string(),
                symbol: "BTC-PERPETUAL".to_string(),
                side: Side::Buy,
                leaves_qty: Decimal::ONE,
                cum_qty: Decimal::ZERO,
                last_qty: None,
                last_px: None,
                mass_status_req_id: None,
                text: None,
            }),
        })
        .await;

    let notification = harness.recv().await;
    assert_eq!(notification["method"], "execution_report");
    assert_eq!(notification["params"]["cl_ord_id"], "test_001");
    assert!(notification.get("id").is_none());

    // Now the cancel round-trips.
    harness
        .send(json!({
            "jsonrpc": "2.0",
            "method": "order_cancel_request",
            "params": {
                "orig_cl_ord_id": "test_001",
                "cl_ord_id": "test_002",
                "exchange": "deribit",
                "symbol": "BTC-PERPETUAL",
            },
            "id": 1003,
        }))
        .await;
    let cancel_reply = harness.recv().await;
    assert_eq!(cancel_reply["id"], 1003);
    assert_eq!(cancel_reply["result"]["status"], "ok");
    assert_eq!(harness.mock.operations().len(), 2);
}

#[tokio::test]
async fn duplicate_cl_ord_id_is_rejected() {
    let mut harness = start().await;
    harness.logon().await;

    harness
        .send(json!({
            "jsonrpc": "2.0",
            "method": "new_order_single",
            "params": new_order_params(),
            "id": 1,
        }))
        .await;
    let first = harness.recv().await;
    assert!(first.get("result").is_some());

    harness
        .send(json!({
            "jsonrpc": "2.0",
            "method": "new_order_single",
            "params": new_order_params(),
            "id": 2,
        }))
        .await;
    let second = harness.recv().await;
    assert_eq!(second["id"], 2);
    assert_eq!(second["error"]["code"], -32000);
    assert_eq!(harness.mock.operations().len(), 1);
}

#[tokio::test]
async fn cancel_of_unknown_order_is_rejected() {
    let mut harness = start().await;
    harness.logon().await;

    harness
        .send(json!({
            "jsonrpc": "2.0",
            "method": "order_cancel_request",
            "params": {
                "orig_cl_ord_id": "never-sent",
                "cl_ord_id": "c1",
                "exchange": "deribit",
                "symbol": "BTC-PERPETUAL",
            },
            "id": 4,
        }))
        .await;

    let reply = harness.recv().await;
    assert_eq!(reply["error"]["code"], -32000);
    assert!(reply["error"]["message"]
        .as_str()
        .unwrap()
        .contains("never-sent"));
}

#[tokio::test]
async fn mass_cancel_correlates_by_request_id() {
    let mut harness = start().await;
    harness.logon().await;

    harness
        .send(json!({
            "jsonrpc": "2.0",
            "method": "order_mass_cancel_request",
            "params": {},
            "id": 1004,
        }))
        .await;
    let accepted = harness.recv().await;
    assert_eq!(accepted["result"]["status"], "ok");

    harness.wait_for_operations(1).await;
    let operation = &harness.mock.operations()[0];
    assert_eq!(operation.client_id, ClientRequestId::Rpc(1004));

    harness
        .mock
        .emit(CoreEvent {
            session_id: operation.session_id,
            payload: CoreEventPayload::MassCancelReport(MassCancelReport {
                client_id: ClientRequestId::Rpc(1004),
                total_affected: 0,
                text: None,
            }),
        })
        .await;

    let report = harness.recv().await;
    assert_eq!(report["method"], "order_mass_cancel_report");
    assert_eq!(report["params"]["total_affected"], 0);
}

#[tokio::test]
async fn unknown_param_field_is_refused_at_codec() {
    let mut harness = start().await;
    harness.logon().await;

    let mut params = new_order_params();
    params["surprise"] = json!(true);
    harness
        .send(json!({
            "jsonrpc": "2.0",
            "method": "new_order_single",
            "params": params,
            "id": 5,
        }))
        .await;

    let reply = harness.recv().await;
    assert_eq!(reply["error"]["code"], -32602);
    assert!(harness.mock.operations().is_empty());
}

#[tokio::test]
async fn downstream_outage_becomes_per_request_error() {
    let mut harness = start().await;
    harness.logon().await;
    harness.mock.set_available(false);

    harness
        .send(json!({
            "jsonrpc": "2.0",
            "method": "new_order_single",
            "params": new_order_params(),
            "id": 6,
        }))
        .await;

    let reply = harness.recv().await;
    assert_eq!(reply["error"]["code"], -32002);

    // The identifier is reusable after the failed dispatch.
    harness.mock.set_available(true);
    harness
        .send(json!({
            "jsonrpc": "2.0",
            "method": "new_order_single",
            "params": new_order_params(),
            "id": 7,
        }))
        .await;
    let retry = harness.recv().await;
    assert_eq!(retry["result"]["status"], "ok");
}

#[tokio::test]
async fn logout_closes_session() {
    let mut harness = start().await;
    harness.logon().await;

    harness
        .send(json!({
            "jsonrpc": "2.0",
            "method": "logout",
            "params": {},
            "id": 1100,
        }))
        .await;

    let reply = harness.recv().await;
    assert_eq!(reply["id"], 1100);
    assert_eq!(reply["result"]["status"], "ok");
    harness.expect_closed().await;
    assert!(harness.registry.is_empty());
}

#[tokio::test]
async fn quiet_connection_without_logon_is_closed() {
    let mut harness = start_with(WsSettings {
        listen_addr: "unused".to_string(),
        logon_timeout: Duration::from_millis(200),
    })
    .await;

    harness.expect_closed().await;
}
