//! FIX Session Integration Tests
//!
//! Drives real FIX 4.4 wire bytes through the session loop over an in-memory
//! duplex transport, with a mock trading core behind the router.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, DuplexStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use order_gateway::application::model::{
    CoreEvent, CoreEventPayload, ExecutionUpdate, MarketDataUpdate, MassCancelReport,
    PositionUpdate, PositionsComplete,
};
use order_gateway::application::router::{RequestRouter, run_event_dispatch};
use order_gateway::application::sessions::SessionRegistry;
use order_gateway::domain::order::{ClOrdId, ExecType, OrderStatus, Side};
use order_gateway::domain::session::ClientRequestId;
use order_gateway::domain::subscription::{Instrument, MdEntryType};
use order_gateway::infrastructure::auth::StaticCredentialStore;
use order_gateway::infrastructure::config::{FixSettings, SeqGapPolicy, SessionSettings};
use order_gateway::infrastructure::fix::{DecodeOutcome, FixMessage, codec, tags};
use order_gateway::{FixServer, GatewayDeps, MockCore, SessionId};

use rust_decimal::Decimal;

struct Harness {
    client: DuplexStream,
    buf: Vec<u8>,
    mock: MockCore,
    registry: Arc<SessionRegistry>,
    _cancel: CancellationToken,
}

fn test_settings() -> FixSettings {
    FixSettings {
        listen_addr: None,
        unix_socket: None,
        comp_id: "proxy".to_string(),
        heartbeat_interval: Duration::from_secs(30),
        logon_timeout: Duration::from_secs(5),
        seq_gap_policy: SeqGapPolicy::Terminate,
    }
}

async fn start(settings: FixSettings) -> Harness {
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
    let server = FixServer::new(deps, settings, SessionSettings::default(), cancel.clone());

    let (client, server_io) = tokio::io::duplex(64 * 1024);
    tokio::spawn(async move { server.handle_connection(server_io).await });

    Harness {
        client,
        buf: Vec::new(),
        mock,
        registry,
        _cancel: cancel,
    }
}

fn client_message(msg_type: &str, seq: u64, body: &[(u32, &str)]) -> Vec<u8> {
    let mut message = FixMessage::new(msg_type)
        .with(tags::SENDER_COMP_ID, "test")
        .with(tags::TARGET_COMP_ID, "proxy")
        .with(tags::MSG_SEQ_NUM, seq.to_string())
        .with(tags::SENDING_TIME, "20230928-16:42:00.000000");
    for (tag, value) in body {
        message.push(*tag, *value);
    }
    codec::encode(&message)
}

impl Harness {
    async fn send(&mut self, bytes: &[u8]) {
        use tokio::io::AsyncWriteExt;
        self.client.write_all(bytes).await.unwrap();
    }

    async fn read_frame(&mut self) -> FixMessage {
        loop {
            match codec::decode(&self.buf).unwrap() {
                DecodeOutcome::Message { message, consumed } => {
                    self.buf.drain(..consumed);
                    return message;
                }
                DecodeOutcome::NeedMoreData => {
                    let mut chunk = [0u8; 4096];
                    let n = timeout(Duration::from_secs(2), self.client.read(&mut chunk))
                        .await
                        .expect("timed out waiting for a frame")
                        .unwrap();
                    assert!(n > 0, "connection closed while waiting for a frame");
                    self.buf.extend_from_slice(&chunk[..n]);
                }
            }
        }
    }

    async fn expect_closed(&mut self) {
        let mut chunk = [0u8; 256];
        loop {
            let n = timeout(Duration::from_secs(2), self.client.read(&mut chunk))
                .await
                .expect("timed out waiting for close")
                .unwrap();
            if n == 0 {
                return;
            }
        }
    }

    async fn logon(&mut self) {
        self.send(&client_message(
            "A",
            1,
            &[(tags::USERNAME, "trader"), (tags::PASSWORD, "secret")],
        ))
        .await;
        let ack = self.read_frame().await;
        assert_eq!(ack.msg_type(), Some("A"));
    }

    fn session_id(&self) -> SessionId {
        self.mock.operations()[0].session_id
    }
}

fn order_body(cl_ord_id: &str) -> Vec<(u32, &str)> {
    vec![
        (tags::CL_ORD_ID, cl_ord_id),
        (tags::ACCOUNT, "A1"),
        (tags::SYMBOL, "BTC-PERPETUAL"),
        (tags::SECURITY_EXCHANGE, "deribit"),
        (tags::SIDE, "1"),
        (tags::ORD_TYPE, "2"),
        (tags::ORDER_QTY, "1.0"),
        (tags::PRICE, "100.0"),
        (tags::TIME_IN_FORCE, "1"),
    ]
}

#[tokio::test]
async fn logon_is_acknowledged() {
    let mut harness = start(test_settings()).await;

    harness
        .send(&client_message(
            "A",
            1,
            &[(tags::USERNAME, "trader"), (tags::PASSWORD, "secret")],
        ))
        .await;

    let ack = harness.read_frame().await;
    assert_eq!(ack.msg_type(), Some("A"));
    assert_eq!(ack.get(tags::ENCRYPT_METHOD), Some("0"));
    assert_eq!(ack.get(tags::HEART_BT_INT), Some("30"));
    assert_eq!(ack.get(tags::SENDER_COMP_ID), Some("proxy"));
    assert_eq!(ack.get(tags::TARGET_COMP_ID), Some("test"));
    assert_eq!(ack.get(tags::MSG_SEQ_NUM), Some("1"));
}

#[tokio::test]
async fn bad_credentials_refused_and_disconnected() {
    let mut harness = start(test_settings()).await;

    harness
        .send(&client_message(
            "A",
            1,
            &[(tags::USERNAME, "trader"), (tags::PASSWORD, "wrong")],
        ))
        .await;

    let logout = harness.read_frame().await;
    assert_eq!(logout.msg_type(), Some("5"));
    assert_eq!(logout.get(tags::TEXT), Some("authentication failed"));
    harness.expect_closed().await;
}

#[tokio::test]
async fn order_before_logon_rejected_and_disconnected() {
    let mut harness = start(test_settings()).await;

    harness
        .send(&client_message("D", 1, &order_body("early1")))
        .await;

    let reject = harness.read_frame().await;
    assert_eq!(reject.msg_type(), Some("3"));
    assert_eq!(reject.get(tags::TEXT), Some("logon required"));
    harness.expect_closed().await;

    // Nothing reached the core.
    assert!(harness.mock.operations().is_empty());
}

#[tokio::test]
async fn duplicate_cl_ord_id_yields_one_acceptance_one_reject() {
    let mut harness = start(test_settings()).await;
    harness.logon().await;

    harness
        .send(&client_message("D", 2, &order_body("dup1")))
        .await;
    harness
        .send(&client_message("D", 3, &order_body("dup1")))
        .await;

    let reject = harness.read_frame().await;
    assert_eq!(reject.msg_type(), Some("j"));
    assert_eq!(reject.get(tags::BUSINESS_REJECT_REF_ID), Some("dup1"));

    // Exactly one order went downstream.
    assert_eq!(harness.mock.operations().len(), 1);
}

#[tokio::test]
async fn cancel_of_unknown_order_rejected() {
    let mut harness = start(test_settings()).await;
    harness.logon().await;

    harness
        .send(&client_message(
            "F",
            2,
            &[
                (tags::ORIG_CL_ORD_ID, "never-sent"),
                (tags::CL_ORD_ID, "c1"),
                (tags::SYMBOL, "BTC-PERPETUAL"),
                (tags::SECURITY_EXCHANGE, "deribit"),
            ],
        ))
        .await;

    let reject = harness.read_frame().await;
    assert_eq!(reject.msg_type(), Some("j"));
    // BusinessRejectReason(380) = 1: unknown id.
    assert_eq!(reject.get(tags::BUSINESS_REJECT_REASON), Some("1"));
    assert!(harness.mock.operations().is_empty());
}

#[tokio::test]
async fn sequence_gap_terminates_session() {
    let mut harness = start(test_settings()).await;
    harness.logon().await;

    // Jump from 1 straight to 5.
    harness
        .send(&client_message("D", 5, &order_body("gap1")))
        .await;

    let logout = harness.read_frame().await;
    assert_eq!(logout.msg_type(), Some("5"));
    assert!(logout.get(tags::TEXT).unwrap().contains("sequence gap"));
    harness.expect_closed().await;
}

#[tokio::test]
async fn sequence_gap_ignored_under_permissive_policy() {
    let settings = FixSettings {
        seq_gap_policy: SeqGapPolicy::Ignore,
        ..test_settings()
    };
    let mut harness = start(settings).await;
    harness.logon().await;

    harness
        .send(&client_message("D", 5, &order_body("gap1")))
        .await;

    // The order is routed despite the gap.
    for _ in 0..50 {
        if !harness.mock.operations().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(harness.mock.operations().len(), 1);
}

#[tokio::test]
async fn mass_cancel_zero_matches_still_gets_terminal_ack() {
    let mut harness = start(test_settings()).await;
    harness.logon().await;

    harness
        .send(&client_message(
            "q",
            2,
            &[
                (tags::CL_ORD_ID, "mc1"),
                (tags::SECURITY_EXCHANGE, "deribit"),
                (tags::MASS_CANCEL_REQUEST_TYPE, "7"),
                (tags::TRANSACT_TIME, "20230928-16:42:00"),
            ],
        ))
        .await;

    // Wait for the routed operation, then answer with zero affected orders.
    for _ in 0..50 {
        if !harness.mock.operations().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let session_id = harness.session_id();
    harness
        .mock
        .emit(CoreEvent {
            session_id,
            payload: CoreEventPayload::MassCancelReport(MassCancelReport {
                client_id: ClientRequestId::ClOrd(ClOrdId::from("mc1")),
                total_affected: 0,
                text: None,
            }),
        })
        .await;

    let report = harness.read_frame().await;
    assert_eq!(report.msg_type(), Some("r"));
    assert_eq!(report.get(tags::CL_ORD_ID), Some("mc1"));
    assert_eq!(report.get(tags::TOTAL_AFFECTED_ORDERS), Some("0"));
}

#[tokio::test]
async fn positions_fan_out_then_terminal_marker() {
    let mut harness = start(test_settings()).await;
    harness.logon().await;

    harness
        .send(&client_message(
            "AN",
            2,
            &[
                (tags::ACCOUNT, "A1"),
                (tags::SECURITY_EXCHANGE, "deribit"),
                (tags::ACCOUNT_TYPE, "1"),
                (tags::POS_REQ_ID, "pos_00002"),
                (tags::POS_REQ_TYPE, "0"),
            ],
        ))
        .await;

    for _ in 0..50 {
        if !harness.mock.operations().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let session_id = harness.session_id();

    for symbol in ["BTC-PERPETUAL", "ETH-PERPETUAL"] {
        harness
            .mock
            .emit(CoreEvent {
                session_id,
                payload: CoreEventPayload::PositionReport(PositionUpdate {
                    pos_req_id: "pos_00002".to_string(),
                    account: "A1".to_string(),
                    exchange: "deribit".to_string(),
                    symbol: symbol.to_string(),
                    long_qty: Decimal::ONE,
                    short_qty: Decimal::ZERO,
                }),
            })
            .await;
    }
    harness
        .mock
        .emit(CoreEvent {
            session_id,
            payload: CoreEventPayload::PositionsComplete(PositionsComplete {
                pos_req_id: "pos_00002".to_string(),
                total: 2,
            }),
        })
        .await;

    let first = harness.read_frame().await;
    assert_eq!(first.msg_type(), Some("AP"));
    assert_eq!(first.get(tags::POS_REQ_ID), Some("pos_00002"));

    let second = harness.read_frame().await;
    assert_eq!(second.msg_type(), Some("AP"));
    assert_eq!(second.get(tags::POS_REQ_ID), Some("pos_00002"));

    let done = harness.read_frame().await;
    assert_eq!(done.msg_type(), Some("AO"));
    assert_eq!(done.get(tags::TOTAL_NUM_POS_REPORTS), Some("2"));
}

#[tokio::test]
async fn market_data_snapshot_then_incremental() {
    let mut harness = start(test_settings()).await;
    harness.logon().await;

    harness
        .send(&client_message(
            "V",
            2,
            &[
                (tags::MD_REQ_ID, "md1"),
                (tags::SUBSCRIPTION_REQUEST_TYPE, "1"),
                (tags::MARKET_DEPTH, "0"),
                (tags::MD_UPDATE_TYPE, "1"),
                (tags::AGGREGATED_BOOK, "N"),
                (tags::NO_MD_ENTRY_TYPES, "2"),
                (tags::MD_ENTRY_TYPE, "0"),
                (tags::MD_ENTRY_TYPE, "1"),
                (tags::NO_RELATED_SYM, "1"),
                (tags::SYMBOL, "BTC-PERPETUAL"),
                (tags::SECURITY_EXCHANGE, "deribit"),
            ],
        ))
        .await;

    for _ in 0..50 {
        if !harness.mock.operations().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let session_id = harness.session_id();
    let instrument = Instrument {
        symbol: "BTC-PERPETUAL".to_string(),
        exchange: "deribit".to_string(),
    };

    harness
        .mock
        .emit(CoreEvent {
            session_id,
            payload: CoreEventPayload::MarketData(MarketDataUpdate {
                md_req_id: "md1".to_string(),
                instrument: instrument.clone(),
                is_snapshot: true,
                entries: vec![order_gateway::application::model::MdEntry {
                    entry_type: MdEntryType::Bid,
                    price: Decimal::new(100_005, 1),
                    size: Decimal::ONE,
                    action: None,
                }],
            }),
        })
        .await;
    harness
        .mock
        .emit(CoreEvent {
            session_id,
            payload: CoreEventPayload::MarketData(MarketDataUpdate {
                md_req_id: "md1".to_string(),
                instrument,
                is_snapshot: false,
                entries: vec![order_gateway::application::model::MdEntry {
                    entry_type: MdEntryType::Offer,
                    price: Decimal::new(100_015, 1),
                    size: Decimal::TWO,
                    action: Some(order_gateway::application::model::MdUpdateAction::New),
                }],
            }),
        })
        .await;

    let snapshot = harness.read_frame().await;
    assert_eq!(snapshot.msg_type(), Some("W"));
    assert_eq!(snapshot.get(tags::MD_REQ_ID), Some("md1"));
    assert_eq!(snapshot.get(tags::NO_MD_ENTRIES), Some("1"));

    let incremental = harness.read_frame().await;
    assert_eq!(incremental.msg_type(), Some("X"));
    assert_eq!(incremental.get(tags::MD_UPDATE_ACTION), Some("0"));
}

#[tokio::test]
async fn execution_reports_preserve_per_order_sequence() {
    let mut harness = start(test_settings()).await;
    harness.logon().await;

    harness
        .send(&client_message("D", 2, &order_body("ord1")))
        .await;
    for _ in 0..50 {
        if !harness.mock.operations().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let session_id = harness.session_id();

    let make_update = |exec_type, status, exec_id: &str| ExecutionUpdate {
        cl_ord_id: ClOrdId::from("ord1"),
        orig_cl_ord_id: None,
        exec_id: exec_id.to_string(),
        exec_type,
        ord_status: status,
        exchange: "deribit".to_string(),
        symbol: "BTC-PERPETUAL".to_string(),
        side: Side::Buy,
        leaves_qty: Decimal::ZERO,
        cum_qty: Decimal::ONE,
        last_qty: None,
        last_px: None,
        mass_status_req_id: None,
        text: None,
    };

    harness
        .mock
        .emit(CoreEvent {
            session_id,
            payload: CoreEventPayload::Execution(make_update(
                ExecType::New,
                OrderStatus::New,
                "e1",
            )),
        })
        .await;
    harness
        .mock
        .emit(CoreEvent {
            session_id,
            payload: CoreEventPayload::Execution(make_update(
                ExecType::Trade,
                OrderStatus::Filled,
                "e2",
            )),
        })
        .await;

    let first = harness.read_frame().await;
    assert_eq!(first.msg_type(), Some("8"));
    assert_eq!(first.get(tags::EXEC_TYPE), Some("0"));
    assert_eq!(first.get(tags::ORD_STATUS), Some("0"));

    let second = harness.read_frame().await;
    assert_eq!(second.msg_type(), Some("8"));
    assert_eq!(second.get(tags::ORD_STATUS), Some("2"));
}

#[tokio::test]
async fn logout_is_acknowledged_and_connection_closed() {
    let mut harness = start(test_settings()).await;
    harness.logon().await;

    harness.send(&client_message("5", 2, &[])).await;

    let ack = harness.read_frame().await;
    assert_eq!(ack.msg_type(), Some("5"));
    harness.expect_closed().await;
    assert!(harness.registry.is_empty());
}

#[tokio::test]
async fn quiet_connection_without_logon_is_closed() {
    let settings = FixSettings {
        logon_timeout: Duration::from_millis(200),
        ..test_settings()
    };
    let mut harness = start(settings).await;

    // Send nothing; the logon deadline closes the transport.
    harness.expect_closed().await;
}

#[tokio::test]
async fn silent_session_is_probed_then_dropped() {
    let settings = FixSettings {
        heartbeat_interval: Duration::from_millis(300),
        ..test_settings()
    };
    let mut harness = start(settings).await;
    harness.logon().await;

    // First silence: a TestRequest probe.
    let probe = harness.read_frame().await;
    assert_eq!(probe.msg_type(), Some("1"));
    assert!(probe.get(tags::TEST_REQ_ID).is_some());

    // Keep ignoring it: a Logout, then the close.
    let logout = harness.read_frame().await;
    assert_eq!(logout.msg_type(), Some("5"));
    assert_eq!(logout.get(tags::TEXT), Some("missing heartbeat"));
    harness.expect_closed().await;
}

#[tokio::test]
async fn malformed_frame_drops_connection() {
    let mut harness = start(test_settings()).await;
    harness.logon().await;

    // Valid prolog, tampered checksum.
    let mut bytes = client_message("D", 2, &order_body("bad1"));
    let len = bytes.len();
    bytes[len - 3] = b'9';
    bytes[len - 4] = b'9';
    harness.send(&bytes).await;

    harness.expect_closed().await;
    assert!(harness.mock.operations().is_empty());
}
