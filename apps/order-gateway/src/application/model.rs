//! Protocol-Neutral Message Model
//!
//! The shapes that cross the codec boundary. Both wire codecs (FIX and
//! JSON-RPC) decode into [`ClientRequest`] and encode from [`Reply`]; the
//! router and the trading core link see only these types, never FIX tag
//! numbers or JSON field names.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::order::{ClOrdId, ExecType, OrdType, OrderStatus, Side, TimeInForce};
use crate::domain::session::{ClientRequestId, OperationKind, SessionId};
use crate::domain::subscription::{DepthMode, Instrument, MdEntryType, UpdateMode};

// =============================================================================
// Reject taxonomy
// =============================================================================

/// Why a request was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Frame failed checksum, body length, or group count validation.
    MalformedFrame,
    /// Logon credentials were refused.
    AuthenticationFailure,
    /// FIX sequence discontinuity.
    SequenceGap,
    /// ClOrdID reused before its prior operation reached a terminal state.
    DuplicateClOrdId,
    /// Cancel referenced an untracked OrigClOrdID.
    UnknownOrder,
    /// Well-formed but unroutable or unsupported request.
    BusinessReject,
    /// The trading core cannot accept the operation.
    DownstreamUnavailable,
}

impl RejectReason {
    /// Label for logging and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MalformedFrame => "malformed_frame",
            Self::AuthenticationFailure => "authentication_failure",
            Self::SequenceGap => "sequence_gap",
            Self::DuplicateClOrdId => "duplicate_cl_ord_id",
            Self::UnknownOrder => "unknown_order",
            Self::BusinessReject => "business_reject",
            Self::DownstreamUnavailable => "downstream_unavailable",
        }
    }
}

// =============================================================================
// Client requests
// =============================================================================

/// Logon credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogonRequest {
    /// Username.
    pub username: String,
    /// Password.
    pub password: String,
}

/// Order entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderRequest {
    /// Client-assigned order identifier.
    pub cl_ord_id: ClOrdId,
    /// Trading account, when supplied.
    pub account: Option<String>,
    /// Venue identifier.
    pub exchange: String,
    /// Instrument symbol.
    pub symbol: String,
    /// Buy or sell.
    pub side: Side,
    /// Market or limit.
    pub ord_type: OrdType,
    /// Ordered quantity.
    pub quantity: Decimal,
    /// Limit price, required for limit orders.
    pub price: Option<Decimal>,
    /// Time in force.
    pub time_in_force: TimeInForce,
}

/// Single-order cancel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelRequest {
    /// ClOrdID of the order being canceled.
    pub orig_cl_ord_id: ClOrdId,
    /// Identifier of this cancel request.
    pub cl_ord_id: ClOrdId,
    /// Venue identifier.
    pub exchange: String,
    /// Instrument symbol.
    pub symbol: String,
}

/// Mass cancel across a venue or instrument scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MassCancelRequest {
    /// Identifier of this request, when the protocol supplies one.
    pub cl_ord_id: Option<ClOrdId>,
    /// Venue scope, when given.
    pub exchange: Option<String>,
    /// Instrument scope, when given.
    pub symbol: Option<String>,
}

/// Mass status request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MassStatusRequest {
    /// Client-assigned request identifier.
    pub mass_status_req_id: String,
    /// Scope selector, passed through to the core.
    pub mass_status_req_type: u32,
    /// Account scope, when given.
    pub account: Option<String>,
    /// Venue scope, when given.
    pub exchange: Option<String>,
    /// Instrument scope, when given.
    pub symbol: Option<String>,
}

/// Response aggregation for position queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionAggregation {
    /// All positions in a single batch of reports.
    #[default]
    SingleBatch,
    /// One report delivered per position as it becomes available.
    PerPosition,
}

/// Position query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionsRequest {
    /// Client-assigned request identifier.
    pub pos_req_id: String,
    /// Account queried.
    pub account: String,
    /// Venue scope, when given.
    pub exchange: Option<String>,
    /// Account type selector, passed through to the core.
    pub account_type: Option<u32>,
    /// Request type selector, passed through to the core.
    pub pos_req_type: u32,
    /// Response aggregation mode.
    pub aggregation: PositionAggregation,
}

/// Subscription action requested by a MarketDataRequest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MdAction {
    /// One snapshot, no standing subscription.
    Snapshot,
    /// Snapshot plus incremental updates until unsubscribed.
    Subscribe,
    /// Tear down a standing subscription.
    Unsubscribe,
}

/// Market data subscription request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDataRequest {
    /// Client-assigned request identifier.
    pub md_req_id: String,
    /// Requested action.
    pub action: MdAction,
    /// Book depth mode.
    pub depth: DepthMode,
    /// Refresh style.
    pub update_mode: UpdateMode,
    /// Entry types requested.
    pub entry_types: Vec<MdEntryType>,
    /// Instruments covered.
    pub instruments: Vec<Instrument>,
}

/// A decoded inbound request, protocol-neutral.
#[derive(Debug, Clone)]
pub enum ClientRequest {
    /// Logon.
    Logon(LogonRequest),
    /// Logout.
    Logout,
    /// NewOrderSingle.
    NewOrder(NewOrderRequest),
    /// OrderCancelRequest.
    Cancel(CancelRequest),
    /// OrderMassCancelRequest.
    MassCancel(MassCancelRequest),
    /// OrderMassStatusRequest.
    MassStatus(MassStatusRequest),
    /// RequestForPositions.
    Positions(PositionsRequest),
    /// MarketDataRequest.
    MarketData(MarketDataRequest),
    /// Structurally valid but unrecognized request kind.
    Unsupported {
        /// Wire-level name (FIX MsgType or JSON-RPC method).
        name: String,
    },
}

impl ClientRequest {
    /// Short name for logging.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Logon(_) => "logon",
            Self::Logout => "logout",
            Self::NewOrder(_) => "new_order_single",
            Self::Cancel(_) => "order_cancel_request",
            Self::MassCancel(_) => "order_mass_cancel_request",
            Self::MassStatus(_) => "order_mass_status_request",
            Self::Positions(_) => "request_for_positions",
            Self::MarketData(_) => "market_data_request",
            Self::Unsupported { name } => name,
        }
    }
}

// =============================================================================
// Downstream operations
// =============================================================================

/// Payload of an operation sent to the trading core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum OperationPayload {
    /// Order entry.
    NewOrder(NewOrderRequest),
    /// Single-order cancel.
    Cancel(CancelRequest),
    /// Mass cancel.
    MassCancel(MassCancelRequest),
    /// Mass status.
    MassStatus(MassStatusRequest),
    /// Position query.
    Positions(PositionsRequest),
    /// Market data subscribe/unsubscribe.
    MarketData(MarketDataRequest),
}

impl OperationPayload {
    /// The operation kind this payload represents.
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        match self {
            Self::NewOrder(_) => OperationKind::NewOrderSingle,
            Self::Cancel(_) => OperationKind::OrderCancelRequest,
            Self::MassCancel(_) => OperationKind::OrderMassCancelRequest,
            Self::MassStatus(_) => OperationKind::OrderMassStatusRequest,
            Self::Positions(_) => OperationKind::RequestForPositions,
            Self::MarketData(_) => OperationKind::MarketDataSubscribe,
        }
    }
}

/// An operation routed to the trading core, tagged with enough identity for
/// the asynchronous replies to be routed back to exactly one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreOperation {
    /// Originating session.
    pub session_id: SessionId,
    /// Gateway-assigned operation identity.
    pub op_id: Uuid,
    /// Client-assigned correlation identifier.
    pub client_id: ClientRequestId,
    /// The operation itself.
    pub payload: OperationPayload,
    /// When the gateway routed the operation.
    pub routed_at: DateTime<Utc>,
}

// =============================================================================
// Downstream events
// =============================================================================

/// Order state transition reported by the trading core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionUpdate {
    /// Identifier the transition is reported under.
    pub cl_ord_id: ClOrdId,
    /// Original order identifier, for cancel confirmations.
    pub orig_cl_ord_id: Option<ClOrdId>,
    /// Core-assigned execution identifier.
    pub exec_id: String,
    /// Execution type.
    pub exec_type: ExecType,
    /// Resulting order status.
    pub ord_status: OrderStatus,
    /// Venue identifier.
    pub exchange: String,
    /// Instrument symbol.
    pub symbol: String,
    /// Order side.
    pub side: Side,
    /// Quantity still open.
    pub leaves_qty: Decimal,
    /// Cumulative filled quantity.
    pub cum_qty: Decimal,
    /// Quantity of the latest fill, when this reports a trade.
    pub last_qty: Option<Decimal>,
    /// Price of the latest fill, when this reports a trade.
    pub last_px: Option<Decimal>,
    /// Mass status request this report answers, when applicable.
    pub mass_status_req_id: Option<String>,
    /// Free-form detail.
    pub text: Option<String>,
}

/// Cancel refused by the trading core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelRejectUpdate {
    /// Identifier of the refused cancel request.
    pub cl_ord_id: ClOrdId,
    /// Order the cancel referenced.
    pub orig_cl_ord_id: ClOrdId,
    /// Reason reported by the core.
    pub text: Option<String>,
}

/// Terminal acknowledgement of a mass cancel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MassCancelReport {
    /// Correlation identifier of the originating request.
    pub client_id: ClientRequestId,
    /// Orders affected, as declared by the core (pass-through).
    pub total_affected: u64,
    /// Free-form detail.
    pub text: Option<String>,
}

/// Terminal acknowledgement of a mass status request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MassStatusAck {
    /// Correlation identifier of the originating request.
    pub mass_status_req_id: String,
    /// Reports delivered ahead of this acknowledgement (pass-through).
    pub total_reports: u64,
}

/// One position snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionUpdate {
    /// Correlation identifier of the originating query.
    pub pos_req_id: String,
    /// Account holding the position.
    pub account: String,
    /// Venue identifier.
    pub exchange: String,
    /// Instrument symbol.
    pub symbol: String,
    /// Long quantity.
    pub long_qty: Decimal,
    /// Short quantity.
    pub short_qty: Decimal,
}

/// Terminal "no more positions" marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionsComplete {
    /// Correlation identifier of the originating query.
    pub pos_req_id: String,
    /// Total reports delivered.
    pub total: u64,
}

/// Incremental update action for a book entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MdUpdateAction {
    /// Level added.
    New,
    /// Level changed.
    Change,
    /// Level removed.
    Delete,
}

/// One market data entry (price level or trade).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MdEntry {
    /// Entry type.
    pub entry_type: MdEntryType,
    /// Price.
    pub price: Decimal,
    /// Size at the price.
    pub size: Decimal,
    /// Update action; absent in snapshots.
    pub action: Option<MdUpdateAction>,
}

/// Market data delivered to a subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDataUpdate {
    /// Subscription this update belongs to.
    pub md_req_id: String,
    /// Instrument the entries describe.
    pub instrument: Instrument,
    /// Whether this is a full snapshot or an incremental refresh.
    pub is_snapshot: bool,
    /// The entries.
    pub entries: Vec<MdEntry>,
}

/// Subscription refused by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDataReject {
    /// Correlation identifier of the refused request.
    pub md_req_id: String,
    /// Reason reported by the core.
    pub text: Option<String>,
}

/// Payload of an asynchronous event from the trading core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum CoreEventPayload {
    /// Order state transition.
    Execution(ExecutionUpdate),
    /// Cancel refused.
    CancelReject(CancelRejectUpdate),
    /// Mass cancel terminal acknowledgement.
    MassCancelReport(MassCancelReport),
    /// Mass status terminal acknowledgement.
    MassStatusAck(MassStatusAck),
    /// Position snapshot.
    PositionReport(PositionUpdate),
    /// End of position reports.
    PositionsComplete(PositionsComplete),
    /// Market data snapshot or incremental.
    MarketData(MarketDataUpdate),
    /// Subscription refused.
    MarketDataReject(MarketDataReject),
    /// Operation refused at submission time.
    OperationReject {
        /// Correlation identifier of the refused operation.
        client_id: ClientRequestId,
        /// Why it was refused.
        reason: RejectReason,
        /// Free-form detail.
        text: Option<String>,
    },
}

/// An asynchronous event from the trading core, addressed to one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreEvent {
    /// Session the event belongs to.
    pub session_id: SessionId,
    /// The event itself.
    pub payload: CoreEventPayload,
}

// =============================================================================
// Replies
// =============================================================================

/// A protocol-neutral outbound message for one session.
///
/// Each transport task encodes these into its own wire format: FIX replies
/// get a stamped header and recomputed trailer; JSON-RPC replies become
/// responses or notifications.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Logon accepted.
    LogonAck {
        /// Negotiated heartbeat interval, seconds.
        heartbeat_secs: u64,
    },
    /// Logout acknowledged.
    LogoutAck,
    /// Session-level reject (FIX Reject / JSON-RPC error).
    SessionReject {
        /// Sequence number of the offending message, when known.
        ref_seq_num: Option<u64>,
        /// Reject reason.
        reason: RejectReason,
        /// Human-readable detail.
        text: String,
    },
    /// Business-level reject; the session continues.
    BusinessReject {
        /// Client identifier the reject correlates to, when known.
        ref_id: Option<String>,
        /// Reject reason.
        reason: RejectReason,
        /// Human-readable detail.
        text: String,
    },
    /// Execution report.
    Execution(ExecutionUpdate),
    /// Cancel refused.
    CancelReject(CancelRejectUpdate),
    /// Mass cancel terminal acknowledgement.
    MassCancelReport(MassCancelReport),
    /// Mass status terminal acknowledgement.
    MassStatusAck(MassStatusAck),
    /// Position snapshot.
    PositionReport(PositionUpdate),
    /// End of position reports.
    PositionsComplete(PositionsComplete),
    /// Market data snapshot or incremental.
    MarketData(MarketDataUpdate),
    /// Subscription refused.
    MarketDataReject(MarketDataReject),
}

impl Reply {
    /// Short name for logging and metrics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::LogonAck { .. } => "logon_ack",
            Self::LogoutAck => "logout_ack",
            Self::SessionReject { .. } => "session_reject",
            Self::BusinessReject { .. } => "business_reject",
            Self::Execution(_) => "execution_report",
            Self::CancelReject(_) => "order_cancel_reject",
            Self::MassCancelReport(_) => "order_mass_cancel_report",
            Self::MassStatusAck(_) => "order_mass_status_ack",
            Self::PositionReport(_) => "position_report",
            Self::PositionsComplete(_) => "positions_complete",
            Self::MarketData(_) => "market_data",
            Self::MarketDataReject(_) => "market_data_reject",
        }
    }
}
