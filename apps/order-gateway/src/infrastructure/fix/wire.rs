//! Typed FIX Mapping
//!
//! Decodes structurally valid frames into the protocol-neutral model and
//! encodes replies back into FIX messages. This is the only place FIX tag
//! numbers meet the model; the router never sees them.
//!
//! Faults split three ways:
//! - repeating-group count mismatches are [`MalformedFrame`] (connection-fatal),
//! - missing/invalid business fields are [`FixDecodeError::Field`] (session
//!   reject, session continues),
//! - unrecognized MsgTypes decode into [`ClientRequest::Unsupported`] and
//!   take the business-reject path.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::application::model::{
    CancelRequest, ClientRequest, MarketDataRequest, MassCancelRequest, MassStatusRequest,
    MdAction, NewOrderRequest, PositionAggregation, PositionsRequest, RejectReason, Reply,
};
use crate::domain::order::{ClOrdId, ExecType, OrdType, OrderStatus, Side, TimeInForce};
use crate::domain::subscription::{DepthMode, Instrument, MdEntryType, UpdateMode};

use super::codec::MalformedFrame;
use super::message::{Field, FixMessage, format_sending_time};
use super::tags;

// =============================================================================
// Inbound
// =============================================================================

/// Errors decoding a structurally valid frame into a request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FixDecodeError {
    /// Repeating-group fault; connection-fatal.
    #[error(transparent)]
    Malformed(#[from] MalformedFrame),

    /// A business field is missing or unparseable; session reject.
    #[error("field {tag}: {text}")]
    Field {
        /// Offending tag.
        tag: u32,
        /// What went wrong.
        text: String,
    },
}

fn missing(tag: u32) -> FixDecodeError {
    FixDecodeError::Field {
        tag,
        text: "required field missing".to_string(),
    }
}

fn invalid(tag: u32, value: &str) -> FixDecodeError {
    FixDecodeError::Field {
        tag,
        text: format!("invalid value: {value}"),
    }
}

/// A decoded inbound FIX message, split into session administration and
/// application requests.
#[derive(Debug, Clone)]
pub enum FixInbound {
    /// Logon(A).
    Logon {
        /// Username(553).
        username: String,
        /// Password(554).
        password: String,
        /// HeartBtInt(108), when offered.
        heart_bt_int: Option<u64>,
    },
    /// Logout(5).
    Logout,
    /// Heartbeat(0).
    Heartbeat {
        /// TestReqID(112) being answered, when present.
        test_req_id: Option<String>,
    },
    /// TestRequest(1).
    TestRequest {
        /// TestReqID(112) to echo.
        test_req_id: String,
    },
    /// An application request.
    Request(ClientRequest),
}

/// Decode a structurally valid message into a typed inbound.
///
/// # Errors
///
/// Returns [`FixDecodeError::Malformed`] for repeating-group faults and
/// [`FixDecodeError::Field`] for missing or invalid business fields.
pub fn decode_inbound(message: &FixMessage) -> Result<FixInbound, FixDecodeError> {
    let msg_type = message.msg_type().ok_or_else(|| missing(tags::MSG_TYPE))?;
    match msg_type {
        "A" => Ok(FixInbound::Logon {
            username: required(message, tags::USERNAME)?.to_string(),
            password: required(message, tags::PASSWORD)?.to_string(),
            heart_bt_int: message.get_parsed(tags::HEART_BT_INT),
        }),
        "5" => Ok(FixInbound::Logout),
        "0" => Ok(FixInbound::Heartbeat {
            test_req_id: message.get(tags::TEST_REQ_ID).map(ToString::to_string),
        }),
        "1" => Ok(FixInbound::TestRequest {
            test_req_id: required(message, tags::TEST_REQ_ID)?.to_string(),
        }),
        "D" => decode_new_order(message).map(FixInbound::Request),
        "F" => decode_cancel(message).map(FixInbound::Request),
        "V" => decode_market_data(message).map(FixInbound::Request),
        "AF" => decode_mass_status(message).map(FixInbound::Request),
        "q" => decode_mass_cancel(message).map(FixInbound::Request),
        "AN" => decode_positions(message).map(FixInbound::Request),
        other => Ok(FixInbound::Request(ClientRequest::Unsupported {
            name: other.to_string(),
        })),
    }
}

fn required<'a>(message: &'a FixMessage, tag: u32) -> Result<&'a str, FixDecodeError> {
    message.get(tag).ok_or_else(|| missing(tag))
}

fn required_decimal(message: &FixMessage, tag: u32) -> Result<Decimal, FixDecodeError> {
    let raw = required(message, tag)?;
    raw.parse().map_err(|_| invalid(tag, raw))
}

fn decode_new_order(message: &FixMessage) -> Result<ClientRequest, FixDecodeError> {
    let side_raw = required(message, tags::SIDE)?;
    let ord_type_raw = required(message, tags::ORD_TYPE)?;
    let ord_type = ord_type_from_fix(ord_type_raw).ok_or_else(|| invalid(tags::ORD_TYPE, ord_type_raw))?;
    let price = match message.get(tags::PRICE) {
        Some(raw) => Some(raw.parse().map_err(|_| invalid(tags::PRICE, raw))?),
        None => None,
    };
    if ord_type == OrdType::Limit && price.is_none() {
        return Err(missing(tags::PRICE));
    }
    let time_in_force = match message.get(tags::TIME_IN_FORCE) {
        Some(raw) => tif_from_fix(raw).ok_or_else(|| invalid(tags::TIME_IN_FORCE, raw))?,
        None => TimeInForce::Day,
    };
    Ok(ClientRequest::NewOrder(NewOrderRequest {
        cl_ord_id: ClOrdId::new(required(message, tags::CL_ORD_ID)?),
        account: message.get(tags::ACCOUNT).map(ToString::to_string),
        exchange: required(message, tags::SECURITY_EXCHANGE)?.to_string(),
        symbol: required(message, tags::SYMBOL)?.to_string(),
        side: side_from_fix(side_raw).ok_or_else(|| invalid(tags::SIDE, side_raw))?,
        ord_type,
        quantity: required_decimal(message, tags::ORDER_QTY)?,
        price,
        time_in_force,
    }))
}

fn decode_cancel(message: &FixMessage) -> Result<ClientRequest, FixDecodeError> {
    Ok(ClientRequest::Cancel(CancelRequest {
        orig_cl_ord_id: ClOrdId::new(required(message, tags::ORIG_CL_ORD_ID)?),
        cl_ord_id: ClOrdId::new(required(message, tags::CL_ORD_ID)?),
        exchange: required(message, tags::SECURITY_EXCHANGE)?.to_string(),
        symbol: required(message, tags::SYMBOL)?.to_string(),
    }))
}

fn decode_mass_cancel(message: &FixMessage) -> Result<ClientRequest, FixDecodeError> {
    // MassCancelRequestType(530) scope is passed through to the core via the
    // optional exchange/symbol fields, not interpreted here.
    let _ = required(message, tags::MASS_CANCEL_REQUEST_TYPE)?;
    Ok(ClientRequest::MassCancel(MassCancelRequest {
        cl_ord_id: message.get(tags::CL_ORD_ID).map(ClOrdId::new),
        exchange: message.get(tags::SECURITY_EXCHANGE).map(ToString::to_string),
        symbol: message.get(tags::SYMBOL).map(ToString::to_string),
    }))
}

fn decode_mass_status(message: &FixMessage) -> Result<ClientRequest, FixDecodeError> {
    let type_raw = required(message, tags::MASS_STATUS_REQ_TYPE)?;
    Ok(ClientRequest::MassStatus(MassStatusRequest {
        mass_status_req_id: required(message, tags::MASS_STATUS_REQ_ID)?.to_string(),
        mass_status_req_type: type_raw
            .parse()
            .map_err(|_| invalid(tags::MASS_STATUS_REQ_TYPE, type_raw))?,
        account: message.get(tags::ACCOUNT).map(ToString::to_string),
        exchange: message.get(tags::SECURITY_EXCHANGE).map(ToString::to_string),
        symbol: message.get(tags::SYMBOL).map(ToString::to_string),
    }))
}

fn decode_positions(message: &FixMessage) -> Result<ClientRequest, FixDecodeError> {
    let type_raw = required(message, tags::POS_REQ_TYPE)?;
    Ok(ClientRequest::Positions(PositionsRequest {
        pos_req_id: required(message, tags::POS_REQ_ID)?.to_string(),
        account: required(message, tags::ACCOUNT)?.to_string(),
        exchange: message.get(tags::SECURITY_EXCHANGE).map(ToString::to_string),
        account_type: message.get_parsed(tags::ACCOUNT_TYPE),
        pos_req_type: type_raw
            .parse()
            .map_err(|_| invalid(tags::POS_REQ_TYPE, type_raw))?,
        aggregation: PositionAggregation::SingleBatch,
    }))
}

fn decode_market_data(message: &FixMessage) -> Result<ClientRequest, FixDecodeError> {
    let md_req_id = required(message, tags::MD_REQ_ID)?.to_string();
    let sub_type = required(message, tags::SUBSCRIPTION_REQUEST_TYPE)?;
    let (action, update_mode) = match sub_type {
        "0" => (MdAction::Snapshot, UpdateMode::Snapshot),
        "1" => (MdAction::Subscribe, UpdateMode::SnapshotAndUpdates),
        "2" => (MdAction::Unsubscribe, UpdateMode::Snapshot),
        other => return Err(invalid(tags::SUBSCRIPTION_REQUEST_TYPE, other)),
    };
    let market_depth: u32 = match message.get(tags::MARKET_DEPTH) {
        Some(raw) => raw.parse().map_err(|_| invalid(tags::MARKET_DEPTH, raw))?,
        None => 0,
    };
    let aggregated = message.get(tags::AGGREGATED_BOOK) == Some("Y");
    let depth = if market_depth == 0 && !aggregated {
        DepthMode::Full
    } else {
        DepthMode::Aggregated
    };
    let entry_types = decode_md_entry_types(message)?;
    let instruments = decode_instruments(message)?;
    Ok(ClientRequest::MarketData(MarketDataRequest {
        md_req_id,
        action,
        depth,
        update_mode,
        entry_types,
        instruments,
    }))
}

/// Read the NoMDEntryTypes(267)/MDEntryType(269) group: the declared count
/// followed by exactly that many 269 fields.
fn decode_md_entry_types(message: &FixMessage) -> Result<Vec<MdEntryType>, FixDecodeError> {
    let Some(count_pos) = message.position(tags::NO_MD_ENTRY_TYPES) else {
        return Err(missing(tags::NO_MD_ENTRY_TYPES));
    };
    let raw = &message.fields[count_pos].value;
    let declared: usize = raw
        .parse()
        .map_err(|_| invalid(tags::NO_MD_ENTRY_TYPES, raw))?;

    let mut entries = Vec::new();
    for field in &message.fields[count_pos + 1..] {
        if field.tag != tags::MD_ENTRY_TYPE {
            break;
        }
        let entry = md_entry_type_from_fix(&field.value)
            .ok_or_else(|| invalid(tags::MD_ENTRY_TYPE, &field.value))?;
        entries.push(entry);
    }
    if entries.len() != declared {
        return Err(MalformedFrame::GroupCountMismatch {
            count_tag: tags::NO_MD_ENTRY_TYPES,
            declared,
            found: entries.len(),
        }
        .into());
    }
    Ok(entries)
}

/// Read the NoRelatedSym(146) group: each instance is Symbol(55) followed by
/// SecurityExchange(207).
fn decode_instruments(message: &FixMessage) -> Result<Vec<Instrument>, FixDecodeError> {
    let Some(count_pos) = message.position(tags::NO_RELATED_SYM) else {
        return Err(missing(tags::NO_RELATED_SYM));
    };
    let raw = &message.fields[count_pos].value;
    let declared: usize = raw
        .parse()
        .map_err(|_| invalid(tags::NO_RELATED_SYM, raw))?;

    let mut instruments = Vec::new();
    let mut fields = message.fields[count_pos + 1..].iter().peekable();
    while let Some(field) = fields.peek() {
        if field.tag != tags::SYMBOL {
            break;
        }
        let symbol = fields
            .next()
            .map(|f| f.value.clone())
            .unwrap_or_default();
        let exchange = match fields.peek() {
            Some(Field {
                tag: tags::SECURITY_EXCHANGE,
                value,
            }) => {
                let exchange = value.clone();
                fields.next();
                exchange
            }
            _ => return Err(missing(tags::SECURITY_EXCHANGE)),
        };
        instruments.push(Instrument { symbol, exchange });
    }
    if instruments.len() != declared {
        return Err(MalformedFrame::GroupCountMismatch {
            count_tag: tags::NO_RELATED_SYM,
            declared,
            found: instruments.len(),
        }
        .into());
    }
    Ok(instruments)
}

// =============================================================================
// Outbound
// =============================================================================

/// Header fields stamped onto every outbound message by the session's
/// encoder, which owns the outbound sequence counter.
#[derive(Debug, Clone)]
pub struct HeaderStamp {
    /// Our CompID (tag 49 on outbound).
    pub sender_comp_id: String,
    /// The client's CompID (tag 56 on outbound).
    pub target_comp_id: String,
    /// MsgSeqNum(34).
    pub msg_seq_num: u64,
    /// SendingTime(52).
    pub sending_time: DateTime<Utc>,
}

impl HeaderStamp {
    fn apply(&self, msg_type: &str) -> FixMessage {
        FixMessage::new(msg_type)
            .with(tags::SENDER_COMP_ID, &self.sender_comp_id)
            .with(tags::TARGET_COMP_ID, &self.target_comp_id)
            .with(tags::MSG_SEQ_NUM, self.msg_seq_num.to_string())
            .with(tags::SENDING_TIME, format_sending_time(self.sending_time))
    }
}

/// Build a Heartbeat(0), echoing a TestReqID when answering a probe.
#[must_use]
pub fn heartbeat(stamp: &HeaderStamp, test_req_id: Option<&str>) -> FixMessage {
    let mut message = stamp.apply("0");
    if let Some(id) = test_req_id {
        message.push(tags::TEST_REQ_ID, id);
    }
    message
}

/// Build a TestRequest(1).
#[must_use]
pub fn test_request(stamp: &HeaderStamp, test_req_id: &str) -> FixMessage {
    stamp.apply("1").with(tags::TEST_REQ_ID, test_req_id)
}

/// Build a Logout(5) carrying a reason.
#[must_use]
pub fn logout(stamp: &HeaderStamp, text: &str) -> FixMessage {
    let mut message = stamp.apply("5");
    if !text.is_empty() {
        message.push(tags::TEXT, text);
    }
    message
}

/// Encode a protocol-neutral reply as a FIX message.
#[must_use]
pub fn encode_reply(reply: &Reply, stamp: &HeaderStamp) -> FixMessage {
    match reply {
        Reply::LogonAck { heartbeat_secs } => stamp
            .apply("A")
            .with(tags::ENCRYPT_METHOD, "0")
            .with(tags::HEART_BT_INT, heartbeat_secs.to_string()),
        Reply::LogoutAck => stamp.apply("5"),
        Reply::SessionReject {
            ref_seq_num,
            reason,
            text,
        } => {
            let mut message = stamp.apply("3");
            if let Some(seq) = ref_seq_num {
                message.push(tags::REF_SEQ_NUM, seq.to_string());
            }
            message.push(tags::SESSION_REJECT_REASON, session_reject_code(*reason));
            message.push(tags::TEXT, text);
            message
        }
        Reply::BusinessReject {
            ref_id,
            reason,
            text,
        } => {
            let mut message = stamp.apply("j");
            if let Some(id) = ref_id {
                message.push(tags::BUSINESS_REJECT_REF_ID, id);
            }
            message.push(tags::BUSINESS_REJECT_REASON, business_reject_code(*reason));
            message.push(tags::TEXT, text);
            message
        }
        Reply::Execution(update) => {
            let mut message = stamp
                .apply("8")
                .with(tags::ORDER_ID, &update.exec_id)
                .with(tags::CL_ORD_ID, update.cl_ord_id.as_str());
            if let Some(orig) = &update.orig_cl_ord_id {
                message.push(tags::ORIG_CL_ORD_ID, orig.as_str());
            }
            message.push(tags::EXEC_ID, &update.exec_id);
            message.push(tags::EXEC_TYPE, exec_type_to_fix(update.exec_type));
            message.push(tags::ORD_STATUS, ord_status_to_fix(update.ord_status));
            message.push(tags::SYMBOL, &update.symbol);
            message.push(tags::SECURITY_EXCHANGE, &update.exchange);
            message.push(tags::SIDE, side_to_fix(update.side));
            message.push(tags::LEAVES_QTY, update.leaves_qty.to_string());
            message.push(tags::CUM_QTY, update.cum_qty.to_string());
            if let Some(qty) = update.last_qty {
                message.push(tags::LAST_QTY, qty.to_string());
            }
            if let Some(px) = update.last_px {
                message.push(tags::LAST_PX, px.to_string());
            }
            if let Some(id) = &update.mass_status_req_id {
                message.push(tags::MASS_STATUS_REQ_ID, id);
            }
            if let Some(text) = &update.text {
                message.push(tags::TEXT, text);
            }
            message
        }
        Reply::CancelReject(reject) => {
            let mut message = stamp
                .apply("9")
                .with(tags::CL_ORD_ID, reject.cl_ord_id.as_str())
                .with(tags::ORIG_CL_ORD_ID, reject.orig_cl_ord_id.as_str())
                .with(tags::ORD_STATUS, "8")
                .with(tags::CXL_REJ_RESPONSE_TO, "1");
            if let Some(text) = &reject.text {
                message.push(tags::TEXT, text);
            }
            message
        }
        Reply::MassCancelReport(report) => {
            let mut message = stamp.apply("r");
            if let crate::domain::session::ClientRequestId::ClOrd(id) = &report.client_id {
                message.push(tags::CL_ORD_ID, id.as_str());
            }
            message.push(tags::MASS_CANCEL_RESPONSE, "7");
            message.push(
                tags::TOTAL_AFFECTED_ORDERS,
                report.total_affected.to_string(),
            );
            if let Some(text) = &report.text {
                message.push(tags::TEXT, text);
            }
            message
        }
        Reply::MassStatusAck(ack) => {
            // Terminal marker for a mass status sweep: an ExecutionReport
            // flagged as the last report, with no order behind it.
            stamp
                .apply("8")
                .with(tags::ORDER_ID, "NONE")
                .with(tags::EXEC_ID, format!("mass-status-{}", ack.mass_status_req_id))
                .with(tags::EXEC_TYPE, "I")
                .with(tags::ORD_STATUS, "8")
                .with(tags::MASS_STATUS_REQ_ID, &ack.mass_status_req_id)
                .with(tags::LAST_RPT_REQUESTED, "Y")
                .with(tags::TEXT, format!("{} reports", ack.total_reports))
        }
        Reply::PositionReport(update) => stamp
            .apply("AP")
            .with(tags::POS_MAINT_RPT_ID, format!("pos-{}", stamp.msg_seq_num))
            .with(tags::POS_REQ_ID, &update.pos_req_id)
            .with(tags::ACCOUNT, &update.account)
            .with(tags::SECURITY_EXCHANGE, &update.exchange)
            .with(tags::SYMBOL, &update.symbol)
            .with(tags::NO_POSITIONS, "1")
            .with(tags::POS_TYPE, "TOT")
            .with(tags::LONG_QTY, update.long_qty.to_string())
            .with(tags::SHORT_QTY, update.short_qty.to_string()),
        Reply::PositionsComplete(complete) => stamp
            .apply("AO")
            .with(tags::POS_REQ_ID, &complete.pos_req_id)
            .with(tags::TOTAL_NUM_POS_REPORTS, complete.total.to_string())
            .with(tags::POS_REQ_RESULT, "0"),
        Reply::MarketData(update) => {
            if update.is_snapshot {
                let mut message = stamp
                    .apply("W")
                    .with(tags::MD_REQ_ID, &update.md_req_id)
                    .with(tags::SYMBOL, &update.instrument.symbol)
                    .with(tags::SECURITY_EXCHANGE, &update.instrument.exchange)
                    .with(tags::NO_MD_ENTRIES, update.entries.len().to_string());
                for entry in &update.entries {
                    message.push(tags::MD_ENTRY_TYPE, md_entry_type_to_fix(entry.entry_type));
                    message.push(tags::MD_ENTRY_PX, entry.price.to_string());
                    message.push(tags::MD_ENTRY_SIZE, entry.size.to_string());
                }
                message
            } else {
                let mut message = stamp
                    .apply("X")
                    .with(tags::MD_REQ_ID, &update.md_req_id)
                    .with(tags::NO_MD_ENTRIES, update.entries.len().to_string());
                for entry in &update.entries {
                    message.push(
                        tags::MD_UPDATE_ACTION,
                        entry.action.map_or("0", md_update_action_to_fix),
                    );
                    message.push(tags::MD_ENTRY_TYPE, md_entry_type_to_fix(entry.entry_type));
                    message.push(tags::SYMBOL, &update.instrument.symbol);
                    message.push(tags::SECURITY_EXCHANGE, &update.instrument.exchange);
                    message.push(tags::MD_ENTRY_PX, entry.price.to_string());
                    message.push(tags::MD_ENTRY_SIZE, entry.size.to_string());
                }
                message
            }
        }
        Reply::MarketDataReject(reject) => {
            let mut message = stamp.apply("Y").with(tags::MD_REQ_ID, &reject.md_req_id);
            if let Some(text) = &reject.text {
                message.push(tags::TEXT, text);
            }
            message
        }
    }
}

// =============================================================================
// Enum mappings
// =============================================================================

fn side_from_fix(raw: &str) -> Option<Side> {
    match raw {
        "1" => Some(Side::Buy),
        "2" => Some(Side::Sell),
        _ => None,
    }
}

const fn side_to_fix(side: Side) -> &'static str {
    match side {
        Side::Buy => "1",
        Side::Sell => "2",
    }
}

fn ord_type_from_fix(raw: &str) -> Option<OrdType> {
    match raw {
        "1" => Some(OrdType::Market),
        "2" => Some(OrdType::Limit),
        _ => None,
    }
}

fn tif_from_fix(raw: &str) -> Option<TimeInForce> {
    match raw {
        "0" => Some(TimeInForce::Day),
        "1" => Some(TimeInForce::Gtc),
        "3" => Some(TimeInForce::Ioc),
        "4" => Some(TimeInForce::Fok),
        _ => None,
    }
}

const fn ord_status_to_fix(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::PendingNew => "A",
        OrderStatus::New => "0",
        OrderStatus::PartiallyFilled => "1",
        OrderStatus::Filled => "2",
        OrderStatus::Canceled => "4",
        OrderStatus::PendingCancel => "6",
        OrderStatus::Rejected => "8",
    }
}

const fn exec_type_to_fix(exec_type: ExecType) -> &'static str {
    match exec_type {
        ExecType::New => "0",
        ExecType::Trade => "F",
        ExecType::Canceled => "4",
        ExecType::PendingCancel => "6",
        ExecType::Rejected => "8",
        ExecType::PendingNew => "A",
        ExecType::OrderStatus => "I",
    }
}

fn md_entry_type_from_fix(raw: &str) -> Option<MdEntryType> {
    match raw {
        "0" => Some(MdEntryType::Bid),
        "1" => Some(MdEntryType::Offer),
        "2" => Some(MdEntryType::Trade),
        _ => None,
    }
}

const fn md_entry_type_to_fix(entry: MdEntryType) -> &'static str {
    match entry {
        MdEntryType::Bid => "0",
        MdEntryType::Offer => "1",
        MdEntryType::Trade => "2",
    }
}

const fn md_update_action_to_fix(action: crate::application::model::MdUpdateAction) -> &'static str {
    match action {
        crate::application::model::MdUpdateAction::New => "0",
        crate::application::model::MdUpdateAction::Change => "1",
        crate::application::model::MdUpdateAction::Delete => "2",
    }
}

const fn session_reject_code(reason: RejectReason) -> &'static str {
    // SessionRejectReason(373): 5 = value incorrect, 9 = CompID problem,
    // 99 = other.
    match reason {
        RejectReason::SequenceGap | RejectReason::MalformedFrame => "99",
        RejectReason::AuthenticationFailure => "9",
        _ => "5",
    }
}

const fn business_reject_code(reason: RejectReason) -> &'static str {
    // BusinessRejectReason(380): 1 = unknown id, 3 = unsupported message
    // type, 4 = application not available, 0 = other.
    match reason {
        RejectReason::UnknownOrder => "1",
        RejectReason::BusinessReject => "3",
        RejectReason::DownstreamUnavailable => "4",
        _ => "0",
    }
}
