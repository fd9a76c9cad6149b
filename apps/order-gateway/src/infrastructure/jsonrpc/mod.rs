//! JSON-RPC 2.0 Wire Codec
//!
//! Envelope decode/encode for the WebSocket transport. Requests carry
//! `{jsonrpc:"2.0", method, params, id}`; responses carry `result` or
//! `error`; unsolicited server-to-client events reuse the request shape with
//! the event name as method and no `id`.
//!
//! Parameter objects are strict: unknown or missing fields are refused at
//! this boundary with `-32602`, never passed through to the business layer.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::application::model::{
    CancelRequest, ClientRequest, MarketDataRequest, MassCancelRequest, MassStatusRequest,
    MdAction, NewOrderRequest, PositionAggregation, PositionsRequest, RejectReason, Reply,
};
use crate::domain::order::{ClOrdId, OrdType, Side, TimeInForce};
use crate::domain::subscription::{DepthMode, Instrument, MdEntryType, UpdateMode};

/// Protocol version constant.
pub const VERSION: &str = "2.0";

/// JSON-RPC error codes used by the gateway.
pub mod codes {
    /// Malformed JSON.
    pub const PARSE_ERROR: i64 = -32700;
    /// Envelope is not a well-formed request (bad version, method, or id).
    pub const INVALID_REQUEST: i64 = -32600;
    /// Unknown method.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Parameter object refused.
    pub const INVALID_PARAMS: i64 = -32602;
    /// Business-level reject.
    pub const BUSINESS_REJECT: i64 = -32000;
    /// Logon refused or required.
    pub const NOT_AUTHENTICATED: i64 = -32001;
    /// Trading core unavailable.
    pub const DOWNSTREAM_UNAVAILABLE: i64 = -32002;
}

/// A decode failure, carrying what is needed to form the error response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("json-rpc fault {code}: {message}")]
pub struct RpcFault {
    /// Request id to echo, when one was readable.
    pub id: Option<i64>,
    /// JSON-RPC error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
}

impl RpcFault {
    fn new(id: Option<i64>, code: i64, message: impl Into<String>) -> Self {
        Self {
            id,
            code,
            message: message.into(),
        }
    }
}

/// A decoded request envelope.
#[derive(Debug, Clone)]
pub struct RpcRequest {
    /// Correlation id.
    pub id: i64,
    /// The decoded request.
    pub request: ClientRequest,
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(default)]
    jsonrpc: Option<String>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    id: Option<Value>,
}

// =============================================================================
// Parameter objects (strict)
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LogonParams {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LogoutParams {}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NewOrderParams {
    cl_ord_id: String,
    #[serde(default)]
    account: Option<String>,
    exchange: String,
    symbol: String,
    side: Side,
    ord_type: OrdType,
    time_in_force: TimeInForce,
    quantity: Decimal,
    #[serde(default)]
    price: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CancelParams {
    orig_cl_ord_id: String,
    cl_ord_id: String,
    exchange: String,
    symbol: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MassCancelParams {
    #[serde(default)]
    exchange: Option<String>,
    #[serde(default)]
    symbol: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MassStatusParams {
    mass_status_req_id: String,
    #[serde(default = "default_mass_status_type")]
    mass_status_req_type: u32,
    #[serde(default)]
    account: Option<String>,
    #[serde(default)]
    exchange: Option<String>,
    #[serde(default)]
    symbol: Option<String>,
}

const fn default_mass_status_type() -> u32 {
    7
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PositionsParams {
    pos_req_id: String,
    account: String,
    #[serde(default)]
    exchange: Option<String>,
    #[serde(default)]
    account_type: Option<u32>,
    #[serde(default)]
    pos_req_type: u32,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MarketDataParams {
    md_req_id: String,
    exchange: String,
    symbol: String,
    subscription_request_type: u8,
    #[serde(default)]
    market_depth: u32,
    #[serde(default)]
    aggregated_book: bool,
    md_entry_types: Vec<MdEntryType>,
}

// =============================================================================
// Decode
// =============================================================================

/// Decode one text frame into a request.
///
/// # Errors
///
/// Returns [`RpcFault`] with the appropriate JSON-RPC error code; the caller
/// encodes it as an error response and the session continues.
pub fn decode(text: &str) -> Result<RpcRequest, RpcFault> {
    let envelope: RawEnvelope = serde_json::from_str(text)
        .map_err(|e| RpcFault::new(None, codes::PARSE_ERROR, format!("parse error: {e}")))?;

    // Read the id first so later faults can echo it.
    let id = match &envelope.id {
        Some(Value::Number(n)) => n.as_i64(),
        _ => None,
    };

    if envelope.jsonrpc.as_deref() != Some(VERSION) {
        return Err(RpcFault::new(
            id,
            codes::INVALID_REQUEST,
            "jsonrpc must be \"2.0\"",
        ));
    }
    let Some(method) = envelope.method.as_deref() else {
        return Err(RpcFault::new(id, codes::INVALID_REQUEST, "method missing"));
    };
    let Some(id) = id else {
        return Err(RpcFault::new(
            None,
            codes::INVALID_REQUEST,
            "id missing or not an integer",
        ));
    };

    let params = envelope.params.unwrap_or_else(|| json!({}));
    let request = decode_method(method, params, id)?;
    Ok(RpcRequest { id, request })
}

fn decode_method(method: &str, params: Value, id: i64) -> Result<ClientRequest, RpcFault> {
    fn parse<T: serde::de::DeserializeOwned>(params: Value, id: i64) -> Result<T, RpcFault> {
        serde_json::from_value(params)
            .map_err(|e| RpcFault::new(Some(id), codes::INVALID_PARAMS, format!("params: {e}")))
    }

    match method {
        "logon" => {
            let p: LogonParams = parse(params, id)?;
            Ok(ClientRequest::Logon(crate::application::model::LogonRequest {
                username: p.username,
                password: p.password,
            }))
        }
        "logout" => {
            let _: LogoutParams = parse(params, id)?;
            Ok(ClientRequest::Logout)
        }
        "new_order_single" => {
            let p: NewOrderParams = parse(params, id)?;
            if p.ord_type == OrdType::Limit && p.price.is_none() {
                return Err(RpcFault::new(
                    Some(id),
                    codes::INVALID_PARAMS,
                    "params: price required for LIMIT orders",
                ));
            }
            Ok(ClientRequest::NewOrder(NewOrderRequest {
                cl_ord_id: ClOrdId::new(p.cl_ord_id),
                account: p.account,
                exchange: p.exchange,
                symbol: p.symbol,
                side: p.side,
                ord_type: p.ord_type,
                quantity: p.quantity,
                price: p.price,
                time_in_force: p.time_in_force,
            }))
        }
        "order_cancel_request" => {
            let p: CancelParams = parse(params, id)?;
            Ok(ClientRequest::Cancel(CancelRequest {
                orig_cl_ord_id: ClOrdId::new(p.orig_cl_ord_id),
                cl_ord_id: ClOrdId::new(p.cl_ord_id),
                exchange: p.exchange,
                symbol: p.symbol,
            }))
        }
        "order_mass_cancel_request" => {
            let p: MassCancelParams = parse(params, id)?;
            Ok(ClientRequest::MassCancel(MassCancelRequest {
                cl_ord_id: None,
                exchange: p.exchange,
                symbol: p.symbol,
            }))
        }
        "order_mass_status_request" => {
            let p: MassStatusParams = parse(params, id)?;
            Ok(ClientRequest::MassStatus(MassStatusRequest {
                mass_status_req_id: p.mass_status_req_id,
                mass_status_req_type: p.mass_status_req_type,
                account: p.account,
                exchange: p.exchange,
                symbol: p.symbol,
            }))
        }
        "request_for_positions" => {
            let p: PositionsParams = parse(params, id)?;
            Ok(ClientRequest::Positions(PositionsRequest {
                pos_req_id: p.pos_req_id,
                account: p.account,
                exchange: p.exchange,
                account_type: p.account_type,
                pos_req_type: p.pos_req_type,
                aggregation: PositionAggregation::PerPosition,
            }))
        }
        "market_data_request" => {
            let p: MarketDataParams = parse(params, id)?;
            let (action, update_mode) = match p.subscription_request_type {
                0 => (MdAction::Snapshot, UpdateMode::Snapshot),
                1 => (MdAction::Subscribe, UpdateMode::SnapshotAndUpdates),
                2 => (MdAction::Unsubscribe, UpdateMode::Snapshot),
                other => {
                    return Err(RpcFault::new(
                        Some(id),
                        codes::INVALID_PARAMS,
                        format!("params: subscription_request_type {other} unsupported"),
                    ));
                }
            };
            let depth = if p.market_depth == 0 && !p.aggregated_book {
                DepthMode::Full
            } else {
                DepthMode::Aggregated
            };
            Ok(ClientRequest::MarketData(MarketDataRequest {
                md_req_id: p.md_req_id,
                action,
                depth,
                update_mode,
                entry_types: p.md_entry_types,
                instruments: vec![Instrument {
                    symbol: p.symbol,
                    exchange: p.exchange,
                }],
            }))
        }
        other => Err(RpcFault::new(
            Some(id),
            codes::METHOD_NOT_FOUND,
            format!("unknown method: {other}"),
        )),
    }
}

// =============================================================================
// Encode
// =============================================================================

/// Encode a successful response.
#[must_use]
pub fn result_response(id: i64, result: Value) -> String {
    json!({
        "jsonrpc": VERSION,
        "result": result,
        "id": id,
    })
    .to_string()
}

/// Encode an error response. A missing id encodes as JSON `null`.
#[must_use]
pub fn error_response(id: Option<i64>, code: i64, message: &str) -> String {
    json!({
        "jsonrpc": VERSION,
        "error": { "code": code, "message": message },
        "id": id,
    })
    .to_string()
}

/// Encode an error response for a decode fault.
#[must_use]
pub fn fault_response(fault: &RpcFault) -> String {
    error_response(fault.id, fault.code, &fault.message)
}

/// Encode an unsolicited server-to-client event.
#[must_use]
pub fn notification(method: &str, params: Value) -> String {
    json!({
        "jsonrpc": VERSION,
        "method": method,
        "params": params,
    })
    .to_string()
}

/// JSON-RPC error code for a reject reason.
#[must_use]
pub const fn reject_code(reason: RejectReason) -> i64 {
    match reason {
        RejectReason::AuthenticationFailure => codes::NOT_AUTHENTICATED,
        RejectReason::DownstreamUnavailable => codes::DOWNSTREAM_UNAVAILABLE,
        _ => codes::BUSINESS_REJECT,
    }
}

/// Encode an asynchronous reply as a notification, when it has a
/// notification shape. Session-level replies (logon/logout acks, rejects
/// correlated to a request id) are handled by the session and return `None`.
#[must_use]
pub fn encode_notification(reply: &Reply) -> Option<String> {
    #[derive(Serialize)]
    struct RejectParams<'a> {
        #[serde(skip_serializing_if = "Option::is_none")]
        ref_id: Option<&'a String>,
        reason: &'a str,
        text: &'a String,
    }

    let (method, params) = match reply {
        Reply::Execution(update) => ("execution_report", serde_json::to_value(update).ok()?),
        Reply::CancelReject(reject) => ("order_cancel_reject", serde_json::to_value(reject).ok()?),
        Reply::MassCancelReport(report) => {
            ("order_mass_cancel_report", serde_json::to_value(report).ok()?)
        }
        Reply::MassStatusAck(ack) => ("order_mass_status_ack", serde_json::to_value(ack).ok()?),
        Reply::PositionReport(update) => ("position_report", serde_json::to_value(update).ok()?),
        Reply::PositionsComplete(complete) => {
            ("positions_complete", serde_json::to_value(complete).ok()?)
        }
        Reply::MarketData(update) => ("market_data", serde_json::to_value(update).ok()?),
        Reply::MarketDataReject(reject) => {
            ("market_data_reject", serde_json::to_value(reject).ok()?)
        }
        Reply::BusinessReject {
            ref_id,
            reason,
            text,
        } => (
            "business_reject",
            serde_json::to_value(RejectParams {
                ref_id: ref_id.as_ref(),
                reason: reason.as_str(),
                text,
            })
            .ok()?,
        ),
        Reply::LogonAck { .. } | Reply::LogoutAck | Reply::SessionReject { .. } => return None,
    };
    Some(notification(method, params))
}
