//! Session Domain
//!
//! Per-connection state machine, FIX sequence tracking, and the table of
//! operations awaiting a terminal reply from the trading core.
//!
//! # Session States
//!
//! ```text
//! Disconnected → Connected → Authenticating → Authenticated → Closing → Disconnected
//! ```
//!
//! Only Logon is accepted in `Connected`. Every request type is accepted in
//! `Authenticated`. `Closing` drains nothing further. Each session's state is
//! exclusively owned by its connection task; nothing here is shared.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::order::ClOrdId;

/// Gateway-assigned session identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Wire protocol spoken by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVariant {
    /// FIX 4.4 tag=value over TCP or Unix-domain stream.
    Fix,
    /// JSON-RPC 2.0 over WebSocket.
    JsonRpc,
}

impl ProtocolVariant {
    /// Protocol name for logging and metrics labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fix => "fix",
            Self::JsonRpc => "json-rpc",
        }
    }
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No transport.
    #[default]
    Disconnected,
    /// Transport established, waiting for Logon.
    Connected,
    /// Logon received, credential check in flight.
    Authenticating,
    /// Logon accepted; all request kinds allowed.
    Authenticated,
    /// Logout in progress; no further requests drained.
    Closing,
}

impl SessionState {
    /// Whether the session may accept a non-Logon request.
    #[must_use]
    pub const fn is_authenticated(self) -> bool {
        matches!(self, Self::Authenticated)
    }

    /// Whether a Logon is the only acceptable message.
    #[must_use]
    pub const fn awaiting_logon(self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Result of checking an inbound FIX sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqCheck {
    /// Exactly the expected number.
    InOrder,
    /// A number higher than expected was received (messages were missed).
    Gap {
        /// The sequence number the session expected.
        expected: u64,
        /// The sequence number actually received.
        received: u64,
    },
    /// A number at or below the last seen (replayed or duplicate message).
    Replay {
        /// The sequence number the session expected.
        expected: u64,
        /// The sequence number actually received.
        received: u64,
    },
}

/// FIX per-direction sequence counters.
///
/// Inbound and outbound both start at 1. The inbound check is strict:
/// anything other than `last + 1` is a protocol fault surfaced as
/// [`SeqCheck::Gap`] or [`SeqCheck::Replay`]; policy (terminate) is applied
/// by the session layer.
#[derive(Debug, Default)]
pub struct SequenceCounters {
    inbound_seen: u64,
    outbound_sent: u64,
}

impl SequenceCounters {
    /// Fresh counters; nothing seen, nothing sent.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check and record an inbound sequence number.
    pub fn check_inbound(&mut self, received: u64) -> SeqCheck {
        let expected = self.inbound_seen + 1;
        let check = if received == expected {
            SeqCheck::InOrder
        } else if received > expected {
            SeqCheck::Gap { expected, received }
        } else {
            SeqCheck::Replay { expected, received }
        };
        // Track the highest number seen so a gap is reported once, the way
        // the FIX session layer resynchronizes after a fault.
        self.inbound_seen = self.inbound_seen.max(received);
        check
    }

    /// Allocate the next outbound sequence number.
    pub fn next_outbound(&mut self) -> u64 {
        self.outbound_sent += 1;
        self.outbound_sent
    }

    /// Last inbound number recorded.
    #[must_use]
    pub const fn inbound_seen(&self) -> u64 {
        self.inbound_seen
    }

    /// Last outbound number allocated.
    #[must_use]
    pub const fn outbound_sent(&self) -> u64 {
        self.outbound_sent
    }
}

/// Kind of operation routed downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// NewOrderSingle.
    NewOrderSingle,
    /// OrderCancelRequest.
    OrderCancelRequest,
    /// OrderMassCancelRequest.
    OrderMassCancelRequest,
    /// OrderMassStatusRequest.
    OrderMassStatusRequest,
    /// RequestForPositions.
    RequestForPositions,
    /// Market data subscribe/unsubscribe.
    MarketDataSubscribe,
}

impl OperationKind {
    /// Label for logging and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NewOrderSingle => "new_order_single",
            Self::OrderCancelRequest => "order_cancel_request",
            Self::OrderMassCancelRequest => "order_mass_cancel_request",
            Self::OrderMassStatusRequest => "order_mass_status_request",
            Self::RequestForPositions => "request_for_positions",
            Self::MarketDataSubscribe => "market_data_subscribe",
        }
    }
}

/// Client-assigned identifier correlating a request with its replies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientRequestId {
    /// Order identifier (orders and cancels).
    ClOrd(ClOrdId),
    /// Free-form request identifier (mass status, positions, market data).
    Request(String),
    /// JSON-RPC numeric id.
    Rpc(i64),
}

impl fmt::Display for ClientRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClOrd(id) => write!(f, "{id}"),
            Self::Request(id) => f.write_str(id),
            Self::Rpc(id) => write!(f, "{id}"),
        }
    }
}

/// An operation routed downstream and awaiting a terminal reply.
#[derive(Debug, Clone)]
pub struct PendingOperation {
    /// What was routed.
    pub kind: OperationKind,
    /// Client-assigned identifier.
    pub client_id: ClientRequestId,
    /// When the operation was routed.
    pub created_at: DateTime<Utc>,
}

/// Table of in-flight operations for one session.
///
/// Entries are inserted when a request is routed downstream and removed when
/// a terminal reply is matched. Session teardown drains the table so nothing
/// outlives the session.
#[derive(Debug, Default)]
pub struct PendingTable {
    entries: HashMap<ClientRequestId, PendingOperation>,
}

impl PendingTable {
    /// Empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of in-flight operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record a routed operation. Returns `false` when the identifier is
    /// already in flight (the caller rejects as a duplicate).
    pub fn insert(&mut self, kind: OperationKind, client_id: ClientRequestId) -> bool {
        if self.entries.contains_key(&client_id) {
            return false;
        }
        self.entries.insert(
            client_id.clone(),
            PendingOperation {
                kind,
                client_id,
                created_at: Utc::now(),
            },
        );
        true
    }

    /// Look up an in-flight operation.
    #[must_use]
    pub fn get(&self, client_id: &ClientRequestId) -> Option<&PendingOperation> {
        self.entries.get(client_id)
    }

    /// Remove an operation once its terminal reply has been matched.
    pub fn resolve(&mut self, client_id: &ClientRequestId) -> Option<PendingOperation> {
        self.entries.remove(client_id)
    }

    /// Drain every in-flight operation (session teardown).
    pub fn drain(&mut self) -> Vec<PendingOperation> {
        self.entries.drain().map(|(_, op)| op).collect()
    }
}
