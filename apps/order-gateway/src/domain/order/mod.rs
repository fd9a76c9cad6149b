//! Order Domain
//!
//! Order identity and lifecycle tracking, scoped to a single session.
//! Orders are created when a `NewOrderSingle` is routed downstream and are
//! mutated only by execution reports coming back from the trading core.
//!
//! ClOrdID uniqueness is a per-session invariant: reusing a ClOrdID while a
//! prior order with that ID is still live is a duplicate; reuse after the
//! prior order reached a terminal state is allowed.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Client-assigned order identifier, unique within a session's active lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClOrdId(String);

impl ClOrdId {
    /// Create a new identifier from a wire value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw identifier string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClOrdId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClOrdId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    /// Buy.
    Buy,
    /// Sell.
    Sell,
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrdType {
    /// Market order.
    Market,
    /// Limit order (requires a price).
    Limit,
}

/// Time in force.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeInForce {
    /// Good for the trading day.
    Day,
    /// Good till canceled.
    Gtc,
    /// Immediate or cancel.
    Ioc,
    /// Fill or kill.
    Fok,
}

/// Order status, following FIX OrdStatus semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Sent downstream, not yet acknowledged.
    PendingNew,
    /// Acknowledged by the trading core.
    New,
    /// Partially filled.
    PartiallyFilled,
    /// Completely filled.
    Filled,
    /// Canceled.
    Canceled,
    /// Rejected by the trading core.
    Rejected,
    /// Cancel requested, not yet confirmed.
    PendingCancel,
}

impl OrderStatus {
    /// Whether this status is terminal (no further transitions expected).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Filled | Self::Canceled | Self::Rejected)
    }
}

/// Execution type reported alongside a status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecType {
    /// Order accepted.
    New,
    /// Fill or partial fill.
    Trade,
    /// Order canceled.
    Canceled,
    /// Order rejected.
    Rejected,
    /// Acceptance pending.
    PendingNew,
    /// Cancellation pending.
    PendingCancel,
    /// Status snapshot (mass status responses).
    OrderStatus,
}

/// A tracked order within one session.
#[derive(Debug, Clone)]
pub struct Order {
    /// Client-assigned identifier.
    pub cl_ord_id: ClOrdId,
    /// Original identifier this order replaces or cancels, if any.
    pub orig_cl_ord_id: Option<ClOrdId>,
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
    /// Limit price, when applicable.
    pub price: Option<Decimal>,
    /// Time in force.
    pub time_in_force: TimeInForce,
    /// Current status.
    pub status: OrderStatus,
    /// Cumulative filled quantity.
    pub cum_qty: Decimal,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Errors raised by per-session order tracking.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    /// ClOrdID reused while a prior order with that ID is still live.
    #[error("duplicate ClOrdID: {0}")]
    DuplicateClOrdId(ClOrdId),

    /// Cancel referenced a ClOrdID never seen in this session.
    #[error("unknown order: {0}")]
    UnknownOrder(ClOrdId),
}

/// Per-session order table.
///
/// Owns every order the session has routed downstream and enforces the
/// ClOrdID uniqueness invariant. Mutations come exclusively from execution
/// updates produced by the trading core.
#[derive(Debug, Default)]
pub struct OrderTracker {
    orders: HashMap<ClOrdId, Order>,
    // cancel ClOrdID -> original order ClOrdID
    cancels: HashMap<ClOrdId, ClOrdId>,
}

impl OrderTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked orders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    /// Whether the tracker holds no orders.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Look up an order by ClOrdID.
    #[must_use]
    pub fn get(&self, cl_ord_id: &ClOrdId) -> Option<&Order> {
        self.orders.get(cl_ord_id)
    }

    /// Register a new order.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::DuplicateClOrdId`] when the ID is already in use
    /// by an order that has not reached a terminal state, or by a pending
    /// cancel request.
    pub fn register_new(&mut self, order: Order) -> Result<(), OrderError> {
        if self.cancels.contains_key(&order.cl_ord_id) {
            return Err(OrderError::DuplicateClOrdId(order.cl_ord_id.clone()));
        }
        if let Some(existing) = self.orders.get(&order.cl_ord_id)
            && !existing.status.is_terminal()
        {
            return Err(OrderError::DuplicateClOrdId(order.cl_ord_id.clone()));
        }
        self.orders.insert(order.cl_ord_id.clone(), order);
        Ok(())
    }

    /// Register a cancel request against a previously seen order.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::UnknownOrder`] when `orig_cl_ord_id` was never
    /// tracked in this session, and [`OrderError::DuplicateClOrdId`] when the
    /// cancel's own ClOrdID collides with a live order or another cancel.
    pub fn register_cancel(
        &mut self,
        orig_cl_ord_id: &ClOrdId,
        cl_ord_id: &ClOrdId,
    ) -> Result<(), OrderError> {
        if !self.orders.contains_key(orig_cl_ord_id) {
            return Err(OrderError::UnknownOrder(orig_cl_ord_id.clone()));
        }
        if self.cancels.contains_key(cl_ord_id) {
            return Err(OrderError::DuplicateClOrdId(cl_ord_id.clone()));
        }
        if let Some(existing) = self.orders.get(cl_ord_id)
            && !existing.status.is_terminal()
        {
            return Err(OrderError::DuplicateClOrdId(cl_ord_id.clone()));
        }
        self.cancels
            .insert(cl_ord_id.clone(), orig_cl_ord_id.clone());
        if let Some(order) = self.orders.get_mut(orig_cl_ord_id) {
            order.status = OrderStatus::PendingCancel;
        }
        Ok(())
    }

    /// Apply an execution update from the trading core.
    ///
    /// Resolves the target order through the cancel mapping when the update
    /// references a cancel's ClOrdID. Unknown identifiers are ignored: an
    /// update for an order this session never routed carries no state to
    /// mutate.
    pub fn apply_execution(
        &mut self,
        cl_ord_id: &ClOrdId,
        status: OrderStatus,
        cum_qty: Decimal,
    ) -> Option<&Order> {
        let target = self
            .cancels
            .get(cl_ord_id)
            .cloned()
            .unwrap_or_else(|| cl_ord_id.clone());
        let order = self.orders.get_mut(&target)?;
        order.status = status;
        order.cum_qty = cum_qty;
        Some(order)
    }

    /// Whether the order (or the order a cancel points at) is terminal.
    #[must_use]
    pub fn is_terminal(&self, cl_ord_id: &ClOrdId) -> bool {
        let target = self.cancels.get(cl_ord_id).unwrap_or(cl_ord_id);
        self.orders
            .get(target)
            .is_some_and(|o| o.status.is_terminal())
    }
}
