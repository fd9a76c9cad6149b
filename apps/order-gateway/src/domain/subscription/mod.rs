//! Subscription Tracking
//!
//! Domain types for per-session market data subscriptions. Each subscription
//! is identified by the client's MDReqID and lives until an explicit
//! unsubscribe or session teardown.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Market data entry type requested by a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MdEntryType {
    /// Bid prices.
    Bid,
    /// Offer (ask) prices.
    Offer,
    /// Trades.
    Trade,
}

/// Book depth requested by a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DepthMode {
    /// Full book.
    Full,
    /// Aggregated top-of-book levels.
    Aggregated,
}

/// Refresh style requested by a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateMode {
    /// One snapshot, no further updates.
    Snapshot,
    /// Snapshot followed by incremental refreshes.
    SnapshotAndUpdates,
}

/// An instrument referenced by a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    /// Instrument symbol.
    pub symbol: String,
    /// Venue identifier.
    pub exchange: String,
}

/// One live market data subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Client-assigned request identifier.
    pub md_req_id: String,
    /// Instruments covered.
    pub instruments: Vec<Instrument>,
    /// Entry types requested.
    pub entry_types: Vec<MdEntryType>,
    /// Book depth mode.
    pub depth: DepthMode,
    /// Refresh style.
    pub update_mode: UpdateMode,
}

/// Outcome of registering a subscription request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscriptionError {
    /// MDReqID already in use by a live subscription.
    #[error("duplicate MDReqID: {0}")]
    DuplicateRequestId(String),

    /// Unsubscribe referenced an MDReqID with no live subscription.
    #[error("unknown MDReqID: {0}")]
    UnknownRequestId(String),
}

/// Per-session set of live subscriptions, keyed by MDReqID.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    subscriptions: HashMap<String, Subscription>,
}

impl SubscriptionSet {
    /// Empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Whether no subscriptions are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Look up a subscription by MDReqID.
    #[must_use]
    pub fn get(&self, md_req_id: &str) -> Option<&Subscription> {
        self.subscriptions.get(md_req_id)
    }

    /// Register a new subscription.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::DuplicateRequestId`] when the MDReqID is
    /// already live.
    pub fn subscribe(&mut self, subscription: Subscription) -> Result<(), SubscriptionError> {
        if self.subscriptions.contains_key(&subscription.md_req_id) {
            return Err(SubscriptionError::DuplicateRequestId(
                subscription.md_req_id.clone(),
            ));
        }
        self.subscriptions
            .insert(subscription.md_req_id.clone(), subscription);
        Ok(())
    }

    /// Remove a subscription by MDReqID.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::UnknownRequestId`] when no live
    /// subscription carries that MDReqID.
    pub fn unsubscribe(&mut self, md_req_id: &str) -> Result<Subscription, SubscriptionError> {
        self.subscriptions
            .remove(md_req_id)
            .ok_or_else(|| SubscriptionError::UnknownRequestId(md_req_id.to_string()))
    }

    /// Drain every subscription (session teardown).
    pub fn drain(&mut self) -> Vec<Subscription> {
        self.subscriptions.drain().map(|(_, s)| s).collect()
    }
}
