#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Order Gateway - Dual-Protocol Front End
//!
//! Accepts FIX 4.4 tag=value sessions (TCP or Unix-domain socket) and
//! JSON-RPC 2.0 sessions (WebSocket), authenticates them, translates
//! requests into a uniform internal representation, dispatches them to the
//! trading core, and fans execution reports, market data, and position
//! snapshots back to the originating session in its own wire format.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Session, order, and subscription state with no I/O
//!   - `order`: order lifecycle and per-session ClOrdID tracking
//!   - `session`: state machine, sequence counters, pending operations
//!   - `subscription`: market data subscription set
//!
//! - **Application**: Protocol-neutral model, ports, and routing
//!   - `model`: the request/reply/event shapes both codecs meet
//!   - `ports`: credential store and trading core contracts
//!   - `router`: request routing and downstream-event correlation
//!   - `sessions`: the live-session registry
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `fix`, `jsonrpc`: wire codecs
//!   - `server`: transport acceptors and per-connection session loops
//!   - `downstream`: the shared trading core link
//!   - `auth`, `config`, `health`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//! FIX TCP/UDS ──┐                                          ┌──► trading core
//!               ├──► codec ──► session ──► router ──► link ┤
//! WebSocket  ───┘                ▲                         └──► (async events)
//!                                └────── dispatcher ◄──────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Domain layer - Session, order, and subscription state with no I/O.
pub mod domain;

/// Application layer - Model, ports, routing, and the session registry.
pub mod application;

/// Infrastructure layer - Codecs, transports, and external integrations.
pub mod infrastructure;

// Domain types
pub use domain::order::{ClOrdId, OrdType, Order, OrderStatus, OrderTracker, Side, TimeInForce};
pub use domain::session::{ProtocolVariant, SeqCheck, SequenceCounters, SessionId, SessionState};
pub use domain::subscription::{Instrument, MdEntryType, Subscription, SubscriptionSet};

// Application surface
pub use application::model::{ClientRequest, CoreEvent, CoreOperation, RejectReason, Reply};
pub use application::router::{RequestRouter, RouteOutcome, SessionCore, run_event_dispatch};
pub use application::sessions::{SessionHandle, SessionRegistry};

// Infrastructure config
pub use infrastructure::config::{
    ConfigError, Credential, GatewayConfig, SeqGapPolicy, SessionSettings,
};

// Transport servers (for integration tests)
pub use infrastructure::server::{GatewayDeps, fix::FixServer, ws::WsServer};

// Downstream link
pub use infrastructure::downstream::{CoreLink, CoreLinkConfig, MockCore};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
