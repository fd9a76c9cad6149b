//! Trading Core Link
//!
//! The shared connection to the downstream trading core. All sessions submit
//! operations through one [`CoreLink`]; concurrent sends are serialized
//! through a single writer task, and asynchronous events come back on one
//! channel consumed by the event dispatcher.
//!
//! The link reconnects with exponential backoff and jitter. While it is
//! down, submissions fail fast with `DownstreamUnavailable` and the sessions
//! translate that into per-request rejects; the gateway never crashes on a
//! core outage.

/// Exponential backoff policy for reconnection.
pub mod backoff;

/// The TCP link implementation.
pub mod link;

/// In-process core double for tests.
pub mod mock;

pub use backoff::{BackoffConfig, BackoffPolicy};
pub use link::{CoreLink, CoreLinkConfig, CoreLinkTask};
pub use mock::MockCore;
