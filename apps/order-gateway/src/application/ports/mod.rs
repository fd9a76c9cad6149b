//! Port Interfaces
//!
//! Contracts for the gateway's external collaborators, following the
//! hexagonal architecture pattern.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`CredentialStore`]: validates logon credentials
//! - [`TradingCore`]: accepts operations for the downstream trading core
//!
//! Asynchronous events from the core arrive on an mpsc channel owned by the
//! event dispatcher, not through a port; see `infrastructure::downstream`.

use async_trait::async_trait;

use crate::application::model::CoreOperation;

/// Errors from credential validation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    /// Username/password pair refused.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The credential backend could not be reached.
    #[error("credential store unavailable: {0}")]
    Unavailable(String),
}

/// Validates logon credentials.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Check a username/password pair.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] on refusal and
    /// [`AuthError::Unavailable`] when the backend cannot answer.
    async fn authenticate(&self, username: &str, password: &str) -> Result<(), AuthError>;
}

/// Errors from submitting an operation downstream.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DownstreamError {
    /// The core link is down or not yet established.
    #[error("trading core unavailable: {0}")]
    Unavailable(String),

    /// The submission queue is full (backpressure).
    #[error("trading core submission queue full")]
    QueueFull,
}

/// Accepts operations for the downstream trading core.
///
/// Implementations must serialize concurrent sends; callers on different
/// session tasks submit without coordination.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TradingCore: Send + Sync {
    /// Submit one operation.
    ///
    /// Acceptance here means the operation was handed to the core link, not
    /// that the core acted on it; outcomes arrive later as events.
    ///
    /// # Errors
    ///
    /// Returns [`DownstreamError`] when the link cannot accept the
    /// operation. The caller surfaces this as a per-request reject.
    async fn submit(&self, operation: CoreOperation) -> Result<(), DownstreamError>;
}
