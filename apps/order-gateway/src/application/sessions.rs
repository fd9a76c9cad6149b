//! Session Registry
//!
//! The authoritative set of live sessions. Each transport connection gets
//! exactly one entry; the registry hands out identities, delivers replies to
//! a session's outbound queue, and releases the entry on disconnect.
//!
//! The registry holds only a handle per session (identity, protocol, reply
//! sender). Mutable session state stays with the connection task that owns
//! it; the table itself is the one piece of cross-session shared state and is
//! guarded by a `parking_lot` lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::application::model::Reply;
use crate::domain::session::{ProtocolVariant, SessionId};

/// Delivery failure when pushing a reply toward a session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// No live session with that identity.
    #[error("unknown session: {0}")]
    UnknownSession(SessionId),

    /// The session's outbound queue is full (slow consumer).
    #[error("session {0} outbound queue full")]
    QueueFull(SessionId),

    /// The session's outbound queue is gone (connection tearing down).
    #[error("session {0} is closed")]
    SessionClosed(SessionId),
}

/// Handle to one live session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    /// Gateway-assigned identity.
    pub id: SessionId,
    /// Wire protocol.
    pub protocol: ProtocolVariant,
    outbound: mpsc::Sender<Reply>,
}

impl SessionHandle {
    /// Queue a reply for the session's writer task.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::QueueFull`] when the session cannot keep up
    /// and [`DeliveryError::SessionClosed`] when the connection has dropped
    /// its receiver; either way the caller abandons the reply.
    pub fn deliver(&self, reply: Reply) -> Result<(), DeliveryError> {
        self.outbound.try_send(reply).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::QueueFull(self.id),
            mpsc::error::TrySendError::Closed(_) => DeliveryError::SessionClosed(self.id),
        })
    }
}

/// The live-session table.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    next_id: AtomicU64,
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
}

impl SessionRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection and assign it an identity.
    ///
    /// `outbound` is the sending half of the connection's reply queue; the
    /// connection task owns the receiving half.
    pub fn on_connect(
        &self,
        protocol: ProtocolVariant,
        outbound: mpsc::Sender<Reply>,
    ) -> SessionHandle {
        let id = SessionId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let handle = SessionHandle {
            id,
            protocol,
            outbound,
        };
        self.sessions.write().insert(id, handle.clone());
        tracing::info!(session_id = %id, protocol = protocol.as_str(), "Session connected");
        handle
    }

    /// Release a session on disconnect.
    pub fn on_disconnect(&self, id: SessionId) {
        if self.sessions.write().remove(&id).is_some() {
            tracing::info!(session_id = %id, "Session released");
        }
    }

    /// Look up a live session.
    #[must_use]
    pub fn lookup(&self, id: SessionId) -> Option<SessionHandle> {
        self.sessions.read().get(&id).cloned()
    }

    /// Deliver a reply to a session, if it is still live.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::UnknownSession`] when the session has already
    /// been released and [`DeliveryError::SessionClosed`] when its queue is
    /// gone. Either way the reply is abandoned without affecting any other
    /// session.
    pub fn deliver(&self, id: SessionId, reply: Reply) -> Result<(), DeliveryError> {
        let handle = self.lookup(id).ok_or(DeliveryError::UnknownSession(id))?;
        handle.deliver(reply)
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Whether no sessions are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_assigns_unique_ids() {
        let registry = SessionRegistry::new();
        let (tx1, _rx1) = mpsc::channel(4);
        let (tx2, _rx2) = mpsc::channel(4);

        let a = registry.on_connect(ProtocolVariant::Fix, tx1);
        let b = registry.on_connect(ProtocolVariant::JsonRpc, tx2);

        assert_ne!(a.id, b.id);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn disconnect_releases() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = mpsc::channel(4);
        let handle = registry.on_connect(ProtocolVariant::Fix, tx);

        registry.on_disconnect(handle.id);
        assert!(registry.lookup(handle.id).is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn deliver_reaches_queue() {
        let registry = SessionRegistry::new();
        let (tx, mut rx) = mpsc::channel(4);
        let handle = registry.on_connect(ProtocolVariant::JsonRpc, tx);

        registry
            .deliver(handle.id, Reply::LogonAck { heartbeat_secs: 30 })
            .unwrap();

        let reply = rx.recv().await.unwrap();
        assert!(matches!(reply, Reply::LogonAck { .. }));
    }

    #[test]
    fn deliver_to_unknown_session_fails() {
        let registry = SessionRegistry::new();
        let err = registry
            .deliver(SessionId(42), Reply::LogoutAck)
            .unwrap_err();
        assert_eq!(err, DeliveryError::UnknownSession(SessionId(42)));
    }

    #[test]
    fn deliver_to_closed_queue_fails() {
        let registry = SessionRegistry::new();
        let (tx, rx) = mpsc::channel(1);
        let handle = registry.on_connect(ProtocolVariant::Fix, tx);
        drop(rx);

        let err = registry.deliver(handle.id, Reply::LogoutAck).unwrap_err();
        assert_eq!(err, DeliveryError::SessionClosed(handle.id));
    }
}
