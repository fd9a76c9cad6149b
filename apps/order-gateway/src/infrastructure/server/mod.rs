//! Transport Acceptors
//!
//! The two client-facing front doors: FIX 4.4 over TCP or Unix-domain
//! stream sockets, and JSON-RPC 2.0 over WebSocket. Each accepted connection
//! gets one task that exclusively owns its session state; the acceptors share
//! nothing but the registry, the credential store, and the core link.

use std::sync::Arc;

use crate::application::ports::{CredentialStore, TradingCore};
use crate::application::sessions::SessionRegistry;

/// FIX acceptor and per-connection session loop.
pub mod fix;

/// WebSocket acceptor and per-connection session loop.
pub mod ws;

/// Collaborators shared by every connection.
#[derive(Clone)]
pub struct GatewayDeps {
    /// Live-session table.
    pub registry: Arc<SessionRegistry>,
    /// Trading core submission handle.
    pub core: Arc<dyn TradingCore>,
    /// Logon credential validator.
    pub credentials: Arc<dyn CredentialStore>,
}

impl std::fmt::Debug for GatewayDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayDeps")
            .field("sessions", &self.registry.len())
            .finish()
    }
}
