//! FIX Session Server
//!
//! Accepts FIX 4.4 connections on TCP and/or a Unix-domain socket and runs
//! one session loop per connection. The loop exclusively owns the session's
//! state: read buffer, sequence counters, order and pending tables, and the
//! write half of the transport. Replies from the event dispatcher arrive on
//! the session's queue and are encoded here, so a slow or dead peer never
//! blocks another session.
//!
//! Session administration follows the FIX session layer: a connection that
//! does not log on within the configured window is closed, a quiet peer is
//! probed with TestRequest and dropped after a missed heartbeat, and a
//! sequence gap is handled per the configured policy.

use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, WriteHalf};
use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::application::model::{
    ClientRequest, CoreOperation, MassCancelRequest, OperationPayload, RejectReason, Reply,
};
use crate::application::router::{RequestRouter, RouteOutcome, SessionCore};
use crate::domain::session::{ClientRequestId, ProtocolVariant, SeqCheck, SessionState};
use crate::infrastructure::config::{FixSettings, SeqGapPolicy, SessionSettings};
use crate::infrastructure::fix::wire::{self, FixInbound};
use crate::infrastructure::fix::{DecodeOutcome, FixHeader, FixMessage, HeaderStamp, codec};
use crate::infrastructure::metrics;

use super::GatewayDeps;

/// Read chunk size for the transport buffer.
const READ_CHUNK: usize = 8 * 1024;

/// Session housekeeping cadence (logon timeout, heartbeat probes).
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// FIX acceptor.
#[derive(Clone)]
pub struct FixServer {
    deps: GatewayDeps,
    settings: FixSettings,
    session_settings: SessionSettings,
    router: RequestRouter,
    cancel: CancellationToken,
}

impl FixServer {
    /// Create an acceptor.
    #[must_use]
    pub fn new(
        deps: GatewayDeps,
        settings: FixSettings,
        session_settings: SessionSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            deps,
            settings,
            session_settings,
            router: RequestRouter::new(),
            cancel,
        }
    }

    /// Accept TCP connections until cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error when the listener cannot bind.
    pub async fn run_tcp(&self, addr: &str) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(addr, "FIX TCP listener ready");
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            tracing::debug!(peer = %peer, "FIX connection accepted");
                            let server = self.clone();
                            tokio::spawn(async move { server.handle_connection(stream).await });
                        }
                        Err(e) => tracing::warn!(error = %e, "FIX accept failed"),
                    }
                }
            }
        }
        tracing::info!("FIX TCP listener stopped");
        Ok(())
    }

    /// Accept Unix-domain connections until cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error when the socket cannot be bound.
    #[cfg(unix)]
    pub async fn run_unix(&self, path: &str) -> std::io::Result<()> {
        // A stale socket file from a previous run would block the bind.
        let _ = std::fs::remove_file(path);
        let listener = UnixListener::bind(path)?;
        tracing::info!(path, "FIX Unix listener ready");
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _)) => {
                            tracing::debug!("FIX Unix connection accepted");
                            let server = self.clone();
                            tokio::spawn(async move { server.handle_connection(stream).await });
                        }
                        Err(e) => tracing::warn!(error = %e, "FIX Unix accept failed"),
                    }
                }
            }
        }
        let _ = std::fs::remove_file(path);
        tracing::info!("FIX Unix listener stopped");
        Ok(())
    }

    /// Run one connection's session loop to completion.
    pub async fn handle_connection<S>(&self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Send,
    {
        let (mut read, write) = tokio::io::split(stream);
        let (reply_tx, mut reply_rx) =
            mpsc::channel::<Reply>(self.session_settings.outbound_queue);
        let handle = self.deps.registry.on_connect(ProtocolVariant::Fix, reply_tx);
        metrics::session_opened(ProtocolVariant::Fix);

        let mut conn = Connection {
            server: self,
            session: SessionCore::new(handle.id, ProtocolVariant::Fix),
            write,
            client_comp_id: None,
            waiting_for_heartbeat: false,
            connected_at: Instant::now(),
            last_inbound: Instant::now(),
        };

        let mut buf: Vec<u8> = Vec::with_capacity(READ_CHUNK);
        let mut chunk = [0u8; READ_CHUNK];
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                reply = reply_rx.recv() => {
                    let Some(reply) = reply else { break };
                    if conn.deliver(&reply).await == Flow::Close {
                        break;
                    }
                }
                read_result = read.read(&mut chunk) => {
                    match read_result {
                        Ok(0) => break,
                        Ok(n) => {
                            buf.extend_from_slice(&chunk[..n]);
                            if conn.drain_frames(&mut buf).await == Flow::Close {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::debug!(session_id = %conn.session.id, error = %e, "FIX read failed");
                            break;
                        }
                    }
                }
                _ = ticker.tick() => {
                    if conn.on_tick().await == Flow::Close {
                        break;
                    }
                }
            }
        }

        conn.teardown().await;
        metrics::session_closed(ProtocolVariant::Fix);
    }
}

/// Whether a session loop keeps going after handling one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

struct Connection<'a, S> {
    server: &'a FixServer,
    session: SessionCore,
    write: WriteHalf<S>,
    client_comp_id: Option<String>,
    waiting_for_heartbeat: bool,
    connected_at: Instant,
    last_inbound: Instant,
}

impl<S: AsyncRead + AsyncWrite + Send> Connection<'_, S> {
    fn stamp(&mut self) -> HeaderStamp {
        HeaderStamp {
            sender_comp_id: self.server.settings.comp_id.clone(),
            target_comp_id: self
                .client_comp_id
                .clone()
                .unwrap_or_else(|| "CLIENT".to_string()),
            msg_seq_num: self.session.seq.next_outbound(),
            sending_time: Utc::now(),
        }
    }

    async fn send(&mut self, message: FixMessage) -> Flow {
        let bytes = codec::encode(&message);
        match self.write.write_all(&bytes).await {
            Ok(()) => Flow::Continue,
            Err(e) => {
                tracing::debug!(session_id = %self.session.id, error = %e, "FIX write failed");
                Flow::Close
            }
        }
    }

    /// Absorb a reply into session state, encode it, and write it out.
    async fn send_reply(&mut self, reply: &Reply) -> Flow {
        self.session.absorb(reply);
        metrics::record_reply(ProtocolVariant::Fix, reply.name());
        let stamp = self.stamp();
        self.send(wire::encode_reply(reply, &stamp)).await
    }

    /// Send a Logout carrying `text`, then close.
    async fn logout_and_close(&mut self, text: &str) -> Flow {
        self.session.begin_close();
        let stamp = self.stamp();
        let _ = self.send(wire::logout(&stamp, text)).await;
        Flow::Close
    }

    /// Deliver an asynchronous reply from the dispatcher.
    async fn deliver(&mut self, reply: &Reply) -> Flow {
        if self.session.state != SessionState::Authenticated {
            tracing::debug!(
                session_id = %self.session.id,
                reply = reply.name(),
                "Dropping reply for unauthenticated session"
            );
            return Flow::Continue;
        }
        self.send_reply(reply).await
    }

    /// Decode and process every complete frame in the buffer.
    async fn drain_frames(&mut self, buf: &mut Vec<u8>) -> Flow {
        loop {
            match codec::decode(buf) {
                Ok(DecodeOutcome::NeedMoreData) => return Flow::Continue,
                Ok(DecodeOutcome::Message { message, consumed }) => {
                    buf.drain(..consumed);
                    self.last_inbound = Instant::now();
                    self.waiting_for_heartbeat = false;
                    if self.process_message(&message).await == Flow::Close {
                        return Flow::Close;
                    }
                }
                Err(e) => {
                    // Framing faults are connection-fatal; no resync attempt.
                    tracing::warn!(session_id = %self.session.id, error = %e, "Malformed FIX frame");
                    metrics::record_reject(RejectReason::MalformedFrame);
                    return Flow::Close;
                }
            }
        }
    }

    async fn process_message(&mut self, message: &FixMessage) -> Flow {
        let header = match FixHeader::parse(message) {
            Ok(header) => header,
            Err(e) => {
                let reply = Reply::SessionReject {
                    ref_seq_num: None,
                    reason: RejectReason::BusinessReject,
                    text: e.to_string(),
                };
                let _ = self.send_reply(&reply).await;
                return Flow::Close;
            }
        };
        metrics::record_request(ProtocolVariant::Fix, &header.msg_type);

        if self.client_comp_id.is_none() {
            self.client_comp_id = Some(header.sender_comp_id.clone());
        }
        if header.target_comp_id != self.server.settings.comp_id {
            return self.logout_and_close("unknown TargetCompID").await;
        }
        if self.check_sequence(&header).await == Flow::Close {
            return Flow::Close;
        }

        let inbound = match wire::decode_inbound(message) {
            Ok(inbound) => inbound,
            Err(crate::infrastructure::fix::FixDecodeError::Malformed(e)) => {
                tracing::warn!(session_id = %self.session.id, error = %e, "Malformed FIX group");
                metrics::record_reject(RejectReason::MalformedFrame);
                return Flow::Close;
            }
            Err(e @ crate::infrastructure::fix::FixDecodeError::Field { .. }) => {
                let reply = Reply::SessionReject {
                    ref_seq_num: Some(header.msg_seq_num),
                    reason: RejectReason::BusinessReject,
                    text: e.to_string(),
                };
                return self.send_reply(&reply).await;
            }
        };

        match inbound {
            FixInbound::Logon {
                username, password, ..
            } => self.process_logon(&username, &password).await,
            FixInbound::Logout => {
                self.session.begin_close();
                let _ = self.send_reply(&Reply::LogoutAck).await;
                Flow::Close
            }
            FixInbound::Heartbeat { .. } => Flow::Continue,
            FixInbound::TestRequest { test_req_id } => {
                let stamp = self.stamp();
                self.send(wire::heartbeat(&stamp, Some(&test_req_id))).await
            }
            FixInbound::Request(request) => self.process_request(request, &header).await,
        }
    }

    async fn check_sequence(&mut self, header: &FixHeader) -> Flow {
        match self.session.seq.check_inbound(header.msg_seq_num) {
            SeqCheck::InOrder => Flow::Continue,
            SeqCheck::Gap { expected, received } | SeqCheck::Replay { expected, received } => {
                metrics::record_reject(RejectReason::SequenceGap);
                match self.server.settings.seq_gap_policy {
                    SeqGapPolicy::Terminate => {
                        let text =
                            format!("sequence gap: expected {expected}, received {received}");
                        tracing::warn!(session_id = %self.session.id, expected, received, "Sequence fault, terminating");
                        self.logout_and_close(&text).await
                    }
                    SeqGapPolicy::Ignore => {
                        tracing::warn!(session_id = %self.session.id, expected, received, "Sequence fault, continuing per policy");
                        Flow::Continue
                    }
                }
            }
        }
    }

    async fn process_logon(&mut self, username: &str, password: &str) -> Flow {
        if !self.session.state.awaiting_logon() {
            return self.logout_and_close("unexpected Logon").await;
        }
        self.session.state = SessionState::Authenticating;
        match self
            .server
            .deps
            .credentials
            .authenticate(username, password)
            .await
        {
            Ok(()) => {
                self.session.logon_accepted(username);
                tracing::info!(session_id = %self.session.id, username, "FIX session authenticated");
                self.send_reply(&Reply::LogonAck {
                    heartbeat_secs: self.server.settings.heartbeat_interval.as_secs(),
                })
                .await
            }
            Err(e) => {
                tracing::warn!(session_id = %self.session.id, username, error = %e, "FIX logon refused");
                metrics::record_reject(RejectReason::AuthenticationFailure);
                self.logout_and_close("authentication failed").await
            }
        }
    }

    async fn process_request(&mut self, request: ClientRequest, header: &FixHeader) -> Flow {
        if !self.session.state.is_authenticated() {
            let reply = Reply::SessionReject {
                ref_seq_num: Some(header.msg_seq_num),
                reason: RejectReason::AuthenticationFailure,
                text: "logon required".to_string(),
            };
            metrics::record_reject(RejectReason::AuthenticationFailure);
            let _ = self.send_reply(&reply).await;
            return Flow::Close;
        }

        match self.server.router.route(&mut self.session, request, None) {
            RouteOutcome::Reject(reply) => {
                if let Reply::BusinessReject { reason, .. } = &reply {
                    metrics::record_reject(*reason);
                }
                self.send_reply(&reply).await
            }
            RouteOutcome::Dispatch(operation) => self.dispatch(*operation).await,
        }
    }

    async fn dispatch(&mut self, operation: CoreOperation) -> Flow {
        let client_id = operation.client_id.clone();
        match self.server.deps.core.submit(operation.clone()).await {
            Ok(()) => {
                metrics::record_submission(true);
                Flow::Continue
            }
            Err(e) => {
                metrics::record_submission(false);
                metrics::record_reject(RejectReason::DownstreamUnavailable);
                self.session.dispatch_failed(&operation);
                let reply = Reply::BusinessReject {
                    ref_id: Some(client_id.to_string()),
                    reason: RejectReason::DownstreamUnavailable,
                    text: e.to_string(),
                };
                self.send_reply(&reply).await
            }
        }
    }

    async fn on_tick(&mut self) -> Flow {
        if self.session.state != SessionState::Authenticated {
            if self.connected_at.elapsed() > self.server.settings.logon_timeout {
                tracing::warn!(
                    session_id = %self.session.id,
                    "Closing connection (client did not send a logon message)"
                );
                return Flow::Close;
            }
            return Flow::Continue;
        }

        if self.last_inbound.elapsed() >= self.server.settings.heartbeat_interval {
            if self.waiting_for_heartbeat {
                tracing::warn!(
                    session_id = %self.session.id,
                    "Closing connection (client did not answer heartbeat probe)"
                );
                return self.logout_and_close("missing heartbeat").await;
            }
            self.waiting_for_heartbeat = true;
            let test_req_id = Utc::now().timestamp_millis().to_string();
            let stamp = self.stamp();
            return self.send(wire::test_request(&stamp, &test_req_id)).await;
        }
        Flow::Continue
    }

    async fn teardown(mut self) {
        let session_id = self.session.id;
        self.server.deps.registry.on_disconnect(session_id);
        let (pending, subscriptions) = self.session.disconnected();
        if !pending.is_empty() || !subscriptions.is_empty() {
            tracing::info!(
                session_id = %session_id,
                pending = pending.len(),
                subscriptions = subscriptions.len(),
                "Session teardown drained in-flight state"
            );
        }
        if self.server.session_settings.cancel_on_disconnect && !pending.is_empty() {
            let operation = CoreOperation {
                session_id,
                op_id: Uuid::new_v4(),
                client_id: ClientRequestId::Request(format!("cod-{session_id}")),
                payload: OperationPayload::MassCancel(MassCancelRequest {
                    cl_ord_id: None,
                    exchange: None,
                    symbol: None,
                }),
                routed_at: Utc::now(),
            };
            if let Err(e) = self.server.deps.core.submit(operation).await {
                tracing::warn!(session_id = %session_id, error = %e, "Cancel-on-disconnect submission failed");
            }
        }
        let _ = self.write.shutdown().await;
    }
}
