//! WebSocket JSON-RPC Session Server
//!
//! Accepts WebSocket connections and runs one JSON-RPC 2.0 session loop per
//! connection. Requests get a direct response correlated by `id`; execution
//! reports, market data, and position updates arrive later as notifications.
//!
//! Unlike FIX, a business fault here never tears the connection down: the
//! client gets a JSON-RPC error object and the session continues. Only a
//! refused logon, an explicit logout, or the logon timeout closes the
//! transport.

use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::application::model::{ClientRequest, CoreOperation, RejectReason, Reply};
use crate::application::router::{RequestRouter, RouteOutcome, SessionCore};
use crate::domain::session::{ProtocolVariant, SessionState};
use crate::infrastructure::config::{SessionSettings, WsSettings};
use crate::infrastructure::jsonrpc::{self, codes};
use crate::infrastructure::metrics;

use super::GatewayDeps;

/// Session housekeeping cadence (logon timeout).
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// WebSocket acceptor.
#[derive(Clone)]
pub struct WsServer {
    deps: GatewayDeps,
    settings: WsSettings,
    session_settings: SessionSettings,
    router: RequestRouter,
    cancel: CancellationToken,
}

impl WsServer {
    /// Create an acceptor.
    #[must_use]
    pub fn new(
        deps: GatewayDeps,
        settings: WsSettings,
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

    /// Accept connections until cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error when the listener cannot bind.
    pub async fn run(&self) -> std::io::Result<()> {
        let listener = TcpListener::bind(&self.settings.listen_addr).await?;
        tracing::info!(addr = %self.settings.listen_addr, "WebSocket listener ready");
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            tracing::debug!(peer = %peer, "WebSocket connection accepted");
                            let server = self.clone();
                            tokio::spawn(async move { server.handle_connection(stream).await });
                        }
                        Err(e) => tracing::warn!(error = %e, "WebSocket accept failed"),
                    }
                }
            }
        }
        tracing::info!("WebSocket listener stopped");
        Ok(())
    }

    /// Run the WebSocket handshake and one session loop.
    pub async fn handle_connection<S>(&self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let ws = match tokio_tungstenite::accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                tracing::debug!(error = %e, "WebSocket handshake failed");
                return;
            }
        };
        self.run_session(ws).await;
    }

    /// Run one session loop over an established WebSocket.
    pub async fn run_session<S>(&self, ws: WebSocketStream<S>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let (sink, mut source) = ws.split();
        let (reply_tx, mut reply_rx) =
            mpsc::channel::<Reply>(self.session_settings.outbound_queue);
        let handle = self
            .deps
            .registry
            .on_connect(ProtocolVariant::JsonRpc, reply_tx);
        metrics::session_opened(ProtocolVariant::JsonRpc);

        let mut conn = Connection {
            server: self,
            session: SessionCore::new(handle.id, ProtocolVariant::JsonRpc),
            sink,
            connected_at: Instant::now(),
        };

        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = conn.sink.send(Message::Close(None)).await;
                    break;
                }
                reply = reply_rx.recv() => {
                    let Some(reply) = reply else { break };
                    if conn.deliver(&reply).await == Flow::Close {
                        break;
                    }
                }
                frame = source.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            if conn.process_text(text.as_str()).await == Flow::Close {
                                break;
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            if conn.sink.send(Message::Pong(payload)).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::debug!(session_id = %conn.session.id, error = %e, "WebSocket read failed");
                            break;
                        }
                    }
                }
                _ = ticker.tick() => {
                    if conn.on_tick() == Flow::Close {
                        break;
                    }
                }
            }
        }

        conn.teardown().await;
        metrics::session_closed(ProtocolVariant::JsonRpc);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

struct Connection<'a, S> {
    server: &'a WsServer,
    session: SessionCore,
    sink: futures_util::stream::SplitSink<WebSocketStream<S>, Message>,
    connected_at: Instant,
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> Connection<'_, S> {
    async fn send_text(&mut self, text: String) -> Flow {
        match self.sink.send(Message::text(text)).await {
            Ok(()) => Flow::Continue,
            Err(e) => {
                tracing::debug!(session_id = %self.session.id, error = %e, "WebSocket write failed");
                Flow::Close
            }
        }
    }

    /// Deliver an asynchronous reply from the dispatcher as a notification.
    async fn deliver(&mut self, reply: &Reply) -> Flow {
        if self.session.state != SessionState::Authenticated {
            tracing::debug!(
                session_id = %self.session.id,
                reply = reply.name(),
                "Dropping reply for unauthenticated session"
            );
            return Flow::Continue;
        }
        self.session.absorb(reply);
        metrics::record_reply(ProtocolVariant::JsonRpc, reply.name());
        match jsonrpc::encode_notification(reply) {
            Some(text) => self.send_text(text).await,
            None => Flow::Continue,
        }
    }

    async fn process_text(&mut self, text: &str) -> Flow {
        let decoded = match jsonrpc::decode(text) {
            Ok(decoded) => decoded,
            Err(fault) => {
                metrics::record_reject(RejectReason::BusinessReject);
                return self.send_text(jsonrpc::fault_response(&fault)).await;
            }
        };
        metrics::record_request(ProtocolVariant::JsonRpc, decoded.request.name());

        match decoded.request {
            ClientRequest::Logon(logon) => {
                self.process_logon(decoded.id, &logon.username, &logon.password)
                    .await
            }
            ClientRequest::Logout => {
                self.session.begin_close();
                let _ = self
                    .send_text(jsonrpc::result_response(decoded.id, json!({"status": "ok"})))
                    .await;
                Flow::Close
            }
            request => self.process_request(decoded.id, request).await,
        }
    }

    async fn process_logon(&mut self, id: i64, username: &str, password: &str) -> Flow {
        if !self.session.state.awaiting_logon() {
            return self
                .send_text(jsonrpc::error_response(
                    Some(id),
                    codes::INVALID_REQUEST,
                    "already logged on",
                ))
                .await;
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
                tracing::info!(session_id = %self.session.id, username, "WebSocket session authenticated");
                self.send_text(jsonrpc::result_response(id, json!({"status": "ok"})))
                    .await
            }
            Err(e) => {
                tracing::warn!(session_id = %self.session.id, username, error = %e, "WebSocket logon refused");
                metrics::record_reject(RejectReason::AuthenticationFailure);
                let _ = self
                    .send_text(jsonrpc::error_response(
                        Some(id),
                        codes::NOT_AUTHENTICATED,
                        "authentication failed",
                    ))
                    .await;
                Flow::Close
            }
        }
    }

    async fn process_request(&mut self, id: i64, request: ClientRequest) -> Flow {
        if !self.session.state.is_authenticated() {
            metrics::record_reject(RejectReason::AuthenticationFailure);
            return self
                .send_text(jsonrpc::error_response(
                    Some(id),
                    codes::NOT_AUTHENTICATED,
                    "logon required",
                ))
                .await;
        }

        match self.server.router.route(&mut self.session, request, Some(id)) {
            RouteOutcome::Reject(reply) => {
                let response = match &reply {
                    Reply::BusinessReject { reason, text, .. } => {
                        metrics::record_reject(*reason);
                        jsonrpc::error_response(Some(id), jsonrpc::reject_code(*reason), text)
                    }
                    Reply::MarketDataReject(reject) => {
                        metrics::record_reject(RejectReason::BusinessReject);
                        jsonrpc::error_response(
                            Some(id),
                            codes::BUSINESS_REJECT,
                            reject.text.as_deref().unwrap_or("market data reject"),
                        )
                    }
                    other => jsonrpc::error_response(
                        Some(id),
                        codes::BUSINESS_REJECT,
                        other.name(),
                    ),
                };
                self.send_text(response).await
            }
            RouteOutcome::Dispatch(operation) => self.dispatch(id, *operation).await,
        }
    }

    async fn dispatch(&mut self, id: i64, operation: CoreOperation) -> Flow {
        match self.server.deps.core.submit(operation.clone()).await {
            Ok(()) => {
                metrics::record_submission(true);
                self.send_text(jsonrpc::result_response(id, json!({"status": "ok"})))
                    .await
            }
            Err(e) => {
                metrics::record_submission(false);
                metrics::record_reject(RejectReason::DownstreamUnavailable);
                self.session.dispatch_failed(&operation);
                self.send_text(jsonrpc::error_response(
                    Some(id),
                    codes::DOWNSTREAM_UNAVAILABLE,
                    &e.to_string(),
                ))
                .await
            }
        }
    }

    fn on_tick(&mut self) -> Flow {
        if self.session.state != SessionState::Authenticated
            && self.connected_at.elapsed() > self.server.settings.logon_timeout
        {
            tracing::warn!(
                session_id = %self.session.id,
                "Closing connection (client did not send a logon request)"
            );
            return Flow::Close;
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
                op_id: uuid::Uuid::new_v4(),
                client_id: crate::domain::session::ClientRequestId::Request(format!(
                    "cod-{session_id}"
                )),
                payload: crate::application::model::OperationPayload::MassCancel(
                    crate::application::model::MassCancelRequest {
                        cl_ord_id: None,
                        exchange: None,
                        symbol: None,
                    },
                ),
                routed_at: chrono::Utc::now(),
            };
            if let Err(e) = self.server.deps.core.submit(operation).await {
                tracing::warn!(session_id = %session_id, error = %e, "Cancel-on-disconnect submission failed");
            }
        }
        let _ = self.sink.close().await;
    }
}
