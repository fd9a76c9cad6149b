//! Request Router
//!
//! Maps decoded, protocol-neutral requests onto downstream operations and
//! correlates asynchronous core events back to the session that must receive
//! them. The router never sees FIX tag numbers or JSON field names; both
//! codecs meet it at the [`ClientRequest`]/[`Reply`] boundary.
//!
//! Routing validates per-session invariants (ClOrdID uniqueness, known
//! OrigClOrdID, unique request identifiers) against the session's own state,
//! records the pending operation, and emits a [`CoreOperation`] tagged with
//! session id + client identifier so replies route back to exactly one
//! session.

use chrono::Utc;
use uuid::Uuid;

use crate::application::model::{
    ClientRequest, CoreEvent, CoreEventPayload, CoreOperation, MdAction, OperationPayload,
    RejectReason, Reply,
};
use crate::domain::order::{ClOrdId, Order, OrderError, OrderStatus, OrderTracker};
use crate::domain::session::{
    ClientRequestId, OperationKind, PendingOperation, PendingTable, ProtocolVariant,
    SequenceCounters, SessionId, SessionState,
};
use crate::domain::subscription::{Subscription, SubscriptionSet, UpdateMode};

// =============================================================================
// Session aggregate
// =============================================================================

/// The complete state of one session, exclusively owned by its connection
/// task. Nothing here is shared; the session registry holds only a handle.
#[derive(Debug)]
pub struct SessionCore {
    /// Gateway-assigned identity.
    pub id: SessionId,
    /// Wire protocol.
    pub protocol: ProtocolVariant,
    /// Lifecycle state.
    pub state: SessionState,
    /// FIX sequence counters (unused for JSON-RPC).
    pub seq: SequenceCounters,
    /// Authenticated username, once logon succeeds.
    pub username: Option<String>,
    /// Per-session order table.
    pub orders: OrderTracker,
    /// Live market data subscriptions.
    pub subscriptions: SubscriptionSet,
    /// Operations awaiting a terminal reply.
    pub pending: PendingTable,
}

impl SessionCore {
    /// A freshly connected session, waiting for Logon.
    #[must_use]
    pub fn new(id: SessionId, protocol: ProtocolVariant) -> Self {
        Self {
            id,
            protocol,
            state: SessionState::Connected,
            seq: SequenceCounters::new(),
            username: None,
            orders: OrderTracker::new(),
            subscriptions: SubscriptionSet::new(),
            pending: PendingTable::new(),
        }
    }

    /// Record a successful logon.
    pub fn logon_accepted(&mut self, username: impl Into<String>) {
        self.username = Some(username.into());
        self.state = SessionState::Authenticated;
    }

    /// Enter the closing state (logout or fatal fault).
    pub fn begin_close(&mut self) {
        self.state = SessionState::Closing;
    }

    /// Tear the session down, draining everything it owns.
    ///
    /// Returns the orphaned pending operations and subscriptions so the
    /// caller can apply the disconnect policy (abandon or best-effort
    /// downstream cancel).
    pub fn disconnected(&mut self) -> (Vec<PendingOperation>, Vec<Subscription>) {
        self.state = SessionState::Disconnected;
        (self.pending.drain(), self.subscriptions.drain())
    }

    /// Apply a reply to session state before it is encoded.
    ///
    /// Terminal replies resolve their pending operation; execution updates
    /// mutate the order table; a snapshot delivered to a snapshot-only
    /// subscription retires it.
    pub fn absorb(&mut self, reply: &Reply) {
        match reply {
            Reply::Execution(update) => {
                // Mass-status snapshots report state without transitioning it.
                if update.mass_status_req_id.is_none() {
                    self.orders.apply_execution(
                        &update.cl_ord_id,
                        update.ord_status,
                        update.cum_qty,
                    );
                    if update.ord_status.is_terminal() {
                        self.pending
                            .resolve(&ClientRequestId::ClOrd(update.cl_ord_id.clone()));
                        if let Some(orig) = &update.orig_cl_ord_id {
                            self.pending.resolve(&ClientRequestId::ClOrd(orig.clone()));
                        }
                    }
                }
            }
            Reply::CancelReject(reject) => {
                self.pending
                    .resolve(&ClientRequestId::ClOrd(reject.cl_ord_id.clone()));
            }
            Reply::MassCancelReport(report) => {
                self.pending.resolve(&report.client_id);
            }
            Reply::MassStatusAck(ack) => {
                self.pending
                    .resolve(&ClientRequestId::Request(ack.mass_status_req_id.clone()));
            }
            Reply::PositionsComplete(complete) => {
                self.pending
                    .resolve(&ClientRequestId::Request(complete.pos_req_id.clone()));
            }
            Reply::MarketData(update) if update.is_snapshot => {
                self.pending
                    .resolve(&ClientRequestId::Request(update.md_req_id.clone()));
                let one_shot = self
                    .subscriptions
                    .get(&update.md_req_id)
                    .is_some_and(|s| s.update_mode == UpdateMode::Snapshot);
                if one_shot {
                    let _ = self.subscriptions.unsubscribe(&update.md_req_id);
                }
            }
            Reply::MarketDataReject(reject) => {
                self.pending
                    .resolve(&ClientRequestId::Request(reject.md_req_id.clone()));
                let _ = self.subscriptions.unsubscribe(&reject.md_req_id);
            }
            _ => {}
        }
    }

    /// Roll back a routed operation whose downstream submission failed.
    pub fn dispatch_failed(&mut self, operation: &CoreOperation) {
        self.pending.resolve(&operation.client_id);
        match &operation.payload {
            OperationPayload::NewOrder(order) => {
                self.orders.apply_execution(
                    &order.cl_ord_id,
                    OrderStatus::Rejected,
                    rust_decimal::Decimal::ZERO,
                );
            }
            OperationPayload::MarketData(request) => {
                let _ = self.subscriptions.unsubscribe(&request.md_req_id);
            }
            _ => {}
        }
    }
}

// =============================================================================
// Routing
// =============================================================================

/// Outcome of routing one request.
#[derive(Debug)]
pub enum RouteOutcome {
    /// Request refused; reply immediately, nothing went downstream.
    Reject(Reply),
    /// Operation recorded and ready for downstream submission.
    Dispatch(Box<CoreOperation>),
}

/// Stateless dispatcher from requests to operations and from events to
/// replies. All per-session state lives in [`SessionCore`].
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestRouter;

impl RequestRouter {
    /// Create a router.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Route an authenticated request.
    ///
    /// `rpc_id` carries the JSON-RPC request id for methods that have no
    /// client identifier of their own (mass cancel).
    #[must_use]
    pub fn route(
        &self,
        session: &mut SessionCore,
        request: ClientRequest,
        rpc_id: Option<i64>,
    ) -> RouteOutcome {
        match request {
            ClientRequest::NewOrder(order) => Self::route_new_order(session, order),
            ClientRequest::Cancel(cancel) => Self::route_cancel(session, cancel),
            ClientRequest::MassCancel(mass) => Self::route_mass_cancel(session, mass, rpc_id),
            ClientRequest::MassStatus(mass) => Self::route_mass_status(session, mass),
            ClientRequest::Positions(query) => Self::route_positions(session, query),
            ClientRequest::MarketData(md) => Self::route_market_data(session, md),
            ClientRequest::Unsupported { name } => RouteOutcome::Reject(Reply::BusinessReject {
                ref_id: None,
                reason: RejectReason::BusinessReject,
                text: format!("unsupported request: {name}"),
            }),
            ClientRequest::Logon(_) | ClientRequest::Logout => {
                // Session admin is handled before routing; reaching here is a
                // protocol fault on the caller's side.
                RouteOutcome::Reject(Reply::BusinessReject {
                    ref_id: None,
                    reason: RejectReason::BusinessReject,
                    text: "session-level message routed as business request".to_string(),
                })
            }
        }
    }

    fn route_new_order(
        session: &mut SessionCore,
        request: crate::application::model::NewOrderRequest,
    ) -> RouteOutcome {
        let order = Order {
            cl_ord_id: request.cl_ord_id.clone(),
            orig_cl_ord_id: None,
            exchange: request.exchange.clone(),
            symbol: request.symbol.clone(),
            side: request.side,
            ord_type: request.ord_type,
            quantity: request.quantity,
            price: request.price,
            time_in_force: request.time_in_force,
            status: OrderStatus::PendingNew,
            cum_qty: rust_decimal::Decimal::ZERO,
            created_at: Utc::now(),
        };
        if let Err(err) = session.orders.register_new(order) {
            return RouteOutcome::Reject(order_reject(&err));
        }
        let client_id = ClientRequestId::ClOrd(request.cl_ord_id.clone());
        session
            .pending
            .insert(OperationKind::NewOrderSingle, client_id.clone());
        RouteOutcome::Dispatch(Box::new(operation(
            session.id,
            client_id,
            OperationPayload::NewOrder(request),
        )))
    }

    fn route_cancel(
        session: &mut SessionCore,
        request: crate::application::model::CancelRequest,
    ) -> RouteOutcome {
        if let Err(err) = session
            .orders
            .register_cancel(&request.orig_cl_ord_id, &request.cl_ord_id)
        {
            return RouteOutcome::Reject(order_reject(&err));
        }
        let client_id = ClientRequestId::ClOrd(request.cl_ord_id.clone());
        session
            .pending
            .insert(OperationKind::OrderCancelRequest, client_id.clone());
        RouteOutcome::Dispatch(Box::new(operation(
            session.id,
            client_id,
            OperationPayload::Cancel(request),
        )))
    }

    fn route_mass_cancel(
        session: &mut SessionCore,
        request: crate::application::model::MassCancelRequest,
        rpc_id: Option<i64>,
    ) -> RouteOutcome {
        let client_id = match (&request.cl_ord_id, rpc_id) {
            (Some(id), _) => ClientRequestId::ClOrd(id.clone()),
            (None, Some(id)) => ClientRequestId::Rpc(id),
            (None, None) => {
                return RouteOutcome::Reject(Reply::BusinessReject {
                    ref_id: None,
                    reason: RejectReason::BusinessReject,
                    text: "mass cancel carries no correlation identifier".to_string(),
                });
            }
        };
        if !session
            .pending
            .insert(OperationKind::OrderMassCancelRequest, client_id.clone())
        {
            return RouteOutcome::Reject(Reply::BusinessReject {
                ref_id: Some(client_id.to_string()),
                reason: RejectReason::DuplicateClOrdId,
                text: "mass cancel identifier already in flight".to_string(),
            });
        }
        RouteOutcome::Dispatch(Box::new(operation(
            session.id,
            client_id,
            OperationPayload::MassCancel(request),
        )))
    }

    fn route_mass_status(
        session: &mut SessionCore,
        request: crate::application::model::MassStatusRequest,
    ) -> RouteOutcome {
        let client_id = ClientRequestId::Request(request.mass_status_req_id.clone());
        if !session
            .pending
            .insert(OperationKind::OrderMassStatusRequest, client_id.clone())
        {
            return RouteOutcome::Reject(Reply::BusinessReject {
                ref_id: Some(request.mass_status_req_id),
                reason: RejectReason::BusinessReject,
                text: "mass status request identifier already in flight".to_string(),
            });
        }
        RouteOutcome::Dispatch(Box::new(operation(
            session.id,
            client_id,
            OperationPayload::MassStatus(request),
        )))
    }

    fn route_positions(
        session: &mut SessionCore,
        request: crate::application::model::PositionsRequest,
    ) -> RouteOutcome {
        let client_id = ClientRequestId::Request(request.pos_req_id.clone());
        if !session
            .pending
            .insert(OperationKind::RequestForPositions, client_id.clone())
        {
            return RouteOutcome::Reject(Reply::BusinessReject {
                ref_id: Some(request.pos_req_id),
                reason: RejectReason::BusinessReject,
                text: "position request identifier already in flight".to_string(),
            });
        }
        RouteOutcome::Dispatch(Box::new(operation(
            session.id,
            client_id,
            OperationPayload::Positions(request),
        )))
    }

    fn route_market_data(
        session: &mut SessionCore,
        request: crate::application::model::MarketDataRequest,
    ) -> RouteOutcome {
        match request.action {
            MdAction::Snapshot | MdAction::Subscribe => {
                let subscription = Subscription {
                    md_req_id: request.md_req_id.clone(),
                    instruments: request.instruments.clone(),
                    entry_types: request.entry_types.clone(),
                    depth: request.depth,
                    update_mode: request.update_mode,
                };
                if session.subscriptions.subscribe(subscription).is_err() {
                    return RouteOutcome::Reject(Reply::MarketDataReject(
                        crate::application::model::MarketDataReject {
                            md_req_id: request.md_req_id,
                            text: Some("duplicate MDReqID".to_string()),
                        },
                    ));
                }
                let client_id = ClientRequestId::Request(request.md_req_id.clone());
                session
                    .pending
                    .insert(OperationKind::MarketDataSubscribe, client_id.clone());
                RouteOutcome::Dispatch(Box::new(operation(
                    session.id,
                    client_id,
                    OperationPayload::MarketData(request),
                )))
            }
            MdAction::Unsubscribe => {
                if session.subscriptions.unsubscribe(&request.md_req_id).is_err() {
                    return RouteOutcome::Reject(Reply::MarketDataReject(
                        crate::application::model::MarketDataReject {
                            md_req_id: request.md_req_id,
                            text: Some("unknown MDReqID".to_string()),
                        },
                    ));
                }
                let client_id = ClientRequestId::Request(request.md_req_id.clone());
                RouteOutcome::Dispatch(Box::new(operation(
                    session.id,
                    client_id,
                    OperationPayload::MarketData(request),
                )))
            }
        }
    }

    /// Correlate one asynchronous core event to its session and reply.
    #[must_use]
    pub fn correlate(&self, event: CoreEvent) -> (SessionId, Reply) {
        let reply = match event.payload {
            CoreEventPayload::Execution(update) => Reply::Execution(update),
            CoreEventPayload::CancelReject(reject) => Reply::CancelReject(reject),
            CoreEventPayload::MassCancelReport(report) => Reply::MassCancelReport(report),
            CoreEventPayload::MassStatusAck(ack) => Reply::MassStatusAck(ack),
            CoreEventPayload::PositionReport(update) => Reply::PositionReport(update),
            CoreEventPayload::PositionsComplete(complete) => Reply::PositionsComplete(complete),
            CoreEventPayload::MarketData(update) => Reply::MarketData(update),
            CoreEventPayload::MarketDataReject(reject) => Reply::MarketDataReject(reject),
            CoreEventPayload::OperationReject {
                client_id,
                reason,
                text,
            } => Reply::BusinessReject {
                ref_id: Some(client_id.to_string()),
                reason,
                text: text.unwrap_or_else(|| "operation refused".to_string()),
            },
        };
        (event.session_id, reply)
    }
}

/// Drain core events, correlate each to its session, and deliver the reply.
///
/// Events for sessions that have since disconnected are dropped with a debug
/// log; nothing else is affected. Runs until the event channel closes.
pub async fn run_event_dispatch(
    mut events: tokio::sync::mpsc::Receiver<CoreEvent>,
    router: RequestRouter,
    registry: std::sync::Arc<crate::application::sessions::SessionRegistry>,
) {
    while let Some(event) = events.recv().await {
        let (session_id, reply) = router.correlate(event);
        if let Err(e) = registry.deliver(session_id, reply) {
            tracing::debug!(session_id = %session_id, error = %e, "Dropping core event");
        }
    }
    tracing::debug!("Event dispatcher stopped");
}

fn operation(
    session_id: SessionId,
    client_id: ClientRequestId,
    payload: OperationPayload,
) -> CoreOperation {
    CoreOperation {
        session_id,
        op_id: Uuid::new_v4(),
        client_id,
        payload,
        routed_at: Utc::now(),
    }
}

fn order_reject(err: &OrderError) -> Reply {
    match err {
        OrderError::DuplicateClOrdId(id) => Reply::BusinessReject {
            ref_id: Some(id.to_string()),
            reason: RejectReason::DuplicateClOrdId,
            text: format!("ClOrdID already in use: {id}"),
        },
        OrderError::UnknownOrder(id) => Reply::BusinessReject {
            ref_id: Some(id.to_string()),
            reason: RejectReason::UnknownOrder,
            text: format!("unknown OrigClOrdID: {id}"),
        },
    }
}
