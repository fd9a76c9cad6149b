//! Prometheus Metrics Module
//!
//! Exposes gateway metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Sessions**: active session counts per protocol
//! - **Messages**: requests received and replies sent by kind
//! - **Rejects**: rejected requests by reason
//! - **Downstream**: trading core submissions and link state
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::application::model::RejectReason;
use crate::domain::session::ProtocolVariant;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
#[allow(clippy::expect_used)]
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new();
            let handle = builder
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

fn register_metrics() {
    describe_gauge!(
        "gateway_sessions_active",
        "Number of live sessions per protocol"
    );
    describe_counter!(
        "gateway_requests_received_total",
        "Total client requests received by protocol and kind"
    );
    describe_counter!(
        "gateway_replies_sent_total",
        "Total replies sent by protocol and kind"
    );
    describe_counter!(
        "gateway_rejects_total",
        "Total rejected requests by reason"
    );
    describe_counter!(
        "gateway_core_submissions_total",
        "Total trading core submissions by outcome"
    );
}

/// Record a session opening.
pub fn session_opened(protocol: ProtocolVariant) {
    gauge!("gateway_sessions_active", "protocol" => protocol.as_str()).increment(1.0);
}

/// Record a session closing.
pub fn session_closed(protocol: ProtocolVariant) {
    gauge!("gateway_sessions_active", "protocol" => protocol.as_str()).decrement(1.0);
}

/// Record a request received from a client.
pub fn record_request(protocol: ProtocolVariant, kind: &str) {
    counter!(
        "gateway_requests_received_total",
        "protocol" => protocol.as_str(),
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Record a reply sent to a client.
pub fn record_reply(protocol: ProtocolVariant, kind: &'static str) {
    counter!(
        "gateway_replies_sent_total",
        "protocol" => protocol.as_str(),
        "kind" => kind
    )
    .increment(1);
}

/// Record a rejected request.
pub fn record_reject(reason: RejectReason) {
    counter!("gateway_rejects_total", "reason" => reason.as_str()).increment(1);
}

/// Record a trading core submission outcome.
pub fn record_submission(accepted: bool) {
    let outcome = if accepted { "accepted" } else { "refused" };
    counter!("gateway_core_submissions_total", "outcome" => outcome).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reject_reason_labels_are_stable() {
        assert_eq!(RejectReason::MalformedFrame.as_str(), "malformed_frame");
        assert_eq!(RejectReason::SequenceGap.as_str(), "sequence_gap");
        assert_eq!(
            RejectReason::DuplicateClOrdId.as_str(),
            "duplicate_cl_ord_id"
        );
    }

    #[test]
    fn protocol_labels_are_stable() {
        assert_eq!(ProtocolVariant::Fix.as_str(), "fix");
        assert_eq!(ProtocolVariant::JsonRpc.as_str(), "json-rpc");
    }
}
