//! Order Gateway Binary
//!
//! Starts the dual-protocol order gateway.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin order-gateway
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `GATEWAY_CREDENTIALS`: Accepted logons, `user:pass[,user:pass...]`
//!
//! ## Optional
//! - `GATEWAY_FIX_LISTEN_ADDR`: FIX TCP listen address (default: 0.0.0.0:9823, "off" disables)
//! - `GATEWAY_FIX_UNIX_SOCKET`: FIX Unix-domain socket path (default: disabled)
//! - `GATEWAY_WS_LISTEN_ADDR`: WebSocket listen address (default: 0.0.0.0:2345)
//! - `GATEWAY_COMP_ID`: Our FIX CompID (default: proxy)
//! - `GATEWAY_HEARTBEAT_SECS`: FIX heartbeat interval (default: 30)
//! - `GATEWAY_LOGON_TIMEOUT_SECS`: Logon deadline after connect (default: 10)
//! - `GATEWAY_SEQ_GAP_POLICY`: terminate | ignore (default: terminate)
//! - `GATEWAY_CANCEL_ON_DISCONNECT`: best-effort mass cancel on drop (default: false)
//! - `GATEWAY_CORE_ADDR`: Trading core address (default: 127.0.0.1:7001)
//! - `GATEWAY_HEALTH_PORT`: Health check HTTP port (default: 8091)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use order_gateway::application::router::run_event_dispatch;
use order_gateway::application::sessions::SessionRegistry;
use order_gateway::infrastructure::auth::StaticCredentialStore;
use order_gateway::infrastructure::downstream::{BackoffConfig, link};
use order_gateway::infrastructure::server::{GatewayDeps, fix::FixServer, ws::WsServer};
use order_gateway::infrastructure::telemetry;
use order_gateway::{
    CoreLinkConfig, GatewayConfig, HealthServer, HealthServerState, RequestRouter, init_metrics,
};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Capacity of the core event channel feeding the dispatcher.
const EVENT_QUEUE: usize = 4096;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting order gateway");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = GatewayConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Live-session registry and credential store
    let registry = Arc::new(SessionRegistry::new());
    let credentials = Arc::new(StaticCredentialStore::new(
        config
            .credentials
            .iter()
            .map(|c| (c.username.clone(), c.password.clone())),
    ));

    // Trading core link
    let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);
    let (core_link, core_task) = link::channel(
        CoreLinkConfig {
            addr: config.downstream.addr.clone(),
            command_queue: config.downstream.command_queue,
            backoff: BackoffConfig {
                initial_delay: config.downstream.reconnect_delay_initial,
                max_delay: config.downstream.reconnect_delay_max,
                ..BackoffConfig::default()
            },
        },
        event_tx,
        shutdown_token.clone(),
    );
    tokio::spawn(core_task.run());

    // Event dispatcher: core events -> session reply queues
    tokio::spawn(run_event_dispatch(
        event_rx,
        RequestRouter::new(),
        Arc::clone(&registry),
    ));

    let deps = GatewayDeps {
        registry: Arc::clone(&registry),
        core: Arc::new(core_link.clone()),
        credentials,
    };

    // FIX acceptors
    let fix_server = FixServer::new(
        deps.clone(),
        config.fix.clone(),
        config.session.clone(),
        shutdown_token.clone(),
    );
    if let Some(addr) = config.fix.listen_addr.clone() {
        let server = fix_server.clone();
        tokio::spawn(async move {
            if let Err(e) = server.run_tcp(&addr).await {
                tracing::error!(error = %e, "FIX TCP listener error");
            }
        });
    }
    #[cfg(unix)]
    if let Some(path) = config.fix.unix_socket.clone() {
        let server = fix_server.clone();
        tokio::spawn(async move {
            if let Err(e) = server.run_unix(&path).await {
                tracing::error!(error = %e, "FIX Unix listener error");
            }
        });
    }

    // WebSocket acceptor
    let ws_server = WsServer::new(
        deps,
        config.ws.clone(),
        config.session.clone(),
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = ws_server.run().await {
            tracing::error!(error = %e, "WebSocket listener error");
        }
    });

    // Health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&registry),
        Some(core_link),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    tracing::info!("Order gateway ready");

    await_shutdown(shutdown_token).await;

    // Give in-flight session teardowns a moment to finish.
    tokio::time::sleep(Duration::from_millis(100)).await;
    tracing::info!("Order gateway stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &GatewayConfig) {
    tracing::info!(
        fix_addr = config.fix.listen_addr.as_deref().unwrap_or("off"),
        fix_unix = config.fix.unix_socket.as_deref().unwrap_or("off"),
        ws_addr = %config.ws.listen_addr,
        comp_id = %config.fix.comp_id,
        heartbeat_secs = config.fix.heartbeat_interval.as_secs(),
        seq_gap_policy = config.fix.seq_gap_policy.as_str(),
        cancel_on_disconnect = config.session.cancel_on_disconnect,
        core_addr = %config.downstream.addr,
        health_port = config.server.health_port,
        users = config.credentials.len(),
        "Configuration loaded"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
