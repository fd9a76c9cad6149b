//! Gateway Configuration Settings
//!
//! Configuration types for the gateway, loaded from environment variables.

use std::time::Duration;

/// Policy applied when a FIX session's inbound sequence number jumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeqGapPolicy {
    /// Send a Logout describing the gap and close the session.
    #[default]
    Terminate,
    /// Log the gap, adopt the received number, and continue.
    ///
    /// Resend-request recovery is deliberately unsupported: honoring it
    /// would require an outbound message store.
    Ignore,
}

impl SeqGapPolicy {
    /// Parse from a configuration string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "ignore" => Self::Ignore,
            _ => Self::Terminate,
        }
    }

    /// Policy name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Terminate => "terminate",
            Self::Ignore => "ignore",
        }
    }
}

/// One username/password pair accepted at logon.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Username.
    pub username: String,
    /// Password.
    pub password: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// FIX transport settings.
#[derive(Debug, Clone)]
pub struct FixSettings {
    /// TCP listen address; `None` disables the TCP listener.
    pub listen_addr: Option<String>,
    /// Unix-domain socket path; `None` disables the Unix listener.
    pub unix_socket: Option<String>,
    /// Our CompID (SenderCompID on outbound, expected TargetCompID inbound).
    pub comp_id: String,
    /// Heartbeat interval negotiated at logon.
    pub heartbeat_interval: Duration,
    /// How long a connection may sit without sending Logon.
    pub logon_timeout: Duration,
    /// Sequence gap policy.
    pub seq_gap_policy: SeqGapPolicy,
}

impl Default for FixSettings {
    fn default() -> Self {
        Self {
            listen_addr: Some("0.0.0.0:9823".to_string()),
            unix_socket: None,
            comp_id: "proxy".to_string(),
            heartbeat_interval: Duration::from_secs(30),
            logon_timeout: Duration::from_secs(10),
            seq_gap_policy: SeqGapPolicy::Terminate,
        }
    }
}

/// WebSocket transport settings.
#[derive(Debug, Clone)]
pub struct WsSettings {
    /// Listen address for the WebSocket acceptor.
    pub listen_addr: String,
    /// How long a connection may sit without sending `logon`.
    pub logon_timeout: Duration,
}

impl Default for WsSettings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:2345".to_string(),
            logon_timeout: Duration::from_secs(10),
        }
    }
}

/// Per-session queue and teardown settings.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Capacity of each session's outbound reply queue.
    pub outbound_queue: usize,
    /// Issue a best-effort downstream mass cancel when a session drops with
    /// operations in flight.
    pub cancel_on_disconnect: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            outbound_queue: 256,
            cancel_on_disconnect: false,
        }
    }
}

/// Trading core link settings.
#[derive(Debug, Clone)]
pub struct DownstreamSettings {
    /// Core address, `host:port`.
    pub addr: String,
    /// Capacity of the shared command queue.
    pub command_queue: usize,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
}

impl Default for DownstreamSettings {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:7001".to_string(),
            command_queue: 1024,
            reconnect_delay_initial: Duration::from_millis(500),
            reconnect_delay_max: Duration::from_secs(30),
        }
    }
}

/// Ancillary server ports.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health check HTTP port.
    pub health_port: u16,
    /// Prometheus metrics port (0 = disabled).
    pub metrics_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            health_port: 8091,
            metrics_port: 9090,
        }
    }
}

/// Complete gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// FIX transport settings.
    pub fix: FixSettings,
    /// WebSocket transport settings.
    pub ws: WsSettings,
    /// Session settings.
    pub session: SessionSettings,
    /// Trading core link settings.
    pub downstream: DownstreamSettings,
    /// Ancillary server ports.
    pub server: ServerSettings,
    /// Accepted logon credentials.
    pub credentials: Vec<Credential>,
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable holds an unusable value.
    #[error("environment variable {key} invalid: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Why it was refused.
        reason: String,
    },
}

impl GatewayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error when `GATEWAY_CREDENTIALS` is missing or malformed,
    /// or when both FIX listeners are disabled.
    pub fn from_env() -> Result<Self, ConfigError> {
        let credentials_raw = std::env::var("GATEWAY_CREDENTIALS")
            .map_err(|_| ConfigError::MissingEnvVar("GATEWAY_CREDENTIALS".to_string()))?;
        let credentials = parse_credentials(&credentials_raw)?;

        let fix_defaults = FixSettings::default();
        let listen_addr = match std::env::var("GATEWAY_FIX_LISTEN_ADDR") {
            Ok(v) if v.is_empty() || v == "off" => None,
            Ok(v) => Some(v),
            Err(_) => fix_defaults.listen_addr.clone(),
        };
        let unix_socket = std::env::var("GATEWAY_FIX_UNIX_SOCKET").ok().filter(|v| !v.is_empty());
        let fix = FixSettings {
            listen_addr,
            unix_socket,
            comp_id: env_or("GATEWAY_COMP_ID", &fix_defaults.comp_id),
            heartbeat_interval: parse_env_duration_secs(
                "GATEWAY_HEARTBEAT_SECS",
                fix_defaults.heartbeat_interval,
            ),
            logon_timeout: parse_env_duration_secs(
                "GATEWAY_LOGON_TIMEOUT_SECS",
                fix_defaults.logon_timeout,
            ),
            seq_gap_policy: std::env::var("GATEWAY_SEQ_GAP_POLICY")
                .map(|s| SeqGapPolicy::from_str_case_insensitive(&s))
                .unwrap_or_default(),
        };
        if fix.listen_addr.is_none() && fix.unix_socket.is_none() {
            return Err(ConfigError::InvalidValue {
                key: "GATEWAY_FIX_LISTEN_ADDR".to_string(),
                reason: "both FIX listeners disabled".to_string(),
            });
        }

        let ws_defaults = WsSettings::default();
        let ws = WsSettings {
            listen_addr: env_or("GATEWAY_WS_LISTEN_ADDR", &ws_defaults.listen_addr),
            logon_timeout: parse_env_duration_secs(
                "GATEWAY_WS_LOGON_TIMEOUT_SECS",
                ws_defaults.logon_timeout,
            ),
        };

        let session_defaults = SessionSettings::default();
        let session = SessionSettings {
            outbound_queue: parse_env_usize(
                "GATEWAY_SESSION_QUEUE",
                session_defaults.outbound_queue,
            ),
            cancel_on_disconnect: parse_env_bool(
                "GATEWAY_CANCEL_ON_DISCONNECT",
                session_defaults.cancel_on_disconnect,
            ),
        };

        let downstream_defaults = DownstreamSettings::default();
        let downstream = DownstreamSettings {
            addr: env_or("GATEWAY_CORE_ADDR", &downstream_defaults.addr),
            command_queue: parse_env_usize(
                "GATEWAY_CORE_QUEUE",
                downstream_defaults.command_queue,
            ),
            reconnect_delay_initial: parse_env_duration_millis(
                "GATEWAY_CORE_RECONNECT_INITIAL_MS",
                downstream_defaults.reconnect_delay_initial,
            ),
            reconnect_delay_max: parse_env_duration_secs(
                "GATEWAY_CORE_RECONNECT_MAX_SECS",
                downstream_defaults.reconnect_delay_max,
            ),
        };

        let server_defaults = ServerSettings::default();
        let server = ServerSettings {
            health_port: parse_env_u16("GATEWAY_HEALTH_PORT", server_defaults.health_port),
            metrics_port: parse_env_u16("GATEWAY_METRICS_PORT", server_defaults.metrics_port),
        };

        Ok(Self {
            fix,
            ws,
            session,
            downstream,
            server,
            credentials,
        })
    }
}

/// Parse `user:pass,user:pass` credential lists.
pub(crate) fn parse_credentials(raw: &str) -> Result<Vec<Credential>, ConfigError> {
    let mut credentials = Vec::new();
    for pair in raw.split(',').filter(|p| !p.is_empty()) {
        let Some((username, password)) = pair.split_once(':') else {
            return Err(ConfigError::InvalidValue {
                key: "GATEWAY_CREDENTIALS".to_string(),
                reason: format!("expected user:pass, got {pair}"),
            });
        };
        if username.is_empty() || password.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "GATEWAY_CREDENTIALS".to_string(),
                reason: "empty username or password".to_string(),
            });
        }
        credentials.push(Credential {
            username: username.to_string(),
            password: password.to_string(),
        });
    }
    if credentials.is_empty() {
        return Err(ConfigError::InvalidValue {
            key: "GATEWAY_CREDENTIALS".to_string(),
            reason: "no credentials configured".to_string(),
        });
    }
    Ok(credentials)
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_gap_policy_parsing() {
        assert_eq!(
            SeqGapPolicy::from_str_case_insensitive("terminate"),
            SeqGapPolicy::Terminate
        );
        assert_eq!(
            SeqGapPolicy::from_str_case_insensitive("IGNORE"),
            SeqGapPolicy::Ignore
        );
        assert_eq!(
            SeqGapPolicy::from_str_case_insensitive("bogus"),
            SeqGapPolicy::Terminate
        );
    }

    #[test]
    fn credentials_parse() {
        let creds = parse_credentials("trader:secret,ops:hunter2").unwrap();
        assert_eq!(creds.len(), 2);
        assert_eq!(creds[0].username, "trader");
        assert_eq!(creds[0].password, "secret");
        assert_eq!(creds[1].username, "ops");
    }

    #[test]
    fn credentials_missing_colon_rejected() {
        assert!(parse_credentials("traderonly").is_err());
    }

    #[test]
    fn credentials_empty_rejected() {
        assert!(parse_credentials("").is_err());
        assert!(parse_credentials(":pass").is_err());
        assert!(parse_credentials("user:").is_err());
    }

    #[test]
    fn credential_debug_redacts_password() {
        let cred = Credential {
            username: "trader".to_string(),
            password: "secret".to_string(),
        };
        let debug = format!("{cred:?}");
        assert!(debug.contains("trader"));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn fix_settings_defaults() {
        let settings = FixSettings::default();
        assert_eq!(settings.comp_id, "proxy");
        assert_eq!(settings.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(settings.logon_timeout, Duration::from_secs(10));
        assert_eq!(settings.seq_gap_policy, SeqGapPolicy::Terminate);
        assert!(settings.listen_addr.is_some());
        assert!(settings.unix_socket.is_none());
    }

    #[test]
    fn session_settings_defaults() {
        let settings = SessionSettings::default();
        assert_eq!(settings.outbound_queue, 256);
        assert!(!settings.cancel_on_disconnect);
    }

    #[test]
    fn downstream_settings_defaults() {
        let settings = DownstreamSettings::default();
        assert_eq!(settings.command_queue, 1024);
        assert_eq!(settings.reconnect_delay_initial, Duration::from_millis(500));
    }
}
