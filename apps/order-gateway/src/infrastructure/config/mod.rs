//! Configuration
//!
//! Environment-driven settings for the gateway.

/// Settings types and environment loading.
pub mod settings;

pub use settings::{
    ConfigError, Credential, DownstreamSettings, FixSettings, GatewayConfig, SeqGapPolicy,
    ServerSettings, SessionSettings, WsSettings,
};
