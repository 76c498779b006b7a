//! Application configuration loaded from a TOML station manifest plus
//! environment variable overrides.
//!
//! Precedence: env vars > config file > built-in defaults, using the
//! `config` crate's layered-source builder. The station fields below have
//! no defaults and the manifest file is required: `init()` returns an error
//! if it is absent or fails semantic validation, so a misconfigured station
//! fails at startup instead of accepting connections it can't describe.

use serde::Deserialize;
use std::sync::OnceLock;

use crate::error::ConfigError;
use crate::station::{IceServers, SignalingInfo, StationManifest};

static CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Get the global application configuration.
///
/// # Panics
/// Panics if configuration has not been initialized via [`init`]. Every
/// binary entry point calls `init()` before spawning any connection task.
pub fn get() -> &'static AppConfig {
    CONFIG
        .get()
        .expect("config not initialized; call studio_common::config::init() first")
}

/// Initialize the global configuration from `station.toml` (or the path in
/// `STUDIO_CONFIG_PATH`) and the `STUDIO__SECTION__KEY`-style environment.
///
/// Should be called exactly once at process startup, before any connection
/// is accepted.
pub fn init() -> Result<&'static AppConfig, ConfigError> {
    let _ = dotenvy::dotenv();

    let config_path =
        std::env::var("STUDIO_CONFIG_PATH").unwrap_or_else(|_| "station".to_string());

    let cfg = config::Config::builder()
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 6736)?
        .set_default(
            "logging.filter",
            "studio_server=info,studio_signaling=info,tower_http=info",
        )?
        .set_default("limits.max_message_bytes", 65_536)?
        .set_default("limits.max_chunk_bytes", 262_144)?
        .set_default("limits.keepalive_interval_secs", 30)?
        .set_default("limits.keepalive_timeout_secs", 75)?
        .set_default("sink.content_type", "audio/webm")?
        .set_default("sink.public", false)?
        .set_default("sink.description", "")?
        .add_source(config::File::with_name(&config_path))
        .add_source(
            config::Environment::with_prefix("STUDIO")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let app_config: AppConfig = cfg.try_deserialize()?;
    app_config
        .station
        .validate()
        .map_err(ConfigError::InvalidManifest)?;

    tracing::debug!(
        station_id = %app_config.station.station_id,
        ice_stun = app_config.station.ice.stun.len(),
        ice_turn = app_config.station.ice.turn.len(),
        "configuration loaded"
    );

    Ok(CONFIG.get_or_init(|| app_config))
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(flatten)]
    pub station: StationManifest,
    pub logging: LoggingConfig,
    pub limits: LimitsConfig,
    pub sink: SinkConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub filter: String,
}

/// Frame and chunk size ceilings (an operational guard against unbounded
/// input) plus the keep-alive schedule.
#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    pub max_message_bytes: usize,
    pub max_chunk_bytes: usize,
    pub keepalive_interval_secs: u64,
    pub keepalive_timeout_secs: u64,
}

/// The external shoutcast-style sink the streaming relay PUTs to.
#[derive(Debug, Deserialize, Clone)]
pub struct SinkConfig {
    pub host: String,
    pub port: u16,
    pub mountpoint: String,
    pub username: String,
    pub password: String,
    pub content_type: String,
    pub public: bool,
    pub description: String,
}

impl SinkConfig {
    pub fn url(&self) -> String {
        format!("http://{}:{}{}", self.host, self.port, self.mountpoint)
    }
}

/// Convenience accessor so callers don't need to reach through `get().station`.
pub fn station() -> &'static StationManifest {
    &get().station
}

impl AppConfig {
    pub fn ice_servers(&self) -> &IceServers {
        &self.station.ice
    }

    pub fn signaling(&self) -> &SignalingInfo {
        &self.station.signaling
    }
}
