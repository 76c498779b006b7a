//! The state shared by every connection: the peer registry, the room
//! manager, and the stream-sink registry, plus what `/health` needs to
//! report. One instance is built at startup and handed to every connection
//! task as an `Arc`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use studio_common::config::LimitsConfig;

use crate::peer::PeerRegistry;
use crate::room::RoomManager;
use crate::stream_relay::StreamRegistry;

#[derive(Clone)]
pub struct SignalingState {
    pub registry: PeerRegistry,
    pub rooms: RoomManager,
    pub stream_registry: StreamRegistry,
    pub limits: LimitsConfig,
    /// Cancelled once by `studio-server`'s shutdown signal handler. Every
    /// open connection watches this and gets a chance to send a final
    /// `error` frame before the socket closes, rather than being dropped
    /// mid-write when the process exits.
    pub shutdown: CancellationToken,
    started_at: DateTime<Utc>,
}

impl SignalingState {
    pub fn new(limits: LimitsConfig) -> Self {
        Self {
            registry: PeerRegistry::new(),
            rooms: RoomManager::new(),
            stream_registry: StreamRegistry::new(),
            limits,
            shutdown: CancellationToken::new(),
            started_at: Utc::now(),
        }
    }

    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds().max(0)
    }
}

pub fn new_shared(limits: LimitsConfig) -> Arc<SignalingState> {
    Arc::new(SignalingState::new(limits))
}
