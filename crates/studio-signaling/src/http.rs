//! The two plain HTTP endpoints: `/health` for load balancers and
//! monitoring, and `/api/station` for clients to discover the signaling
//! URL and ICE servers before opening a WebSocket.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use studio_common::station::StationManifest;

use crate::state::SignalingState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime: i64,
    rooms: usize,
    peers: usize,
}

async fn health(State(state): State<Arc<SignalingState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.uptime_secs(),
        rooms: state.rooms.room_count().await,
        peers: state.registry.connection_count().await,
    })
}

async fn station() -> Json<StationManifest> {
    Json(studio_common::config::station().clone())
}

pub fn router() -> Router<Arc<SignalingState>> {
    Router::new()
        .route("/health", get(health))
        .route("/api/station", get(station))
}
