//! # studio-signaling
//!
//! Rooms, peers, message relay, and the streaming relay that together make
//! up the signaling core: the pieces a browser talks to over `/ws`, plus
//! the two read-only HTTP endpoints it uses to find that socket in the
//! first place.

pub mod http;
pub mod message;
pub mod peer;
pub mod relay;
pub mod room;
pub mod session;
pub mod state;
pub mod stream_relay;
pub mod validate;
pub mod ws;

use std::sync::Arc;
use std::time::Duration;

use axum::error_handling::HandleErrorLayer;
use axum::http::StatusCode;
use axum::{BoxError, Router};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub use state::SignalingState;

/// How long a plain HTTP request (`/health`, `/api/station`) may take
/// before `TimeoutLayer` aborts it with a 408. The WebSocket upgrade route
/// is unaffected in practice: `ws_handler` (see [`ws`]) returns its
/// response the moment the upgrade is accepted, handing the long-lived
/// socket off to a detached task rather than holding it open inside this
/// layer's service call.
const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the full router: HTTP discovery endpoints plus the WebSocket
/// upgrade, sharing one [`SignalingState`].
pub fn build_router(state: Arc<SignalingState>) -> Router {
    Router::new()
        .merge(http::router())
        .merge(ws::router())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_timeout))
                .layer(TimeoutLayer::new(HTTP_REQUEST_TIMEOUT)),
        )
        .with_state(state)
}

/// `TimeoutLayer` reports an expired request as a service error rather than
/// a response; `HandleErrorLayer` requires exactly this kind of function to
/// turn that error into one.
async fn handle_timeout(_err: BoxError) -> (StatusCode, &'static str) {
    (StatusCode::REQUEST_TIMEOUT, "request timed out")
}
