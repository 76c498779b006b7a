//! WebSocket upgrade route. The actual connection lifecycle lives in
//! [`crate::session`].

use std::sync::Arc;

use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use axum::Router;

use crate::session::handle_connection;
use crate::state::SignalingState;

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<SignalingState>>) -> Response {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

pub fn router() -> Router<Arc<SignalingState>> {
    Router::new().route("/ws", get(ws_handler))
}
