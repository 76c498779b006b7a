//! Per-connection state machine: NEW → REGISTERED → IN_ROOM, torn down on
//! close. Built around a split socket and a single writer task, generalized
//! from a broadcast-and-filter fanout to a per-peer outbound queue so offer/
//! answer/ice-candidate can be addressed to one recipient instead of
//! everyone.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use studio_common::config::LimitsConfig;
use studio_common::error::SignalingError;

use crate::peer::{ConnectionHandle, PeerId, Priority};
use crate::room::{Role, Room};
use crate::message::{ClientEnvelope, ServerMessage};
use crate::relay;
use crate::state::SignalingState;
use crate::stream_relay::StreamRelay;
use crate::validate::{self, ConnectionContext};

const OUTBOUND_QUEUE_CAPACITY: usize = 32;

/// Drive one WebSocket connection end to end: registration, room
/// membership, signaling relay, streaming relay, and cleanup on close.
pub async fn handle_connection(socket: WebSocket, state: Arc<SignalingState>) {
    let (sender, mut receiver) = socket.split();
    let (tx, rx) = mpsc::channel::<Arc<str>>(OUTBOUND_QUEUE_CAPACITY);
    let cancel = CancellationToken::new();
    let last_activity = Arc::new(AtomicI64::new(Utc::now().timestamp()));
    let limits = state.limits.clone();

    let writer = tokio::spawn(run_writer(
        sender,
        rx,
        cancel.clone(),
        last_activity.clone(),
        limits.keepalive_interval_secs,
        limits.keepalive_timeout_secs,
    ));

    let mut conn = ConnState {
        state: state.clone(),
        tx: tx.clone(),
        cancel: cancel.clone(),
        registered: None,
        room: None,
        role: None,
        stream: None,
        limits,
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = state.shutdown.cancelled() => {
                conn.send(&ServerMessage::Error { message: "server shutting down".into() }).await;
                break;
            }
            incoming = receiver.next() => {
                match incoming {
                    None => break,
                    Some(Err(_)) => break,
                    Some(Ok(Message::Close(_))) => break,
                    Some(Ok(Message::Text(text))) => {
                        last_activity.store(Utc::now().timestamp(), Ordering::Relaxed);
                        conn.handle_frame(text.as_str()).await;
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_))) => {
                        last_activity.store(Utc::now().timestamp(), Ordering::Relaxed);
                    }
                }
            }
        }
    }

    conn.cleanup().await;
    cancel.cancel();
    writer.abort();
}

/// Owns the half of the socket that writes frames out: both the ones
/// relayed from other peers (via `rx`) and the connection's own keepalive
/// enforcement. Nothing else ever touches `sender` — that's the
/// single-writer invariant `ConnectionHandle` relies on.
///
/// Every `keepalive_interval_secs` this sends a protocol-level WebSocket
/// `Ping`; any inbound frame (the matching `Pong`, or ordinary traffic)
/// resets the liveness clock. A connection that sits silent past
/// `keepalive_timeout_secs` since its last inbound frame is treated as dead
/// and closed.
///
/// Every write to `sender` is bounded by [`OUTBOUND_WRITE_TIMEOUT`]: a peer
/// whose TCP receive window never drains (a stalled client, a dead NAT
/// binding) must not be able to block this task — and with it that
/// connection's keepalive ticker — forever.
const OUTBOUND_WRITE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

async fn run_writer(
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Arc<str>>,
    cancel: CancellationToken,
    last_activity: Arc<AtomicI64>,
    keepalive_interval_secs: u64,
    keepalive_timeout_secs: u64,
) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(keepalive_interval_secs.max(1)));
    ticker.tick().await; // first tick fires immediately; skip it

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame = rx.recv() => {
                match frame {
                    Some(text) => {
                        if !write_frame(&mut sender, Message::Text(text.to_string().into())).await {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = ticker.tick() => {
                let elapsed = Utc::now().timestamp() - last_activity.load(Ordering::Relaxed);
                if elapsed > keepalive_timeout_secs as i64 {
                    tracing::debug!("connection missed pong past keepalive timeout, closing");
                    break;
                }
                if !write_frame(&mut sender, Message::Ping(Vec::new().into())).await {
                    break;
                }
            }
        }
    }

    cancel.cancel();
    let _ = sender.close().await;
}

/// Write one frame, bounded by [`OUTBOUND_WRITE_TIMEOUT`]. Returns `false`
/// on either a transport error or a timed-out write, both of which mean the
/// caller should stop writing and tear the connection down.
async fn write_frame(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    frame: Message,
) -> bool {
    match tokio::time::timeout(OUTBOUND_WRITE_TIMEOUT, sender.send(frame)).await {
        Ok(Ok(())) => true,
        Ok(Err(_)) => false,
        Err(_) => {
            tracing::warn!("outbound write timed out, closing connection");
            false
        }
    }
}

struct ConnState {
    state: Arc<SignalingState>,
    tx: mpsc::Sender<Arc<str>>,
    cancel: CancellationToken,
    registered: Option<PeerId>,
    room: Option<Room>,
    role: Option<Role>,
    stream: Option<StreamRelay>,
    limits: LimitsConfig,
}

impl ConnState {
    async fn handle_frame(&mut self, text: &str) {
        if text.len() > self.limits.max_message_bytes {
            self.send_error(&SignalingError::MessageTooLarge { limit: self.limits.max_message_bytes })
                .await;
            return;
        }

        let envelope: ClientEnvelope = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.send_error(&SignalingError::MalformedFrame(e.to_string())).await;
                return;
            }
        };

        let ctx = ConnectionContext {
            registered_peer: self.registered.as_ref(),
            in_room: self.room.is_some(),
        };
        if let Err(e) = validate::validate(&envelope, &ctx) {
            self.send_error(&e).await;
            return;
        }

        let raw: Arc<str> = Arc::from(text);
        if let Err(e) = self.dispatch(envelope, raw).await {
            self.send_error(&e).await;
        }
    }

    async fn dispatch(&mut self, envelope: ClientEnvelope, raw: Arc<str>) -> Result<(), SignalingError> {
        match envelope {
            ClientEnvelope::Register { peer_id } => self.handle_register(peer_id.expect("validated")).await,

            ClientEnvelope::CreateRoom { role } => self.handle_join(None, role, false, true).await,
            ClientEnvelope::JoinRoom { room_id, role } => {
                self.handle_join(room_id, role, true, false).await
            }
            ClientEnvelope::CreateOrJoinRoom { room_id, role } => {
                self.handle_join(room_id, role, false, false).await
            }

            ClientEnvelope::Offer { to, .. }
            | ClientEnvelope::Answer { to, .. }
            | ClientEnvelope::IceCandidate { to, .. } => {
                let target = PeerId::new(to.expect("validated"));
                relay::forward_to_peer(&self.state.registry, &target, raw).await
            }

            ClientEnvelope::Mute { .. } => {
                let room = self.room.as_ref().expect("validated in_room");
                let me = self.registered.as_ref().expect("validated registered");
                relay::broadcast_to_room(&self.state.registry, room, me, raw, Priority::BestEffort).await;
                Ok(())
            }

            ClientEnvelope::StartStream {} => self.handle_start_stream().await,
            ClientEnvelope::StreamChunk { chunk } => {
                self.handle_stream_chunk(chunk.expect("validated"))
            }
            ClientEnvelope::StopStream {} => self.handle_stop_stream().await,

            ClientEnvelope::Ping {} => {
                self.send(&ServerMessage::Pong { timestamp: Utc::now().timestamp_millis() }).await;
                Ok(())
            }
        }
    }

    async fn handle_register(&mut self, peer_id: String) -> Result<(), SignalingError> {
        let peer_id = PeerId::new(peer_id);
        let handle = ConnectionHandle::new(self.tx.clone(), self.cancel.clone());
        self.state.registry.register(peer_id.clone(), handle).await?;
        self.send(&ServerMessage::Registered { peer_id: peer_id.as_str().to_string() }).await;
        self.registered = Some(peer_id);
        Ok(())
    }

    async fn handle_join(
        &mut self,
        room_id: Option<String>,
        requested_role: Option<Role>,
        must_exist: bool,
        legacy_create: bool,
    ) -> Result<(), SignalingError> {
        let peer_id = self.registered.clone().expect("validated registered");

        if must_exist {
            let id = room_id.clone().expect("validated non-empty roomId");
            if self.state.rooms.get(&id).await.is_none() {
                return Err(SignalingError::StateViolation(format!(
                    "room \"{id}\" does not exist"
                )));
            }
        }

        let (room, _created) = self.state.rooms.create_or_join(room_id).await;
        let role = requested_role.unwrap_or(Role::Guest);
        room.join(peer_id.clone(), role).await;

        if legacy_create {
            self.send(&ServerMessage::RoomCreated {
                room_id: room.room_id.clone(),
                host_id: peer_id.as_str().to_string(),
                role,
            })
            .await;
        } else {
            let participants = room.participants().await;
            self.send(&ServerMessage::RoomJoined { room_id: room.room_id.clone(), participants, role })
                .await;
        }

        let announcement = ServerMessage::PeerJoined { peer_id: peer_id.as_str().to_string(), role }.to_json();
        relay::broadcast_to_room(
            &self.state.registry,
            &room,
            &peer_id,
            Arc::from(announcement.as_str()),
            Priority::Critical,
        )
        .await;

        self.room = Some(room);
        self.role = Some(role);
        Ok(())
    }

    async fn handle_start_stream(&mut self) -> Result<(), SignalingError> {
        if self.role != Some(Role::Host) {
            return Err(SignalingError::StateViolation(
                "only the host of a room may open a stream".into(),
            ));
        }
        if self.stream.is_some() {
            return Err(SignalingError::StreamRejected("already streaming on this connection".into()));
        }
        let sink = studio_common::config::get().sink.clone();
        let relay = StreamRelay::start(sink, self.state.stream_registry.clone()).await?;
        self.stream = Some(relay);
        Ok(())
    }

    fn handle_stream_chunk(&mut self, chunk: String) -> Result<(), SignalingError> {
        match &self.stream {
            Some(relay) => relay.push_chunk(&chunk, self.limits.max_chunk_bytes),
            None => Err(SignalingError::StateViolation("not currently streaming".into())),
        }
    }

    async fn handle_stop_stream(&mut self) -> Result<(), SignalingError> {
        match self.stream.take() {
            Some(relay) => {
                relay.stop().await;
                Ok(())
            }
            None => Err(SignalingError::StateViolation("not currently streaming".into())),
        }
    }

    async fn send(&self, msg: &ServerMessage) {
        let handle = ConnectionHandle::new(self.tx.clone(), self.cancel.clone());
        handle.send(Arc::from(msg.to_json().as_str()), Priority::Critical).await;
    }

    async fn send_error(&self, err: &SignalingError) {
        self.send(&ServerMessage::Error { message: err.wire_message() }).await;
    }

    async fn cleanup(&mut self) {
        if let Some(relay) = self.stream.take() {
            relay.stop().await;
        }

        if let (Some(room), Some(peer_id)) = (self.room.take(), self.registered.clone()) {
            room.leave(&peer_id).await;
            let left = ServerMessage::PeerLeft { peer_id: peer_id.as_str().to_string() }.to_json();
            relay::broadcast_to_room(
                &self.state.registry,
                &room,
                &peer_id,
                Arc::from(left.as_str()),
                Priority::Critical,
            )
            .await;
            self.state.rooms.remove_if_empty(&room.room_id).await;
        }

        if let Some(peer_id) = self.registered.take() {
            self.state.registry.unregister(&peer_id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_limits() -> LimitsConfig {
        LimitsConfig {
            max_message_bytes: 65_536,
            max_chunk_bytes: 262_144,
            keepalive_interval_secs: 30,
            keepalive_timeout_secs: 75,
        }
    }

    fn conn_state(role: Option<Role>) -> (ConnState, mpsc::Receiver<Arc<str>>) {
        let state = Arc::new(SignalingState::new(test_limits()));
        let (tx, rx) = mpsc::channel(8);
        let conn = ConnState {
            state,
            tx,
            cancel: CancellationToken::new(),
            registered: Some(PeerId::new("alice".into())),
            room: None,
            role,
            stream: None,
            limits: test_limits(),
        };
        (conn, rx)
    }

    #[tokio::test]
    async fn start_stream_rejects_non_host_role() {
        let (mut conn, _rx) = conn_state(Some(Role::Guest));
        let err = conn.handle_start_stream().await.unwrap_err();
        assert!(matches!(err, SignalingError::StateViolation(_)));
        assert!(conn.stream.is_none());
    }

    #[tokio::test]
    async fn start_stream_rejects_ops_role() {
        let (mut conn, _rx) = conn_state(Some(Role::Ops));
        let err = conn.handle_start_stream().await.unwrap_err();
        assert!(matches!(err, SignalingError::StateViolation(_)));
    }

    #[tokio::test]
    async fn start_stream_rejects_when_no_role_assigned() {
        let (mut conn, _rx) = conn_state(None);
        let err = conn.handle_start_stream().await.unwrap_err();
        assert!(matches!(err, SignalingError::StateViolation(_)));
    }
}
