//! The wire protocol: messages a client sends and messages the server sends
//! back, as JSON text frames.
//!
//! Offer/answer/ice-candidate/mute frames are relayed to their recipients
//! byte-for-byte rather than being re-serialized from a typed struct — see
//! [`crate::relay`]. [`ClientEnvelope`] exists purely to let the receive
//! loop dispatch on `type` and to hand [`crate::validate`] the fields it
//! needs to check; it is never re-encoded back onto the wire.

use serde::{Deserialize, Serialize};

use crate::room::Role;

/// A message received from a client, parsed just far enough to dispatch and
/// validate it. Every field is `Option` even when the protocol calls it
/// required: a missing field is a validation failure (accumulated with
/// others and reported together), not a JSON decode error that drops the
/// whole frame silently.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientEnvelope {
    Register {
        #[serde(rename = "peerId")]
        peer_id: Option<String>,
    },
    /// Legacy alias for `create-or-join-room` with no `roomId`.
    CreateRoom {
        role: Option<Role>,
    },
    /// Legacy alias for `create-or-join-room` with a required `roomId`.
    JoinRoom {
        #[serde(rename = "roomId")]
        room_id: Option<String>,
        role: Option<Role>,
    },
    CreateOrJoinRoom {
        #[serde(rename = "roomId")]
        room_id: Option<String>,
        role: Option<Role>,
    },
    Offer {
        from: Option<String>,
        to: Option<String>,
        sdp: Option<String>,
    },
    Answer {
        from: Option<String>,
        to: Option<String>,
        sdp: Option<String>,
    },
    IceCandidate {
        from: Option<String>,
        to: Option<String>,
        /// Passed through unmodified — the shape is the browser's, not ours.
        candidate: Option<serde_json::Value>,
    },
    Mute {
        from: Option<String>,
        #[serde(rename = "peerId")]
        peer_id: Option<String>,
        muted: Option<bool>,
        authority: Option<String>,
    },
    StartStream {},
    StreamChunk {
        /// Base64-encoded media chunk.
        chunk: Option<String>,
    },
    StopStream {},
    Ping {},
}

impl ClientEnvelope {
    /// The `type` discriminant, for logging and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::CreateRoom { .. } => "create-room",
            Self::JoinRoom { .. } => "join-room",
            Self::CreateOrJoinRoom { .. } => "create-or-join-room",
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::IceCandidate { .. } => "ice-candidate",
            Self::Mute { .. } => "mute",
            Self::StartStream {} => "start-stream",
            Self::StreamChunk { .. } => "stream-chunk",
            Self::StopStream {} => "stop-stream",
            Self::Ping {} => "ping",
        }
    }
}

/// A participant entry as reported in `room-joined`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfo {
    pub peer_id: String,
    pub role: Role,
}

/// Messages the server originates itself (as opposed to relayed client
/// frames, which are forwarded verbatim). These are the only ones that ever
/// get serialized by this crate.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    Registered {
        #[serde(rename = "peerId")]
        peer_id: String,
    },
    RoomCreated {
        #[serde(rename = "roomId")]
        room_id: String,
        #[serde(rename = "hostId")]
        host_id: String,
        role: Role,
    },
    RoomJoined {
        #[serde(rename = "roomId")]
        room_id: String,
        participants: Vec<ParticipantInfo>,
        role: Role,
    },
    PeerJoined {
        #[serde(rename = "peerId")]
        peer_id: String,
        role: Role,
    },
    PeerLeft {
        #[serde(rename = "peerId")]
        peer_id: String,
    },
    Error {
        message: String,
    },
    Pong {
        timestamp: i64,
    },
}

impl ServerMessage {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("ServerMessage always serializes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_round_trips_peer_id() {
        let raw = r#"{"type":"register","peerId":"alice"}"#;
        let parsed: ClientEnvelope = serde_json::from_str(raw).unwrap();
        match parsed {
            ClientEnvelope::Register { peer_id } => assert_eq!(peer_id.as_deref(), Some("alice")),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn missing_required_field_still_parses() {
        let raw = r#"{"type":"join-room"}"#;
        let parsed: ClientEnvelope = serde_json::from_str(raw).unwrap();
        matches!(parsed, ClientEnvelope::JoinRoom { room_id: None, .. });
    }

    #[test]
    fn unknown_type_is_rejected_at_decode() {
        let raw = r#"{"type":"teleport"}"#;
        assert!(serde_json::from_str::<ClientEnvelope>(raw).is_err());
    }

    #[test]
    fn server_message_uses_camel_case_fields() {
        let msg = ServerMessage::Registered { peer_id: "alice".into() };
        assert_eq!(msg.to_json(), r#"{"type":"registered","peerId":"alice"}"#);
    }

    #[test]
    fn room_joined_serializes_participants() {
        let msg = ServerMessage::RoomJoined {
            room_id: "room-1".into(),
            participants: vec![
                ParticipantInfo { peer_id: "a".into(), role: Role::Host },
                ParticipantInfo { peer_id: "b".into(), role: Role::Guest },
            ],
            role: Role::Guest,
        };
        let json = msg.to_json();
        assert!(json.contains(r#""peerId":"a""#));
        assert!(json.contains(r#""role":"host""#));
    }
}
