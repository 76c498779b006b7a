//! Field-level validation of an already-decoded [`ClientEnvelope`].
//!
//! Decode failures (malformed JSON, an unrecognized `type`) happen one
//! layer up in [`crate::session`] and never reach here. This module's job
//! is everything serde's `Option` fields defer: required-but-missing
//! fields, the room/registration state a message needs, and the anti-spoof
//! check that a claimed `from` matches the connection's own identity.

use studio_common::error::SignalingError;

use crate::message::ClientEnvelope;
use crate::peer::PeerId;

/// Registration/room state needed to validate a message against the
/// connection it arrived on.
pub struct ConnectionContext<'a> {
    pub registered_peer: Option<&'a PeerId>,
    pub in_room: bool,
}

/// Validate `envelope` against the sending connection's current state.
/// Returns every violation found, not just the first, so a client gets the
/// complete picture in one `error` frame instead of fixing issues one at a
/// time across several round trips.
pub fn validate(envelope: &ClientEnvelope, ctx: &ConnectionContext<'_>) -> Result<(), SignalingError> {
    let mut reasons = Vec::new();

    match envelope {
        ClientEnvelope::Register { peer_id } => {
            if ctx.registered_peer.is_some() {
                reasons.push("already registered on this connection".to_string());
            }
            match peer_id {
                None => reasons.push("peerId is required".to_string()),
                Some(id) if id.trim().is_empty() => {
                    reasons.push("peerId must not be empty".to_string())
                }
                Some(_) => {}
            }
        }

        ClientEnvelope::CreateRoom { role } => {
            require_registered(ctx, &mut reasons);
            require_not_already_in_room(ctx, &mut reasons);
            validate_role(role, &mut reasons);
        }

        ClientEnvelope::JoinRoom { room_id, role } => {
            require_registered(ctx, &mut reasons);
            require_not_already_in_room(ctx, &mut reasons);
            require_non_empty(room_id, "roomId", &mut reasons);
            validate_role(role, &mut reasons);
        }

        ClientEnvelope::CreateOrJoinRoom { room_id, role } => {
            require_registered(ctx, &mut reasons);
            require_not_already_in_room(ctx, &mut reasons);
            if let Some(room_id) = room_id {
                if room_id.trim().is_empty() {
                    reasons.push("roomId must not be empty when provided".to_string());
                }
            }
            validate_role(role, &mut reasons);
        }

        ClientEnvelope::Offer { from, to, sdp } | ClientEnvelope::Answer { from, to, sdp } => {
            require_registered(ctx, &mut reasons);
            require_room(ctx, &mut reasons);
            require_matching_from(ctx, from, &mut reasons);
            require_non_empty(to, "to", &mut reasons);
            require_non_empty(sdp, "sdp", &mut reasons);
        }

        ClientEnvelope::IceCandidate { from, to, candidate } => {
            require_registered(ctx, &mut reasons);
            require_room(ctx, &mut reasons);
            require_matching_from(ctx, from, &mut reasons);
            require_non_empty(to, "to", &mut reasons);
            if candidate.is_none() {
                reasons.push("candidate is required".to_string());
            }
        }

        ClientEnvelope::Mute { from, peer_id, muted, authority } => {
            require_registered(ctx, &mut reasons);
            require_room(ctx, &mut reasons);
            require_matching_from(ctx, from, &mut reasons);
            require_non_empty(peer_id, "peerId", &mut reasons);
            if muted.is_none() {
                reasons.push("muted is required".to_string());
            }
            if let Some(authority) = authority {
                if authority.trim().is_empty() {
                    reasons.push("authority must not be empty when provided".to_string());
                }
            }
        }

        ClientEnvelope::StartStream {} | ClientEnvelope::StopStream {} => {
            require_registered(ctx, &mut reasons);
            require_room(ctx, &mut reasons);
        }

        ClientEnvelope::StreamChunk { chunk } => {
            require_registered(ctx, &mut reasons);
            require_room(ctx, &mut reasons);
            require_non_empty(chunk, "chunk", &mut reasons);
        }

        ClientEnvelope::Ping {} => {}
    }

    if reasons.is_empty() {
        Ok(())
    } else {
        Err(SignalingError::Validation { reasons })
    }
}

fn require_registered(ctx: &ConnectionContext<'_>, reasons: &mut Vec<String>) {
    if ctx.registered_peer.is_none() {
        reasons.push("connection must register before sending this message".to_string());
    }
}

fn require_room(ctx: &ConnectionContext<'_>, reasons: &mut Vec<String>) {
    if !ctx.in_room {
        reasons.push("connection must join a room before sending this message".to_string());
    }
}

/// Room-entry messages must not be sent by a peer already seated in a room;
/// the client has to leave (or disconnect) first. See spec §4.6.
fn require_not_already_in_room(ctx: &ConnectionContext<'_>, reasons: &mut Vec<String>) {
    if ctx.in_room {
        reasons.push("already in a room; leave the current room before joining another".to_string());
    }
}

/// Anti-spoof check: a connection may only claim to be itself.
fn require_matching_from(
    ctx: &ConnectionContext<'_>,
    from: &Option<String>,
    reasons: &mut Vec<String>,
) {
    match (ctx.registered_peer, from) {
        (_, None) => reasons.push("from is required".to_string()),
        (Some(registered), Some(claimed)) if registered.as_str() != claimed => {
            reasons.push(format!(
                "from \"{claimed}\" does not match this connection's registered peer id"
            ));
        }
        _ => {}
    }
}

fn require_non_empty(field: &Option<String>, name: &str, reasons: &mut Vec<String>) {
    match field {
        None => reasons.push(format!("{name} is required")),
        Some(v) if v.trim().is_empty() => reasons.push(format!("{name} must not be empty")),
        Some(_) => {}
    }
}

fn validate_role(role: &Option<crate::room::Role>, _reasons: &mut [String]) {
    // `Role` is an enum deserialized straight from the wire value; an
    // invalid string already fails at decode time, so by the time we see
    // `Some(role)` here it is always one of host/ops/guest. Nothing to add
    // beyond what serde already enforced — kept as a named step so the
    // match arms above read uniformly and the schema stays the single
    // source of truth for "a valid role".
    let _ = role;
}
