//! Forwarding: unicast signaling relay and room-wide broadcast.
//!
//! Offer/answer/ice-candidate/mute frames are forwarded byte-for-byte as
//! received — the server never re-encodes them, so whatever extra fields a
//! client's SDP munging or ICE candidate shape included survive the trip.

use std::sync::Arc;

use studio_common::error::SignalingError;

use crate::peer::{Priority, PeerRegistry};
use crate::room::Room;
use crate::peer::PeerId;

/// Forward a raw frame to exactly one connected peer.
///
/// Used for offer/answer/ice-candidate (addressed `to`) and a targeted
/// `mute` entry. None of these count as membership frames, so a full
/// outbound queue drops the frame rather than blocking the sender.
pub async fn forward_to_peer(
    registry: &PeerRegistry,
    target: &PeerId,
    raw_text: Arc<str>,
) -> Result<(), SignalingError> {
    let handle = registry
        .get(target)
        .await
        .ok_or_else(|| SignalingError::TargetNotConnected(target.as_str().to_string()))?;
    handle.send(raw_text, Priority::BestEffort).await;
    Ok(())
}

/// Broadcast a raw frame to every other member of `room`.
///
/// `priority` lets the caller mark membership frames (`peer-joined`,
/// `peer-left`) as [`Priority::Critical`] so a stalled connection is closed
/// rather than silently missing them, while a room-wide `mute` stays
/// best-effort.
pub async fn broadcast_to_room(
    registry: &PeerRegistry,
    room: &Room,
    exclude: &PeerId,
    raw_text: Arc<str>,
    priority: Priority,
) {
    for peer_id in room.other_members(exclude).await {
        if let Some(handle) = registry.get(&peer_id).await {
            handle.send(raw_text.clone(), priority).await;
        }
    }
}
