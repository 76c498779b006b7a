//! The station manifest — the document served read-only at `GET /api/station`.
//!
//! Describes station identity, the signaling URL browsers should dial, and
//! the ICE servers (STUN/TURN) clients need for NAT traversal. The manifest
//! itself is not validated beyond what this endpoint needs (full schema
//! validation of a broader station manifest is out of scope).

use serde::{Deserialize, Serialize};

/// A single TURN server entry, credentials included.
///
/// Credentials are served to any origin (the endpoint is CORS-open), which
/// matches how short-lived TURN credentials are meant to be used — treat
/// these as public-facing, not secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnServer {
    pub urls: Vec<String>,
    pub username: String,
    pub credential: String,
}

/// ICE server configuration published to clients.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IceServers {
    #[serde(default)]
    pub stun: Vec<String>,
    #[serde(default)]
    pub turn: Vec<TurnServer>,
}

impl IceServers {
    pub fn is_empty(&self) -> bool {
        self.stun.is_empty() && self.turn.is_empty()
    }
}

/// The signaling endpoint description published to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalingInfo {
    pub url: String,
}

/// The full station manifest document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationManifest {
    #[serde(rename(serialize = "stationId", deserialize = "station_id"))]
    pub station_id: String,
    pub name: String,
    pub signaling: SignalingInfo,
    pub ice: IceServers,
}

impl StationManifest {
    /// Semantic checks beyond what serde's required fields already enforce.
    /// `GET /api/station` depends on these invariants holding at startup.
    pub fn validate(&self) -> Result<(), String> {
        if self.station_id.trim().is_empty() {
            return Err("station_id must not be empty".into());
        }
        if self.name.trim().is_empty() {
            return Err("name must not be empty".into());
        }
        if self.signaling.url.trim().is_empty() {
            return Err("signaling.url must not be empty".into());
        }
        if self.ice.is_empty() {
            return Err("ice servers must not be empty (need at least one stun or turn entry)".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> StationManifest {
        StationManifest {
            station_id: "studio-1".into(),
            name: "Test Studio".into(),
            signaling: SignalingInfo { url: "wss://example.test/signal".into() },
            ice: IceServers {
                stun: vec!["stun:stun.example.test:3478".into()],
                turn: vec![],
            },
        }
    }

    #[test]
    fn valid_manifest_passes() {
        assert!(manifest().validate().is_ok());
    }

    #[test]
    fn empty_station_id_rejected() {
        let mut m = manifest();
        m.station_id = "".into();
        assert!(m.validate().is_err());
    }

    #[test]
    fn empty_ice_servers_rejected() {
        let mut m = manifest();
        m.ice = IceServers::default();
        assert!(m.validate().is_err());
    }
}
