use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::match_updates::{MatchSnapshot, MatchUpdate};

/// Why a viewer is being sent a full snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotReason {
    Join,
    /// The viewer fell behind the local feed and missed updates
    Resync,
}

/// Messages generated by the serving instance itself. Everything else a
/// viewer receives is a `MatchUpdate` relayed verbatim from the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum ViewerMessage {
    MatchSnapshot {
        reason: SnapshotReason,
        snapshot: MatchSnapshot,
    },
    SubscriptionError {
        match_id: Uuid,
        reason: String,
        message: String,
    },
}

/// Anything that can arrive on a viewer socket
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum InboundMessage {
    Viewer(ViewerMessage),
    Update(MatchUpdate),
}

impl InboundMessage {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
