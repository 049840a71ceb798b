use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::live_match::{LiveMatch, MatchStatus, Score};
use crate::models::match_events::MatchEvent;
use crate::models::statistics::{MatchStatsSnapshot, PlayerMatchStats, TeamMatchStats};

/// Bus topic carrying every update for one match.
pub fn match_topic(match_id: Uuid) -> String {
    format!("match:events:{}", match_id)
}

/// Message published on a match topic. Each carries the full delta so a
/// viewer never needs a second fetch, and a `version` that viewers use to
/// drop duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum MatchUpdate {
    MatchEvent {
        match_id: Uuid,
        version: i64,
        event: MatchEvent,
        score: Score,
        clock_minute: u16,
        home_stats: TeamMatchStats,
        away_stats: TeamMatchStats,
        /// Rows of every player the event touched
        player_stats: Vec<PlayerMatchStats>,
    },
    StatusChanged {
        match_id: Uuid,
        version: i64,
        previous_status: MatchStatus,
        new_status: MatchStatus,
        score: Score,
        clock_minute: u16,
        timestamp: DateTime<Utc>,
    },
    OwnershipChanged {
        match_id: Uuid,
        version: i64,
        owner_instance_id: String,
        timestamp: DateTime<Utc>,
    },
}

impl MatchUpdate {
    pub fn match_id(&self) -> Uuid {
        match self {
            MatchUpdate::MatchEvent { match_id, .. }
            | MatchUpdate::StatusChanged { match_id, .. }
            | MatchUpdate::OwnershipChanged { match_id, .. } => *match_id,
        }
    }

    pub fn version(&self) -> i64 {
        match self {
            MatchUpdate::MatchEvent { version, .. }
            | MatchUpdate::StatusChanged { version, .. }
            | MatchUpdate::OwnershipChanged { version, .. } => *version,
        }
    }
}

/// Consistent pair of match state and statistics at one version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    pub match_state: LiveMatch,
    pub stats: MatchStatsSnapshot,
}

impl MatchSnapshot {
    pub fn version(&self) -> i64 {
        self.match_state.version
    }
}

/// Result of an accepted submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventReceipt {
    pub match_id: Uuid,
    pub sequence_no: i64,
    pub version: i64,
    pub event: MatchEvent,
}

/// Result of an applied control command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
    pub match_id: Uuid,
    pub previous_status: MatchStatus,
    pub new_status: MatchStatus,
    pub version: i64,
    pub timestamp: DateTime<Utc>,
}
