use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamSide {
    Home,
    Away,
}

impl TeamSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeamSide::Home => "home",
            TeamSide::Away => "away",
        }
    }

    pub fn opposite(&self) -> TeamSide {
        match self {
            TeamSide::Home => TeamSide::Away,
            TeamSide::Away => TeamSide::Home,
        }
    }
}

impl std::str::FromStr for TeamSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "home" => Ok(TeamSide::Home),
            "away" => Ok(TeamSide::Away),
            other => Err(format!("unknown team side '{}'", other)),
        }
    }
}

/// Closed set of sporting events, each with its own optional payload.
///
/// Serialized with a `type` tag; payload fields sit beside it, e.g.
/// `{"type": "shot", "on_target": true}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Goal {
        #[serde(default)]
        penalty: bool,
    },
    Assist,
    YellowCard,
    RedCard,
    Substitution {
        #[serde(default)]
        player_out: Option<Uuid>,
    },
    Shot {
        #[serde(default)]
        on_target: bool,
    },
    Corner,
    Foul {
        #[serde(default)]
        suffered_by: Option<Uuid>,
    },
    Offside,
    Injury,
    PossessionUpdate {
        /// Home share in percent; the away share is the complement.
        home_percent: u8,
    },
    Pass {
        #[serde(default)]
        completed: bool,
    },
    Tackle {
        #[serde(default)]
        won: bool,
    },
    Interception,
    Clearance,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Goal { .. } => "goal",
            EventKind::Assist => "assist",
            EventKind::YellowCard => "yellow_card",
            EventKind::RedCard => "red_card",
            EventKind::Substitution { .. } => "substitution",
            EventKind::Shot { .. } => "shot",
            EventKind::Corner => "corner",
            EventKind::Foul { .. } => "foul",
            EventKind::Offside => "offside",
            EventKind::Injury => "injury",
            EventKind::PossessionUpdate { .. } => "possession_update",
            EventKind::Pass { .. } => "pass",
            EventKind::Tackle { .. } => "tackle",
            EventKind::Interception => "interception",
            EventKind::Clearance => "clearance",
        }
    }

    /// Events that only make sense when attributed to a player.
    pub fn requires_player(&self) -> bool {
        matches!(
            self,
            EventKind::Assist
                | EventKind::Substitution { .. }
                | EventKind::Pass { .. }
                | EventKind::Tackle { .. }
                | EventKind::Interception
                | EventKind::Clearance
        )
    }
}

/// Event as submitted by a client. The minute is advisory display data only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSubmission {
    #[serde(flatten)]
    pub kind: EventKind,
    pub minute: u16,
    pub team_id: Uuid,
    #[serde(default)]
    pub player_id: Option<Uuid>,
}

/// Accepted, immutable event. Ordering is `sequence_no`, never `minute`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchEvent {
    pub event_id: Uuid,
    pub match_id: Uuid,
    pub sequence_no: i64,
    #[serde(flatten)]
    pub kind: EventKind,
    pub minute: u16,
    pub team_id: Uuid,
    pub team_side: TeamSide,
    pub player_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}
