use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::match_events::{MatchEvent, TeamSide};

/// Lifecycle of a match. `Completed` and `Cancelled` are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Scheduled,
    InProgress,
    Paused,
    Completed,
    Cancelled,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Scheduled => "scheduled",
            MatchStatus::InProgress => "in_progress",
            MatchStatus::Paused => "paused",
            MatchStatus::Completed => "completed",
            MatchStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MatchStatus::Completed | MatchStatus::Cancelled)
    }

    /// Events may only be recorded once the match has kicked off and before it ends.
    pub fn accepts_events(&self) -> bool {
        matches!(self, MatchStatus::InProgress | MatchStatus::Paused)
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(MatchStatus::Scheduled),
            "in_progress" => Ok(MatchStatus::InProgress),
            "paused" => Ok(MatchStatus::Paused),
            "completed" => Ok(MatchStatus::Completed),
            "cancelled" => Ok(MatchStatus::Cancelled),
            other => Err(format!("unknown match status '{}'", other)),
        }
    }
}

/// Control commands are the only way to move a match between statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchCommand {
    Start,
    Pause,
    Resume,
    End,
    Cancel,
}

impl MatchCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchCommand::Start => "start",
            MatchCommand::Pause => "pause",
            MatchCommand::Resume => "resume",
            MatchCommand::End => "end",
            MatchCommand::Cancel => "cancel",
        }
    }

    /// Status reached by applying this command to `current`, or `None` if the
    /// transition is illegal.
    pub fn target_from(&self, current: MatchStatus) -> Option<MatchStatus> {
        use MatchStatus::*;
        match (self, current) {
            (MatchCommand::Start, Scheduled) => Some(InProgress),
            (MatchCommand::Pause, InProgress) => Some(Paused),
            (MatchCommand::Resume, Paused) => Some(InProgress),
            (MatchCommand::End, InProgress | Paused) => Some(Completed),
            (MatchCommand::Cancel, Scheduled | InProgress | Paused) => Some(Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for MatchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "start" => Ok(MatchCommand::Start),
            "pause" => Ok(MatchCommand::Pause),
            "resume" => Ok(MatchCommand::Resume),
            "end" => Ok(MatchCommand::End),
            "cancel" => Ok(MatchCommand::Cancel),
            other => Err(format!("unknown match command '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub home: u32,
    pub away: u32,
}

/// Request to schedule a new match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMatch {
    pub season_id: Uuid,
    pub home_team_id: Uuid,
    pub away_team_id: Uuid,
    pub scheduled_start: DateTime<Utc>,
}

/// Authoritative state of one match. Only the lease holder mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveMatch {
    pub id: Uuid,
    pub season_id: Uuid,
    pub home_team_id: Uuid,
    pub away_team_id: Uuid,
    pub scheduled_start: DateTime<Utc>,
    pub status: MatchStatus,
    pub home_score: u32,
    pub away_score: u32,
    pub clock_minute: u16,
    pub owner_instance_id: Option<String>,
    /// Incremented on every durable mutation, ownership claims included.
    pub version: i64,
    pub last_sequence_no: i64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LiveMatch {
    pub fn scheduled(request: &NewMatch) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            season_id: request.season_id,
            home_team_id: request.home_team_id,
            away_team_id: request.away_team_id,
            scheduled_start: request.scheduled_start,
            status: MatchStatus::Scheduled,
            home_score: 0,
            away_score: 0,
            clock_minute: 0,
            owner_instance_id: None,
            version: 0,
            last_sequence_no: 0,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn side_of(&self, team_id: Uuid) -> Option<TeamSide> {
        if team_id == self.home_team_id {
            Some(TeamSide::Home)
        } else if team_id == self.away_team_id {
            Some(TeamSide::Away)
        } else {
            None
        }
    }

    pub fn team_id(&self, side: TeamSide) -> Uuid {
        match side {
            TeamSide::Home => self.home_team_id,
            TeamSide::Away => self.away_team_id,
        }
    }

    pub fn score(&self) -> Score {
        Score {
            home: self.home_score,
            away: self.away_score,
        }
    }

    /// State after accepting `event`; the score is taken from the folded statistics.
    pub fn with_event(&self, event: &MatchEvent, score: Score) -> Self {
        let mut next = self.clone();
        next.last_sequence_no = event.sequence_no;
        next.home_score = score.home;
        next.away_score = score.away;
        next.clock_minute = next.clock_minute.max(event.minute);
        next.version += 1;
        next.updated_at = event.timestamp;
        next
    }

    pub fn with_status(&self, status: MatchStatus, at: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.status = status;
        match status {
            MatchStatus::InProgress if next.started_at.is_none() => next.started_at = Some(at),
            MatchStatus::Completed | MatchStatus::Cancelled => next.completed_at = Some(at),
            _ => {}
        }
        next.version += 1;
        next.updated_at = at;
        next
    }
}
