use chrono::{Duration, Utc};

use crate::models::live_match::{LiveMatch, NewMatch};
use crate::models::match_events::{EventKind, EventSubmission, TeamSide};

/// Longest plausible clock reading, extra time and stoppage included.
pub const MAX_MATCH_MINUTE: u16 = 150;

/// Centralized validation for match scheduling and event submission
#[derive(Debug, Default, Clone)]
pub struct MatchValidator;

impl MatchValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate a scheduling request
    pub fn validate_new_match(&self, request: &NewMatch) -> Result<(), String> {
        if request.home_team_id == request.away_team_id {
            return Err("Home and away team must be different".into());
        }

        if request.home_team_id.is_nil() || request.away_team_id.is_nil() || request.season_id.is_nil() {
            return Err("Season and team IDs must not be nil".into());
        }

        // Reject obviously stale schedules; a little slack keeps clock skew harmless
        if request.scheduled_start < Utc::now() - Duration::days(365) {
            return Err("Scheduled start is more than a year in the past".into());
        }

        Ok(())
    }

    /// Validate a submitted event against the match it targets and resolve
    /// which side of the match it belongs to.
    pub fn validate_submission(
        &self,
        live_match: &LiveMatch,
        submission: &EventSubmission,
    ) -> Result<TeamSide, String> {
        let side = live_match.side_of(submission.team_id).ok_or_else(|| {
            format!(
                "Team {} does not play in match {}",
                submission.team_id, live_match.id
            )
        })?;

        if submission.minute > MAX_MATCH_MINUTE {
            return Err(format!(
                "Minute {} is out of range (maximum {})",
                submission.minute, MAX_MATCH_MINUTE
            ));
        }

        if submission.kind.requires_player() && submission.player_id.is_none() {
            return Err(format!("A {} event requires a player", submission.kind.name()));
        }

        match &submission.kind {
            EventKind::PossessionUpdate { home_percent } if *home_percent > 100 => {
                return Err(format!("Possession {}% is out of range", home_percent));
            }
            EventKind::Substitution { player_out: Some(out) } if Some(*out) == submission.player_id => {
                return Err("A player cannot substitute themselves".into());
            }
            EventKind::Foul { suffered_by: Some(victim) } if Some(*victim) == submission.player_id => {
                return Err("A player cannot foul themselves".into());
            }
            _ => {}
        }

        Ok(side)
    }
}
