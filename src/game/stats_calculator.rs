use thiserror::Error;
use uuid::Uuid;

use crate::models::live_match::Score;
use crate::models::match_events::{EventKind, MatchEvent, TeamSide};
use crate::models::statistics::{MatchStatsSnapshot, PlayerMatchStats};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatsError {
    #[error("event {got} applied out of order (expected sequence {expected})")]
    OutOfOrder { expected: i64, got: i64 },
    #[error("event belongs to match {event_match}, snapshot is for {snapshot_match}")]
    WrongMatch { snapshot_match: Uuid, event_match: Uuid },
    #[error("possession {0}% is out of range")]
    InvalidPossession(u8),
}

/// Incremental statistics aggregation.
///
/// `apply_event` is a pure function of (snapshot, event): folding a match's
/// full event log from `MatchStatsSnapshot::empty` reproduces the snapshot
/// maintained event by event.
pub struct StatsCalculator;

impl StatsCalculator {
    pub fn apply_event(
        snapshot: &MatchStatsSnapshot,
        event: &MatchEvent,
    ) -> Result<MatchStatsSnapshot, StatsError> {
        if event.match_id != snapshot.match_id {
            return Err(StatsError::WrongMatch {
                snapshot_match: snapshot.match_id,
                event_match: event.match_id,
            });
        }

        let expected = snapshot.last_sequence_no + 1;
        if event.sequence_no != expected {
            return Err(StatsError::OutOfOrder {
                expected,
                got: event.sequence_no,
            });
        }

        let mut next = snapshot.clone();
        next.last_sequence_no = event.sequence_no;
        let side = event.team_side;

        match &event.kind {
            EventKind::Goal { penalty } => {
                let team = next.team_mut(side);
                team.goals += 1;
                if *penalty {
                    team.penalty_goals += 1;
                }
                if let Some(player) = Self::player_mut(&mut next, event.player_id, side) {
                    player.goals += 1;
                    if *penalty {
                        player.penalty_goals += 1;
                    }
                }
            }
            EventKind::Assist => {
                if let Some(player) = Self::player_mut(&mut next, event.player_id, side) {
                    player.assists += 1;
                }
            }
            EventKind::YellowCard => {
                next.team_mut(side).yellow_cards += 1;
                if let Some(player) = Self::player_mut(&mut next, event.player_id, side) {
                    player.yellow_cards += 1;
                }
            }
            EventKind::RedCard => {
                next.team_mut(side).red_cards += 1;
                if let Some(player) = Self::player_mut(&mut next, event.player_id, side) {
                    player.red_cards += 1;
                }
            }
            EventKind::Substitution { player_out } => {
                next.team_mut(side).substitutions += 1;
                if let Some(player) = Self::player_mut(&mut next, event.player_id, side) {
                    player.substituted_on = true;
                }
                if let Some(player) = Self::player_mut(&mut next, *player_out, side) {
                    player.substituted_off = true;
                }
            }
            EventKind::Shot { on_target } => {
                let team = next.team_mut(side);
                team.shots += 1;
                if *on_target {
                    team.shots_on_target += 1;
                }
                if let Some(player) = Self::player_mut(&mut next, event.player_id, side) {
                    player.shots += 1;
                    if *on_target {
                        player.shots_on_target += 1;
                    }
                }
            }
            EventKind::Corner => {
                next.team_mut(side).corners += 1;
            }
            EventKind::Foul { suffered_by } => {
                next.team_mut(side).fouls += 1;
                if let Some(player) = Self::player_mut(&mut next, event.player_id, side) {
                    player.fouls_committed += 1;
                }
                if let Some(player) = Self::player_mut(&mut next, *suffered_by, side.opposite()) {
                    player.fouls_suffered += 1;
                }
            }
            EventKind::Offside => {
                next.team_mut(side).offsides += 1;
                if let Some(player) = Self::player_mut(&mut next, event.player_id, side) {
                    player.offsides += 1;
                }
            }
            EventKind::Injury => {
                next.team_mut(side).injuries += 1;
                if let Some(player) = Self::player_mut(&mut next, event.player_id, side) {
                    player.injuries += 1;
                }
            }
            EventKind::PossessionUpdate { home_percent } => {
                if *home_percent > 100 {
                    return Err(StatsError::InvalidPossession(*home_percent));
                }
                // Last write wins: possession is a reading, not a counter
                next.home.possession = Some(*home_percent);
                next.away.possession = Some(100 - *home_percent);
            }
            EventKind::Pass { completed } => {
                let team = next.team_mut(side);
                team.passes += 1;
                if *completed {
                    team.passes_completed += 1;
                }
                if let Some(player) = Self::player_mut(&mut next, event.player_id, side) {
                    player.passes += 1;
                    if *completed {
                        player.passes_completed += 1;
                    }
                }
            }
            EventKind::Tackle { won } => {
                let team = next.team_mut(side);
                team.tackles += 1;
                if *won {
                    team.tackles_won += 1;
                }
                if let Some(player) = Self::player_mut(&mut next, event.player_id, side) {
                    player.tackles += 1;
                    if *won {
                        player.tackles_won += 1;
                    }
                }
            }
            EventKind::Interception => {
                next.team_mut(side).interceptions += 1;
                if let Some(player) = Self::player_mut(&mut next, event.player_id, side) {
                    player.interceptions += 1;
                }
            }
            EventKind::Clearance => {
                next.team_mut(side).clearances += 1;
                if let Some(player) = Self::player_mut(&mut next, event.player_id, side) {
                    player.clearances += 1;
                }
            }
        }

        Ok(next)
    }

    /// Rebuild statistics from an ordered event log
    pub fn replay<'a, I>(match_id: Uuid, events: I) -> Result<MatchStatsSnapshot, StatsError>
    where
        I: IntoIterator<Item = &'a MatchEvent>,
    {
        events
            .into_iter()
            .try_fold(MatchStatsSnapshot::empty(match_id), |snapshot, event| {
                Self::apply_event(&snapshot, event)
            })
    }

    pub fn score(snapshot: &MatchStatsSnapshot) -> Score {
        Score {
            home: snapshot.home.goals,
            away: snapshot.away.goals,
        }
    }

    /// Players whose rows change when `event` is folded
    pub fn affected_players(event: &MatchEvent) -> Vec<Uuid> {
        let mut players: Vec<Uuid> = event.player_id.into_iter().collect();
        match &event.kind {
            EventKind::Substitution { player_out: Some(other) }
            | EventKind::Foul { suffered_by: Some(other) } => players.push(*other),
            _ => {}
        }
        players
    }

    fn player_mut(
        snapshot: &mut MatchStatsSnapshot,
        player_id: Option<Uuid>,
        side: TeamSide,
    ) -> Option<&mut PlayerMatchStats> {
        let player_id = player_id?;
        Some(
            snapshot
                .players
                .entry(player_id)
                .or_insert_with(|| PlayerMatchStats::new(player_id, side)),
        )
    }
}
