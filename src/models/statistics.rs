use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::match_events::TeamSide;

/// Per-team counters for one match
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMatchStats {
    pub goals: u32,
    pub penalty_goals: u32,
    pub shots: u32,
    pub shots_on_target: u32,
    pub corners: u32,
    pub fouls: u32,
    pub yellow_cards: u32,
    pub red_cards: u32,
    pub offsides: u32,
    pub substitutions: u32,
    pub injuries: u32,
    pub passes: u32,
    pub passes_completed: u32,
    pub tackles: u32,
    pub tackles_won: u32,
    pub interceptions: u32,
    pub clearances: u32,
    /// Last reported possession share in percent, replaced rather than summed.
    pub possession: Option<u8>,
}

/// Per-(player, match) counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerMatchStats {
    pub player_id: Uuid,
    pub team_side: TeamSide,
    pub goals: u32,
    pub penalty_goals: u32,
    pub assists: u32,
    pub shots: u32,
    pub shots_on_target: u32,
    pub passes: u32,
    pub passes_completed: u32,
    pub tackles: u32,
    pub tackles_won: u32,
    pub interceptions: u32,
    pub clearances: u32,
    pub offsides: u32,
    pub fouls_committed: u32,
    pub fouls_suffered: u32,
    pub yellow_cards: u32,
    pub red_cards: u32,
    pub injuries: u32,
    pub substituted_on: bool,
    pub substituted_off: bool,
}

impl PlayerMatchStats {
    pub fn new(player_id: Uuid, team_side: TeamSide) -> Self {
        Self {
            player_id,
            team_side,
            goals: 0,
            penalty_goals: 0,
            assists: 0,
            shots: 0,
            shots_on_target: 0,
            passes: 0,
            passes_completed: 0,
            tackles: 0,
            tackles_won: 0,
            interceptions: 0,
            clearances: 0,
            offsides: 0,
            fouls_committed: 0,
            fouls_suffered: 0,
            yellow_cards: 0,
            red_cards: 0,
            injuries: 0,
            substituted_on: false,
            substituted_off: false,
        }
    }
}

/// Derived statistics for one match: a fold over its event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchStatsSnapshot {
    pub match_id: Uuid,
    pub home: TeamMatchStats,
    pub away: TeamMatchStats,
    pub players: BTreeMap<Uuid, PlayerMatchStats>,
    /// Sequence number of the last folded event, 0 when empty.
    pub last_sequence_no: i64,
}

impl MatchStatsSnapshot {
    pub fn empty(match_id: Uuid) -> Self {
        Self {
            match_id,
            home: TeamMatchStats::default(),
            away: TeamMatchStats::default(),
            players: BTreeMap::new(),
            last_sequence_no: 0,
        }
    }

    pub fn team(&self, side: TeamSide) -> &TeamMatchStats {
        match side {
            TeamSide::Home => &self.home,
            TeamSide::Away => &self.away,
        }
    }

    pub fn team_mut(&mut self, side: TeamSide) -> &mut TeamMatchStats {
        match side {
            TeamSide::Home => &mut self.home,
            TeamSide::Away => &mut self.away,
        }
    }

    pub fn player(&self, player_id: Uuid) -> Option<&PlayerMatchStats> {
        self.players.get(&player_id)
    }
}

/// Season standings row for one team
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamSeasonStats {
    pub season_id: Uuid,
    pub team_id: Uuid,
    pub played: u32,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub goals_for: u32,
    pub goals_against: u32,
    pub goal_difference: i32,
    pub points: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    pub position: u32,
    #[serde(flatten)]
    pub stats: TeamSeasonStats,
}

/// Player totals across the completed matches of a season
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSeasonStats {
    pub season_id: Uuid,
    pub player_id: Uuid,
    pub team_id: Uuid,
    pub matches_played: u32,
    pub goals: u32,
    pub assists: u32,
    pub shots: u32,
    pub shots_on_target: u32,
    pub passes: u32,
    pub passes_completed: u32,
    pub tackles: u32,
    pub tackles_won: u32,
    pub interceptions: u32,
    pub clearances: u32,
    pub yellow_cards: u32,
    pub red_cards: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopPerformer {
    pub rank: u32,
    #[serde(flatten)]
    pub stats: PlayerSeasonStats,
}
