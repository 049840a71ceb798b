use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::match_repository::{MatchRepository, RepositoryError};
use crate::models::common::MatchResult;
use crate::models::live_match::LiveMatch;
use crate::models::match_events::TeamSide;
use crate::models::statistics::{
    MatchStatsSnapshot, PlayerMatchStats, PlayerSeasonStats, Standing, TeamSeasonStats, TopPerformer,
};

/// Idempotency key guarding the one-shot fold of a match into its season.
pub fn finalization_key(match_id: Uuid) -> String {
    format!("{}:season-finalized", match_id)
}

/// One team's result in a completed match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMatchOutcome {
    pub team_id: Uuid,
    pub goals_for: u32,
    pub goals_against: u32,
    pub result: MatchResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSeasonContribution {
    pub team_id: Uuid,
    pub stats: PlayerMatchStats,
}

/// Everything a completed match contributes to its season
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonFinalization {
    pub match_id: Uuid,
    pub season_id: Uuid,
    pub home: TeamMatchOutcome,
    pub away: TeamMatchOutcome,
    pub players: Vec<PlayerSeasonContribution>,
}

impl SeasonFinalization {
    pub fn idempotency_key(&self) -> String {
        finalization_key(self.match_id)
    }

    pub fn outcomes(&self) -> [&TeamMatchOutcome; 2] {
        [&self.home, &self.away]
    }
}

/// Derive the season contribution of a match from its final statistics.
pub fn finalization_for(live_match: &LiveMatch, stats: &MatchStatsSnapshot) -> SeasonFinalization {
    let home_goals = stats.home.goals;
    let away_goals = stats.away.goals;
    let home_result = MatchResult::from_goals(home_goals, away_goals);

    let players = stats
        .players
        .values()
        .map(|player| PlayerSeasonContribution {
            team_id: live_match.team_id(player.team_side),
            stats: player.clone(),
        })
        .collect();

    SeasonFinalization {
        match_id: live_match.id,
        season_id: live_match.season_id,
        home: TeamMatchOutcome {
            team_id: live_match.team_id(TeamSide::Home),
            goals_for: home_goals,
            goals_against: away_goals,
            result: home_result,
        },
        away: TeamMatchOutcome {
            team_id: live_match.team_id(TeamSide::Away),
            goals_for: away_goals,
            goals_against: home_goals,
            result: home_result.inverse(),
        },
        players,
    }
}

impl TeamSeasonStats {
    pub fn empty(season_id: Uuid, team_id: Uuid) -> Self {
        Self {
            season_id,
            team_id,
            played: 0,
            wins: 0,
            draws: 0,
            losses: 0,
            goals_for: 0,
            goals_against: 0,
            goal_difference: 0,
            points: 0,
        }
    }

    pub fn record(&mut self, outcome: &TeamMatchOutcome) {
        self.played += 1;
        match outcome.result {
            MatchResult::Win => self.wins += 1,
            MatchResult::Draw => self.draws += 1,
            MatchResult::Loss => self.losses += 1,
        }
        self.goals_for += outcome.goals_for;
        self.goals_against += outcome.goals_against;
        self.goal_difference = self.goals_for as i32 - self.goals_against as i32;
        self.points += outcome.result.points();
    }
}

impl PlayerSeasonStats {
    pub fn empty(season_id: Uuid, player_id: Uuid, team_id: Uuid) -> Self {
        Self {
            season_id,
            player_id,
            team_id,
            matches_played: 0,
            goals: 0,
            assists: 0,
            shots: 0,
            shots_on_target: 0,
            passes: 0,
            passes_completed: 0,
            tackles: 0,
            tackles_won: 0,
            interceptions: 0,
            clearances: 0,
            yellow_cards: 0,
            red_cards: 0,
        }
    }

    pub fn record(&mut self, contribution: &PlayerSeasonContribution) {
        let stats = &contribution.stats;
        // Players move between clubs mid-season; credit the latest one
        self.team_id = contribution.team_id;
        self.matches_played += 1;
        self.goals += stats.goals;
        self.assists += stats.assists;
        self.shots += stats.shots;
        self.shots_on_target += stats.shots_on_target;
        self.passes += stats.passes;
        self.passes_completed += stats.passes_completed;
        self.tackles += stats.tackles;
        self.tackles_won += stats.tackles_won;
        self.interceptions += stats.interceptions;
        self.clearances += stats.clearances;
        self.yellow_cards += stats.yellow_cards;
        self.red_cards += stats.red_cards;
    }
}

/// Order by points, goal difference, goals scored, then team id.
pub fn rank_standings(mut rows: Vec<TeamSeasonStats>) -> Vec<Standing> {
    rows.sort_by(|a, b| {
        b.points
            .cmp(&a.points)
            .then(b.goal_difference.cmp(&a.goal_difference))
            .then(b.goals_for.cmp(&a.goals_for))
            .then(a.team_id.cmp(&b.team_id))
    });

    rows.into_iter()
        .enumerate()
        .map(|(index, stats)| Standing {
            position: (index + 1) as u32,
            stats,
        })
        .collect()
}

/// Order by goals, assists, fewer matches played, then player id.
pub fn rank_top_performers(mut rows: Vec<PlayerSeasonStats>, limit: usize) -> Vec<TopPerformer> {
    rows.sort_by(|a, b| {
        b.goals
            .cmp(&a.goals)
            .then(b.assists.cmp(&a.assists))
            .then(a.matches_played.cmp(&b.matches_played))
            .then(a.player_id.cmp(&b.player_id))
    });

    rows.into_iter()
        .take(limit)
        .enumerate()
        .map(|(index, stats)| TopPerformer {
            rank: (index + 1) as u32,
            stats,
        })
        .collect()
}

/// Service responsible for season-level queries
#[derive(Clone)]
pub struct StandingsService {
    repository: Arc<dyn MatchRepository>,
}

impl StandingsService {
    pub fn new(repository: Arc<dyn MatchRepository>) -> Self {
        Self { repository }
    }

    pub async fn get_standings(&self, season_id: Uuid) -> Result<Vec<Standing>, RepositoryError> {
        let rows = self.repository.season_standings(season_id).await?;
        Ok(rank_standings(rows))
    }

    /// A team that has not completed a match yet gets an all-zero row
    pub async fn get_team_season_stats(
        &self,
        season_id: Uuid,
        team_id: Uuid,
    ) -> Result<TeamSeasonStats, RepositoryError> {
        Ok(self
            .repository
            .team_season_stats(season_id, team_id)
            .await?
            .unwrap_or_else(|| TeamSeasonStats::empty(season_id, team_id)))
    }

    pub async fn get_top_performers(
        &self,
        season_id: Uuid,
        limit: usize,
    ) -> Result<Vec<TopPerformer>, RepositoryError> {
        let rows = self.repository.season_player_stats(season_id).await?;
        Ok(rank_top_performers(rows, limit))
    }
}
