use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use crate::db::match_repository::{MatchRepository, RepositoryError};
use crate::error::LiveMatchError;
use crate::game::stats_calculator::StatsCalculator;
use crate::league::standings::StandingsService;
use crate::models::live_match::LiveMatch;
use crate::models::match_events::MatchEvent;
use crate::models::match_updates::MatchSnapshot;
use crate::models::statistics::{MatchStatsSnapshot, PlayerMatchStats, Standing, TeamSeasonStats, TopPerformer};
use crate::services::match_engine::MatchEngine;

const SNAPSHOT_READ_ATTEMPTS: usize = 3;

/// Read side of the match core. Owned matches are served from memory,
/// everything else from durable storage.
#[derive(Clone)]
pub struct MatchQueryService {
    repository: Arc<dyn MatchRepository>,
    engine: Arc<MatchEngine>,
    standings: StandingsService,
}

impl MatchQueryService {
    pub fn new(repository: Arc<dyn MatchRepository>, engine: Arc<MatchEngine>) -> Self {
        Self {
            standings: StandingsService::new(repository.clone()),
            repository,
            engine,
        }
    }

    pub async fn get_match_state(&self, match_id: Uuid) -> Result<LiveMatch, LiveMatchError> {
        if let Some(snapshot) = self.engine.local_snapshot(match_id).await {
            return Ok(snapshot.match_state);
        }
        self.repository
            .fetch_match(match_id)
            .await?
            .ok_or(LiveMatchError::MatchNotFound(match_id))
    }

    pub async fn get_match_stats(&self, match_id: Uuid) -> Result<MatchStatsSnapshot, LiveMatchError> {
        Ok(self.get_snapshot(match_id).await?.stats)
    }

    /// `None` when the player has not featured in any event of the match.
    pub async fn get_player_match_stats(
        &self,
        match_id: Uuid,
        player_id: Uuid,
    ) -> Result<Option<PlayerMatchStats>, LiveMatchError> {
        Ok(self.get_match_stats(match_id).await?.player(player_id).cloned())
    }

    pub async fn get_match_events(&self, match_id: Uuid) -> Result<Vec<MatchEvent>, LiveMatchError> {
        // Surface a missing match as such rather than as an empty log
        self.get_match_state(match_id).await?;
        Ok(self.repository.fetch_events(match_id).await?)
    }

    /// Match state and statistics at the same version.
    pub async fn get_snapshot(&self, match_id: Uuid) -> Result<MatchSnapshot, LiveMatchError> {
        if let Some(snapshot) = self.engine.local_snapshot(match_id).await {
            return Ok(snapshot);
        }

        // Two reads can straddle a concurrent write by the owner; retry until they agree
        for _ in 0..SNAPSHOT_READ_ATTEMPTS {
            let match_state = self
                .repository
                .fetch_match(match_id)
                .await?
                .ok_or(LiveMatchError::MatchNotFound(match_id))?;
            let stats = self
                .repository
                .fetch_stats(match_id)
                .await?
                .unwrap_or_else(|| MatchStatsSnapshot::empty(match_id));

            if stats.last_sequence_no == match_state.last_sequence_no {
                return Ok(MatchSnapshot { match_state, stats });
            }
        }

        warn!("Statistics for match {} kept moving; rebuilding from the log", match_id);
        let match_state = self
            .repository
            .fetch_match(match_id)
            .await?
            .ok_or(LiveMatchError::MatchNotFound(match_id))?;
        let events: Vec<MatchEvent> = self
            .repository
            .fetch_events(match_id)
            .await?
            .into_iter()
            .take_while(|event| event.sequence_no <= match_state.last_sequence_no)
            .collect();
        let stats = StatsCalculator::replay(match_id, &events)
            .map_err(|e| LiveMatchError::Durability(RepositoryError::Corrupt(e.to_string())))?;

        Ok(MatchSnapshot { match_state, stats })
    }

    pub async fn get_standings(&self, season_id: Uuid) -> Result<Vec<Standing>, LiveMatchError> {
        Ok(self.standings.get_standings(season_id).await?)
    }

    pub async fn get_team_season_stats(
        &self,
        season_id: Uuid,
        team_id: Uuid,
    ) -> Result<TeamSeasonStats, LiveMatchError> {
        Ok(self.standings.get_team_season_stats(season_id, team_id).await?)
    }

    pub async fn get_top_performers(
        &self,
        season_id: Uuid,
        limit: usize,
    ) -> Result<Vec<TopPerformer>, LiveMatchError> {
        Ok(self.standings.get_top_performers(season_id, limit).await?)
    }
}
