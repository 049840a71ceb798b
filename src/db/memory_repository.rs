use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::db::match_repository::{MatchRepository, RepositoryError};
use crate::league::standings::SeasonFinalization;
use crate::models::live_match::LiveMatch;
use crate::models::match_events::MatchEvent;
use crate::models::statistics::{MatchStatsSnapshot, PlayerSeasonStats, TeamSeasonStats};

#[derive(Default)]
struct Tables {
    matches: HashMap<Uuid, LiveMatch>,
    events: HashMap<Uuid, Vec<MatchEvent>>,
    stats: HashMap<Uuid, MatchStatsSnapshot>,
    team_season: HashMap<(Uuid, Uuid), TeamSeasonStats>,
    player_season: HashMap<(Uuid, Uuid), PlayerSeasonStats>,
    finalized: HashSet<String>,
}

impl Tables {
    /// Same guard the SQL update uses: version and owner must both match.
    fn check_version(&self, updated: &LiveMatch, expected_version: i64) -> Result<(), RepositoryError> {
        let stored = self
            .matches
            .get(&updated.id)
            .ok_or(RepositoryError::NotFound(updated.id))?;

        if stored.version != expected_version || stored.owner_instance_id != updated.owner_instance_id {
            return Err(RepositoryError::VersionConflict {
                match_id: updated.id,
                expected_version,
            });
        }
        Ok(())
    }

    fn apply_finalization(&mut self, finalization: &SeasonFinalization) -> bool {
        if !self.finalized.insert(finalization.idempotency_key()) {
            return false;
        }

        for outcome in finalization.outcomes() {
            self.team_season
                .entry((finalization.season_id, outcome.team_id))
                .or_insert_with(|| TeamSeasonStats::empty(finalization.season_id, outcome.team_id))
                .record(outcome);
        }

        for contribution in &finalization.players {
            let player_id = contribution.stats.player_id;
            self.player_season
                .entry((finalization.season_id, player_id))
                .or_insert_with(|| {
                    PlayerSeasonStats::empty(finalization.season_id, player_id, contribution.team_id)
                })
                .record(contribution);
        }
        true
    }
}

/// Process-local repository with the same transactional guarantees as the
/// Postgres one. Used by tests and single-node development runs.
#[derive(Default)]
pub struct InMemoryMatchRepository {
    tables: Mutex<Tables>,
}

impl InMemoryMatchRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MatchRepository for InMemoryMatchRepository {
    async fn insert_match(&self, live_match: &LiveMatch) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().await;
        tables.matches.insert(live_match.id, live_match.clone());
        tables.events.insert(live_match.id, Vec::new());
        Ok(())
    }

    async fn fetch_match(&self, match_id: Uuid) -> Result<Option<LiveMatch>, RepositoryError> {
        Ok(self.tables.lock().await.matches.get(&match_id).cloned())
    }

    async fn claim_match(&self, match_id: Uuid, instance_id: &str) -> Result<LiveMatch, RepositoryError> {
        let mut tables = self.tables.lock().await;
        let stored = tables
            .matches
            .get_mut(&match_id)
            .ok_or(RepositoryError::NotFound(match_id))?;
        stored.owner_instance_id = Some(instance_id.to_string());
        stored.version += 1;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn append_event(
        &self,
        updated: &LiveMatch,
        event: &MatchEvent,
        stats: &MatchStatsSnapshot,
        expected_version: i64,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().await;
        tables.check_version(updated, expected_version)?;

        let log = tables.events.entry(updated.id).or_default();
        if event.sequence_no != log.len() as i64 + 1 {
            return Err(RepositoryError::VersionConflict {
                match_id: updated.id,
                expected_version,
            });
        }
        log.push(event.clone());
        tables.stats.insert(updated.id, stats.clone());
        tables.matches.insert(updated.id, updated.clone());
        Ok(())
    }

    async fn save_transition(
        &self,
        updated: &LiveMatch,
        expected_version: i64,
        finalization: Option<&SeasonFinalization>,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().await;
        tables.check_version(updated, expected_version)?;
        tables.matches.insert(updated.id, updated.clone());
        if let Some(finalization) = finalization {
            tables.apply_finalization(finalization);
        }
        Ok(())
    }

    async fn fetch_events(&self, match_id: Uuid) -> Result<Vec<MatchEvent>, RepositoryError> {
        Ok(self
            .tables
            .lock()
            .await
            .events
            .get(&match_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_stats(&self, match_id: Uuid) -> Result<Option<MatchStatsSnapshot>, RepositoryError> {
        Ok(self.tables.lock().await.stats.get(&match_id).cloned())
    }

    async fn finalize_season(&self, finalization: &SeasonFinalization) -> Result<bool, RepositoryError> {
        Ok(self.tables.lock().await.apply_finalization(finalization))
    }

    async fn team_season_stats(
        &self,
        season_id: Uuid,
        team_id: Uuid,
    ) -> Result<Option<TeamSeasonStats>, RepositoryError> {
        Ok(self
            .tables
            .lock()
            .await
            .team_season
            .get(&(season_id, team_id))
            .cloned())
    }

    async fn season_standings(&self, season_id: Uuid) -> Result<Vec<TeamSeasonStats>, RepositoryError> {
        Ok(self
            .tables
            .lock()
            .await
            .team_season
            .values()
            .filter(|row| row.season_id == season_id)
            .cloned()
            .collect())
    }

    async fn season_player_stats(&self, season_id: Uuid) -> Result<Vec<PlayerSeasonStats>, RepositoryError> {
        Ok(self
            .tables
            .lock()
            .await
            .player_season
            .values()
            .filter(|row| row.season_id == season_id)
            .cloned()
            .collect())
    }
}
