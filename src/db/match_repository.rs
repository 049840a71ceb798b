use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::league::standings::SeasonFinalization;
use crate::models::live_match::LiveMatch;
use crate::models::match_events::MatchEvent;
use crate::models::statistics::{MatchStatsSnapshot, PlayerSeasonStats, TeamSeasonStats};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("match {0} not found")]
    NotFound(Uuid),
    #[error("match {match_id} was modified concurrently (expected version {expected_version})")]
    VersionConflict { match_id: Uuid, expected_version: i64 },
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Durable storage for matches, their event logs and derived statistics.
///
/// `append_event` and `save_transition` are write-ahead: the caller only
/// acknowledges a mutation after they return `Ok`. Both are guarded by
/// `expected_version` and the owner recorded on the match, so a writer that
/// lost ownership can never commit.
#[async_trait]
pub trait MatchRepository: Send + Sync {
    async fn insert_match(&self, live_match: &LiveMatch) -> Result<(), RepositoryError>;

    async fn fetch_match(&self, match_id: Uuid) -> Result<Option<LiveMatch>, RepositoryError>;

    /// Record `instance_id` as owner and bump the version, fencing off
    /// in-flight writes from any previous owner.
    async fn claim_match(&self, match_id: Uuid, instance_id: &str) -> Result<LiveMatch, RepositoryError>;

    async fn append_event(
        &self,
        updated: &LiveMatch,
        event: &MatchEvent,
        stats: &MatchStatsSnapshot,
        expected_version: i64,
    ) -> Result<(), RepositoryError>;

    /// Persist a status change. When `finalization` is present it is folded
    /// into season standings in the same transaction.
    async fn save_transition(
        &self,
        updated: &LiveMatch,
        expected_version: i64,
        finalization: Option<&SeasonFinalization>,
    ) -> Result<(), RepositoryError>;

    /// Ordered by sequence number
    async fn fetch_events(&self, match_id: Uuid) -> Result<Vec<MatchEvent>, RepositoryError>;

    async fn fetch_stats(&self, match_id: Uuid) -> Result<Option<MatchStatsSnapshot>, RepositoryError>;

    /// Returns `false` when the match was already finalized.
    async fn finalize_season(&self, finalization: &SeasonFinalization) -> Result<bool, RepositoryError>;

    async fn team_season_stats(
        &self,
        season_id: Uuid,
        team_id: Uuid,
    ) -> Result<Option<TeamSeasonStats>, RepositoryError>;

    async fn season_standings(&self, season_id: Uuid) -> Result<Vec<TeamSeasonStats>, RepositoryError>;

    async fn season_player_stats(&self, season_id: Uuid) -> Result<Vec<PlayerSeasonStats>, RepositoryError>;
}
