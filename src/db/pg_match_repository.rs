use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::match_repository::{MatchRepository, RepositoryError};
use crate::league::standings::SeasonFinalization;
use crate::models::live_match::{LiveMatch, MatchStatus};
use crate::models::match_events::{EventKind, MatchEvent, TeamSide};
use crate::models::statistics::{MatchStatsSnapshot, PlayerSeasonStats, TeamSeasonStats};

const MATCH_COLUMNS: &str = "
    id, season_id, home_team_id, away_team_id, scheduled_start, status,
    home_score, away_score, clock_minute, owner_instance_id, version, last_sequence_no,
    started_at, completed_at, created_at, updated_at
";

/// Postgres-backed match storage
#[derive(Debug, Clone)]
pub struct PgMatchRepository {
    pool: PgPool,
}

impl PgMatchRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Conditional update shared by event appends and status transitions
    async fn update_match_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        updated: &LiveMatch,
        expected_version: i64,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE live_matches SET
                status = $3,
                home_score = $4,
                away_score = $5,
                clock_minute = $6,
                version = $7,
                last_sequence_no = $8,
                started_at = $9,
                completed_at = $10,
                updated_at = $11
            WHERE id = $1 AND version = $2 AND owner_instance_id IS NOT DISTINCT FROM $12
            "#,
        )
        .bind(updated.id)
        .bind(expected_version)
        .bind(updated.status.as_str())
        .bind(updated.home_score as i32)
        .bind(updated.away_score as i32)
        .bind(updated.clock_minute as i32)
        .bind(updated.version)
        .bind(updated.last_sequence_no)
        .bind(updated.started_at)
        .bind(updated.completed_at)
        .bind(updated.updated_at)
        .bind(updated.owner_instance_id.as_deref())
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::VersionConflict {
                match_id: updated.id,
                expected_version,
            });
        }
        Ok(())
    }

    async fn apply_finalization_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        finalization: &SeasonFinalization,
    ) -> Result<bool, RepositoryError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO season_finalizations (idempotency_key, match_id, season_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (idempotency_key) DO NOTHING
            "#,
        )
        .bind(finalization.idempotency_key())
        .bind(finalization.match_id)
        .bind(finalization.season_id)
        .execute(&mut **tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            debug!("Match {} already folded into season {}", finalization.match_id, finalization.season_id);
            return Ok(false);
        }

        for outcome in finalization.outcomes() {
            let existing = sqlx::query(
                "SELECT * FROM team_season_stats WHERE season_id = $1 AND team_id = $2 FOR UPDATE",
            )
            .bind(finalization.season_id)
            .bind(outcome.team_id)
            .fetch_optional(&mut **tx)
            .await?;

            let mut stats = match existing {
                Some(row) => team_season_from_row(&row)?,
                None => TeamSeasonStats::empty(finalization.season_id, outcome.team_id),
            };
            stats.record(outcome);

            sqlx::query(
                r#"
                INSERT INTO team_season_stats (
                    season_id, team_id, played, wins, draws, losses,
                    goals_for, goals_against, goal_difference, points, last_updated
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW())
                ON CONFLICT (season_id, team_id) DO UPDATE SET
                    played = EXCLUDED.played,
                    wins = EXCLUDED.wins,
                    draws = EXCLUDED.draws,
                    losses = EXCLUDED.losses,
                    goals_for = EXCLUDED.goals_for,
                    goals_against = EXCLUDED.goals_against,
                    goal_difference = EXCLUDED.goal_difference,
                    points = EXCLUDED.points,
                    last_updated = NOW()
                "#,
            )
            .bind(stats.season_id)
            .bind(stats.team_id)
            .bind(stats.played as i32)
            .bind(stats.wins as i32)
            .bind(stats.draws as i32)
            .bind(stats.losses as i32)
            .bind(stats.goals_for as i32)
            .bind(stats.goals_against as i32)
            .bind(stats.goal_difference)
            .bind(stats.points as i32)
            .execute(&mut **tx)
            .await?;
        }

        for contribution in &finalization.players {
            let player_id = contribution.stats.player_id;
            let existing: Option<Json<PlayerSeasonStats>> = sqlx::query_scalar(
                "SELECT stats FROM player_season_stats WHERE season_id = $1 AND player_id = $2 FOR UPDATE",
            )
            .bind(finalization.season_id)
            .bind(player_id)
            .fetch_optional(&mut **tx)
            .await?;

            let mut stats = existing.map(|json| json.0).unwrap_or_else(|| {
                PlayerSeasonStats::empty(finalization.season_id, player_id, contribution.team_id)
            });
            stats.record(contribution);

            sqlx::query(
                r#"
                INSERT INTO player_season_stats (season_id, player_id, stats, last_updated)
                VALUES ($1, $2, $3, NOW())
                ON CONFLICT (season_id, player_id) DO UPDATE SET
                    stats = EXCLUDED.stats,
                    last_updated = NOW()
                "#,
            )
            .bind(finalization.season_id)
            .bind(player_id)
            .bind(Json(&stats))
            .execute(&mut **tx)
            .await?;
        }

        info!(
            "🏆 Folded match {} into season {}: {} {} - {} {}",
            finalization.match_id,
            finalization.season_id,
            finalization.home.team_id,
            finalization.home.goals_for,
            finalization.away.goals_for,
            finalization.away.team_id
        );
        Ok(true)
    }
}

#[async_trait]
impl MatchRepository for PgMatchRepository {
    async fn insert_match(&self, live_match: &LiveMatch) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO live_matches (
                id, season_id, home_team_id, away_team_id, scheduled_start, status,
                home_score, away_score, clock_minute, owner_instance_id, version, last_sequence_no,
                started_at, completed_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(live_match.id)
        .bind(live_match.season_id)
        .bind(live_match.home_team_id)
        .bind(live_match.away_team_id)
        .bind(live_match.scheduled_start)
        .bind(live_match.status.as_str())
        .bind(live_match.home_score as i32)
        .bind(live_match.away_score as i32)
        .bind(live_match.clock_minute as i32)
        .bind(live_match.owner_instance_id.as_deref())
        .bind(live_match.version)
        .bind(live_match.last_sequence_no)
        .bind(live_match.started_at)
        .bind(live_match.completed_at)
        .bind(live_match.created_at)
        .bind(live_match.updated_at)
        .execute(&self.pool)
        .await?;

        info!("Created match {} in season {}", live_match.id, live_match.season_id);
        Ok(())
    }

    async fn fetch_match(&self, match_id: Uuid) -> Result<Option<LiveMatch>, RepositoryError> {
        let query = format!("SELECT {} FROM live_matches WHERE id = $1", MATCH_COLUMNS);
        let row = sqlx::query(&query)
            .bind(match_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(live_match_from_row).transpose()
    }

    async fn claim_match(&self, match_id: Uuid, instance_id: &str) -> Result<LiveMatch, RepositoryError> {
        let query = format!(
            r#"
            UPDATE live_matches
            SET owner_instance_id = $2, version = version + 1, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            MATCH_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(match_id)
            .bind(instance_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::NotFound(match_id))?;

        live_match_from_row(&row)
    }

    async fn append_event(
        &self,
        updated: &LiveMatch,
        event: &MatchEvent,
        stats: &MatchStatsSnapshot,
        expected_version: i64,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        Self::update_match_in_tx(&mut tx, updated, expected_version).await?;

        sqlx::query(
            r#"
            INSERT INTO match_events (
                event_id, match_id, sequence_no, event_type, payload,
                minute, team_id, team_side, player_id, occurred_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(event.event_id)
        .bind(event.match_id)
        .bind(event.sequence_no)
        .bind(event.kind.name())
        .bind(Json(&event.kind))
        .bind(event.minute as i32)
        .bind(event.team_id)
        .bind(event.team_side.as_str())
        .bind(event.player_id)
        .bind(event.timestamp)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO match_stats_snapshots (match_id, last_sequence_no, snapshot, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (match_id) DO UPDATE SET
                last_sequence_no = EXCLUDED.last_sequence_no,
                snapshot = EXCLUDED.snapshot,
                updated_at = NOW()
            "#,
        )
        .bind(stats.match_id)
        .bind(stats.last_sequence_no)
        .bind(Json(stats))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!("Persisted event {} #{} for match {}", event.kind.name(), event.sequence_no, event.match_id);
        Ok(())
    }

    async fn save_transition(
        &self,
        updated: &LiveMatch,
        expected_version: i64,
        finalization: Option<&SeasonFinalization>,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        Self::update_match_in_tx(&mut tx, updated, expected_version).await?;
        if let Some(finalization) = finalization {
            Self::apply_finalization_in_tx(&mut tx, finalization).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn fetch_events(&self, match_id: Uuid) -> Result<Vec<MatchEvent>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, match_id, sequence_no, payload, minute, team_id, team_side, player_id, occurred_at
            FROM match_events
            WHERE match_id = $1
            ORDER BY sequence_no ASC
            "#,
        )
        .bind(match_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(match_event_from_row).collect()
    }

    async fn fetch_stats(&self, match_id: Uuid) -> Result<Option<MatchStatsSnapshot>, RepositoryError> {
        let snapshot: Option<Json<MatchStatsSnapshot>> =
            sqlx::query_scalar("SELECT snapshot FROM match_stats_snapshots WHERE match_id = $1")
                .bind(match_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(snapshot.map(|json| json.0))
    }

    async fn finalize_season(&self, finalization: &SeasonFinalization) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let applied = Self::apply_finalization_in_tx(&mut tx, finalization).await?;
        tx.commit().await?;
        Ok(applied)
    }

    async fn team_season_stats(
        &self,
        season_id: Uuid,
        team_id: Uuid,
    ) -> Result<Option<TeamSeasonStats>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM team_season_stats WHERE season_id = $1 AND team_id = $2")
            .bind(season_id)
            .bind(team_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(team_season_from_row).transpose()
    }

    async fn season_standings(&self, season_id: Uuid) -> Result<Vec<TeamSeasonStats>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM team_season_stats WHERE season_id = $1")
            .bind(season_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(team_season_from_row).collect()
    }

    async fn season_player_stats(&self, season_id: Uuid) -> Result<Vec<PlayerSeasonStats>, RepositoryError> {
        let rows: Vec<Json<PlayerSeasonStats>> =
            sqlx::query_scalar("SELECT stats FROM player_season_stats WHERE season_id = $1")
                .bind(season_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(|json| json.0).collect())
    }
}

fn live_match_from_row(row: &PgRow) -> Result<LiveMatch, RepositoryError> {
    let status: String = row.try_get("status")?;
    Ok(LiveMatch {
        id: row.try_get("id")?,
        season_id: row.try_get("season_id")?,
        home_team_id: row.try_get("home_team_id")?,
        away_team_id: row.try_get("away_team_id")?,
        scheduled_start: row.try_get("scheduled_start")?,
        status: status.parse::<MatchStatus>().map_err(RepositoryError::Corrupt)?,
        home_score: non_negative(row.try_get("home_score")?)?,
        away_score: non_negative(row.try_get("away_score")?)?,
        clock_minute: non_negative(row.try_get("clock_minute")?)? as u16,
        owner_instance_id: row.try_get("owner_instance_id")?,
        version: row.try_get("version")?,
        last_sequence_no: row.try_get("last_sequence_no")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn match_event_from_row(row: &PgRow) -> Result<MatchEvent, RepositoryError> {
    let team_side: String = row.try_get("team_side")?;
    let payload: Json<EventKind> = row.try_get("payload")?;
    Ok(MatchEvent {
        event_id: row.try_get("event_id")?,
        match_id: row.try_get("match_id")?,
        sequence_no: row.try_get("sequence_no")?,
        kind: payload.0,
        minute: non_negative(row.try_get("minute")?)? as u16,
        team_id: row.try_get("team_id")?,
        team_side: team_side.parse::<TeamSide>().map_err(RepositoryError::Corrupt)?,
        player_id: row.try_get("player_id")?,
        timestamp: row.try_get("occurred_at")?,
    })
}

fn team_season_from_row(row: &PgRow) -> Result<TeamSeasonStats, RepositoryError> {
    Ok(TeamSeasonStats {
        season_id: row.try_get("season_id")?,
        team_id: row.try_get("team_id")?,
        played: non_negative(row.try_get("played")?)?,
        wins: non_negative(row.try_get("wins")?)?,
        draws: non_negative(row.try_get("draws")?)?,
        losses: non_negative(row.try_get("losses")?)?,
        goals_for: non_negative(row.try_get("goals_for")?)?,
        goals_against: non_negative(row.try_get("goals_against")?)?,
        goal_difference: row.try_get("goal_difference")?,
        points: non_negative(row.try_get("points")?)?,
    })
}

fn non_negative(value: i32) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| RepositoryError::Corrupt(format!("negative counter {}", value)))
}
