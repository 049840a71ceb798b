use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use uuid::Uuid;

use matchday_live::cluster::health::HealthThresholds;
use matchday_live::cluster::registry::{InstanceMetrics, InstanceRecord, InstanceStatus};
use matchday_live::cluster::{ClusterNode, InMemoryStateStore, NodeConfig};
use matchday_live::db::match_repository::{MatchRepository, RepositoryError};
use matchday_live::db::InMemoryMatchRepository;
use matchday_live::league::standings::SeasonFinalization;
use matchday_live::models::live_match::{LiveMatch, NewMatch};
use matchday_live::models::match_events::{EventKind, EventSubmission, MatchEvent};
use matchday_live::models::statistics::{MatchStatsSnapshot, PlayerSeasonStats, TeamSeasonStats};

/// Defaults, except that host CPU and memory never degrade a test instance.
pub fn test_config(instance_id: &str) -> NodeConfig {
    let mut config = NodeConfig::for_instance(instance_id);
    config.thresholds = HealthThresholds {
        max_cpu_percent: 100.0,
        max_memory_percent: 100.0,
        ..HealthThresholds::default()
    };
    config
}

pub fn spawn_node(
    store: Arc<InMemoryStateStore>,
    repository: Arc<dyn MatchRepository>,
    instance_id: &str,
) -> Arc<ClusterNode> {
    ClusterNode::new(test_config(instance_id), store, repository)
}

/// Two teams of one season with one player each.
#[derive(Debug, Clone, Copy)]
pub struct Fixture {
    pub season_id: Uuid,
    pub home_team_id: Uuid,
    pub away_team_id: Uuid,
    pub home_player: Uuid,
    pub away_player: Uuid,
}

impl Fixture {
    pub fn new() -> Self {
        Self::in_season(Uuid::new_v4())
    }

    pub fn in_season(season_id: Uuid) -> Self {
        Self {
            season_id,
            home_team_id: Uuid::new_v4(),
            away_team_id: Uuid::new_v4(),
            home_player: Uuid::new_v4(),
            away_player: Uuid::new_v4(),
        }
    }

    /// Same season, home and away swapped
    pub fn reversed(&self) -> Self {
        Self {
            season_id: self.season_id,
            home_team_id: self.away_team_id,
            away_team_id: self.home_team_id,
            home_player: self.away_player,
            away_player: self.home_player,
        }
    }

    pub fn new_match(&self) -> NewMatch {
        NewMatch {
            season_id: self.season_id,
            home_team_id: self.home_team_id,
            away_team_id: self.away_team_id,
            scheduled_start: Utc::now() + ChronoDuration::hours(1),
        }
    }

    pub fn home_goal(&self, minute: u16) -> EventSubmission {
        submission(EventKind::Goal { penalty: false }, self.home_team_id, Some(self.home_player), minute)
    }

    pub fn away_goal(&self, minute: u16) -> EventSubmission {
        submission(EventKind::Goal { penalty: false }, self.away_team_id, Some(self.away_player), minute)
    }
}

pub fn submission(kind: EventKind, team_id: Uuid, player_id: Option<Uuid>, minute: u16) -> EventSubmission {
    EventSubmission {
        kind,
        minute,
        team_id,
        player_id,
    }
}

/// Schedule, claim and kick off a match on `node`.
pub async fn start_match(node: &ClusterNode, fixture: &Fixture) -> LiveMatch {
    let live_match = node
        .engine
        .create_match(fixture.new_match())
        .await
        .expect("Failed to schedule match");
    node.engine.claim(live_match.id).await.expect("Failed to claim match");
    node.engine.start(live_match.id).await.expect("Failed to start match");
    live_match
}

/// Registry entry with the given load
pub fn instance_record(instance_id: &str, connections: usize, owned_matches: usize) -> InstanceRecord {
    InstanceRecord {
        instance_id: instance_id.to_string(),
        address: format!("http://{}", instance_id),
        status: InstanceStatus::Healthy,
        degraded_reasons: Vec::new(),
        metrics: InstanceMetrics {
            connections,
            max_connections: 1000,
            owned_matches,
            ..InstanceMetrics::default()
        },
        owned_matches: Vec::new(),
        started_at: Utc::now(),
        last_heartbeat: Utc::now(),
    }
}

/// In-memory repository whose writes can be switched to fail, as if the
/// database went away.
#[derive(Default)]
pub struct FlakyRepository {
    inner: InMemoryMatchRepository,
    fail_writes: AtomicBool,
}

impl FlakyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), RepositoryError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("database is down".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl MatchRepository for FlakyRepository {
    async fn insert_match(&self, live_match: &LiveMatch) -> Result<(), RepositoryError> {
        self.check()?;
        self.inner.insert_match(live_match).await
    }

    async fn fetch_match(&self, match_id: Uuid) -> Result<Option<LiveMatch>, RepositoryError> {
        self.inner.fetch_match(match_id).await
    }

    async fn claim_match(&self, match_id: Uuid, instance_id: &str) -> Result<LiveMatch, RepositoryError> {
        self.check()?;
        self.inner.claim_match(match_id, instance_id).await
    }

    async fn append_event(
        &self,
        updated: &LiveMatch,
        event: &MatchEvent,
        stats: &MatchStatsSnapshot,
        expected_version: i64,
    ) -> Result<(), RepositoryError> {
        self.check()?;
        self.inner.append_event(updated, event, stats, expected_version).await
    }

    async fn save_transition(
        &self,
        updated: &LiveMatch,
        expected_version: i64,
        finalization: Option<&SeasonFinalization>,
    ) -> Result<(), RepositoryError> {
        self.check()?;
        self.inner.save_transition(updated, expected_version, finalization).await
    }

    async fn fetch_events(&self, match_id: Uuid) -> Result<Vec<MatchEvent>, RepositoryError> {
        self.inner.fetch_events(match_id).await
    }

    async fn fetch_stats(&self, match_id: Uuid) -> Result<Option<MatchStatsSnapshot>, RepositoryError> {
        self.inner.fetch_stats(match_id).await
    }

    async fn finalize_season(&self, finalization: &SeasonFinalization) -> Result<bool, RepositoryError> {
        self.check()?;
        self.inner.finalize_season(finalization).await
    }

    async fn team_season_stats(
        &self,
        season_id: Uuid,
        team_id: Uuid,
    ) -> Result<Option<TeamSeasonStats>, RepositoryError> {
        self.inner.team_season_stats(season_id, team_id).await
    }

    async fn season_standings(&self, season_id: Uuid) -> Result<Vec<TeamSeasonStats>, RepositoryError> {
        self.inner.season_standings(season_id).await
    }

    async fn season_player_stats(&self, season_id: Uuid) -> Result<Vec<PlayerSeasonStats>, RepositoryError> {
        self.inner.season_player_stats(season_id).await
    }
}
