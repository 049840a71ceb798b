use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::cluster::balancer::LoadBalancer;
use crate::cluster::lease::{LeaseManager, LeaseRenewal};
use crate::cluster::metrics::LoadTracker;
use crate::db::match_repository::{MatchRepository, RepositoryError};
use crate::error::LiveMatchError;
use crate::game::stats_calculator::StatsCalculator;
use crate::league::standings::finalization_for;
use crate::league::validation::MatchValidator;
use crate::models::live_match::{LiveMatch, MatchCommand, MatchStatus, NewMatch};
use crate::models::match_events::{EventSubmission, MatchEvent};
use crate::models::match_updates::{EventReceipt, MatchSnapshot, MatchUpdate, StatusChange};
use crate::models::statistics::MatchStatsSnapshot;
use crate::services::broadcaster::Broadcaster;

/// State of a match this instance owns
struct OwnedMatch {
    state: LiveMatch,
    stats: MatchStatsSnapshot,
}

type MatchSlot = Arc<Mutex<Option<OwnedMatch>>>;

/// Authoritative processing for the matches this instance owns.
///
/// Each owned match sits behind its own mutex, so one match is a single
/// pipeline (validate, persist, fold, publish) while different matches
/// proceed in parallel.
pub struct MatchEngine {
    instance_id: String,
    repository: Arc<dyn MatchRepository>,
    leases: Arc<LeaseManager>,
    balancer: Arc<LoadBalancer>,
    broadcaster: Arc<Broadcaster>,
    load: Arc<LoadTracker>,
    validator: MatchValidator,
    slots: Mutex<HashMap<Uuid, MatchSlot>>,
}

impl MatchEngine {
    pub fn new(
        instance_id: impl Into<String>,
        repository: Arc<dyn MatchRepository>,
        leases: Arc<LeaseManager>,
        balancer: Arc<LoadBalancer>,
        broadcaster: Arc<Broadcaster>,
        load: Arc<LoadTracker>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            repository,
            leases,
            balancer,
            broadcaster,
            load,
            validator: MatchValidator::new(),
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub async fn create_match(&self, request: NewMatch) -> Result<LiveMatch, LiveMatchError> {
        self.validator
            .validate_new_match(&request)
            .map_err(LiveMatchError::InvalidEvent)?;

        let live_match = LiveMatch::scheduled(&request);
        self.repository.insert_match(&live_match).await?;
        info!(
            "🗓️ Scheduled match {} ({} vs {}) for {}",
            live_match.id, live_match.home_team_id, live_match.away_team_id, live_match.scheduled_start
        );
        Ok(live_match)
    }

    /// Take ownership of `match_id`: acquire the lease, fence off the
    /// previous owner in storage and rebuild state from the durable log.
    pub async fn claim(&self, match_id: Uuid) -> Result<MatchSnapshot, LiveMatchError> {
        let stored = self
            .repository
            .fetch_match(match_id)
            .await?
            .ok_or(LiveMatchError::MatchNotFound(match_id))?;
        if stored.status.is_terminal() {
            return Err(LiveMatchError::MatchTerminal(match_id));
        }

        if !self.leases.acquire(match_id).await? {
            let owner = self.leases.current_holder(match_id).await.ok().flatten();
            return Err(LiveMatchError::NotOwned { match_id, owner });
        }

        let slot = self.slot(match_id).await;
        let mut guard = slot.lock().await;

        let reloaded = match self.reload(match_id).await {
            Ok(reloaded) => reloaded,
            Err(e) => {
                error!("❌ Failed to reload match {} while claiming: {}", match_id, e);
                *guard = None;
                drop(guard);
                self.drop_slot(match_id).await;
                if let Err(release_err) = self.leases.release(match_id).await {
                    warn!("Failed to release lease for match {}: {}", match_id, release_err);
                }
                return Err(e);
            }
        };

        let snapshot = MatchSnapshot {
            match_state: reloaded.state.clone(),
            stats: reloaded.stats.clone(),
        };
        *guard = Some(reloaded);
        drop(guard);

        if let Err(e) = self.balancer.record_assignment(match_id, &self.instance_id).await {
            warn!("Failed to record assignment of match {}: {}", match_id, e);
        }

        self.broadcaster.publish(&MatchUpdate::OwnershipChanged {
            match_id,
            version: snapshot.version(),
            owner_instance_id: self.instance_id.clone(),
            timestamp: Utc::now(),
        });

        info!(
            "🏟️ Instance {} owns match {} at version {} ({} events)",
            self.instance_id,
            match_id,
            snapshot.version(),
            snapshot.match_state.last_sequence_no
        );
        Ok(snapshot)
    }

    pub async fn submit_event(
        &self,
        match_id: Uuid,
        submission: EventSubmission,
    ) -> Result<EventReceipt, LiveMatchError> {
        let started = Instant::now();
        let result = self.process_event(match_id, submission).await;
        self.record_outcome(started, &result).await;

        if let Err(e) = &result {
            warn!("⛔ Rejected event for match {}: {} ({})", match_id, e, e.reason());
        }
        result
    }

    pub async fn apply_command(
        &self,
        match_id: Uuid,
        command: MatchCommand,
    ) -> Result<StatusChange, LiveMatchError> {
        let started = Instant::now();
        let result = self.process_command(match_id, command).await;
        self.record_outcome(started, &result).await;

        if let Err(e) = &result {
            warn!("⛔ Rejected {} for match {}: {} ({})", command, match_id, e, e.reason());
        }
        result
    }

    pub async fn start(&self, match_id: Uuid) -> Result<StatusChange, LiveMatchError> {
        self.apply_command(match_id, MatchCommand::Start).await
    }

    pub async fn pause(&self, match_id: Uuid) -> Result<StatusChange, LiveMatchError> {
        self.apply_command(match_id, MatchCommand::Pause).await
    }

    pub async fn resume(&self, match_id: Uuid) -> Result<StatusChange, LiveMatchError> {
        self.apply_command(match_id, MatchCommand::Resume).await
    }

    pub async fn end(&self, match_id: Uuid) -> Result<StatusChange, LiveMatchError> {
        self.apply_command(match_id, MatchCommand::End).await
    }

    pub async fn cancel(&self, match_id: Uuid) -> Result<StatusChange, LiveMatchError> {
        self.apply_command(match_id, MatchCommand::Cancel).await
    }

    /// Fold a completed match into its season. Safe to call any number of
    /// times from any instance; returns whether this call applied it.
    pub async fn finalize_season(&self, match_id: Uuid) -> Result<bool, LiveMatchError> {
        let live_match = self
            .repository
            .fetch_match(match_id)
            .await?
            .ok_or(LiveMatchError::MatchNotFound(match_id))?;

        if live_match.status != MatchStatus::Completed {
            return Err(LiveMatchError::InvalidTransition(format!(
                "match {} is {}; only completed matches count towards the season",
                match_id, live_match.status
            )));
        }

        let stats = match self.repository.fetch_stats(match_id).await? {
            Some(stats) => stats,
            None => {
                let events = self.repository.fetch_events(match_id).await?;
                StatsCalculator::replay(match_id, &events)
                    .map_err(|e| LiveMatchError::Durability(RepositoryError::Corrupt(e.to_string())))?
            }
        };

        let applied = self
            .repository
            .finalize_season(&finalization_for(&live_match, &stats))
            .await?;
        if applied {
            info!("🏆 Match {} folded into season {}", match_id, live_match.season_id);
        } else {
            info!("Match {} was already part of season {}", match_id, live_match.season_id);
        }
        Ok(applied)
    }

    /// Renew held leases and drop local state for any that were lost.
    pub async fn maintain_leases(&self) -> LeaseRenewal {
        let renewal = self.leases.renew_all().await;
        for match_id in &renewal.lost {
            warn!("🚫 Lost lease for match {}; refusing further writes", match_id);
            self.drop_slot(*match_id).await;
        }
        renewal
    }

    /// Give up every owned match, as on shutdown.
    pub async fn release_all(&self) -> Vec<Uuid> {
        let owned = self.owned_matches().await;
        for match_id in &owned {
            self.drop_slot(*match_id).await;
        }
        self.leases.release_all().await
    }

    pub async fn local_snapshot(&self, match_id: Uuid) -> Option<MatchSnapshot> {
        let slot = self.slots.lock().await.get(&match_id).cloned()?;
        let guard = slot.lock().await;
        guard.as_ref().map(|owned| MatchSnapshot {
            match_state: owned.state.clone(),
            stats: owned.stats.clone(),
        })
    }

    pub async fn owned_matches(&self) -> Vec<Uuid> {
        let mut owned: Vec<Uuid> = self.slots.lock().await.keys().copied().collect();
        owned.sort();
        owned
    }

    async fn process_event(
        &self,
        match_id: Uuid,
        submission: EventSubmission,
    ) -> Result<EventReceipt, LiveMatchError> {
        let Some(slot) = self.existing_slot(match_id).await else {
            return Err(self.not_owned(match_id).await);
        };
        let mut guard = slot.lock().await;
        let Some(owned) = guard.as_mut() else {
            return Err(self.not_owned(match_id).await);
        };

        if !self.leases.is_held(match_id).await {
            *guard = None;
            drop(guard);
            self.drop_slot(match_id).await;
            // An expired entry must not be renewed back to life without its state
            self.leases.forget(match_id).await;
            return Err(LiveMatchError::LeaseLost { match_id });
        }

        let status = owned.state.status;
        if status.is_terminal() {
            return Err(LiveMatchError::MatchTerminal(match_id));
        }
        if !status.accepts_events() {
            return Err(LiveMatchError::InvalidTransition(format!(
                "match {} is {}; events are accepted once it has started",
                match_id, status
            )));
        }

        let team_side = self
            .validator
            .validate_submission(&owned.state, &submission)
            .map_err(LiveMatchError::InvalidEvent)?;

        let event = MatchEvent {
            event_id: Uuid::new_v4(),
            match_id,
            sequence_no: owned.state.last_sequence_no + 1,
            kind: submission.kind,
            minute: submission.minute,
            team_id: submission.team_id,
            team_side,
            player_id: submission.player_id,
            timestamp: Utc::now(),
        };

        let stats = StatsCalculator::apply_event(&owned.stats, &event)
            .map_err(|e| LiveMatchError::InvalidEvent(e.to_string()))?;
        let updated = owned.state.with_event(&event, StatsCalculator::score(&stats));

        // Durable before acknowledged; nothing local changes unless this succeeds
        if let Err(e) = self
            .repository
            .append_event(&updated, &event, &stats, owned.state.version)
            .await
        {
            return Err(self.persistence_failure(match_id, guard, e).await);
        }

        let player_stats = StatsCalculator::affected_players(&event)
            .into_iter()
            .filter_map(|player_id| stats.player(player_id).cloned())
            .collect();

        self.broadcaster.publish(&MatchUpdate::MatchEvent {
            match_id,
            version: updated.version,
            event: event.clone(),
            score: updated.score(),
            clock_minute: updated.clock_minute,
            home_stats: stats.home.clone(),
            away_stats: stats.away.clone(),
            player_stats,
        });

        info!(
            "⚽ Match {} accepted {} #{} (minute {}), score {}-{}, version {}",
            match_id,
            event.kind.name(),
            event.sequence_no,
            event.minute,
            updated.home_score,
            updated.away_score,
            updated.version
        );

        let receipt = EventReceipt {
            match_id,
            sequence_no: event.sequence_no,
            version: updated.version,
            event,
        };
        owned.state = updated;
        owned.stats = stats;
        Ok(receipt)
    }

    async fn process_command(
        &self,
        match_id: Uuid,
        command: MatchCommand,
    ) -> Result<StatusChange, LiveMatchError> {
        let Some(slot) = self.existing_slot(match_id).await else {
            return Err(self.not_owned(match_id).await);
        };
        let mut guard = slot.lock().await;
        let Some(owned) = guard.as_mut() else {
            return Err(self.not_owned(match_id).await);
        };

        if !self.leases.is_held(match_id).await {
            *guard = None;
            drop(guard);
            self.drop_slot(match_id).await;
            // An expired entry must not be renewed back to life without its state
            self.leases.forget(match_id).await;
            return Err(LiveMatchError::LeaseLost { match_id });
        }

        let previous_status = owned.state.status;
        let Some(new_status) = command.target_from(previous_status) else {
            if previous_status.is_terminal() {
                return Err(LiveMatchError::MatchTerminal(match_id));
            }
            return Err(LiveMatchError::InvalidTransition(format!(
                "cannot {} a match that is {}",
                command, previous_status
            )));
        };

        let now = Utc::now();
        let updated = owned.state.with_status(new_status, now);
        let finalization =
            (new_status == MatchStatus::Completed).then(|| finalization_for(&updated, &owned.stats));

        if let Err(e) = self
            .repository
            .save_transition(&updated, owned.state.version, finalization.as_ref())
            .await
        {
            return Err(self.persistence_failure(match_id, guard, e).await);
        }

        self.broadcaster.publish(&MatchUpdate::StatusChanged {
            match_id,
            version: updated.version,
            previous_status,
            new_status,
            score: updated.score(),
            clock_minute: updated.clock_minute,
            timestamp: now,
        });

        info!(
            "🔔 Match {} {} -> {} (version {})",
            match_id, previous_status, new_status, updated.version
        );

        let change = StatusChange {
            match_id,
            previous_status,
            new_status,
            version: updated.version,
            timestamp: now,
        };
        owned.state = updated;

        if new_status.is_terminal() {
            if finalization.is_some() {
                info!("🏆 Match {} folded into its season", match_id);
            }
            *guard = None;
            drop(guard);
            self.retire(match_id).await;
        }
        Ok(change)
    }

    /// Claim-time reload: durable state is the only source, and the stored
    /// snapshot is checked against a replay of the log.
    async fn reload(&self, match_id: Uuid) -> Result<OwnedMatch, LiveMatchError> {
        let state = self.repository.claim_match(match_id, &self.instance_id).await.map_err(|e| match e {
            RepositoryError::NotFound(id) => LiveMatchError::MatchNotFound(id),
            other => LiveMatchError::Durability(other),
        })?;
        let events = self.repository.fetch_events(match_id).await?;
        let stored = self.repository.fetch_stats(match_id).await?;

        let replayed = StatsCalculator::replay(match_id, &events)
            .map_err(|e| LiveMatchError::Durability(RepositoryError::Corrupt(e.to_string())))?;

        if replayed.last_sequence_no != state.last_sequence_no {
            return Err(LiveMatchError::Durability(RepositoryError::Corrupt(format!(
                "match {} records sequence {} but its log ends at {}",
                match_id, state.last_sequence_no, replayed.last_sequence_no
            ))));
        }
        if stored.as_ref().is_some_and(|stored| *stored != replayed) {
            warn!("⚠️ Stored statistics for match {} differ from a replay of its log; using the replay", match_id);
        }

        Ok(OwnedMatch { state, stats: replayed })
    }

    /// Map a failed write. A version conflict means someone else claimed the
    /// match, so local ownership ends; anything else leaves state untouched
    /// for the caller to retry.
    async fn persistence_failure(
        &self,
        match_id: Uuid,
        mut guard: tokio::sync::MutexGuard<'_, Option<OwnedMatch>>,
        error: RepositoryError,
    ) -> LiveMatchError {
        match error {
            RepositoryError::VersionConflict { .. } => {
                warn!("🚫 Match {} was claimed elsewhere; dropping local ownership", match_id);
                *guard = None;
                drop(guard);
                self.drop_slot(match_id).await;
                self.leases.forget(match_id).await;
                LiveMatchError::LeaseLost { match_id }
            }
            other => {
                error!("❌ Failed to persist mutation for match {}: {}", match_id, other);
                LiveMatchError::Durability(other)
            }
        }
    }

    /// Release everything a finished match held.
    async fn retire(&self, match_id: Uuid) {
        self.drop_slot(match_id).await;
        if let Err(e) = self.leases.release(match_id).await {
            warn!("Failed to release lease for finished match {}: {}", match_id, e);
        }
        if let Err(e) = self.balancer.clear_assignment(match_id).await {
            warn!("Failed to clear assignment for finished match {}: {}", match_id, e);
        }
    }

    /// Work out why we cannot serve `match_id` and point at the owner if any.
    async fn not_owned(&self, match_id: Uuid) -> LiveMatchError {
        match self.repository.fetch_match(match_id).await {
            Ok(None) => return LiveMatchError::MatchNotFound(match_id),
            Ok(Some(stored)) if stored.status.is_terminal() => return LiveMatchError::MatchTerminal(match_id),
            Ok(Some(_)) => {}
            Err(e) => warn!("Could not load match {} to explain a rejection: {}", match_id, e),
        }

        let owner = match self.leases.current_holder(match_id).await {
            Ok(owner) => owner,
            Err(e) => {
                warn!("Could not look up the owner of match {}: {}", match_id, e);
                None
            }
        };
        LiveMatchError::NotOwned { match_id, owner }
    }

    async fn record_outcome<T>(&self, started: Instant, result: &Result<T, LiveMatchError>) {
        let failed = matches!(result, Err(e) if e.is_server_error());
        self.load.record(started.elapsed(), failed).await;
    }

    async fn slot(&self, match_id: Uuid) -> MatchSlot {
        self.slots
            .lock()
            .await
            .entry(match_id)
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    async fn existing_slot(&self, match_id: Uuid) -> Option<MatchSlot> {
        self.slots.lock().await.get(&match_id).cloned()
    }

    async fn drop_slot(&self, match_id: Uuid) {
        self.slots.lock().await.remove(&match_id);
    }
}
