use crate::game::reorder::ReorderBuffer;
use crate::models::live_match::MatchStatus;
use crate::models::match_updates::{MatchSnapshot, MatchUpdate};
use crate::websocket::messages::{InboundMessage, ViewerMessage};

/// What happened to one delivered message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewOutcome {
    /// Applied together with this many buffered successors
    Applied { released: usize },
    /// Already reflected in the view
    Duplicate,
    /// Ahead of the view; held until the gap closes
    Buffered,
    /// Nothing to apply to yet; the viewer needs a snapshot first
    AwaitingSnapshot,
    /// A full snapshot replaced the view
    Reset,
    /// Message for a different match, ignored
    Ignored,
}

/// Viewer-side copy of one match, kept consistent under at-least-once,
/// possibly reordered delivery. Every mutation carries the match version,
/// so updates apply in version order and repeats are dropped.
#[derive(Debug, Clone)]
pub struct ClientMatchView {
    snapshot: Option<MatchSnapshot>,
    pending: ReorderBuffer<MatchUpdate>,
}

impl Default for ClientMatchView {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientMatchView {
    pub fn new() -> Self {
        Self {
            snapshot: None,
            pending: ReorderBuffer::new(0),
        }
    }

    pub fn snapshot(&self) -> Option<&MatchSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn version(&self) -> Option<i64> {
        self.snapshot.as_ref().map(MatchSnapshot::version)
    }

    /// True while updates are stuck behind a missing version. Reconnecting
    /// yields a fresh snapshot.
    pub fn needs_resync(&self) -> bool {
        self.pending.has_gap()
    }

    /// Replace the view with `snapshot` unless the view is already newer.
    pub fn apply_snapshot(&mut self, snapshot: MatchSnapshot) -> ViewOutcome {
        if let Some(current) = &self.snapshot {
            if current.match_state.id != snapshot.match_state.id {
                return ViewOutcome::Ignored;
            }
            if current.version() >= snapshot.version() {
                return ViewOutcome::Duplicate;
            }
        }

        let version = snapshot.version();
        let early = self.pending.take_pending();
        self.snapshot = Some(snapshot);
        self.pending.reset(version);

        // Updates that arrived ahead of the snapshot may fit on top of it
        for update in early {
            self.apply_update(update);
        }
        ViewOutcome::Reset
    }

    pub fn apply_update(&mut self, update: MatchUpdate) -> ViewOutcome {
        let Some(snapshot) = &self.snapshot else {
            return ViewOutcome::AwaitingSnapshot;
        };
        if snapshot.match_state.id != update.match_id() {
            return ViewOutcome::Ignored;
        }

        let version = update.version();
        if version <= self.pending.last_applied() {
            return ViewOutcome::Duplicate;
        }

        let ready = self.pending.push(version, update);
        if ready.is_empty() {
            return ViewOutcome::Buffered;
        }

        let released = ready.len();
        for update in ready {
            self.fold(update);
        }
        ViewOutcome::Applied { released }
    }

    /// Apply one raw socket payload.
    pub fn apply_payload(&mut self, payload: &str) -> Result<ViewOutcome, serde_json::Error> {
        Ok(match InboundMessage::parse(payload)? {
            InboundMessage::Viewer(ViewerMessage::MatchSnapshot { snapshot, .. }) => self.apply_snapshot(snapshot),
            InboundMessage::Viewer(ViewerMessage::SubscriptionError { .. }) => ViewOutcome::Ignored,
            InboundMessage::Update(update) => self.apply_update(update),
        })
    }

    fn fold(&mut self, update: MatchUpdate) {
        let Some(snapshot) = self.snapshot.as_mut() else {
            return;
        };
        let state = &mut snapshot.match_state;

        match update {
            MatchUpdate::MatchEvent {
                version,
                event,
                score,
                clock_minute,
                home_stats,
                away_stats,
                player_stats,
                ..
            } => {
                state.version = version;
                state.last_sequence_no = event.sequence_no;
                state.home_score = score.home;
                state.away_score = score.away;
                state.clock_minute = clock_minute;
                state.updated_at = event.timestamp;

                let stats = &mut snapshot.stats;
                stats.last_sequence_no = event.sequence_no;
                stats.home = home_stats;
                stats.away = away_stats;
                for player in player_stats {
                    stats.players.insert(player.player_id, player);
                }
            }
            MatchUpdate::StatusChanged {
                version,
                new_status,
                score,
                clock_minute,
                timestamp,
                ..
            } => {
                state.version = version;
                state.status = new_status;
                state.home_score = score.home;
                state.away_score = score.away;
                state.clock_minute = clock_minute;
                state.updated_at = timestamp;
                match new_status {
                    MatchStatus::InProgress if state.started_at.is_none() => state.started_at = Some(timestamp),
                    MatchStatus::Completed | MatchStatus::Cancelled => state.completed_at = Some(timestamp),
                    _ => {}
                }
            }
            MatchUpdate::OwnershipChanged {
                version,
                owner_instance_id,
                timestamp,
                ..
            } => {
                state.version = version;
                state.owner_instance_id = Some(owner_instance_id);
                state.updated_at = timestamp;
            }
        }
    }
}
