use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cluster::metrics::LoadTracker;
use crate::cluster::store::{MessageStream, SharedStateStore, StoreError};
use crate::error::LiveMatchError;
use crate::models::match_updates::{match_topic, MatchSnapshot, MatchUpdate};
use crate::services::match_queries::MatchQueryService;

const BUS_SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewerRole {
    #[default]
    Spectator,
    TeamMember,
    Official,
}

impl fmt::Display for ViewerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ViewerRole::Spectator => "spectator",
            ViewerRole::TeamMember => "team_member",
            ViewerRole::Official => "official",
        };
        f.write_str(name)
    }
}

impl FromStr for ViewerRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spectator" => Ok(ViewerRole::Spectator),
            "team_member" => Ok(ViewerRole::TeamMember),
            "official" => Ok(ViewerRole::Official),
            other => Err(format!("unknown viewer role '{}'", other)),
        }
    }
}

/// Ephemeral record of one viewer watching one match on this instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerSubscription {
    pub connection_id: Uuid,
    pub match_id: Uuid,
    pub role: ViewerRole,
    pub instance_id: String,
    pub joined_at: DateTime<Utc>,
}

struct Viewer {
    subscription: ViewerSubscription,
    last_seen: Instant,
    evict: Option<oneshot::Sender<()>>,
}

/// Local fan-out point for one match: the bus subscription relayed into a
/// broadcast channel that every local viewer reads from.
struct MatchFeed {
    feed_id: Uuid,
    sender: broadcast::Sender<String>,
    relay: JoinHandle<()>,
    viewers: HashMap<Uuid, Viewer>,
}

impl MatchFeed {
    fn attach(
        &mut self,
        subscription: &ViewerSubscription,
        evict: &mut Option<oneshot::Sender<()>>,
    ) -> broadcast::Receiver<String> {
        self.viewers.insert(
            subscription.connection_id,
            Viewer {
                subscription: subscription.clone(),
                last_seen: Instant::now(),
                evict: evict.take(),
            },
        );
        self.sender.subscribe()
    }
}

enum PublishCommand {
    Publish { channel: String, payload: String },
    Flush(oneshot::Sender<()>),
}

/// Everything a viewer needs after joining: the snapshot comes first, then
/// every payload from `receiver` verbatim.
pub struct LiveFeed {
    pub subscription: ViewerSubscription,
    pub snapshot: MatchSnapshot,
    pub receiver: broadcast::Receiver<String>,
    /// Fires when the viewer is dropped for idling.
    pub evicted: oneshot::Receiver<()>,
    pub unsubscribe: Unsubscribe,
}

/// Handle that ends a subscription
pub struct Unsubscribe {
    broadcaster: Arc<Broadcaster>,
    match_id: Uuid,
    connection_id: Uuid,
}

impl Unsubscribe {
    pub async fn unsubscribe(self) {
        self.broadcaster.unsubscribe(self.match_id, self.connection_id).await;
    }
}

pub struct Broadcaster {
    instance_id: String,
    store: Arc<dyn SharedStateStore>,
    load: Arc<LoadTracker>,
    publisher: mpsc::UnboundedSender<PublishCommand>,
    feeds: Mutex<HashMap<Uuid, MatchFeed>>,
    channel_capacity: usize,
    idle_timeout: Duration,
}

impl Broadcaster {
    /// Must be called inside a tokio runtime: it starts the publisher task.
    pub fn new(
        instance_id: impl Into<String>,
        store: Arc<dyn SharedStateStore>,
        load: Arc<LoadTracker>,
        channel_capacity: usize,
        idle_timeout: Duration,
    ) -> Arc<Self> {
        let (publisher, queue) = mpsc::unbounded_channel();
        tokio::spawn(run_publisher(store.clone(), queue));

        Arc::new(Self {
            instance_id: instance_id.into(),
            store,
            load,
            publisher,
            feeds: Mutex::new(HashMap::new()),
            channel_capacity,
            idle_timeout,
        })
    }

    /// Queue `update` for its match topic. Never blocks the caller; updates
    /// reach the bus in the order they were queued.
    pub fn publish(&self, update: &MatchUpdate) {
        let payload = match serde_json::to_string(update) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to serialize update for match {}: {}", update.match_id(), e);
                return;
            }
        };

        let command = PublishCommand::Publish {
            channel: match_topic(update.match_id()),
            payload,
        };
        if self.publisher.send(command).is_err() {
            error!("Publisher has stopped; dropping update for match {}", update.match_id());
        }
    }

    /// Resolves once everything queued before the call has been handed to the bus.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.publisher.send(PublishCommand::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }

    /// Join `match_id`. The bus subscription is live before the snapshot is
    /// read, so no update can fall between the two; updates the snapshot
    /// already covers are recognised by their version.
    pub async fn subscribe(
        self: &Arc<Self>,
        match_id: Uuid,
        role: ViewerRole,
        queries: &MatchQueryService,
    ) -> Result<LiveFeed, LiveMatchError> {
        let subscription = ViewerSubscription {
            connection_id: Uuid::new_v4(),
            match_id,
            role,
            instance_id: self.instance_id.clone(),
            joined_at: Utc::now(),
        };
        let (evict, evicted) = oneshot::channel();
        let mut evict = Some(evict);

        let existing = {
            let mut feeds = self.feeds.lock().await;
            feeds
                .get_mut(&match_id)
                .map(|feed| feed.attach(&subscription, &mut evict))
        };

        let receiver = match existing {
            Some(receiver) => receiver,
            None => {
                // Opening the bus subscription is a network round trip; keep it off the lock
                let topic = match_topic(match_id);
                let stream = timeout(BUS_SUBSCRIBE_TIMEOUT, self.store.subscribe(&topic))
                    .await
                    .map_err(|_| StoreError::Timeout(BUS_SUBSCRIBE_TIMEOUT))??;

                let mut feeds = self.feeds.lock().await;
                let feed = match feeds.entry(match_id) {
                    // Another joiner got there first; its subscription serves us too
                    Entry::Occupied(entry) => entry.into_mut(),
                    Entry::Vacant(entry) => {
                        let feed_id = Uuid::new_v4();
                        let (sender, _) = broadcast::channel(self.channel_capacity);
                        let relay = tokio::spawn(relay(
                            Arc::downgrade(self),
                            match_id,
                            feed_id,
                            stream,
                            sender.clone(),
                        ));
                        info!("📡 Instance {} now relays match {}", self.instance_id, match_id);
                        entry.insert(MatchFeed {
                            feed_id,
                            sender,
                            relay,
                            viewers: HashMap::new(),
                        })
                    }
                };
                feed.attach(&subscription, &mut evict)
            }
        };
        self.load.connection_opened();

        let snapshot = match queries.get_snapshot(match_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.unsubscribe(match_id, subscription.connection_id).await;
                return Err(e);
            }
        };

        info!(
            "👀 Viewer {} joined match {} as {} at version {}",
            subscription.connection_id,
            match_id,
            role,
            snapshot.version()
        );

        Ok(LiveFeed {
            unsubscribe: Unsubscribe {
                broadcaster: Arc::clone(self),
                match_id,
                connection_id: subscription.connection_id,
            },
            subscription,
            snapshot,
            receiver,
            evicted,
        })
    }

    /// Remove a viewer. The bus subscription for the match goes with the
    /// last local viewer.
    pub async fn unsubscribe(&self, match_id: Uuid, connection_id: Uuid) {
        let mut feeds = self.feeds.lock().await;
        let Some(feed) = feeds.get_mut(&match_id) else {
            return;
        };

        if feed.viewers.remove(&connection_id).is_some() {
            self.load.connection_closed();
            debug!("Viewer {} left match {}", connection_id, match_id);
        }

        if feed.viewers.is_empty() {
            if let Some(feed) = feeds.remove(&match_id) {
                feed.relay.abort();
                info!("📴 Instance {} stopped relaying match {}", self.instance_id, match_id);
            }
        }
    }

    /// Record activity from a viewer so the idle sweep spares it.
    pub async fn touch(&self, match_id: Uuid, connection_id: Uuid) {
        if let Some(viewer) = self
            .feeds
            .lock()
            .await
            .get_mut(&match_id)
            .and_then(|feed| feed.viewers.get_mut(&connection_id))
        {
            viewer.last_seen = Instant::now();
        }
    }

    /// Tear down a feed whose bus subscription ended. Dropping the sender
    /// closes every local receiver, so viewers disconnect and rejoin with a
    /// fresh snapshot instead of waiting on a dead feed.
    async fn close_feed(&self, match_id: Uuid, feed_id: Uuid) {
        let mut feeds = self.feeds.lock().await;
        if !feeds.get(&match_id).is_some_and(|feed| feed.feed_id == feed_id) {
            return;
        }
        if let Some(feed) = feeds.remove(&match_id) {
            for _ in 0..feed.viewers.len() {
                self.load.connection_closed();
            }
            warn!(
                "🔌 Bus subscription for match {} ended; closing {} local viewer(s)",
                match_id,
                feed.viewers.len()
            );
        }
    }

    /// Drop viewers idle for longer than the timeout. Returns their connection ids.
    pub async fn sweep_idle(&self) -> Vec<Uuid> {
        let now = Instant::now();
        let mut evicted = Vec::new();
        let mut feeds = self.feeds.lock().await;

        for feed in feeds.values_mut() {
            let idle: Vec<Uuid> = feed
                .viewers
                .iter()
                .filter(|(_, viewer)| now.duration_since(viewer.last_seen) > self.idle_timeout)
                .map(|(connection_id, _)| *connection_id)
                .collect();

            for connection_id in idle {
                if let Some(mut viewer) = feed.viewers.remove(&connection_id) {
                    if let Some(evict) = viewer.evict.take() {
                        let _ = evict.send(());
                    }
                    self.load.connection_closed();
                    evicted.push(connection_id);
                }
            }
        }

        feeds.retain(|match_id, feed| {
            if feed.viewers.is_empty() {
                feed.relay.abort();
                debug!("Stopped relaying idle match {}", match_id);
                false
            } else {
                true
            }
        });

        if !evicted.is_empty() {
            info!("🧹 Dropped {} idle viewer(s)", evicted.len());
        }
        evicted
    }

    pub async fn connection_count(&self) -> usize {
        self.feeds
            .lock()
            .await
            .values()
            .map(|feed| feed.viewers.len())
            .sum()
    }

    pub async fn watched_matches(&self) -> Vec<Uuid> {
        let mut matches: Vec<Uuid> = self.feeds.lock().await.keys().copied().collect();
        matches.sort();
        matches
    }

    pub async fn viewers(&self, match_id: Uuid) -> Vec<ViewerSubscription> {
        self.feeds
            .lock()
            .await
            .get(&match_id)
            .map(|feed| {
                feed.viewers
                    .values()
                    .map(|viewer| viewer.subscription.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

async fn run_publisher(store: Arc<dyn SharedStateStore>, mut queue: mpsc::UnboundedReceiver<PublishCommand>) {
    while let Some(command) = queue.recv().await {
        match command {
            PublishCommand::Publish { channel, payload } => {
                // Delivery errors are logged only; viewers recover through a fresh snapshot
                if let Err(e) = store.publish(&channel, &payload).await {
                    warn!("⚠️ Failed to publish on {}: {}", channel, e);
                }
            }
            PublishCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Publisher queue closed");
}

async fn relay(
    broadcaster: Weak<Broadcaster>,
    match_id: Uuid,
    feed_id: Uuid,
    mut stream: MessageStream,
    sender: broadcast::Sender<String>,
) {
    while let Some(payload) = stream.next().await {
        // No local receivers is fine; viewers may be between joins
        let _ = sender.send(payload);
    }
    drop(sender);
    if let Some(broadcaster) = broadcaster.upgrade() {
        broadcaster.close_feed(match_id, feed_id).await;
    }
}
