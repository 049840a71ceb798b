use std::sync::Arc;
use std::time::Instant;

use actix::{Actor, ActorContext, Addr, AsyncContext, Handler, StreamHandler};
use actix_web::web;
use actix_web_actors::ws;
use chrono::Utc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::cluster::node::ClusterNode;
use crate::error::LiveMatchError;
use crate::services::broadcaster::{LiveFeed, ViewerRole};
use crate::websocket::messages::{SnapshotReason, ViewerMessage};

use super::messages::{Disconnect, Joined, Outbound};

/// One viewer socket watching one match
pub struct MatchViewerConnection {
    heartbeat: Instant,
    match_id: Uuid,
    role: ViewerRole,
    session_id: Uuid,
    connection_id: Option<Uuid>,
    node: web::Data<ClusterNode>,
    // Dropped with the actor, which tells the feed task to unsubscribe
    closed: Option<oneshot::Sender<()>>,
    closed_rx: Option<oneshot::Receiver<()>>,
}

impl Actor for MatchViewerConnection {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!("🔗 Viewer session {} opened for match {} as {}",
            self.session_id, self.match_id, self.role);

        self.heartbeat(ctx);
        self.join(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.closed.take();
        tracing::info!("❌ Viewer session {} closed for match {}", self.session_id, self.match_id);
    }
}

impl MatchViewerConnection {
    pub fn new(match_id: Uuid, role: ViewerRole, node: web::Data<ClusterNode>) -> Self {
        let (closed, closed_rx) = oneshot::channel();
        Self {
            heartbeat: Instant::now(),
            match_id,
            role,
            session_id: Uuid::new_v4(),
            connection_id: None,
            node,
            closed: Some(closed),
            closed_rx: Some(closed_rx),
        }
    }

    fn heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let interval = self.node.config.viewer_ping_interval;
        let timeout = self.node.config.viewer_idle_timeout;

        ctx.run_interval(interval, move |act, ctx| {
            if Instant::now().duration_since(act.heartbeat) > timeout {
                tracing::warn!("💔 Viewer heartbeat missed, disconnecting session {} (match {})",
                    act.session_id, act.match_id);
                ctx.stop();
                return;
            }
            ctx.ping(b"ping");
        });
    }

    /// Subscribe and keep relaying the feed until either side goes away.
    fn join(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(closed) = self.closed_rx.take() else {
            return;
        };
        let addr = ctx.address();
        let node = self.node.clone().into_inner();
        let match_id = self.match_id;
        let role = self.role;

        tokio::spawn(async move {
            match node.broadcaster.subscribe(match_id, role, &node.queries).await {
                Ok(feed) => forward_feed(node, feed, addr, closed).await,
                Err(e) => {
                    tracing::warn!("Viewer could not join match {}: {}", match_id, e);
                    send_error(&addr, match_id, &e);
                    addr.do_send(Disconnect { reason: e.reason() });
                }
            }
        });
    }

    fn touch(&self) {
        if let Some(connection_id) = self.connection_id {
            let broadcaster = self.node.broadcaster.clone();
            let match_id = self.match_id;
            tokio::spawn(async move { broadcaster.touch(match_id, connection_id).await });
        }
    }

    fn handle_viewer_message(&self, message: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let Ok(command) = serde_json::from_str::<serde_json::Value>(message) else {
            tracing::debug!("❓ Unparseable viewer message on session {}: {}", self.session_id, message);
            return;
        };

        match command.get("type").and_then(|t| t.as_str()) {
            Some("ping") => {
                let pong = serde_json::json!({
                    "type": "pong",
                    "timestamp": Utc::now().to_rfc3339(),
                    "session_id": self.session_id,
                });
                ctx.text(pong.to_string());
            }
            // Viewer noticed a gap it cannot close on its own
            Some("resync") => {
                let addr = ctx.address();
                let node = self.node.clone().into_inner();
                let match_id = self.match_id;
                tokio::spawn(async move { send_snapshot(&node, &addr, match_id, SnapshotReason::Resync).await });
            }
            _ => {
                tracing::debug!("❓ Unknown viewer command on session {}: {}", self.session_id, message);
            }
        }
    }
}

async fn forward_feed(
    node: Arc<ClusterNode>,
    feed: LiveFeed,
    addr: Addr<MatchViewerConnection>,
    mut closed: oneshot::Receiver<()>,
) {
    let LiveFeed {
        subscription,
        snapshot,
        mut receiver,
        mut evicted,
        unsubscribe,
    } = feed;
    let match_id = subscription.match_id;

    addr.do_send(Joined {
        connection_id: subscription.connection_id,
    });
    send_message(
        &addr,
        &ViewerMessage::MatchSnapshot {
            reason: SnapshotReason::Join,
            snapshot,
        },
    );

    loop {
        tokio::select! {
            biased;
            _ = &mut closed => break,
            eviction = &mut evicted => {
                // A dropped sender means the whole feed was torn down
                let reason = if eviction.is_ok() { "idle" } else { "feed_closed" };
                addr.do_send(Disconnect { reason });
                break;
            }
            received = receiver.recv() => match received {
                Ok(payload) => addr.do_send(Outbound(payload)),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("🐢 Viewer {} fell {} message(s) behind on match {}; resending snapshot",
                        subscription.connection_id, skipped, match_id);
                    send_snapshot(&node, &addr, match_id, SnapshotReason::Resync).await;
                }
                Err(RecvError::Closed) => {
                    addr.do_send(Disconnect { reason: "feed_closed" });
                    break;
                }
            },
        }
    }

    unsubscribe.unsubscribe().await;
}

async fn send_snapshot(
    node: &ClusterNode,
    addr: &Addr<MatchViewerConnection>,
    match_id: Uuid,
    reason: SnapshotReason,
) {
    match node.queries.get_snapshot(match_id).await {
        Ok(snapshot) => send_message(addr, &ViewerMessage::MatchSnapshot { reason, snapshot }),
        Err(e) => {
            tracing::error!("❌ Could not load snapshot of match {} for a viewer: {}", match_id, e);
            send_error(addr, match_id, &e);
        }
    }
}

fn send_error(addr: &Addr<MatchViewerConnection>, match_id: Uuid, error: &LiveMatchError) {
    send_message(
        addr,
        &ViewerMessage::SubscriptionError {
            match_id,
            reason: error.reason().to_string(),
            message: error.to_string(),
        },
    );
}

fn send_message(addr: &Addr<MatchViewerConnection>, message: &ViewerMessage) {
    match serde_json::to_string(message) {
        Ok(text) => addr.do_send(Outbound(text)),
        Err(e) => tracing::error!("Failed to serialize viewer message: {}", e),
    }
}

impl Handler<Outbound> for MatchViewerConnection {
    type Result = ();

    fn handle(&mut self, msg: Outbound, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl Handler<Joined> for MatchViewerConnection {
    type Result = ();

    fn handle(&mut self, msg: Joined, _ctx: &mut Self::Context) {
        tracing::debug!("Session {} registered as viewer {}", self.session_id, msg.connection_id);
        self.connection_id = Some(msg.connection_id);
    }
}

impl Handler<Disconnect> for MatchViewerConnection {
    type Result = ();

    fn handle(&mut self, msg: Disconnect, ctx: &mut Self::Context) {
        tracing::info!("🔌 Closing viewer session {} for match {}: {}", self.session_id, self.match_id, msg.reason);
        ctx.close(Some(ws::CloseReason {
            code: ws::CloseCode::Normal,
            description: Some(msg.reason.to_string()),
        }));
        ctx.stop();
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for MatchViewerConnection {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.heartbeat = Instant::now();
                self.touch();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.heartbeat = Instant::now();
                self.touch();
            }
            Ok(ws::Message::Text(text)) => {
                self.heartbeat = Instant::now();
                self.touch();
                self.handle_viewer_message(&text, ctx);
            }
            Ok(ws::Message::Binary(_)) => {
                tracing::warn!("⚠️ Unexpected binary message on viewer session {}", self.session_id);
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            _ => ctx.stop(),
        }
    }
}

