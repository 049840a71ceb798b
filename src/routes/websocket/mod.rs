mod connection;
mod messages;

use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use uuid::Uuid;

use crate::cluster::node::ClusterNode;

pub use connection::MatchViewerConnection;
pub use messages::LiveQuery;

/// Live match WebSocket. The first frame is always a full snapshot, then
/// every update for the match as it is published.
pub async fn live_match_ws_route(
    req: HttpRequest,
    stream: web::Payload,
    path: web::Path<Uuid>,
    query: web::Query<LiveQuery>,
    node: web::Data<ClusterNode>,
) -> Result<HttpResponse, Error> {
    let match_id = path.into_inner();
    tracing::info!("New live WebSocket request for match {} as {}", match_id, query.role);

    let resp = ws::start(
        MatchViewerConnection::new(match_id, query.role, node),
        &req,
        stream,
    )?;

    tracing::info!("Live WebSocket established for match {}", match_id);
    Ok(resp)
}
