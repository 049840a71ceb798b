use actix_web::{web, HttpResponse, ResponseError, Result};
use uuid::Uuid;

use crate::cluster::node::ClusterNode;
use crate::error::LiveMatchError;
use crate::models::common::ApiResponse;
use crate::models::live_match::{MatchCommand, NewMatch};
use crate::models::match_events::EventSubmission;

/// Schedule a new match
pub async fn create_match(
    request: web::Json<NewMatch>,
    node: web::Data<ClusterNode>,
) -> Result<HttpResponse> {
    match node.engine.create_match(request.into_inner()).await {
        Ok(live_match) => Ok(HttpResponse::Created().json(ApiResponse::success("Match scheduled", live_match))),
        Err(e) => {
            tracing::warn!("Failed to schedule match: {}", e);
            Ok(e.error_response())
        }
    }
}

pub async fn get_match(match_id: Uuid, node: web::Data<ClusterNode>) -> Result<HttpResponse> {
    match node.queries.get_match_state(match_id).await {
        Ok(state) => Ok(HttpResponse::Ok().json(ApiResponse::success("Match state", state))),
        Err(e) => Ok(e.error_response()),
    }
}

pub async fn get_match_stats(match_id: Uuid, node: web::Data<ClusterNode>) -> Result<HttpResponse> {
    match node.queries.get_match_stats(match_id).await {
        Ok(stats) => Ok(HttpResponse::Ok().json(ApiResponse::success("Match statistics", stats))),
        Err(e) => Ok(e.error_response()),
    }
}

/// A player with no recorded action in the match gets 404.
pub async fn get_player_match_stats(
    match_id: Uuid,
    player_id: Uuid,
    node: web::Data<ClusterNode>,
) -> Result<HttpResponse> {
    match node.queries.get_player_match_stats(match_id, player_id).await {
        Ok(Some(stats)) => Ok(HttpResponse::Ok().json(ApiResponse::success("Player statistics", stats))),
        Ok(None) => Ok(HttpResponse::NotFound().json(ApiResponse::error(format!(
            "Player {} has no statistics in match {}",
            player_id, match_id
        )))),
        Err(e) => Ok(e.error_response()),
    }
}

/// Submit one event. Only the owning instance accepts it; everyone else
/// answers 409 with the owner's id when known.
pub async fn submit_event(
    match_id: Uuid,
    submission: web::Json<EventSubmission>,
    node: web::Data<ClusterNode>,
) -> Result<HttpResponse> {
    match node.engine.submit_event(match_id, submission.into_inner()).await {
        Ok(receipt) => Ok(HttpResponse::Ok().json(ApiResponse::success("Event accepted", receipt))),
        Err(e) => {
            if e.is_server_error() {
                tracing::error!("❌ Event for match {} failed: {}", match_id, e);
            }
            Ok(e.error_response())
        }
    }
}

pub async fn apply_command(
    match_id: Uuid,
    command: String,
    node: web::Data<ClusterNode>,
) -> Result<HttpResponse> {
    let command: MatchCommand = match command.parse() {
        Ok(command) => command,
        Err(message) => return Ok(LiveMatchError::InvalidTransition(message).error_response()),
    };

    match node.engine.apply_command(match_id, command).await {
        Ok(change) => Ok(HttpResponse::Ok().json(ApiResponse::success(
            format!("Match is now {}", change.new_status.as_str()),
            change,
        ))),
        Err(e) => {
            if e.is_server_error() {
                tracing::error!("❌ Command {} for match {} failed: {}", command, match_id, e);
            }
            Ok(e.error_response())
        }
    }
}

/// Take ownership of the match on this instance.
pub async fn claim_match(match_id: Uuid, node: web::Data<ClusterNode>) -> Result<HttpResponse> {
    match node.engine.claim(match_id).await {
        Ok(snapshot) => Ok(HttpResponse::Ok().json(ApiResponse::success(
            format!("Match claimed by {}", node.instance_id()),
            snapshot,
        ))),
        Err(e) => Ok(e.error_response()),
    }
}

/// Ask the balancer for an owner. A live lease always wins.
pub async fn assign_match(match_id: Uuid, node: web::Data<ClusterNode>) -> Result<HttpResponse> {
    match node.assign(match_id).await {
        Ok(assignment) => Ok(HttpResponse::Ok().json(ApiResponse::success(
            format!("Match assigned to {}", assignment.instance_id),
            assignment,
        ))),
        Err(e) => {
            tracing::warn!("Failed to assign match {}: {}", match_id, e);
            Ok(e.error_response())
        }
    }
}

/// Fold a completed match into season tables. Safe to repeat.
pub async fn finalize_match(match_id: Uuid, node: web::Data<ClusterNode>) -> Result<HttpResponse> {
    match node.engine.finalize_season(match_id).await {
        Ok(applied) => {
            let message = if applied {
                "Season statistics updated"
            } else {
                "Season statistics already include this match"
            };
            Ok(HttpResponse::Ok().json(ApiResponse::success(
                message,
                serde_json::json!({ "match_id": match_id, "applied": applied }),
            )))
        }
        Err(e) => Ok(e.error_response()),
    }
}

/// Accepted events in sequence order
pub async fn get_match_events(match_id: Uuid, node: web::Data<ClusterNode>) -> Result<HttpResponse> {
    match node.queries.get_match_events(match_id).await {
        Ok(events) => Ok(HttpResponse::Ok().json(ApiResponse::success(
            format!("{} event(s)", events.len()),
            events,
        ))),
        Err(e) => Ok(e.error_response()),
    }
}
