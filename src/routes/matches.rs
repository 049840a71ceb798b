use actix_web::{get, post, web, HttpResponse, Result};
use uuid::Uuid;

use crate::cluster::node::ClusterNode;
use crate::handlers::match_handler;
use crate::models::live_match::NewMatch;
use crate::models::match_events::EventSubmission;

/// Schedule a match
#[post("")]
async fn create_match(
    request: web::Json<NewMatch>,
    node: web::Data<ClusterNode>,
) -> Result<HttpResponse> {
    match_handler::create_match(request, node).await
}

/// Current match state
#[get("/{match_id}")]
async fn get_match(path: web::Path<Uuid>, node: web::Data<ClusterNode>) -> Result<HttpResponse> {
    match_handler::get_match(path.into_inner(), node).await
}

#[get("/{match_id}/stats")]
async fn get_match_stats(path: web::Path<Uuid>, node: web::Data<ClusterNode>) -> Result<HttpResponse> {
    match_handler::get_match_stats(path.into_inner(), node).await
}

#[get("/{match_id}/players/{player_id}/stats")]
async fn get_player_match_stats(
    path: web::Path<(Uuid, Uuid)>,
    node: web::Data<ClusterNode>,
) -> Result<HttpResponse> {
    let (match_id, player_id) = path.into_inner();
    match_handler::get_player_match_stats(match_id, player_id, node).await
}

#[get("/{match_id}/events")]
async fn get_match_events(path: web::Path<Uuid>, node: web::Data<ClusterNode>) -> Result<HttpResponse> {
    match_handler::get_match_events(path.into_inner(), node).await
}

/// Submit a match event to the owning instance
#[post("/{match_id}/events")]
async fn submit_event(
    path: web::Path<Uuid>,
    submission: web::Json<EventSubmission>,
    node: web::Data<ClusterNode>,
) -> Result<HttpResponse> {
    match_handler::submit_event(path.into_inner(), submission, node).await
}

/// start, pause, resume, end or cancel
#[post("/{match_id}/commands/{command}")]
async fn apply_command(
    path: web::Path<(Uuid, String)>,
    node: web::Data<ClusterNode>,
) -> Result<HttpResponse> {
    let (match_id, command) = path.into_inner();
    match_handler::apply_command(match_id, command, node).await
}

#[post("/{match_id}/claim")]
async fn claim_match(path: web::Path<Uuid>, node: web::Data<ClusterNode>) -> Result<HttpResponse> {
    match_handler::claim_match(path.into_inner(), node).await
}

#[post("/{match_id}/assign")]
async fn assign_match(path: web::Path<Uuid>, node: web::Data<ClusterNode>) -> Result<HttpResponse> {
    match_handler::assign_match(path.into_inner(), node).await
}

#[post("/{match_id}/finalize")]
async fn finalize_match(path: web::Path<Uuid>, node: web::Data<ClusterNode>) -> Result<HttpResponse> {
    match_handler::finalize_match(path.into_inner(), node).await
}
