use actix_web::{get, web, HttpResponse, Result};
use uuid::Uuid;

use crate::cluster::node::ClusterNode;
use crate::handlers::season_handler::{self, TopPerformersQuery};

/// Get season standings
#[get("/{season_id}/standings")]
async fn get_season_standings(path: web::Path<Uuid>, node: web::Data<ClusterNode>) -> Result<HttpResponse> {
    season_handler::get_season_standings(path.into_inner(), node).await
}

#[get("/{season_id}/teams/{team_id}/stats")]
async fn get_team_season_stats(
    path: web::Path<(Uuid, Uuid)>,
    node: web::Data<ClusterNode>,
) -> Result<HttpResponse> {
    let (season_id, team_id) = path.into_inner();
    season_handler::get_team_season_stats(season_id, team_id, node).await
}

#[get("/{season_id}/top-performers")]
async fn get_top_performers(
    path: web::Path<Uuid>,
    query: web::Query<TopPerformersQuery>,
    node: web::Data<ClusterNode>,
) -> Result<HttpResponse> {
    season_handler::get_top_performers(path.into_inner(), query, node).await
}
