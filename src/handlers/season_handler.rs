use actix_web::{web, HttpResponse, ResponseError, Result};
use serde::Deserialize;
use uuid::Uuid;

use crate::cluster::node::ClusterNode;
use crate::models::common::ApiResponse;

const DEFAULT_TOP_PERFORMERS: usize = 10;
const MAX_TOP_PERFORMERS: usize = 100;

#[derive(Debug, Deserialize)]
pub struct TopPerformersQuery {
    pub limit: Option<usize>,
}

impl TopPerformersQuery {
    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_TOP_PERFORMERS)
            .clamp(1, MAX_TOP_PERFORMERS)
    }
}

/// League table for a season, best first
pub async fn get_season_standings(season_id: Uuid, node: web::Data<ClusterNode>) -> Result<HttpResponse> {
    match node.queries.get_standings(season_id).await {
        Ok(standings) => Ok(HttpResponse::Ok().json(ApiResponse::success("Season standings", standings))),
        Err(e) => {
            tracing::error!("Failed to load standings for season {}: {}", season_id, e);
            Ok(e.error_response())
        }
    }
}

pub async fn get_team_season_stats(
    season_id: Uuid,
    team_id: Uuid,
    node: web::Data<ClusterNode>,
) -> Result<HttpResponse> {
    match node.queries.get_team_season_stats(season_id, team_id).await {
        Ok(stats) => Ok(HttpResponse::Ok().json(ApiResponse::success("Team season statistics", stats))),
        Err(e) => Ok(e.error_response()),
    }
}

pub async fn get_top_performers(
    season_id: Uuid,
    query: web::Query<TopPerformersQuery>,
    node: web::Data<ClusterNode>,
) -> Result<HttpResponse> {
    match node.queries.get_top_performers(season_id, query.effective_limit()).await {
        Ok(performers) => Ok(HttpResponse::Ok().json(ApiResponse::success("Top performers", performers))),
        Err(e) => Ok(e.error_response()),
    }
}
