use actix_web::{web, HttpResponse, ResponseError, Result};
use serde::Deserialize;

use crate::cluster::balancer::BalancerError;
use crate::cluster::health::HealthThresholds;
use crate::cluster::node::ClusterNode;
use crate::cluster::policy::AssignmentPolicy;
use crate::error::LiveMatchError;
use crate::models::common::ApiResponse;

#[derive(Debug, Deserialize)]
pub struct PolicyRequest {
    pub policy: String,
}

/// Every instance with a live registry entry
pub async fn list_instances(node: web::Data<ClusterNode>) -> Result<HttpResponse> {
    match node.registry.live_instances().await {
        Ok(instances) => Ok(HttpResponse::Ok().json(ApiResponse::success(
            format!("{} live instance(s)", instances.len()),
            instances,
        ))),
        Err(e) => Ok(LiveMatchError::from(e).error_response()),
    }
}

pub async fn balancer_status(node: web::Data<ClusterNode>) -> Result<HttpResponse> {
    match node.balancer.status().await {
        Ok(status) => Ok(HttpResponse::Ok().json(ApiResponse::success("Balancer status", status))),
        Err(e) => Ok(LiveMatchError::from(e).error_response()),
    }
}

pub async fn get_thresholds(node: web::Data<ClusterNode>) -> Result<HttpResponse> {
    let thresholds = node.balancer.thresholds().await;
    Ok(HttpResponse::Ok().json(ApiResponse::success("Health thresholds", thresholds)))
}

/// Replace the cluster-wide thresholds. Peers pick them up on their next heartbeat.
pub async fn update_thresholds(
    thresholds: web::Json<HealthThresholds>,
    node: web::Data<ClusterNode>,
) -> Result<HttpResponse> {
    let thresholds = thresholds.into_inner();
    match node.balancer.set_thresholds(thresholds.clone()).await {
        Ok(()) => Ok(HttpResponse::Ok().json(ApiResponse::success("Health thresholds updated", thresholds))),
        Err(BalancerError::InvalidThresholds(message)) => {
            Ok(HttpResponse::BadRequest().json(ApiResponse::error(message)))
        }
        Err(e) => Ok(LiveMatchError::from(e).error_response()),
    }
}

pub async fn update_policy(
    request: web::Json<PolicyRequest>,
    node: web::Data<ClusterNode>,
) -> Result<HttpResponse> {
    let policy: AssignmentPolicy = match request.policy.parse() {
        Ok(policy) => policy,
        Err(message) => return Ok(HttpResponse::BadRequest().json(ApiResponse::error(message))),
    };

    node.balancer.set_policy(policy).await;
    Ok(HttpResponse::Ok().json(ApiResponse::success("Assignment policy updated", policy)))
}
