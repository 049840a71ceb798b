use actix_web::{get, put, web, HttpResponse, Result};

use crate::cluster::health::HealthThresholds;
use crate::cluster::node::ClusterNode;
use crate::handlers::ops_handler::{self, PolicyRequest};

#[get("/instances")]
async fn list_instances(node: web::Data<ClusterNode>) -> Result<HttpResponse> {
    ops_handler::list_instances(node).await
}

#[get("/balancer")]
async fn balancer_status(node: web::Data<ClusterNode>) -> Result<HttpResponse> {
    ops_handler::balancer_status(node).await
}

#[get("/thresholds")]
async fn get_thresholds(node: web::Data<ClusterNode>) -> Result<HttpResponse> {
    ops_handler::get_thresholds(node).await
}

#[put("/thresholds")]
async fn update_thresholds(
    thresholds: web::Json<HealthThresholds>,
    node: web::Data<ClusterNode>,
) -> Result<HttpResponse> {
    ops_handler::update_thresholds(thresholds, node).await
}

#[put("/policy")]
async fn update_policy(
    request: web::Json<PolicyRequest>,
    node: web::Data<ClusterNode>,
) -> Result<HttpResponse> {
    ops_handler::update_policy(request, node).await
}
