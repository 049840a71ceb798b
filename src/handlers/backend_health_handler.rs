use actix_web::{web, HttpResponse, Responder};
use chrono::Utc;
use serde_json::json;

use crate::cluster::node::ClusterNode;

/// Liveness plus a short summary of what this instance is carrying.
pub async fn backend_health_check(node: web::Data<ClusterNode>) -> impl Responder {
    let owned_matches = node.engine.owned_matches().await;

    HttpResponse::Ok().json(json!({
        "status": "UP",
        "instance_id": node.instance_id(),
        "owned_matches": owned_matches.len(),
        "connections": node.load.connections(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
