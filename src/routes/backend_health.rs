use actix_web::{get, web, Responder};

use crate::cluster::node::ClusterNode;
use crate::handlers::backend_health_handler::backend_health_check;

#[get("/backend_health")]
async fn backend_health(node: web::Data<ClusterNode>) -> impl Responder {
    backend_health_check(node).await
}
