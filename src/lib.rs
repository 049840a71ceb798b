use actix_web::{http, web, App, HttpServer};
use actix_web::dev::Server;
use tracing_actix_web::TracingLogger;
use std::net::TcpListener;
use std::sync::Arc;
use actix_cors::Cors;

pub mod cluster;
pub mod config;
pub mod db;
pub mod error;
pub mod game;
mod handlers;
pub mod league;
pub mod models;
mod routes;
pub mod services;
pub mod telemetry;
pub mod websocket;

use crate::cluster::node::ClusterNode;
use crate::routes::init_routes;

pub fn run(listener: TcpListener, node: Arc<ClusterNode>) -> Result<Server, std::io::Error> {
    // web::Data is an Arc underneath; share the node as-is
    let node_data = web::Data::from(node);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin("http://localhost:3000")
            .allowed_origin("http://localhost:3001")
            .allowed_methods(vec!["GET", "POST", "PUT"])
            .allowed_headers(vec![
                http::header::AUTHORIZATION,
                http::header::ACCEPT,
                http::header::CONTENT_TYPE,
                http::header::UPGRADE,
                http::header::CONNECTION,
            ])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(TracingLogger::default())
            .wrap(cors)
            .app_data(node_data.clone())
            .configure(init_routes)
    })
    .listen(listener)?
    .run();

    Ok(server)
}
