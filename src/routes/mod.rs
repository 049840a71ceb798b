use actix_web::web;

pub mod backend_health;
pub mod matches;
pub mod ops;
pub mod seasons;
pub mod websocket;

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(backend_health::backend_health);

    // Live viewer sockets; registered ahead of the match scope so the
    // more specific path wins
    cfg.service(
        web::resource("/matches/{match_id}/live")
            .route(web::get().to(websocket::live_match_ws_route))
    );
    cfg.service(
        web::scope("/matches")
            .service(matches::create_match)
            .service(matches::get_match)
            .service(matches::get_match_stats)
            .service(matches::get_player_match_stats)
            .service(matches::get_match_events)
            .service(matches::submit_event)
            .service(matches::apply_command)
            .service(matches::claim_match)
            .service(matches::assign_match)
            .service(matches::finalize_match)
    );
    cfg.service(
        web::scope("/seasons")
            .service(seasons::get_season_standings)
            .service(seasons::get_team_season_stats)
            .service(seasons::get_top_performers)
    );
    cfg.service(
        web::scope("/ops")
            .service(ops::list_instances)
            .service(ops::balancer_status)
            .service(ops::get_thresholds)
            .service(ops::update_thresholds)
            .service(ops::update_policy)
    );
}
