use std::sync::Arc;

use uuid::Uuid;

use matchday_live::cluster::{ClusterNode, InMemoryStateStore};
use matchday_live::db::InMemoryMatchRepository;
use matchday_live::error::LiveMatchError;
use matchday_live::models::match_events::EventSubmission;

mod common;
use common::cluster_helpers::{spawn_node, start_match, Fixture};
use common::utils::init_tracing;

fn node() -> Arc<ClusterNode> {
    spawn_node(
        Arc::new(InMemoryStateStore::new()),
        Arc::new(InMemoryMatchRepository::new()),
        "instance-a",
    )
}

/// Play a match through to full time with the given events.
async fn play(node: &ClusterNode, fixture: &Fixture, events: Vec<EventSubmission>) -> Uuid {
    let live_match = start_match(node, fixture).await;
    for event in events {
        node.engine
            .submit_event(live_match.id, event)
            .await
            .expect("Event was rejected");
    }
    node.engine.end(live_match.id).await.expect("Failed to end match");
    live_match.id
}

#[tokio::test]
async fn completing_a_match_updates_both_teams_once() {
    init_tracing();
    let node = node();
    let fixture = Fixture::new();

    let match_id = play(&node, &fixture, vec![fixture.home_goal(10), fixture.home_goal(70), fixture.away_goal(80)]).await;

    let home = node.queries.get_team_season_stats(fixture.season_id, fixture.home_team_id).await.unwrap();
    assert_eq!((home.played, home.wins, home.draws, home.losses), (1, 1, 0, 0));
    assert_eq!((home.goals_for, home.goals_against, home.goal_difference), (2, 1, 1));
    assert_eq!(home.points, 3);

    let away = node.queries.get_team_season_stats(fixture.season_id, fixture.away_team_id).await.unwrap();
    assert_eq!((away.played, away.wins, away.losses, away.points), (1, 0, 1, 0));
    assert_eq!(away.goal_difference, -1);

    // Retried finalization, from any instance, is a no-op
    assert!(!node.engine.finalize_season(match_id).await.unwrap());
    let other = spawn_node(
        Arc::new(InMemoryStateStore::new()),
        node.repository.clone(),
        "instance-b",
    );
    assert!(!other.engine.finalize_season(match_id).await.unwrap());

    let home_again = node.queries.get_team_season_stats(fixture.season_id, fixture.home_team_id).await.unwrap();
    assert_eq!(home_again, home);
}

#[tokio::test]
async fn only_completed_matches_count() {
    init_tracing();
    let node = node();
    let fixture = Fixture::new();
    let live_match = start_match(&node, &fixture).await;
    node.engine.submit_event(live_match.id, fixture.home_goal(5)).await.unwrap();

    assert!(matches!(
        node.engine.finalize_season(live_match.id).await,
        Err(LiveMatchError::InvalidTransition(_))
    ));

    node.engine.cancel(live_match.id).await.unwrap();
    assert!(matches!(
        node.engine.finalize_season(live_match.id).await,
        Err(LiveMatchError::InvalidTransition(_))
    ));
    assert!(node.queries.get_standings(fixture.season_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn goalless_draw_gives_each_team_a_point() {
    init_tracing();
    let node = node();
    let fixture = Fixture::new();
    play(&node, &fixture, Vec::new()).await;

    for team_id in [fixture.home_team_id, fixture.away_team_id] {
        let stats = node.queries.get_team_season_stats(fixture.season_id, team_id).await.unwrap();
        assert_eq!((stats.played, stats.draws, stats.points), (1, 1, 1));
    }
}

#[tokio::test]
async fn standings_rank_by_points_then_goal_difference() {
    init_tracing();
    let node = node();
    let first = Fixture::new();
    let rematch = first.reversed();
    let other_pair = Fixture::in_season(first.season_id);

    // first.home: win 2-0, then draw 1-1 away
    play(&node, &first, vec![first.home_goal(10), first.home_goal(50)]).await;
    play(&node, &rematch, vec![rematch.home_goal(30), rematch.away_goal(60)]).await;
    // other_pair.home: win 2-0
    play(&node, &other_pair, vec![other_pair.home_goal(15), other_pair.home_goal(20)]).await;

    let standings = node.queries.get_standings(first.season_id).await.unwrap();
    let order: Vec<(u32, Uuid, u32)> = standings
        .iter()
        .map(|standing| (standing.position, standing.stats.team_id, standing.stats.points))
        .collect();
    assert_eq!(
        order,
        vec![
            (1, first.home_team_id, 4),
            (2, other_pair.home_team_id, 3),
            (3, first.away_team_id, 1),
            (4, other_pair.away_team_id, 0),
        ]
    );

    // Other seasons are unaffected
    assert!(node.queries.get_standings(Uuid::new_v4()).await.unwrap().is_empty());
}

#[tokio::test]
async fn top_performers_rank_scorers_across_matches() {
    init_tracing();
    let node = node();
    let first = Fixture::new();
    let rematch = first.reversed();
    let other_pair = Fixture::in_season(first.season_id);

    play(&node, &first, vec![first.home_goal(10), first.home_goal(50)]).await;
    play(&node, &rematch, vec![rematch.home_goal(30), rematch.away_goal(60)]).await;
    play(&node, &other_pair, vec![other_pair.home_goal(15), other_pair.home_goal(20)]).await;

    let top = node.queries.get_top_performers(first.season_id, 2).await.unwrap();
    assert_eq!(top.len(), 2);

    assert_eq!(top[0].rank, 1);
    assert_eq!(top[0].stats.player_id, first.home_player);
    assert_eq!(top[0].stats.goals, 3);
    assert_eq!(top[0].stats.matches_played, 2);
    assert_eq!(top[0].stats.team_id, first.home_team_id);

    assert_eq!(top[1].stats.player_id, other_pair.home_player);
    assert_eq!(top[1].stats.goals, 2);
}

#[tokio::test]
async fn team_without_matches_reads_as_zero() {
    init_tracing();
    let node = node();
    let season_id = Uuid::new_v4();
    let team_id = Uuid::new_v4();

    let stats = node.queries.get_team_season_stats(season_id, team_id).await.unwrap();
    assert_eq!(stats.team_id, team_id);
    assert_eq!(stats.season_id, season_id);
    assert_eq!((stats.played, stats.points, stats.goal_difference), (0, 0, 0));
}
