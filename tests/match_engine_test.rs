use std::sync::Arc;

use matchday_live::cluster::lease::lease_key;
use matchday_live::cluster::{InMemoryStateStore, SharedStateStore};
use matchday_live::db::{InMemoryMatchRepository, MatchRepository};
use matchday_live::error::LiveMatchError;
use matchday_live::models::live_match::MatchStatus;
use matchday_live::models::match_events::EventKind;

mod common;
use common::cluster_helpers::{spawn_node, start_match, submission, FlakyRepository, Fixture};
use common::utils::init_tracing;

fn memory_backends() -> (Arc<InMemoryStateStore>, Arc<InMemoryMatchRepository>) {
    (Arc::new(InMemoryStateStore::new()), Arc::new(InMemoryMatchRepository::new()))
}

#[tokio::test]
async fn accepted_events_get_consecutive_sequence_numbers() {
    init_tracing();
    let (store, repository) = memory_backends();
    let node = spawn_node(store, repository.clone(), "instance-a");
    let fixture = Fixture::new();
    let live_match = start_match(&node, &fixture).await;

    let mut last_version = 0;
    for (index, minute) in [5u16, 12, 30, 44].into_iter().enumerate() {
        let receipt = node
            .engine
            .submit_event(live_match.id, fixture.home_goal(minute))
            .await
            .expect("Event was rejected");
        assert_eq!(receipt.sequence_no, index as i64 + 1);
        assert!(receipt.version > last_version);
        last_version = receipt.version;
    }

    let events = repository.fetch_events(live_match.id).await.unwrap();
    let sequence: Vec<i64> = events.iter().map(|event| event.sequence_no).collect();
    assert_eq!(sequence, vec![1, 2, 3, 4]);

    let state = node.queries.get_match_state(live_match.id).await.unwrap();
    assert_eq!(state.home_score, 4);
    assert_eq!(state.last_sequence_no, 4);
    assert_eq!(state.clock_minute, 44);
}

#[tokio::test]
async fn minutes_never_reorder_events() {
    init_tracing();
    let (store, repository) = memory_backends();
    let node = spawn_node(store, repository, "instance-a");
    let fixture = Fixture::new();
    let live_match = start_match(&node, &fixture).await;

    let late = node.engine.submit_event(live_match.id, fixture.home_goal(80)).await.unwrap();
    let early = node.engine.submit_event(live_match.id, fixture.away_goal(10)).await.unwrap();

    assert_eq!(late.sequence_no, 1);
    assert_eq!(early.sequence_no, 2);
    let state = node.queries.get_match_state(live_match.id).await.unwrap();
    assert_eq!(state.clock_minute, 80);
}

#[tokio::test]
async fn invalid_events_leave_no_trace() {
    init_tracing();
    let (store, repository) = memory_backends();
    let node = spawn_node(store, repository.clone(), "instance-a");
    let fixture = Fixture::new();
    let live_match = start_match(&node, &fixture).await;
    let before = node.queries.get_snapshot(live_match.id).await.unwrap();

    let stranger = submission(EventKind::Corner, uuid::Uuid::new_v4(), None, 3);
    let err = node.engine.submit_event(live_match.id, stranger).await.unwrap_err();
    assert_eq!(err.reason(), "invalid_event");

    let anonymous_assist = submission(EventKind::Assist, fixture.home_team_id, None, 3);
    let err = node.engine.submit_event(live_match.id, anonymous_assist).await.unwrap_err();
    assert!(matches!(err, LiveMatchError::InvalidEvent(_)));

    let possession = submission(EventKind::PossessionUpdate { home_percent: 101 }, fixture.home_team_id, None, 3);
    assert!(node.engine.submit_event(live_match.id, possession).await.is_err());

    assert!(repository.fetch_events(live_match.id).await.unwrap().is_empty());
    assert_eq!(node.queries.get_snapshot(live_match.id).await.unwrap(), before);
}

#[tokio::test]
async fn events_need_a_running_match() {
    init_tracing();
    let (store, repository) = memory_backends();
    let node = spawn_node(store, repository, "instance-a");
    let fixture = Fixture::new();
    let live_match = node.engine.create_match(fixture.new_match()).await.unwrap();
    node.engine.claim(live_match.id).await.unwrap();

    let err = node.engine.submit_event(live_match.id, fixture.home_goal(1)).await.unwrap_err();
    assert!(matches!(err, LiveMatchError::InvalidTransition(_)));

    node.engine.start(live_match.id).await.unwrap();
    node.engine.pause(live_match.id).await.unwrap();
    // Paused matches still take late reports
    assert!(node.engine.submit_event(live_match.id, fixture.home_goal(45)).await.is_ok());
    node.engine.resume(live_match.id).await.unwrap();
}

#[tokio::test]
async fn status_transitions_follow_the_lifecycle() {
    init_tracing();
    let (store, repository) = memory_backends();
    let node = spawn_node(store, repository, "instance-a");
    let fixture = Fixture::new();
    let live_match = node.engine.create_match(fixture.new_match()).await.unwrap();
    node.engine.claim(live_match.id).await.unwrap();

    assert!(matches!(
        node.engine.pause(live_match.id).await,
        Err(LiveMatchError::InvalidTransition(_))
    ));
    assert!(matches!(
        node.engine.end(live_match.id).await,
        Err(LiveMatchError::InvalidTransition(_))
    ));

    let started = node.engine.start(live_match.id).await.unwrap();
    assert_eq!(started.previous_status, MatchStatus::Scheduled);
    assert_eq!(started.new_status, MatchStatus::InProgress);

    assert!(matches!(
        node.engine.resume(live_match.id).await,
        Err(LiveMatchError::InvalidTransition(_))
    ));

    let ended = node.engine.end(live_match.id).await.unwrap();
    assert_eq!(ended.new_status, MatchStatus::Completed);
    assert!(ended.version > started.version);

    // Completed is absorbing
    for attempt in [
        node.engine.start(live_match.id).await,
        node.engine.resume(live_match.id).await,
        node.engine.cancel(live_match.id).await,
    ] {
        assert!(matches!(attempt, Err(LiveMatchError::MatchTerminal(_))));
    }
    assert!(matches!(
        node.engine.submit_event(live_match.id, fixture.home_goal(90)).await,
        Err(LiveMatchError::MatchTerminal(_))
    ));
}

#[tokio::test]
async fn finishing_a_match_hands_back_its_lease() {
    init_tracing();
    let (store, repository) = memory_backends();
    let node = spawn_node(store.clone(), repository, "instance-a");
    let fixture = Fixture::new();
    let live_match = start_match(&node, &fixture).await;
    assert_eq!(
        store.get(&lease_key(live_match.id)).await.unwrap().as_deref(),
        Some("instance-a")
    );

    node.engine.cancel(live_match.id).await.unwrap();

    assert_eq!(store.get(&lease_key(live_match.id)).await.unwrap(), None);
    assert!(node.engine.owned_matches().await.is_empty());
    let state = node.queries.get_match_state(live_match.id).await.unwrap();
    assert_eq!(state.status, MatchStatus::Cancelled);
    assert!(state.completed_at.is_some());
    assert!(matches!(
        node.engine.claim(live_match.id).await,
        Err(LiveMatchError::MatchTerminal(_))
    ));
}

#[tokio::test]
async fn other_instances_point_at_the_owner() {
    init_tracing();
    let (store, repository) = memory_backends();
    let owner = spawn_node(store.clone(), repository.clone(), "instance-a");
    let other = spawn_node(store, repository, "instance-b");
    let fixture = Fixture::new();
    let live_match = start_match(&owner, &fixture).await;

    let err = other
        .engine
        .submit_event(live_match.id, fixture.home_goal(3))
        .await
        .unwrap_err();
    assert_eq!(err.reason(), "match_not_owned_by_this_instance");
    assert_eq!(err.owner_hint(), Some("instance-a"));

    let err = other.engine.claim(live_match.id).await.unwrap_err();
    assert!(matches!(err, LiveMatchError::NotOwned { .. }));

    // Reads work anywhere
    assert_eq!(
        other.queries.get_match_state(live_match.id).await.unwrap().status,
        MatchStatus::InProgress
    );
}

#[tokio::test]
async fn unknown_matches_are_reported_as_missing() {
    init_tracing();
    let (store, repository) = memory_backends();
    let node = spawn_node(store, repository, "instance-a");
    let missing = uuid::Uuid::new_v4();

    assert!(matches!(node.engine.claim(missing).await, Err(LiveMatchError::MatchNotFound(_))));
    assert!(matches!(
        node.engine.submit_event(missing, Fixture::new().home_goal(1)).await,
        Err(LiveMatchError::MatchNotFound(_))
    ));
    assert!(matches!(
        node.queries.get_match_state(missing).await,
        Err(LiveMatchError::MatchNotFound(_))
    ));
}

#[tokio::test]
async fn failed_writes_are_not_acknowledged() {
    init_tracing();
    let store = Arc::new(InMemoryStateStore::new());
    let repository = Arc::new(FlakyRepository::new());
    let node = spawn_node(store, repository.clone(), "instance-a");
    let fixture = Fixture::new();
    let live_match = start_match(&node, &fixture).await;
    node.engine.submit_event(live_match.id, fixture.home_goal(10)).await.unwrap();
    let before = node.queries.get_snapshot(live_match.id).await.unwrap();

    repository.set_failing(true);
    let err = node
        .engine
        .submit_event(live_match.id, fixture.home_goal(20))
        .await
        .unwrap_err();
    assert!(matches!(err, LiveMatchError::Durability(_)));
    assert!(err.is_server_error());
    assert!(node.engine.end(live_match.id).await.is_err());

    assert_eq!(node.queries.get_snapshot(live_match.id).await.unwrap(), before);
    assert_eq!(repository.fetch_events(live_match.id).await.unwrap().len(), 1);

    // A retry after recovery takes the next free sequence number
    repository.set_failing(false);
    let receipt = node
        .engine
        .submit_event(live_match.id, fixture.home_goal(20))
        .await
        .unwrap();
    assert_eq!(receipt.sequence_no, 2);
    assert_eq!(node.queries.get_match_state(live_match.id).await.unwrap().home_score, 2);
}

#[tokio::test]
async fn player_statistics_are_queryable() {
    init_tracing();
    let (store, repository) = memory_backends();
    let node = spawn_node(store, repository, "instance-a");
    let fixture = Fixture::new();
    let live_match = start_match(&node, &fixture).await;

    node.engine.submit_event(live_match.id, fixture.home_goal(7)).await.unwrap();
    node.engine
        .submit_event(
            live_match.id,
            submission(EventKind::Shot { on_target: false }, fixture.home_team_id, Some(fixture.home_player), 9),
        )
        .await
        .unwrap();

    let player = node
        .queries
        .get_player_match_stats(live_match.id, fixture.home_player)
        .await
        .unwrap()
        .expect("Scorer has statistics");
    assert_eq!(player.goals, 1);
    assert_eq!(player.shots, 1);

    let bystander = node
        .queries
        .get_player_match_stats(live_match.id, fixture.away_player)
        .await
        .unwrap();
    assert!(bystander.is_none());
}

#[tokio::test]
async fn paused_match_can_be_ended() {
    init_tracing();
    let (store, repository) = memory_backends();
    let node = spawn_node(store, repository.clone(), "instance-a");
    let fixture = Fixture::new();
    let live_match = start_match(&node, &fixture).await;
    node.engine.submit_event(live_match.id, fixture.home_goal(30)).await.unwrap();

    let paused = node.engine.pause(live_match.id).await.unwrap();
    let ended = node.engine.end(live_match.id).await.unwrap();
    assert_eq!(ended.previous_status, MatchStatus::Paused);
    assert_eq!(ended.new_status, MatchStatus::Completed);
    assert_eq!(ended.version, paused.version + 1);

    let stored = repository.fetch_match(live_match.id).await.unwrap().unwrap();
    assert_eq!(stored.status, MatchStatus::Completed);
    assert!(stored.completed_at.is_some());
}
