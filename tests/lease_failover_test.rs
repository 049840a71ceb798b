use std::sync::Arc;
use std::time::Duration;

use matchday_live::cluster::lease::lease_key;
use matchday_live::cluster::{ClusterNode, InMemoryStateStore, SharedStateStore};
use matchday_live::db::{InMemoryMatchRepository, MatchRepository};
use matchday_live::error::LiveMatchError;
use matchday_live::models::live_match::MatchStatus;
use uuid::Uuid;

mod common;
use common::cluster_helpers::{spawn_node, start_match, Fixture};
use common::faulty_store::{spawn_node_on, FaultyStore};
use common::utils::init_tracing;

const PAST_LEASE_TTL: Duration = Duration::from_secs(31);

#[tokio::test(start_paused = true)]
async fn expired_lease_stops_writes_and_lets_another_instance_take_over() {
    init_tracing();
    let store = Arc::new(InMemoryStateStore::new());
    let repository = Arc::new(InMemoryMatchRepository::new());
    let node_a = spawn_node(store.clone(), repository.clone(), "instance-a");
    let node_b = spawn_node(store.clone(), repository.clone(), "instance-b");
    let fixture = Fixture::new();
    let live_match = start_match(&node_a, &fixture).await;
    node_a.engine.submit_event(live_match.id, fixture.home_goal(12)).await.unwrap();

    // A never renews, e.g. because it stalled
    tokio::time::advance(PAST_LEASE_TTL).await;

    let err = node_a
        .engine
        .submit_event(live_match.id, fixture.home_goal(20))
        .await
        .unwrap_err();
    assert!(matches!(err, LiveMatchError::LeaseLost { .. }));
    assert!(node_a.engine.owned_matches().await.is_empty());

    let snapshot = node_b.engine.claim(live_match.id).await.expect("B should take over");
    assert_eq!(snapshot.match_state.owner_instance_id.as_deref(), Some("instance-b"));
    assert_eq!(snapshot.match_state.status, MatchStatus::InProgress);
    assert_eq!(snapshot.match_state.last_sequence_no, 1);
    assert_eq!(snapshot.match_state.home_score, 1);
    assert_eq!(snapshot.stats.home.goals, 1);

    let receipt = node_b.engine.submit_event(live_match.id, fixture.away_goal(25)).await.unwrap();
    assert_eq!(receipt.sequence_no, 2);

    // Only one holder at a time
    let err = node_a.engine.claim(live_match.id).await.unwrap_err();
    assert_eq!(err.owner_hint(), Some("instance-b"));

    let sequence: Vec<i64> = repository
        .fetch_events(live_match.id)
        .await
        .unwrap()
        .iter()
        .map(|event| event.sequence_no)
        .collect();
    assert_eq!(sequence, vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn partitioned_owner_gives_up_once_its_local_deadline_passes() {
    init_tracing();
    let store = Arc::new(InMemoryStateStore::new());
    let repository = Arc::new(InMemoryMatchRepository::new());
    let node_a = spawn_node(store.clone(), repository.clone(), "instance-a");
    let node_b = spawn_node(store.clone(), repository, "instance-b");
    let fixture = Fixture::new();
    let live_match = start_match(&node_a, &fixture).await;

    store.set_partitioned(true);

    tokio::time::advance(Duration::from_secs(11)).await;
    let renewal = node_a.engine.maintain_leases().await;
    assert!(renewal.lost.is_empty());
    assert_eq!(node_a.leases.held_matches().await, vec![live_match.id]);

    tokio::time::advance(Duration::from_secs(20)).await;
    let renewal = node_a.engine.maintain_leases().await;
    assert_eq!(renewal.lost, vec![live_match.id]);
    assert!(node_a.engine.owned_matches().await.is_empty());

    let err = node_a
        .engine
        .submit_event(live_match.id, fixture.home_goal(40))
        .await
        .unwrap_err();
    assert!(matches!(err, LiveMatchError::NotOwned { .. }));

    store.set_partitioned(false);
    node_b.engine.claim(live_match.id).await.expect("B should take over after the partition");
    assert_eq!(
        store.get(&lease_key(live_match.id)).await.unwrap().as_deref(),
        Some("instance-b")
    );
}

#[tokio::test]
async fn stale_owner_is_fenced_by_the_claim() {
    init_tracing();
    let store = Arc::new(InMemoryStateStore::new());
    let repository = Arc::new(InMemoryMatchRepository::new());
    let node_a = spawn_node(store.clone(), repository.clone(), "instance-a");
    let node_b = spawn_node(store.clone(), repository.clone(), "instance-b");
    let fixture = Fixture::new();
    let live_match = start_match(&node_a, &fixture).await;

    // The store forgets A's lease while A still believes it holds it
    store.delete(&lease_key(live_match.id)).await.unwrap();
    let claimed = node_b.engine.claim(live_match.id).await.unwrap();

    let err = node_a
        .engine
        .submit_event(live_match.id, fixture.home_goal(60))
        .await
        .unwrap_err();
    assert!(matches!(err, LiveMatchError::LeaseLost { .. }));
    assert!(node_a.engine.owned_matches().await.is_empty());

    assert!(repository.fetch_events(live_match.id).await.unwrap().is_empty());
    let stored = repository.fetch_match(live_match.id).await.unwrap().unwrap();
    assert_eq!(stored.version, claimed.version());
    assert_eq!(stored.owner_instance_id.as_deref(), Some("instance-b"));
}

#[tokio::test(start_paused = true)]
async fn renewed_lease_survives_many_ttls() {
    init_tracing();
    let store = Arc::new(InMemoryStateStore::new());
    let repository = Arc::new(InMemoryMatchRepository::new());
    let node_a = spawn_node(store.clone(), repository.clone(), "instance-a");
    let node_b = spawn_node(store, repository, "instance-b");
    let fixture = Fixture::new();
    let live_match = start_match(&node_a, &fixture).await;

    for _ in 0..10 {
        tokio::time::advance(Duration::from_secs(10)).await;
        let renewal = node_a.engine.maintain_leases().await;
        assert_eq!(renewal.renewed, vec![live_match.id]);
    }

    assert!(matches!(
        node_b.engine.claim(live_match.id).await,
        Err(LiveMatchError::NotOwned { .. })
    ));
    assert!(node_a.engine.submit_event(live_match.id, fixture.home_goal(88)).await.is_ok());
}

/// The store stamps the lease one slow hop after A sent the request, so its
/// copy outlives A's local deadline by that hop.
async fn lease_stamped_late() -> (Arc<ClusterNode>, Arc<ClusterNode>, Uuid, Fixture) {
    let store = Arc::new(InMemoryStateStore::new());
    let repository = Arc::new(InMemoryMatchRepository::new());
    let faulty = FaultyStore::new(store.clone());
    let node_a = spawn_node_on(faulty.clone(), repository.clone(), "instance-a");
    let node_b = spawn_node(store, repository, "instance-b");
    let fixture = Fixture::new();

    faulty.delay_acquire(Duration::from_millis(500));
    let live_match = start_match(&node_a, &fixture).await;
    faulty.delay_acquire(Duration::ZERO);

    // Past A's local deadline, still inside the store's TTL
    tokio::time::advance(Duration::from_millis(29_700)).await;
    (node_a, node_b, live_match.id, fixture)
}

#[tokio::test(start_paused = true)]
async fn write_after_local_expiry_does_not_let_renewal_revive_the_lease() {
    init_tracing();
    let (node_a, node_b, match_id, fixture) = lease_stamped_late().await;

    let err = node_a.engine.submit_event(match_id, fixture.home_goal(10)).await.unwrap_err();
    assert!(matches!(err, LiveMatchError::LeaseLost { .. }));
    assert!(!node_a.leases.is_held(match_id).await);

    let renewal = node_a.engine.maintain_leases().await;
    assert!(renewal.renewed.is_empty());
    assert!(!node_a.leases.is_held(match_id).await);
    assert!(node_a.leases.held_matches().await.is_empty());

    // Once the store's copy lapses the match is writable again
    tokio::time::advance(Duration::from_secs(1)).await;
    let snapshot = node_b.engine.claim(match_id).await.expect("B should take over");
    assert_eq!(snapshot.match_state.owner_instance_id.as_deref(), Some("instance-b"));
    let receipt = node_b.engine.submit_event(match_id, fixture.away_goal(11)).await.unwrap();
    assert_eq!(receipt.sequence_no, 1);
}

#[tokio::test(start_paused = true)]
async fn renewal_never_extends_a_locally_expired_lease() {
    init_tracing();
    let (node_a, node_b, match_id, _) = lease_stamped_late().await;

    let renewal = node_a.engine.maintain_leases().await;
    assert_eq!(renewal.lost, vec![match_id]);
    assert!(renewal.renewed.is_empty());
    assert!(node_a.engine.owned_matches().await.is_empty());

    tokio::time::advance(Duration::from_secs(1)).await;
    assert!(node_b.engine.claim(match_id).await.is_ok());
}
