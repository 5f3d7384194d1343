use exdag::broker::Broker;
use exdag::payload;
use exdag::state::{VKey, VState, VStateData, VertexId};
use exdag::store::DataStore;
use exdag::tracker::VTracker;
use exdag::vertex::Vertex;
use serde_json::json;
use std::time::Duration;

fn put(store: &DataStore, name: &str, vertex: VertexId, state: VState) {
    store
        .put(VStateData::new(Some(name.into()), Some(vertex), state, None))
        .unwrap();
}

#[test]
fn test_track_builds_edges_through_the_store() {
    let store = DataStore::new();
    let mut tracker = VTracker::new();
    let dep = VertexId::new();
    let subject = VertexId::new();
    put(&store, "dep", dep, VState::Done);
    put(&store, "subject", subject, VState::Ready);

    tracker.track(subject, &[VKey::by_name("dep")], &store);

    assert_eq!(tracker.deps_of(subject), vec![dep]);
    assert!(tracker.by_state()[&VState::Done].contains(&dep));
    assert!(tracker.by_state()[&VState::Ready].contains(&subject));
}

#[test]
fn test_unresolvable_deps_stay_dangling() {
    let store = DataStore::new();
    let mut tracker = VTracker::new();
    let subject = VertexId::new();
    put(&store, "subject", subject, VState::New);

    tracker.track(subject, &[VKey::by_name("ghost")], &store);
    assert!(tracker.deps_of(subject).is_empty());

    // once the ghost materializes, the next observation reconciles the edge
    let ghost = VertexId::new();
    put(&store, "ghost", ghost, VState::New);
    tracker.track(subject, &[VKey::by_name("ghost")], &store);
    assert_eq!(tracker.deps_of(subject), vec![ghost]);
}

#[test]
fn test_state_buckets_follow_the_latest_observation() {
    let store = DataStore::new();
    let mut tracker = VTracker::new();
    let subject = VertexId::new();

    put(&store, "subject", subject, VState::New);
    tracker.track(subject, &[], &store);
    assert!(tracker.by_state()[&VState::New].contains(&subject));

    store
        .put(VStateData::new(Some("subject".into()), Some(subject), VState::Done, None))
        .unwrap();
    tracker.track(subject, &[], &store);
    assert!(tracker.by_state()[&VState::Done].contains(&subject));
    assert!(!tracker.by_state()[&VState::New].contains(&subject));
}

#[test]
fn test_root_cause_points_at_the_originating_failure() {
    let store = DataStore::new();
    let mut tracker = VTracker::new();
    let leaf = VertexId::new();
    let dependent = VertexId::new();
    put(&store, "leaf", leaf, VState::Failed);
    put(&store, "dependent", dependent, VState::Failed);

    tracker.track(dependent, &[VKey::by_name("leaf")], &store);

    assert_eq!(tracker.root_cause(), vec![leaf]);
}

#[tokio::test]
async fn test_tracked_run_reports_root_cause() {
    let mut broker = Broker::new();
    let handle = broker.start(true);

    let ok_dep = Vertex::builder(payload::from_fn(|| Ok(json!("fine"))))
        .name("ok-dep")
        .spawn(&handle)
        .unwrap();
    let bad_dep = Vertex::builder(payload::from_fn(|| anyhow::bail!("root failure")))
        .name("bad-dep")
        .spawn(&handle)
        .unwrap();
    let dependent = Vertex::builder(payload::from_fn_with_deps(|_| Ok(json!("unreachable"))))
        .depends_on(["ok-dep", "bad-dep"])
        .spawn(&handle)
        .unwrap();

    broker
        .wait_all(Some(Duration::from_secs(10)), Duration::from_millis(20))
        .await
        .unwrap()
        .unwrap();

    let tracker = broker.tracker().expect("tracking was enabled");
    let tracker = tracker.read().unwrap();
    assert_eq!(tracker.root_cause(), vec![bad_dep.id()]);
    assert!(tracker.by_state()[&VState::Failed].contains(&dependent.id()));
    assert!(tracker.by_state()[&VState::Done].contains(&ok_dep.id()));
    broker.teardown();
}
