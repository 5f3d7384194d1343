use async_trait::async_trait;
use exdag::broker::Broker;
use exdag::payload::{self, Payload, PayloadContext};
use exdag::state::{VStateData, VertexId};
use exdag::timeout::VTimeout;
use exdag::vertex::Vertex;
use serde_json::{Value, json};
use std::time::Duration;

async fn settle(broker: &Broker) {
    broker
        .wait_all(Some(Duration::from_secs(10)), Duration::from_millis(20))
        .await
        .unwrap()
        .expect("graph did not settle in time");
}

#[tokio::test]
async fn test_single_vertex_reaches_done() {
    let mut broker = Broker::new();
    let handle = broker.start(false);

    let vertex = Vertex::builder(payload::from_fn(|| Ok(json!("hello"))))
        .name("solo")
        .spawn(&handle)
        .unwrap();
    settle(&broker).await;

    let stored = broker.store().get_by_vertex(vertex.id()).unwrap();
    assert!(stored.is_done());
    assert_eq!(stored.data, Some(json!("hello")));
    assert_eq!(stored.name.as_deref(), Some("solo"));
    broker.teardown();
}

#[tokio::test]
async fn test_dependency_data_flows_to_payload() {
    let mut broker = Broker::new();
    let handle = broker.start(false);

    Vertex::builder(payload::from_fn(|| Ok(json!(2))))
        .name("dep1")
        .spawn(&handle)
        .unwrap();
    Vertex::builder(payload::from_fn(|| Ok(json!(3))))
        .name("dep2")
        .spawn(&handle)
        .unwrap();
    let subject = Vertex::builder(payload::from_fn_with_deps(|deps| {
        let sum: i64 = deps.iter().filter_map(|d| d.data.as_ref()?.as_i64()).sum();
        Ok(json!(sum))
    }))
    .name("subject")
    .depends_on(["dep1", "dep2"])
    .spawn(&handle)
    .unwrap();
    settle(&broker).await;

    let stored = broker.store().get_by_vertex(subject.id()).unwrap();
    assert!(stored.is_done());
    assert_eq!(stored.data, Some(json!(5)));
    broker.teardown();
}

#[tokio::test]
async fn test_failed_dependency_cascades() {
    let mut broker = Broker::new();
    let handle = broker.start(false);

    Vertex::builder(payload::from_fn(|| Ok(json!("fine"))))
        .name("dep1")
        .spawn(&handle)
        .unwrap();
    Vertex::builder(payload::from_fn(|| anyhow::bail!("dep2 exploded")))
        .name("dep2")
        .spawn(&handle)
        .unwrap();
    let subject = Vertex::builder(payload::from_fn_with_deps(|_| Ok(json!("unreachable"))))
        .name("subject")
        .depends_on(["dep1", "dep2"])
        .spawn(&handle)
        .unwrap();
    // another level below the first casualty
    let downstream = Vertex::builder(payload::from_fn(|| Ok(json!("unreachable"))))
        .depends_on(["subject"])
        .spawn(&handle)
        .unwrap();
    settle(&broker).await;

    let store = broker.store();
    assert!(store.get_by_name("dep1").unwrap().is_done());
    assert!(store.get_by_name("dep2").unwrap().is_failed());
    assert!(store.get_by_vertex(subject.id()).unwrap().is_failed());
    assert!(store.get_by_vertex(downstream.id()).unwrap().is_failed());
    broker.teardown();
}

#[tokio::test]
async fn test_payload_timeout_fails_the_vertex() {
    let mut broker = Broker::new();
    let handle = broker.start(false);

    // a payload that sleeps well past its tier
    let slow = Vertex::builder(Sleepy.into_payload())
        .timeout(Duration::from_millis(100))
        .spawn(&handle)
        .unwrap();
    settle(&broker).await;

    let stored = broker.store().get_by_vertex(slow.id()).unwrap();
    assert!(stored.is_failed());
    let rendered = stored.data.unwrap().to_string();
    assert!(rendered.contains("timed out"), "got {rendered}");
    broker.teardown();
}

#[tokio::test]
async fn test_deps_timeout_fails_a_stuck_wait() {
    let mut broker = Broker::new();
    let handle = broker.start(false);

    // nobody will ever provide this dependency
    let stuck = Vertex::builder(payload::from_fn(|| Ok(json!("never"))))
        .depends_on(["ghost"])
        .timeout(VTimeout::new(None, Some(Duration::from_millis(150)), None).unwrap())
        .spawn(&handle)
        .unwrap();
    settle(&broker).await;

    assert!(broker.store().get_by_vertex(stuck.id()).unwrap().is_failed());
    broker.teardown();
}

#[tokio::test]
async fn test_global_timeout_bounds_the_whole_lifecycle() {
    let mut broker = Broker::new();
    let handle = broker.start(false);

    let stuck = Vertex::builder(payload::from_fn(|| Ok(json!("never"))))
        .depends_on(["ghost"])
        .timeout(VTimeout::new(Some(Duration::from_millis(200)), None, None).unwrap())
        .spawn(&handle)
        .unwrap();
    let stuck_id = stuck.id();
    stuck.join().await;
    // the forced failure report needs one more broker roundtrip
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(broker.store().get_by_vertex(stuck_id).unwrap().is_failed());
    broker.teardown();
}

#[tokio::test]
async fn test_excessive_payload_arity_is_rejected() {
    let mut broker = Broker::new();
    let handle = broker.start(false);

    let result = Vertex::builder(std::sync::Arc::new(TooGreedy)).spawn(&handle);
    assert!(matches!(result, Err(exdag::Error::IncorrectPayloadArity(2))));
    broker.teardown();
}

#[tokio::test]
async fn test_payload_spawns_vertices_at_runtime() {
    let mut broker = Broker::new();
    let handle = broker.start(false);

    let parent = Vertex::builder(std::sync::Arc::new(Fanout { count: 3 }))
        .name("parent")
        .spawn(&handle)
        .unwrap();
    settle(&broker).await;

    let store = broker.store();
    let parent_data = store.get_by_vertex(parent.id()).unwrap();
    assert!(parent_data.is_done());
    let spawned: Vec<VertexId> = serde_json::from_value(parent_data.data.unwrap()).unwrap();
    assert_eq!(spawned.len(), 3);

    // each spawned vertex depended on the parent and finished on its own
    for id in spawned {
        let child = store.get_by_vertex(id).unwrap();
        assert!(child.is_done());
        assert_eq!(child.data, Some(json!("spawned")));
    }
    broker.teardown();
}

struct Sleepy;

impl Sleepy {
    fn into_payload(self) -> std::sync::Arc<dyn Payload> {
        std::sync::Arc::new(self)
    }
}

#[async_trait]
impl Payload for Sleepy {
    fn arity(&self) -> usize {
        0
    }

    async fn run(&self, _ctx: &PayloadContext, _deps: Vec<VStateData>) -> anyhow::Result<Value> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(json!("woke up"))
    }
}

struct TooGreedy;

#[async_trait]
impl Payload for TooGreedy {
    fn arity(&self) -> usize {
        2
    }

    async fn run(&self, _ctx: &PayloadContext, _deps: Vec<VStateData>) -> anyhow::Result<Value> {
        Ok(json!(null))
    }
}

struct Fanout {
    count: usize,
}

#[async_trait]
impl Payload for Fanout {
    fn arity(&self) -> usize {
        0
    }

    async fn run(&self, ctx: &PayloadContext, _deps: Vec<VStateData>) -> anyhow::Result<Value> {
        let mut spawned = Vec::with_capacity(self.count);
        for _ in 0..self.count {
            let child = ctx.spawn(payload::from_fn(|| Ok(json!("spawned")))).await?;
            spawned.push(child.id());
        }
        Ok(serde_json::to_value(spawned)?)
    }
}
