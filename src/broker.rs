use crate::error::Error;
use crate::payload::Payload;
use crate::state::{VKey, VStateData, VertexId};
use crate::store::DataStore;
use crate::tracker::VTracker;
use crate::vertex::Vertex;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

const CHANNEL_CAPACITY: usize = 128;

/// A state-mutation request sent by a vertex (or the main flow) to the
/// broker. Each request carries the identity of its sender in the envelope.
pub enum Request {
    /// Fetch snapshots: for exactly `deps` when given, otherwise everything
    /// the store knows about.
    GetStateData { deps: Option<Vec<VKey>> },
    /// Persist the sender's latest snapshot.
    Update { data: VStateData },
    /// Construct and start a new vertex whose sole dependency is the sender.
    AddVertex { payload: Arc<dyn Payload> },
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::GetStateData { deps } => f.debug_struct("GetStateData").field("deps", deps).finish(),
            Request::Update { data } => f.debug_struct("Update").field("data", data).finish(),
            Request::AddVertex { .. } => f.debug_struct("AddVertex").finish_non_exhaustive(),
        }
    }
}

#[derive(Debug)]
pub enum Response {
    StateData(Vec<VStateData>),
    Updated,
    VertexAdded(Vertex),
}

struct Envelope {
    from: VertexId,
    request: Request,
    reply: oneshot::Sender<Result<Response, Error>>,
}

/// Clonable sender side of the broker: what vertices use to talk to it.
#[derive(Clone)]
pub struct BrokerHandle {
    tx: mpsc::Sender<Envelope>,
}

impl BrokerHandle {
    /// Synchronous round-trip to the broker loop. An error reply is raised
    /// to the caller; transport failure in either direction is
    /// [`Error::SendFailure`].
    pub async fn ask(&self, from: VertexId, request: Request) -> Result<Response, Error> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Envelope { from, request, reply: reply_tx })
            .await
            .map_err(|cause| Error::SendFailure(cause.to_string()))?;
        debug!(%from, "waiting for response");
        reply_rx
            .await
            .map_err(|cause| Error::SendFailure(cause.to_string()))?
    }

    pub async fn get_state_data(
        &self,
        from: VertexId,
        deps: Option<Vec<VKey>>,
    ) -> Result<Vec<VStateData>, Error> {
        match self.ask(from, Request::GetStateData { deps }).await? {
            Response::StateData(data) => Ok(data),
            _ => Err(Error::UnknownRequest),
        }
    }

    pub async fn update(&self, from: VertexId, data: VStateData) -> Result<(), Error> {
        match self.ask(from, Request::Update { data }).await? {
            Response::Updated => Ok(()),
            _ => Err(Error::UnknownRequest),
        }
    }

    pub async fn add_vertex(
        &self,
        from: VertexId,
        payload: Arc<dyn Payload>,
    ) -> Result<Vertex, Error> {
        match self.ask(from, Request::AddVertex { payload }).await? {
            Response::VertexAdded(vertex) => Ok(vertex),
            _ => Err(Error::UnknownRequest),
        }
    }
}

/// The single serialization point of a run: owns the data store (and the
/// tracker when enabled) and processes requests one at a time on one task,
/// making it the sole writer of shared state.
///
/// Explicit lifecycle: construct, [`start`](Self::start), run the graph,
/// [`wait_all`](Self::wait_all), [`teardown`](Self::teardown).
pub struct Broker {
    store: Arc<DataStore>,
    tracker: Option<Arc<RwLock<VTracker>>>,
    tx: mpsc::Sender<Envelope>,
    rx: Option<mpsc::Receiver<Envelope>>,
    worker: Option<JoinHandle<()>>,
}

impl Broker {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        Self {
            store: Arc::new(DataStore::new()),
            tracker: None,
            tx,
            rx: Some(rx),
            worker: None,
        }
    }

    /// Launch the processing loop. Idempotent: when the loop is already
    /// running this is a no-op returning another handle to it. `track`
    /// enables the graph tracker for this run.
    pub fn start(&mut self, track: bool) -> BrokerHandle {
        if self.worker.as_ref().is_some_and(|worker| !worker.is_finished()) {
            return self.handle();
        }
        let Some(mut rx) = self.rx.take() else {
            // loop already consumed the receiver; nothing left to restart
            return self.handle();
        };

        if track && self.tracker.is_none() {
            self.tracker = Some(Arc::new(RwLock::new(VTracker::new())));
        }

        let store = self.store.clone();
        let tracker = self.tracker.clone();
        let handle = self.handle();
        self.worker = Some(tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                let Envelope { from, request, reply } = envelope;
                debug!(%from, ?request, "received request");
                let result = process(&store, tracker.as_deref(), &handle, from, request)
                    .map_err(|cause| {
                        warn!(%from, %cause, "error on request processing");
                        Error::RequestProcessingFailed { message: cause.to_string() }
                    });
                if reply.send(result).is_err() {
                    debug!(%from, "requester is gone, dropping reply");
                }
            }
            info!("broker loop finished");
        }));
        info!("broker is started");
        self.handle()
    }

    pub fn handle(&self) -> BrokerHandle {
        BrokerHandle { tx: self.tx.clone() }
    }

    /// Shared view of the data store; read-only for everyone but the loop.
    pub fn store(&self) -> Arc<DataStore> {
        self.store.clone()
    }

    /// Shared view of the tracker, present when `start(true)` was used.
    pub fn tracker(&self) -> Option<Arc<RwLock<VTracker>>> {
        self.tracker.clone()
    }

    /// Forcibly stop the processing loop.
    pub fn teardown(&mut self) {
        if let Some(worker) = self.worker.take() {
            info!("shut down broker");
            worker.abort();
        }
    }

    /// Spawn a background wait for every known vertex to reach a final
    /// state, checking the store every `period`. An empty store keeps the
    /// wait alive so vertices spawned after the call are not missed.
    /// `None` timeout waits forever.
    pub fn wait_all(
        &self,
        timeout: Option<Duration>,
        period: Duration,
    ) -> JoinHandle<Result<(), Error>> {
        let store = self.store.clone();
        tokio::spawn(async move {
            info!(?timeout, "waiting for all vertices to finish");
            let wait = async move {
                loop {
                    time::sleep(period).await;
                    if store.is_empty() {
                        continue;
                    }
                    let all = store.all();
                    debug!(known = all.len(), "checking vertices states");
                    if all.iter().all(VStateData::is_terminal) {
                        break;
                    }
                }
            };
            match timeout {
                None => {
                    wait.await;
                    Ok(())
                }
                Some(limit) => time::timeout(limit, wait)
                    .await
                    .map_err(|_elapsed| Error::WaitTimedOut(limit)),
            }
        })
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

/// The broker's single serialized decision point.
fn process(
    store: &DataStore,
    tracker: Option<&RwLock<VTracker>>,
    handle: &BrokerHandle,
    from: VertexId,
    request: Request,
) -> Result<Response, Error> {
    match request {
        Request::GetStateData { deps: None } => Ok(Response::StateData(store.all())),
        Request::GetStateData { deps: Some(deps) } => {
            track(tracker, store, from, &deps);
            let found = deps.iter().filter_map(|key| store.get(key)).collect();
            Ok(Response::StateData(found))
        }
        Request::Update { data } => {
            store.put(data)?;
            track(tracker, store, from, &[]);
            Ok(Response::Updated)
        }
        Request::AddVertex { payload } => {
            let vertex = Vertex::builder(payload).depends_on([from]).spawn(handle)?;
            track(tracker, store, vertex.id(), &[VKey::by_vertex(from)]);
            Ok(Response::VertexAdded(vertex))
        }
    }
}

fn track(tracker: Option<&RwLock<VTracker>>, store: &DataStore, vertex: VertexId, deps: &[VKey]) {
    let Some(tracker) = tracker else { return };
    // the loop is the only writer, so this lock is never contended for long
    if let Ok(mut tracker) = tracker.write() {
        tracker.track(vertex, deps, store);
    }
}
