use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use lockbox_types::events::GatewayEvent;

/// How long `push` waits on a single connection before declaring it dead.
pub const DEFAULT_PUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Per-connection outbound buffer. A client that lets this fill up and stay
/// full past the push timeout gets evicted.
const HANDLE_BUFFER: usize = 64;

/// The registry's side of one live connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    tx: mpsc::Sender<GatewayEvent>,
}

impl ConnectionHandle {
    /// Create a handle plus the receiver the connection task drains.
    pub fn new() -> (Self, mpsc::Receiver<GatewayEvent>) {
        let (tx, rx) = mpsc::channel(HANDLE_BUFFER);
        (
            Self {
                id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    async fn deliver(&self, event: GatewayEvent, timeout: Duration) -> bool {
        self.tx.send_timeout(event, timeout).await.is_ok()
    }
}

/// Process-wide map of identity -> live connection handles.
///
/// Multiple handles per identity are kept side by side (one per device);
/// nothing here is persisted and nothing is queued for offline identities.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// identity_id -> (conn_id -> handle)
    connections: RwLock<HashMap<Uuid, HashMap<Uuid, ConnectionHandle>>>,
    push_timeout: Duration,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::with_push_timeout(DEFAULT_PUSH_TIMEOUT)
    }

    pub fn with_push_timeout(push_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                connections: RwLock::new(HashMap::new()),
                push_timeout,
            }),
        }
    }

    /// Add a handle for `identity`. Existing handles are left alone.
    pub async fn connect(&self, identity: Uuid, handle: ConnectionHandle) {
        let mut connections = self.inner.connections.write().await;
        let handles = connections.entry(identity).or_default();
        handles.insert(handle.id, handle);
        debug!("{} now has {} live connection(s)", identity, handles.len());
    }

    /// Create a handle, register it, and return its id and receiver.
    pub async fn register(&self, identity: Uuid) -> (Uuid, mpsc::Receiver<GatewayEvent>) {
        let (handle, rx) = ConnectionHandle::new();
        let conn_id = handle.id();
        self.connect(identity, handle).await;
        (conn_id, rx)
    }

    /// Remove one handle. Idempotent: returns false if it was already gone.
    /// The identity's entry disappears with its last handle.
    pub async fn disconnect(&self, identity: Uuid, conn_id: Uuid) -> bool {
        let mut connections = self.inner.connections.write().await;
        let Some(handles) = connections.get_mut(&identity) else {
            return false;
        };
        let removed = handles.remove(&conn_id).is_some();
        if handles.is_empty() {
            connections.remove(&identity);
        }
        removed
    }

    /// Deliver `event` to every live handle of `identity`.
    ///
    /// Never fails. Handles that are closed or stay full past the push
    /// timeout are evicted. Returns how many handles accepted the event.
    pub async fn push(&self, identity: Uuid, event: GatewayEvent) -> usize {
        // Snapshot so no lock is held across the sends; a concurrent
        // disconnect just means a handle may receive one last event.
        let handles: Vec<ConnectionHandle> = {
            let connections = self.inner.connections.read().await;
            match connections.get(&identity) {
                Some(handles) => handles.values().cloned().collect(),
                None => {
                    debug!("No live connections for {}, dropping {}", identity, event.kind());
                    return 0;
                }
            }
        };

        // Handles are driven concurrently; a push takes at most one timeout.
        let timeout = self.inner.push_timeout;
        let results = join_all(handles.iter().map(|handle| {
            let event = event.clone();
            async move { (handle.id, handle.deliver(event, timeout).await) }
        }))
        .await;

        let delivered = results.iter().filter(|(_, ok)| *ok).count();
        let dead: Vec<Uuid> = results
            .into_iter()
            .filter_map(|(id, ok)| (!ok).then_some(id))
            .collect();

        if !dead.is_empty() {
            warn!(
                "Evicting {} dead connection(s) for {} after failed {} push",
                dead.len(),
                identity,
                event.kind()
            );
            for conn_id in dead {
                self.disconnect(identity, conn_id).await;
            }
        }

        delivered
    }

    /// Fire-and-forget `push` on a background task. The caller never waits
    /// on, or learns about, delivery.
    pub fn notify(&self, identity: Uuid, event: GatewayEvent) {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            dispatcher.push(identity, event).await;
        });
    }

    pub async fn connection_count(&self, identity: Uuid) -> usize {
        self.inner
            .connections
            .read()
            .await
            .get(&identity)
            .map_or(0, HashMap::len)
    }

    pub async fn is_online(&self, identity: Uuid) -> bool {
        self.inner.connections.read().await.contains_key(&identity)
    }
}
