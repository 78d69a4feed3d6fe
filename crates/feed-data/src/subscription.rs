//! Live subscription to a single document.
//!
//! At most one backend listener is live per subscription. Changing the path
//! releases the previous listener before the next one is requested, and a
//! generation counter drops notifications that arrive from a superseded
//! listener.

use crate::{lock, DataError};
use doc_store::{Backend, DocumentEvent, DocumentSnapshot, DocumentStore, ListenerRegistration, StoreError};
use error_channel::{ErrorChannel, Operation, PermissionError};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionPhase {
    /// No path.
    Idle,
    /// Waiting for the first snapshot.
    Loading,
    /// Receiving snapshots.
    Live,
    Errored,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionState {
    pub phase: SubscriptionPhase,
    /// Document fields plus `id`; `None` when missing or not loaded.
    pub data: Option<Value>,
    pub loading: bool,
    pub error: Option<DataError>,
}

impl SubscriptionState {
    fn idle() -> Self {
        Self {
            phase: SubscriptionPhase::Idle,
            data: None,
            loading: false,
            error: None,
        }
    }

    fn loading() -> Self {
        Self {
            phase: SubscriptionPhase::Loading,
            data: None,
            loading: true,
            error: None,
        }
    }

    fn live(data: Option<Value>) -> Self {
        Self {
            phase: SubscriptionPhase::Live,
            data,
            loading: false,
            error: None,
        }
    }

    fn errored(error: DataError) -> Self {
        Self {
            phase: SubscriptionPhase::Errored,
            data: None,
            loading: false,
            error: Some(error),
        }
    }
}

#[derive(Default)]
struct Slot {
    generation: u64,
    path: Option<String>,
    task: Option<JoinHandle<()>>,
    registration: Option<ListenerRegistration>,
}

impl Slot {
    /// Stop the forwarding task and release the backend listener.
    fn teardown(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if let Some(mut registration) = self.registration.take() {
            registration.remove();
        }
    }
}

struct Shared {
    slot: Mutex<Slot>,
    state: watch::Sender<SubscriptionState>,
    channel: ErrorChannel,
}

impl Shared {
    fn apply(&self, generation: u64, snapshot: DocumentSnapshot) {
        let slot = lock(&self.slot);
        if slot.generation != generation {
            return;
        }
        self.state.send_replace(SubscriptionState::live(snapshot.data()));
    }

    fn fail(&self, generation: u64, path: &str, err: StoreError) {
        let mut slot = lock(&self.slot);
        if slot.generation != generation {
            return;
        }
        let registration = slot.registration.take();
        let permission = PermissionError::new(path, Operation::Get, None);
        self.state
            .send_replace(SubscriptionState::errored(permission.clone().into()));
        drop(slot);
        drop(registration);

        warn!(path, error = %err, "Document subscription failed");
        self.channel.publish_permission(permission);
    }
}

/// Subscription to the document at a (changeable) path.
///
/// Must be used within a Tokio runtime.
pub struct DocumentSubscription {
    backend: Backend,
    shared: Arc<Shared>,
}

impl DocumentSubscription {
    pub fn new(backend: Backend, channel: ErrorChannel) -> Self {
        let (state, _) = watch::channel(SubscriptionState::idle());
        Self {
            backend,
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot::default()),
                state,
                channel,
            }),
        }
    }

    /// Create and immediately point at `path`.
    pub fn watch(backend: Backend, channel: ErrorChannel, path: Option<&str>) -> Self {
        let subscription = Self::new(backend, channel);
        subscription.set_path(path);
        subscription
    }

    /// Point the subscription at `path`; `None` (or an empty path) goes idle
    /// without contacting the backend. Setting the current path again is a
    /// no-op.
    pub fn set_path(&self, path: Option<&str>) {
        let path = path
            .map(|p| p.trim_matches('/'))
            .filter(|p| !p.is_empty())
            .map(str::to_string);

        let mut slot = lock(&self.shared.slot);
        if slot.path == path && slot.generation > 0 {
            return;
        }
        slot.teardown();
        slot.generation += 1;
        slot.path = path.clone();
        let generation = slot.generation;

        let Some(path) = path else {
            self.shared.state.send_replace(SubscriptionState::idle());
            return;
        };
        let Some(store) = self.backend.store().cloned() else {
            warn!(path = %path, "Document store unavailable, not subscribing");
            self.shared
                .state
                .send_replace(SubscriptionState::errored(DataError::store_unavailable()));
            return;
        };

        debug!(path = %path, generation, "Subscribing to document");
        self.shared.state.send_replace(SubscriptionState::loading());
        slot.task = Some(tokio::spawn(forward(
            self.shared.clone(),
            store,
            path,
            generation,
        )));
    }

    /// Go idle, releasing any listener.
    pub fn clear(&self) {
        self.set_path(None);
    }

    pub fn path(&self) -> Option<String> {
        lock(&self.shared.slot).path.clone()
    }

    pub fn state(&self) -> SubscriptionState {
        self.shared.state.borrow().clone()
    }

    pub fn phase(&self) -> SubscriptionPhase {
        self.shared.state.borrow().phase
    }

    /// Receiver for state changes.
    pub fn changes(&self) -> watch::Receiver<SubscriptionState> {
        self.shared.state.subscribe()
    }

    /// Wait until the state satisfies `predicate`.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&SubscriptionState) -> bool,
    ) -> SubscriptionState {
        let mut changes = self.changes();
        let state = match changes.wait_for(predicate).await {
            Ok(state) => (*state).clone(),
            Err(_) => self.state(),
        };
        state
    }
}

impl Drop for DocumentSubscription {
    fn drop(&mut self) {
        let mut slot = lock(&self.shared.slot);
        slot.generation += 1;
        slot.teardown();
    }
}

async fn forward(shared: Arc<Shared>, store: Arc<dyn DocumentStore>, path: String, generation: u64) {
    let listener = match store.listen(&path).await {
        Ok(listener) => listener,
        Err(e) => {
            shared.fail(generation, &path, e);
            return;
        }
    };
    let (mut events, registration) = listener.into_parts();

    {
        let mut slot = lock(&shared.slot);
        if slot.generation != generation {
            // Superseded during setup; dropping releases it.
            return;
        }
        slot.registration = Some(registration);
    }

    while let Some(event) = events.recv().await {
        match event {
            DocumentEvent::Snapshot(snapshot) => shared.apply(generation, snapshot),
            DocumentEvent::Error(e) => {
                shared.fail(generation, &path, e);
                return;
            }
        }
    }
    debug!(path = %path, "Document listener closed");
}
