//! Synchronous, ordered pub/sub for error events.

use crate::{ErrorEvent, ErrorPayload, PermissionError, PERMISSION_ERROR};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use tracing::{trace, warn};

/// Callback invoked for every event of the subscribed kind.
pub type Listener = Arc<dyn Fn(&ErrorEvent) + Send + Sync>;

/// Identifies one registration on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct Registry {
    next_id: u64,
    by_kind: HashMap<String, Vec<(ListenerId, Listener)>>,
}

impl Registry {
    fn remove(&mut self, kind: &str, id: ListenerId) -> bool {
        let Some(listeners) = self.by_kind.get_mut(kind) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        let removed = listeners.len() != before;
        if listeners.is_empty() {
            self.by_kind.remove(kind);
        }
        removed
    }
}

/// Process-wide error fan-out, passed by clone to every component that
/// reports or displays errors.
///
/// Listeners for a kind run synchronously on the publishing thread in
/// registration order. A panicking listener is logged and skipped. Events
/// published with no listener are dropped.
#[derive(Clone, Default)]
pub struct ErrorChannel {
    registry: Arc<Mutex<Registry>>,
}

impl ErrorChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for `kind`. The returned handle unregisters it
    /// when dropped.
    pub fn subscribe<F>(&self, kind: &str, listener: F) -> ListenerHandle
    where
        F: Fn(&ErrorEvent) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock();
        registry.next_id += 1;
        let id = ListenerId(registry.next_id);
        registry
            .by_kind
            .entry(kind.to_string())
            .or_default()
            .push((id, Arc::new(listener)));
        drop(registry);

        trace!(kind, listener_id = id.0, "error listener registered");

        ListenerHandle {
            registry: Arc::downgrade(&self.registry),
            kind: kind.to_string(),
            id,
            active: true,
        }
    }

    /// Remove a registration. Returns false if it was already gone.
    pub fn unsubscribe(&self, kind: &str, id: ListenerId) -> bool {
        self.registry.lock().remove(kind, id)
    }

    /// Deliver an event to every listener of `kind`, returning how many ran
    /// to completion.
    pub fn publish(&self, kind: &str, payload: impl Into<ErrorPayload>) -> usize {
        // Snapshot so listeners may (un)subscribe while being notified.
        let listeners: Vec<(ListenerId, Listener)> = self
            .registry
            .lock()
            .by_kind
            .get(kind)
            .cloned()
            .unwrap_or_default();

        if listeners.is_empty() {
            trace!(kind, "error event dropped, no listeners");
            return 0;
        }

        let event = ErrorEvent {
            kind: kind.to_string(),
            payload: payload.into(),
        };

        let mut delivered = 0;
        for (id, listener) in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener(&event))) {
                Ok(()) => delivered += 1,
                Err(_) => warn!(kind, listener_id = id.0, "error listener panicked"),
            }
        }
        delivered
    }

    /// Publish on [`PERMISSION_ERROR`].
    pub fn publish_permission(&self, err: PermissionError) -> usize {
        self.publish(PERMISSION_ERROR, err)
    }

    /// Publish a plain text message on `kind`.
    pub fn publish_message(&self, kind: &str, message: impl Into<String>) -> usize {
        self.publish(kind, ErrorPayload::Message(message.into()))
    }

    pub fn listener_count(&self, kind: &str) -> usize {
        self.registry
            .lock()
            .by_kind
            .get(kind)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for ErrorChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.registry.lock();
        f.debug_struct("ErrorChannel")
            .field("kinds", &registry.by_kind.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Registration guard returned by [`ErrorChannel::subscribe`].
#[must_use = "dropping the handle unregisters the listener"]
#[derive(Debug)]
pub struct ListenerHandle {
    registry: Weak<Mutex<Registry>>,
    kind: String,
    id: ListenerId,
    active: bool,
}

impl ListenerHandle {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Unregister now. Safe to call repeatedly.
    pub fn unsubscribe(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().remove(&self.kind, self.id);
            trace!(kind = %self.kind, listener_id = self.id.0, "error listener removed");
        }
    }

    /// Keep the listener registered for the channel's lifetime.
    pub fn detach(mut self) {
        self.active = false;
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
