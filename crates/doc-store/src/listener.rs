//! Live document listeners and their release guard.

use crate::{DocumentSnapshot, StoreError};
use tokio::sync::mpsc;

/// One notification from a live document listener.
#[derive(Debug)]
pub enum DocumentEvent {
    Snapshot(DocumentSnapshot),
    /// The listener failed; no further events follow.
    Error(StoreError),
}

/// Releases a backend listener exactly once: on [`remove`](Self::remove)
/// or on drop, whichever comes first.
#[must_use = "dropping the registration releases the listener"]
pub struct ListenerRegistration {
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl ListenerRegistration {
    pub fn new<F>(release: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Registration with nothing to release.
    pub fn noop() -> Self {
        Self { release: None }
    }

    pub fn is_active(&self) -> bool {
        self.release.is_some()
    }

    pub fn remove(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        self.remove();
    }
}

impl std::fmt::Debug for ListenerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Stream of [`DocumentEvent`]s for one document plus the guard that keeps
/// the backend listener alive.
#[derive(Debug)]
pub struct DocumentListener {
    events: mpsc::UnboundedReceiver<DocumentEvent>,
    registration: ListenerRegistration,
}

impl DocumentListener {
    pub fn new(
        events: mpsc::UnboundedReceiver<DocumentEvent>,
        registration: ListenerRegistration,
    ) -> Self {
        Self {
            events,
            registration,
        }
    }

    /// Next event, or `None` once the backend stops sending.
    pub async fn next(&mut self) -> Option<DocumentEvent> {
        self.events.recv().await
    }

    pub fn into_parts(self) -> (mpsc::UnboundedReceiver<DocumentEvent>, ListenerRegistration) {
        (self.events, self.registration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_registration() -> (ListenerRegistration, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let registration = ListenerRegistration::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (registration, count)
    }

    #[test]
    fn test_remove_releases_once() {
        let (mut registration, count) = counting_registration();
        registration.remove();
        registration.remove();
        drop(registration);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_releases() {
        let (registration, count) = counting_registration();
        assert!(registration.is_active());
        drop(registration);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_listener_yields_events_then_none() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut listener = DocumentListener::new(rx, ListenerRegistration::noop());

        tx.send(DocumentEvent::Snapshot(DocumentSnapshot::missing("posts/p1", "p1")))
            .unwrap();
        drop(tx);

        assert!(matches!(listener.next().await, Some(DocumentEvent::Snapshot(_))));
        assert!(listener.next().await.is_none());
    }
}
