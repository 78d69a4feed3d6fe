use crate::DocumentStore;
use std::sync::Arc;

/// Whether a document store was configured, checked once at startup and
/// passed to every component that reads or writes documents.
#[derive(Clone, Default)]
pub enum Backend {
    Available(Arc<dyn DocumentStore>),
    #[default]
    Unavailable,
}

impl Backend {
    pub fn available<S: DocumentStore + 'static>(store: S) -> Self {
        Backend::Available(Arc::new(store))
    }

    pub fn from_option(store: Option<Arc<dyn DocumentStore>>) -> Self {
        match store {
            Some(store) => Backend::Available(store),
            None => Backend::Unavailable,
        }
    }

    pub fn store(&self) -> Option<&Arc<dyn DocumentStore>> {
        match self {
            Backend::Available(store) => Some(store),
            Backend::Unavailable => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Backend::Available(_))
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Available(_) => f.write_str("Backend::Available"),
            Backend::Unavailable => f.write_str("Backend::Unavailable"),
        }
    }
}
