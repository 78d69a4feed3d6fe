//! Cursor-based paging over one collection, newest first.

use crate::{lock, DataError, PagerError, PagerResult};
use doc_store::{Backend, Cursor, ListQuery, OrderDirection};
use error_channel::{ErrorChannel, Operation, PermissionError};
use serde_json::Value;
use std::sync::Mutex;
use tracing::{debug, warn};

pub const DEFAULT_PAGE_SIZE: usize = 8;
pub const DEFAULT_ORDER_FIELD: &str = "createdAt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagerConfig {
    pub path: String,
    pub page_size: usize,
    pub order_field: String,
}

impl PagerConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            page_size: DEFAULT_PAGE_SIZE,
            order_field: DEFAULT_ORDER_FIELD.to_string(),
        }
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn order_field(mut self, order_field: impl Into<String>) -> Self {
        self.order_field = order_field.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PagerState {
    /// Documents as `{ ...fields, id }`, in page order.
    pub items: Vec<Value>,
    pub loading: bool,
    pub error: Option<DataError>,
    pub has_more: bool,
}

impl Default for PagerState {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            loading: false,
            error: None,
            has_more: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Merge {
    Replace,
    Append,
}

#[derive(Default)]
struct Inner {
    state: PagerState,
    marker: Option<Cursor>,
    /// Bumped by `refresh` and `close`; results from older epochs are dropped.
    epoch: u64,
    closed: bool,
}

pub struct CollectionPager {
    backend: Backend,
    channel: ErrorChannel,
    config: PagerConfig,
    inner: Mutex<Inner>,
}

impl CollectionPager {
    pub fn new(backend: Backend, channel: ErrorChannel, config: PagerConfig) -> PagerResult<Self> {
        if config.page_size == 0 {
            return Err(PagerError::InvalidPageSize);
        }
        let path = config.path.trim_matches('/');
        if path.is_empty() {
            return Err(PagerError::EmptyPath);
        }
        let config = PagerConfig {
            path: path.to_string(),
            ..config
        };

        Ok(Self {
            backend,
            channel,
            config,
            inner: Mutex::new(Inner::default()),
        })
    }

    /// Create the pager and load the first page.
    pub async fn open(
        backend: Backend,
        channel: ErrorChannel,
        config: PagerConfig,
    ) -> PagerResult<Self> {
        let pager = Self::new(backend, channel, config)?;
        pager.start().await;
        Ok(pager)
    }

    /// Initial load.
    pub async fn start(&self) {
        self.refresh().await;
    }

    pub fn config(&self) -> &PagerConfig {
        &self.config
    }

    pub fn state(&self) -> PagerState {
        lock(&self.inner).state.clone()
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.inner).closed
    }

    /// Reset the cursor and replace the items with the first page.
    pub async fn refresh(&self) {
        let epoch = {
            let mut inner = lock(&self.inner);
            if inner.closed {
                return;
            }
            inner.epoch += 1;
            inner.marker = None;
            inner.state.has_more = true;
            inner.state.loading = true;
            inner.state.error = None;
            inner.epoch
        };
        self.fetch_page(epoch, None, Merge::Replace).await;
    }

    /// Append the page after the cursor. Does nothing once the collection
    /// is exhausted.
    pub async fn load_more(&self) {
        let (epoch, marker) = {
            let mut inner = lock(&self.inner);
            if inner.closed || !inner.state.has_more {
                return;
            }
            inner.state.loading = true;
            inner.state.error = None;
            (inner.epoch, inner.marker.clone())
        };
        self.fetch_page(epoch, marker, Merge::Append).await;
    }

    /// Tear down; in-flight results are discarded and later calls do nothing.
    pub fn close(&self) {
        let mut inner = lock(&self.inner);
        inner.closed = true;
        inner.epoch += 1;
        inner.state.loading = false;
    }

    async fn fetch_page(&self, epoch: u64, marker: Option<Cursor>, merge: Merge) {
        let path = self.config.path.as_str();

        let Some(store) = self.backend.store() else {
            warn!(path, "Document store unavailable, not paging");
            let mut inner = lock(&self.inner);
            if inner.epoch == epoch {
                inner.state.loading = false;
                inner.state.error = Some(DataError::store_unavailable());
            }
            return;
        };

        let query = ListQuery::new(path)
            .order_by(&self.config.order_field, OrderDirection::Descending)
            .limit(self.config.page_size)
            .start_after(marker);
        let result = store.list(&query).await;

        let mut inner = lock(&self.inner);
        if inner.closed || inner.epoch != epoch {
            debug!(path, epoch, "Discarding stale page");
            return;
        }

        match result {
            Ok(page) => {
                if let Some(last) = page.last() {
                    inner.marker = Some(last.cursor(&self.config.order_field));
                }
                let fetched = page.len();
                let items = page.iter().filter_map(|doc| doc.data());
                match merge {
                    Merge::Replace => inner.state.items = items.collect(),
                    Merge::Append => inner.state.items.extend(items),
                }
                inner.state.has_more = fetched == self.config.page_size;
                inner.state.loading = false;
                debug!(
                    path,
                    fetched,
                    total = inner.state.items.len(),
                    has_more = inner.state.has_more,
                    "Page loaded"
                );
            }
            Err(e) => {
                let permission = PermissionError::new(path, Operation::List, None);
                inner.state.loading = false;
                inner.state.error = Some(permission.clone().into());
                drop(inner);

                warn!(path, error = %e, "Page fetch failed");
                self.channel.publish_permission(permission);
            }
        }
    }
}

impl std::fmt::Debug for CollectionPager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionPager")
            .field("config", &self.config)
            .field("backend", &self.backend)
            .finish()
    }
}
