//! Reactive data layer for the feed client.
//!
//! Reads go through [`DocumentSubscription`] (one live document) and
//! [`CollectionPager`] (cursor-paged collection). Writes go through
//! [`NonBlockingWriter`], whose failures surface only on the
//! [`ErrorChannel`](error_channel::ErrorChannel).

mod current_user;
mod error;
mod pager;
mod subscription;
mod writer;

pub use current_user::{CurrentUser, CurrentUserState};
pub use error::{DataError, PagerError, PagerResult};
pub use pager::{CollectionPager, PagerConfig, PagerState, DEFAULT_ORDER_FIELD, DEFAULT_PAGE_SIZE};
pub use subscription::{DocumentSubscription, SubscriptionPhase, SubscriptionState};
pub use writer::NonBlockingWriter;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
