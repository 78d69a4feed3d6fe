//! In-process error fan-out for the feed client.
//!
//! Data operations that fail in the background (document listeners, page
//! fetches, detached writes) cannot return an error to whoever started them.
//! They report through an [`ErrorChannel`] instead: a cloneable pub/sub
//! service that UI boundaries subscribe to for toasts and alerts.
//!
//! [`PermissionError`] is the payload those operations publish. It records
//! which path and operation were refused and renders a diagnostic message
//! embedding the request.

mod channel;
mod event;
mod permission;

pub use channel::{ErrorChannel, Listener, ListenerHandle, ListenerId};
pub use event::{ErrorEvent, ErrorPayload, GENERIC_ERROR, PERMISSION_ERROR};
pub use permission::{Operation, PermissionError, PermissionRequest, RequestResource};
