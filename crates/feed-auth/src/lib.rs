//! Authentication for the feed client.
//!
//! - [`AuthProvider`]: the auth collaborator contract (custom-token and
//!   password sign-in, sign-up, sign-out, state listeners, ID tokens).
//! - [`IdentityToolkitAuth`]: REST implementation with an explicit session
//!   state machine and automatic ID token refresh.
//! - [`SessionTokenProvider`]: adapts any provider to
//!   [`authed_fetch::TokenProvider`].
//! - [`AccountService`]: sign-in/sign-up through the companion service,
//!   with transient-error retry and user-facing error messages.
//! - [`retryable`]: exponential backoff for transient failures.

mod account;
mod error;
mod identity;
mod provider;
pub mod retry;
mod session_fsm;
mod token;

pub use account::{AccountService, SignUpProfile};
pub use error::{AuthError, AuthResult};
pub use identity::IdentityToolkitAuth;
pub use provider::{AuthListenerHandle, AuthListeners, AuthProvider, AuthStateCallback, AuthUser};
pub use retry::{retryable, RetryPolicy, Transient};
pub use session_fsm::{SessionMachine, SessionMachineInput, SessionMachineState, SessionState};
pub use token::SessionTokenProvider;
