//! Session state machine for the identity provider.
//!
//! ```text
//! SignedOut ──SignInAttempt──► SigningIn ──SignInSuccess──► SignedIn
//!     ▲                            │                          │  │
//!     └────────SignInFailed────────┘            TokenExpired  │  │ SignOutRequested
//!     ▲                                                       ▼  ▼
//!     ├──────────RefreshFailed─────────── Refreshing      SigningOut
//!     │                           (RefreshSuccess/RefreshAborted ──► SignedIn)
//!     └──────────SignOutComplete──────────────────────────────┘
//! ```

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub session_machine(SignedOut)

    SignedOut => {
        SignInAttempt => SigningIn
    },
    SigningIn => {
        SignInSuccess => SignedIn,
        SignInFailed => SignedOut
    },
    SignedIn => {
        // Switching accounts without signing out first.
        SignInAttempt => SigningIn,
        TokenExpired => Refreshing,
        SignOutRequested => SigningOut
    },
    Refreshing => {
        RefreshSuccess => SignedIn,
        // Transient failure; the session is kept.
        RefreshAborted => SignedIn,
        RefreshFailed => SignedOut
    },
    SigningOut => {
        SignOutComplete => SignedOut
    }
}

pub use session_machine::Input as SessionMachineInput;
pub use session_machine::State as SessionMachineState;
pub use session_machine::StateMachine as SessionMachine;

/// Session state for logging and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    SignedOut,
    SigningIn,
    SignedIn,
    Refreshing,
    SigningOut,
}

impl SessionState {
    pub fn is_signed_in(&self) -> bool {
        matches!(self, SessionState::SignedIn | SessionState::Refreshing)
    }

    /// In-progress states.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SessionState::SigningIn | SessionState::Refreshing | SessionState::SigningOut
        )
    }
}

impl From<&SessionMachineState> for SessionState {
    fn from(state: &SessionMachineState) -> Self {
        match state {
            SessionMachineState::SignedOut => SessionState::SignedOut,
            SessionMachineState::SigningIn => SessionState::SigningIn,
            SessionMachineState::SignedIn => SessionState::SignedIn,
            SessionMachineState::Refreshing => SessionState::Refreshing,
            SessionMachineState::SigningOut => SessionState::SigningOut,
        }
    }
}
