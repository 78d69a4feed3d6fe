use crate::AuthResult;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};

/// A signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl AuthUser {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: None,
            display_name: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Called with the new user, or `None` after sign-out.
pub type AuthStateCallback = Arc<dyn Fn(Option<AuthUser>) + Send + Sync>;

/// The auth collaborator.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in_with_custom_token(&self, token: &str) -> AuthResult<AuthUser>;

    async fn sign_in_with_email_and_password(
        &self,
        email: &str,
        password: &str,
    ) -> AuthResult<AuthUser>;

    async fn create_user_with_email_and_password(
        &self,
        email: &str,
        password: &str,
    ) -> AuthResult<AuthUser>;

    async fn sign_out(&self) -> AuthResult<()>;

    /// Register for user changes. The callback is invoked once immediately
    /// with the current user.
    fn on_auth_state_changed(&self, callback: AuthStateCallback) -> AuthListenerHandle;

    /// Current ID token, refreshed first when `force_refresh` is set or the
    /// cached token is about to expire. `Ok(None)` when signed out.
    async fn id_token(&self, force_refresh: bool) -> AuthResult<Option<String>>;

    fn current_user(&self) -> Option<AuthUser>;
}

#[derive(Default)]
struct ListenerSet {
    next_id: u64,
    entries: Vec<(u64, AuthStateCallback)>,
}

/// Auth state listener registry shared by provider implementations.
#[derive(Clone, Default)]
pub struct AuthListeners {
    inner: Arc<Mutex<ListenerSet>>,
}

impl AuthListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, callback: AuthStateCallback) -> AuthListenerHandle {
        let id = {
            let mut set = self.inner.lock();
            set.next_id += 1;
            let id = set.next_id;
            set.entries.push((id, callback));
            id
        };

        let weak: Weak<Mutex<ListenerSet>> = Arc::downgrade(&self.inner);
        AuthListenerHandle::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.lock().entries.retain(|(entry_id, _)| *entry_id != id);
            }
        })
    }

    /// Invoke every listener with `user`. Listeners run outside the lock.
    pub fn notify(&self, user: Option<AuthUser>) {
        let snapshot: Vec<AuthStateCallback> = self
            .inner
            .lock()
            .entries
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for callback in snapshot {
            callback(user.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Unsubscribes an auth state listener when removed or dropped.
#[must_use = "dropping the handle unsubscribes the listener"]
pub struct AuthListenerHandle {
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl AuthListenerHandle {
    pub fn new(release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    pub fn unsubscribe(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for AuthListenerHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for AuthListenerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthListenerHandle")
            .field("active", &self.release.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (AuthStateCallback, Arc<Mutex<Vec<Option<String>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let cb: AuthStateCallback = {
            let seen = seen.clone();
            Arc::new(move |user: Option<AuthUser>| seen.lock().push(user.map(|u| u.uid)))
        };
        (cb, seen)
    }

    #[test]
    fn test_notify_reaches_listeners() {
        let listeners = AuthListeners::new();
        let (cb, seen) = recorder();
        let _handle = listeners.add(cb);

        listeners.notify(Some(AuthUser::new("u1")));
        listeners.notify(None);

        assert_eq!(*seen.lock(), vec![Some("u1".to_string()), None]);
    }

    #[test]
    fn test_drop_handle_unsubscribes() {
        let listeners = AuthListeners::new();
        let (cb, seen) = recorder();
        let handle = listeners.add(cb);
        assert_eq!(listeners.len(), 1);

        drop(handle);
        assert!(listeners.is_empty());
        listeners.notify(Some(AuthUser::new("u1")));
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let listeners = AuthListeners::new();
        let (cb, _) = recorder();
        let mut handle = listeners.add(cb);
        handle.unsubscribe();
        handle.unsubscribe();
        assert!(listeners.is_empty());
    }

    #[test]
    fn test_auth_user_serialization_skips_missing() {
        let user = AuthUser::new("u1").with_email("a@example.com");
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["uid"], "u1");
        assert_eq!(json["email"], "a@example.com");
        assert!(json.get("display_name").is_none());
    }
}
