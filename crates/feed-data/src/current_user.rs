//! The signed-in user together with their `users/{uid}` profile document.

use crate::{lock, DataError, DocumentSubscription, SubscriptionPhase, SubscriptionState};
use doc_store::Backend;
use error_channel::ErrorChannel;
use feed_auth::{AuthListenerHandle, AuthProvider, AuthUser};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct CurrentUserState {
    pub auth_user: Option<AuthUser>,
    pub profile: Option<Value>,
    pub loading: bool,
    pub error: Option<DataError>,
}

pub struct CurrentUser {
    auth_user: Arc<Mutex<Option<AuthUser>>>,
    profile: Arc<DocumentSubscription>,
    _listener: AuthListenerHandle,
}

impl CurrentUser {
    /// Track `auth`; the profile subscription follows sign-in and sign-out.
    pub fn new(auth: &dyn AuthProvider, backend: Backend, channel: ErrorChannel) -> Self {
        let auth_user = Arc::new(Mutex::new(None));
        let profile = Arc::new(DocumentSubscription::new(backend, channel));

        let listener = auth.on_auth_state_changed(Arc::new({
            let auth_user = auth_user.clone();
            let profile = profile.clone();
            move |user: Option<AuthUser>| {
                let path = user.as_ref().map(|u| format!("users/{}", u.uid));
                debug!(uid = ?user.as_ref().map(|u| &u.uid), "Current user changed");
                *lock(&auth_user) = user;
                profile.set_path(path.as_deref());
            }
        }));

        Self {
            auth_user,
            profile,
            _listener: listener,
        }
    }

    pub fn auth_user(&self) -> Option<AuthUser> {
        lock(&self.auth_user).clone()
    }

    pub fn state(&self) -> CurrentUserState {
        let SubscriptionState {
            data,
            loading,
            error,
            ..
        } = self.profile.state();
        CurrentUserState {
            auth_user: self.auth_user(),
            profile: data,
            loading,
            error,
        }
    }

    /// Wait until the profile subscription has settled (live, errored or idle).
    pub async fn settled(&self) -> CurrentUserState {
        self.profile
            .wait_for(|s| s.phase != SubscriptionPhase::Loading)
            .await;
        self.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use doc_store::InMemoryDocumentStore;
    use feed_auth::{AuthListeners, AuthResult, AuthStateCallback};
    use serde_json::json;

    #[derive(Default)]
    struct FakeAuth {
        user: Mutex<Option<AuthUser>>,
        listeners: AuthListeners,
    }

    impl FakeAuth {
        fn switch(&self, user: Option<AuthUser>) {
            *lock(&self.user) = user.clone();
            self.listeners.notify(user);
        }
    }

    #[async_trait]
    impl AuthProvider for FakeAuth {
        async fn sign_in_with_custom_token(&self, _: &str) -> AuthResult<AuthUser> {
            unimplemented!()
        }

        async fn sign_in_with_email_and_password(&self, _: &str, _: &str) -> AuthResult<AuthUser> {
            unimplemented!()
        }

        async fn create_user_with_email_and_password(
            &self,
            _: &str,
            _: &str,
        ) -> AuthResult<AuthUser> {
            unimplemented!()
        }

        async fn sign_out(&self) -> AuthResult<()> {
            self.switch(None);
            Ok(())
        }

        fn on_auth_state_changed(&self, callback: AuthStateCallback) -> AuthListenerHandle {
            let handle = self.listeners.add(callback.clone());
            callback(self.current_user());
            handle
        }

        async fn id_token(&self, _: bool) -> AuthResult<Option<String>> {
            Ok(None)
        }

        fn current_user(&self) -> Option<AuthUser> {
            lock(&self.user).clone()
        }
    }

    #[tokio::test]
    async fn test_signed_out_is_idle() {
        let auth = FakeAuth::default();
        let store = InMemoryDocumentStore::new();
        let current = CurrentUser::new(&auth, Backend::available(store.clone()), ErrorChannel::new());

        let state = current.settled().await;
        assert!(state.auth_user.is_none());
        assert!(state.profile.is_none());
        assert!(!state.loading);
        assert_eq!(store.stats().listens, 0);
    }

    #[tokio::test]
    async fn test_follows_sign_in_and_sign_out() {
        let auth = FakeAuth::default();
        let store = InMemoryDocumentStore::new();
        store
            .seed("users/u1", json!({ "username": "ada" }))
            .unwrap();
        let current = CurrentUser::new(&auth, Backend::available(store.clone()), ErrorChannel::new());

        auth.switch(Some(AuthUser::new("u1")));
        let state = current.settled().await;
        assert_eq!(state.auth_user.map(|u| u.uid).as_deref(), Some("u1"));
        assert_eq!(state.profile, Some(json!({ "username": "ada", "id": "u1" })));

        auth.sign_out().await.unwrap();
        let state = current.state();
        assert!(state.auth_user.is_none());
        assert!(state.profile.is_none());
        assert_eq!(store.stats().active_listeners, 0);
    }

    #[tokio::test]
    async fn test_drop_unregisters_from_auth() {
        let auth = FakeAuth::default();
        let current = CurrentUser::new(&auth, Backend::Unavailable, ErrorChannel::new());
        assert_eq!(auth.listeners.len(), 1);
        drop(current);
        assert!(auth.listeners.is_empty());
    }
}
