//! Wiring of the client stack from configuration.

use authed_fetch::{AuthedFetch, CompanionClient, StaticTokenProvider, TokenProvider};
use doc_store::{Backend, RestDocumentStore};
use error_channel::{ErrorChannel, ErrorEvent, ListenerHandle, GENERIC_ERROR, PERMISSION_ERROR};
use feed_auth::{AccountService, AuthProvider, IdentityToolkitAuth, SessionTokenProvider};
use feed_config_and_utils::Config;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct App {
    pub config: Config,
    pub channel: ErrorChannel,
    pub companion: CompanionClient,
    pub auth: Option<Arc<dyn AuthProvider>>,
    pub accounts: AccountService,
    pub backend: Backend,
    _alerts: Vec<ListenerHandle>,
}

impl App {
    pub fn build(config: Config) -> Result<Self, Box<dyn std::error::Error>> {
        let timeout = Duration::from_secs(config.http_timeout_secs);
        let channel = ErrorChannel::new();
        let alerts = install_alerts(&channel);

        let auth: Option<Arc<dyn AuthProvider>> =
            match (config.identity_url()?, config.identity_api_key.clone()) {
                (Some(url), Some(api_key)) => {
                    Some(Arc::new(IdentityToolkitAuth::new(url.as_str(), api_key, timeout)?))
                }
                _ => {
                    warn!("Identity service not configured; sign-in is unavailable");
                    None
                }
            };

        let tokens: Arc<dyn TokenProvider> = match &auth {
            Some(auth) => Arc::new(SessionTokenProvider::new(auth.clone())),
            None => Arc::new(StaticTokenProvider::anonymous()),
        };
        let fetch = AuthedFetch::with_timeout(tokens, timeout)?;

        let companion = CompanionClient::new(config.companion_url()?.as_str(), fetch.clone());
        let accounts = AccountService::new(companion.clone(), auth.clone());

        let backend = match config.store_url()? {
            Some(url) => Backend::available(
                RestDocumentStore::new(url.as_str(), config.store_api_key.clone(), fetch)
                    .with_poll_interval(Duration::from_millis(config.poll_interval_ms)),
            ),
            None => {
                warn!("Document store not configured");
                Backend::Unavailable
            }
        };

        info!(
            companion_url = %config.companion_url,
            store = backend.is_available(),
            auth = auth.is_some(),
            "Client configured"
        );

        Ok(Self {
            config,
            channel,
            companion,
            auth,
            accounts,
            backend,
            _alerts: alerts,
        })
    }
}

/// Print channel errors to stderr, the CLI's alert surface.
fn install_alerts(channel: &ErrorChannel) -> Vec<ListenerHandle> {
    [PERMISSION_ERROR, GENERIC_ERROR]
        .into_iter()
        .map(|kind| channel.subscribe(kind, |event: &ErrorEvent| eprintln!("{}", alert_text(event))))
        .collect()
}

pub fn alert_text(event: &ErrorEvent) -> String {
    format!("error [{}]: {}", event.kind, event.payload.display_message())
}
