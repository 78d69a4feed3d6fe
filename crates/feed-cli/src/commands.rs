//! Subcommand implementations.

use crate::app::App;
use crate::Credentials;
use doc_store::Fields;
use error_channel::GENERIC_ERROR;
use feed_auth::{AuthError, SignUpProfile};
use feed_data::{CollectionPager, DocumentSubscription, NonBlockingWriter, PagerConfig, SubscriptionPhase};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::debug;

type CommandResult = Result<(), Box<dyn std::error::Error>>;

fn auth_failure(err: AuthError) -> Box<dyn std::error::Error> {
    debug!(error = %err, "Auth command failed");
    err.user_message().into()
}

fn print_json(value: &Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}

/// Sign in when credentials were given. A failed sign-in is reported on the
/// generic error channel and the command continues anonymously.
async fn authenticate(app: &App, credentials: &Credentials) {
    let (Some(email), Some(password)) = (&credentials.email, &credentials.password) else {
        debug!("No credentials given, continuing anonymously");
        return;
    };
    match app.accounts.sign_in(email, password).await {
        Ok(user) => debug!(uid = %user.uid, "Signed in for command"),
        Err(err) => {
            debug!(error = %err, "Sign-in failed, continuing anonymously");
            app.channel
                .publish_message(GENERIC_ERROR, format!("Sign-in failed: {}", err.user_message()));
        }
    }
}

fn require(credentials: &Credentials) -> Result<(&str, &str), Box<dyn std::error::Error>> {
    match (&credentials.email, &credentials.password) {
        (Some(email), Some(password)) => Ok((email.as_str(), password.as_str())),
        _ => Err("--email and --password are required".into()),
    }
}

pub async fn health(app: &App) -> CommandResult {
    let health = app.companion.health().await?;
    println!("companion ok: {}", health.ok);
    Ok(())
}

pub async fn sign_in(app: &App, credentials: &Credentials) -> CommandResult {
    let (email, password) = require(credentials)?;
    let user = app
        .accounts
        .sign_in(email, password)
        .await
        .map_err(auth_failure)?;
    println!("Signed in as {}", user.uid);
    Ok(())
}

pub async fn sign_up(
    app: &App,
    credentials: &Credentials,
    username: Option<String>,
    name: Option<String>,
) -> CommandResult {
    let (email, password) = require(credentials)?;
    let user = app
        .accounts
        .sign_up(email, password, SignUpProfile { username, name })
        .await
        .map_err(auth_failure)?;
    println!("Created account {}", user.uid);
    Ok(())
}

pub async fn profile(app: &App, credentials: &Credentials) -> CommandResult {
    let (email, password) = require(credentials)?;
    app.accounts
        .sign_in(email, password)
        .await
        .map_err(auth_failure)?;
    let profile = app.accounts.profile().await.map_err(auth_failure)?;
    print_json(&json!({
        "uid": profile.uid,
        "claims": profile.claims,
        "profile": profile.profile,
    }));
    Ok(())
}

pub async fn feed(
    app: &App,
    credentials: &Credentials,
    collection: &str,
    page_size: Option<usize>,
    pages: usize,
) -> CommandResult {
    authenticate(app, credentials).await;

    let config = PagerConfig::new(collection)
        .page_size(page_size.unwrap_or(app.config.page_size))
        .order_field(app.config.order_field.clone());
    let pager = CollectionPager::open(app.backend.clone(), app.channel.clone(), config).await?;
    for _ in 1..pages {
        if !pager.state().has_more {
            break;
        }
        pager.load_more().await;
    }

    let state = pager.state();
    if let Some(err) = state.error {
        return Err(err.into());
    }
    for item in &state.items {
        println!("{}", item);
    }
    if state.has_more {
        eprintln!("(more available)");
    }
    Ok(())
}

pub async fn post(app: &App, credentials: &Credentials, id: &str) -> CommandResult {
    authenticate(app, credentials).await;

    let path = format!("posts/{}", id);
    let subscription =
        DocumentSubscription::watch(app.backend.clone(), app.channel.clone(), Some(&path));
    let state = subscription
        .wait_for(|s| s.phase != SubscriptionPhase::Loading)
        .await;

    if let Some(err) = state.error {
        return Err(err.into());
    }
    match state.data {
        Some(data) => print_json(&data),
        None => println!("{} not found", path),
    }
    Ok(())
}

pub async fn publish(app: &App, credentials: &Credentials, title: &str) -> CommandResult {
    authenticate(app, credentials).await;

    let mut data = Fields::new();
    data.insert("title".into(), json!(title));
    data.insert(
        "createdAt".into(),
        json!(chrono::Utc::now().timestamp_millis()),
    );
    if let Some(user) = app.auth.as_ref().and_then(|auth| auth.current_user()) {
        data.insert("authorId".into(), json!(user.uid));
    }

    let writer = NonBlockingWriter::new(app.backend.clone(), app.channel.clone(), Handle::current());
    let Some(pending) = writer.create_document("posts", data) else {
        return Err("document store not configured".into());
    };
    match pending.await? {
        Some(id) => {
            println!("Published {}", id);
            Ok(())
        }
        // Already reported on the error channel.
        None => Err("publish failed".into()),
    }
}

pub async fn watch(app: &App, credentials: &Credentials, path: &str, seconds: u64) -> CommandResult {
    authenticate(app, credentials).await;

    let subscription =
        DocumentSubscription::watch(app.backend.clone(), app.channel.clone(), Some(path));
    let mut changes = subscription.changes();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(seconds);

    loop {
        let state = changes.borrow_and_update().clone();
        match state.phase {
            SubscriptionPhase::Live => match &state.data {
                Some(data) => println!("{}", data),
                None => println!("{} does not exist", path),
            },
            SubscriptionPhase::Errored => break,
            SubscriptionPhase::Idle | SubscriptionPhase::Loading => {}
        }

        match tokio::time::timeout_at(deadline, changes.changed()).await {
            Ok(Ok(())) => continue,
            Ok(Err(_)) | Err(_) => break,
        }
    }

    let error = subscription.state().error;
    subscription.clear();
    match error {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}
