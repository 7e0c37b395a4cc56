//! presence-link entry point.
//!
//! Joins the presence channel of one conversation and logs every realtime
//! event until interrupted.

use anyhow::{Context, anyhow};
use tracing_subscriber::EnvFilter;

use presence_link::{ConnectOutcome, ConnectionManager, RealtimeConfig, SharedToken};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let conversation = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow!("usage: presence-link <conversation-id>"))?;

    // Load configuration
    let config = RealtimeConfig::from_env().context("loading configuration")?;
    let user_id = std::env::var("REALTIME_USER_ID").context("REALTIME_USER_ID must be set")?;
    let tokens = SharedToken::new();
    if let Ok(token) = std::env::var("REALTIME_BEARER_TOKEN") {
        tokens.set(token);
    }
    tracing::info!(broker = %config.broker_url, %conversation, "starting presence-link");

    let manager = ConnectionManager::builder(config, user_id, tokens).spawn();
    let _events = manager.events().subscribe(|event| match serde_json::to_string(event) {
        Ok(json) => tracing::info!(kind = %event.kind(), %json, "event"),
        Err(err) => tracing::warn!(error = %err, "unserializable event"),
    });

    match manager.connect(conversation).await? {
        ConnectOutcome::MissingToken => {
            return Err(anyhow!("REALTIME_BEARER_TOKEN is not set"));
        }
        outcome => tracing::info!(?outcome, "connect requested"),
    }

    tokio::signal::ctrl_c()
        .await
        .context("waiting for ctrl-c")?;

    let snapshot = manager.snapshot().await?;
    tracing::info!(state = %snapshot.state, members = snapshot.members.len(), "shutting down");
    manager.disconnect().await?;
    Ok(())
}
