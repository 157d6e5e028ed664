use anyhow::Context as AnyhowContext;
use serenity::{Client, model::prelude::*};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod ai;
mod attachment;
mod config;
mod handler;
mod intake;

use config::Configuration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,kaiwa=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Configuration::load().context("Expected a loadable config.toml")?;
    info!(
        "configured for {:?} ({}), {} allowed channel(s)",
        config.provider,
        config.model_name(),
        config.allowed_channels.len()
    );

    // Missing secrets are not handled here; authentication fails at the
    // collaborator boundary instead.
    let api_key = std::env::var("GEMINI_API_KEY").unwrap_or_default();
    if api_key.is_empty() {
        warn!("GEMINI_API_KEY is not set; provider requests will fail");
    }
    let discord_token = std::env::var("DISCORD_BOT_TOKEN").unwrap_or_default();
    if discord_token.is_empty() {
        warn!("DISCORD_BOT_TOKEN is not set; gateway login will fail");
    }

    let generator = ai::load(&config, &api_key);

    let intents = GatewayIntents::non_privileged() | GatewayIntents::MESSAGE_CONTENT;
    let mut client = Client::builder(&discord_token, intents)
        .event_handler(handler::Handler::new(config, generator))
        .await
        .context("Error creating client")?;

    if let Err(why) = client.start().await {
        error!("Client error: {why:?}");
    }

    Ok(())
}
