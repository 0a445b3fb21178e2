mod colors;
mod commands;
mod config;
mod connection;
mod dispatch;
mod entry;
mod media;
mod parser;
mod render;
mod scrollback;

use anyhow::Result;
use tracing::{info, warn};

use crate::{
    commands::CommandProcessor,
    config::ChatboxConfig,
    connection::ConnectionManager,
    dispatch::Dispatcher,
    media::MediaClient,
    render::TermRenderer,
    scrollback::ScrollbackBuffer,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let (config, config_path) = ChatboxConfig::load_or_create()?;
    info!(path = %config_path.display(), channel = %config.channel, "loaded config");

    let media = match &config.media_api_key {
        Some(key) if !key.trim().is_empty() => Some(MediaClient::new(
            key.trim().to_owned(),
            config.media_client_key.clone(),
        )),
        _ => {
            warn!("media_api_key not configured; GIF command disabled");
            None
        }
    };
    let commands = CommandProcessor::new(&config.enabled_commands, media);
    let dispatcher = Dispatcher::new(&config.ignore_users, commands);
    let buffer = ScrollbackBuffer::new(TermRenderer, config.scrollback_capacity);

    let mut connection = ConnectionManager::new(config.connection());
    let handle = connection.handle();

    let run = connection.run(&dispatcher, &buffer);
    tokio::pin!(run);
    tokio::select! {
        _ = &mut run => {
            info!("chat connection finished");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
            handle.disconnect();
            run.await;
        }
    }
    Ok(())
}
