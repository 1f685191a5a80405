//! IRCTransport console host
//!
//! Runs one IRC agent for one player from a terminal. Chat notifications
//! are printed to stdout; every stdin line is sent to the active channel.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info, warn};

use irctransport::agent::{IrcAgent, JsonFileStore};
use irctransport::common::error::{AppError, Result as AppResult};
use irctransport::config::env::{get_config_path, get_player_name};
use irctransport::config::load_and_validate;
use irctransport::game::colors::strip_tokens;
use irctransport::game::{ChannelPlayer, Notification};
use irctransport::protocol::irc::TcpTransport;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("IRCTransport v{} starting...", env!("CARGO_PKG_VERSION"));

    let config_path = get_config_path();
    info!("Loading configuration from {}...", config_path);

    let (agent, mut notifications) = build_agent(&config_path).map_err(|e| {
        error!("Failed to start: {}", e);
        if matches!(e, AppError::Config(_)) {
            error!("Please ensure {} exists and is properly formatted.", config_path);
        }
        e
    })?;
    let Some(tasks) = agent.start() else {
        anyhow::bail!("agent already started");
    };

    // ============================================================
    // Player side: print notifications, read chat from stdin
    // ============================================================

    let printer = tokio::spawn(async move {
        while let Some(notification) = notifications.recv().await {
            println!("{}", strip_tokens(&notification.text));
        }
    });

    let input = {
        let agent = agent.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => match line.strip_prefix("/me ") {
                        Some(action) => agent.send_action(action),
                        None => agent.send_message(&line),
                    },
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Failed to read stdin: {}", e);
                        break;
                    }
                }
            }
            info!("Input closed");
        })
    };

    tokio::select! {
        _ = shutdown_signal() => info!("Shutdown signal received - leaving IRC..."),
        _ = input => {}
    }

    agent.shutdown();
    match tokio::time::timeout(Duration::from_secs(5), tasks.join()).await {
        Ok(()) => info!("IRC agent stopped gracefully"),
        Err(_) => warn!("IRC agent shutdown timed out"),
    }
    printer.abort();

    info!("Exiting...");
    Ok(())
}

/// Load configuration and settings and create the player's agent.
fn build_agent(config_path: &str) -> AppResult<(Arc<IrcAgent>, UnboundedReceiver<Notification>)> {
    let config = load_and_validate(config_path)?;

    info!("Configuration loaded successfully");
    info!("  Server: {}:{}", config.irc.server, config.irc.port);
    info!("  Channels: {}", config.irc.channels.join(", "));
    info!("  Settings: {}", config.settings_path());

    let store = JsonFileStore::open(config.settings_path())?;
    let (player, notifications) = ChannelPlayer::new(get_player_name());

    let agent = IrcAgent::new(
        Arc::new(config),
        Arc::new(player),
        Arc::new(store),
        Arc::new(TcpTransport::new()),
    )?;
    Ok((Arc::new(agent), notifications))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
