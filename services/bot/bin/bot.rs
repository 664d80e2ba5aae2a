//! Main Entrypoint for the Runa Telegram Bot
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing logging.
//! 3. Building the assistant, speech and Telegram clients and the router.
//! 4. Long-polling Telegram and dispatching each update on its own task.
//! 5. Shutting down on Ctrl+C.

use runa_bot::{
    config::Config,
    state::AppState,
    telegram::{next_offset, to_event},
};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Server-side wait of each `getUpdates` long poll.
const LONG_POLL_SECS: u64 = 30;
/// Pause before asking Telegram again after a failed `getUpdates`.
const POLL_ERROR_DELAY: Duration = Duration::from_secs(5);

/// Listens for the `Ctrl+C` signal to gracefully shut down the bot.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

/// Fetches updates forever, spawning one task per inbound event.
async fn poll_updates(state: AppState) {
    let mut offset = None;
    loop {
        let updates = match state.telegram.get_updates(offset, LONG_POLL_SECS).await {
            Ok(updates) => updates,
            Err(e) => {
                warn!(error = %e, "Fetching updates failed");
                tokio::time::sleep(POLL_ERROR_DELAY).await;
                continue;
            }
        };
        offset = next_offset(offset, &updates);

        for update in &updates {
            let Some(event) = to_event(update) else {
                debug!(update_id = update.update_id, "Ignoring update");
                continue;
            };
            let router = state.router.clone();
            tokio::spawn(async move { router.dispatch(event).await });
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing_subscriber::fmt().init();
            error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Shared Services ---
    let state = AppState::from_config(config)?;
    info!(
        assistant = %state.config.assistant_id,
        language = %state.config.transcription_language,
        voice = %state.config.tts_voice,
        "Service configured. Polling Telegram for updates..."
    );

    // --- 4. Run until interrupted ---
    tokio::select! {
        _ = poll_updates(state.clone()) => {},
        _ = shutdown_signal() => {},
    }

    info!(conversations = state.sessions.len().await, "Bot has shut down.");
    Ok(())
}
