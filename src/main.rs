//! Application entry point for the extruder voice assistant.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run) and fill
//!    in the API key from `GEMINI_API_KEY` when the file has none.
//! 3. Create the [`tokio`] runtime (multi-thread, 2 workers).
//! 4. Spawn the session controller with the cpal devices and the Gemini
//!    Live transport.
//! 5. Connect and log session events until the session ends or Ctrl+C.

use std::sync::Arc;

use anyhow::Context as _;
use tokio::sync::mpsc;
use extruder_voice::{
    audio::CpalDevices,
    config::AppConfig,
    session::{self, SessionEvent, SessionHandle},
    transport::GeminiLiveTransport,
};

/// Environment variable holding the live service API key.
const API_KEY_ENV: &str = "GEMINI_API_KEY";

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

/// Log session events until the session ends or the user presses Ctrl+C.
async fn run_session(handle: SessionHandle) -> anyhow::Result<()> {
    let (events_tx, mut events) = mpsc::unbounded_channel();
    handle.connect(events_tx).await?;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(SessionEvent::Opened) => {
                    log::info!("Session open, speak to the assistant (Ctrl+C to quit)");
                }
                Some(SessionEvent::Message(msg)) => {
                    if let Some(text) = msg.input_transcript.as_deref() {
                        log::info!("operator: {text}");
                    }
                    if let Some(text) = msg.output_transcript.as_deref() {
                        log::info!("assistant: {text}");
                    }
                    if msg.interrupted {
                        log::info!("assistant interrupted");
                    }
                }
                Some(SessionEvent::Error(e)) => {
                    return Err(e).context("session failed");
                }
                Some(SessionEvent::Closed(reason)) => {
                    log::info!("Session closed ({})", reason.as_deref().unwrap_or("no reason"));
                    return Ok(());
                }
                None => return Ok(()),
            },
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl+C")?;
                log::info!("Ctrl+C received, disconnecting");
                handle.disconnect().await?;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Extruder voice assistant starting up");

    // 2. Configuration
    let config = AppConfig::load()
        .unwrap_or_else(|e| {
            log::warn!("Failed to load config ({e}); using defaults");
            AppConfig::default()
        })
        .with_api_key_fallback(std::env::var(API_KEY_ENV).ok());

    if config.live.api_key.is_none() {
        anyhow::bail!("no API key: set {API_KEY_ENV} or live.api_key in settings.toml");
    }

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    rt.block_on(async move {
        // 4. Session controller
        let (handle, task) = session::spawn(
            config.clone(),
            Arc::new(GeminiLiveTransport::new(config.audio.outbound_queue)),
            Arc::new(CpalDevices::new(&config.audio)),
        );

        // 5. Connect and run until the session ends
        let result = run_session(handle).await;

        // Dropping the last handle stops the controller and releases devices.
        task.await.context("session task panicked")?;
        result
    })
}
