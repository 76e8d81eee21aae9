//! # CLI Module
//!
//! This module provides the command-line interface layer for sporlplay. It wires
//! the library components together for one command invocation and turns their
//! results into user-facing output.
//!
//! ## Command Categories
//!
//! ### Authentication
//!
//! - [`auth`] - Runs the PKCE login: opens the authorization page, serves the
//!   OAuth callback locally and waits for it
//! - [`logout`] - Forgets the stored session
//!
//! ### Playback
//!
//! - [`play`] - Starts a track on the configured Connect device
//! - [`toggle`] - Pauses or resumes the configured Connect device
//!
//! ### Information
//!
//! - [`status`] - Shows session, device readiness and what is playing
//!
//! ## Error Handling Philosophy
//!
//! Authorization-class failures tell the user to log in again, everything
//! else suggests trying again later. Every command exits non-zero on failure.
//!
//! ## Usage Patterns
//!
//! ```bash
//! sporlplay auth                                       # Log in with Spotify
//! sporlplay play spotify:track:4uLU6hMCjMI75M1A2tKUQC  # Play a track
//! sporlplay toggle                                     # Pause / resume
//! sporlplay status                                     # What is going on
//! ```

mod auth;
mod play;
mod status;

use std::{sync::Arc, time::Duration};

use indicatif::{ProgressBar, ProgressStyle};

use crate::{
    Res,
    config::SpotifyConfig,
    error, info,
    management::{FileStore, SessionStore, TokenManager},
    spotify::{ApiClient, AuthFlow, ConnectFactory, DeviceController, Player},
};

pub use auth::auth;
pub use auth::logout;
pub use play::play;
pub use play::toggle;
pub use status::status;

/// Everything one command needs, rehydrated from the durable store once.
struct Context {
    config: SpotifyConfig,
    tokens: TokenManager,
    device: DeviceController,
    player: Player,
    flow: AuthFlow,
}

impl Context {
    async fn load() -> Res<Self> {
        let config = SpotifyConfig::from_env()?;
        let store: Arc<dyn SessionStore> = Arc::new(FileStore::default_location());
        let tokens = TokenManager::load(config.clone(), store).await?;
        let api = ApiClient::new(tokens.clone());
        let factory = Arc::new(ConnectFactory::new(api.clone()));
        let device = DeviceController::load(api.clone(), factory).await?;
        let player = Player::new(device.clone(), api);
        let flow = AuthFlow::new(tokens.clone(), device.clone());

        Ok(Self {
            config,
            tokens,
            device,
            player,
            flow,
        })
    }

    /// Binds the device and waits for it with a spinner.
    async fn ready_device(&self, timeout: Duration) -> crate::Result<String> {
        if !self.tokens.tokens().is_authenticated() {
            return Err(crate::Error::AuthorizationExpired);
        }
        self.device.initialize().await?;

        let pb = ProgressBar::new_spinner();
        pb.set_message(format!(
            "Waiting for device {}...",
            self.config.device_name
        ));
        pb.enable_steady_tick(Duration::from_millis(100));
        if let Ok(style) = ProgressStyle::with_template("{spinner:.blue} {msg}") {
            pb.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
        }

        let ready = self.device.await_ready(timeout).await;
        pb.finish_and_clear();
        ready
    }
}

async fn load_context() -> Context {
    match Context::load().await {
        Ok(context) => context,
        Err(e) => error!("Cannot set up session: {}", e),
    }
}

fn fail(err: crate::Error) -> ! {
    if err.is_authorization() {
        error!("{}\nRun `sporlplay auth` to log in again.", err)
    }
    if matches!(err, crate::Error::PlayerNotReady) {
        info!("Make sure the Connect device is switched on and visible to Spotify.");
    }
    error!("{}\nPlease try again later.", err)
}
