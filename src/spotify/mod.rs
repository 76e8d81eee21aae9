//! # Spotify Integration Module
//!
//! This module binds sporlplay to Spotify's device-based playback API. It owns
//! the login flow, the request policy every protected call goes through, the
//! playback device and the playback state derived from it.
//!
//! ## Architecture
//!
//! ```text
//! CLI / callback server
//!          ↓
//!     ├── auth      (PKCE login: begin / complete / logout)
//!     ├── playback  (play, pause/resume, playback state machine)
//!     ├── device    (single player binding, readiness state machine)
//!     ├── connect   (binding for a named Spotify Connect device)
//!     └── request   (error classification over authenticated requests)
//!          ↓
//! management::TokenManager (bearer token, refresh-on-401, coalescing)
//!          ↓
//! Spotify Web API / Accounts service
//! ```
//!
//! ## Core Modules
//!
//! ### Authentication
//!
//! [`auth`] implements the OAuth 2.0 PKCE flow. `begin_login` clears stale
//! tokens, persists a fresh code verifier and opens the authorization page;
//! `complete_login` exchanges the code for a token pair and binds the player.
//!
//! ### Requests
//!
//! [`request`] is the single policy for outbound calls. Authorization failures
//! that survive one refresh become `AuthorizationExpired`, 5xx and network
//! failures become `UpstreamUnavailable`, nothing is retried beyond the one
//! refresh retry.
//!
//! ### Device
//!
//! [`device`] owns the one player binding of the process. Its readiness moves
//! through `Uninitialized → Connecting → Ready ⇄ NotReady`, driven by events the
//! binding pushes into a channel. Callers that need the device id wait on a
//! watch channel with a timeout instead of polling.
//!
//! ### Playback
//!
//! [`playback`] holds the pure `(state, event) -> state` transition and the
//! play / toggle commands. A successful play command updates the state
//! optimistically; pushes from the binding are authoritative.
//!
//! ## API Coverage
//!
//! - `POST /api/token` - code exchange and refresh
//! - `PUT /me/player` - transfer playback to the bound device
//! - `PUT /me/player/play?device_id=` - start a track
//! - `PUT /me/player/pause?device_id=` - pause (Connect binding)
//! - `GET /me/player/devices` - device presence (Connect binding)
//! - `GET /me/player` - playback state (Connect binding)
//!
//! ## Usage Patterns
//!
//! ```rust
//! let tokens = TokenManager::load(config.clone(), store).await?;
//! let api = ApiClient::new(tokens.clone());
//! let factory = Arc::new(ConnectFactory::new(api.clone()));
//! let device = DeviceController::load(api.clone(), factory).await?;
//! let player = Player::new(device.clone(), api);
//!
//! device.initialize().await?;
//! device.await_ready(Duration::from_secs(30)).await?;
//! player.play_track("spotify:track:4uLU6hMCjMI75M1A2tKUQC").await?;
//! ```

pub mod auth;
pub mod connect;
pub mod device;
pub mod playback;
pub mod request;

pub use auth::AuthFlow;
pub use connect::{ConnectBinding, ConnectFactory};
pub use device::{DeviceController, PlayerBinding, PlayerFactory, apply_device_event};
pub use playback::{PlaybackEvent, Player};
pub use request::ApiClient;
