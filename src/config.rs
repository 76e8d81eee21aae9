//! Configuration management for sporlplay.
//!
//! This module handles loading and accessing configuration values from environment
//! variables and `.env` files. It provides a centralized way to manage application
//! configuration including Spotify API credentials, endpoints, the playback device
//! name and the local callback server address.
//!
//! The configuration system follows a hierarchical approach:
//! 1. Environment variables (highest priority)
//! 2. `.env` file in the local data directory
//! 3. Application defaults (where applicable)

use std::{env, path::PathBuf, time::Duration};

use crate::error::{Error, Result};

/// Scopes needed to read and control playback on a Connect device.
pub const DEFAULT_SCOPE: &str =
    "user-read-playback-state user-modify-playback-state user-read-currently-playing streaming";

pub const DEFAULT_AUTH_URL: &str = "https://accounts.spotify.com/authorize";
pub const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
pub const DEFAULT_API_URL: &str = "https://api.spotify.com/v1";
pub const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1:8888";

/// Returns the platform-specific data directory used for `.env` and caches.
///
/// - Linux: `~/.local/share/sporlplay`
/// - macOS: `~/Library/Application Support/sporlplay`
/// - Windows: `%LOCALAPPDATA%/sporlplay`
pub fn data_dir() -> PathBuf {
    let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("sporlplay");
    path
}

/// Loads environment variables from a `.env` file in the local data directory.
///
/// Creates the directory if it doesn't exist. A missing `.env` file is not an
/// error: every value can also come from the process environment.
///
/// # Errors
///
/// Returns [`Error::Config`] if the directory cannot be created or the `.env`
/// file exists but cannot be parsed.
pub async fn load_env() -> Result<()> {
    let path = data_dir().join(".env");
    if let Some(parent) = path.parent() {
        async_fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::Config(e.to_string()))?;
    }

    if path.is_file() {
        dotenv::from_path(&path).map_err(|e| Error::Config(e.to_string()))?;
    }
    Ok(())
}

/// Everything the session and playback components need to talk to Spotify.
#[derive(Debug, Clone)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scope: String,
    pub auth_url: String,
    pub token_url: String,
    pub api_url: String,
    /// Name of the Spotify Connect device the binding should claim.
    pub device_name: String,
    /// Address the local OAuth callback server binds to.
    pub server_address: String,
    /// Open the authorization URL in a browser during `begin_login`.
    pub open_browser: bool,
    /// How long callers wait for the device to report ready.
    pub ready_timeout: Duration,
    /// Poll interval of the Connect device binding.
    pub poll_interval: Duration,
}

impl SpotifyConfig {
    /// Reads the configuration from the process environment.
    ///
    /// Required: `SPOTIFY_API_AUTH_CLIENT_ID`, `SPOTIFY_API_AUTH_CLIENT_SECRET`,
    /// `SPOTIFY_API_REDIRECT_URI` and `SPOTIFY_DEVICE_NAME`. Everything else
    /// falls back to the public Spotify endpoints and defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first missing variable.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            client_id: required("SPOTIFY_API_AUTH_CLIENT_ID")?,
            client_secret: required("SPOTIFY_API_AUTH_CLIENT_SECRET")?,
            redirect_uri: required("SPOTIFY_API_REDIRECT_URI")?,
            scope: optional("SPOTIFY_API_AUTH_SCOPE", DEFAULT_SCOPE),
            auth_url: optional("SPOTIFY_API_AUTH_URL", DEFAULT_AUTH_URL),
            token_url: optional("SPOTIFY_API_TOKEN_URL", DEFAULT_TOKEN_URL),
            api_url: optional("SPOTIFY_API_URL", DEFAULT_API_URL),
            device_name: required("SPOTIFY_DEVICE_NAME")?,
            server_address: optional("SERVER_ADDRESS", DEFAULT_SERVER_ADDRESS),
            open_browser: true,
            ready_timeout: Duration::from_secs(secs("SPOTIFY_READY_TIMEOUT_SECS", 30)),
            poll_interval: Duration::from_secs(secs("SPOTIFY_POLL_INTERVAL_SECS", 2)),
        })
    }

    /// A configuration pointing every endpoint at `base_url`, used by tests
    /// that stand up a mock server.
    pub fn for_base_url(base_url: &str) -> Self {
        Self {
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
            redirect_uri: "http://127.0.0.1:8888/callback".to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            auth_url: format!("{base_url}/authorize"),
            token_url: format!("{base_url}/api/token"),
            api_url: base_url.to_string(),
            device_name: "sporlplay".to_string(),
            server_address: DEFAULT_SERVER_ADDRESS.to_string(),
            open_browser: false,
            ready_timeout: Duration::from_millis(200),
            poll_interval: Duration::from_millis(50),
        }
    }
}

fn required(key: &str) -> Result<String> {
    env::var(key).map_err(|_| Error::Config(format!("{key} must be set")))
}

fn optional(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn secs(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
