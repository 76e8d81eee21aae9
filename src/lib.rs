//! Spotify playback session library.
//!
//! This library binds an application to Spotify's device-based playback API:
//! it logs the user in with OAuth 2.0 PKCE, keeps the access token alive by
//! refreshing it when Spotify rejects it, binds a single playback device and
//! tracks what that device is playing.
//!
//! # Modules
//!
//! - `api` - HTTP endpoints of the local OAuth callback server
//! - `cli` - Command-line interface implementations
//! - `config` - Configuration management and environment variables
//! - `error` - The error taxonomy shared by all components
//! - `management` - Durable session storage and the token lifecycle
//! - `server` - Local HTTP server for OAuth callbacks
//! - `spotify` - Login flow, request policy, device and playback control
//! - `types` - Data structures and type definitions
//! - `utils` - PKCE helpers and small utilities
//!
//! # Example
//!
//! ```
//! use sporlplay::{config, cli};
//!
//! #[tokio::main]
//! async fn main() -> sporlplay::Res<()> {
//!     config::load_env().await?;
//!     cli::status().await;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod management;
pub mod server;
pub mod spotify;
pub mod types;
pub mod utils;

pub use error::{Error, Result};

/// Result alias for the CLI glue, where any error ends the command.
pub type Res<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Prints a line prefixed with a blue `o`.
///
/// ```
/// info!("Waiting for device {}", name);
/// ```
#[macro_export]
macro_rules! info {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "o".blue().bold(), std::format_args!($($arg)*));
  })
}

/// Prints a line prefixed with a green check mark.
#[macro_export]
macro_rules! success {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "✓".green().bold(), std::format_args!($($arg)*));
  })
}

/// Prints a line prefixed with a red `!` and exits with status 1.
///
/// Only for the CLI layer; library code returns [`Error`] instead.
///
/// ```
/// error!("Playback failed: {}", err);
/// // not reached
/// ```
#[macro_export]
macro_rules! error {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "!".red().bold(), std::format_args!($($arg)*));
    std::process::exit(1);
  })
}

/// Prints a line prefixed with a yellow `!` and carries on.
#[macro_export]
macro_rules! warning {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "!".yellow().bold(), std::format_args!($($arg)*));
  })
}
