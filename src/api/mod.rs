//! # API Module
//!
//! HTTP endpoints of the local server that receives Spotify's OAuth redirect.
//!
//! ## Endpoints
//!
//! - [`callback`] - `GET /callback?code=...` finishes the PKCE login through
//!   [`crate::spotify::AuthFlow::complete_login`] and reports the outcome to
//!   the waiting `sporlplay auth` command. `?error=...` (the user declined) and
//!   a missing code render a failure page.
//! - [`health`] - `GET /health` returns status and version for probes.
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use sporlplay::server::{CallbackState, router};
//!
//! let (state, done) = CallbackState::new(flow);
//! let app = router(state);
//! ```

mod callback;
mod health;

pub use callback::callback;
pub use health::health;
