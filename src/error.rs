//! Error taxonomy for the session and playback subsystem.
//!
//! Every failure the library surfaces is one [`Error`] variant. The variants
//! split into two families the UI layer cares about:
//!
//! - **authorization-class** ([`Error::AuthorizationExpired`],
//!   [`Error::InvalidGrant`], [`Error::MissingVerifier`]): the user has to log
//!   in again, retrying will not help.
//! - **everything else**: transient or precondition failures where "try again"
//!   is the right message.
//!
//! Use [`Error::is_authorization`] to pick between the two.

use reqwest::StatusCode;

/// Errors produced by the session, authorization and playback components.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A refresh was attempted and the retried request was still unauthorized,
    /// or no access token is held at all.
    #[error("authorization expired, please run `sporlplay auth` again")]
    AuthorizationExpired,

    /// The provider permanently rejected the refresh token.
    #[error("refresh token was rejected by the provider (invalid_grant), full re-login required")]
    InvalidGrant,

    /// The playback device did not become ready in time, or no device is bound.
    #[error("playback device is not ready")]
    PlayerNotReady,

    /// Moving the playback context to the bound device failed.
    #[error("failed to transfer playback to device {device_id}: {reason}")]
    TransferFailed { device_id: String, reason: String },

    /// The provider answered with a 5xx status or could not be reached.
    #[error("Spotify is unavailable: {0}")]
    UpstreamUnavailable(String),

    /// `complete_login` was called without a login in flight.
    #[error("no PKCE code verifier is stored, start the login with `sporlplay auth` first")]
    MissingVerifier,

    /// The provider refused the request with a non-authorization client error.
    #[error("request rejected with status {status}: {message}")]
    Rejected { status: StatusCode, message: String },

    /// Reading or writing the durable session store failed.
    #[error("session store error: {0}")]
    Storage(String),

    /// A required configuration value is missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns `true` when the only way forward is a fresh login.
    pub fn is_authorization(&self) -> bool {
        matches!(
            self,
            Error::AuthorizationExpired | Error::InvalidGrant | Error::MissingVerifier
        )
    }

    /// Classifies a transport-level failure of `reqwest`.
    pub(crate) fn transport(err: reqwest::Error) -> Self {
        Error::UpstreamUnavailable(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_class() {
        assert!(Error::AuthorizationExpired.is_authorization());
        assert!(Error::InvalidGrant.is_authorization());
        assert!(Error::MissingVerifier.is_authorization());
        assert!(!Error::PlayerNotReady.is_authorization());
        assert!(!Error::UpstreamUnavailable("502".into()).is_authorization());
        assert!(
            !Error::Rejected {
                status: StatusCode::NOT_FOUND,
                message: "missing".into()
            }
            .is_authorization()
        );
    }
}
