use std::sync::Arc;

use crate::{
    error::{Error, Result},
    management::{SessionStore, StoreKey, TokenManager},
    spotify::device::DeviceController,
    utils,
};

/// Drives the OAuth 2.0 PKCE login against Spotify.
///
/// The flow is split in two halves that run in different moments of the
/// program's life:
///
/// 1. [`AuthFlow::begin_login`] forgets any previous session, generates and
///    stores a PKCE code verifier and sends the user to Spotify's
///    authorization page.
/// 2. [`AuthFlow::complete_login`] runs when Spotify redirects back with an
///    authorization code. It exchanges the code together with the stored
///    verifier for a token pair, deletes the verifier and binds the player.
///
/// The verifier is the only state that links both halves. It is persisted so
/// a login survives a restart of the callback server, and it is deleted after
/// its single use, successful or not.
///
/// # Example
///
/// ```
/// let flow = AuthFlow::new(token_manager.clone(), device.clone());
/// let url = flow.begin_login().await?;
/// // ... user authorizes, the callback server receives `code` ...
/// flow.complete_login(&code).await?;
/// ```
#[derive(Clone)]
pub struct AuthFlow {
    tokens: TokenManager,
    device: DeviceController,
}

impl AuthFlow {
    pub fn new(tokens: TokenManager, device: DeviceController) -> Self {
        Self { tokens, device }
    }

    /// Starts a login and returns the authorization URL.
    ///
    /// Stale tokens are cleared before anything else so a half-finished login
    /// can never be mistaken for the previous session. When browser launching
    /// is enabled the URL is opened right away; if that fails the user gets a
    /// warning and can open the returned URL manually.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] when the store cannot be updated and
    /// [`Error::Config`] when the authorization endpoint is not a valid URL.
    pub async fn begin_login(&self) -> Result<String> {
        self.tokens.clear().await?;

        let code_verifier = utils::generate_code_verifier();
        let code_challenge = utils::generate_code_challenge(&code_verifier);
        let auth_url = utils::build_authorize_url(self.tokens.config(), &code_challenge)?;

        self.store()
            .set(StoreKey::CodeVerifier, &code_verifier)
            .await?;
        tracing::info!("login started");

        if self.tokens.config().open_browser && webbrowser::open(&auth_url).is_err() {
            tracing::warn!(%auth_url, "failed to open browser");
        }

        Ok(auth_url)
    }

    /// Finishes a login with the authorization code from the redirect.
    ///
    /// # Errors
    ///
    /// - [`Error::MissingVerifier`] when no login is in flight; nothing is sent.
    /// - whatever the token exchange failed with; the session stays logged out.
    ///
    /// The verifier is deleted after the exchange whatever its outcome, so a
    /// retry needs a fresh [`AuthFlow::begin_login`].
    pub async fn complete_login(&self, code: &str) -> Result<()> {
        let store = self.store();
        let Some(code_verifier) = store.get(StoreKey::CodeVerifier).await? else {
            return Err(Error::MissingVerifier);
        };

        let exchanged = self.tokens.exchange_code(code, &code_verifier).await;
        if let Err(e) = store.remove(StoreKey::CodeVerifier).await {
            tracing::warn!(error = %e, "failed to delete used code verifier");
        }
        exchanged?;
        tracing::info!("login completed");

        if let Err(e) = self.device.initialize().await {
            tracing::warn!(error = %e, "player initialization after login failed");
        }
        Ok(())
    }

    /// Drops the session and any login in flight.
    pub async fn logout(&self) -> Result<()> {
        self.tokens.clear().await?;
        self.store().remove(StoreKey::CodeVerifier).await?;
        tracing::info!("logged out");
        Ok(())
    }

    fn store(&self) -> Arc<dyn SessionStore> {
        self.tokens.store()
    }
}
