use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use reqwest::{Client, Method, Response, StatusCode, header::CONTENT_LENGTH};

use crate::{
    config::SpotifyConfig,
    error::{Error, Result},
    management::store::{SessionStore, StoreKey},
    types::{ApiRequest, SessionTokens, TokenErrorResponse, TokenResponse},
    utils,
};

/// Hands out the current access token on demand.
pub type TokenProvider = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Owns the session token pair and every request that needs it.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: SpotifyConfig,
    client: Client,
    store: Arc<dyn SessionStore>,
    session: RwLock<Session>,
    // held for the whole duration of a refresh grant
    refresh: tokio::sync::Mutex<Option<(u64, RefreshOutcome)>>,
}

#[derive(Default)]
struct Session {
    tokens: SessionTokens,
    // bumped whenever the token pair is replaced
    generation: u64,
}

#[derive(Debug, Clone)]
enum RefreshOutcome {
    Refreshed(String),
    InvalidGrant,
    NoRefreshToken,
    Unavailable(String),
}

impl RefreshOutcome {
    fn into_result(self) -> Result<String> {
        match self {
            RefreshOutcome::Refreshed(token) => Ok(token),
            RefreshOutcome::InvalidGrant => Err(Error::InvalidGrant),
            RefreshOutcome::NoRefreshToken => Err(Error::AuthorizationExpired),
            RefreshOutcome::Unavailable(reason) => Err(Error::UpstreamUnavailable(reason)),
        }
    }
}

fn is_unauthorized(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

impl TokenManager {
    /// Creates a manager with an empty session.
    pub fn new(config: SpotifyConfig, store: Arc<dyn SessionStore>) -> Self {
        Self::with_client(config, store, Client::new())
    }

    pub fn with_client(config: SpotifyConfig, store: Arc<dyn SessionStore>, client: Client) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                client,
                store,
                session: RwLock::new(Session::default()),
                refresh: tokio::sync::Mutex::new(None),
            }),
        }
    }

    /// Creates a manager and rehydrates the token pair from the store.
    ///
    /// This is the only point where durable tokens are read; afterwards the
    /// in-memory pair is authoritative.
    pub async fn load(config: SpotifyConfig, store: Arc<dyn SessionStore>) -> Result<Self> {
        let manager = Self::new(config, store);
        let access_token = manager.inner.store.get(StoreKey::AccessToken).await?;
        let refresh_token = manager.inner.store.get(StoreKey::RefreshToken).await?;

        tracing::debug!(
            has_access_token = access_token.is_some(),
            has_refresh_token = refresh_token.is_some(),
            "rehydrated session"
        );

        manager.session_mut().tokens = SessionTokens {
            access_token,
            refresh_token,
        };
        Ok(manager)
    }

    pub fn config(&self) -> &SpotifyConfig {
        &self.inner.config
    }

    pub fn client(&self) -> &Client {
        &self.inner.client
    }

    pub fn store(&self) -> Arc<dyn SessionStore> {
        Arc::clone(&self.inner.store)
    }

    pub fn tokens(&self) -> SessionTokens {
        self.session().tokens.clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.session().tokens.access_token.clone()
    }

    /// A callback reading the live access token, not a snapshot of it.
    pub fn token_provider(&self) -> TokenProvider {
        let manager = self.clone();
        Arc::new(move || manager.access_token())
    }

    /// Performs `request` with the current bearer token.
    ///
    /// A 401/403 answer triggers one (coalesced) refresh and exactly one retry.
    /// A retry that is still unauthorized clears the access token and fails
    /// with [`Error::AuthorizationExpired`]. Without an access token nothing is
    /// sent at all.
    pub async fn authenticated_fetch(&self, request: &ApiRequest) -> Result<Response> {
        let (token, generation) = {
            let session = self.session();
            (session.tokens.access_token.clone(), session.generation)
        };
        let Some(token) = token else {
            return Err(Error::AuthorizationExpired);
        };

        let response = self.send(request, &token).await?;
        if !is_unauthorized(response.status()) {
            return Ok(response);
        }

        tracing::debug!(
            status = %response.status(),
            url = %request.url,
            "access token rejected, refreshing"
        );
        let token = self.refresh_after(generation).await?;

        let retried = self.send(request, &token).await?;
        if is_unauthorized(retried.status()) {
            tracing::warn!(status = %retried.status(), url = %request.url, "still unauthorized after refresh");
            self.expire_access_token(&token).await;
            return Err(Error::AuthorizationExpired);
        }

        Ok(retried)
    }

    /// Exchanges the refresh token for a new access token.
    ///
    /// Joins a refresh that is already in flight instead of starting another.
    pub async fn refresh(&self) -> Result<String> {
        let generation = self.session().generation;
        self.refresh_after(generation).await
    }

    /// Runs the `authorization_code` grant and stores the resulting pair.
    ///
    /// Nothing is kept if either token cannot be persisted.
    pub async fn exchange_code(&self, code: &str, verifier: &str) -> Result<()> {
        let config = &self.inner.config;
        let response = self
            .inner
            .client
            .post(&config.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("client_id", config.client_id.as_str()),
                ("code", code),
                ("code_verifier", verifier),
                ("redirect_uri", config.redirect_uri.as_str()),
            ])
            .send()
            .await
            .map_err(Error::transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_token_error(status, &body));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("malformed token response: {e}")))?;

        let store = &self.inner.store;
        store
            .set(StoreKey::AccessToken, &token.access_token)
            .await?;
        if let Some(refresh_token) = &token.refresh_token {
            if let Err(e) = store.set(StoreKey::RefreshToken, refresh_token).await {
                if let Err(rollback) = store.remove(StoreKey::AccessToken).await {
                    tracing::warn!(error = %rollback, "failed to roll back access token");
                }
                return Err(e);
            }
        }

        let mut session = self.session_mut();
        session.tokens = SessionTokens {
            access_token: Some(token.access_token),
            refresh_token: token.refresh_token,
        };
        session.generation += 1;
        Ok(())
    }

    /// Forgets both tokens, in memory and on disk.
    pub async fn clear(&self) -> Result<()> {
        self.inner.store.remove(StoreKey::AccessToken).await?;
        self.inner.store.remove(StoreKey::RefreshToken).await?;

        let mut session = self.session_mut();
        session.tokens = SessionTokens::default();
        session.generation += 1;
        Ok(())
    }

    async fn refresh_after(&self, seen_generation: u64) -> Result<String> {
        let mut last = self.inner.refresh.lock().await;

        let (generation, access_token) = {
            let session = self.session();
            (session.generation, session.tokens.access_token.clone())
        };
        if generation != seen_generation {
            // someone else replaced the tokens while this caller waited
            return match last.as_ref() {
                Some((produced, outcome)) if *produced == generation => {
                    outcome.clone().into_result()
                }
                _ => access_token.ok_or(Error::AuthorizationExpired),
            };
        }

        let outcome = self.refresh_grant().await;
        let generation = {
            let mut session = self.session_mut();
            session.generation += 1;
            session.generation
        };
        *last = Some((generation, outcome.clone()));

        outcome.into_result()
    }

    async fn refresh_grant(&self) -> RefreshOutcome {
        let Some(refresh_token) = self.session().tokens.refresh_token.clone() else {
            tracing::debug!("no refresh token held, skipping refresh");
            return RefreshOutcome::NoRefreshToken;
        };

        let config = &self.inner.config;
        let response = self
            .inner
            .client
            .post(&config.token_url)
            .basic_auth(&config.client_id, Some(&config.client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
            ])
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "token refresh failed");
                return RefreshOutcome::Unavailable(e.to_string());
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return match classify_token_error(status, &body) {
                Error::InvalidGrant => {
                    tracing::warn!("refresh token rejected, clearing session");
                    self.drop_revoked_session().await;
                    RefreshOutcome::InvalidGrant
                }
                other => {
                    tracing::warn!(%status, error = %other, "token refresh failed");
                    RefreshOutcome::Unavailable(other.to_string())
                }
            };
        }

        let token: TokenResponse = match response.json().await {
            Ok(token) => token,
            Err(e) => return RefreshOutcome::Unavailable(format!("malformed token response: {e}")),
        };

        let store = &self.inner.store;
        if let Err(e) = store.set(StoreKey::AccessToken, &token.access_token).await {
            tracing::warn!(error = %e, "failed to persist refreshed access token");
        }
        if let Some(rotated) = &token.refresh_token {
            if let Err(e) = store.set(StoreKey::RefreshToken, rotated).await {
                tracing::warn!(error = %e, "failed to persist rotated refresh token");
            }
        }

        let mut session = self.session_mut();
        session.tokens.access_token = Some(token.access_token.clone());
        if let Some(rotated) = token.refresh_token {
            session.tokens.refresh_token = Some(rotated);
        }
        tracing::debug!("access token refreshed");

        RefreshOutcome::Refreshed(token.access_token)
    }

    async fn drop_revoked_session(&self) {
        for key in [StoreKey::RefreshToken, StoreKey::AccessToken] {
            if let Err(e) = self.inner.store.remove(key).await {
                tracing::warn!(key = key.as_str(), error = %e, "failed to clear revoked token");
            }
        }
        self.session_mut().tokens = SessionTokens::default();
    }

    async fn expire_access_token(&self, token: &str) {
        {
            let mut session = self.session_mut();
            if session.tokens.access_token.as_deref() != Some(token) {
                return;
            }
            session.tokens.access_token = None;
        }
        if let Err(e) = self.inner.store.remove(StoreKey::AccessToken).await {
            tracing::warn!(error = %e, "failed to clear expired access token");
        }
    }

    async fn send(&self, request: &ApiRequest, token: &str) -> Result<Response> {
        let mut builder = self
            .inner
            .client
            .request(request.method.clone(), &request.url)
            .bearer_auth(token);

        builder = match &request.body {
            Some(body) => builder.json(body),
            None if request.method != Method::GET => builder.header(CONTENT_LENGTH, 0),
            None => builder,
        };

        builder.send().await.map_err(Error::transport)
    }

    fn session(&self) -> RwLockReadGuard<'_, Session> {
        self.inner
            .session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn session_mut(&self) -> RwLockWriteGuard<'_, Session> {
        self.inner
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Maps a failed token endpoint answer onto the error taxonomy.
fn classify_token_error(status: StatusCode, body: &str) -> Error {
    if let Ok(error) = serde_json::from_str::<TokenErrorResponse>(body) {
        if error.error == "invalid_grant" {
            return Error::InvalidGrant;
        }
    }

    if status.is_server_error() {
        Error::UpstreamUnavailable(format!("token endpoint returned {status}"))
    } else {
        Error::Rejected {
            status,
            message: utils::api_error_message(body),
        }
    }
}
