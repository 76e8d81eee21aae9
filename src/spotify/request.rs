use serde::de::DeserializeOwned;

use crate::{
    error::{Error, Result},
    management::TokenManager,
    types::{ApiRequest, ApiResponse},
    utils,
};

/// Sends protected Web API requests and classifies what comes back.
///
/// Every outbound call of the playback components goes through
/// [`ApiClient::send`]. It delegates to
/// [`TokenManager::authenticated_fetch`] for the bearer token and the single
/// refresh-and-retry, then maps the result onto exactly one outcome:
///
/// - 2xx: `Ok(ApiResponse)`
/// - 401/403 after the retry: [`Error::AuthorizationExpired`]
/// - 5xx or a transport failure: [`Error::UpstreamUnavailable`]
/// - any other status: [`Error::Rejected`] with the provider's message
///
/// Transient failures are not retried here.
///
/// # Example
///
/// ```
/// let api = ApiClient::new(token_manager.clone());
/// let response = api.send(&ApiRequest::get(api.url("/me/player"))).await?;
/// ```
#[derive(Clone)]
pub struct ApiClient {
    tokens: TokenManager,
}

impl ApiClient {
    pub fn new(tokens: TokenManager) -> Self {
        Self { tokens }
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// Joins `path` onto the configured Web API base URL.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{base}{path}",
            base = self.tokens.config().api_url.trim_end_matches('/'),
        )
    }

    pub async fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let response = self.tokens.authenticated_fetch(request).await?;

        let status = response.status();
        let body = response.text().await.map_err(Error::transport)?;

        if status.is_success() {
            return Ok(ApiResponse { status, body });
        }

        tracing::debug!(%status, url = %request.url, "request failed");
        if status.is_server_error() {
            return Err(Error::UpstreamUnavailable(format!(
                "{method} {url} returned {status}",
                method = request.method,
                url = request.url,
            )));
        }

        Err(Error::Rejected {
            status,
            message: utils::api_error_message(&body),
        })
    }

    /// Like [`ApiClient::send`] but decodes a JSON body.
    ///
    /// Returns `None` for an empty body (Spotify answers 204 when nothing is
    /// playing).
    pub async fn send_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<Option<T>> {
        let response = self.send(request).await?;
        if response.body.trim().is_empty() {
            return Ok(None);
        }

        serde_json::from_str(&response.body)
            .map(Some)
            .map_err(|e| Error::UpstreamUnavailable(format!("malformed response: {e}")))
    }
}
