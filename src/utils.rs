use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
use reqwest::Url;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::{
    config::SpotifyConfig,
    error::{Error, Result},
};

pub fn generate_code_verifier() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(128)
        .map(char::from)
        .collect()
}

pub fn generate_code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Builds the provider's authorization URL for a PKCE login.
///
/// Query values are percent-encoded, so scopes with spaces and redirect URIs
/// with their own query strings survive intact.
pub fn build_authorize_url(config: &SpotifyConfig, code_challenge: &str) -> Result<String> {
    let url = Url::parse_with_params(
        &config.auth_url,
        &[
            ("client_id", config.client_id.as_str()),
            ("response_type", "code"),
            ("redirect_uri", config.redirect_uri.as_str()),
            ("scope", config.scope.as_str()),
            ("code_challenge_method", "S256"),
            ("code_challenge", code_challenge),
        ],
    )
    .map_err(|e| Error::Config(format!("invalid authorization url: {e}")))?;

    Ok(url.into())
}

/// Pulls a human readable message out of a Web API error body.
///
/// Spotify answers with `{"error": {"status": 404, "message": "..."}}` for API
/// calls and `{"error": "...", "error_description": "..."}` for token calls.
/// Anything else is returned as-is.
pub fn api_error_message(body: &str) -> String {
    let Ok(json) = serde_json::from_str::<Value>(body) else {
        return body.trim().to_string();
    };

    if let Some(message) = json["error"]["message"].as_str() {
        return message.to_string();
    }
    if let Some(description) = json["error_description"].as_str() {
        return description.to_string();
    }
    if let Some(error) = json["error"].as_str() {
        return error.to_string();
    }

    body.trim().to_string()
}
