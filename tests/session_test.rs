mod common;

use base64::{Engine, engine::general_purpose::STANDARD};
use mockito::{Matcher, Server};
use reqwest::StatusCode;
use sporlplay::{
    Error,
    management::{SessionStore, StoreKey},
    spotify::{ApiClient, AuthFlow},
    types::ApiRequest,
    utils,
};

use common::{device, session};

fn basic_auth() -> String {
    format!("Basic {}", STANDARD.encode("client-id:client-secret"))
}

fn refresh_body(refresh_token: &str) -> Matcher {
    Matcher::AllOf(vec![
        Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
        Matcher::UrlEncoded("refresh_token".into(), refresh_token.into()),
    ])
}

#[tokio::test]
async fn test_stale_token_is_refreshed_and_request_retried() {
    let mut server = Server::new_async().await;
    let stale = server
        .mock("GET", "/me")
        .match_header("authorization", "Bearer T1")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;
    let fresh = server
        .mock("GET", "/me")
        .match_header("authorization", "Bearer T2")
        .with_status(200)
        .with_body(r#"{"id":"listener"}"#)
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/api/token")
        .match_header("authorization", basic_auth().as_str())
        .match_body(refresh_body("R1"))
        .with_status(200)
        .with_body(r#"{"access_token":"T2"}"#)
        .expect(1)
        .create_async()
        .await;

    let (tokens, store) = session(&server.url(), Some("T1"), Some("R1")).await;
    let response = tokens
        .authenticated_fetch(&ApiRequest::get(format!("{}/me", server.url())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    stale.assert_async().await;
    fresh.assert_async().await;
    refresh.assert_async().await;

    assert_eq!(tokens.access_token().as_deref(), Some("T2"));
    assert_eq!(
        store.get(StoreKey::AccessToken).await.unwrap().as_deref(),
        Some("T2")
    );
    assert_eq!(
        store.get(StoreKey::RefreshToken).await.unwrap().as_deref(),
        Some("R1")
    );
}

#[tokio::test]
async fn test_rotated_refresh_token_is_persisted() {
    let mut server = Server::new_async().await;
    let _stale = server
        .mock("GET", "/me")
        .match_header("authorization", "Bearer T1")
        .with_status(403)
        .create_async()
        .await;
    let _fresh = server
        .mock("GET", "/me")
        .match_header("authorization", "Bearer T2")
        .with_status(200)
        .create_async()
        .await;
    let _refresh = server
        .mock("POST", "/api/token")
        .with_status(200)
        .with_body(r#"{"access_token":"T2","refresh_token":"R2"}"#)
        .create_async()
        .await;

    let (tokens, store) = session(&server.url(), Some("T1"), Some("R1")).await;
    tokens
        .authenticated_fetch(&ApiRequest::get(format!("{}/me", server.url())))
        .await
        .unwrap();

    assert_eq!(
        store.get(StoreKey::RefreshToken).await.unwrap().as_deref(),
        Some("R2")
    );
    assert_eq!(tokens.tokens().refresh_token.as_deref(), Some("R2"));
}

#[tokio::test]
async fn test_fetch_retries_at_most_once() {
    let mut server = Server::new_async().await;
    let resource = server
        .mock("GET", "/me")
        .with_status(401)
        .expect(2)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/api/token")
        .with_status(200)
        .with_body(r#"{"access_token":"T2"}"#)
        .expect(1)
        .create_async()
        .await;

    let (tokens, store) = session(&server.url(), Some("T1"), Some("R1")).await;
    let result = tokens
        .authenticated_fetch(&ApiRequest::get(format!("{}/me", server.url())))
        .await;

    assert!(matches!(result, Err(Error::AuthorizationExpired)));
    resource.assert_async().await;
    refresh.assert_async().await;

    // the access token is gone, the refresh token survives
    assert_eq!(tokens.access_token(), None);
    assert_eq!(store.get(StoreKey::AccessToken).await.unwrap(), None);
    assert_eq!(
        store.get(StoreKey::RefreshToken).await.unwrap().as_deref(),
        Some("R1")
    );
}

#[tokio::test]
async fn test_concurrent_unauthorized_calls_share_one_refresh() {
    let mut server = Server::new_async().await;
    let stale = server
        .mock("GET", "/me")
        .match_header("authorization", "Bearer T1")
        .with_status(401)
        .expect(2)
        .create_async()
        .await;
    let fresh = server
        .mock("GET", "/me")
        .match_header("authorization", "Bearer T2")
        .with_status(200)
        .expect(2)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/api/token")
        .with_status(200)
        .with_body(r#"{"access_token":"T2"}"#)
        .expect(1)
        .create_async()
        .await;

    let (tokens, _store) = session(&server.url(), Some("T1"), Some("R1")).await;
    let request = ApiRequest::get(format!("{}/me", server.url()));
    let (first, second) = tokio::join!(
        tokens.authenticated_fetch(&request),
        tokens.authenticated_fetch(&request)
    );

    assert_eq!(first.unwrap().status(), StatusCode::OK);
    assert_eq!(second.unwrap().status(), StatusCode::OK);
    stale.assert_async().await;
    fresh.assert_async().await;
    refresh.assert_async().await;
}

#[tokio::test]
async fn test_concurrent_callers_share_a_failed_refresh() {
    let mut server = Server::new_async().await;
    let _resource = server
        .mock("GET", "/me")
        .with_status(401)
        .expect(2)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/api/token")
        .with_status(503)
        .expect(1)
        .create_async()
        .await;

    let (tokens, _store) = session(&server.url(), Some("T1"), Some("R1")).await;
    let request = ApiRequest::get(format!("{}/me", server.url()));
    let (first, second) = tokio::join!(
        tokens.authenticated_fetch(&request),
        tokens.authenticated_fetch(&request)
    );

    assert!(matches!(first, Err(Error::UpstreamUnavailable(_))));
    assert!(matches!(second, Err(Error::UpstreamUnavailable(_))));
    refresh.assert_async().await;
}

#[tokio::test]
async fn test_invalid_grant_clears_refresh_token_and_short_circuits() {
    let mut server = Server::new_async().await;
    let resource = server
        .mock("GET", "/me")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/api/token")
        .with_status(400)
        .with_body(r#"{"error":"invalid_grant","error_description":"Refresh token revoked"}"#)
        .expect(1)
        .create_async()
        .await;

    let (tokens, store) = session(&server.url(), Some("T1"), Some("R1")).await;
    let request = ApiRequest::get(format!("{}/me", server.url()));

    let first = tokens.authenticated_fetch(&request).await;
    assert!(matches!(first, Err(Error::InvalidGrant)));
    assert_eq!(store.get(StoreKey::RefreshToken).await.unwrap(), None);
    assert_eq!(tokens.tokens().refresh_token, None);

    let second = tokens.authenticated_fetch(&request).await;
    assert!(matches!(second, Err(Error::AuthorizationExpired)));

    // no further resource or refresh calls
    resource.assert_async().await;
    refresh.assert_async().await;
}

#[tokio::test]
async fn test_transient_refresh_failure_keeps_refresh_token() {
    let mut server = Server::new_async().await;
    let _resource = server
        .mock("GET", "/me")
        .with_status(401)
        .create_async()
        .await;
    let _refresh = server
        .mock("POST", "/api/token")
        .with_status(502)
        .create_async()
        .await;

    let (tokens, store) = session(&server.url(), Some("T1"), Some("R1")).await;
    let result = tokens
        .authenticated_fetch(&ApiRequest::get(format!("{}/me", server.url())))
        .await;

    assert!(matches!(result, Err(Error::UpstreamUnavailable(_))));
    assert_eq!(
        store.get(StoreKey::RefreshToken).await.unwrap().as_deref(),
        Some("R1")
    );
}

#[tokio::test]
async fn test_missing_access_token_short_circuits() {
    let mut server = Server::new_async().await;
    let resource = server
        .mock("GET", "/me")
        .expect(0)
        .create_async()
        .await;

    let (tokens, _store) = session(&server.url(), None, Some("R1")).await;
    let result = tokens
        .authenticated_fetch(&ApiRequest::get(format!("{}/me", server.url())))
        .await;

    assert!(matches!(result, Err(Error::AuthorizationExpired)));
    resource.assert_async().await;
}

#[tokio::test]
async fn test_refresh_without_refresh_token_skips_network() {
    let mut server = Server::new_async().await;
    let refresh = server
        .mock("POST", "/api/token")
        .expect(0)
        .create_async()
        .await;

    let (tokens, _store) = session(&server.url(), Some("T1"), None).await;
    assert!(matches!(
        tokens.refresh().await,
        Err(Error::AuthorizationExpired)
    ));
    refresh.assert_async().await;
}

#[tokio::test]
async fn test_api_client_classifies_failures() {
    let mut server = Server::new_async().await;
    let _unavailable = server
        .mock("GET", "/down")
        .with_status(503)
        .create_async()
        .await;
    let _missing = server
        .mock("GET", "/missing")
        .with_status(404)
        .with_body(r#"{"error":{"status":404,"message":"Device not found"}}"#)
        .create_async()
        .await;
    let _empty = server
        .mock("PUT", "/empty")
        .with_status(204)
        .create_async()
        .await;

    let (tokens, _store) = session(&server.url(), Some("T1"), Some("R1")).await;
    let api = ApiClient::new(tokens);

    assert!(matches!(
        api.send(&ApiRequest::get(api.url("/down"))).await,
        Err(Error::UpstreamUnavailable(_))
    ));

    match api.send(&ApiRequest::get(api.url("/missing"))).await {
        Err(Error::Rejected { status, message }) => {
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(message, "Device not found");
        }
        other => panic!("unexpected result: {other:?}"),
    }

    let response = api.send(&ApiRequest::put(api.url("/empty"), None)).await.unwrap();
    assert_eq!(response.status, StatusCode::NO_CONTENT);
    let decoded: Option<serde_json::Value> = api
        .send_json(&ApiRequest::put(api.url("/empty"), None))
        .await
        .unwrap();
    assert!(decoded.is_none());
}

#[tokio::test]
async fn test_network_failure_is_upstream_unavailable() {
    // nothing listens on this port
    let (tokens, _store) = session("http://127.0.0.1:9", Some("T1"), Some("R1")).await;
    let api = ApiClient::new(tokens);

    assert!(matches!(
        api.send(&ApiRequest::get(api.url("/me"))).await,
        Err(Error::UpstreamUnavailable(_))
    ));
}

#[tokio::test]
async fn test_login_end_to_end() {
    let mut server = Server::new_async().await;
    let (tokens, store) = session(&server.url(), Some("OLD"), Some("OLD-R")).await;
    let (controller, _api, fake) = device(&tokens);
    let flow = AuthFlow::new(tokens.clone(), controller);

    let auth_url = flow.begin_login().await.unwrap();

    // stale session is gone, a verifier is stored
    assert_eq!(store.get(StoreKey::AccessToken).await.unwrap(), None);
    assert_eq!(store.get(StoreKey::RefreshToken).await.unwrap(), None);
    let verifier = store.get(StoreKey::CodeVerifier).await.unwrap().unwrap();
    assert!(auth_url.contains(&format!(
        "code_challenge={}",
        utils::generate_code_challenge(&verifier)
    )));
    assert!(auth_url.contains("code_challenge_method=S256"));
    assert!(auth_url.contains("response_type=code"));

    let exchange = server
        .mock("POST", "/api/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
            Matcher::UrlEncoded("code".into(), "abc123".into()),
            Matcher::UrlEncoded("code_verifier".into(), verifier.clone()),
            Matcher::UrlEncoded(
                "redirect_uri".into(),
                "http://127.0.0.1:8888/callback".into(),
            ),
        ]))
        .with_status(200)
        .with_body(r#"{"access_token":"T1","refresh_token":"R1","expires_in":3600}"#)
        .expect(1)
        .create_async()
        .await;

    flow.complete_login("abc123").await.unwrap();
    exchange.assert_async().await;

    assert_eq!(
        store.get(StoreKey::AccessToken).await.unwrap().as_deref(),
        Some("T1")
    );
    assert_eq!(
        store.get(StoreKey::RefreshToken).await.unwrap().as_deref(),
        Some("R1")
    );
    assert_eq!(store.get(StoreKey::CodeVerifier).await.unwrap(), None);

    // login binds the player
    assert_eq!(fake.created(), 1);
    assert_eq!(fake.connects(), 1);
}

#[tokio::test]
async fn test_complete_login_without_verifier_fails_fast() {
    let mut server = Server::new_async().await;
    let exchange = server
        .mock("POST", "/api/token")
        .expect(0)
        .create_async()
        .await;

    let (tokens, _store) = session(&server.url(), None, None).await;
    let (controller, _api, fake) = device(&tokens);
    let flow = AuthFlow::new(tokens, controller);

    let result = flow.complete_login("abc123").await;
    assert!(matches!(result, Err(Error::MissingVerifier)));
    exchange.assert_async().await;
    assert_eq!(fake.created(), 0);
}

#[tokio::test]
async fn test_failed_exchange_persists_nothing() {
    let mut server = Server::new_async().await;
    let exchange = server
        .mock("POST", "/api/token")
        .with_status(400)
        .with_body(r#"{"error":"invalid_grant","error_description":"Invalid authorization code"}"#)
        .expect(1)
        .create_async()
        .await;

    let (tokens, store) = session(&server.url(), None, None).await;
    let (controller, _api, fake) = device(&tokens);
    let flow = AuthFlow::new(tokens.clone(), controller);

    flow.begin_login().await.unwrap();
    let result = flow.complete_login("expired-code").await;

    assert!(matches!(result, Err(Error::InvalidGrant)));
    assert!(!tokens.tokens().is_authenticated());
    assert_eq!(store.get(StoreKey::AccessToken).await.unwrap(), None);
    assert_eq!(store.get(StoreKey::RefreshToken).await.unwrap(), None);
    assert_eq!(fake.created(), 0);

    // the verifier was spent on the failed exchange
    assert_eq!(store.get(StoreKey::CodeVerifier).await.unwrap(), None);
    let retried = flow.complete_login("expired-code").await;
    assert!(matches!(retried, Err(Error::MissingVerifier)));
    exchange.assert_async().await;
}

#[tokio::test]
async fn test_logout_forgets_session() {
    let server = Server::new_async().await;
    let (tokens, store) = session(&server.url(), Some("T1"), Some("R1")).await;
    store.set(StoreKey::CodeVerifier, "V1").await.unwrap();
    let (controller, _api, _fake) = device(&tokens);
    let flow = AuthFlow::new(tokens.clone(), controller);

    flow.logout().await.unwrap();

    assert!(!tokens.tokens().is_authenticated());
    assert_eq!(store.get(StoreKey::AccessToken).await.unwrap(), None);
    assert_eq!(store.get(StoreKey::RefreshToken).await.unwrap(), None);
    assert_eq!(store.get(StoreKey::CodeVerifier).await.unwrap(), None);
}
