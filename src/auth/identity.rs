// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! OAuth identity provider client.
//!
//! Resolves an OAuth authorization code to the user's primary, verified
//! email address:
//!
//! 1. POST the token endpoint with the client credentials and the code
//! 2. GET the emails endpoint with the returned access token
//! 3. Pick the address flagged both `primary` and `verified`
//!
//! One deadline bounds the whole resolution, both calls included. Transport
//! failures, error statuses, undecodable bodies and timeouts all become
//! [`AuthError::UpstreamUnavailable`]. Nothing is retried.

use std::time::Duration;

use reqwest::{header, Client};
use serde::Deserialize;
use tokio::time::Instant;
use url::Url;

use super::AuthError;

/// Default token exchange endpoint (GitHub OAuth apps).
pub const DEFAULT_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";

/// Default email listing endpoint.
pub const DEFAULT_EMAILS_URL: &str = "https://api.github.com/user/emails";

const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";
const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("polaris-auth-server/", env!("CARGO_PKG_VERSION"));

/// Identity provider settings.
#[derive(Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: Url,
    pub emails_url: Url,
    pub timeout: Duration,
}

impl std::fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("token_url", &self.token_url.as_str())
            .field("emails_url", &self.emails_url.as_str())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// One entry of the provider's email listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EmailAddress {
    pub email: String,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub visibility: Option<String>,
}

/// Choose the primary, verified address, lower-cased.
pub fn select_primary_email(emails: &[EmailAddress]) -> Option<String> {
    emails
        .iter()
        .find(|e| e.primary && e.verified)
        .map(|e| e.email.to_lowercase())
}

/// Client for the OAuth code exchange and email lookup.
#[derive(Debug, Clone)]
pub struct OAuthProvider {
    config: OAuthConfig,
    http: Client,
}

impl OAuthProvider {
    pub fn new(config: OAuthConfig) -> Result<Self, AuthError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AuthError::UpstreamUnavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, http })
    }

    /// Resolve an authorization code to the user's primary email.
    pub async fn primary_email(&self, code: &str) -> Result<String, AuthError> {
        let deadline = self.deadline();
        let access_token = self.exchange_code_before(code, deadline).await?;
        let emails = self.fetch_emails_before(&access_token, deadline).await?;
        select_primary_email(&emails).ok_or_else(|| {
            tracing::info!(candidates = emails.len(), "No primary verified email on account");
            AuthError::Unauthorized("no primary verified email")
        })
    }

    /// Exchange an authorization code for a provider access token.
    pub async fn exchange_code(&self, code: &str) -> Result<String, AuthError> {
        self.exchange_code_before(code, self.deadline()).await
    }

    /// List the email addresses of the account behind `access_token`.
    pub async fn fetch_emails(&self, access_token: &str) -> Result<Vec<EmailAddress>, AuthError> {
        self.fetch_emails_before(access_token, self.deadline()).await
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.config.timeout
    }

    async fn exchange_code_before(&self, code: &str, deadline: Instant) -> Result<String, AuthError> {
        let request = self
            .http
            .post(self.config.token_url.clone())
            .header(header::ACCEPT, "application/json")
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", code),
            ]);

        let body: AccessTokenResponse = self.send_json(request, "token exchange", deadline).await?;
        match body.access_token {
            Some(token) if !token.is_empty() => Ok(token),
            _ => {
                // The provider answers 200 with an error field for bad codes
                tracing::info!(error = ?body.error, "OAuth code exchange rejected");
                Err(AuthError::Unauthorized("authorization code rejected"))
            }
        }
    }

    async fn fetch_emails_before(&self, access_token: &str, deadline: Instant) -> Result<Vec<EmailAddress>, AuthError> {
        let request = self
            .http
            .get(self.config.emails_url.clone())
            .bearer_auth(access_token)
            .header(header::ACCEPT, "application/json")
            .header(API_VERSION_HEADER, API_VERSION);

        self.send_json(request, "email lookup", deadline).await
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        call: &'static str,
        deadline: Instant,
    ) -> Result<T, AuthError> {
        let response = tokio::time::timeout_at(deadline, request.send())
            .await
            .map_err(|_| {
                tracing::warn!(call, "Identity provider call timed out");
                AuthError::UpstreamUnavailable(format!("{call} timed out"))
            })?
            .map_err(|e| {
                tracing::warn!(call, error = %e, "Identity provider request failed");
                AuthError::UpstreamUnavailable(format!("{call} failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(call, %status, "Identity provider returned error status");
            return Err(AuthError::UpstreamUnavailable(format!("{call} returned {status}")));
        }

        tokio::time::timeout_at(deadline, response.json::<T>())
            .await
            .map_err(|_| AuthError::UpstreamUnavailable(format!("{call} body timed out")))?
            .map_err(|e| {
                tracing::warn!(call, error = %e, "Identity provider response was invalid");
                AuthError::UpstreamUnavailable(format!("{call} response invalid: {e}"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::Form,
        http::{HeaderMap, StatusCode},
        routing::{get, post},
        Json, Router,
    };
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use tokio::net::TcpListener;

    fn email(address: &str, primary: bool, verified: bool) -> EmailAddress {
        EmailAddress {
            email: address.to_string(),
            verified,
            primary,
            visibility: None,
        }
    }

    async fn spawn(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn provider_for(base: &str, timeout: Duration) -> OAuthProvider {
        OAuthProvider::new(OAuthConfig {
            client_id: "client".into(),
            client_secret: "secret".into(),
            token_url: Url::parse(&format!("{base}/login/oauth/access_token")).unwrap(),
            emails_url: Url::parse(&format!("{base}/user/emails")).unwrap(),
            timeout,
        })
        .unwrap()
    }

    fn mock_provider(emails: Value) -> Router {
        Router::new()
            .route(
                "/login/oauth/access_token",
                post(|Form(form): Form<HashMap<String, String>>| async move {
                    if form.get("code").map(String::as_str) == Some("good-code")
                        && form.get("client_secret").map(String::as_str) == Some("secret")
                    {
                        Json(json!({"access_token": "gho_test", "token_type": "bearer"}))
                    } else {
                        Json(json!({"error": "bad_verification_code"}))
                    }
                }),
            )
            .route(
                "/user/emails",
                get(move |headers: HeaderMap| {
                    let emails = emails.clone();
                    async move {
                        let authorized = headers
                            .get("authorization")
                            .and_then(|v| v.to_str().ok())
                            == Some("Bearer gho_test");
                        let versioned = headers.get(API_VERSION_HEADER).is_some();
                        if authorized && versioned {
                            (StatusCode::OK, Json(emails))
                        } else {
                            (StatusCode::UNAUTHORIZED, Json(json!({"message": "Bad credentials"})))
                        }
                    }
                }),
            )
    }

    #[test]
    fn selects_primary_verified_lowercased() {
        let emails = vec![
            email("other@example.com", false, true),
            email("Alice@Example.COM", true, true),
        ];
        assert_eq!(select_primary_email(&emails).as_deref(), Some("alice@example.com"));
    }

    #[test]
    fn unverified_primary_is_not_selected() {
        let emails = vec![email("alice@example.com", true, false), email("b@example.com", false, true)];
        assert_eq!(select_primary_email(&emails), None);
    }

    #[test]
    fn debug_redacts_client_secret() {
        let provider = provider_for("http://127.0.0.1:1", Duration::from_secs(1));
        assert!(!format!("{provider:?}").contains("\"secret\""));
    }

    #[tokio::test]
    async fn resolves_code_to_primary_email() {
        let base = spawn(mock_provider(json!([
            {"email": "alt@example.com", "verified": true, "primary": false, "visibility": null},
            {"email": "Alice@Example.com", "verified": true, "primary": true, "visibility": "private"}
        ])))
        .await;
        let provider = provider_for(&base, Duration::from_secs(5));

        let email = provider.primary_email("good-code").await.unwrap();
        assert_eq!(email, "alice@example.com");
    }

    #[tokio::test]
    async fn rejected_code_is_unauthorized() {
        let base = spawn(mock_provider(json!([]))).await;
        let provider = provider_for(&base, Duration::from_secs(5));

        let result = provider.primary_email("bad-code").await;
        assert!(matches!(result, Err(AuthError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn account_without_primary_email_is_unauthorized() {
        let base = spawn(mock_provider(json!([
            {"email": "alice@example.com", "verified": false, "primary": true}
        ])))
        .await;
        let provider = provider_for(&base, Duration::from_secs(5));

        let result = provider.primary_email("good-code").await;
        assert!(matches!(result, Err(AuthError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn error_status_is_upstream_unavailable() {
        let base = spawn(mock_provider(json!([]))).await;
        let provider = provider_for(&base, Duration::from_secs(5));

        let result = provider.fetch_emails("wrong-token").await;
        assert!(matches!(result, Err(AuthError::UpstreamUnavailable(_))));
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let router = Router::new().route(
            "/login/oauth/access_token",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({"access_token": "late"}))
            }),
        );
        let base = spawn(router).await;
        let provider = provider_for(&base, Duration::from_millis(100));

        let result = provider.exchange_code("good-code").await;
        assert!(matches!(result, Err(AuthError::UpstreamUnavailable(_))));
    }

    #[tokio::test]
    async fn deadline_spans_both_calls() {
        // Each call fits the timeout on its own, the pair does not
        let router = Router::new()
            .route(
                "/login/oauth/access_token",
                post(|| async {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    Json(json!({"access_token": "gho_test"}))
                }),
            )
            .route(
                "/user/emails",
                get(|| async {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    Json(json!([{"email": "a@example.com", "verified": true, "primary": true, "visibility": null}]))
                }),
            );
        let base = spawn(router).await;
        let provider = provider_for(&base, Duration::from_millis(450));

        let result = provider.primary_email("good-code").await;
        assert!(matches!(result, Err(AuthError::UpstreamUnavailable(_))));
    }

    #[tokio::test]
    async fn unreachable_provider_is_upstream_unavailable() {
        // Bind then drop to get a port nothing listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let provider = provider_for(&format!("http://{addr}"), Duration::from_secs(2));

        let result = provider.exchange_code("good-code").await;
        assert!(matches!(result, Err(AuthError::UpstreamUnavailable(_))));
    }
}
