//! Zoho accounts server client: authorization URL, code exchange, refresh, organization lookup.

use crate::error::{RelayError, Result};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use url::Url;

pub const BOOKS_SCOPE: &str = "ZohoBooks.fullaccess.all";
pub const USER_ID_PREFIX: &str = "account_";

/// Token endpoint response (code exchange or refresh).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Only present on code exchange.
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
    #[serde(default)]
    pub api_domain: Option<String>,
}

fn default_expires_in() -> i64 {
    3600
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Organization {
    pub organization_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Consent URL carrying `state` through the round trip.
    fn authorization_url(&self, state: &str) -> String;
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant>;
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant>;
    /// First organization of the account, `None` when Books has not been set up yet.
    async fn primary_organization(
        &self,
        api_domain: &str,
        access_token: &str,
    ) -> Result<Option<Organization>>;
}

#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    /// e.g. `https://accounts.zoho.com`
    pub accounts_url: String,
}

#[derive(Debug, Clone)]
pub struct ZohoOAuthProvider {
    http: reqwest::Client,
    config: OAuthClientConfig,
}

impl ZohoOAuthProvider {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: OAuthClientConfig, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Http(e.to_string()))?;
        Ok(Self { http, config })
    }

    fn token_url(&self) -> String {
        format!(
            "{}/oauth/v2/token",
            self.config.accounts_url.trim_end_matches('/')
        )
    }

    async fn post_token(&self, form: &[(&str, &str)], what: &str) -> Result<TokenGrant> {
        let resp = self
            .http
            .post(self.token_url())
            .form(form)
            .send()
            .await
            .map_err(|e| RelayError::Http(format!("{what}: {}", e.without_url())))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| RelayError::Http(format!("{what}: {}", e.without_url())))?;
        if !status.is_success() {
            return Err(RelayError::UpstreamAuth(format!(
                "{what} failed (status {}): {text}",
                status.as_u16()
            )));
        }

        let body: Value = serde_json::from_str(&text)
            .map_err(|e| RelayError::UpstreamAuth(format!("{what} returned invalid JSON: {e}")))?;
        if let Some(error) = body.get("error") {
            return Err(RelayError::UpstreamAuth(format!(
                "Zoho OAuth error: {}",
                error.as_str().map_or_else(|| error.to_string(), str::to_string)
            )));
        }
        serde_json::from_value(body)
            .map_err(|e| RelayError::UpstreamAuth(format!("{what} returned unexpected JSON: {e}")))
    }
}

#[async_trait]
impl OAuthProvider for ZohoOAuthProvider {
    fn authorization_url(&self, state: &str) -> String {
        authorization_url(&self.config, state)
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant> {
        self.post_token(
            &[
                ("grant_type", "authorization_code"),
                ("client_id", &self.config.client_id),
                ("client_secret", &self.config.client_secret),
                ("redirect_uri", &self.config.redirect_uri),
                ("code", code),
            ],
            "Token exchange",
        )
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant> {
        self.post_token(
            &[
                ("grant_type", "refresh_token"),
                ("client_id", &self.config.client_id),
                ("client_secret", &self.config.client_secret),
                ("refresh_token", refresh_token),
            ],
            "Token refresh",
        )
        .await
    }

    async fn primary_organization(
        &self,
        api_domain: &str,
        access_token: &str,
    ) -> Result<Option<Organization>> {
        let url = format!(
            "{}/books/v3/organizations",
            api_domain.trim_end_matches('/')
        );
        let resp = self
            .http
            .get(url)
            .header(AUTHORIZATION, format!("Zoho-oauthtoken {access_token}"))
            .send()
            .await
            .map_err(|e| RelayError::Http(format!("organization lookup: {}", e.without_url())))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| RelayError::Http(format!("organization lookup: {}", e.without_url())))?;
        if !status.is_success() {
            return Err(RelayError::Http(format!(
                "Failed to get organization (status {}): {text}",
                status.as_u16()
            )));
        }

        let body: Value = serde_json::from_str(&text)
            .map_err(|e| RelayError::Http(format!("organization lookup returned invalid JSON: {e}")))?;
        let Some(first) = body
            .get("organizations")
            .and_then(Value::as_array)
            .and_then(|orgs| orgs.first())
        else {
            return Ok(None);
        };
        let org = serde_json::from_value(first.clone())
            .map_err(|e| RelayError::Http(format!("unexpected organization shape: {e}")))?;
        Ok(Some(org))
    }
}

/// Build the consent URL. Parameters are form-encoded.
#[must_use]
pub fn authorization_url(config: &OAuthClientConfig, state: &str) -> String {
    let base = format!(
        "{}/oauth/v2/auth",
        config.accounts_url.trim_end_matches('/')
    );
    let params = [
        ("scope", BOOKS_SCOPE),
        ("client_id", config.client_id.as_str()),
        ("response_type", "code"),
        ("redirect_uri", config.redirect_uri.as_str()),
        ("access_type", "offline"),
        ("prompt", "consent"),
        ("state", state),
    ];
    match Url::parse_with_params(&base, params) {
        Ok(url) => url.to_string(),
        Err(e) => {
            tracing::warn!(error = %e, accounts_url = %config.accounts_url, "invalid accounts URL");
            base
        }
    }
}

/// Opaque id for a new account: `account_` plus 12 hex characters.
#[must_use]
pub fn new_user_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("{USER_ID_PREFIX}{}", &hex[..12])
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::extract::Form;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use tokio::sync::oneshot;

    pub(crate) struct FakeAccounts {
        pub base: String,
        shutdown: Option<oneshot::Sender<()>>,
    }

    impl Drop for FakeAccounts {
        fn drop(&mut self) {
            if let Some(tx) = self.shutdown.take() {
                let _ = tx.send(());
            }
        }
    }

    // Reports its own address as the API domain so the organization lookup stays local.
    async fn token(
        headers: HeaderMap,
        Form(form): Form<HashMap<String, String>>,
    ) -> impl IntoResponse {
        let host = headers
            .get("host")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("127.0.0.1")
            .to_string();
        match (form.get("grant_type").map(String::as_str), form.get("code")) {
            (Some("authorization_code"), Some(code)) if code == "bad" => {
                Json(json!({ "error": "invalid_code" })).into_response()
            }
            (Some("authorization_code"), Some(_)) => Json(json!({
                "access_token": "at-1",
                "refresh_token": "rt-1",
                "expires_in": 3600,
                "api_domain": format!("http://{host}"),
            }))
            .into_response(),
            (Some("refresh_token"), _) if form.get("refresh_token").is_some_and(|t| t == "rt-1") => {
                Json(json!({ "access_token": "at-2", "expires_in": 3600 })).into_response()
            }
            _ => (StatusCode::BAD_REQUEST, "invalid grant").into_response(),
        }
    }

    async fn organizations(headers: HeaderMap) -> impl IntoResponse {
        match headers.get("authorization").and_then(|v| v.to_str().ok()) {
            Some("Zoho-oauthtoken at-1") => Json(json!({
                "code": 0,
                "organizations": [
                    { "organization_id": "600", "name": "Acme", "email": "ops@acme.test" },
                    { "organization_id": "601", "name": "Other" }
                ]
            }))
            .into_response(),
            Some("Zoho-oauthtoken fresh-account") => {
                Json(json!({ "code": 0, "organizations": [] })).into_response()
            }
            _ => (StatusCode::UNAUTHORIZED, "bad token").into_response(),
        }
    }

    pub(crate) async fn spawn_fake_accounts() -> FakeAccounts {
        let app = Router::new()
            .route("/oauth/v2/token", post(token))
            .route("/books/v3/organizations", get(organizations));
        let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await;
        });
        FakeAccounts {
            base: format!("http://{addr}"),
            shutdown: Some(tx),
        }
    }

    fn provider(accounts_url: &str) -> ZohoOAuthProvider {
        ZohoOAuthProvider::new(
            OAuthClientConfig {
                client_id: "client-1".to_string(),
                client_secret: "secret-1".to_string(),
                redirect_uri: "http://localhost:8081/oauth/callback".to_string(),
                accounts_url: accounts_url.to_string(),
            },
            Duration::from_secs(5),
        )
        .expect("provider")
    }

    #[test]
    fn authorization_url_carries_offline_consent_params() {
        let p = provider("https://accounts.zoho.com/");
        let url = Url::parse(&p.authorization_url("account_abc")).expect("url");
        assert_eq!(url.path(), "/oauth/v2/auth");
        let q: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(q["scope"], BOOKS_SCOPE);
        assert_eq!(q["client_id"], "client-1");
        assert_eq!(q["response_type"], "code");
        assert_eq!(q["redirect_uri"], "http://localhost:8081/oauth/callback");
        assert_eq!(q["access_type"], "offline");
        assert_eq!(q["prompt"], "consent");
        assert_eq!(q["state"], "account_abc");
    }

    #[test]
    fn user_ids_are_prefixed_hex() {
        let id = new_user_id();
        let suffix = id.strip_prefix(USER_ID_PREFIX).expect("prefix");
        assert_eq!(suffix.len(), 12);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, new_user_id());
    }

    #[tokio::test]
    async fn exchange_refresh_and_organization_lookup() {
        let fake = spawn_fake_accounts().await;
        let p = provider(&fake.base);

        let grant = p.exchange_code("good").await.expect("exchange");
        assert_eq!(grant.access_token, "at-1");
        assert_eq!(grant.refresh_token.as_deref(), Some("rt-1"));
        assert_eq!(grant.api_domain.as_deref(), Some(fake.base.as_str()));

        let refreshed = p.refresh("rt-1").await.expect("refresh");
        assert_eq!(refreshed.access_token, "at-2");
        assert_eq!(refreshed.refresh_token, None);

        let org = p
            .primary_organization(&fake.base, "at-1")
            .await
            .expect("lookup")
            .expect("organization");
        assert_eq!(org.organization_id, "600");
        assert_eq!(org.name, "Acme");

        let none = p
            .primary_organization(&fake.base, "fresh-account")
            .await
            .expect("lookup");
        assert_eq!(none, None);
    }

    #[tokio::test]
    async fn provider_errors_are_classified() {
        let fake = spawn_fake_accounts().await;
        let p = provider(&fake.base);

        let err = p.exchange_code("bad").await.expect_err("error key");
        assert!(matches!(&err, RelayError::UpstreamAuth(m) if m.contains("invalid_code")));

        let err = p.refresh("unknown").await.expect_err("400");
        assert!(matches!(&err, RelayError::UpstreamAuth(m) if m.contains("status 400")));

        let err = p
            .primary_organization(&fake.base, "wrong")
            .await
            .expect_err("401");
        assert!(matches!(&err, RelayError::Http(m) if m.contains("status 401")));
    }
}
