//! HTTP client for the relay's `GET /token`.

use crate::token_cache::{RelayCredentials, RelayFetcher, TokenCacheError};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpRelayFetcher {
    http: reqwest::Client,
    base_url: String,
}

impl HttpRelayFetcher {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: &str, timeout: Duration) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn relay_error(&self, message: String) -> TokenCacheError {
        TokenCacheError::Relay {
            url: self.base_url.clone(),
            message,
        }
    }
}

#[async_trait]
impl RelayFetcher for HttpRelayFetcher {
    async fn fetch(&self) -> Result<RelayCredentials, TokenCacheError> {
        let resp = self
            .http
            .get(format!("{}/token", self.base_url))
            .send()
            .await
            .map_err(|e| TokenCacheError::RelayUnavailable {
                url: self.base_url.clone(),
                message: e.without_url().to_string(),
            })?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(TokenCacheError::NoActiveAccount {
                url: self.base_url.clone(),
            });
        }
        let text = resp
            .text()
            .await
            .map_err(|e| self.relay_error(e.without_url().to_string()))?;
        if !status.is_success() {
            return Err(self.relay_error(format!(
                "HTTP {}: {}",
                status.as_u16(),
                error_detail(&text)
            )));
        }

        serde_json::from_str(&text)
            .map_err(|e| self.relay_error(format!("unexpected /token response: {e}")))
    }
}

/// The relay's `{"detail": ...}` message, or the raw body.
fn error_detail(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode as AxumStatus;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::net::SocketAddr;
    use tokio::sync::oneshot;

    async fn serve(app: Router) -> (String, oneshot::Sender<()>) {
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
        (format!("http://{addr}"), tx)
    }

    #[tokio::test]
    async fn parses_token_response() {
        let app = Router::new().route(
            "/token",
            get(|| async {
                Json(json!({
                    "access_token": "at",
                    "organization_id": "600",
                    "api_domain": "https://www.zohoapis.eu",
                    "region": "eu",
                    "email": "ops@acme.test",
                    "company_name": "Acme",
                }))
            }),
        );
        let (base, _stop) = serve(app).await;
        let fetcher = HttpRelayFetcher::new(&format!("{base}/"), Duration::from_secs(5))
            .expect("client");
        assert_eq!(fetcher.base_url(), base);

        let creds = fetcher.fetch().await.expect("creds");
        assert_eq!(creds.organization_id, "600");
        assert_eq!(creds.region, "eu");
    }

    #[tokio::test]
    async fn maps_relay_failures() {
        let app = Router::new().route(
            "/token",
            get(|| async {
                (
                    AxumStatus::NOT_FOUND,
                    Json(json!({ "detail": "No active account found. Please select an account." })),
                )
                    .into_response()
            }),
        );
        let (base, _stop) = serve(app).await;
        let fetcher = HttpRelayFetcher::new(&base, Duration::from_secs(5)).expect("client");
        assert_eq!(
            fetcher.fetch().await,
            Err(TokenCacheError::NoActiveAccount { url: base.clone() })
        );

        let app = Router::new().route(
            "/token",
            get(|| async {
                (
                    AxumStatus::INTERNAL_SERVER_ERROR,
                    Json(json!({ "detail": "Store error: disk full" })),
                )
                    .into_response()
            }),
        );
        let (base, _stop) = serve(app).await;
        let fetcher = HttpRelayFetcher::new(&base, Duration::from_secs(5)).expect("client");
        match fetcher.fetch().await {
            Err(TokenCacheError::Relay { message, .. }) => {
                assert_eq!(message, "HTTP 500: Store error: disk full");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_relay_names_the_url() {
        let port = zoho_books_test_support::pick_unused_port().expect("port");
        let base = format!("http://127.0.0.1:{port}");
        let fetcher = HttpRelayFetcher::new(&base, Duration::from_secs(2)).expect("client");
        let err = fetcher.fetch().await.expect_err("unreachable");
        assert!(matches!(err, TokenCacheError::RelayUnavailable { .. }));
        assert!(err.to_string().contains(&format!("{base}/oauth/authorize")));
    }
}
