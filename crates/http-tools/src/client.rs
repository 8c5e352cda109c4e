//! The upstream client: credential injection plus request/response rewriting.

use crate::error::{Result, UpstreamError};
use crate::request::{BodyEncoding, EncodedBody, UpstreamRequest};
use crate::response::UpstreamResponse;
use crate::safety::{UpstreamSafety, sanitize_reqwest_error};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// The subset of relay credentials an upstream call needs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct UpstreamCredentials {
    pub access_token: String,
    pub organization_id: String,
    pub api_domain: String,
}

/// Source of credentials for each upstream call.
///
/// Implementations are expected to cache; the client asks on every call.
#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    async fn credentials(&self) -> anyhow::Result<UpstreamCredentials>;

    /// The upstream rejected the last credentials (HTTP 401). Cached values should be dropped.
    async fn invalidate(&self) {}
}

#[derive(Debug, Clone)]
pub struct UpstreamOptions {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Prefix between the API domain and operation paths.
    pub api_base_path: String,
    pub body_encoding: BodyEncoding,
    pub collapse_single_entity: bool,
    pub safety: UpstreamSafety,
}

impl Default for UpstreamOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            api_base_path: "/books/v3".to_string(),
            body_encoding: BodyEncoding::Json,
            collapse_single_entity: true,
            safety: UpstreamSafety::zoho_default(),
        }
    }
}

#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    credentials: Arc<dyn CredentialsProvider>,
    options: UpstreamOptions,
}

impl UpstreamClient {
    /// Build a client. Redirects are never followed.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn new(credentials: Arc<dyn CredentialsProvider>, options: UpstreamOptions) -> Result<Self> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| UpstreamError::Request(sanitize_reqwest_error(&e)))?;
        Ok(Self {
            http,
            credentials,
            options,
        })
    }

    #[must_use]
    pub fn options(&self) -> &UpstreamOptions {
        &self.options
    }

    /// Execute one upstream call.
    ///
    /// Non-2xx statuses are not errors here: the rewritten body and status are returned so the
    /// caller can surface the upstream's own error payload.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials are unavailable, the URL is invalid or blocked, the
    /// transport fails, or the response exceeds the size limit.
    pub async fn execute(&self, mut request: UpstreamRequest) -> Result<UpstreamResponse> {
        let creds = self
            .credentials
            .credentials()
            .await
            .map_err(|e| UpstreamError::Credentials(format!("{e:#}")))?;

        let path = request.resolve_path();
        if !request.query.contains_key("organization_id") {
            request.query.insert(
                "organization_id".to_string(),
                Value::String(creds.organization_id.clone()),
            );
        }

        let url = build_url(
            &creds.api_domain,
            &self.options.api_base_path,
            &path,
            &request.query_pairs(),
        )?;
        self.options.safety.check_url(&url).await?;

        let body = request.encode_body(self.options.body_encoding)?;
        let method = request.method.clone();

        tracing::debug!(method = %method, path = %path, "upstream request");

        let mut builder = self
            .http
            .request(method.clone(), url)
            .header(AUTHORIZATION, format!("Zoho-oauthtoken {}", creds.access_token))
            .timeout(self.options.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        builder = match body {
            Some(EncodedBody::Json(v)) => builder.json(&v),
            Some(EncodedBody::Form(fields)) => builder.form(&fields),
            None => builder,
        };

        let response = builder
            .send()
            .await
            .map_err(|e| UpstreamError::Request(sanitize_reqwest_error(&e)))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes =
            read_response_body_limited(response, self.options.safety.max_response_bytes).await?;

        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.credentials.invalidate().await;
        }
        if !status.is_success() {
            tracing::warn!(
                method = %method,
                path = %path,
                status = status.as_u16(),
                "upstream returned an error status"
            );
        }

        Ok(UpstreamResponse::from_bytes(
            status,
            content_type,
            &bytes,
            self.options.collapse_single_entity,
        ))
    }
}

fn build_url(
    api_domain: &str,
    base_path: &str,
    path: &str,
    query: &[(String, String)],
) -> Result<Url> {
    let base_path = base_path.trim_end_matches('/');
    let base_path = if base_path.is_empty() || base_path.starts_with('/') {
        base_path.to_string()
    } else {
        format!("/{base_path}")
    };
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };

    let raw = format!("{}{}{}", api_domain.trim_end_matches('/'), base_path, path);
    let mut url = Url::parse(&raw)
        .map_err(|e| UpstreamError::InvalidUrl(format!("'{api_domain}': {e}")))?;
    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (k, v) in query {
            pairs.append_pair(k, v);
        }
    }
    Ok(url)
}

async fn read_response_body_limited(
    mut response: reqwest::Response,
    max_bytes: Option<usize>,
) -> Result<Vec<u8>> {
    let Some(max) = max_bytes else {
        let bytes = response
            .bytes()
            .await
            .map_err(|e| UpstreamError::Request(sanitize_reqwest_error(&e)))?;
        return Ok(bytes.to_vec());
    };

    if let Some(len) = response.content_length()
        && len > max as u64
    {
        return Err(UpstreamError::ResponseTooLarge(format!(
            "{len} bytes (limit {max})"
        )));
    }

    let mut out: Vec<u8> = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| UpstreamError::Request(sanitize_reqwest_error(&e)))?
    {
        if out.len().saturating_add(chunk.len()) > max {
            return Err(UpstreamError::ResponseTooLarge(format!(
                "exceeded {max} bytes"
            )));
        }
        out.extend_from_slice(&chunk);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        body::Bytes,
        extract::{Path, RawQuery},
        http::{HeaderMap, StatusCode},
        routing::{any, get, post},
    };
    use reqwest::Method;
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    struct StaticCredentials(UpstreamCredentials);

    #[async_trait]
    impl CredentialsProvider for StaticCredentials {
        async fn credentials(&self) -> anyhow::Result<UpstreamCredentials> {
            Ok(self.0.clone())
        }
    }

    struct FailingCredentials;

    #[async_trait]
    impl CredentialsProvider for FailingCredentials {
        async fn credentials(&self) -> anyhow::Result<UpstreamCredentials> {
            anyhow::bail!("No active Zoho Books account found. Please connect an account at: http://relay")
        }
    }

    async fn echo_handler(
        method: axum::http::Method,
        Path(path): Path<String>,
        RawQuery(query): RawQuery,
        headers: HeaderMap,
        body: Bytes,
    ) -> Json<serde_json::Value> {
        Json(json!({
            "code": 0,
            "method": method.as_str(),
            "path": format!("/{path}"),
            "query": query,
            "authorization": headers.get("authorization").and_then(|v| v.to_str().ok()),
            "content_type": headers.get("content-type").and_then(|v| v.to_str().ok()),
            "body": String::from_utf8_lossy(&body),
        }))
    }

    async fn start_mock_zoho() -> (String, oneshot::Sender<()>) {
        let app = Router::new()
            .route(
                "/books/v3/invoices/{id}",
                get(|Path(id): Path<String>| async move {
                    Json(json!({
                        "code": 0,
                        "message": "success",
                        "invoice": {"invoice_id": id, "total": 50}
                    }))
                }),
            )
            .route(
                "/books/v3/contacts/missing",
                get(|| async {
                    (
                        StatusCode::NOT_FOUND,
                        Json(json!({"code": 1002, "message": "Contact does not exist."})),
                    )
                }),
            )
            .route(
                "/books/v3/revoked",
                get(|| async {
                    (
                        StatusCode::UNAUTHORIZED,
                        Json(json!({"code": 57, "message": "Invalid OAuth token"})),
                    )
                }),
            )
            .route(
                "/books/v3/big",
                post(|| async { "x".repeat(2048) }),
            )
            .route("/{*path}", any(echo_handler));

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await
                .expect("serve");
        });
        (format!("http://{addr}"), tx)
    }

    fn client_for(api_domain: &str, encoding: BodyEncoding) -> UpstreamClient {
        let creds = StaticCredentials(UpstreamCredentials {
            access_token: "tok-123".to_string(),
            organization_id: "org-1".to_string(),
            api_domain: api_domain.to_string(),
        });
        let options = UpstreamOptions {
            body_encoding: encoding,
            safety: UpstreamSafety::permissive(),
            ..UpstreamOptions::default()
        };
        UpstreamClient::new(Arc::new(creds), options).expect("client")
    }

    #[tokio::test]
    async fn injects_auth_header_and_organization_and_substitutes_path() {
        let (base, _shutdown) = start_mock_zoho().await;
        let client = client_for(&base, BodyEncoding::Json);

        let req = UpstreamRequest::new(Method::PUT, "/contacts/{contact_id}")
            .with_path_arg("contact_id", json!(42))
            .with_body_field("contact_name", json!("Acme"))
            .with_body_field("contact_persons", json!(r#"[{"first_name":"Ana"}]"#));
        let resp = client.execute(req).await.expect("execute");

        assert!(resp.status.is_success());
        assert_eq!(resp.body["code"], json!("0"));
        assert_eq!(resp.body["method"], json!("PUT"));
        assert_eq!(resp.body["path"], json!("/books/v3/contacts/42"));
        assert_eq!(resp.body["query"], json!("organization_id=org-1"));
        assert_eq!(resp.body["authorization"], json!("Zoho-oauthtoken tok-123"));
        assert_eq!(resp.body["content_type"], json!("application/json"));

        let sent: serde_json::Value =
            serde_json::from_str(resp.body["body"].as_str().expect("body string")).expect("json");
        assert_eq!(
            sent,
            json!({"contact_name": "Acme", "contact_persons": [{"first_name": "Ana"}]})
        );
    }

    #[tokio::test]
    async fn form_encoding_sends_json_string_field() {
        let (base, _shutdown) = start_mock_zoho().await;
        let client = client_for(&base, BodyEncoding::FormJsonString);

        let req = UpstreamRequest::new(Method::POST, "/items").with_body_field("name", json!("W"));
        let resp = client.execute(req).await.expect("execute");

        assert_eq!(
            resp.body["content_type"],
            json!("application/x-www-form-urlencoded")
        );
        let raw = resp.body["body"].as_str().expect("body string");
        let fields: Vec<(String, String)> = url::form_urlencoded::parse(raw.as_bytes())
            .into_owned()
            .collect();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].0, "JSONString");
        assert_eq!(fields[0].1, r#"{"name":"W"}"#);
    }

    #[tokio::test]
    async fn caller_supplied_organization_id_wins() {
        let (base, _shutdown) = start_mock_zoho().await;
        let client = client_for(&base, BodyEncoding::Json);

        let req = UpstreamRequest::new(Method::GET, "/items").with_query("organization_id", json!("other"));
        let resp = client.execute(req).await.expect("execute");
        assert_eq!(resp.body["query"], json!("organization_id=other"));
    }

    #[tokio::test]
    async fn single_entity_responses_are_collapsed() {
        let (base, _shutdown) = start_mock_zoho().await;
        let client = client_for(&base, BodyEncoding::Json);

        let req = UpstreamRequest::new(Method::GET, "/invoices/{invoice_id}")
            .with_path_arg("invoice_id", json!("123"));
        let resp = client.execute(req).await.expect("execute");
        assert_eq!(
            resp.body,
            json!({
                "code": "0",
                "message": "success",
                "invoice_id": "123",
                "full_data": {"invoice_id": "123", "total": 50}
            })
        );
    }

    #[tokio::test]
    async fn error_statuses_are_returned_with_rewritten_body() {
        let (base, _shutdown) = start_mock_zoho().await;
        let client = client_for(&base, BodyEncoding::Json);

        let resp = client
            .execute(UpstreamRequest::new(Method::GET, "/contacts/missing"))
            .await
            .expect("execute");
        assert_eq!(resp.status.as_u16(), 404);
        assert_eq!(
            resp.body,
            json!({"code": "1002", "message": "Contact does not exist."})
        );
    }

    #[tokio::test]
    async fn unauthorized_response_invalidates_credentials() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct CountingCredentials {
            creds: UpstreamCredentials,
            invalidations: AtomicUsize,
        }

        #[async_trait]
        impl CredentialsProvider for CountingCredentials {
            async fn credentials(&self) -> anyhow::Result<UpstreamCredentials> {
                Ok(self.creds.clone())
            }

            async fn invalidate(&self) {
                self.invalidations.fetch_add(1, Ordering::SeqCst);
            }
        }

        let (base, _shutdown) = start_mock_zoho().await;
        let provider = Arc::new(CountingCredentials {
            creds: UpstreamCredentials {
                access_token: "revoked".to_string(),
                organization_id: "org-1".to_string(),
                api_domain: base,
            },
            invalidations: AtomicUsize::new(0),
        });
        let client = UpstreamClient::new(
            provider.clone(),
            UpstreamOptions {
                safety: UpstreamSafety::permissive(),
                ..UpstreamOptions::default()
            },
        )
        .expect("client");

        let ok = UpstreamRequest::new(Method::GET, "/invoices/{invoice_id}")
            .with_path_arg("invoice_id", json!("1"));
        client.execute(ok).await.expect("ok call");
        assert_eq!(provider.invalidations.load(Ordering::SeqCst), 0);

        let resp = client
            .execute(UpstreamRequest::new(Method::GET, "/revoked"))
            .await
            .expect("401 is a response");
        assert_eq!(resp.status.as_u16(), 401);
        assert_eq!(provider.invalidations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn credential_failures_surface_provider_message() {
        let client = UpstreamClient::new(
            Arc::new(FailingCredentials),
            UpstreamOptions {
                safety: UpstreamSafety::permissive(),
                ..UpstreamOptions::default()
            },
        )
        .expect("client");
        let err = client
            .execute(UpstreamRequest::new(Method::GET, "/items"))
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Credentials(_)));
        assert!(err.to_string().contains("Please connect an account at: http://relay"));
    }

    #[tokio::test]
    async fn oversized_responses_are_rejected() {
        let (base, _shutdown) = start_mock_zoho().await;
        let creds = StaticCredentials(UpstreamCredentials {
            access_token: "t".to_string(),
            organization_id: "o".to_string(),
            api_domain: base.clone(),
        });
        let mut safety = UpstreamSafety::permissive();
        safety.max_response_bytes = Some(1024);
        let client = UpstreamClient::new(
            Arc::new(creds),
            UpstreamOptions {
                safety,
                ..UpstreamOptions::default()
            },
        )
        .expect("client");

        let err = client
            .execute(UpstreamRequest::new(Method::POST, "/big"))
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::ResponseTooLarge(_)));
    }

    #[tokio::test]
    async fn default_safety_blocks_non_zoho_api_domains() {
        let creds = StaticCredentials(UpstreamCredentials {
            access_token: "t".to_string(),
            organization_id: "o".to_string(),
            api_domain: "https://attacker.example".to_string(),
        });
        let client =
            UpstreamClient::new(Arc::new(creds), UpstreamOptions::default()).expect("client");
        let err = client
            .execute(UpstreamRequest::new(Method::GET, "/items"))
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::InvalidUrl(_)));
    }

    #[test]
    fn build_url_joins_domain_base_path_and_query() {
        let url = build_url(
            "https://www.zohoapis.eu/",
            "books/v3/",
            "/invoices",
            &[("organization_id".to_string(), "1 2".to_string())],
        )
        .expect("url");
        assert_eq!(
            url.as_str(),
            "https://www.zohoapis.eu/books/v3/invoices?organization_id=1+2"
        );
    }
}
