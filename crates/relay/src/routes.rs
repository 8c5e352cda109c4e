//! HTTP surface of the relay.

use crate::error::RelayError;
use crate::oauth::new_user_id;
use crate::pages::{error_page, setup_required_page, success_page};
use crate::service::RelayService;
use axum::{
    Extension, Json, Router,
    extract::{Path, Query},
    http::{HeaderMap, StatusCode, header::HOST},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{delete, get, post},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Clone)]
pub struct RelayState {
    pub service: RelayService,
    /// Shown on the success page. Derived from the request host when unset.
    pub mcp_public_url: Option<String>,
    pub mcp_port: u16,
}

impl RelayState {
    fn mcp_url(&self, headers: &HeaderMap) -> String {
        if let Some(url) = &self.mcp_public_url {
            return url.clone();
        }
        let host = headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .map_or("localhost", |h| {
                h.rsplit_once(':').map_or(h, |(name, _port)| name)
            });
        format!("http://{host}:{}/mcp", self.mcp_port)
    }
}

pub fn router(state: Arc<RelayState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/token", get(token))
        .route("/oauth/authorize", get(authorize))
        .route("/oauth/callback", get(callback))
        .route("/account/{user_id}/activate", post(activate_account))
        .route("/account/{user_id}", delete(delete_account))
        .route("/accounts", get(list_accounts))
        .route("/stats", get(stats))
        .layer(Extension(state))
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn token(Extension(state): Extension<Arc<RelayState>>) -> Result<Response, RelayError> {
    let creds = state.service.get_active_credentials(Utc::now()).await?;
    Ok(Json(creds).into_response())
}

async fn authorize(Extension(state): Extension<Arc<RelayState>>) -> impl IntoResponse {
    let user_id = new_user_id();
    tracing::info!(%user_id, "starting OAuth authorization");
    Redirect::to(&state.service.oauth().authorization_url(&user_id))
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

async fn callback(
    Extension(state): Extension<Arc<RelayState>>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Response {
    if let Some(error) = params.error {
        tracing::warn!(%error, "authorization denied");
        return (
            StatusCode::BAD_REQUEST,
            Html(error_page(&format!("Authorization failed: {error}"))),
        )
            .into_response();
    }
    let (Some(code), Some(user_id)) = (params.code, params.state) else {
        return (
            StatusCode::BAD_REQUEST,
            Html(error_page("Missing 'code' or 'state' query parameter")),
        )
            .into_response();
    };

    match state.service.connect(&code, &user_id, Utc::now()).await {
        Ok(account) => Html(success_page(
            &account.company_name,
            &account.organization_id,
            &account.region,
            &state.mcp_url(&headers),
        ))
        .into_response(),
        Err(RelayError::OrganizationSetupRequired { region }) => {
            Html(setup_required_page(&region)).into_response()
        }
        Err(e) => {
            let status = e.status();
            if status.is_server_error() {
                tracing::error!(error = %e, "OAuth callback failed");
            }
            (status, Html(error_page(&e.to_string()))).into_response()
        }
    }
}

async fn activate_account(
    Extension(state): Extension<Arc<RelayState>>,
    Path(user_id): Path<String>,
) -> Result<Response, RelayError> {
    state.service.activate(&user_id).await?;
    Ok(Json(json!({ "success": true, "message": "Account activated" })).into_response())
}

async fn delete_account(
    Extension(state): Extension<Arc<RelayState>>,
    Path(user_id): Path<String>,
) -> Result<Response, RelayError> {
    state.service.delete(&user_id).await?;
    Ok(Json(json!({ "success": true, "message": "Account deleted" })).into_response())
}

async fn list_accounts(
    Extension(state): Extension<Arc<RelayState>>,
) -> Result<Response, RelayError> {
    Ok(Json(state.service.accounts().await?).into_response())
}

async fn stats(Extension(state): Extension<Arc<RelayState>>) -> Result<Response, RelayError> {
    Ok(Json(state.service.stats(Utc::now()).await?).into_response())
}
