//! Error types for the OAuth relay.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

pub const NO_ACTIVE_ACCOUNT_MSG: &str = "No active account found. Please select an account.";
pub const ACCOUNT_NOT_FOUND_MSG: &str = "Account not found";

#[derive(Error, Debug)]
pub enum RelayError {
    /// No account is flagged active (none connected, or all deleted/inactive).
    #[error("{}", NO_ACTIVE_ACCOUNT_MSG)]
    NoActiveAccount,

    /// The account does not exist or was deleted.
    #[error("{}", ACCOUNT_NOT_FOUND_MSG)]
    AccountNotFound,

    /// The organization is already connected under another account.
    #[error(
        "This Zoho Books account is already connected (company: {company_name}, organization ID: {organization_id}). Delete the existing account first to reconnect it."
    )]
    DuplicateAccount {
        company_name: String,
        organization_id: String,
    },

    /// The Zoho account has no Books organization yet.
    #[error("No Zoho Books organization found for region '{region}'")]
    OrganizationSetupRequired { region: String },

    /// Code exchange or token refresh was rejected by the accounts server.
    #[error("{0}")]
    UpstreamAuth(String),

    /// Durable store failure.
    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Transport failure or unexpected response from Zoho.
    #[error("HTTP error: {0}")]
    Http(String),
}

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

impl RelayError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NoActiveAccount | Self::AccountNotFound => StatusCode::NOT_FOUND,
            Self::DuplicateAccount { .. } | Self::OrganizationSetupRequired { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::UpstreamAuth(_) => StatusCode::BAD_GATEWAY,
            Self::Store(_) | Self::Http(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "relay request failed");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
