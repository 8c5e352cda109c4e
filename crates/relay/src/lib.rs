//! OAuth relay for Zoho Books.
//!
//! Owns the durable account store and the OAuth round trip with Zoho. The MCP gateway never
//! sees refresh tokens: it asks `GET /token` for the active account's access token and this
//! service refreshes it when it is about to expire.

pub mod config;
pub mod error;
pub mod oauth;
pub mod pages;
pub mod region;
pub mod routes;
pub mod service;
pub mod store;

pub use error::{RelayError, Result};
pub use oauth::{OAuthClientConfig, OAuthProvider, ZohoOAuthProvider};
pub use routes::{RelayState, router};
pub use service::{ActiveCredentials, RelayService};
pub use store::{AccountStore, SqliteAccountStore};
