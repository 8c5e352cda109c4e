//! Zoho Books upstream HTTP client.
//!
//! Sits between the generated MCP tools and the Zoho Books REST API:
//! - outbound: path placeholder substitution and body encoding quirks
//! - inbound: status-code normalization and single-entity response collapsing
//!
//! Credentials are pulled per call from a [`client::CredentialsProvider`]; this crate never
//! stores tokens itself.

pub mod client;
pub mod error;
pub mod request;
pub mod response;
pub mod safety;
pub mod semantics;

pub use client::{CredentialsProvider, UpstreamClient, UpstreamCredentials, UpstreamOptions};
pub use error::{Result, UpstreamError};
pub use request::{BodyEncoding, UpstreamRequest};
pub use response::{ResponseRewrite, UpstreamResponse};
