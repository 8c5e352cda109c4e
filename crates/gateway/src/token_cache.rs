//! Single-slot credential cache in front of the OAuth relay.
//!
//! The lock is held across the whole check-or-fetch decision, so a burst of tool calls on a
//! cold cache costs one relay round trip instead of one per call.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use zoho_books_http_tools::{CredentialsProvider, UpstreamCredentials};

pub const DEFAULT_MARGIN: Duration = Duration::from_secs(300);
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Body of the relay's `GET /token`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RelayCredentials {
    pub access_token: String,
    pub organization_id: String,
    pub api_domain: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub company_name: String,
}

#[derive(Debug, Clone)]
pub struct CachedCredentials {
    pub credentials: RelayCredentials,
    pub expires_at: Instant,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenCacheError {
    #[error(
        "Cannot reach the OAuth relay at {url}: {message}. Start the relay, then connect a Zoho Books account at {url}/oauth/authorize"
    )]
    RelayUnavailable { url: String, message: String },

    #[error(
        "No active Zoho Books account. Connect one at {url}/oauth/authorize or activate an existing account on the relay"
    )]
    NoActiveAccount { url: String },

    #[error("OAuth relay at {url} returned an error: {message}")]
    Relay { url: String, message: String },
}

#[async_trait]
pub trait RelayFetcher: Send + Sync {
    async fn fetch(&self) -> Result<RelayCredentials, TokenCacheError>;
}

pub struct TokenCache {
    fetcher: Arc<dyn RelayFetcher>,
    margin: Duration,
    ttl: Duration,
    slot: Mutex<Option<CachedCredentials>>,
}

impl TokenCache {
    #[must_use]
    pub fn new(fetcher: Arc<dyn RelayFetcher>, margin: Duration, ttl: Duration) -> Self {
        Self {
            fetcher,
            margin,
            ttl,
            slot: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_defaults(fetcher: Arc<dyn RelayFetcher>) -> Self {
        Self::new(fetcher, DEFAULT_MARGIN, DEFAULT_TTL)
    }

    /// # Errors
    ///
    /// Relay failures, unchanged. Failures are not cached.
    pub async fn get_credentials(&self) -> Result<RelayCredentials, TokenCacheError> {
        self.get_credentials_at(Instant::now()).await
    }

    /// [`Self::get_credentials`] with an explicit clock.
    ///
    /// # Errors
    ///
    /// Relay failures, unchanged. Failures are not cached.
    pub async fn get_credentials_at(
        &self,
        now: Instant,
    ) -> Result<RelayCredentials, TokenCacheError> {
        let mut slot = self.slot.lock().await;
        if let Some(cached) = slot.as_ref()
            && cached.expires_at > now + self.margin
        {
            return Ok(cached.credentials.clone());
        }

        tracing::debug!("credential cache miss; asking relay");
        let credentials = self.fetcher.fetch().await?;
        tracing::info!(
            organization_id = %credentials.organization_id,
            region = %credentials.region,
            "credentials refreshed from relay"
        );
        *slot = Some(CachedCredentials {
            credentials: credentials.clone(),
            expires_at: now + self.ttl,
        });
        Ok(credentials)
    }

    /// Drop the cached entry; the next call goes to the relay.
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }
}

#[async_trait]
impl CredentialsProvider for TokenCache {
    async fn credentials(&self) -> anyhow::Result<UpstreamCredentials> {
        let c = self.get_credentials().await?;
        Ok(UpstreamCredentials {
            access_token: c.access_token,
            organization_id: c.organization_id,
            api_domain: c.api_domain,
        })
    }

    async fn invalidate(&self) {
        tracing::info!("upstream rejected the cached token; clearing credential cache");
        TokenCache::invalidate(self).await;
    }
}
