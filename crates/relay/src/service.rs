//! Relay operations on top of the account store and the OAuth provider.

use crate::error::{RelayError, Result};
use crate::oauth::OAuthProvider;
use crate::region::region_from_api_domain;
use crate::store::{Account, AccountStatus, AccountStore, UsageStats};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Refresh when the stored token expires within this many seconds.
pub const REFRESH_MARGIN_SECS: i64 = 300;

/// What `/token` hands to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveCredentials {
    pub access_token: String,
    pub organization_id: String,
    pub api_domain: String,
    pub region: String,
    pub email: String,
    pub company_name: String,
}

impl From<&Account> for ActiveCredentials {
    fn from(a: &Account) -> Self {
        Self {
            access_token: a.access_token.clone(),
            organization_id: a.organization_id.clone(),
            api_domain: a.api_domain.clone(),
            region: a.region.clone(),
            email: a.email.clone(),
            company_name: a.company_name.clone(),
        }
    }
}

/// Account listing entry. Never carries tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountSummary {
    pub user_id: String,
    pub organization_id: String,
    pub company_name: String,
    pub email: String,
    pub region: String,
    pub api_domain: String,
    pub status: AccountStatus,
    pub connected_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
}

impl From<Account> for AccountSummary {
    fn from(a: Account) -> Self {
        Self {
            user_id: a.user_id,
            organization_id: a.organization_id,
            company_name: a.company_name,
            email: a.email,
            region: a.region,
            api_domain: a.api_domain,
            status: a.status,
            connected_at: a.connected_at,
            last_used: a.last_used,
        }
    }
}

#[derive(Clone)]
pub struct RelayService {
    store: Arc<dyn AccountStore>,
    oauth: Arc<dyn OAuthProvider>,
    default_api_domain: String,
}

impl RelayService {
    #[must_use]
    pub fn new(
        store: Arc<dyn AccountStore>,
        oauth: Arc<dyn OAuthProvider>,
        default_api_domain: impl Into<String>,
    ) -> Self {
        Self {
            store,
            oauth,
            default_api_domain: default_api_domain.into(),
        }
    }

    #[must_use]
    pub fn oauth(&self) -> &dyn OAuthProvider {
        self.oauth.as_ref()
    }

    /// Credentials of the active account, refreshed first when close to expiry.
    ///
    /// A failed refresh is logged and the stored token is served anyway; the upstream call
    /// will then fail with a clear auth error.
    ///
    /// # Errors
    ///
    /// [`RelayError::NoActiveAccount`] when no account is active, or a store error.
    pub async fn get_active_credentials(&self, now: DateTime<Utc>) -> Result<ActiveCredentials> {
        let Some(mut account) = self.store.active_account().await? else {
            return Err(RelayError::NoActiveAccount);
        };

        if now + Duration::seconds(REFRESH_MARGIN_SECS) >= account.expires_at {
            match self.oauth.refresh(&account.refresh_token).await {
                Ok(grant) => {
                    let expires_at = now + Duration::seconds(grant.expires_in);
                    self.store
                        .update_tokens(&account.user_id, &grant.access_token, expires_at)
                        .await?;
                    account.access_token = grant.access_token;
                    account.expires_at = expires_at;
                    tracing::info!(user_id = %account.user_id, %expires_at, "access token refreshed");
                }
                Err(e) => {
                    tracing::warn!(
                        user_id = %account.user_id,
                        error = %e,
                        "token refresh failed; serving stored token"
                    );
                }
            }
        }

        self.store.touch(&account.user_id, now).await?;
        Ok(ActiveCredentials::from(&account))
    }

    /// Complete an OAuth round trip: exchange `code`, identify the organization, store the
    /// account under `user_id` and make it active.
    ///
    /// # Errors
    ///
    /// [`RelayError::OrganizationSetupRequired`] when the Zoho account has no Books
    /// organization, [`RelayError::DuplicateAccount`] when the organization is already
    /// connected (the store is left untouched), or provider/store errors.
    pub async fn connect(&self, code: &str, user_id: &str, now: DateTime<Utc>) -> Result<Account> {
        let grant = self.oauth.exchange_code(code).await?;
        let api_domain = grant
            .api_domain
            .clone()
            .unwrap_or_else(|| self.default_api_domain.clone());
        let region = region_from_api_domain(&api_domain);
        tracing::info!(%region, %api_domain, "authorization code exchanged");

        let Some(org) = self
            .oauth
            .primary_organization(&api_domain, &grant.access_token)
            .await?
        else {
            tracing::info!(%region, "account has no Books organization yet");
            return Err(RelayError::OrganizationSetupRequired { region });
        };

        if let Some(existing) = self.store.find_by_organization(&org.organization_id).await? {
            tracing::warn!(
                organization_id = %org.organization_id,
                existing_user_id = %existing.user_id,
                "organization already connected"
            );
            return Err(RelayError::DuplicateAccount {
                company_name: existing.company_name,
                organization_id: org.organization_id,
            });
        }

        let refresh_token = grant.refresh_token.ok_or_else(|| {
            RelayError::UpstreamAuth("Token exchange returned no refresh token".to_string())
        })?;

        let account = Account {
            user_id: user_id.to_string(),
            access_token: grant.access_token,
            refresh_token,
            organization_id: org.organization_id,
            api_domain,
            region,
            expires_at: now + Duration::seconds(grant.expires_in),
            connected_at: now,
            last_used: None,
            email: org.email,
            company_name: org.name,
            status: AccountStatus::Active,
        };
        self.store.insert_and_activate(&account).await?;
        tracing::info!(
            user_id = %account.user_id,
            organization_id = %account.organization_id,
            company = %account.company_name,
            "account connected"
        );
        Ok(account)
    }

    /// # Errors
    ///
    /// [`RelayError::AccountNotFound`] if the account is missing or deleted.
    pub async fn activate(&self, user_id: &str) -> Result<()> {
        if !self.store.activate(user_id).await? {
            return Err(RelayError::AccountNotFound);
        }
        tracing::info!(%user_id, "account activated");
        Ok(())
    }

    /// Soft-delete a visible account.
    ///
    /// # Errors
    ///
    /// [`RelayError::AccountNotFound`] if the user id is unknown or already deleted.
    pub async fn delete(&self, user_id: &str) -> Result<()> {
        if !self.store.soft_delete(user_id).await? {
            return Err(RelayError::AccountNotFound);
        }
        tracing::info!(%user_id, "account deleted");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns a store error.
    pub async fn accounts(&self) -> Result<Vec<AccountSummary>> {
        Ok(self
            .store
            .list_visible()
            .await?
            .into_iter()
            .map(AccountSummary::from)
            .collect())
    }

    /// # Errors
    ///
    /// Returns a store error.
    pub async fn stats(&self, now: DateTime<Utc>) -> Result<UsageStats> {
        self.store.stats(now).await
    }
}
