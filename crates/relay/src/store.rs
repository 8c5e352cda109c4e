//! Durable account store.
//!
//! One `users` table keyed by the relay-generated user id. At most one non-deleted row carries
//! the active flag; every write that changes which account is active runs in a single
//! transaction so readers never observe zero or two active accounts mid-switch.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDateTime, SecondsFormat, Utc};
use serde::Serialize;
use sqlx::Row as _;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use std::str::FromStr as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Inactive,
    Deleted,
}

impl AccountStatus {
    #[must_use]
    pub fn from_flag(flag: i64) -> Self {
        match flag {
            f if f > 0 => Self::Active,
            0 => Self::Inactive,
            _ => Self::Deleted,
        }
    }

    #[must_use]
    pub fn flag(self) -> i64 {
        match self {
            Self::Active => 1,
            Self::Inactive => 0,
            Self::Deleted => -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub organization_id: String,
    pub api_domain: String,
    pub region: String,
    pub expires_at: DateTime<Utc>,
    pub connected_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
    pub email: String,
    pub company_name: String,
    pub status: AccountStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageStats {
    pub total_users: i64,
    pub active_7d: i64,
    pub active_30d: i64,
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// The account currently flagged active, if any.
    async fn active_account(&self) -> Result<Option<Account>>;
    /// A non-deleted account by user id.
    async fn find_visible(&self, user_id: &str) -> Result<Option<Account>>;
    /// A non-deleted account for the given organization.
    async fn find_by_organization(&self, organization_id: &str) -> Result<Option<Account>>;
    /// Persist `account` and make it the only active one.
    async fn insert_and_activate(&self, account: &Account) -> Result<()>;
    /// Make `user_id` the only active account. `false` if it is missing or deleted.
    async fn activate(&self, user_id: &str) -> Result<bool>;
    /// Soft-delete a visible account. `false` if it is missing or already deleted.
    async fn soft_delete(&self, user_id: &str) -> Result<bool>;
    async fn update_tokens(
        &self,
        user_id: &str,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()>;
    async fn touch(&self, user_id: &str, at: DateTime<Utc>) -> Result<()>;
    /// Non-deleted accounts: active first, then most recently used, then newest.
    async fn list_visible(&self) -> Result<Vec<Account>>;
    async fn stats(&self, now: DateTime<Utc>) -> Result<UsageStats>;
}

const SELECT_COLUMNS: &str = "user_id, access_token, refresh_token, organization_id, api_domain, \
     region, expires_at, connected_at, last_used, email, company_name, is_active";

#[derive(Debug, Clone)]
pub struct SqliteAccountStore {
    pool: SqlitePool,
}

impl SqliteAccountStore {
    /// Open (creating if missing) the database at `url` and ensure the schema exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid, the file cannot be opened, or the schema cannot
    /// be created.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r"
create table if not exists users (
    user_id text primary key,
    access_token text not null,
    refresh_token text not null,
    organization_id text not null,
    api_domain text not null,
    region text,
    expires_at text not null,
    connected_at text not null,
    last_used text,
    email text,
    company_name text,
    is_active integer default 1
)
",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("create index if not exists idx_org_id on users(organization_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("create index if not exists idx_active on users(is_active)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn fetch_one_where(&self, predicate: &str, bind: &str) -> Result<Option<Account>> {
        let sql = format!("select {SELECT_COLUMNS} from users where {predicate} limit 1");
        let row = sqlx::query(&sql)
            .bind(bind)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(account_from_row).transpose()
    }
}

#[async_trait]
impl AccountStore for SqliteAccountStore {
    async fn active_account(&self) -> Result<Option<Account>> {
        let sql = format!("select {SELECT_COLUMNS} from users where is_active = 1 limit 1");
        let row = sqlx::query(&sql).fetch_optional(&self.pool).await?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn find_visible(&self, user_id: &str) -> Result<Option<Account>> {
        self.fetch_one_where("user_id = ? and is_active >= 0", user_id)
            .await
    }

    async fn find_by_organization(&self, organization_id: &str) -> Result<Option<Account>> {
        self.fetch_one_where("organization_id = ? and is_active >= 0", organization_id)
            .await
    }

    async fn insert_and_activate(&self, account: &Account) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("update users set is_active = 0 where is_active >= 0")
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r"
insert or replace into users (
    user_id, access_token, refresh_token, organization_id, api_domain, region,
    expires_at, connected_at, last_used, email, company_name, is_active
)
values (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1)
",
        )
        .bind(&account.user_id)
        .bind(&account.access_token)
        .bind(&account.refresh_token)
        .bind(&account.organization_id)
        .bind(&account.api_domain)
        .bind(&account.region)
        .bind(format_ts(account.expires_at))
        .bind(format_ts(account.connected_at))
        .bind(account.last_used.map(format_ts))
        .bind(&account.email)
        .bind(&account.company_name)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn activate(&self, user_id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let exists = sqlx::query("select 1 from users where user_id = ? and is_active >= 0")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();
        if !exists {
            tx.rollback().await?;
            return Ok(false);
        }
        sqlx::query("update users set is_active = 0 where is_active >= 0")
            .execute(&mut *tx)
            .await?;
        sqlx::query("update users set is_active = 1 where user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn soft_delete(&self, user_id: &str) -> Result<bool> {
        let result = sqlx::query("update users set is_active = ? where user_id = ? and is_active >= 0")
            .bind(AccountStatus::Deleted.flag())
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_tokens(
        &self,
        user_id: &str,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query("update users set access_token = ?, expires_at = ? where user_id = ?")
            .bind(access_token)
            .bind(format_ts(expires_at))
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn touch(&self, user_id: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("update users set last_used = ? where user_id = ?")
            .bind(format_ts(at))
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_visible(&self) -> Result<Vec<Account>> {
        let sql = format!(
            "select {SELECT_COLUMNS} from users where is_active >= 0 \
             order by is_active desc, last_used desc, connected_at desc"
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(account_from_row).collect()
    }

    async fn stats(&self, now: DateTime<Utc>) -> Result<UsageStats> {
        let row = sqlx::query(
            r"
select
    count(*) as total_users,
    coalesce(sum(case when last_used >= ? then 1 else 0 end), 0) as active_7d,
    coalesce(sum(case when last_used >= ? then 1 else 0 end), 0) as active_30d
from users
where is_active >= 0
",
        )
        .bind(format_ts(now - Duration::days(7)))
        .bind(format_ts(now - Duration::days(30)))
        .fetch_one(&self.pool)
        .await?;

        Ok(UsageStats {
            total_users: row.try_get("total_users")?,
            active_7d: row.try_get("active_7d")?,
            active_30d: row.try_get("active_30d")?,
        })
    }
}

/// Fixed-width UTC timestamps so text comparison in SQL orders chronologically.
fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// RFC 3339, or a naive ISO timestamp (read as UTC) as written by older relay versions.
fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|t| t.and_utc())
        })
}

fn required_ts(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>> {
    let raw: String = row.try_get(column)?;
    parse_ts(&raw).ok_or_else(|| {
        sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: format!("invalid timestamp '{raw}'").into(),
        }
        .into()
    })
}

fn account_from_row(row: &SqliteRow) -> Result<Account> {
    let last_used: Option<String> = row.try_get("last_used")?;
    let flag: Option<i64> = row.try_get("is_active")?;
    let region: Option<String> = row.try_get("region")?;
    let email: Option<String> = row.try_get("email")?;
    let company_name: Option<String> = row.try_get("company_name")?;

    Ok(Account {
        user_id: row.try_get("user_id")?,
        access_token: row.try_get("access_token")?,
        refresh_token: row.try_get("refresh_token")?,
        organization_id: row.try_get("organization_id")?,
        api_domain: row.try_get("api_domain")?,
        region: region.unwrap_or_else(|| crate::region::DEFAULT_REGION.to_string()),
        expires_at: required_ts(row, "expires_at")?,
        connected_at: required_ts(row, "connected_at")?,
        last_used: last_used.as_deref().and_then(parse_ts),
        email: email.unwrap_or_default(),
        company_name: company_name.unwrap_or_default(),
        status: AccountStatus::from_flag(flag.unwrap_or(1)),
    })
}
