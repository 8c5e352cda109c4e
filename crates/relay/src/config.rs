//! Command-line and environment configuration.

use crate::oauth::OAuthClientConfig;
use clap::{Parser, ValueEnum};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Zoho Books OAuth relay", long_about = None)]
pub struct Args {
    #[arg(long, env = "ZOHO_CLIENT_ID")]
    pub client_id: String,

    #[arg(long, env = "ZOHO_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: String,

    /// Must match the redirect URI registered with the Zoho API console.
    #[arg(long, env = "ZOHO_REDIRECT_URI")]
    pub redirect_uri: String,

    #[arg(long, env = "OAUTH_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "OAUTH_PORT", default_value_t = 8081)]
    pub port: u16,

    /// SQLite database URL; the file is created if missing.
    #[arg(long, env = "TOKEN_DB_URL", default_value = "sqlite://zoho_tokens.db")]
    pub token_db_url: String,

    #[arg(long, env = "ZOHO_ACCOUNTS_URL", default_value = "https://accounts.zoho.com")]
    pub accounts_url: String,

    /// Used when the token response carries no `api_domain`.
    #[arg(
        long,
        env = "ZOHO_DEFAULT_API_DOMAIN",
        default_value = "https://www.zohoapis.com"
    )]
    pub default_api_domain: String,

    /// MCP endpoint shown after a successful connection.
    #[arg(long, env = "MCP_PUBLIC_URL")]
    pub mcp_public_url: Option<String>,

    /// Gateway port, used to derive the MCP endpoint when no public URL is set.
    #[arg(long, env = "MCP_PORT", default_value_t = 8080)]
    pub mcp_port: u16,

    /// Timeout for calls to the Zoho accounts server and API.
    #[arg(long, env = "ZOHO_HTTP_TIMEOUT_SECS", default_value_t = 30)]
    pub http_timeout_secs: u64,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Args {
    #[must_use]
    pub fn oauth_client_config(&self) -> OAuthClientConfig {
        OAuthClientConfig {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            redirect_uri: self.redirect_uri.clone(),
            accounts_url: self.accounts_url.clone(),
        }
    }

    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
