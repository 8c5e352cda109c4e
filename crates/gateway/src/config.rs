//! Command-line and environment configuration.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use zoho_books_http_tools::safety::UpstreamSafety;
use zoho_books_http_tools::{BodyEncoding, UpstreamOptions};
use zoho_books_openapi_tools::{AllowList, PipelineConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Zoho Books MCP gateway", long_about = None)]
pub struct Args {
    /// Base URL of the OAuth relay.
    #[arg(long, env = "OAUTH_SERVER_URL", default_value = "http://localhost:8081")]
    pub relay_url: String,

    #[arg(long, env = "MCP_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "MCP_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Directory of `OpenAPI` fragments describing the Zoho Books API.
    #[arg(long, env = "OPENAPI_DIR")]
    pub openapi_dir: PathBuf,

    /// Operation ids to expose, one per line or as a YAML list. All operations when unset.
    #[arg(long, env = "ALLOWED_TOOLS_FILE")]
    pub allowed_tools_file: Option<PathBuf>,

    /// Fragment stems loaded first, in order. Earlier fragments win path conflicts.
    #[arg(
        long,
        env = "PRIORITY_FRAGMENTS",
        value_delimiter = ',',
        default_value = "invoices,customer-debit-notes"
    )]
    pub priority_fragments: Vec<String>,

    #[arg(
        long,
        env = "STRIP_RESPONSE_SCHEMAS",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub strip_response_schemas: bool,

    /// Also expose `/admin/...` paths and operations tagged `internal`.
    #[arg(long, env = "INCLUDE_INTERNAL_OPERATIONS")]
    pub include_internal_operations: bool,

    /// `json` or `form-json-string`.
    #[arg(long, env = "BODY_ENCODING", default_value = "json")]
    pub body_encoding: BodyEncoding,

    #[arg(
        long,
        env = "COLLAPSE_SINGLE_ENTITY",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub collapse_single_entity: bool,

    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS", default_value_t = 30)]
    pub upstream_timeout_secs: u64,

    #[arg(long, env = "RELAY_TIMEOUT_SECS", default_value_t = 30)]
    pub relay_timeout_secs: u64,

    /// Skip the Zoho host allow-list and private-network checks (local mock upstreams only).
    #[arg(long, env = "UPSTREAM_ALLOW_ANY_HOST")]
    pub upstream_allow_any_host: bool,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Args {
    /// # Errors
    ///
    /// Returns an error if the allow-list file cannot be read or is empty.
    pub fn pipeline_config(&self) -> zoho_books_openapi_tools::Result<PipelineConfig> {
        let allow = match &self.allowed_tools_file {
            Some(path) => AllowList::from_file(path)?,
            None => AllowList::All,
        };
        Ok(PipelineConfig {
            fragment_dir: self.openapi_dir.clone(),
            priority: self
                .priority_fragments
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            allow,
            exclude_internal: !self.include_internal_operations,
            strip_response_schemas: self.strip_response_schemas,
        })
    }

    #[must_use]
    pub fn upstream_options(&self) -> UpstreamOptions {
        let mut options = UpstreamOptions {
            timeout: Duration::from_secs(self.upstream_timeout_secs),
            body_encoding: self.body_encoding,
            collapse_single_entity: self.collapse_single_entity,
            ..UpstreamOptions::default()
        };
        if self.upstream_allow_any_host {
            options.safety = UpstreamSafety::permissive();
        }
        options
    }

    #[must_use]
    pub fn relay_timeout(&self) -> Duration {
        Duration::from_secs(self.relay_timeout_secs)
    }

    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
