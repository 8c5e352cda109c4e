//! MCP gateway for Zoho Books.
//!
//! Builds the tool catalog from the `OpenAPI` fragment directory once at startup, then serves it
//! over streamable HTTP. Credentials come from the OAuth relay through a single-slot cache.

pub mod config;
pub mod relay_client;
pub mod server;
pub mod token_cache;

use anyhow::Context as _;
use std::sync::Arc;
use zoho_books_http_tools::UpstreamClient;
use zoho_books_openapi_tools::{ToolCatalog, run_pipeline};

pub use config::Args;
pub use server::{ZohoBooksServer, router};
pub use token_cache::TokenCache;

/// Run the fragment pipeline and wire the catalog to the relay-backed upstream client.
///
/// # Errors
///
/// Fails when the fragments cannot be turned into a non-empty catalog or a client cannot be
/// built.
pub fn build_server(args: &Args) -> anyhow::Result<ZohoBooksServer> {
    let pipeline = args.pipeline_config().context("pipeline configuration")?;
    let outcome = run_pipeline(&pipeline).context("build OpenAPI description")?;
    for skipped in &outcome.skipped {
        tracing::warn!(
            fragment = %skipped.path.display(),
            reason = %skipped.reason,
            "fragment skipped"
        );
    }

    let catalog = ToolCatalog::from_document(&outcome.document).context("build tool catalog")?;
    if catalog.is_empty() {
        anyhow::bail!(
            "no tools left after filtering '{}'; check ALLOWED_TOOLS_FILE",
            args.openapi_dir.display()
        );
    }
    tracing::info!(
        tools = catalog.len(),
        excluded = outcome.excluded,
        discarded = outcome.discarded.len(),
        "tool catalog ready"
    );

    let fetcher = relay_client::HttpRelayFetcher::new(&args.relay_url, args.relay_timeout())
        .context("build relay client")?;
    let cache = TokenCache::with_defaults(Arc::new(fetcher));
    let client = UpstreamClient::new(Arc::new(cache), args.upstream_options())
        .context("build upstream client")?;

    Ok(ZohoBooksServer::new(Arc::new(catalog), client))
}
