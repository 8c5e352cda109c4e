//! Zoho Books `OpenAPI` fragments → MCP tool catalog.
//!
//! The pipeline turns a directory of partial, sometimes malformed `OpenAPI` fragments into one
//! description fit for tool generation:
//!
//! - [`repository`]: load fragments in priority order
//! - [`merge`]: combine them, first fragment wins per `(path, method)`
//! - [`repair`]: make the result self-consistent (no dangling `$ref`s, string-typed parameters)
//! - [`filter`]: keep the allow-listed operations
//! - [`catalog`]: expose the survivors as MCP tools backed by the upstream client
//!
//! It contains no credential handling; calls go through `zoho-books-http-tools`.

pub mod catalog;
pub mod config;
pub mod document;
pub mod error;
pub mod filter;
pub mod merge;
pub mod pipeline;
pub mod repair;
pub mod repository;
pub mod request_schemas;
pub mod resolver;

pub use catalog::ToolCatalog;
pub use config::{AllowList, PipelineConfig};
pub use error::{OpenApiToolsError, Result};
pub use pipeline::{PipelineOutcome, build_description, run_pipeline};
