//! Error types for `zoho-books-openapi-tools`.

use thiserror::Error;

/// Main error type for the description pipeline and tool catalog.
#[derive(Error, Debug)]
pub enum OpenApiToolsError {
    /// Configuration errors (missing fragment directory, unreadable allow-list).
    #[error("Configuration error: {0}")]
    Config(String),

    /// A fragment file could not be read.
    #[error("failed to read fragment '{path}': {source}")]
    SpecRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A fragment file is not a valid `OpenAPI` document.
    #[error("failed to parse fragment '{path}': {message}")]
    SpecParse { path: String, message: String },

    /// Tool catalog construction failed (parameter collisions, empty catalog).
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Tool call errors (unknown tool, invalid arguments).
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Upstream call failure.
    #[error(transparent)]
    Upstream(#[from] zoho_books_http_tools::UpstreamError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for pipeline and catalog operations.
pub type Result<T> = std::result::Result<T, OpenApiToolsError>;
