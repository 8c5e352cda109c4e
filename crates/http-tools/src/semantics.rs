//! MCP tool annotations for Zoho Books operations.
//!
//! Hints follow HTTP method semantics as Zoho Books applies them: `PUT` is a full update of an
//! existing record (idempotent, not destructive), `DELETE` removes it.

use reqwest::Method;
use rmcp::model::ToolAnnotations;

/// Generate tool annotations for an operation.
///
/// `openWorldHint` is always `true`: every tool talks to the Zoho Books API.
#[must_use]
pub fn annotations_for_operation(method: &Method, title: Option<&str>) -> ToolAnnotations {
    let title = title.map(str::to_string);
    let open_world_hint = Some(true);

    let (read_only, destructive, idempotent) = match *method {
        Method::GET | Method::HEAD => (Some(true), Some(false), Some(true)),
        Method::PUT => (Some(false), Some(false), Some(true)),
        Method::DELETE => (Some(false), Some(true), Some(true)),
        Method::POST | Method::PATCH => (Some(false), Some(false), Some(false)),
        _ => (None, None, None),
    };

    ToolAnnotations {
        title,
        read_only_hint: read_only,
        destructive_hint: destructive,
        idempotent_hint: idempotent,
        open_world_hint,
    }
}
