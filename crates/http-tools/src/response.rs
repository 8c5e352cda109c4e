//! Inbound response rewriting.
//!
//! Zoho Books returns `code` as either a number or a string and wraps single entities in a
//! keyed envelope. Responses are normalized so callers always see a string `code`, and single
//! entities can be collapsed into a small, stable shape.
//!
//! Rewriting is best-effort: any failure leaves the original body untouched.

use base64::Engine as _;
use mime::Mime;
use serde_json::{Map, Value, json};
use thiserror::Error;

/// Keys that mark a list payload. These pass through with only `code` normalized.
pub const LIST_KEYS: &[&str] = &[
    "invoices",
    "bills",
    "contacts",
    "items",
    "expenses",
    "estimates",
    "salesorders",
    "sales_orders",
    "purchaseorders",
    "purchase_orders",
    "customerpayments",
    "vendorpayments",
    "payments",
];

/// Keys that mark a single-entity payload, checked in this order.
pub const ENTITY_KEYS: &[&str] = &[
    "contact",
    "invoice",
    "item",
    "bill",
    "estimate",
    "expense",
    "salesorder",
    "sales_order",
    "purchaseorder",
    "purchase_order",
    "payment",
    "vendor_payment",
    "user",
    "project",
];

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("response body is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("entity key '{0}' does not hold an object")]
    EntityNotObject(String),
}

/// Outcome of the inbound rewrite.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseRewrite {
    /// The JSON object was rewritten.
    Rewritten(Value),
    /// The body was not a JSON object, or rewriting failed. Forward as-is.
    Unchanged,
}

/// Upstream response after inbound rewriting.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: reqwest::StatusCode,
    pub content_type: Option<String>,
    /// Rewritten JSON when possible, otherwise the original body (text, or base64 envelope
    /// for binary payloads).
    pub body: Value,
}

impl UpstreamResponse {
    /// Build from raw bytes, applying the rewrite and falling back to the original body.
    #[must_use]
    pub fn from_bytes(
        status: reqwest::StatusCode,
        content_type: Option<String>,
        bytes: &[u8],
        collapse_single_entity: bool,
    ) -> Self {
        let rewrite = if is_binary_content_type(content_type.as_deref()) {
            ResponseRewrite::Unchanged
        } else {
            rewrite_body(bytes, collapse_single_entity)
        };
        let body = match rewrite {
            ResponseRewrite::Rewritten(v) => v,
            ResponseRewrite::Unchanged => original_body(bytes, content_type.as_deref()),
        };
        Self {
            status,
            content_type,
            body,
        }
    }

    /// Body rendered as text for tool output.
    #[must_use]
    pub fn body_text(&self) -> String {
        match &self.body {
            Value::String(s) => s.clone(),
            other => serde_json::to_string(other).unwrap_or_else(|_| other.to_string()),
        }
    }
}

/// Apply the inbound rewrite to a raw response body.
///
/// Never fails: parse or rewrite errors are logged and reported as [`ResponseRewrite::Unchanged`].
#[must_use]
pub fn rewrite_body(bytes: &[u8], collapse_single_entity: bool) -> ResponseRewrite {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return ResponseRewrite::Unchanged;
    }
    match try_rewrite(bytes, collapse_single_entity) {
        Ok(Some(v)) => ResponseRewrite::Rewritten(v),
        Ok(None) => ResponseRewrite::Unchanged,
        Err(e) => {
            tracing::warn!(error = %e, "response rewrite failed; forwarding original body");
            ResponseRewrite::Unchanged
        }
    }
}

fn try_rewrite(bytes: &[u8], collapse: bool) -> Result<Option<Value>, RewriteError> {
    let value: Value = serde_json::from_slice(bytes)?;
    let Value::Object(obj) = value else {
        return Ok(None);
    };
    rewrite_object(obj, collapse).map(Some)
}

/// Rewrite an already-parsed JSON object.
///
/// # Errors
///
/// Returns an error if a single-entity key holds something other than an object.
pub fn rewrite_object(mut obj: Map<String, Value>, collapse: bool) -> Result<Value, RewriteError> {
    if let Some(code) = obj.get_mut("code") {
        normalize_code(code);
    }

    if LIST_KEYS.iter().any(|k| obj.contains_key(*k)) {
        return Ok(Value::Object(obj));
    }

    if !collapse {
        return Ok(Value::Object(obj));
    }

    let Some(key) = ENTITY_KEYS.iter().find(|k| obj.contains_key(**k)) else {
        return Ok(Value::Object(obj));
    };

    let entity = obj.remove(*key).unwrap_or(Value::Null);
    let Value::Object(entity) = entity else {
        return Err(RewriteError::EntityNotObject((*key).to_string()));
    };

    let id_key = format!("{key}_id");
    let code = obj
        .remove("code")
        .map_or_else(|| "0".to_string(), |c| code_string(&c));
    let message = obj
        .remove("message")
        .filter(|m| !m.is_null())
        .unwrap_or_else(|| json!("Success"));
    let id = entity.get(&id_key).cloned().unwrap_or(Value::Null);

    tracing::debug!(entity = %key, "collapsed single-entity response");

    let mut out = Map::new();
    out.insert("code".to_string(), Value::String(code));
    out.insert("message".to_string(), message);
    out.insert(id_key, id);
    out.insert("full_data".to_string(), Value::Object(entity));
    Ok(Value::Object(out))
}

fn normalize_code(code: &mut Value) {
    if !code.is_string() {
        *code = Value::String(code_string(code));
    }
}

fn code_string(code: &Value) -> String {
    match code {
        Value::String(s) => s.clone(),
        Value::Null => "0".to_string(),
        other => other.to_string(),
    }
}

fn original_body(bytes: &[u8], content_type: Option<&str>) -> Value {
    if is_binary_content_type(content_type) {
        return base64_envelope(bytes, content_type);
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => Value::String(s.to_string()),
        Err(_) => base64_envelope(bytes, content_type),
    }
}

fn base64_envelope(bytes: &[u8], content_type: Option<&str>) -> Value {
    json!({
        "encoding": "base64",
        "mimeType": content_type,
        "data": base64::engine::general_purpose::STANDARD.encode(bytes),
    })
}

fn is_binary_content_type(content_type: Option<&str>) -> bool {
    let Some(ct) = content_type else {
        return false;
    };
    let Ok(m) = ct.parse::<Mime>() else {
        return false;
    };
    m.type_() == mime::IMAGE || m.subtype() == mime::PDF || m.subtype() == mime::OCTET_STREAM
}
