//! Outbound request rewriting.
//!
//! A tool call arrives as loose argument buckets (direct arguments, query, JSON body). Before
//! anything goes on the wire the path template is resolved against those buckets, and the body
//! is encoded the way Zoho Books expects.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Form field Zoho Books reads a JSON payload from when bodies are form-encoded.
pub const JSON_STRING_FIELD: &str = "JSONString";

/// How write bodies are put on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BodyEncoding {
    /// `application/json`, with embedded JSON strings expanded into nested values.
    #[default]
    Json,
    /// `application/x-www-form-urlencoded` with the whole body under [`JSON_STRING_FIELD`].
    FormJsonString,
}

impl std::str::FromStr for BodyEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "form-json-string" | "form" | "jsonstring" => Ok(Self::FormJsonString),
            other => Err(format!(
                "unknown body encoding '{other}' (expected 'json' or 'form-json-string')"
            )),
        }
    }
}

/// One outbound call before rewriting.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    /// Path template relative to the API base path, e.g. `/contacts/{contact_id}`.
    /// May arrive percent-encoded (`%7Bcontact_id%7D`).
    pub path_template: String,
    /// Arguments addressed to the call itself rather than a request component.
    pub path_args: Map<String, Value>,
    pub query: Map<String, Value>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Map<String, Value>>,
}

/// Encoded body ready to attach to a `reqwest::RequestBuilder`.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodedBody {
    Json(Value),
    Form(Vec<(String, String)>),
}

impl UpstreamRequest {
    #[must_use]
    pub fn new(method: Method, path_template: impl Into<String>) -> Self {
        Self {
            method,
            path_template: path_template.into(),
            path_args: Map::new(),
            query: Map::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    #[must_use]
    pub fn with_path_arg(mut self, name: impl Into<String>, value: Value) -> Self {
        self.path_args.insert(name.into(), value);
        self
    }

    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: Value) -> Self {
        self.query.insert(name.into(), value);
        self
    }

    #[must_use]
    pub fn with_body_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.body
            .get_or_insert_with(Map::new)
            .insert(name.into(), value);
        self
    }

    /// Resolve every `{name}` placeholder in the path template.
    ///
    /// Lookup order per placeholder: direct argument, query parameter, JSON body field. The
    /// value is removed from the bucket it was found in. Placeholders with no value stay in the
    /// path verbatim and are logged; the upstream will answer 404 for them.
    pub fn resolve_path(&mut self) -> String {
        let template = decode_braces(&self.path_template);
        let mut out = String::with_capacity(template.len());
        let mut rest = template.as_str();

        while let Some(open) = rest.find('{') {
            let Some(len) = rest[open + 1..].find('}') else {
                break;
            };
            let name = &rest[open + 1..open + 1 + len];
            out.push_str(&rest[..open]);

            match self.take_placeholder_value(name) {
                Some(value) => out.push_str(&encode_path_segment(&value_to_string(&value))),
                None => {
                    tracing::warn!(
                        placeholder = %name,
                        path = %template,
                        "unresolved path placeholder; leaving it in place"
                    );
                    out.push_str(&rest[open..open + len + 2]);
                }
            }
            rest = &rest[open + len + 2..];
        }
        out.push_str(rest);
        out
    }

    fn take_placeholder_value(&mut self, name: &str) -> Option<Value> {
        let from_args = self.path_args.remove(name).filter(|v| !v.is_null());
        if from_args.is_some() {
            return from_args;
        }
        let from_query = self.query.remove(name).filter(|v| !v.is_null());
        if from_query.is_some() {
            return from_query;
        }
        self.body
            .as_mut()
            .and_then(|b| b.remove(name))
            .filter(|v| !v.is_null())
    }

    /// Encode the body according to `encoding`.
    ///
    /// Only write methods carry a body; for other methods this returns `Ok(None)` even when
    /// body fields were supplied.
    ///
    /// # Errors
    ///
    /// Returns an error if the body cannot be serialized for form encoding.
    pub fn encode_body(&mut self, encoding: BodyEncoding) -> serde_json::Result<Option<EncodedBody>> {
        if !is_write_method(&self.method) {
            return Ok(None);
        }
        let Some(mut body) = self.body.take() else {
            return Ok(None);
        };

        expand_embedded_json(&mut body);

        match encoding {
            BodyEncoding::Json => Ok(Some(EncodedBody::Json(Value::Object(body)))),
            BodyEncoding::FormJsonString => {
                let payload = serde_json::to_string(&Value::Object(body))?;
                Ok(Some(EncodedBody::Form(vec![(
                    JSON_STRING_FIELD.to_string(),
                    payload,
                )])))
            }
        }
    }

    /// Query pairs in wire form. Arrays are comma-joined, nulls are dropped.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.query
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| {
                let s = match v {
                    Value::Array(items) => items
                        .iter()
                        .map(value_to_string)
                        .collect::<Vec<_>>()
                        .join(","),
                    other => value_to_string(other),
                };
                (k.clone(), s)
            })
            .collect()
    }
}

#[must_use]
pub fn is_write_method(method: &Method) -> bool {
    *method == Method::POST || *method == Method::PUT || *method == Method::PATCH
}

/// Replace string fields that hold serialized JSON containers with the parsed value.
///
/// Agents frequently pass `line_items` and similar nested fields as JSON text.
fn expand_embedded_json(body: &mut Map<String, Value>) {
    for (key, value) in body.iter_mut() {
        let Value::String(s) = value else {
            continue;
        };
        let trimmed = s.trim_start();
        if !(trimmed.starts_with('[') || trimmed.starts_with('{')) {
            continue;
        }
        match serde_json::from_str::<Value>(s) {
            Ok(parsed) => {
                tracing::debug!(field = %key, "expanded embedded JSON body field");
                *value = parsed;
            }
            Err(e) => {
                tracing::warn!(field = %key, error = %e, "body field looks like JSON but does not parse; keeping string");
            }
        }
    }
}

/// Names of the `{placeholder}` segments in a path template, in order of appearance.
#[must_use]
pub fn path_placeholders(template: &str) -> Vec<String> {
    let template = decode_braces(template);
    let mut names = Vec::new();
    let mut rest = template.as_str();
    while let Some(open) = rest.find('{') {
        let Some(len) = rest[open + 1..].find('}') else {
            break;
        };
        let name = &rest[open + 1..open + 1 + len];
        if !name.is_empty() && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
        rest = &rest[open + len + 2..];
    }
    names
}

fn decode_braces(template: &str) -> String {
    template
        .replace("%7B", "{")
        .replace("%7b", "{")
        .replace("%7D", "}")
        .replace("%7d", "}")
}

/// Convert a JSON value to its string form for URLs.
#[must_use]
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn encode_path_segment(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn direct_argument_is_substituted_and_consumed() {
        let mut req = UpstreamRequest::new(Method::GET, "/contacts/{contact_id}")
            .with_path_arg("contact_id", json!(42));
        assert_eq!(req.resolve_path(), "/contacts/42");
        assert!(req.path_args.get("contact_id").is_none());
        assert!(req.query.get("contact_id").is_none());
        assert!(req.body.is_none());
    }

    #[test]
    fn lookup_order_is_args_then_query_then_body() {
        let mut req = UpstreamRequest::new(Method::PUT, "/invoices/{invoice_id}")
            .with_query("invoice_id", json!("from-query"))
            .with_body_field("invoice_id", json!("from-body"));
        assert_eq!(req.resolve_path(), "/invoices/from-query");
        assert!(req.query.is_empty());
        // The body copy was not consumed because the query one won.
        assert_eq!(
            req.body.as_ref().and_then(|b| b.get("invoice_id")),
            Some(&json!("from-body"))
        );

        let mut req = UpstreamRequest::new(Method::PUT, "/invoices/{invoice_id}")
            .with_body_field("invoice_id", json!("from-body"))
            .with_body_field("notes", json!("n"));
        assert_eq!(req.resolve_path(), "/invoices/from-body");
        let body = req.body.expect("body");
        assert!(!body.contains_key("invoice_id"));
        assert!(body.contains_key("notes"));
    }

    #[test]
    fn percent_encoded_template_is_decoded_first() {
        let mut req = UpstreamRequest::new(Method::GET, "/contacts/%7Bcontact_id%7D/address")
            .with_path_arg("contact_id", json!("abc"));
        assert_eq!(req.resolve_path(), "/contacts/abc/address");
    }

    #[test]
    fn unresolved_placeholder_is_left_in_place() {
        let mut req = UpstreamRequest::new(Method::GET, "/bills/{bill_id}/payments/{payment_id}")
            .with_path_arg("bill_id", json!("7"));
        assert_eq!(req.resolve_path(), "/bills/7/payments/{payment_id}");
    }

    #[test]
    fn null_argument_falls_through_to_next_source() {
        let mut req = UpstreamRequest::new(Method::GET, "/items/{item_id}")
            .with_path_arg("item_id", Value::Null)
            .with_query("item_id", json!("9"));
        assert_eq!(req.resolve_path(), "/items/9");
    }

    #[test]
    fn values_are_escaped_as_path_segments() {
        let mut req = UpstreamRequest::new(Method::GET, "/contacts/{contact_id}")
            .with_path_arg("contact_id", json!("a/b c"));
        assert_eq!(req.resolve_path(), "/contacts/a%2Fb%20c");
    }

    #[test]
    fn json_encoding_expands_embedded_json_strings() {
        let mut req = UpstreamRequest::new(Method::POST, "/invoices")
            .with_body_field("customer_id", json!("1"))
            .with_body_field("line_items", json!(r#"[{"item_id":"3","quantity":2}]"#))
            .with_body_field("notes", json!("[not json"));
        let body = req.encode_body(BodyEncoding::Json).expect("encode");
        let Some(EncodedBody::Json(v)) = body else {
            panic!("expected json body, got {body:?}");
        };
        assert_eq!(v["line_items"], json!([{"item_id": "3", "quantity": 2}]));
        assert_eq!(v["notes"], json!("[not json"));
        assert_eq!(v["customer_id"], json!("1"));
    }

    #[test]
    fn form_encoding_wraps_whole_body_in_json_string_field() {
        let mut req = UpstreamRequest::new(Method::PUT, "/items/1")
            .with_body_field("name", json!("Widget"))
            .with_body_field("rate", json!(5));
        let body = req.encode_body(BodyEncoding::FormJsonString).expect("encode");
        let Some(EncodedBody::Form(fields)) = body else {
            panic!("expected form body, got {body:?}");
        };
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].0, JSON_STRING_FIELD);
        let parsed: Value = serde_json::from_str(&fields[0].1).expect("json payload");
        assert_eq!(parsed, json!({"name": "Widget", "rate": 5}));
    }

    #[test]
    fn read_methods_never_carry_a_body() {
        let mut req =
            UpstreamRequest::new(Method::GET, "/items").with_body_field("x", json!(1));
        assert!(req.encode_body(BodyEncoding::Json).expect("encode").is_none());
    }

    #[test]
    fn query_pairs_join_arrays_and_drop_nulls() {
        let req = UpstreamRequest::new(Method::GET, "/invoices")
            .with_query("page", json!(2))
            .with_query("status", json!(["draft", "sent"]))
            .with_query("search_text", Value::Null);
        let mut pairs = req.query_pairs();
        pairs.sort();
        assert_eq!(
            pairs,
            vec![
                ("page".to_string(), "2".to_string()),
                ("status".to_string(), "draft,sent".to_string()),
            ]
        );
    }

    #[test]
    fn placeholders_are_listed_once_in_order() {
        assert_eq!(
            path_placeholders("/bills/{bill_id}/payments/{payment_id}/{bill_id}"),
            vec!["bill_id".to_string(), "payment_id".to_string()]
        );
        assert!(path_placeholders("/invoices").is_empty());
        assert_eq!(path_placeholders("/a/%7Bx%7D"), vec!["x".to_string()]);
    }

    #[test]
    fn body_encoding_parses_from_config_strings() {
        assert_eq!("json".parse::<BodyEncoding>(), Ok(BodyEncoding::Json));
        assert_eq!(
            "form-json-string".parse::<BodyEncoding>(),
            Ok(BodyEncoding::FormJsonString)
        );
        assert!("xml".parse::<BodyEncoding>().is_err());
    }
}
