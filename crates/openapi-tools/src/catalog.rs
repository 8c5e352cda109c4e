//! MCP tool catalog built from the finished description.
//!
//! One tool per operation. Parameters and top-level request body properties are flattened into
//! a single input object; at call time the arguments are split back into request components and
//! handed to the [`UpstreamClient`].

use crate::document::{HttpMethod, operations, parameter_data};
use crate::error::{OpenApiToolsError, Result};
use crate::resolver::LocalResolver;
use openapiv3::{
    AdditionalProperties, OpenAPI, Operation, Parameter, ParameterSchemaOrContent, PathItem,
    ReferenceOr, RequestBody, Schema, SchemaKind, Type,
};
use rmcp::model::{CallToolResult, Content, JsonObject, Tool, ToolAnnotations};
use serde_json::{Map, Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use zoho_books_http_tools::semantics::annotations_for_operation;
use zoho_books_http_tools::{UpstreamClient, UpstreamRequest};

/// Inlining depth for `$ref`s met while converting schemas to JSON Schema.
const MAX_INLINE_DEPTH: usize = 10;

const BODY_ARG: &str = "body";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArgLocation {
    Path,
    Query,
    Header,
    /// One property of an object request body.
    BodyField,
    /// The whole request body, for non-object body schemas.
    Body,
}

#[derive(Debug, Clone)]
struct ToolArg {
    name: String,
    location: ArgLocation,
    required: bool,
    schema: Value,
}

#[derive(Debug, Clone)]
struct CatalogTool {
    name: String,
    description: String,
    method: HttpMethod,
    path: String,
    args: Vec<ToolArg>,
    input_schema: Arc<JsonObject>,
    annotations: ToolAnnotations,
}

impl CatalogTool {
    fn arg(&self, name: &str) -> Option<&ToolArg> {
        self.args.iter().find(|a| a.name == name)
    }
}

/// The set of tools derived from one description.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    tools: Vec<CatalogTool>,
    by_name: HashMap<String, usize>,
}

impl ToolCatalog {
    /// Build one tool per operation.
    ///
    /// # Errors
    ///
    /// Returns an error if two parameters of one operation map to the same argument name.
    pub fn from_document(doc: &OpenAPI) -> Result<Self> {
        let resolver = LocalResolver::new(doc);
        let mut names: HashSet<String> = HashSet::new();
        let mut catalog = Self::default();

        for (path, item) in &doc.paths.paths {
            let ReferenceOr::Item(item) = item else {
                continue;
            };
            for (method, op) in operations(item) {
                let tool = build_tool(&resolver, path, item, method, op, &mut names)?;
                catalog.by_name.insert(tool.name.clone(), catalog.tools.len());
                catalog.tools.push(tool);
            }
        }

        tracing::info!(tools = catalog.tools.len(), "tool catalog built");
        Ok(catalog)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// The MCP `Tool`s exposed by this catalog, in description order.
    #[must_use]
    pub fn list_tools(&self) -> Vec<Tool> {
        self.tools
            .iter()
            .map(|t| {
                let mut tool = Tool::new(
                    t.name.clone(),
                    t.description.clone(),
                    Arc::clone(&t.input_schema),
                );
                tool.annotations = Some(t.annotations.clone());
                tool
            })
            .collect()
    }

    /// Split call arguments into request components.
    ///
    /// Arguments the tool does not declare go to the body for write methods and to the query
    /// otherwise. `null` arguments are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the tool is unknown or the arguments are not an object.
    pub fn build_request(&self, name: &str, arguments: Value) -> Result<UpstreamRequest> {
        let tool = self.tool(name)?;
        let arguments = match arguments {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(OpenApiToolsError::Runtime(format!(
                    "arguments for '{name}' must be an object, got {}",
                    json_type(&other)
                )));
            }
        };

        let mut request = UpstreamRequest::new(tool.method.to_reqwest(), tool.path.clone());
        for (key, value) in arguments {
            if value.is_null() {
                continue;
            }
            let location = tool.arg(&key).map_or_else(
                || {
                    if tool.method.is_write() {
                        ArgLocation::BodyField
                    } else {
                        ArgLocation::Query
                    }
                },
                |a| a.location,
            );
            match location {
                ArgLocation::Path => {
                    request.path_args.insert(key, value);
                }
                ArgLocation::Query => {
                    request.query.insert(key, value);
                }
                ArgLocation::Header => {
                    let value = zoho_books_http_tools::request::value_to_string(&value);
                    request.headers.push((key, value));
                }
                ArgLocation::BodyField => {
                    request.body.get_or_insert_with(Map::new).insert(key, value);
                }
                ArgLocation::Body => {
                    let Value::Object(fields) = value else {
                        return Err(OpenApiToolsError::Runtime(format!(
                            "argument '{key}' of '{name}' must be a JSON object"
                        )));
                    };
                    request.body.get_or_insert_with(Map::new).extend(fields);
                }
            }
        }
        Ok(request)
    }

    /// Execute a tool call through `client`.
    ///
    /// Upstream error statuses come back as `is_error` results carrying the status and the
    /// upstream body; they are not `Err`.
    ///
    /// # Errors
    ///
    /// Returns an error if the tool is unknown, the arguments are invalid, or the upstream call
    /// fails before a response is received (credentials, transport, size limit).
    pub async fn call_tool(
        &self,
        client: &UpstreamClient,
        name: &str,
        arguments: Value,
    ) -> Result<CallToolResult> {
        let request = self.build_request(name, arguments)?;
        let response = client.execute(request).await?;

        let text = response.body_text();
        if response.status.is_success() {
            Ok(CallToolResult::success(vec![Content::text(text)]))
        } else {
            Ok(CallToolResult::error(vec![Content::text(format!(
                "Zoho Books returned HTTP {}: {text}",
                response.status.as_u16()
            ))]))
        }
    }

    fn tool(&self, name: &str) -> Result<&CatalogTool> {
        self.by_name
            .get(name)
            .and_then(|&i| self.tools.get(i))
            .ok_or_else(|| OpenApiToolsError::Runtime(format!("Tool not found: {name}")))
    }
}

fn build_tool<'a>(
    resolver: &LocalResolver<'a>,
    path: &str,
    item: &'a PathItem,
    method: HttpMethod,
    op: &'a Operation,
    names: &mut HashSet<String>,
) -> Result<CatalogTool> {
    let base = op
        .operation_id
        .clone()
        .unwrap_or_else(|| generate_canonical_name(method, path));
    let name = reserve_unique_tool_name(names, &base);

    let description = op
        .summary
        .clone()
        .or_else(|| op.description.clone())
        .unwrap_or_else(|| format!("Calls {method} {path}"));

    let mut args: Vec<ToolArg> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for param in merge_parameters(resolver, &item.parameters, &op.parameters) {
        let Some(arg) = parameter_arg(resolver, param) else {
            continue;
        };
        if !seen.insert(arg.name.clone()) {
            return Err(OpenApiToolsError::Catalog(format!(
                "parameter '{}' appears more than once in {method} {path}",
                arg.name
            )));
        }
        args.push(arg);
    }

    let mut permissive = false;
    if let Some(body) = op.request_body.as_ref().and_then(|b| resolver.request_body(b)) {
        let body_args = body_args(resolver, body, &mut permissive);
        for arg in body_args {
            if seen.insert(arg.name.clone()) {
                args.push(arg);
            } else {
                tracing::warn!(
                    tool = %name,
                    field = %arg.name,
                    "body field shadows a parameter; skipped"
                );
            }
        }
    }

    let input_schema = Arc::new(build_input_schema(&args, permissive));
    let annotations = annotations_for_operation(&method.to_reqwest(), op.summary.as_deref());

    Ok(CatalogTool {
        name,
        description,
        method,
        path: path.to_string(),
        args,
        input_schema,
        annotations,
    })
}

/// Path-item parameters overlaid by operation parameters with the same `(in, name)`.
fn merge_parameters<'a>(
    resolver: &LocalResolver<'a>,
    item_params: &'a [ReferenceOr<Parameter>],
    op_params: &'a [ReferenceOr<Parameter>],
) -> Vec<&'a Parameter> {
    fn key_for(p: &Parameter) -> (&'static str, &str) {
        let loc = match p {
            Parameter::Path { .. } => "path",
            Parameter::Query { .. } => "query",
            Parameter::Header { .. } => "header",
            Parameter::Cookie { .. } => "cookie",
        };
        (loc, parameter_data(p).name.as_str())
    }

    let mut merged: Vec<&'a Parameter> = Vec::new();
    for r in item_params.iter().chain(op_params) {
        let Some(p) = resolver.parameter(r) else {
            if let ReferenceOr::Reference { reference } = r {
                tracing::warn!(reference = %reference, "unresolvable parameter reference skipped");
            }
            continue;
        };
        let key = key_for(p);
        if let Some(existing) = merged.iter_mut().find(|e| key_for(e) == key) {
            *existing = p;
        } else {
            merged.push(p);
        }
    }
    merged
}

fn parameter_arg(resolver: &LocalResolver<'_>, param: &Parameter) -> Option<ToolArg> {
    let location = match param {
        Parameter::Path { .. } => ArgLocation::Path,
        Parameter::Query { .. } => ArgLocation::Query,
        Parameter::Header { .. } => ArgLocation::Header,
        Parameter::Cookie { parameter_data, .. } => {
            tracing::debug!(param = %parameter_data.name, "cookie parameters are not exposed");
            return None;
        }
    };
    let data = parameter_data(param);

    let mut schema = match &data.format {
        ParameterSchemaOrContent::Schema(s) => ref_schema_to_json(resolver, s, 0),
        ParameterSchemaOrContent::Content(_) => json!({ "type": "string" }),
    };
    if let (Some(obj), Some(desc)) = (schema.as_object_mut(), &data.description) {
        obj.entry("description")
            .or_insert_with(|| Value::String(desc.clone()));
    }

    Some(ToolArg {
        name: data.name.clone(),
        location,
        // Path params are always required.
        required: location == ArgLocation::Path || data.required,
        schema,
    })
}

fn body_args<'a>(
    resolver: &LocalResolver<'a>,
    body: &'a RequestBody,
    permissive: &mut bool,
) -> Vec<ToolArg> {
    let media = body
        .content
        .get("application/json")
        .or_else(|| {
            body.content
                .iter()
                .find(|(k, _)| k.to_ascii_lowercase().contains("json"))
                .map(|(_, v)| v)
        })
        .or_else(|| body.content.values().next());
    let Some(schema) = media
        .and_then(|m| m.schema.as_ref())
        .and_then(|s| resolver.schema(s))
    else {
        // No usable schema: accept any fields.
        *permissive = true;
        return Vec::new();
    };

    let Some(object) = ObjectView::of(schema) else {
        return vec![ToolArg {
            name: BODY_ARG.to_string(),
            location: ArgLocation::Body,
            required: body.required,
            schema: schema_to_json(resolver, schema, 0),
        }];
    };

    *permissive = object.permissive;
    object
        .properties
        .into_iter()
        .map(|(name, prop)| ToolArg {
            name: name.clone(),
            location: ArgLocation::BodyField,
            required: body.required && object.required.contains(name),
            schema: boxed_schema_to_json(resolver, prop, 0),
        })
        .collect()
}

/// Object-shaped schema, whether or not it declares `type: object`.
struct ObjectView<'a> {
    properties: Vec<(&'a String, &'a ReferenceOr<Box<Schema>>)>,
    required: &'a [String],
    permissive: bool,
}

impl<'a> ObjectView<'a> {
    fn of(schema: &'a Schema) -> Option<Self> {
        match &schema.schema_kind {
            SchemaKind::Type(Type::Object(obj)) => Some(Self {
                properties: obj.properties.iter().collect(),
                required: &obj.required,
                permissive: is_permissive(obj.additional_properties.as_ref()),
            }),
            SchemaKind::Any(any) if !any.properties.is_empty() => Some(Self {
                properties: any.properties.iter().collect(),
                required: &any.required,
                permissive: is_permissive(any.additional_properties.as_ref()),
            }),
            _ => None,
        }
    }
}

fn is_permissive(ap: Option<&AdditionalProperties>) -> bool {
    matches!(
        ap,
        Some(AdditionalProperties::Any(true) | AdditionalProperties::Schema(_))
    )
}

fn ref_schema_to_json(
    resolver: &LocalResolver<'_>,
    r: &ReferenceOr<Schema>,
    depth: usize,
) -> Value {
    match r {
        ReferenceOr::Item(s) => schema_to_json(resolver, s, depth),
        ReferenceOr::Reference { reference } => inline_ref(resolver, reference, depth),
    }
}

fn boxed_schema_to_json(
    resolver: &LocalResolver<'_>,
    r: &ReferenceOr<Box<Schema>>,
    depth: usize,
) -> Value {
    match r {
        ReferenceOr::Item(s) => schema_to_json(resolver, s, depth),
        ReferenceOr::Reference { reference } => inline_ref(resolver, reference, depth),
    }
}

fn inline_ref(resolver: &LocalResolver<'_>, reference: &str, depth: usize) -> Value {
    match resolver.schema_by_ref(reference) {
        Some(s) if depth < MAX_INLINE_DEPTH => schema_to_json(resolver, s, depth + 1),
        _ => json!({ "type": "string" }),
    }
}

/// Convert an `OpenAPI` schema to a JSON Schema value for tool input.
fn schema_to_json(resolver: &LocalResolver<'_>, schema: &Schema, depth: usize) -> Value {
    let mut result = json!({});

    if let Some(desc) = &schema.schema_data.description {
        result["description"] = json!(desc);
    }
    if let Some(default) = &schema.schema_data.default {
        result["default"] = default.clone();
    }

    match &schema.schema_kind {
        SchemaKind::Type(t) => match t {
            Type::String(s) => {
                result["type"] = json!("string");
                let enum_values: Vec<_> = s.enumeration.iter().flatten().collect();
                if !enum_values.is_empty() {
                    result["enum"] = json!(enum_values);
                }
                if let openapiv3::VariantOrUnknownOrEmpty::Item(f) = &s.format {
                    result["format"] = serde_json::to_value(f).unwrap_or(Value::Null);
                } else if let openapiv3::VariantOrUnknownOrEmpty::Unknown(f) = &s.format {
                    result["format"] = json!(f);
                }
            }
            Type::Number(_) => {
                result["type"] = json!("number");
            }
            Type::Integer(_) => {
                result["type"] = json!("integer");
            }
            Type::Boolean(_) => {
                result["type"] = json!("boolean");
            }
            Type::Array(a) => {
                result["type"] = json!("array");
                if let Some(items) = &a.items {
                    result["items"] = boxed_schema_to_json(resolver, items, depth + 1);
                }
            }
            Type::Object(o) => {
                result["type"] = json!("object");
                if !o.properties.is_empty() {
                    let properties: Map<String, Value> = o
                        .properties
                        .iter()
                        .map(|(name, prop)| {
                            (name.clone(), boxed_schema_to_json(resolver, prop, depth + 1))
                        })
                        .collect();
                    result["properties"] = Value::Object(properties);
                }
                if !o.required.is_empty() {
                    result["required"] = json!(o.required);
                }
                if is_permissive(o.additional_properties.as_ref()) {
                    result["additionalProperties"] = json!(true);
                }
            }
        },
        _ => {
            // Composite or untyped schemas are accepted as-is.
        }
    }

    result
}

/// Build the input schema for a tool from its arguments.
fn build_input_schema(args: &[ToolArg], permissive: bool) -> JsonObject {
    let mut properties = Map::new();
    let mut required: Vec<String> = Vec::new();

    for arg in args {
        properties.insert(arg.name.clone(), arg.schema.clone());
        if arg.required {
            required.push(arg.name.clone());
        }
    }

    let mut schema = JsonObject::new();
    schema.insert("type".to_string(), json!("object"));
    schema.insert("properties".to_string(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert("required".to_string(), json!(required));
    }
    if permissive {
        schema.insert("additionalProperties".to_string(), json!(true));
    }
    schema
}

/// Tool name for an operation without an id, e.g. `get_contacts_contact_id`.
fn generate_canonical_name(method: HttpMethod, path: &str) -> String {
    let raw = format!("{}_{}", method.as_str(), path);
    let mut name = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            name.push(c);
        } else if !name.ends_with('_') {
            name.push('_');
        }
    }
    let mut name = name.trim_matches('_').to_string();
    name.truncate(64);
    name
}

fn reserve_unique_tool_name(tool_names: &mut HashSet<String>, base: &str) -> String {
    if tool_names.insert(base.to_string()) {
        return base.to_string();
    }

    let mut counter = 1;
    loop {
        let candidate = format!("{base}_{counter}");
        if tool_names.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Method;

    fn catalog(yaml: &str) -> ToolCatalog {
        let doc: OpenAPI = serde_yaml::from_str(yaml).expect("valid openapi");
        ToolCatalog::from_document(&doc).expect("catalog")
    }

    const CONTACTS: &str = r"
openapi: 3.0.0
info: { title: t, version: '1' }
paths:
  /contacts:
    get:
      operationId: list_contacts
      summary: List contacts
      parameters:
        - { name: page, in: query, description: Page number, schema: { type: string } }
      responses: {}
    post:
      operationId: create_contact
      description: Create a contact
      requestBody:
        required: true
        content:
          application/json:
            schema: { $ref: '#/components/schemas/create-a-contact-request' }
      responses: {}
  /contacts/{contact_id}:
    parameters:
      - { name: contact_id, in: path, required: true, schema: { type: string } }
    put:
      operationId: update_contact
      parameters:
        - { name: X-Trace, in: header, schema: { type: string } }
      requestBody:
        content:
          application/json:
            schema:
              type: object
              properties:
                contact_name: { type: string }
                contact_id: { type: string }
      responses: {}
    delete:
      responses: {}
components:
  schemas:
    create-a-contact-request:
      type: object
      additionalProperties: true
      required: [contact_name]
      properties:
        contact_name: { type: string }
        contact_type: { type: string, enum: [customer, vendor] }
        billing_address:
          type: object
          properties: { city: { type: string } }
";

    fn tool<'a>(tools: &'a [Tool], name: &str) -> &'a Tool {
        tools.iter().find(|t| t.name == name).expect("tool")
    }

    #[test]
    fn tools_are_named_and_described_from_operations() {
        let c = catalog(CONTACTS);
        assert_eq!(c.len(), 4);
        let tools = c.list_tools();

        assert_eq!(
            tool(&tools, "list_contacts").description.as_deref(),
            Some("List contacts")
        );
        assert_eq!(
            tool(&tools, "create_contact").description.as_deref(),
            Some("Create a contact")
        );
        let fallback = tool(&tools, "delete_contacts_contact_id");
        assert_eq!(
            fallback.description.as_deref(),
            Some("Calls DELETE /contacts/{contact_id}")
        );
        let ann = fallback.annotations.as_ref().expect("annotations");
        assert_eq!(ann.destructive_hint, Some(true));
        let ann = tool(&tools, "list_contacts").annotations.as_ref().expect("annotations");
        assert_eq!(ann.read_only_hint, Some(true));
    }

    #[test]
    fn body_properties_are_flattened_into_input_schema() {
        let c = catalog(CONTACTS);
        let tools = c.list_tools();
        let schema = Value::Object((*tool(&tools, "create_contact").input_schema).clone());

        assert_eq!(schema["properties"]["contact_type"]["enum"], json!(["customer", "vendor"]));
        assert_eq!(
            schema["properties"]["billing_address"]["properties"]["city"]["type"],
            "string"
        );
        assert_eq!(schema["required"], json!(["contact_name"]));
        assert_eq!(schema["additionalProperties"], true);

        let list = Value::Object((*tool(&tools, "list_contacts").input_schema).clone());
        assert_eq!(list["properties"]["page"]["description"], "Page number");
        assert!(list.get("required").is_none());
    }

    #[test]
    fn path_params_are_required_and_body_collisions_skipped() {
        let c = catalog(CONTACTS);
        let tools = c.list_tools();
        let schema = Value::Object((*tool(&tools, "update_contact").input_schema).clone());
        assert_eq!(schema["required"], json!(["contact_id"]));
        assert!(schema["properties"]["contact_name"].is_object());
        assert!(schema["properties"]["X-Trace"].is_object());
    }

    #[test]
    fn arguments_are_split_by_location() {
        let c = catalog(CONTACTS);
        let req = c
            .build_request(
                "update_contact",
                json!({
                    "contact_id": "42",
                    "contact_name": "Acme",
                    "X-Trace": 7,
                    "notes": "extra",
                    "ignored": null,
                }),
            )
            .expect("request");
        assert_eq!(req.method, Method::PUT);
        assert_eq!(req.path_template, "/contacts/{contact_id}");
        assert_eq!(req.path_args.get("contact_id"), Some(&json!("42")));
        assert_eq!(req.headers, vec![("X-Trace".to_string(), "7".to_string())]);
        let body = req.body.expect("body");
        assert_eq!(body.get("contact_name"), Some(&json!("Acme")));
        // Unknown arguments of write methods go to the body.
        assert_eq!(body.get("notes"), Some(&json!("extra")));
        assert!(!body.contains_key("ignored"));

        let req = c
            .build_request("list_contacts", json!({ "page": "2", "sort_column": "name" }))
            .expect("request");
        assert_eq!(req.query.get("page"), Some(&json!("2")));
        assert_eq!(req.query.get("sort_column"), Some(&json!("name")));
        assert!(req.body.is_none());
    }

    #[test]
    fn unknown_tools_and_bad_arguments_are_errors() {
        let c = catalog(CONTACTS);
        assert!(matches!(
            c.build_request("nope", json!({})),
            Err(OpenApiToolsError::Runtime(_))
        ));
        assert!(c.build_request("list_contacts", json!([1, 2])).is_err());
        assert!(c.build_request("list_contacts", Value::Null).is_ok());
    }

    #[test]
    fn duplicate_parameter_names_fail_catalog_construction() {
        let doc: OpenAPI = serde_yaml::from_str(
            r"
openapi: 3.0.0
info: { title: t, version: '1' }
paths:
  /items/{item_id}:
    get:
      operationId: get_item
      parameters:
        - { name: item_id, in: path, required: true, schema: { type: string } }
        - { name: item_id, in: query, schema: { type: string } }
      responses: {}
",
        )
        .expect("doc");
        assert!(matches!(
            ToolCatalog::from_document(&doc),
            Err(OpenApiToolsError::Catalog(_))
        ));
    }

    #[test]
    fn canonical_names_and_uniqueness() {
        assert_eq!(
            generate_canonical_name(HttpMethod::Get, "/contacts/{contact_id}/address"),
            "get_contacts_contact_id_address"
        );
        let mut names = HashSet::new();
        assert_eq!(reserve_unique_tool_name(&mut names, "list"), "list");
        assert_eq!(reserve_unique_tool_name(&mut names, "list"), "list_1");
        assert_eq!(reserve_unique_tool_name(&mut names, "list"), "list_2");
    }

    #[test]
    fn non_object_body_becomes_single_argument() {
        let c = catalog(
            r"
openapi: 3.0.0
info: { title: t, version: '1' }
paths:
  /items/bulk:
    post:
      operationId: bulk_items
      requestBody:
        required: true
        content:
          application/json:
            schema: { type: array, items: { type: string } }
      responses: {}
",
        );
        let tools = c.list_tools();
        let schema = Value::Object((*tool(&tools, "bulk_items").input_schema).clone());
        assert_eq!(schema["properties"]["body"]["type"], "array");
        assert_eq!(schema["required"], json!(["body"]));
        assert!(c.build_request("bulk_items", json!({ "body": ["a"] })).is_err());
    }

    fn result_text(result: &CallToolResult) -> String {
        let result_json = serde_json::to_value(result).expect("CallToolResult serializes");
        result_json
            .get("content")
            .and_then(Value::as_array)
            .and_then(|c| c.first())
            .and_then(|c| c.get("text"))
            .and_then(Value::as_str)
            .expect("content[0].text")
            .to_string()
    }

    #[tokio::test]
    async fn call_tool_goes_through_upstream_client() {
        use axum::{Json, Router, extract::Path, http::StatusCode, routing::get};
        use tokio::net::TcpListener;
        use tokio::sync::oneshot;
        use zoho_books_http_tools::safety::UpstreamSafety;

        let app = Router::new()
            .route(
                "/books/v3/contacts/{id}",
                get(|Path(id): Path<String>| async move {
                    Json(json!({ "code": 0, "contact": { "contact_id": id, "contact_name": "Acme" } }))
                }),
            )
            .route(
                "/books/v3/contacts",
                get(|| async {
                    (
                        StatusCode::UNAUTHORIZED,
                        Json(json!({ "code": 57, "message": "Not authorized" })),
                    )
                }),
            );
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await;
        });

        struct MockCredentials(String);

        #[async_trait::async_trait]
        impl zoho_books_http_tools::CredentialsProvider for MockCredentials {
            async fn credentials(
                &self,
            ) -> anyhow::Result<zoho_books_http_tools::UpstreamCredentials> {
                Ok(zoho_books_http_tools::UpstreamCredentials {
                    access_token: "tok".to_string(),
                    organization_id: "org-1".to_string(),
                    api_domain: self.0.clone(),
                })
            }
        }

        let client = UpstreamClient::new(
            Arc::new(MockCredentials(format!("http://{addr}"))),
            zoho_books_http_tools::UpstreamOptions {
                safety: UpstreamSafety::permissive(),
                ..Default::default()
            },
        )
        .expect("client");

        let doc: OpenAPI = serde_yaml::from_str(
            r"
openapi: 3.0.0
info: { title: t, version: '1' }
paths:
  /contacts:
    get: { operationId: list_contacts, responses: {} }
  /contacts/{contact_id}:
    get:
      operationId: get_contact
      parameters:
        - { name: contact_id, in: path, required: true, schema: { type: string } }
      responses: {}
",
        )
        .expect("doc");
        let c = ToolCatalog::from_document(&doc).expect("catalog");

        let ok = c
            .call_tool(&client, "get_contact", json!({ "contact_id": "42" }))
            .await
            .expect("call");
        assert_eq!(ok.is_error, Some(false));
        let body: Value = serde_json::from_str(&result_text(&ok)).expect("json");
        assert_eq!(body["code"], "0");
        assert_eq!(body["contact_id"], "42");
        assert_eq!(body["full_data"]["contact_name"], "Acme");

        let err = c
            .call_tool(&client, "list_contacts", json!({}))
            .await
            .expect("call");
        assert_eq!(err.is_error, Some(true));
        let text = result_text(&err);
        assert!(text.contains("401"), "{text}");
        assert!(text.contains("Not authorized"), "{text}");

        let _ = tx.send(());
    }
}
