//! Post-merge repair passes.
//!
//! The passes run in a fixed order and never fail: nodes they cannot classify are left alone or
//! replaced with a string placeholder.
//!
//! 1. declare path parameters used in a template but missing from the operation
//! 2. synthesize request schemas whose `$ref` points nowhere
//! 3. flatten references inside component schemas (and dangling references elsewhere), then
//!    drop parameter, request body, response and header references that point nowhere
//! 4. coerce integer parameters to strings
//! 5. optionally strip response body schemas

use crate::document::{
    HttpMethod, for_each_operation_mut, operations, parameter_data, parameter_data_mut,
    parameter_schema_mut, string_placeholder,
};
use crate::request_schemas::synthesize_request_schema;
use crate::resolver::{
    HEADERS_PREFIX, LocalResolver, PARAMETERS_PREFIX, REQUEST_BODIES_PREFIX, RESPONSES_PREFIX,
    SCHEMAS_PREFIX, local_name, ref_basename,
};
use openapiv3::{
    AdditionalProperties, Components, Header, MediaType, OpenAPI, Operation, Parameter,
    ParameterSchemaOrContent, ReferenceOr, RequestBody, Response, Schema, SchemaKind, StringType,
    Type,
};
use serde_json::{Value, json};
use std::collections::HashSet;
use zoho_books_http_tools::request::path_placeholders;

/// Schemas nested deeper than this collapse to a string placeholder.
pub const MAX_SCHEMA_DEPTH: usize = 10;

#[derive(Debug, Clone, Copy)]
pub struct RepairOptions {
    pub strip_response_schemas: bool,
}

impl Default for RepairOptions {
    fn default() -> Self {
        Self {
            strip_response_schemas: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub path_params_added: usize,
    pub schemas_synthesized: usize,
    pub refs_flattened: usize,
    pub depth_truncated: usize,
    pub dangling_refs_dropped: usize,
    pub params_coerced: usize,
    pub responses_stripped: usize,
}

/// Run every pass over `doc`, in order.
pub fn repair(doc: &mut OpenAPI, options: RepairOptions) -> RepairReport {
    let mut report = RepairReport {
        path_params_added: add_missing_path_params(doc),
        schemas_synthesized: synthesize_missing_request_schemas(doc),
        ..RepairReport::default()
    };

    let flatten = flatten_references(doc);
    report.refs_flattened = flatten.flattened;
    report.depth_truncated = flatten.truncated;
    report.dangling_refs_dropped = drop_dangling_refs(doc);

    report.params_coerced = coerce_integer_params(doc);
    if options.strip_response_schemas {
        report.responses_stripped = strip_response_schemas(doc);
    }

    tracing::info!(
        path_params_added = report.path_params_added,
        schemas_synthesized = report.schemas_synthesized,
        refs_flattened = report.refs_flattened,
        depth_truncated = report.depth_truncated,
        dangling_refs_dropped = report.dangling_refs_dropped,
        params_coerced = report.params_coerced,
        responses_stripped = report.responses_stripped,
        "description repaired"
    );
    report
}

// --- path parameters --------------------------------------------------------------------------

/// Declare `{name}` placeholders that neither the operation nor its path item declares.
pub fn add_missing_path_params(doc: &mut OpenAPI) -> usize {
    let mut missing: Vec<(String, HttpMethod, Vec<String>)> = Vec::new();
    {
        let resolver = LocalResolver::new(doc);
        for (path, item) in &doc.paths.paths {
            let ReferenceOr::Item(item) = item else {
                continue;
            };
            let placeholders = path_placeholders(path);
            if placeholders.is_empty() {
                continue;
            }
            let item_declared = declared_path_params(&resolver, &item.parameters);
            for (method, op) in operations(item) {
                let declared = declared_path_params(&resolver, &op.parameters);
                let names: Vec<String> = placeholders
                    .iter()
                    .filter(|p| !item_declared.contains(*p) && !declared.contains(*p))
                    .cloned()
                    .collect();
                if !names.is_empty() {
                    missing.push((path.clone(), method, names));
                }
            }
        }
    }

    let mut added = 0;
    for (path, method, names) in missing {
        let Some(ReferenceOr::Item(item)) = doc.paths.paths.get_mut(&path) else {
            continue;
        };
        let Some(op) = method.slot_mut(item).as_mut() else {
            continue;
        };
        for name in names {
            match path_parameter(&name) {
                Some(param) => {
                    tracing::debug!(
                        path = %path,
                        method = %method,
                        param = %name,
                        "declared missing path parameter"
                    );
                    op.parameters.push(ReferenceOr::Item(param));
                    added += 1;
                }
                None => {
                    tracing::warn!(path = %path, param = %name, "could not declare path parameter");
                }
            }
        }
    }
    added
}

fn declared_path_params<'a>(
    resolver: &LocalResolver<'a>,
    params: &'a [ReferenceOr<Parameter>],
) -> HashSet<String> {
    params
        .iter()
        .filter_map(|p| resolver.parameter(p))
        .filter(|p| matches!(p, Parameter::Path { .. }))
        .map(|p| parameter_data(p).name.clone())
        .collect()
}

fn path_parameter(name: &str) -> Option<Parameter> {
    serde_json::from_value(json!({
        "name": name,
        "in": "path",
        "required": true,
        "schema": { "type": "string" },
    }))
    .ok()
}

// --- request schema synthesis -----------------------------------------------------------------

/// Synthesize request body schemas for write operations whose schema reference dangles.
///
/// The synthesized schema is stored under the referenced name, so the reference becomes valid.
/// Non-local references are rewritten to point at the local component.
pub fn synthesize_missing_request_schemas(doc: &mut OpenAPI) -> usize {
    let mut known: HashSet<String> = doc
        .components
        .as_ref()
        .map(|c| c.schemas.keys().cloned().collect())
        .unwrap_or_default();
    let mut synthesized: Vec<(String, Schema)> = Vec::new();

    for_each_operation_mut(doc, |path, method, op| {
        if !method.is_write() {
            return;
        }
        let Some(operation_id) = op.operation_id.as_deref() else {
            return;
        };
        let Some(ReferenceOr::Item(body)) = op.request_body.as_mut() else {
            return;
        };

        for media in body.content.values_mut() {
            let Some(ReferenceOr::Reference { reference }) = media.schema.as_mut() else {
                continue;
            };
            let is_local = local_name(reference, SCHEMAS_PREFIX).is_some();
            let name = local_name(reference, SCHEMAS_PREFIX)
                .unwrap_or_else(|| ref_basename(reference).to_string());
            let local = format!("{SCHEMAS_PREFIX}{}", escape_pointer(&name));

            if !known.contains(&name) {
                tracing::debug!(
                    path = %path,
                    method = %method,
                    operation_id,
                    schema = %name,
                    "synthesizing missing request schema"
                );
                let description = op.description.as_deref();
                synthesized.push((
                    name.clone(),
                    synthesize_request_schema(operation_id, description),
                ));
                known.insert(name);
            } else if is_local {
                continue;
            }
            *reference = local;
        }
    });

    let count = synthesized.len();
    if count > 0 {
        let components = doc.components.get_or_insert_with(Components::default);
        for (name, schema) in synthesized {
            components.schemas.insert(name, ReferenceOr::Item(schema));
        }
    }
    count
}

fn escape_pointer(name: &str) -> String {
    name.replace('~', "~0").replace('/', "~1")
}

// --- reference flattening ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
struct FlattenCounts {
    flattened: usize,
    truncated: usize,
}

enum FlattenMode<'a> {
    /// Replace every reference.
    All,
    /// Replace references whose target is not one of these component schema names.
    DanglingOnly(&'a HashSet<String>),
}

struct Flattener<'a> {
    mode: FlattenMode<'a>,
    counts: FlattenCounts,
}

impl Flattener<'_> {
    fn should_replace(&self, reference: &str) -> bool {
        match self.mode {
            FlattenMode::All => true,
            FlattenMode::DanglingOnly(known) => {
                local_name(reference, SCHEMAS_PREFIX).is_none_or(|name| !known.contains(&name))
            }
        }
    }

    fn visit_ref(&mut self, r: &mut ReferenceOr<Schema>, depth: usize) {
        if matches!(r, ReferenceOr::Reference { reference } if self.should_replace(reference)) {
            *r = ReferenceOr::Item(string_placeholder());
            self.counts.flattened += 1;
        } else if let ReferenceOr::Item(schema) = r {
            self.visit_nested(schema, depth);
        }
    }

    fn visit_boxed(&mut self, r: &mut ReferenceOr<Box<Schema>>, depth: usize) {
        if matches!(r, ReferenceOr::Reference { reference } if self.should_replace(reference)) {
            *r = ReferenceOr::Item(Box::new(string_placeholder()));
            self.counts.flattened += 1;
        } else if let ReferenceOr::Item(schema) = r {
            self.visit_nested(schema, depth);
        }
    }

    fn visit_additional(&mut self, ap: &mut Option<AdditionalProperties>, depth: usize) {
        if let Some(AdditionalProperties::Schema(schema)) = ap {
            self.visit_ref(schema, depth);
        }
    }

    fn visit_nested(&mut self, schema: &mut Schema, depth: usize) {
        if depth > MAX_SCHEMA_DEPTH {
            *schema = string_placeholder();
            self.counts.truncated += 1;
            return;
        }
        self.visit_schema(schema, depth);
    }

    fn visit_schema(&mut self, schema: &mut Schema, depth: usize) {
        let next = depth + 1;
        match &mut schema.schema_kind {
            SchemaKind::Type(Type::Object(obj)) => {
                for prop in obj.properties.values_mut() {
                    self.visit_boxed(prop, next);
                }
                self.visit_additional(&mut obj.additional_properties, next);
            }
            SchemaKind::Type(Type::Array(arr)) => {
                if let Some(items) = &mut arr.items {
                    self.visit_boxed(items, next);
                }
            }
            SchemaKind::Type(_) => {}
            SchemaKind::OneOf { one_of: list }
            | SchemaKind::AllOf { all_of: list }
            | SchemaKind::AnyOf { any_of: list } => {
                for s in list {
                    self.visit_ref(s, next);
                }
            }
            SchemaKind::Not { not } => self.visit_ref(not, next),
            SchemaKind::Any(any) => {
                for prop in any.properties.values_mut() {
                    self.visit_boxed(prop, next);
                }
                self.visit_additional(&mut any.additional_properties, next);
                if let Some(items) = &mut any.items {
                    self.visit_boxed(items, next);
                }
                for s in any
                    .one_of
                    .iter_mut()
                    .chain(any.all_of.iter_mut())
                    .chain(any.any_of.iter_mut())
                {
                    self.visit_ref(s, next);
                }
                if let Some(not) = &mut any.not {
                    self.visit_ref(not, next);
                }
            }
        }
    }

    fn visit_format(&mut self, format: &mut ParameterSchemaOrContent) {
        match format {
            ParameterSchemaOrContent::Schema(schema) => self.visit_ref(schema, 0),
            ParameterSchemaOrContent::Content(content) => self.visit_content(content.values_mut()),
        }
    }

    fn visit_parameter(&mut self, param: &mut Parameter) {
        self.visit_format(&mut parameter_data_mut(param).format);
    }

    fn visit_header(&mut self, header: &mut ReferenceOr<Header>) {
        if let ReferenceOr::Item(header) = header {
            self.visit_format(&mut header.format);
        }
    }

    fn visit_content<'m>(&mut self, content: impl IntoIterator<Item = &'m mut MediaType>) {
        for media in content {
            if let Some(schema) = &mut media.schema {
                self.visit_ref(schema, 0);
            }
        }
    }

    fn visit_request_body(&mut self, body: &mut RequestBody) {
        self.visit_content(body.content.values_mut());
    }

    fn visit_response(&mut self, response: &mut Response) {
        self.visit_content(response.content.values_mut());
        for header in response.headers.values_mut() {
            self.visit_header(header);
        }
    }

    fn visit_operation(&mut self, op: &mut Operation) {
        for param in &mut op.parameters {
            if let ReferenceOr::Item(param) = param {
                self.visit_parameter(param);
            }
        }
        if let Some(ReferenceOr::Item(body)) = &mut op.request_body {
            self.visit_request_body(body);
        }
        let responses = &mut op.responses;
        for response in responses.default.iter_mut().chain(responses.responses.values_mut()) {
            if let ReferenceOr::Item(response) = response {
                self.visit_response(response);
            }
        }
    }
}

fn flatten_references(doc: &mut OpenAPI) -> FlattenCounts {
    let mut counts = FlattenCounts::default();

    let known: HashSet<String> = match &mut doc.components {
        Some(components) => {
            let mut all = Flattener {
                mode: FlattenMode::All,
                counts: FlattenCounts::default(),
            };
            for schema in components.schemas.values_mut() {
                all.visit_ref(schema, 0);
            }
            counts = all.counts;
            components.schemas.keys().cloned().collect()
        }
        None => HashSet::new(),
    };

    let mut dangling = Flattener {
        mode: FlattenMode::DanglingOnly(&known),
        counts,
    };
    if let Some(components) = &mut doc.components {
        for param in components.parameters.values_mut() {
            if let ReferenceOr::Item(param) = param {
                dangling.visit_parameter(param);
            }
        }
        for body in components.request_bodies.values_mut() {
            if let ReferenceOr::Item(body) = body {
                dangling.visit_request_body(body);
            }
        }
        for response in components.responses.values_mut() {
            if let ReferenceOr::Item(response) = response {
                dangling.visit_response(response);
            }
        }
        for header in components.headers.values_mut() {
            dangling.visit_header(header);
        }
    }
    for item in doc.paths.paths.values_mut() {
        let ReferenceOr::Item(item) = item else {
            continue;
        };
        for param in &mut item.parameters {
            if let ReferenceOr::Item(param) = param {
                dangling.visit_parameter(param);
            }
        }
        for method in HttpMethod::ALL {
            if let Some(op) = method.slot_mut(item).as_mut() {
                dangling.visit_operation(op);
            }
        }
    }
    dangling.counts
}

// --- dangling component references -----------------------------------------------------------

#[derive(Debug, Default)]
struct ComponentNames {
    parameters: HashSet<String>,
    request_bodies: HashSet<String>,
    responses: HashSet<String>,
    headers: HashSet<String>,
}

impl ComponentNames {
    fn of(components: Option<&Components>) -> Self {
        let Some(c) = components else {
            return Self::default();
        };
        Self {
            parameters: c.parameters.keys().cloned().collect(),
            request_bodies: c.request_bodies.keys().cloned().collect(),
            responses: c.responses.keys().cloned().collect(),
            headers: c.headers.keys().cloned().collect(),
        }
    }
}

fn resolves<T>(r: &ReferenceOr<T>, prefix: &str, known: &HashSet<String>) -> bool {
    match r {
        ReferenceOr::Item(_) => true,
        ReferenceOr::Reference { reference } => {
            local_name(reference, prefix).is_some_and(|name| known.contains(&name))
        }
    }
}

fn drop_dangling_headers(response: &mut ReferenceOr<Response>, names: &ComponentNames) -> usize {
    let ReferenceOr::Item(response) = response else {
        return 0;
    };
    let before = response.headers.len();
    response
        .headers
        .retain(|_, h| resolves(h, HEADERS_PREFIX, &names.headers));
    before - response.headers.len()
}

fn drop_in_operation(op: &mut Operation, names: &ComponentNames) -> usize {
    let before = op.parameters.len();
    op.parameters
        .retain(|p| resolves(p, PARAMETERS_PREFIX, &names.parameters));
    let mut dropped = before - op.parameters.len();

    if op
        .request_body
        .as_ref()
        .is_some_and(|b| !resolves(b, REQUEST_BODIES_PREFIX, &names.request_bodies))
    {
        op.request_body = None;
        dropped += 1;
    }

    let responses = &mut op.responses;
    if responses
        .default
        .as_ref()
        .is_some_and(|r| !resolves(r, RESPONSES_PREFIX, &names.responses))
    {
        responses.default = None;
        dropped += 1;
    }
    let before = responses.responses.len();
    responses
        .responses
        .retain(|_, r| resolves(r, RESPONSES_PREFIX, &names.responses));
    dropped += before - responses.responses.len();

    for response in responses
        .default
        .iter_mut()
        .chain(responses.responses.values_mut())
    {
        dropped += drop_dangling_headers(response, names);
    }
    dropped
}

/// Remove parameter, request body, response and header references whose component is missing.
///
/// These cannot be replaced by a placeholder the way schemas are, so they are dropped. Components
/// that only refer to missing components are dropped too, until nothing else dangles.
pub fn drop_dangling_refs(doc: &mut OpenAPI) -> usize {
    let mut dropped = 0;

    if let Some(components) = &mut doc.components {
        loop {
            let names = ComponentNames::of(Some(&*components));
            let before = components.parameters.len()
                + components.request_bodies.len()
                + components.responses.len()
                + components.headers.len();
            components
                .parameters
                .retain(|_, p| resolves(p, PARAMETERS_PREFIX, &names.parameters));
            components
                .request_bodies
                .retain(|_, b| resolves(b, REQUEST_BODIES_PREFIX, &names.request_bodies));
            components
                .responses
                .retain(|_, r| resolves(r, RESPONSES_PREFIX, &names.responses));
            components
                .headers
                .retain(|_, h| resolves(h, HEADERS_PREFIX, &names.headers));
            let after = components.parameters.len()
                + components.request_bodies.len()
                + components.responses.len()
                + components.headers.len();
            dropped += before - after;
            if before == after {
                break;
            }
        }
        let names = ComponentNames::of(Some(&*components));
        for response in components.responses.values_mut() {
            dropped += drop_dangling_headers(response, &names);
        }
    }

    let names = ComponentNames::of(doc.components.as_ref());
    for item in doc.paths.paths.values_mut() {
        let ReferenceOr::Item(item) = item else {
            continue;
        };
        let before = item.parameters.len();
        item.parameters
            .retain(|p| resolves(p, PARAMETERS_PREFIX, &names.parameters));
        dropped += before - item.parameters.len();
        for method in HttpMethod::ALL {
            if let Some(op) = method.slot_mut(item).as_mut() {
                dropped += drop_in_operation(op, &names);
            }
        }
    }

    if dropped > 0 {
        tracing::warn!(dropped, "dropped references to missing components");
    }
    dropped
}

/// Every `$ref` in the document whose local target does not exist, plus every non-local one.
#[must_use]
pub fn unresolved_references(doc: &OpenAPI) -> Vec<String> {
    let Ok(value) = serde_json::to_value(doc) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    collect_unresolved(&value, &value, &mut out);
    out
}

fn collect_unresolved(root: &Value, node: &Value, out: &mut Vec<String>) {
    match node {
        Value::Object(map) => {
            if let Some(Value::String(reference)) = map.get("$ref") {
                let resolved = reference
                    .strip_prefix('#')
                    .is_some_and(|pointer| root.pointer(pointer).is_some());
                if !resolved {
                    out.push(reference.clone());
                }
            }
            for v in map.values() {
                collect_unresolved(root, v, out);
            }
        }
        Value::Array(items) => {
            for v in items {
                collect_unresolved(root, v, out);
            }
        }
        _ => {}
    }
}

// --- integer coercion -------------------------------------------------------------------------

/// Rewrite integer-typed parameter schemas to strings, keeping the schema metadata.
pub fn coerce_integer_params(doc: &mut OpenAPI) -> usize {
    let mut coerced = 0;
    let mut coerce = |param: &mut ReferenceOr<Parameter>| {
        let ReferenceOr::Item(param) = param else {
            return;
        };
        let Some(ReferenceOr::Item(schema)) = parameter_schema_mut(param) else {
            return;
        };
        if matches!(schema.schema_kind, SchemaKind::Type(Type::Integer(_))) {
            schema.schema_kind = SchemaKind::Type(Type::String(StringType::default()));
            coerced += 1;
        }
    };

    if let Some(components) = &mut doc.components {
        components.parameters.values_mut().for_each(&mut coerce);
    }
    for item in doc.paths.paths.values_mut() {
        let ReferenceOr::Item(item) = item else {
            continue;
        };
        item.parameters.iter_mut().for_each(&mut coerce);
        for method in HttpMethod::ALL {
            if let Some(op) = method.slot_mut(item).as_mut() {
                op.parameters.iter_mut().for_each(&mut coerce);
            }
        }
    }
    coerced
}

// --- response stripping -----------------------------------------------------------------------

/// Clear the `content` of every response, `default` included. Descriptions and headers stay.
pub fn strip_response_schemas(doc: &mut OpenAPI) -> usize {
    let mut stripped = 0;
    let mut strip = |response: &mut ReferenceOr<Response>| {
        if let ReferenceOr::Item(response) = response
            && !response.content.is_empty()
        {
            response.content.clear();
            stripped += 1;
        }
    };

    for_each_operation_mut(doc, |_, _, op| {
        let responses = &mut op.responses;
        responses
            .default
            .iter_mut()
            .chain(responses.responses.values_mut())
            .for_each(&mut strip);
    });
    if let Some(components) = &mut doc.components {
        components.responses.values_mut().for_each(&mut strip);
    }
    stripped
}
