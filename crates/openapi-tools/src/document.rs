//! Typed access to the `openapiv3` document model.
//!
//! `PathItem` stores operations in one field per method; the helpers here let the merge, repair
//! and filter passes treat them uniformly.

use openapiv3::{
    OpenAPI, Operation, Parameter, ParameterData, ParameterSchemaOrContent, PathItem, ReferenceOr,
    Schema, SchemaData, SchemaKind, StringType, Type,
};
use sha2::{Digest as _, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HttpMethod {
    Get,
    Put,
    Post,
    Delete,
    Options,
    Head,
    Patch,
    Trace,
}

impl HttpMethod {
    pub const ALL: [Self; 8] = [
        Self::Get,
        Self::Put,
        Self::Post,
        Self::Delete,
        Self::Options,
        Self::Head,
        Self::Patch,
        Self::Trace,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Put => "put",
            Self::Post => "post",
            Self::Delete => "delete",
            Self::Options => "options",
            Self::Head => "head",
            Self::Patch => "patch",
            Self::Trace => "trace",
        }
    }

    /// Methods whose request body is rewritten by the repair passes.
    #[must_use]
    pub fn is_write(self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }

    #[must_use]
    pub fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Put => reqwest::Method::PUT,
            Self::Post => reqwest::Method::POST,
            Self::Delete => reqwest::Method::DELETE,
            Self::Options => reqwest::Method::OPTIONS,
            Self::Head => reqwest::Method::HEAD,
            Self::Patch => reqwest::Method::PATCH,
            Self::Trace => reqwest::Method::TRACE,
        }
    }

    #[must_use]
    pub fn slot(self, item: &PathItem) -> &Option<Operation> {
        match self {
            Self::Get => &item.get,
            Self::Put => &item.put,
            Self::Post => &item.post,
            Self::Delete => &item.delete,
            Self::Options => &item.options,
            Self::Head => &item.head,
            Self::Patch => &item.patch,
            Self::Trace => &item.trace,
        }
    }

    pub fn slot_mut(self, item: &mut PathItem) -> &mut Option<Operation> {
        match self {
            Self::Get => &mut item.get,
            Self::Put => &mut item.put,
            Self::Post => &mut item.post,
            Self::Delete => &mut item.delete,
            Self::Options => &mut item.options,
            Self::Head => &mut item.head,
            Self::Patch => &mut item.patch,
            Self::Trace => &mut item.trace,
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_str().to_ascii_uppercase())
    }
}

/// Operations present on a path item, in method order.
pub fn operations(item: &PathItem) -> impl Iterator<Item = (HttpMethod, &Operation)> {
    HttpMethod::ALL
        .into_iter()
        .filter_map(move |m| m.slot(item).as_ref().map(|op| (m, op)))
}

/// Visit every operation of every inline path item, mutably.
pub fn for_each_operation_mut(
    doc: &mut OpenAPI,
    mut f: impl FnMut(&str, HttpMethod, &mut Operation),
) {
    for (path, item) in &mut doc.paths.paths {
        let ReferenceOr::Item(item) = item else {
            continue;
        };
        for method in HttpMethod::ALL {
            if let Some(op) = method.slot_mut(item).as_mut() {
                f(path, method, op);
            }
        }
    }
}

#[must_use]
pub fn count_operations(doc: &OpenAPI) -> usize {
    doc.paths
        .paths
        .values()
        .filter_map(ReferenceOr::as_item)
        .map(|item| operations(item).count())
        .sum()
}

/// The inline primitive used wherever a schema has to be replaced.
#[must_use]
pub fn string_placeholder() -> Schema {
    Schema {
        schema_data: SchemaData::default(),
        schema_kind: SchemaKind::Type(Type::String(StringType::default())),
    }
}

#[must_use]
pub fn parameter_data(param: &Parameter) -> &ParameterData {
    match param {
        Parameter::Query { parameter_data, .. }
        | Parameter::Header { parameter_data, .. }
        | Parameter::Path { parameter_data, .. }
        | Parameter::Cookie { parameter_data, .. } => parameter_data,
    }
}

pub fn parameter_data_mut(param: &mut Parameter) -> &mut ParameterData {
    match param {
        Parameter::Query { parameter_data, .. }
        | Parameter::Header { parameter_data, .. }
        | Parameter::Path { parameter_data, .. }
        | Parameter::Cookie { parameter_data, .. } => parameter_data,
    }
}

/// Mutable access to a parameter's inline schema, if it has one.
pub fn parameter_schema_mut(param: &mut Parameter) -> Option<&mut ReferenceOr<Schema>> {
    match &mut parameter_data_mut(param).format {
        ParameterSchemaOrContent::Schema(schema) => Some(schema),
        ParameterSchemaOrContent::Content(_) => None,
    }
}

/// Stable fingerprint of a document, used to tell catalog versions apart in logs.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn fingerprint(doc: &OpenAPI) -> serde_json::Result<String> {
    let bytes = serde_json::to_vec(doc)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}
