//! Local `$ref` resolution.
//!
//! The merged description is a single in-memory document, so only local references
//! (`#/components/<kind>/<name>`) are resolvable. Anything else is treated as dangling.

use openapiv3::{Components, OpenAPI, Parameter, ReferenceOr, RequestBody, Schema};

pub const SCHEMAS_PREFIX: &str = "#/components/schemas/";
pub const PARAMETERS_PREFIX: &str = "#/components/parameters/";
pub const REQUEST_BODIES_PREFIX: &str = "#/components/requestBodies/";
pub const RESPONSES_PREFIX: &str = "#/components/responses/";
pub const HEADERS_PREFIX: &str = "#/components/headers/";

/// Name a local reference points to under `prefix`, with JSON-pointer escapes decoded.
#[must_use]
pub fn local_name(reference: &str, prefix: &str) -> Option<String> {
    let name = reference.strip_prefix(prefix)?;
    if name.is_empty() || name.contains('/') {
        return None;
    }
    Some(name.replace("~1", "/").replace("~0", "~"))
}

/// Last path segment of any reference, used to name synthesized schemas.
#[must_use]
pub fn ref_basename(reference: &str) -> &str {
    reference
        .rsplit(['/', '#'])
        .find(|s| !s.is_empty())
        .unwrap_or(reference)
}

#[derive(Debug, Clone, Copy)]
pub struct LocalResolver<'a> {
    components: Option<&'a Components>,
}

impl<'a> LocalResolver<'a> {
    #[must_use]
    pub fn new(doc: &'a OpenAPI) -> Self {
        Self {
            components: doc.components.as_ref(),
        }
    }

    #[must_use]
    pub fn schema(&self, r: &'a ReferenceOr<Schema>) -> Option<&'a Schema> {
        match r {
            ReferenceOr::Item(s) => Some(s),
            ReferenceOr::Reference { reference } => self.schema_by_ref(reference),
        }
    }

    #[must_use]
    pub fn schema_by_ref(&self, reference: &str) -> Option<&'a Schema> {
        let name = local_name(reference, SCHEMAS_PREFIX)?;
        self.components?.schemas.get(&name)?.as_item()
    }

    #[must_use]
    pub fn has_schema(&self, reference: &str) -> bool {
        local_name(reference, SCHEMAS_PREFIX)
            .is_some_and(|name| self.components.is_some_and(|c| c.schemas.contains_key(&name)))
    }

    #[must_use]
    pub fn parameter(&self, r: &'a ReferenceOr<Parameter>) -> Option<&'a Parameter> {
        match r {
            ReferenceOr::Item(p) => Some(p),
            ReferenceOr::Reference { reference } => {
                let name = local_name(reference, PARAMETERS_PREFIX)?;
                self.components?.parameters.get(&name)?.as_item()
            }
        }
    }

    #[must_use]
    pub fn request_body(&self, r: &'a ReferenceOr<RequestBody>) -> Option<&'a RequestBody> {
        match r {
            ReferenceOr::Item(b) => Some(b),
            ReferenceOr::Reference { reference } => {
                let name = local_name(reference, REQUEST_BODIES_PREFIX)?;
                self.components?.request_bodies.get(&name)?.as_item()
            }
        }
    }
}
