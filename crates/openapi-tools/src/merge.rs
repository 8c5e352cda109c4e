//! Fragment merge.
//!
//! Paths merge per HTTP method with first-wins semantics. Components merge by key with
//! last-wins semantics. The asymmetry is intentional: fragments share schema definitions but
//! sometimes redeclare the same operation under a different id.

use crate::document::HttpMethod;
use crate::repository::Fragment;
use openapiv3::{Components, Info, OpenAPI, PathItem, ReferenceOr};

pub const MERGED_TITLE: &str = "Zoho Books AI Agent API";
pub const MERGED_VERSION: &str = "1.0.0";
pub const MERGED_OPENAPI_VERSION: &str = "3.0.0";

/// An incoming operation dropped because an earlier fragment already declared the same
/// `(path, method)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscardedOperation {
    pub path: String,
    pub method: HttpMethod,
    pub operation_id: Option<String>,
    pub fragment: String,
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub document: OpenAPI,
    pub discarded: Vec<DiscardedOperation>,
}

/// Merge fragments in the given order into one document.
#[must_use]
pub fn merge(fragments: Vec<Fragment>) -> MergeOutcome {
    let mut document = OpenAPI {
        openapi: MERGED_OPENAPI_VERSION.to_string(),
        info: Info {
            title: MERGED_TITLE.to_string(),
            version: MERGED_VERSION.to_string(),
            ..Info::default()
        },
        ..OpenAPI::default()
    };
    let mut discarded = Vec::new();

    for fragment in fragments {
        let Fragment {
            name,
            document: incoming,
            ..
        } = fragment;

        if document.servers.is_empty() && !incoming.servers.is_empty() {
            document.servers = incoming.servers;
        }

        for (path, item) in incoming.paths.paths {
            merge_path(&mut document, &name, path, item, &mut discarded);
        }

        document.tags.extend(incoming.tags);

        if let Some(components) = incoming.components {
            merge_components(
                document.components.get_or_insert_with(Components::default),
                components,
            );
        }
    }

    tracing::info!(
        paths = document.paths.paths.len(),
        discarded = discarded.len(),
        "fragments merged"
    );
    MergeOutcome {
        document,
        discarded,
    }
}

fn merge_path(
    document: &mut OpenAPI,
    fragment: &str,
    path: String,
    incoming: ReferenceOr<PathItem>,
    discarded: &mut Vec<DiscardedOperation>,
) {
    let Some(existing) = document.paths.paths.get_mut(&path) else {
        document.paths.paths.insert(path, incoming);
        return;
    };

    let (ReferenceOr::Item(existing), ReferenceOr::Item(mut incoming)) = (existing, incoming)
    else {
        tracing::warn!(
            path = %path,
            fragment = %fragment,
            "path item reference conflicts with an earlier declaration; keeping the first"
        );
        return;
    };

    for method in HttpMethod::ALL {
        let Some(op) = method.slot_mut(&mut incoming).take() else {
            continue;
        };
        let slot = method.slot_mut(existing);
        if slot.is_some() {
            tracing::warn!(
                path = %path,
                method = %method,
                operation_id = op.operation_id.as_deref().unwrap_or("<none>"),
                fragment = %fragment,
                "duplicate operation discarded"
            );
            discarded.push(DiscardedOperation {
                path: path.clone(),
                method,
                operation_id: op.operation_id,
                fragment: fragment.to_string(),
            });
        } else {
            *slot = Some(op);
        }
    }

    if incoming.summary.is_some() {
        existing.summary = incoming.summary;
    }
    if incoming.description.is_some() {
        existing.description = incoming.description;
    }
    if !incoming.servers.is_empty() {
        existing.servers = incoming.servers;
    }
    if !incoming.parameters.is_empty() {
        existing.parameters = incoming.parameters;
    }
    existing.extensions.extend(incoming.extensions);
}

fn merge_components(target: &mut Components, incoming: Components) {
    // `extend` on the component maps replaces values for existing keys.
    target.schemas.extend(incoming.schemas);
    target.parameters.extend(incoming.parameters);
    target.request_bodies.extend(incoming.request_bodies);
    target.responses.extend(incoming.responses);
    target.headers.extend(incoming.headers);
    target.examples.extend(incoming.examples);
    target.security_schemes.extend(incoming.security_schemes);
    target.links.extend(incoming.links);
    target.callbacks.extend(incoming.callbacks);
    target.extensions.extend(incoming.extensions);
}
