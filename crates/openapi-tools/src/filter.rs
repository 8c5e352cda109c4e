//! Allow-list filtering.

use crate::config::AllowList;
use crate::document::{HttpMethod, operations};
use openapiv3::{OpenAPI, Operation, ReferenceOr};
use std::collections::BTreeSet;

pub const INTERNAL_TAG: &str = "internal";
pub const ADMIN_PATH_PREFIX: &str = "/admin/";

#[derive(Debug, Clone, Copy, Default)]
pub struct FilterOptions {
    /// Drop `/admin/...` paths and operations tagged `internal`.
    pub exclude_internal: bool,
}

#[derive(Debug, Clone)]
pub struct FilterOutcome {
    pub document: OpenAPI,
    pub included: usize,
    pub excluded: usize,
}

/// Keep only allow-listed operations.
///
/// Operations without an `operationId` never survive. Path items keep their non-method keys
/// when at least one method survives; otherwise the path is dropped.
#[must_use]
pub fn filter(mut document: OpenAPI, allow: &AllowList, options: FilterOptions) -> FilterOutcome {
    let mut included = 0;
    let mut excluded = 0;
    let mut matched: BTreeSet<String> = BTreeSet::new();

    let paths = std::mem::take(&mut document.paths.paths);
    for (path, item) in paths {
        let ReferenceOr::Item(mut item) = item else {
            tracing::debug!(path = %path, "dropping path item reference");
            continue;
        };
        let admin_path = options.exclude_internal && is_admin_path(&path);

        for method in HttpMethod::ALL {
            let slot = method.slot_mut(&mut item);
            let Some(op) = slot.as_ref() else {
                continue;
            };
            if !admin_path && keep_operation(op, allow, options) {
                if let Some(id) = &op.operation_id {
                    matched.insert(id.clone());
                }
                included += 1;
            } else {
                *slot = None;
                excluded += 1;
            }
        }

        if operations(&item).next().is_some() {
            document.paths.paths.insert(path, ReferenceOr::Item(item));
        }
    }

    if let AllowList::Only(ids) = allow {
        for id in ids.difference(&matched) {
            tracing::warn!(operation_id = %id, "allow-listed operation not found in description");
        }
    }

    tracing::info!(included, excluded, paths = document.paths.paths.len(), "description filtered");
    FilterOutcome {
        document,
        included,
        excluded,
    }
}

fn keep_operation(op: &Operation, allow: &AllowList, options: FilterOptions) -> bool {
    let Some(id) = op.operation_id.as_deref() else {
        return false;
    };
    if options.exclude_internal && op.tags.iter().any(|t| t == INTERNAL_TAG) {
        return false;
    }
    allow.allows(id)
}

fn is_admin_path(path: &str) -> bool {
    path.starts_with(ADMIN_PATH_PREFIX) || path == ADMIN_PATH_PREFIX.trim_end_matches('/')
}
