//! Fragment directory → finished tool description.
//!
//! load → merge → repair → filter. Each stage logs its own counts; the final description is
//! fingerprinted so catalog versions can be told apart in logs.

use crate::config::PipelineConfig;
use crate::document::{count_operations, fingerprint};
use crate::error::{OpenApiToolsError, Result};
use crate::filter::{FilterOptions, filter};
use crate::merge::{DiscardedOperation, merge};
use crate::repair::{RepairOptions, RepairReport, repair, unresolved_references};
use crate::repository::{Fragment, SkippedFragment, load_fragments};
use openapiv3::OpenAPI;

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub document: OpenAPI,
    pub skipped: Vec<SkippedFragment>,
    pub discarded: Vec<DiscardedOperation>,
    pub repair: RepairReport,
    pub included: usize,
    pub excluded: usize,
    pub fingerprint: String,
}

/// Run the whole pipeline over the configured fragment directory.
///
/// # Errors
///
/// Returns an error if the directory cannot be listed or holds no usable fragment.
pub fn run_pipeline(config: &PipelineConfig) -> Result<PipelineOutcome> {
    let loaded = load_fragments(&config.fragment_dir, &config.priority)?;
    if loaded.fragments.is_empty() {
        return Err(OpenApiToolsError::Config(format!(
            "no usable fragments in '{}' ({} skipped)",
            config.fragment_dir.display(),
            loaded.skipped.len()
        )));
    }
    let mut outcome = build_description(loaded.fragments, config)?;
    outcome.skipped = loaded.skipped;
    Ok(outcome)
}

/// Merge, repair and filter already-loaded fragments.
///
/// # Errors
///
/// Returns an error if the finished description cannot be fingerprinted.
pub fn build_description(
    fragments: Vec<Fragment>,
    config: &PipelineConfig,
) -> Result<PipelineOutcome> {
    let merged = merge(fragments);
    let mut document = merged.document;

    let report = repair(
        &mut document,
        RepairOptions {
            strip_response_schemas: config.strip_response_schemas,
        },
    );

    let unresolved = unresolved_references(&document);
    if !unresolved.is_empty() {
        tracing::warn!(
            count = unresolved.len(),
            first = %unresolved[0],
            "references still unresolved after repair"
        );
    }

    let filtered = filter(
        document,
        &config.allow,
        FilterOptions {
            exclude_internal: config.exclude_internal,
        },
    );
    let fingerprint = fingerprint(&filtered.document)?;

    tracing::info!(
        operations = count_operations(&filtered.document),
        paths = filtered.document.paths.paths.len(),
        discarded = merged.discarded.len(),
        fingerprint = %&fingerprint[..12],
        "tool description ready"
    );

    Ok(PipelineOutcome {
        document: filtered.document,
        skipped: Vec::new(),
        discarded: merged.discarded,
        repair: report,
        included: filtered.included,
        excluded: filtered.excluded,
        fingerprint,
    })
}
