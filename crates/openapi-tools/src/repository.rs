//! Fragment loading.
//!
//! A fragment is one partial `OpenAPI` document covering a single resource group. Load order is
//! significant: the merger keeps the first operation it sees for any `(path, method)`.

use crate::error::{OpenApiToolsError, Result};
use openapiv3::OpenAPI;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Fragment {
    /// File stem, e.g. `invoices` for `invoices.yml`.
    pub name: String,
    pub path: PathBuf,
    pub document: OpenAPI,
}

#[derive(Debug, Clone)]
pub struct SkippedFragment {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct LoadedFragments {
    pub fragments: Vec<Fragment>,
    pub skipped: Vec<SkippedFragment>,
}

/// Load every `*.yaml` / `*.yml` fragment in `dir`, ordered by priority rank then file name.
///
/// `priority` lists file stems that load first, in the given order. Unlisted files follow.
/// Fragments that cannot be read or parsed are recorded in `skipped` and never abort the load.
///
/// # Errors
///
/// Returns an error if `dir` cannot be listed.
pub fn load_fragments(dir: &Path, priority: &[String]) -> Result<LoadedFragments> {
    let entries = std::fs::read_dir(dir).map_err(|source| OpenApiToolsError::SpecRead {
        path: dir.display().to_string(),
        source,
    })?;

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && is_fragment_file(&path) {
            files.push(path);
        }
    }

    files.sort_by(|a, b| {
        let ka = (priority_rank(a, priority), file_name(a));
        let kb = (priority_rank(b, priority), file_name(b));
        ka.cmp(&kb)
    });

    let mut loaded = LoadedFragments::default();
    for path in files {
        match read_fragment(&path) {
            Ok(document) => {
                tracing::debug!(fragment = %path.display(), "loaded fragment");
                loaded.fragments.push(Fragment {
                    name: file_stem(&path),
                    path,
                    document,
                });
            }
            Err(e) => {
                tracing::warn!(fragment = %path.display(), error = %e, "skipping fragment");
                loaded.skipped.push(SkippedFragment {
                    path,
                    reason: e.to_string(),
                });
            }
        }
    }

    tracing::info!(
        dir = %dir.display(),
        loaded = loaded.fragments.len(),
        skipped = loaded.skipped.len(),
        "fragments loaded"
    );
    Ok(loaded)
}

fn read_fragment(path: &Path) -> Result<OpenAPI> {
    let text = std::fs::read_to_string(path).map_err(|source| OpenApiToolsError::SpecRead {
        path: path.display().to_string(),
        source,
    })?;
    let parse_err = |message: String| OpenApiToolsError::SpecParse {
        path: path.display().to_string(),
        message,
    };

    let value: serde_yaml::Value =
        serde_yaml::from_str(&text).map_err(|e| parse_err(e.to_string()))?;
    if value.is_null() {
        return Err(parse_err("fragment is empty".to_string()));
    }
    serde_yaml::from_value(value).map_err(|e| parse_err(e.to_string()))
}

fn is_fragment_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
}

fn priority_rank(path: &Path, priority: &[String]) -> usize {
    let stem = file_stem(path);
    priority
        .iter()
        .position(|p| *p == stem)
        .unwrap_or(priority.len())
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
