use crate::error::{OpenApiToolsError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Fragments promoted to load first unless configured otherwise.
pub const DEFAULT_PRIORITY_FRAGMENTS: &[&str] = &["invoices", "customer-debit-notes"];

/// Configuration for the fragment → tool-description pipeline.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Directory holding `*.yaml` / `*.yml` fragments.
    pub fragment_dir: PathBuf,

    /// Fragment file stems loaded before all others, in this order.
    #[serde(default = "default_priority")]
    pub priority: Vec<String>,

    /// Operations that survive filtering.
    #[serde(default)]
    pub allow: AllowList,

    /// Drop `/admin/...` paths and operations tagged `internal`.
    #[serde(default = "default_true")]
    pub exclude_internal: bool,

    /// Remove response body schemas so responses are not validated against them.
    #[serde(default = "default_true")]
    pub strip_response_schemas: bool,
}

impl PipelineConfig {
    #[must_use]
    pub fn new(fragment_dir: impl Into<PathBuf>) -> Self {
        Self {
            fragment_dir: fragment_dir.into(),
            priority: default_priority(),
            allow: AllowList::All,
            exclude_internal: true,
            strip_response_schemas: true,
        }
    }
}

fn default_priority() -> Vec<String> {
    DEFAULT_PRIORITY_FRAGMENTS
        .iter()
        .map(|s| (*s).to_string())
        .collect()
}

fn default_true() -> bool {
    true
}

/// Operation-id allow-list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum AllowList {
    /// Every operation that has an `operationId`.
    #[default]
    All,
    Only(BTreeSet<String>),
}

impl AllowList {
    #[must_use]
    pub fn only<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Only(ids.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn allows(&self, operation_id: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(ids) => ids.contains(operation_id),
        }
    }

    /// Load an allow-list file.
    ///
    /// Accepted formats: a YAML sequence of strings, or plain text with one id per line.
    /// Blank lines and `#` comments are ignored in the plain-text form.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or lists no ids.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            OpenApiToolsError::Config(format!(
                "failed to read allow-list '{}': {e}",
                path.display()
            ))
        })?;
        let ids = parse_allow_list(&text);
        if ids.is_empty() {
            return Err(OpenApiToolsError::Config(format!(
                "allow-list '{}' contains no operation ids",
                path.display()
            )));
        }
        Ok(Self::Only(ids))
    }
}

fn parse_allow_list(text: &str) -> BTreeSet<String> {
    if let Ok(serde_yaml::Value::Sequence(items)) = serde_yaml::from_str::<serde_yaml::Value>(text)
    {
        return items
            .iter()
            .filter_map(serde_yaml::Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }

    text.lines()
        .map(|line| line.split('#').next().unwrap_or_default().trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn allow_list_accepts_yaml_sequences() {
        let ids = parse_allow_list("- list_invoices\n- create_contact\n");
        assert_eq!(
            ids.into_iter().collect::<Vec<_>>(),
            vec!["create_contact".to_string(), "list_invoices".to_string()]
        );
    }

    #[test]
    fn allow_list_accepts_plain_lines_with_comments() {
        let ids = parse_allow_list("# invoices\nlist_invoices\n\nget_invoice # single\n");
        assert!(ids.contains("list_invoices"));
        assert!(ids.contains("get_invoice"));
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn empty_allow_list_file_is_rejected() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("allowed.txt");
        std::fs::write(&path, "\n# nothing\n").expect("write");
        assert!(AllowList::from_file(&path).is_err());
    }

    #[test]
    fn all_allows_everything() {
        assert!(AllowList::All.allows("anything"));
        let only = AllowList::only(["a"]);
        assert!(only.allows("a"));
        assert!(!only.allows("b"));
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let cfg: PipelineConfig =
            serde_json::from_str(r#"{"fragmentDir": "/specs"}"#).expect("config");
        assert_eq!(cfg.priority, vec!["invoices", "customer-debit-notes"]);
        assert_eq!(cfg.allow, AllowList::All);
        assert!(cfg.strip_response_schemas);
        assert!(cfg.exclude_internal);
    }
}
