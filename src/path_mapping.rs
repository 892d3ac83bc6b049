//! Substring-based resolution of ambiguous raw test identifiers
//!
//! An externally maintained two-level JSON table maps identifier fragments to
//! canonical file paths: `{group: {needle: resolved_path}}`. Resolution is
//! containment-based, not exact: a raw identifier matches the first group
//! whose key it contains, then the first needle within that group.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};

/// The path-mapping lookup table.
#[derive(Debug, Clone)]
pub struct PathMapping {
    groups: Vec<(String, Vec<(String, String)>)>,
}

impl PathMapping {
    /// Load the mapping table. A missing file is fatal for runs that need it.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::MissingMapping(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        let table: BTreeMap<String, BTreeMap<String, String>> = serde_json::from_str(&text)?;
        Ok(Self::from_table(table))
    }

    pub fn from_table(table: BTreeMap<String, BTreeMap<String, String>>) -> Self {
        let groups = table
            .into_iter()
            .map(|(g, m)| (g, m.into_iter().collect()))
            .collect();
        PathMapping { groups }
    }

    /// Resolve a raw identifier to a canonical file path, if any mapping
    /// fragment is contained in it.
    pub fn resolve(&self, raw: &str) -> Option<&str> {
        for (group, entries) in &self.groups {
            if !raw.contains(group.as_str()) {
                continue;
            }
            for (needle, resolved) in entries {
                if raw.contains(needle.as_str()) {
                    return Some(resolved);
                }
            }
            // Matched a group but no needle: the identifier is unmapped.
            return None;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping() -> PathMapping {
        let mut ltp = BTreeMap::new();
        ltp.insert(
            "open01".to_string(),
            "test_cases/ltp/syscalls/open01.c".to_string(),
        );
        let mut table = BTreeMap::new();
        table.insert("ltp".to_string(), ltp);
        PathMapping::from_table(table)
    }

    #[test]
    fn test_resolve_by_substring() {
        let m = mapping();
        assert_eq!(
            m.resolve("ltp-syscalls/open01_64"),
            Some("test_cases/ltp/syscalls/open01.c")
        );
    }

    #[test]
    fn test_resolve_group_without_needle() {
        let m = mapping();
        assert_eq!(m.resolve("ltp-syscalls/close08"), None);
    }

    #[test]
    fn test_resolve_no_group() {
        let m = mapping();
        assert_eq!(m.resolve("kselftest/net/tls"), None);
    }

    #[test]
    fn test_load_missing_is_fatal() {
        let err = PathMapping::load(Path::new("/nonexistent/mapping.json")).unwrap_err();
        assert!(matches!(err, Error::MissingMapping(_)));
    }
}
