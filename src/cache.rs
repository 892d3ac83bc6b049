//! Persisted memoization caches
//!
//! Token lists per test and pairwise distances are expensive to derive and
//! stable across runs, so they are memoized in append-mostly JSON stores.
//! The stores are a pure optimization: losing or truncating one only costs
//! recomputation. Loading tolerates missing or partially written content;
//! saving merges the in-memory view over whatever is on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::record::TestCaseType;
use crate::tokenizer::Tokenizer;

fn load_map<V: DeserializeOwned>(path: &Path) -> HashMap<String, V> {
    if !path.exists() {
        return HashMap::new();
    }
    match std::fs::read_to_string(path) {
        Ok(text) => match serde_json::from_str(&text) {
            Ok(map) => map,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unparseable cache");
                HashMap::new()
            }
        },
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unreadable cache");
            HashMap::new()
        }
    }
}

fn save_map<V: Serialize + DeserializeOwned + Clone>(
    path: &Path,
    map: &HashMap<String, V>,
) -> std::io::Result<()> {
    // Merge over existing content so concurrent producers of disjoint keys
    // do not clobber each other's entries.
    let mut merged: HashMap<String, V> = load_map(path);
    for (k, v) in map {
        merged.insert(k.clone(), v.clone());
    }
    let text = serde_json::to_string(&merged)?;
    std::fs::write(path, text)
}

/// Token lists memoized per test file path.
#[derive(Debug)]
pub struct TokenCache {
    path: Option<PathBuf>,
    map: HashMap<String, Vec<String>>,
}

impl TokenCache {
    pub fn in_memory() -> Self {
        TokenCache {
            path: None,
            map: HashMap::new(),
        }
    }

    pub fn load(path: PathBuf) -> Self {
        let map = load_map(&path);
        TokenCache {
            path: Some(path),
            map,
        }
    }

    pub fn get(&self, test_path: &str) -> Option<&Vec<String>> {
        self.map.get(test_path)
    }

    /// Tokenize `test_path` unless already cached. A missing or unreadable
    /// file derives an empty token list, never an error.
    pub fn ensure(&mut self, test_path: &str, tokenizer: &dyn Tokenizer) -> &Vec<String> {
        if !self.map.contains_key(test_path) {
            let contents = std::fs::read_to_string(test_path).unwrap_or_default();
            let case_type = TestCaseType::from_path(Path::new(test_path));
            let tokens = tokenizer.tokens(&contents, case_type);
            self.map.insert(test_path.to_string(), tokens);
        }
        &self.map[test_path]
    }

    pub fn save(&self) -> std::io::Result<()> {
        match &self.path {
            Some(path) => save_map(path, &self.map),
            None => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Pairwise distances keyed by unordered test-path pair.
///
/// Stored as a nested map (first path → second path → distance); lookups
/// check both orientations. A missing entry is interpreted by callers as a
/// large sentinel distance, never an error.
#[derive(Debug)]
pub struct DistanceCache {
    path: Option<PathBuf>,
    map: HashMap<String, HashMap<String, f64>>,
}

impl DistanceCache {
    pub fn in_memory() -> Self {
        DistanceCache {
            path: None,
            map: HashMap::new(),
        }
    }

    pub fn load(path: PathBuf) -> Self {
        let map = load_map(&path);
        DistanceCache {
            path: Some(path),
            map,
        }
    }

    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        self.map
            .get(a)
            .and_then(|m| m.get(b))
            .or_else(|| self.map.get(b).and_then(|m| m.get(a)))
            .copied()
    }

    pub fn insert(&mut self, a: &str, b: &str, distance: f64) {
        self.map
            .entry(a.to_string())
            .or_default()
            .insert(b.to_string(), distance);
    }

    pub fn contains(&self, a: &str, b: &str) -> bool {
        self.get(a, b).is_some()
    }

    pub fn save(&self) -> std::io::Result<()> {
        match &self.path {
            Some(path) => save_map(path, &self.map),
            None => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.map.values().map(|m| m.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::LexicalTokenizer;
    use tempfile::TempDir;

    #[test]
    fn test_distance_lookup_is_unordered() {
        let mut cache = DistanceCache::in_memory();
        cache.insert("a.c", "b.c", 3.0);
        assert_eq!(cache.get("a.c", "b.c"), Some(3.0));
        assert_eq!(cache.get("b.c", "a.c"), Some(3.0));
        assert_eq!(cache.get("a.c", "c.c"), None);
    }

    #[test]
    fn test_save_merges_existing_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("distance.json");

        let mut first = DistanceCache::load(path.clone());
        first.insert("a.c", "b.c", 1.0);
        first.save().unwrap();

        let mut second = DistanceCache::load(path.clone());
        second.insert("a.c", "c.c", 2.0);
        second.save().unwrap();

        let merged = DistanceCache::load(path);
        assert_eq!(merged.get("a.c", "b.c"), Some(1.0));
        assert_eq!(merged.get("a.c", "c.c"), Some(2.0));
    }

    #[test]
    fn test_load_tolerates_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tokens.json");
        std::fs::write(&path, "{ truncated").unwrap();
        let cache = TokenCache::load(path);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_ensure_missing_file_is_empty_tokens() {
        let mut cache = TokenCache::in_memory();
        let tokenizer = LexicalTokenizer::new();
        let tokens = cache.ensure("/no/such/test.c", &tokenizer);
        assert!(tokens.is_empty());
        assert_eq!(cache.len(), 1);
    }
}
