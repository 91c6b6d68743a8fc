//! Include resolver
//!
//! Tests declare helper-script dependencies by file name (`includes:
//! [compareArray.js]`). The resolver loads each from the harness directory
//! and returns their sources concatenated in declaration order.
//!
//! Include content is immutable for the duration of a run, so resolved
//! sources are cached process-wide keyed by name. The cache is shared
//! across workers and must survive a populate race: two workers resolving
//! the same name concurrently may both read the file, but the cache ends up
//! with one entry and neither sees torn state. Every inclusion hands out a
//! fresh textual prelude, never a shared live object.

use crate::error::{Error, Result};
use rustc_hash::FxHashMap as HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

/// Resolves declared include names to their source text.
pub struct IncludeResolver {
    root: Option<PathBuf>,
    cache: RwLock<HashMap<String, Arc<str>>>,
}

impl IncludeResolver {
    /// Resolve includes from `<root>/<name>` on disk.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            cache: RwLock::new(HashMap::default()),
        }
    }

    /// Resolve includes from a fixed in-memory set. Used when the harness
    /// helper texts are supplied by the embedder rather than a directory.
    pub fn from_sources<I, K, V>(sources: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map = sources
            .into_iter()
            .map(|(k, v)| (k.into(), Arc::from(v.into().as_str())))
            .collect();
        Self {
            root: None,
            cache: RwLock::new(map),
        }
    }

    /// Fetch one include's source, populating the cache on first use.
    pub fn resolve_one(&self, name: &str) -> Result<Arc<str>> {
        if let Some(hit) = self.cache.read().expect("include cache poisoned").get(name) {
            return Ok(Arc::clone(hit));
        }

        let root = self
            .root
            .as_ref()
            .ok_or_else(|| Error::missing_include(name))?;
        let text = std::fs::read_to_string(root.join(name))
            .map_err(|_| Error::missing_include(name))?;
        let text: Arc<str> = Arc::from(text.as_str());

        let mut cache = self.cache.write().expect("include cache poisoned");
        // A racing worker may have inserted meanwhile; keep the first entry
        // so every consumer sees identical text.
        let entry = cache
            .entry(name.to_string())
            .or_insert_with(|| Arc::clone(&text));
        Ok(Arc::clone(entry))
    }

    /// Concatenate the named includes in declaration order, or fail with
    /// `MissingInclude` naming the first unresolvable file.
    pub fn resolve(&self, names: &[String]) -> Result<String> {
        let mut prelude = String::new();
        for name in names {
            prelude.push_str(&self.resolve_one(name)?);
            if !prelude.ends_with('\n') {
                prelude.push('\n');
            }
        }
        Ok(prelude)
    }

    /// Number of cached includes; used by tests to observe population.
    pub fn cached_count(&self) -> usize {
        self.cache.read().expect("include cache poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_resolve_in_declaration_order() {
        let resolver = IncludeResolver::from_sources([
            ("a.js", "// first"),
            ("b.js", "// second"),
        ]);
        let text = resolver
            .resolve(&["b.js".to_string(), "a.js".to_string()])
            .unwrap();
        let b = text.find("// second").unwrap();
        let a = text.find("// first").unwrap();
        assert!(b < a);
    }

    #[test]
    fn test_missing_include_names_the_file() {
        let resolver = IncludeResolver::from_sources([("a.js", "// a")]);
        let err = resolver
            .resolve(&["a.js".to_string(), "missingHelper.js".to_string()])
            .unwrap_err();
        assert_eq!(err.to_string(), "MissingInclude: missingHelper.js");
    }

    #[test]
    fn test_disk_resolution_and_caching() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("assert.js"), "function assert() {}\n").unwrap();

        let resolver = IncludeResolver::new(dir.path());
        assert_eq!(resolver.cached_count(), 0);

        let first = resolver.resolve(&["assert.js".to_string()]).unwrap();
        assert_eq!(resolver.cached_count(), 1);

        // Content changes on disk are not observed within a run: the cache
        // serves the original text.
        fs::write(dir.path().join("assert.js"), "tampered\n").unwrap();
        let second = resolver.resolve(&["assert.js".to_string()]).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_concurrent_resolution() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("h.js"), "// helper\n").unwrap();
        let resolver = Arc::new(IncludeResolver::new(dir.path()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let resolver = Arc::clone(&resolver);
                std::thread::spawn(move || resolver.resolve(&["h.js".to_string()]).unwrap())
            })
            .collect();
        let results: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(resolver.cached_count(), 1);
    }

    #[test]
    fn test_empty_include_list() {
        let resolver = IncludeResolver::from_sources::<_, String, String>([]);
        assert_eq!(resolver.resolve(&[]).unwrap(), "");
    }
}
