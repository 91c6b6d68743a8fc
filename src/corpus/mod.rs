//! Test corpus enumeration
//!
//! The engine core consumes an ordered stream of [`TestCase`] values; where
//! those come from is the caller's business. This module provides the
//! in-memory representation plus a convenience loader that walks a corpus
//! directory in deterministic order for the CLI.

use crate::error::Result;
use crate::metadata::TestMetadata;
use std::path::{Path, PathBuf};

/// One independent conformance script plus its raw source. Immutable once
/// loaded; metadata is derived separately so a corpus defect in one file
/// stays pinned to that file.
#[derive(Debug, Clone)]
pub struct TestCase {
    /// Unique identifier, conventionally the path relative to the corpus
    /// root.
    pub id: String,
    /// Raw source text, header block included.
    pub source: String,
}

impl TestCase {
    pub fn new(id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
        }
    }

    /// Parse this test's directive block.
    pub fn metadata(&self) -> Result<TestMetadata> {
        TestMetadata::parse(&self.source)
    }

    /// The first path component of the id, used for per-chapter grouping
    /// in the report.
    pub fn chapter(&self) -> &str {
        self.id.split('/').next().unwrap_or("unknown")
    }
}

/// Options for [`load_corpus`].
#[derive(Debug, Clone, Default)]
pub struct CorpusOptions {
    /// Only load tests whose id contains this substring.
    pub filter: Option<String>,
    /// Stop after this many tests (0 = unlimited).
    pub max_tests: usize,
}

/// Walk `root` and load every `.js` file as a [`TestCase`], ordered by
/// path so corpus order is stable across runs and machines. Fixture files
/// (`*_FIXTURE.js`, loaded by module tests, never run directly) are
/// excluded.
pub fn load_corpus(root: &Path, options: &CorpusOptions) -> Result<Vec<TestCase>> {
    let mut paths = Vec::new();
    walk_dir(root, &mut paths)?;
    paths.sort();

    let mut tests = Vec::new();
    for path in paths {
        let id = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");
        if id.ends_with("_FIXTURE.js") {
            continue;
        }
        if let Some(ref pattern) = options.filter {
            if !id.contains(pattern.as_str()) {
                continue;
            }
        }
        let source = std::fs::read_to_string(&path)?;
        tests.push(TestCase::new(id, source));
        if options.max_tests > 0 && tests.len() >= options.max_tests {
            break;
        }
    }
    Ok(tests)
}

fn walk_dir(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            walk_dir(&path, out)?;
        } else if path.extension().map(|e| e == "js").unwrap_or(false) {
            out.push(path);
        }
    }
    Ok(())
}
