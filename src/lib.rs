//! Cinnabar: a conformance test execution engine for ECMAScript implementations
//!
//! Cinnabar runs Test262-format conformance corpora against an
//! implementation-under-test. Each test script executes in a fresh,
//! isolated evaluation context; thrown errors, panics, and hangs are
//! captured and classified rather than allowed to take down the run; and
//! the final report is deterministic and corpus-ordered no matter how many
//! workers executed it.
//!
//! # Quick Start
//!
//! ```no_run
//! use cinnabar::corpus::{load_corpus, CorpusOptions};
//! use cinnabar::host::CommandHost;
//! use cinnabar::includes::IncludeResolver;
//! use cinnabar::runner::{Runner, RunnerConfig};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! fn main() -> anyhow::Result<()> {
//!     let corpus = load_corpus(Path::new("test262/test"), &CorpusOptions::default())?;
//!     let host = Arc::new(CommandHost::new("/usr/bin/my-engine"));
//!     let resolver = Arc::new(IncludeResolver::new("test262/harness"));
//!     let runner = Runner::new(host, resolver, RunnerConfig::default());
//!     let results = runner.run(&corpus)?;
//!     print!("{}", results.to_summary());
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! Data flows one direction: [`corpus`] → ([`metadata`], [`includes`]) →
//! [`harness`] → [`sandbox`] → [`outcome`] → [`runner`] aggregates into
//! [`report`].
//!
//! | Category | Modules |
//! |----------|---------|
//! | **Corpus** | [`corpus`], [`metadata`], [`includes`], [`harness`] |
//! | **Execution** | [`host`], [`sandbox`] |
//! | **Results** | [`outcome`], [`runner`], [`report`], [`error`](Error) |

pub mod corpus;
pub mod harness;
pub mod host;
pub mod includes;
pub mod metadata;
pub mod outcome;
pub mod report;
pub mod runner;
pub mod sandbox;

mod error;

pub use error::{Error, ErrorKind, Result};
pub use outcome::{Outcome, Verdict};
pub use runner::{Runner, RunnerConfig};

/// Cinnabar version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
