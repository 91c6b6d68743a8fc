//! Error types for the Cinnabar conformance harness

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Main error type for Cinnabar.
///
/// Per-test errors (`MalformedMetadata`, `MissingInclude`,
/// `IsolationFailure`) are captured by the runner and converted into
/// per-test outcomes; they never abort the run. Only `WorkerPool` errors
/// are fatal.
#[derive(Error, Debug)]
pub enum Error {
    /// The `/*--- ... ---*/` header block is absent, unterminated, or
    /// contains a directive the harness does not recognize. The test is
    /// reported as a Crash: the corpus itself is defective.
    #[error("MalformedMetadata: {message}")]
    MalformedMetadata { message: String },

    /// A declared include could not be resolved. Reported as a Crash.
    #[error("MissingInclude: {name}")]
    MissingInclude { name: String },

    /// A test's effects leaked past the sandbox boundary, detected by the
    /// post-run consistency check. Always a Crash and flagged for harness
    /// investigation.
    #[error("SandboxIsolationFailure: {detail}")]
    IsolationFailure { detail: String },

    /// The implementation-under-test could not be driven at all (binary
    /// missing, stdin pipe broken). Reported as a Crash on the test that
    /// first hit it.
    #[error("HostError: {0}")]
    Host(String),

    /// Runner-level resource exhaustion (e.g. a worker thread could not be
    /// spawned). Fatal: aborts the run.
    #[error("WorkerPoolError: {0}")]
    WorkerPool(String),

    /// IO error
    #[error("IOError: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl Error {
    /// Create a `MalformedMetadata` error.
    pub fn malformed_metadata(message: impl Into<String>) -> Self {
        Error::MalformedMetadata {
            message: message.into(),
        }
    }

    /// Create a `MissingInclude` error naming the unresolved file.
    pub fn missing_include(name: impl Into<String>) -> Self {
        Error::MissingInclude { name: name.into() }
    }

    /// Create an `IsolationFailure` error.
    pub fn isolation_failure(detail: impl Into<String>) -> Self {
        Error::IsolationFailure {
            detail: detail.into(),
        }
    }

    /// Create a host error.
    pub fn host(message: impl Into<String>) -> Self {
        Error::Host(message.into())
    }

    /// `true` for defects that indict the harness or corpus rather than the
    /// implementation-under-test; these become Crash outcomes.
    pub fn is_harness_defect(&self) -> bool {
        matches!(
            self,
            Error::MalformedMetadata { .. }
                | Error::MissingInclude { .. }
                | Error::IsolationFailure { .. }
                | Error::Host(_)
        )
    }
}

/// Result type alias for Cinnabar
pub type Result<T> = std::result::Result<T, Error>;

/// Kind of an error thrown by the implementation-under-test.
///
/// Thrown values are modeled as a closed tag rather than an open dynamic
/// type; outcome classification operates only on this kind. `Other` carries
/// constructor names the harness has no special knowledge of (including
/// host-defined ones).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// TypeError - wrong type for operation
    TypeError,
    /// ReferenceError - undefined variable
    ReferenceError,
    /// RangeError - value out of range
    RangeError,
    /// SyntaxError - invalid syntax
    SyntaxError,
    /// EvalError - error in eval()
    EvalError,
    /// URIError - malformed URI
    UriError,
    /// The assertion-protocol error thrown by harness helpers
    Test262Error,
    /// Generic Error - user-thrown Error objects
    GenericError,
    /// Any other constructor name
    Other(String),
}

impl ErrorKind {
    /// Map a constructor name to its kind. Never fails; unknown names
    /// become `Other`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "TypeError" => ErrorKind::TypeError,
            "ReferenceError" => ErrorKind::ReferenceError,
            "RangeError" => ErrorKind::RangeError,
            "SyntaxError" => ErrorKind::SyntaxError,
            "EvalError" => ErrorKind::EvalError,
            "URIError" => ErrorKind::UriError,
            "Test262Error" => ErrorKind::Test262Error,
            "Error" => ErrorKind::GenericError,
            other => ErrorKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::TypeError => write!(f, "TypeError"),
            ErrorKind::ReferenceError => write!(f, "ReferenceError"),
            ErrorKind::RangeError => write!(f, "RangeError"),
            ErrorKind::SyntaxError => write!(f, "SyntaxError"),
            ErrorKind::EvalError => write!(f, "EvalError"),
            ErrorKind::UriError => write!(f, "URIError"),
            ErrorKind::Test262Error => write!(f, "Test262Error"),
            ErrorKind::GenericError => write!(f, "Error"),
            ErrorKind::Other(name) => write!(f, "{}", name),
        }
    }
}
