//! Shared test support: an in-process shim implementation-under-test.
//!
//! `ShimHost` stands in for a real engine. It does not evaluate the
//! language; it reacts to a small set of source markers, modelling an
//! engine that builds a structurally fresh global environment for every
//! evaluation:
//!
//! - `@@set:name` defines a global in the current context.
//! - `@@expect-undefined:name` throws if that global is already defined,
//!   which can only happen within the same context, never across runs.
//! - `throw new SomeError(...)` at the start of a body line throws that
//!   kind; a throw guarded by an `if` is treated as a branch not taken.
//! - `@@hang` sleeps past the per-test budget.
//! - async tests complete only if the body calls `$DONE()`.

use cinnabar::host::{Completion, EvalRequest, Host, ThrownError};
use cinnabar::{ErrorKind, Result};
use cinnabar::metadata::Phase;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub struct ShimHost {
    leak_detected: AtomicBool,
}

impl ShimHost {
    pub fn new() -> Self {
        Self {
            leak_detected: AtomicBool::new(false),
        }
    }

    /// Simulate a host whose isolation boundary is broken; the next
    /// post-run check reports a fault.
    pub fn mark_leaky(&self) {
        self.leak_detected.store(true, Ordering::SeqCst);
    }
}

impl Default for ShimHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for ShimHost {
    fn evaluate(&self, request: &EvalRequest<'_>) -> Result<Completion> {
        // Only the test body "executes": the prelude and includes merely
        // define helpers (their `throw` statements sit inside function
        // bodies a real engine would not evaluate eagerly). The body is
        // whatever follows the directive block.
        let body_start = request
            .source
            .rfind("---*/")
            .map(|i| i + "---*/".len())
            .unwrap_or(0);
        let body = &request.source[body_start..];

        // Fresh global environment per evaluation.
        let mut globals: HashSet<&str> = HashSet::new();
        let mut called_done = false;

        for line in body.lines() {
            let line = line.trim();
            if let Some(name) = line.strip_prefix("@@set:") {
                globals.insert(name);
            } else if let Some(name) = line.strip_prefix("@@expect-undefined:") {
                if globals.contains(name) {
                    return Ok(Completion::Thrown {
                        error: ThrownError::new(
                            ErrorKind::Test262Error,
                            format!("global {:?} was already defined", name),
                        ),
                        phase: Phase::Runtime,
                    });
                }
            } else if line.contains("@@hang") {
                std::thread::sleep(request.timeout + Duration::from_secs(2));
            } else if line.contains("$DONE()") {
                called_done = true;
            } else if let Some(at) = line.find("throw new ") {
                if line.starts_with("if") {
                    continue;
                }
                let kind: String = line[at + "throw new ".len()..]
                    .chars()
                    .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
                    .collect();
                if !kind.is_empty() {
                    return Ok(Completion::Thrown {
                        error: ThrownError::new(ErrorKind::from_name(&kind), "shim throw"),
                        phase: Phase::Runtime,
                    });
                }
            }
        }

        if request.expects_async && !called_done {
            return Ok(Completion::Thrown {
                error: ThrownError::new(
                    ErrorKind::Test262Error,
                    "async test completed without signalling $DONE",
                ),
                phase: Phase::Runtime,
            });
        }
        Ok(Completion::Normal)
    }

    fn verify_isolation(&self) -> Result<()> {
        if self.leak_detected.swap(false, Ordering::SeqCst) {
            return Err(cinnabar::Error::isolation_failure(
                "shim host reported cross-context leakage",
            ));
        }
        Ok(())
    }
}
