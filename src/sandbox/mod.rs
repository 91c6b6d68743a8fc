//! Isolated execution sandbox
//!
//! One [`ExecutionContext`] per (test, variant): allocate, run, discard.
//! The sandbox drives the host on a dedicated thread so a run that ignores
//! its budget can be abandoned without wedging the dispatching worker, and
//! wraps the call in `catch_unwind` so a host panic is captured as a fault
//! instead of taking the runner down.

use crate::error::{Error, Result};
use crate::host::{Completion, EvalRequest, Host, SourceGoal};
use crate::metadata::Phase;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sandbox limits.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Wall-clock budget per run.
    pub timeout: Duration,
    /// Extra slack granted to hosts that enforce the budget themselves
    /// before the watchdog abandons the run.
    pub watchdog_grace: Duration,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            watchdog_grace: Duration::from_millis(250),
        }
    }
}

/// Everything one isolated run needs. Owns its data so the run can move to
/// the watchdog thread; destroyed once the outcome is recorded.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Test identifier plus variant label, for diagnostics.
    pub id: String,
    /// Fully assembled source.
    pub source: String,
    pub goal: SourceGoal,
    pub expects_async: bool,
}

/// Raw result of one sandboxed run, before expectation matching.
#[derive(Debug)]
pub enum SandboxResult {
    /// Ran to completion without an uncaught throw.
    Completed,
    /// Captured an uncaught thrown value.
    Thrown {
        error: crate::host::ThrownError,
        phase: Phase,
    },
    /// Exceeded the budget (host-enforced or watchdog-abandoned).
    TimedOut,
    /// The sandbox boundary itself failed: host undriveable, host panic,
    /// or the post-run isolation check tripped. Always classified Crash.
    Fault(Error),
}

/// Runs execution contexts against a host, one fresh context per call.
pub struct Sandbox {
    host: Arc<dyn Host>,
    config: SandboxConfig,
}

impl Sandbox {
    pub fn new(host: Arc<dyn Host>, config: SandboxConfig) -> Self {
        Self { host, config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Execute one context to a raw result. Never panics and never returns
    /// control-flow errors for test-level failures; everything becomes a
    /// [`SandboxResult`].
    pub fn run(&self, context: ExecutionContext) -> (SandboxResult, Duration) {
        let start = Instant::now();
        let id = context.id.clone();
        let host = Arc::clone(&self.host);
        let timeout = self.config.timeout;
        let (sender, receiver) = mpsc::channel();

        let spawned = std::thread::Builder::new()
            .name(format!("sandbox:{}", context.id))
            .spawn(move || {
                let result = catch_unwind(AssertUnwindSafe(|| {
                    let request = EvalRequest {
                        id: &context.id,
                        source: &context.source,
                        goal: context.goal,
                        expects_async: context.expects_async,
                        timeout,
                    };
                    host.evaluate(&request)
                }));
                let _ = sender.send(result);
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                return (
                    SandboxResult::Fault(Error::WorkerPool(format!(
                        "failed to spawn sandbox thread: {}",
                        e
                    ))),
                    start.elapsed(),
                );
            }
        };

        let raw = match receiver.recv_timeout(timeout + self.config.watchdog_grace) {
            Ok(outcome) => {
                let _ = handle.join();
                outcome
            }
            Err(_) => {
                // Watchdog fired: abandon the thread. A CommandHost child
                // is reaped by its own deadline shortly after.
                tracing::warn!(%id, "sandbox watchdog abandoned a run");
                return (SandboxResult::TimedOut, start.elapsed());
            }
        };

        let result = match raw {
            Ok(Ok(Completion::Normal)) => SandboxResult::Completed,
            Ok(Ok(Completion::Thrown { error, phase })) => SandboxResult::Thrown { error, phase },
            Ok(Ok(Completion::TimedOut)) => SandboxResult::TimedOut,
            Ok(Err(host_error)) => SandboxResult::Fault(host_error),
            Err(panic) => SandboxResult::Fault(Error::host(format!(
                "host panicked during evaluation: {}",
                panic_message(&panic)
            ))),
        };

        // Post-run consistency check, regardless of how the run ended.
        let result = match self.host.verify_isolation() {
            Ok(()) => result,
            Err(fault) => SandboxResult::Fault(fault),
        };

        (result, start.elapsed())
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "<non-string panic payload>"
    }
}

/// Convenience check used by hosts implementing `verify_isolation`.
pub fn isolation_fault(detail: impl Into<String>) -> Result<()> {
    Err(Error::isolation_failure(detail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::host::ThrownError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Test host scripted by source-text markers.
    struct MarkerHost {
        leaked: AtomicBool,
        runs: AtomicUsize,
    }

    impl MarkerHost {
        fn new() -> Self {
            Self {
                leaked: AtomicBool::new(false),
                runs: AtomicUsize::new(0),
            }
        }
    }

    impl Host for MarkerHost {
        fn evaluate(&self, request: &EvalRequest<'_>) -> Result<Completion> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if request.source.contains("@@panic") {
                panic!("simulated engine bug");
            }
            if request.source.contains("@@hang") {
                std::thread::sleep(request.timeout + Duration::from_secs(5));
                return Ok(Completion::Normal);
            }
            if request.source.contains("@@leak") {
                self.leaked.store(true, Ordering::SeqCst);
            }
            if request.source.contains("@@throw:TypeError") {
                return Ok(Completion::Thrown {
                    error: ThrownError::new(ErrorKind::TypeError, "marker"),
                    phase: Phase::Runtime,
                });
            }
            Ok(Completion::Normal)
        }

        fn verify_isolation(&self) -> Result<()> {
            if self.leaked.swap(false, Ordering::SeqCst) {
                return isolation_fault("global state survived the run");
            }
            Ok(())
        }
    }

    fn sandbox_with(timeout_ms: u64) -> Sandbox {
        Sandbox::new(
            Arc::new(MarkerHost::new()),
            SandboxConfig {
                timeout: Duration::from_millis(timeout_ms),
                watchdog_grace: Duration::from_millis(50),
            },
        )
    }

    fn context(source: &str) -> ExecutionContext {
        ExecutionContext {
            id: "test.js".to_string(),
            source: source.to_string(),
            goal: SourceGoal::Script,
            expects_async: false,
        }
    }

    #[test]
    fn test_normal_completion() {
        let (result, elapsed) = sandbox_with(1000).run(context("1 + 1;"));
        assert!(matches!(result, SandboxResult::Completed));
        assert!(elapsed < Duration::from_secs(1));
    }

    #[test]
    fn test_thrown_is_captured() {
        let (result, _) = sandbox_with(1000).run(context("@@throw:TypeError"));
        match result {
            SandboxResult::Thrown { error, phase } => {
                assert_eq!(error.kind, ErrorKind::TypeError);
                assert_eq!(phase, Phase::Runtime);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_panic_contained_as_fault() {
        let (result, _) = sandbox_with(1000).run(context("@@panic"));
        match result {
            SandboxResult::Fault(e) => assert!(e.to_string().contains("simulated engine bug")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_watchdog_abandons_hung_run() {
        let started = Instant::now();
        let (result, _) = sandbox_with(100).run(context("@@hang"));
        assert!(matches!(result, SandboxResult::TimedOut));
        // Returned promptly instead of waiting out the hung host.
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_isolation_check_trips() {
        let sandbox = sandbox_with(1000);
        let (result, _) = sandbox.run(context("@@leak"));
        match result {
            SandboxResult::Fault(e) => {
                assert!(matches!(e, Error::IsolationFailure { .. }));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        // The fault is consumed; the next run starts clean.
        let (result, _) = sandbox.run(context("1;"));
        assert!(matches!(result, SandboxResult::Completed));
    }
}
