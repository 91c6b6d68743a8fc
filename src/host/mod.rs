//! Implementation-under-test abstraction
//!
//! The engine never evaluates test payloads itself; it drives a [`Host`].
//! Every `evaluate` call must run in a context that shares no mutable state
//! with any previous call: the host either constructs a fresh environment
//! per invocation or isolates at the process boundary.
//!
//! [`CommandHost`] is the shipped implementation: it spawns the engine
//! binary once per run, pipes the assembled source to stdin, and recovers
//! the thrown-error kind from stderr.

use crate::error::{Error, ErrorKind, Result};
use crate::harness::{ASYNC_COMPLETE_MARKER, ASYNC_FAILURE_PREFIX};
use crate::metadata::Phase;
use regex::Regex;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

/// Parse goal for one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceGoal {
    Script,
    Module,
}

/// One evaluation request: the fully assembled source plus how to run it.
#[derive(Debug, Clone)]
pub struct EvalRequest<'a> {
    /// Test identifier, for host diagnostics only.
    pub id: &'a str,
    /// Assembled source (prelude + includes + body).
    pub source: &'a str,
    pub goal: SourceGoal,
    /// Completion requires the async done protocol to have signalled.
    pub expects_async: bool,
    /// Wall-clock budget for this single run.
    pub timeout: Duration,
}

/// An error value thrown by the implementation-under-test, captured rather
/// than re-raised. Classification operates only on `kind`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrownError {
    pub kind: ErrorKind,
    pub message: String,
    /// Unparsed payload (e.g. the full stderr text) kept for diagnostics.
    pub raw: Option<String>,
}

impl ThrownError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            raw: None,
        }
    }

    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw = Some(raw.into());
        self
    }
}

/// How one evaluation ended, as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Ran to completion without an uncaught throw (for async tests, the
    /// done protocol signalled success).
    Normal,
    /// An uncaught value was thrown; captured with the phase the host
    /// attributes it to.
    Thrown { error: ThrownError, phase: Phase },
    /// The host enforced the budget itself (e.g. killed the child
    /// process).
    TimedOut,
}

/// An implementation-under-test.
///
/// Contract: each `evaluate` call observes a structurally fresh global
/// environment. Side effects of one call must not be visible to the next.
/// `Err` returns mean the host itself could not be driven (a harness
/// defect, reported as Crash), never that the test failed.
pub trait Host: Send + Sync {
    fn evaluate(&self, request: &EvalRequest<'_>) -> Result<Completion>;

    /// Post-run consistency check. A host that can detect leakage across
    /// its context boundary reports it here; the default has nothing to
    /// check.
    fn verify_isolation(&self) -> Result<()> {
        Ok(())
    }
}

/// Drives an external engine binary, one process per evaluation.
///
/// Process-per-test gives structural isolation for free: no global mutation
/// can outlive the child. Timeout enforcement is a kill, so a hung test
/// cannot wedge the worker that dispatched it.
pub struct CommandHost {
    program: PathBuf,
    args: Vec<String>,
    /// Extra argument selecting the module goal (e.g. `--module`), when the
    /// engine needs one.
    module_arg: Option<String>,
    error_pattern: Regex,
}

impl CommandHost {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            module_arg: None,
            // First engine-style error constructor name on stderr wins.
            error_pattern: Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*Error|Error)(?::\s*(.*))?")
                .expect("static pattern"),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.args.extend(args);
        self
    }

    pub fn with_module_arg(mut self, arg: impl Into<String>) -> Self {
        self.module_arg = Some(arg.into());
        self
    }

    fn spawn(&self, request: &EvalRequest<'_>) -> Result<Child> {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if request.goal == SourceGoal::Module {
            if let Some(ref arg) = self.module_arg {
                command.arg(arg);
            }
        }
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::host(format!("failed to spawn {:?}: {}", self.program, e)))
    }

    /// Wait for the child within the budget, killing it on expiry.
    fn wait_with_deadline(&self, child: &mut Child, timeout: Duration) -> Result<Option<i32>> {
        let deadline = Instant::now() + timeout;
        loop {
            match child.try_wait()? {
                Some(status) => return Ok(Some(status.code().unwrap_or(-1))),
                None => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Ok(None);
                    }
                    std::thread::sleep(Duration::from_millis(5));
                }
            }
        }
    }

    fn sniff_thrown(&self, stderr: &str, produced_output: bool) -> (ThrownError, Phase) {
        if let Some(caps) = self.error_pattern.captures(stderr) {
            let kind = ErrorKind::from_name(caps.get(1).map_or("", |m| m.as_str()));
            let message = caps
                .get(2)
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default();
            // A syntax rejection before the script produced any output is
            // attributed to the parse phase.
            let phase = if kind == ErrorKind::SyntaxError && !produced_output {
                Phase::Parse
            } else {
                Phase::Runtime
            };
            return (
                ThrownError::new(kind, message).with_raw(stderr),
                phase,
            );
        }
        (
            ThrownError::new(
                ErrorKind::GenericError,
                "engine exited abnormally without a recognizable error",
            )
            .with_raw(stderr),
            Phase::Unknown,
        )
    }

    fn classify_async(&self, stdout: &str) -> Completion {
        for line in stdout.lines() {
            let line = line.trim();
            if line == ASYNC_COMPLETE_MARKER {
                return Completion::Normal;
            }
            if let Some(rest) = line.strip_prefix(ASYNC_FAILURE_PREFIX) {
                let (name, message) = rest.split_once(':').unwrap_or((rest, ""));
                return Completion::Thrown {
                    error: ThrownError::new(ErrorKind::from_name(name.trim()), message.trim()),
                    phase: Phase::Runtime,
                };
            }
        }
        Completion::Thrown {
            error: ThrownError::new(
                ErrorKind::Test262Error,
                "async test completed without signalling $DONE",
            ),
            phase: Phase::Runtime,
        }
    }
}

impl Host for CommandHost {
    fn evaluate(&self, request: &EvalRequest<'_>) -> Result<Completion> {
        let mut child = self.spawn(request)?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::host("child stdin unavailable"))?;
        // Drain stdout/stderr on their own threads so a chatty test cannot
        // deadlock against a full pipe buffer.
        let stdout_pipe = child
            .stdout
            .take()
            .ok_or_else(|| Error::host("child stdout unavailable"))?;
        let stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| Error::host("child stderr unavailable"))?;
        let stdout_reader = std::thread::spawn(move || read_to_string_lossy(stdout_pipe));
        let stderr_reader = std::thread::spawn(move || read_to_string_lossy(stderr_pipe));

        // The child may exit (e.g. on a parse error) before consuming all
        // of stdin; a broken pipe here is not a host defect.
        let _ = stdin.write_all(request.source.as_bytes());
        drop(stdin);

        let exit = self.wait_with_deadline(&mut child, request.timeout)?;
        let stdout = stdout_reader
            .join()
            .map_err(|_| Error::host("stdout reader panicked"))?;
        let stderr = stderr_reader
            .join()
            .map_err(|_| Error::host("stderr reader panicked"))?;

        let Some(code) = exit else {
            return Ok(Completion::TimedOut);
        };

        if code == 0 {
            if request.expects_async {
                return Ok(self.classify_async(&stdout));
            }
            return Ok(Completion::Normal);
        }

        let (error, phase) = self.sniff_thrown(&stderr, !stdout.is_empty());
        Ok(Completion::Thrown { error, phase })
    }
}

fn read_to_string_lossy(mut pipe: impl Read) -> String {
    let mut buf = Vec::new();
    let _ = pipe.read_to_end(&mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> CommandHost {
        CommandHost::new("/bin/true")
    }

    #[test]
    fn test_sniff_known_error_kind() {
        let (err, phase) = host().sniff_thrown("TypeError: x is not a function\n", true);
        assert_eq!(err.kind, ErrorKind::TypeError);
        assert_eq!(err.message, "x is not a function");
        assert_eq!(phase, Phase::Runtime);
        assert!(err.raw.is_some());
    }

    #[test]
    fn test_sniff_parse_phase() {
        let (err, phase) = host().sniff_thrown("SyntaxError: unexpected token\n", false);
        assert_eq!(err.kind, ErrorKind::SyntaxError);
        assert_eq!(phase, Phase::Parse);

        // SyntaxError after output means runtime eval, not a parse reject.
        let (_, phase) = host().sniff_thrown("SyntaxError: in eval\n", true);
        assert_eq!(phase, Phase::Runtime);
    }

    #[test]
    fn test_sniff_unrecognizable_stderr() {
        let (err, phase) = host().sniff_thrown("Segmentation fault\n", false);
        assert_eq!(err.kind, ErrorKind::GenericError);
        assert_eq!(phase, Phase::Unknown);
    }

    #[test]
    fn test_sniff_custom_error_name() {
        let (err, _) = host().sniff_thrown("Uncaught MyWeirdError: boom\n", true);
        assert_eq!(err.kind, ErrorKind::Other("MyWeirdError".to_string()));
        assert_eq!(err.message, "boom");
    }

    #[test]
    fn test_async_classification() {
        let h = host();
        assert_eq!(
            h.classify_async("Test262:AsyncTestComplete\n"),
            Completion::Normal
        );

        match h.classify_async("Test262:AsyncTestFailure:TypeError: bad\n") {
            Completion::Thrown { error, .. } => {
                assert_eq!(error.kind, ErrorKind::TypeError);
                assert_eq!(error.message, "bad");
            }
            other => panic!("unexpected completion: {:?}", other),
        }

        // Silent exit is a failure, not a pass.
        match h.classify_async("") {
            Completion::Thrown { error, .. } => {
                assert_eq!(error.kind, ErrorKind::Test262Error);
            }
            other => panic!("unexpected completion: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_command_host_normal_exit() {
        let h = CommandHost::new("/bin/cat");
        let request = EvalRequest {
            id: "t.js",
            source: "anything\n",
            goal: SourceGoal::Script,
            expects_async: false,
            timeout: Duration::from_secs(5),
        };
        assert_eq!(h.evaluate(&request).unwrap(), Completion::Normal);
    }

    #[cfg(unix)]
    #[test]
    fn test_command_host_timeout_kills() {
        // `cat` with stdin held open never exits on its own, but we close
        // stdin after writing; use `sleep` via sh to force a hang instead.
        let h = CommandHost::new("/bin/sh").with_args(["-c".to_string(), "sleep 30".to_string()]);
        let request = EvalRequest {
            id: "hang.js",
            source: "",
            goal: SourceGoal::Script,
            expects_async: false,
            timeout: Duration::from_millis(100),
        };
        let started = Instant::now();
        assert_eq!(h.evaluate(&request).unwrap(), Completion::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_host_thrown() {
        let h = CommandHost::new("/bin/sh").with_args([
            "-c".to_string(),
            "echo 'TypeError: nope' >&2; exit 1".to_string(),
        ]);
        let request = EvalRequest {
            id: "t.js",
            source: "",
            goal: SourceGoal::Script,
            expects_async: false,
            timeout: Duration::from_secs(5),
        };
        match h.evaluate(&request).unwrap() {
            Completion::Thrown { error, .. } => assert_eq!(error.kind, ErrorKind::TypeError),
            other => panic!("unexpected completion: {:?}", other),
        }
    }

    #[test]
    fn test_missing_binary_is_host_error() {
        let h = CommandHost::new("/definitely/not/a/real/engine");
        let request = EvalRequest {
            id: "t.js",
            source: "",
            goal: SourceGoal::Script,
            expects_async: false,
            timeout: Duration::from_secs(1),
        };
        assert!(matches!(h.evaluate(&request), Err(Error::Host(_))));
    }
}
