//! Outcome classification
//!
//! Maps a sandbox result plus the test's declared expectation to a final
//! verdict. Classification operates on the thrown error's kind; messages
//! are retained for diagnostics only.

use crate::error::ErrorKind;
use crate::metadata::{ExpectedError, Phase, Variant};
use crate::sandbox::SandboxResult;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Final verdict for one (test, variant) execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Fail,
    /// Harness defect (bad corpus entry, isolation failure, undriveable
    /// host), distinct from an ordinary test failure.
    Crash,
    Timeout,
    Skip,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Pass => write!(f, "PASS"),
            Verdict::Fail => write!(f, "FAIL"),
            Verdict::Crash => write!(f, "CRASH"),
            Verdict::Timeout => write!(f, "TIMEOUT"),
            Verdict::Skip => write!(f, "SKIP"),
        }
    }
}

/// Why a run did not pass. Wrong-error-kind is distinguishable from
/// no-error-at-all in the result stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Failure {
    /// Threw when no error was expected.
    Unexpected { kind: ErrorKind, message: String },
    /// Negative test threw, but not the declared kind (or not at the
    /// declared phase).
    WrongErrorKind {
        expected: ErrorKind,
        actual: ErrorKind,
        message: String,
    },
    /// Negative test completed normally without throwing.
    ExpectedErrorMissing { expected: ErrorKind },
    /// Harness defect detail accompanying a Crash verdict.
    Harness { message: String },
}

impl Failure {
    /// The captured error kind, when one exists.
    pub fn kind(&self) -> Option<&ErrorKind> {
        match self {
            Failure::Unexpected { kind, .. } => Some(kind),
            Failure::WrongErrorKind { actual, .. } => Some(actual),
            Failure::ExpectedErrorMissing { .. } | Failure::Harness { .. } => None,
        }
    }
}

/// The classified result of one execution context. Produced exactly once
/// per (test, variant) and immutable thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub test_id: String,
    pub variant: Variant,
    pub verdict: Verdict,
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
    /// Corpus position, used to restore corpus order in the report.
    #[serde(skip)]
    pub order: (usize, usize),
}

impl Outcome {
    pub fn skip(test_id: impl Into<String>, variant: Variant, order: (usize, usize)) -> Self {
        Self {
            test_id: test_id.into(),
            variant,
            verdict: Verdict::Skip,
            elapsed: Duration::ZERO,
            failure: None,
            order,
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (d.as_secs_f64() * 1000.0).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(ms / 1000.0))
    }
}

/// Apply the expectation to a raw sandbox result.
pub fn classify(
    expectation: Option<&ExpectedError>,
    result: &SandboxResult,
) -> (Verdict, Option<Failure>) {
    match result {
        SandboxResult::TimedOut => (Verdict::Timeout, None),
        SandboxResult::Fault(error) => (
            Verdict::Crash,
            Some(Failure::Harness {
                message: error.to_string(),
            }),
        ),
        SandboxResult::Completed => match expectation {
            None => (Verdict::Pass, None),
            Some(expected) => (
                Verdict::Fail,
                Some(Failure::ExpectedErrorMissing {
                    expected: expected.kind.clone(),
                }),
            ),
        },
        SandboxResult::Thrown { error, phase } => match expectation {
            None => (
                Verdict::Fail,
                Some(Failure::Unexpected {
                    kind: error.kind.clone(),
                    message: error.message.clone(),
                }),
            ),
            Some(expected) => {
                let kind_matches = error.kind == expected.kind;
                let phase_matches = *phase == Phase::Unknown || *phase == expected.phase;
                if kind_matches && phase_matches {
                    (Verdict::Pass, None)
                } else {
                    let message = if kind_matches {
                        format!(
                            "expected {} at {} phase, thrown at {} phase",
                            expected.kind, expected.phase, phase
                        )
                    } else {
                        error.message.clone()
                    };
                    (
                        Verdict::Fail,
                        Some(Failure::WrongErrorKind {
                            expected: expected.kind.clone(),
                            actual: error.kind.clone(),
                            message,
                        }),
                    )
                }
            }
        },
    }
}
