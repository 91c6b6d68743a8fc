//! Result collection and reporting
//!
//! The [`ResultSet`] accumulates one [`Outcome`] per (test, variant) during
//! a run and, once complete, emits the report sorted back into corpus
//! order. Presentation order is therefore byte-for-byte reproducible for a
//! given corpus and configuration, no matter how execution interleaved.

use crate::outcome::{Failure, Outcome, Verdict};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

/// Machine-readable output format for the result stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human summary with per-chapter table.
    Summary,
    /// One JSON object per line per (test, variant).
    Jsonl,
    /// Test Anything Protocol, for CI consumers.
    Tap,
}

/// Aggregate verdict counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub crashed: usize,
    pub timeouts: usize,
    pub skipped: usize,
}

impl Totals {
    fn count(&mut self, verdict: Verdict) {
        self.total += 1;
        match verdict {
            Verdict::Pass => self.passed += 1,
            Verdict::Fail => self.failed += 1,
            Verdict::Crash => self.crashed += 1,
            Verdict::Timeout => self.timeouts += 1,
            Verdict::Skip => self.skipped += 1,
        }
    }

    /// Pass rate over runnable (non-skipped) executions, as a percentage.
    pub fn pass_rate(&self) -> f64 {
        let runnable = self.total - self.skipped;
        if runnable == 0 {
            0.0
        } else {
            self.passed as f64 / runnable as f64 * 100.0
        }
    }

    /// Automation gate: `true` when nothing failed or crashed.
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.crashed == 0
    }
}

/// Per-chapter aggregation for the human summary (first path component of
/// the test id).
#[derive(Debug, Clone, Default)]
pub struct ChapterTotals {
    pub name: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

impl ChapterTotals {
    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.passed as f64 / self.total as f64 * 100.0
        }
    }
}

/// All outcomes of one run. Owned exclusively by the runner while the run
/// is in flight; read-only afterwards.
#[derive(Debug, Default)]
pub struct ResultSet {
    outcomes: Vec<Outcome>,
    totals: Totals,
    elapsed: Duration,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one outcome. Each (test, variant) is recorded exactly once;
    /// arrival order does not matter.
    pub fn record(&mut self, outcome: Outcome) {
        self.totals.count(outcome.verdict);
        self.elapsed += outcome.elapsed;
        self.outcomes.push(outcome);
    }

    /// Seal the set: sort into corpus order. Called once when the run
    /// finishes, before any report is emitted.
    pub fn seal(&mut self) {
        self.outcomes.sort_by_key(|o| o.order);
    }

    pub fn totals(&self) -> Totals {
        self.totals
    }

    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    /// Outcomes that gate automation (Fail or Crash).
    pub fn failures(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.verdict, Verdict::Fail | Verdict::Crash))
    }

    fn chapters(&self) -> BTreeMap<String, ChapterTotals> {
        let mut chapters: BTreeMap<String, ChapterTotals> = BTreeMap::new();
        for outcome in &self.outcomes {
            let name = outcome
                .test_id
                .split('/')
                .next()
                .unwrap_or("unknown")
                .to_string();
            let entry = chapters.entry(name.clone()).or_insert_with(|| ChapterTotals {
                name,
                ..Default::default()
            });
            entry.total += 1;
            match outcome.verdict {
                Verdict::Pass => entry.passed += 1,
                Verdict::Fail | Verdict::Crash => entry.failed += 1,
                _ => {}
            }
        }
        chapters
    }

    /// Render in the requested format.
    pub fn render(&self, format: OutputFormat) -> String {
        match format {
            OutputFormat::Summary => self.to_summary(),
            OutputFormat::Jsonl => self.to_jsonl(),
            OutputFormat::Tap => self.to_tap(),
        }
    }

    /// Human summary with per-chapter table.
    pub fn to_summary(&self) -> String {
        let t = self.totals;
        let mut s = String::new();
        s.push_str("\n=== Conformance Report ===\n\n");
        let _ = writeln!(
            s,
            "Total: {} | Pass: {} | Fail: {} | Crash: {} | Timeout: {} | Skip: {}",
            t.total, t.passed, t.failed, t.crashed, t.timeouts, t.skipped
        );
        let _ = writeln!(
            s,
            "Pass Rate: {:.1}% ({}/{})",
            t.pass_rate(),
            t.passed,
            t.total - t.skipped
        );
        let _ = writeln!(s, "Time: {:?}\n", self.elapsed);

        s.push_str("Per-Chapter Results:\n");
        let _ = writeln!(
            s,
            "{:<30} {:>6} {:>6} {:>6} {:>7}",
            "Chapter", "Total", "Pass", "Fail", "Rate"
        );
        s.push_str(&"-".repeat(61));
        s.push('\n');
        for chapter in self.chapters().values() {
            let _ = writeln!(
                s,
                "{:<30} {:>6} {:>6} {:>6} {:>6.1}%",
                chapter.name,
                chapter.total,
                chapter.passed,
                chapter.failed,
                chapter.pass_rate()
            );
        }
        s
    }

    /// The machine-readable result stream: one JSON object per line, in
    /// corpus order.
    pub fn to_jsonl(&self) -> String {
        let mut s = String::new();
        for outcome in &self.outcomes {
            // Serialization of these derives cannot fail.
            s.push_str(&serde_json::to_string(outcome).expect("outcome serializes"));
            s.push('\n');
        }
        s.push_str(&serde_json::to_string(&self.totals).expect("totals serialize"));
        s.push('\n');
        s
    }

    /// TAP (Test Anything Protocol) output for CI.
    pub fn to_tap(&self) -> String {
        let runnable: Vec<&Outcome> = self
            .outcomes
            .iter()
            .filter(|o| o.verdict != Verdict::Skip)
            .collect();

        let mut s = format!("TAP version 13\n1..{}\n", runnable.len());
        for (i, outcome) in runnable.iter().enumerate() {
            let n = i + 1;
            let title = format!("{} ({})", outcome.test_id, outcome.variant);
            match outcome.verdict {
                Verdict::Pass => {
                    let _ = writeln!(s, "ok {} - {}", n, title);
                }
                _ => {
                    let _ = writeln!(s, "not ok {} - {}", n, title);
                    if let Some(message) = failure_message(outcome.failure.as_ref()) {
                        let _ = writeln!(s, "  ---\n  message: {}\n  ---", message);
                    }
                }
            }
        }
        s
    }
}

fn failure_message(failure: Option<&Failure>) -> Option<String> {
    failure.map(|f| match f {
        Failure::Unexpected { kind, message } => format!("{}: {}", kind, message),
        Failure::WrongErrorKind {
            expected,
            actual,
            message,
        } => format!("expected {}, got {}: {}", expected, actual, message),
        Failure::ExpectedErrorMissing { expected } => {
            format!("expected {} but completed normally", expected)
        }
        Failure::Harness { message } => message.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::metadata::Variant;

    fn outcome(id: &str, variant: Variant, verdict: Verdict, order: (usize, usize)) -> Outcome {
        Outcome {
            test_id: id.to_string(),
            variant,
            verdict,
            elapsed: Duration::from_millis(1),
            failure: None,
            order,
        }
    }

    #[test]
    fn test_totals_accumulate() {
        let mut set = ResultSet::new();
        set.record(outcome("a.js", Variant::NonStrict, Verdict::Pass, (0, 0)));
        set.record(outcome("a.js", Variant::Strict, Verdict::Fail, (0, 1)));
        set.record(outcome("b.js", Variant::NonStrict, Verdict::Skip, (1, 0)));
        let t = set.totals();
        assert_eq!(t.total, 3);
        assert_eq!(t.passed, 1);
        assert_eq!(t.failed, 1);
        assert_eq!(t.skipped, 1);
        assert_eq!(t.pass_rate(), 50.0);
        assert!(!t.is_clean());
    }

    #[test]
    fn test_seal_restores_corpus_order() {
        let mut set = ResultSet::new();
        // Completion order interleaves; corpus order must come back.
        set.record(outcome("c.js", Variant::Strict, Verdict::Pass, (2, 1)));
        set.record(outcome("a.js", Variant::NonStrict, Verdict::Pass, (0, 0)));
        set.record(outcome("c.js", Variant::NonStrict, Verdict::Pass, (2, 0)));
        set.record(outcome("a.js", Variant::Strict, Verdict::Pass, (0, 1)));
        set.seal();
        let orders: Vec<(usize, usize)> = set.outcomes().iter().map(|o| o.order).collect();
        assert_eq!(orders, vec![(0, 0), (0, 1), (2, 0), (2, 1)]);
    }

    #[test]
    fn test_jsonl_stream_shape() {
        let mut set = ResultSet::new();
        set.record(Outcome {
            test_id: "built-ins/RegExp/x.js".to_string(),
            variant: Variant::Strict,
            verdict: Verdict::Fail,
            elapsed: Duration::from_millis(3),
            failure: Some(Failure::WrongErrorKind {
                expected: ErrorKind::TypeError,
                actual: ErrorKind::RangeError,
                message: "boom".to_string(),
            }),
            order: (0, 0),
        });
        set.seal();
        let jsonl = set.to_jsonl();
        let mut lines = jsonl.lines();
        let first: serde_json::Value = serde_json::from_str(lines.next().unwrap()).unwrap();
        assert_eq!(first["verdict"], "FAIL");
        assert_eq!(first["failure"]["reason"], "wrong_error_kind");
        let totals: serde_json::Value = serde_json::from_str(lines.next().unwrap()).unwrap();
        assert_eq!(totals["failed"], 1);
    }

    #[test]
    fn test_tap_output() {
        let mut set = ResultSet::new();
        set.record(outcome("ok.js", Variant::NonStrict, Verdict::Pass, (0, 0)));
        set.record(outcome("skip.js", Variant::NonStrict, Verdict::Skip, (1, 0)));
        set.record(outcome("bad.js", Variant::NonStrict, Verdict::Fail, (2, 0)));
        set.seal();
        let tap = set.to_tap();
        assert!(tap.contains("TAP version 13"));
        assert!(tap.contains("1..2"));
        assert!(tap.contains("ok 1 - ok.js (default)"));
        assert!(tap.contains("not ok 2 - bad.js (default)"));
    }

    #[test]
    fn test_summary_chapters() {
        let mut set = ResultSet::new();
        set.record(outcome(
            "built-ins/Array/a.js",
            Variant::NonStrict,
            Verdict::Pass,
            (0, 0),
        ));
        set.record(outcome(
            "language/types/b.js",
            Variant::NonStrict,
            Verdict::Fail,
            (1, 0),
        ));
        set.seal();
        let summary = set.to_summary();
        assert!(summary.contains("built-ins"));
        assert!(summary.contains("language"));
        assert!(summary.contains("Pass Rate: 50.0%"));
    }

    #[test]
    fn test_failures_iterator_gates_automation() {
        let mut set = ResultSet::new();
        set.record(outcome("a.js", Variant::NonStrict, Verdict::Pass, (0, 0)));
        set.record(outcome("b.js", Variant::NonStrict, Verdict::Crash, (1, 0)));
        assert_eq!(set.failures().count(), 1);
        assert!(!set.totals().is_clean());
    }
}
