//! Test metadata parser
//!
//! Extracts the structured `/*--- ... ---*/` directive block from a test
//! file's header into a fixed-schema [`TestMetadata`]. Parsing is pure and
//! side-effect-free: the same source always yields the same result, so
//! callers may cache across repeated runs.
//!
//! The parser is deliberately strict. An absent or unterminated block, an
//! unrecognized directive key, or a flag outside the fixed vocabulary is a
//! `MalformedMetadata` error, so corpus drift is caught early instead of
//! silently ignored.

use crate::error::{Error, ErrorKind, Result};
use bitflags::bitflags;
use std::fmt;
use std::iter::Peekable;
use std::str::Lines;

bitflags! {
    /// Fixed vocabulary of execution flags a test may declare.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TestFlags: u16 {
        /// Run only in strict-mode.
        const ONLY_STRICT = 1 << 0;
        /// Run only in non-strict mode.
        const NO_STRICT = 1 << 1;
        /// Evaluate with the module goal (implies strict).
        const MODULE = 1 << 2;
        /// Body is executed verbatim: no prelude, no strict wrapper.
        const RAW = 1 << 3;
        /// Completion is signalled asynchronously via the done protocol.
        const ASYNC = 1 << 4;
        /// Mechanically generated from a template.
        const GENERATED = 1 << 5;
        /// Host agent cannot block.
        const CAN_BLOCK_IS_FALSE = 1 << 6;
        /// Host agent can block.
        const CAN_BLOCK_IS_TRUE = 1 << 7;
        /// Output may legitimately vary between runs.
        const NON_DETERMINISTIC = 1 << 8;
    }
}

impl TestFlags {
    /// Map a flag name from the directive block to its bit, or `None` for
    /// names outside the vocabulary.
    ///
    /// Named `from_directive_name` rather than `from_name` to avoid
    /// colliding with the inherent `from_name` the `bitflags!` macro
    /// generates (which looks up SCREAMING_CASE variant identifiers, not
    /// the JS directive spellings this table maps).
    pub fn from_directive_name(name: &str) -> Option<Self> {
        match name {
            "onlyStrict" => Some(TestFlags::ONLY_STRICT),
            "noStrict" => Some(TestFlags::NO_STRICT),
            "module" => Some(TestFlags::MODULE),
            "raw" => Some(TestFlags::RAW),
            "async" => Some(TestFlags::ASYNC),
            "generated" => Some(TestFlags::GENERATED),
            "CanBlockIsFalse" => Some(TestFlags::CAN_BLOCK_IS_FALSE),
            "CanBlockIsTrue" => Some(TestFlags::CAN_BLOCK_IS_TRUE),
            "non-deterministic" => Some(TestFlags::NON_DETERMINISTIC),
            _ => None,
        }
    }
}

/// Evaluation phase at which a declared negative expectation must occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Phase {
    /// Rejected before any evaluation (syntax).
    Parse,
    /// Module resolution.
    Resolution,
    /// Thrown during evaluation.
    Runtime,
    /// The host could not attribute a phase; matches any declared phase.
    Unknown,
}

impl Phase {
    fn from_directive(s: &str) -> Option<Self> {
        match s {
            "parse" => Some(Phase::Parse),
            "early" => Some(Phase::Parse), // legacy alias in older corpora
            "resolution" => Some(Phase::Resolution),
            "runtime" => Some(Phase::Runtime),
            _ => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Parse => write!(f, "parse"),
            Phase::Resolution => write!(f, "resolution"),
            Phase::Runtime => write!(f, "runtime"),
            Phase::Unknown => write!(f, "unknown"),
        }
    }
}

/// A declared negative expectation: the test passes only if the
/// implementation throws an error of exactly this kind, at this phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedError {
    pub kind: ErrorKind,
    pub phase: Phase,
}

/// One specific execution mode of a test. Each variant gets its own
/// isolated execution context and its own outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Variant {
    NonStrict,
    Strict,
    Module,
    Raw,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::NonStrict => write!(f, "default"),
            Variant::Strict => write!(f, "strict"),
            Variant::Module => write!(f, "module"),
            Variant::Raw => write!(f, "raw"),
        }
    }
}

/// Parsed test metadata. Derived once from the test source and never
/// mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestMetadata {
    pub description: String,
    pub info: String,
    pub esid: Option<String>,
    pub es5id: Option<String>,
    pub es6id: Option<String>,
    pub author: Option<String>,
    pub features: Vec<String>,
    pub includes: Vec<String>,
    pub flags: TestFlags,
    pub negative: Option<ExpectedError>,
    pub locale: Vec<String>,
    pub defines: Vec<String>,
}

impl TestMetadata {
    /// Parse the directive block out of `source`.
    ///
    /// Fails with `MalformedMetadata` when the block is absent or
    /// unterminated, a key or flag is unrecognized, a `negative` directive
    /// is incomplete, or declared flags contradict each other.
    pub fn parse(source: &str) -> Result<Self> {
        let start = source
            .find("/*---")
            .ok_or_else(|| Error::malformed_metadata("missing /*--- directive block"))?;
        let body_start = start + "/*---".len();
        let end = source[body_start..]
            .find("---*/")
            .map(|i| body_start + i)
            .ok_or_else(|| Error::malformed_metadata("unterminated directive block"))?;
        let block = &source[body_start..end];

        let mut metadata = TestMetadata::default();
        let mut lines = block.lines().peekable();

        while let Some(raw_line) = lines.next() {
            if raw_line.trim().is_empty() {
                continue;
            }
            if leading_whitespace(raw_line) > 0 {
                return Err(Error::malformed_metadata(format!(
                    "unexpected continuation line outside a directive: {:?}",
                    raw_line.trim()
                )));
            }
            let line = raw_line.trim_end();
            let (key, rest) = line
                .split_once(':')
                .ok_or_else(|| Error::malformed_metadata(format!("not a directive: {:?}", line)))?;
            let rest = rest.trim();

            match key.trim() {
                "description" => metadata.description = scalar_value(rest, &mut lines),
                "info" => metadata.info = scalar_value(rest, &mut lines),
                "esid" => metadata.esid = Some(rest.to_string()),
                "es5id" => metadata.es5id = Some(rest.to_string()),
                "es6id" => metadata.es6id = Some(rest.to_string()),
                "author" => metadata.author = Some(rest.to_string()),
                "features" => metadata.features = list_value("features", rest, &mut lines)?,
                "includes" => metadata.includes = list_value("includes", rest, &mut lines)?,
                "locale" => metadata.locale = list_value("locale", rest, &mut lines)?,
                "defines" => metadata.defines = list_value("defines", rest, &mut lines)?,
                "flags" => {
                    for name in list_value("flags", rest, &mut lines)? {
                        let flag = TestFlags::from_directive_name(&name).ok_or_else(|| {
                            Error::malformed_metadata(format!("unknown flag: {:?}", name))
                        })?;
                        metadata.flags |= flag;
                    }
                }
                "negative" => metadata.negative = Some(negative_value(rest, &mut lines)?),
                other => {
                    return Err(Error::malformed_metadata(format!(
                        "unknown directive key: {:?}",
                        other
                    )));
                }
            }
        }

        metadata.validate()?;
        Ok(metadata)
    }

    fn validate(&self) -> Result<()> {
        let flags = self.flags;
        if flags.contains(TestFlags::ONLY_STRICT | TestFlags::NO_STRICT) {
            return Err(Error::malformed_metadata(
                "onlyStrict and noStrict are mutually exclusive",
            ));
        }
        if flags.contains(TestFlags::RAW) {
            let incompatible = TestFlags::MODULE
                | TestFlags::ONLY_STRICT
                | TestFlags::NO_STRICT
                | TestFlags::ASYNC;
            if flags.intersects(incompatible) {
                return Err(Error::malformed_metadata(
                    "raw cannot be combined with module, strictness, or async flags",
                ));
            }
            if !self.includes.is_empty() {
                return Err(Error::malformed_metadata(
                    "raw tests cannot declare includes",
                ));
            }
        }
        if flags.contains(TestFlags::MODULE)
            && flags.intersects(TestFlags::ONLY_STRICT | TestFlags::NO_STRICT)
        {
            return Err(Error::malformed_metadata(
                "module tests cannot declare strictness flags",
            ));
        }
        Ok(())
    }

    /// The set of execution variants this test runs under. Each entry
    /// spawns an independent execution context.
    pub fn variants(&self) -> Vec<Variant> {
        if self.flags.contains(TestFlags::RAW) {
            vec![Variant::Raw]
        } else if self.flags.contains(TestFlags::MODULE) {
            vec![Variant::Module]
        } else if self.flags.contains(TestFlags::ONLY_STRICT) {
            vec![Variant::Strict]
        } else if self.flags.contains(TestFlags::NO_STRICT) {
            vec![Variant::NonStrict]
        } else {
            vec![Variant::NonStrict, Variant::Strict]
        }
    }

    /// Whether completion is signalled via the asynchronous done protocol.
    pub fn is_async(&self) -> bool {
        self.flags.contains(TestFlags::ASYNC)
    }
}

fn leading_whitespace(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// Consume the indented continuation lines belonging to the directive that
/// was just read. Top-level keys sit at column zero, so anything indented
/// belongs to the current directive.
fn take_indented<'a>(lines: &mut Peekable<Lines<'a>>) -> Vec<&'a str> {
    let mut taken = Vec::new();
    while let Some(next) = lines.peek() {
        if !next.trim().is_empty() && leading_whitespace(next) == 0 {
            break;
        }
        taken.push(lines.next().unwrap());
    }
    // Trailing blank lines belong to nobody.
    while matches!(taken.last(), Some(l) if l.trim().is_empty()) {
        taken.pop();
    }
    taken
}

/// A free-text scalar: either inline, or a `|`/`>` block whose content is
/// on the following indented lines.
fn scalar_value(rest: &str, lines: &mut Peekable<Lines<'_>>) -> String {
    match rest {
        "|" | ">" | "" => {
            let block = take_indented(lines);
            let parts: Vec<&str> = block.iter().map(|l| l.trim()).collect();
            let sep = if rest == ">" { " " } else { "\n" };
            parts.join(sep).trim().to_string()
        }
        inline => inline.trim_matches(|c| c == '\'' || c == '"').to_string(),
    }
}

/// A list directive: inline `[a, b]` or a run of indented `- item` lines.
fn list_value(key: &str, rest: &str, lines: &mut Peekable<Lines<'_>>) -> Result<Vec<String>> {
    if !rest.is_empty() {
        if !(rest.starts_with('[') && rest.ends_with(']')) {
            return Err(Error::malformed_metadata(format!(
                "{} must be an inline [..] list or a block list",
                key
            )));
        }
        return Ok(rest[1..rest.len() - 1]
            .split(',')
            .map(|s| s.trim().trim_matches(|c| c == '\'' || c == '"').to_string())
            .filter(|s| !s.is_empty())
            .collect());
    }

    let mut items = Vec::new();
    for line in take_indented(lines) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let item = line.strip_prefix("- ").ok_or_else(|| {
            Error::malformed_metadata(format!("malformed {} list entry: {:?}", key, line))
        })?;
        items.push(item.trim().to_string());
    }
    Ok(items)
}

/// The `negative` substructure: both `type` and `phase` are required.
fn negative_value(rest: &str, lines: &mut Peekable<Lines<'_>>) -> Result<ExpectedError> {
    if !rest.is_empty() {
        return Err(Error::malformed_metadata(
            "negative must be a block with phase and type",
        ));
    }

    let mut kind = None;
    let mut phase = None;
    for line in take_indented(lines) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (sub, value) = line.split_once(':').ok_or_else(|| {
            Error::malformed_metadata(format!("malformed negative entry: {:?}", line))
        })?;
        let value = value.trim();
        match sub.trim() {
            "type" => kind = Some(ErrorKind::from_name(value)),
            "phase" => {
                phase = Some(Phase::from_directive(value).ok_or_else(|| {
                    Error::malformed_metadata(format!("unknown negative phase: {:?}", value))
                })?)
            }
            other => {
                return Err(Error::malformed_metadata(format!(
                    "unknown negative key: {:?}",
                    other
                )));
            }
        }
    }

    match (kind, phase) {
        (Some(kind), Some(phase)) => Ok(ExpectedError { kind, phase }),
        (None, _) => Err(Error::malformed_metadata("negative is missing type")),
        (_, None) => Err(Error::malformed_metadata("negative is missing phase")),
    }
}
