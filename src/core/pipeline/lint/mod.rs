//! Structural and security linting of parsed pipeline documents.

use crate::core::error::{CompileError, ErrorKind};
use crate::core::pipeline::schema::PipelineDoc;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

mod rules;

pub use rules::built_in_rules;

/// Severity of a lint finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LintSeverity {
    Error,
    Warning,
}

impl LintSeverity {
    fn rank(self) -> u8 {
        match self {
            LintSeverity::Error => 2,
            LintSeverity::Warning => 1,
        }
    }
}

impl fmt::Display for LintSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LintSeverity::Error => f.write_str("error"),
            LintSeverity::Warning => f.write_str("warning"),
        }
    }
}

/// A single lint finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LintResult {
    pub code: String,
    pub severity: LintSeverity,
    pub message: String,
    pub location: Option<String>,
}

impl LintResult {
    pub fn new(
        code: impl Into<String>,
        severity: LintSeverity,
        message: impl Into<String>,
        location: Option<String>,
    ) -> Self {
        Self {
            code: code.into(),
            severity,
            message: message.into(),
            location,
        }
    }
}

/// Everything a rule may consult: the parsed document, the display name
/// of the file it came from, and the repository's trusted bit.
pub struct LintContext<'a> {
    pub doc: &'a PipelineDoc,
    pub file: &'a str,
    pub trusted: bool,
}

/// A lint rule produces zero or more findings for one document.
pub trait LintRule: Send + Sync {
    fn check(&self, ctx: &LintContext<'_>) -> Vec<LintResult>;
}

/// Runs the built-in rules and sorts findings, errors first.
pub struct LintRegistry {
    rules: Vec<Box<dyn LintRule>>,
}

impl LintRegistry {
    pub fn new() -> Self {
        Self {
            rules: built_in_rules(),
        }
    }

    pub fn run(&self, ctx: &LintContext<'_>) -> Vec<LintResult> {
        let mut results = Vec::new();
        for rule in &self.rules {
            results.extend(rule.check(ctx));
        }
        results.sort_by(compare_result);
        results
    }

    /// Run the rules and convert the first error-severity finding into
    /// a compilation failure. Warnings are logged and tolerated.
    pub fn lint(&self, ctx: &LintContext<'_>) -> Result<(), CompileError> {
        for finding in self.run(ctx) {
            match finding.severity {
                LintSeverity::Error => {
                    let mut err = CompileError::new(
                        ErrorKind::Lint,
                        format!("{}: {}", finding.code, finding.message),
                    )
                    .with_file(ctx.file);
                    if let Some(location) = finding.location {
                        err = err.with_location(location);
                    }
                    return Err(err);
                }
                LintSeverity::Warning => {
                    tracing::warn!(
                        file = ctx.file,
                        code = %finding.code,
                        location = finding.location.as_deref().unwrap_or(""),
                        "{}",
                        finding.message
                    );
                }
            }
        }
        Ok(())
    }
}

impl Default for LintRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn compare_result(a: &LintResult, b: &LintResult) -> Ordering {
    b.severity
        .rank()
        .cmp(&a.severity.rank())
        .then_with(|| a.code.cmp(&b.code))
        .then_with(|| a.location.cmp(&b.location))
}
