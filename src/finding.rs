//! Finding Model (C1): pure data, no side effects.
//!
//! Findings round-trip losslessly through JSON — every field that can be
//! populated by a scanner is serialized, and `Default` is never relied on for
//! anything but `execution_time` bookkeeping performed by the registry.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Severity is ordered: Block > Warn > Info.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warn,
    Block,
}

/// Pipeline stage at which a scanner runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    PreExecution,
    PostExecution,
}

/// Outcome of a single scanner execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Passed,
    Failed,
    Warning,
    Skipped,
}

/// A scanner's structured outcome for one Context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub scanner_id: String,
    pub status: Status,
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub detail_lines: Vec<String>,
    #[serde(default)]
    pub suggestion_lines: Vec<String>,
    #[serde(default, with = "duration_secs_f64")]
    pub execution_time: Duration,
}

impl Finding {
    pub fn skipped(scanner_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            scanner_id: scanner_id.into(),
            status: Status::Skipped,
            severity: Severity::Info,
            message: reason.into(),
            detail_lines: Vec::new(),
            suggestion_lines: Vec::new(),
            execution_time: Duration::ZERO,
        }
    }

    pub fn passed(scanner_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            scanner_id: scanner_id.into(),
            status: Status::Passed,
            severity: Severity::Info,
            message: message.into(),
            detail_lines: Vec::new(),
            suggestion_lines: Vec::new(),
            execution_time: Duration::ZERO,
        }
    }

    pub fn warning(
        scanner_id: impl Into<String>,
        message: impl Into<String>,
        details: Vec<String>,
        suggestions: Vec<String>,
    ) -> Self {
        Self {
            scanner_id: scanner_id.into(),
            status: Status::Warning,
            severity: Severity::Warn,
            message: message.into(),
            detail_lines: details,
            suggestion_lines: suggestions,
            execution_time: Duration::ZERO,
        }
    }

    pub fn failed(
        scanner_id: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
        details: Vec<String>,
        suggestions: Vec<String>,
    ) -> Self {
        Self {
            scanner_id: scanner_id.into(),
            status: Status::Failed,
            severity,
            message: message.into(),
            detail_lines: details,
            suggestion_lines: suggestions,
            execution_time: Duration::ZERO,
        }
    }

    /// Attach a measured execution time (registry does this after `execute` returns).
    pub fn with_execution_time(mut self, d: Duration) -> Self {
        self.execution_time = d;
        self
    }

    pub fn is_blocking(&self) -> bool {
        self.status == Status::Failed && self.severity == Severity::Block
    }
}

/// The aggregate of all Findings for one phase, plus block/pass judgments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub phase: Phase,
    pub passed: bool,
    pub should_block: bool,
    pub findings: Vec<Finding>,
}

impl PipelineResult {
    pub fn new(phase: Phase, findings: Vec<Finding>) -> Self {
        let should_block = findings.iter().any(Finding::is_blocking);
        Self {
            phase,
            passed: !should_block,
            should_block,
            findings,
        }
    }
}

/// Serializes a `Duration` as fractional seconds.
mod duration_secs_f64 {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_semantics_never_block() {
        let f = Finding::skipped("dependency_audit", "no manifest touched");
        assert_eq!(f.status, Status::Skipped);
        assert!(!f.is_blocking());
    }

    #[test]
    fn block_coherence() {
        let blocking = Finding::failed("secret_scanner", Severity::Block, "secret found", vec![], vec![]);
        let result = PipelineResult::new(Phase::PostExecution, vec![blocking]);
        assert!(result.should_block);
        assert!(!result.passed);

        let clean = Finding::passed("secret_scanner", "no matches");
        let result = PipelineResult::new(Phase::PostExecution, vec![clean]);
        assert!(!result.should_block);
        assert!(result.passed);
    }

    #[test]
    fn round_trips_losslessly() {
        let f = Finding::warning(
            "performance",
            "db call in loop",
            vec!["src/a.ts:10".to_string()],
            vec!["batch the query".to_string()],
        )
        .with_execution_time(Duration::from_millis(250));
        let json = serde_json::to_string(&f).unwrap();
        let back: Finding = serde_json::from_str(&json).unwrap();
        assert_eq!(back.scanner_id, f.scanner_id);
        assert_eq!(back.status, f.status);
        assert_eq!(back.severity, f.severity);
        assert_eq!(back.detail_lines, f.detail_lines);
        assert_eq!(back.suggestion_lines, f.suggestion_lines);
        assert!((back.execution_time.as_secs_f64() - f.execution_time.as_secs_f64()).abs() < 1e-9);
    }
}
