//! Scanner Library: stateless per-Context analyzers.
//!
//! Scanners are modeled as an enum of variants rather than `dyn` trait
//! objects — exhaustive matching, no dynamic dispatch, and new scanners
//! are a compile error away from being wired into every `match`.

pub mod ai_review;
pub mod breaking_changes;
pub mod compliance;
pub mod dependency_audit;
pub mod performance;
pub mod secret;

use crate::finding::{Finding, Phase, Severity};
use crate::providers::{AiModelProvider, PackageAuditProvider};
use crate::types::Context;
use std::sync::Arc;

/// One scanner kind. `execute` is the single-pass analysis function; it
/// must never mutate `ctx` and must return within its own bounded time
/// (the registry additionally enforces a hard deadline).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScannerKind {
    Secret,
    DependencyAudit,
    BreakingChanges,
    Performance,
    Compliance,
    AiReview,
}

impl ScannerKind {
    pub const ALL: [ScannerKind; 6] = [
        ScannerKind::Secret,
        ScannerKind::DependencyAudit,
        ScannerKind::BreakingChanges,
        ScannerKind::Performance,
        ScannerKind::Compliance,
        ScannerKind::AiReview,
    ];

    pub fn id(self) -> &'static str {
        match self {
            ScannerKind::Secret => "secret_scanner",
            ScannerKind::DependencyAudit => "dependency_audit",
            ScannerKind::BreakingChanges => "breaking_changes",
            ScannerKind::Performance => "performance",
            ScannerKind::Compliance => "compliance",
            ScannerKind::AiReview => "ai_review",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ScannerKind::Secret => "Secret Scanner",
            ScannerKind::DependencyAudit => "Dependency Audit",
            ScannerKind::BreakingChanges => "Breaking Changes",
            ScannerKind::Performance => "Performance",
            ScannerKind::Compliance => "Compliance",
            ScannerKind::AiReview => "AI Code Review",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ScannerKind::Secret => "Scans proposed content for leaked credentials",
            ScannerKind::DependencyAudit => "Audits dependency manifest changes for known vulnerabilities",
            ScannerKind::BreakingChanges => "Diffs exported surfaces for removed or altered public API",
            ScannerKind::Performance => "Heuristic scan for common performance pitfalls",
            ScannerKind::Compliance => "Pattern scan for regulatory compliance gaps",
            ScannerKind::AiReview => "Delegates a code review pass to an AI model provider",
        }
    }

    pub fn phase(self) -> Phase {
        match self {
            ScannerKind::Secret
            | ScannerKind::DependencyAudit
            | ScannerKind::BreakingChanges
            | ScannerKind::Performance
            | ScannerKind::Compliance
            | ScannerKind::AiReview => Phase::PostExecution,
        }
    }

    pub fn default_severity(self) -> Severity {
        match self {
            ScannerKind::Secret => Severity::Block,
            ScannerKind::DependencyAudit => Severity::Warn,
            ScannerKind::BreakingChanges => Severity::Warn,
            ScannerKind::Performance => Severity::Warn,
            ScannerKind::Compliance => Severity::Warn,
            ScannerKind::AiReview => Severity::Warn,
        }
    }

    pub async fn execute(self, ctx: &Context, providers: &Providers) -> Finding {
        match self {
            ScannerKind::Secret => secret::execute(ctx),
            ScannerKind::DependencyAudit => dependency_audit::execute(ctx, providers.package_audit.as_ref()).await,
            ScannerKind::BreakingChanges => breaking_changes::execute(ctx),
            ScannerKind::Performance => performance::execute(ctx),
            ScannerKind::Compliance => compliance::execute(ctx),
            ScannerKind::AiReview => ai_review::execute(ctx, providers.ai_model.as_ref()).await,
        }
    }
}

/// Handles to the external providers scanners may call into. Cloned cheaply
/// (Arc) and shared across a single Coordinator invocation.
#[derive(Clone)]
pub struct Providers {
    pub package_audit: Arc<dyn PackageAuditProvider>,
    pub ai_model: Arc<dyn AiModelProvider>,
}

/// Paths the Performance and Compliance scanners skip outright: vendored,
/// generated, or minified content produces nothing but pattern-matching
/// noise.
const EXCLUDED_PATH_GLOBS: &[&str] = &[
    "**/vendor/**",
    "**/node_modules/**",
    "**/dist/**",
    "**/*.min.js",
    "**/*.lock",
    "**/*-lock.json",
];

/// Whether `path` matches one of the scanner-wide exclusion globs. Patterns
/// that fail to compile are skipped rather than panicking a scan.
pub fn is_excluded_path(path: &str) -> bool {
    EXCLUDED_PATH_GLOBS.iter().any(|pattern| {
        glob::Pattern::new(pattern).map(|p| p.matches(path)).unwrap_or(false)
    })
}

#[cfg(test)]
mod exclusion_tests {
    use super::is_excluded_path;

    #[test]
    fn excludes_vendor_and_lock_paths() {
        assert!(is_excluded_path("third_party/vendor/lib.js"));
        assert!(is_excluded_path("web/dist/bundle.min.js"));
        assert!(is_excluded_path("yarn.lock"));
    }

    #[test]
    fn keeps_ordinary_source_paths() {
        assert!(!is_excluded_path("src/handlers/user.ts"));
    }
}
