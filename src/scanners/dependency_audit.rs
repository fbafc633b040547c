//! Dependency Audit: post-execution scanner, default severity Warn.

use crate::finding::{Finding, Severity, Status};
use crate::providers::{AuditSeverity, PackageAuditProvider};
use crate::types::Context;

pub async fn execute(ctx: &Context, provider: &dyn PackageAuditProvider) -> Finding {
    let Some(change_set) = ctx.change_set() else {
        return Finding::skipped("dependency_audit", "no change set available pre-execution");
    };

    if !change_set.touches_dependency_manifests() {
        return Finding::skipped("dependency_audit", "no dependency manifest touched");
    }

    let records = match provider.audit(&ctx.repository).await {
        Ok(records) => records,
        Err(e) => {
            return Finding {
                scanner_id: "dependency_audit".to_string(),
                status: Status::Skipped,
                severity: Severity::Warn,
                message: format!("audit provider unavailable: {e}"),
                detail_lines: vec![],
                suggestion_lines: vec![],
                execution_time: std::time::Duration::ZERO,
            };
        }
    };

    let any_critical = records.iter().any(|r| r.severity == AuditSeverity::Critical);
    let any_high_or_moderate = records
        .iter()
        .any(|r| matches!(r.severity, AuditSeverity::High | AuditSeverity::Moderate));

    let details: Vec<String> = records
        .iter()
        .map(|r| format!("{}@{}: {} (patched: {})", r.package, r.version, r.title, r.patched_versions))
        .collect();

    if any_critical {
        let critical_titles: Vec<String> = records
            .iter()
            .filter(|r| r.severity == AuditSeverity::Critical)
            .map(|r| format!("{} ({}@{})", r.title, r.package, r.version))
            .collect();
        return Finding::failed(
            "dependency_audit",
            Severity::Block,
            format!("{} critical vulnerabilit(y/ies) found", critical_titles.len()),
            details,
            vec!["upgrade the affected package to a patched version".to_string()],
        );
    }

    if any_high_or_moderate {
        return Finding::warning(
            "dependency_audit",
            "high or moderate severity vulnerabilities found",
            details,
            vec!["review and upgrade flagged packages".to_string()],
        );
    }

    if records.is_empty() {
        return Finding::passed("dependency_audit", "no known vulnerabilities");
    }

    Finding {
        scanner_id: "dependency_audit".to_string(),
        status: Status::Passed,
        severity: Severity::Info,
        message: "only low/info severity advisories found".to_string(),
        detail_lines: details,
        suggestion_lines: vec![],
        execution_time: std::time::Duration::ZERO,
    }
}
