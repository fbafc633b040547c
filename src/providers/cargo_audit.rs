//! Package-Audit Provider: shells out to `cargo audit --json` and parses
//! both on-the-wire report shapes RustSec has used historically.

use super::{AuditSeverity, PackageAuditProvider, VulnerabilityRecord};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tokio::process::Command;

pub struct CargoAuditProvider;

#[async_trait]
impl PackageAuditProvider for CargoAuditProvider {
    async fn audit(&self, repo: &Path) -> crate::error::Result<Vec<VulnerabilityRecord>> {
        let output = Command::new("cargo")
            .arg("audit")
            .arg("--json")
            .current_dir(repo)
            .output()
            .await
            .map_err(|e| crate::error::SgeError::Provider {
                provider: "cargo_audit",
                message: e.to_string(),
            })?;

        parse_report(&output.stdout)
    }
}

/// `cargo audit --json` wraps both shapes under `vulnerabilities`: the
/// modern form is `{ found, list: [...] }`; older releases emitted a flat
/// `advisories` map keyed by advisory id. We accept either.
#[derive(Debug, Deserialize)]
struct AuditReport {
    vulnerabilities: Option<VulnerabilitiesSection>,
    advisories: Option<HashMap<String, AdvisoryEntry>>,
}

#[derive(Debug, Deserialize)]
struct VulnerabilitiesSection {
    #[serde(default)]
    list: Vec<VulnerabilityEntry>,
}

#[derive(Debug, Deserialize)]
struct VulnerabilityEntry {
    package: PackageRef,
    advisory: AdvisoryInfo,
}

#[derive(Debug, Deserialize)]
struct PackageRef {
    name: String,
    version: String,
}

#[derive(Debug, Deserialize)]
struct AdvisoryInfo {
    title: String,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    patched_versions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AdvisoryEntry {
    package: String,
    version: String,
    title: String,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    patched_versions: Vec<String>,
}

fn parse_severity(raw: Option<&str>) -> AuditSeverity {
    match raw.map(str::to_lowercase).as_deref() {
        Some("critical") => AuditSeverity::Critical,
        Some("high") => AuditSeverity::High,
        Some("medium") | Some("moderate") => AuditSeverity::Moderate,
        Some("low") => AuditSeverity::Low,
        _ => AuditSeverity::Info,
    }
}

fn parse_report(raw: &[u8]) -> crate::error::Result<Vec<VulnerabilityRecord>> {
    let report: AuditReport = serde_json::from_slice(raw)?;
    let mut records = Vec::new();

    if let Some(section) = report.vulnerabilities {
        for entry in section.list {
            records.push(VulnerabilityRecord {
                severity: parse_severity(entry.advisory.severity.as_deref()),
                title: entry.advisory.title,
                package: entry.package.name,
                version: entry.package.version,
                patched_versions: entry.advisory.patched_versions.join(", "),
                recommendation: "upgrade to a patched version".to_string(),
            });
        }
    }

    if let Some(advisories) = report.advisories {
        for (_, entry) in advisories {
            records.push(VulnerabilityRecord {
                severity: parse_severity(entry.severity.as_deref()),
                title: entry.title,
                package: entry.package,
                version: entry.version,
                patched_versions: entry.patched_versions.join(", "),
                recommendation: "upgrade to a patched version".to_string(),
            });
        }
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_modern_vulnerabilities_shape() {
        let raw = br#"{
            "vulnerabilities": {
                "found": true,
                "list": [{
                    "package": { "name": "foo", "version": "0.1.0" },
                    "advisory": { "title": "bad thing", "severity": "critical", "patched_versions": [">=0.2.0"] }
                }]
            }
        }"#;
        let records = parse_report(raw).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].severity, AuditSeverity::Critical);
        assert_eq!(records[0].package, "foo");
    }

    #[test]
    fn parses_legacy_advisories_shape() {
        let raw = br#"{
            "advisories": {
                "RUSTSEC-2020-0001": {
                    "package": "bar", "version": "1.0.0", "title": "legacy bad thing",
                    "severity": "high", "patched_versions": [">=1.1.0"]
                }
            }
        }"#;
        let records = parse_report(raw).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].severity, AuditSeverity::High);
        assert_eq!(records[0].package, "bar");
    }
}
