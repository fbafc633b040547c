//! Breaking Changes: post-execution scanner, default severity Warn.
//!
//! Regex-level extraction of the public export surface, diffed between the
//! pre- and post-content of each modified file.

use crate::finding::Finding;
use crate::types::Context;
use regex::Regex;
use similar::TextDiff;
use std::collections::HashMap;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
struct ExportedFn {
    params: Vec<String>,
    return_type: Option<String>,
}

/// An `interface`, `class`, `type`, or typed top-level `const` export.
/// Member-by-member diffing isn't attempted — just whether the declared
/// signature text changed at all.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ExportedDecl {
    kind: &'static str,
    signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ExportEntry {
    Function(ExportedFn),
    Declaration(ExportedDecl),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Severity {
    Critical,
    Moderate,
    Minor,
}

fn fn_regex() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| {
        Regex::new(r"export\s+(?:async\s+)?function\s+(\w+)\s*\(([^)]*)\)\s*(?::\s*([\w<>\[\],\s|]+?))?\s*\{")
            .expect("export fn regex must compile")
    })
}

/// Matches `export interface Foo ...{` and `export class Foo ...{`,
/// capturing the kind, the name, and any `extends`/`implements` clause.
fn interface_or_class_regex() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| {
        Regex::new(r"export\s+(?:abstract\s+)?(interface|class)\s+(\w+)([^{]*)\{")
            .expect("export interface/class regex must compile")
    })
}

/// Matches `export type Foo = ...;`.
fn type_alias_regex() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| {
        Regex::new(r"export\s+type\s+(\w+)(?:<[^>]*>)?\s*=\s*([^;]+);").expect("export type regex must compile")
    })
}

/// Matches a typed top-level `export const Foo: SomeType = ...`. Constants
/// with no type annotation are out of scope, matching the feature surface
/// this scanner covers.
fn const_regex() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| {
        Regex::new(r"export\s+const\s+(\w+)\s*:\s*([\w<>\[\],.\s|]+?)\s*=").expect("export const regex must compile")
    })
}

fn extract_exports(content: &str) -> HashMap<String, ExportEntry> {
    let mut exports = HashMap::new();

    for caps in fn_regex().captures_iter(content) {
        let name = caps[1].to_string();
        let params_raw = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        let params: Vec<String> = if params_raw.trim().is_empty() {
            vec![]
        } else {
            params_raw.split(',').map(|p| p.trim().to_string()).collect()
        };
        let return_type = caps.get(3).map(|m| m.as_str().trim().to_string());
        exports.insert(name, ExportEntry::Function(ExportedFn { params, return_type }));
    }

    for caps in interface_or_class_regex().captures_iter(content) {
        let kind = if &caps[1] == "interface" { "interface" } else { "class" };
        let name = caps[2].to_string();
        let signature = caps.get(3).map(|m| m.as_str().trim().to_string()).unwrap_or_default();
        exports.insert(name, ExportEntry::Declaration(ExportedDecl { kind, signature }));
    }

    for caps in type_alias_regex().captures_iter(content) {
        let name = caps[1].to_string();
        let signature = caps[2].trim().to_string();
        exports.insert(name, ExportEntry::Declaration(ExportedDecl { kind: "type", signature }));
    }

    for caps in const_regex().captures_iter(content) {
        let name = caps[1].to_string();
        let signature = caps[2].trim().to_string();
        exports.insert(name, ExportEntry::Declaration(ExportedDecl { kind: "const", signature }));
    }

    exports
}

fn param_is_optional(param: &str) -> bool {
    param.contains('?') || param.contains('=')
}

fn param_type(param: &str) -> Option<&str> {
    param.split(':').nth(1).map(str::trim)
}

fn classify_signature_change(before: &ExportedFn, after: &ExportedFn) -> Option<(Severity, String)> {
    if before == after {
        return None;
    }

    if after.params.len() < before.params.len() {
        return Some((Severity::Critical, "parameter removed".to_string()));
    }

    let required_added = after.params.len() > before.params.len()
        && after.params[before.params.len()..].iter().any(|p| !param_is_optional(p));
    if required_added {
        return Some((Severity::Critical, "required parameter added".to_string()));
    }

    if before.return_type != after.return_type {
        return Some((Severity::Moderate, "return type changed".to_string()));
    }

    for (b, a) in before.params.iter().zip(after.params.iter()) {
        if param_type(b) != param_type(a) {
            return Some((Severity::Moderate, "parameter type changed at same position".to_string()));
        }
    }

    if after.params.len() > before.params.len() {
        return Some((Severity::Minor, "optional parameter added at tail".to_string()));
    }

    Some((Severity::Minor, "formatting-only signature change".to_string()))
}

fn classify_entry_change(before: &ExportEntry, after: &ExportEntry) -> Option<(Severity, String)> {
    match (before, after) {
        (ExportEntry::Function(b), ExportEntry::Function(a)) => classify_signature_change(b, a),
        (ExportEntry::Declaration(b), ExportEntry::Declaration(a)) => {
            if b == a {
                None
            } else if b.kind != a.kind {
                Some((Severity::Critical, format!("export kind changed from {} to {}", b.kind, a.kind)))
            } else {
                Some((Severity::Moderate, format!("{} signature changed", b.kind)))
            }
        }
        _ => Some((Severity::Critical, "export kind changed".to_string())),
    }
}

pub fn execute(ctx: &Context) -> Finding {
    let Some(change_set) = ctx.change_set() else {
        return Finding::skipped("breaking_changes", "no change set available pre-execution");
    };

    let mut details = Vec::new();
    let mut any_critical = false;

    for change in change_set.changes() {
        let Some(before_content) = ctx.original_content(&change.path) else {
            continue;
        };

        // A file whose content is near-identical to its pre-image is
        // vanishingly unlikely to have changed its export surface; skip the
        // regex extraction pass entirely for that common case.
        let similarity = TextDiff::from_lines(before_content, &change.new_content).ratio();
        if similarity >= 0.999 {
            continue;
        }

        let before = extract_exports(before_content);
        let after = extract_exports(&change.new_content);

        for (name, before_export) in &before {
            match after.get(name) {
                None => {
                    any_critical = true;
                    details.push(format!("{}: removed export `{}`", change.path, name));
                }
                Some(after_export) => {
                    if let Some((severity, reason)) = classify_entry_change(before_export, after_export) {
                        if severity == Severity::Critical {
                            any_critical = true;
                        }
                        let detail = if reason == "formatting-only signature change" {
                            format!("{}: `{}` {} (content similarity {:.3})", change.path, name, reason, similarity)
                        } else {
                            format!("{}: `{}` {} ({:?})", change.path, name, reason, severity)
                        };
                        details.push(detail);
                    }
                }
            }
        }
    }

    if details.is_empty() {
        return Finding::passed("breaking_changes", "no breaking changes detected");
    }

    // Critical export-surface findings roll up to Warning, not Block, at
    // default severity — the registry's configured severity for this
    // scanner governs the actual pipeline effect.
    let message = if any_critical {
        "breaking change(s) detected in exported surface".to_string()
    } else {
        "non-critical export surface change(s) detected".to_string()
    };

    Finding::warning(
        "breaking_changes",
        message,
        details,
        vec!["confirm downstream callers are updated before merging".to_string()],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Change, ChangeSet};
    use std::collections::HashMap;
    use std::path::PathBuf;

    #[test]
    fn removed_required_parameter_is_warning_with_detail() {
        let before = "export function process(id: string): User {\n  return lookup(id);\n}\n";
        let after = "export function process(): User {\n  return lookup();\n}\n";

        let mut originals = HashMap::new();
        originals.insert("src/user.ts".to_string(), before.to_string());

        let ctx = Context::pre_execution("t", PathBuf::from("/repo"), originals).with_change_set(ChangeSet::new(vec![Change {
            path: "src/user.ts".to_string(),
            new_content: after.to_string(),
            explanation: String::new(),
        }]));

        let finding = execute(&ctx);
        assert_eq!(finding.status, crate::finding::Status::Warning);
        assert!(!finding.is_blocking());
        assert!(finding.detail_lines.iter().any(|l| l.contains("process")));
    }

    #[test]
    fn identical_content_skips_export_extraction() {
        let content = "export function process(id: string): User {\n  return lookup(id);\n}\n";

        let mut originals = HashMap::new();
        originals.insert("src/user.ts".to_string(), content.to_string());

        let ctx = Context::pre_execution("t", PathBuf::from("/repo"), originals).with_change_set(ChangeSet::new(vec![Change {
            path: "src/user.ts".to_string(),
            new_content: content.to_string(),
            explanation: String::new(),
        }]));

        let finding = execute(&ctx);
        assert_eq!(finding.status, crate::finding::Status::Passed);
    }

    #[test]
    fn removed_interface_class_type_and_const_are_critical() {
        let before = concat!(
            "export interface User {\n  id: string;\n}\n",
            "export class Repo {\n  find() {}\n}\n",
            "export type Id = string;\n",
            "export const LIMIT: number = 10;\n",
        );
        let after = "export const unrelated: string = \"x\";\n";

        let mut originals = HashMap::new();
        originals.insert("src/api.ts".to_string(), before.to_string());

        let ctx = Context::pre_execution("t", PathBuf::from("/repo"), originals).with_change_set(ChangeSet::new(vec![Change {
            path: "src/api.ts".to_string(),
            new_content: after.to_string(),
            explanation: String::new(),
        }]));

        let finding = execute(&ctx);
        assert_eq!(finding.status, crate::finding::Status::Warning);
        for name in ["User", "Repo", "Id", "LIMIT"] {
            assert!(
                finding.detail_lines.iter().any(|l| l.contains(&format!("removed export `{name}`"))),
                "expected a removed-export detail for `{name}`, got {:?}",
                finding.detail_lines
            );
        }
    }

    #[test]
    fn changed_interface_body_is_reported_as_moderate() {
        let before = "export interface User {\n  id: string;\n}\n";
        let after = "export interface User extends Base {\n  id: string;\n}\n";

        let mut originals = HashMap::new();
        originals.insert("src/api.ts".to_string(), before.to_string());

        let ctx = Context::pre_execution("t", PathBuf::from("/repo"), originals).with_change_set(ChangeSet::new(vec![Change {
            path: "src/api.ts".to_string(),
            new_content: after.to_string(),
            explanation: String::new(),
        }]));

        let finding = execute(&ctx);
        assert_eq!(finding.status, crate::finding::Status::Warning);
        assert!(finding.detail_lines.iter().any(|l| l.contains("interface signature changed")));
    }

    #[test]
    fn skipped_without_change_set() {
        let ctx = Context::pre_execution("t", PathBuf::from("/repo"), HashMap::new());
        assert_eq!(execute(&ctx).status, crate::finding::Status::Skipped);
    }
}
