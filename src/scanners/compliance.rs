//! Compliance: post-execution scanner, default severity Warn.
//!
//! Pattern-based scan keyed to regulation families (GDPR, SOC2, HIPAA,
//! CCPA), evaluated over a sliding window of surrounding lines rather than
//! the whole file, so a nearby audit-log call or hash token clears a flag.

use crate::finding::Finding;
use crate::types::Context;
use regex::Regex;
use std::sync::OnceLock;

const WINDOW: usize = 8;

struct Rules {
    pii: Regex,
    encryption_token: Regex,
    sensitive_op: Regex,
    audit_log_token: Regex,
    user_data_type: Regex,
    deletion_capability: Regex,
    password_field: Regex,
    hashing_token: Regex,
    data_storage_creation: Regex,
    retention_token: Regex,
    user_data_collection: Regex,
    consent_token: Regex,
    http_route: Regex,
    auth_token: Regex,
}

fn rules() -> &'static Rules {
    static CELL: OnceLock<Rules> = OnceLock::new();
    CELL.get_or_init(|| Rules {
        pii: Regex::new(r"(?i)\b(ssn|social_security|date_of_birth|passport_number|national_id)\b").unwrap(),
        encryption_token: Regex::new(r"(?i)\b(encrypt|hash|aes|bcrypt|argon2)\b").unwrap(),
        sensitive_op: Regex::new(r"(?i)\b(update(User|Account)|delete(User|Account)|changeRole|grantPermission|revokePermission)\b").unwrap(),
        audit_log_token: Regex::new(r"(?i)\b(audit_log|auditLog|logAudit)\b").unwrap(),
        user_data_type: Regex::new(r"(?i)\b(interface|type|struct)\s+\w*User\w*").unwrap(),
        deletion_capability: Regex::new(r"(?i)\b(deleteUser|eraseUser|purgeUser|rightToErasure)\b").unwrap(),
        password_field: Regex::new(r"(?i)\bpassword\s*[:=]").unwrap(),
        hashing_token: Regex::new(r"(?i)\b(bcrypt|argon2|scrypt|pbkdf2)\b").unwrap(),
        data_storage_creation: Regex::new(r"(?i)\b(createTable|CREATE TABLE|new Schema|defineModel)\b").unwrap(),
        retention_token: Regex::new(r"(?i)\b(retention_policy|retentionPolicy|ttl|expires_at)\b").unwrap(),
        user_data_collection: Regex::new(r"(?i)\b(collectUserData|trackUser|recordUserActivity)\b").unwrap(),
        consent_token: Regex::new(r"(?i)\b(consent|optIn|opt_in)\b").unwrap(),
        http_route: Regex::new(r"(?i)\b(app|router)\.(get|post|put|patch|delete)\s*\(").unwrap(),
        auth_token: Regex::new(r"(?i)\b(authenticate|requireAuth|isAuthenticated|authorize|requireRole)\b").unwrap(),
    })
}

fn window(lines: &[&str], idx: usize) -> &[&str] {
    let start = idx.saturating_sub(WINDOW);
    let end = (idx + WINDOW + 1).min(lines.len());
    &lines[start..end]
}

fn window_contains(lines: &[&str], idx: usize, re: &Regex) -> bool {
    window(lines, idx).iter().any(|l| re.is_match(l))
}

fn file_contains(content: &str, re: &Regex) -> bool {
    re.is_match(content)
}

pub fn execute(ctx: &Context) -> Finding {
    let Some(change_set) = ctx.change_set() else {
        return Finding::skipped("compliance", "no change set available pre-execution");
    };

    let r = rules();
    let mut details = Vec::new();
    let mut suggestions = Vec::new();
    let mut any_critical = false;

    for change in change_set.changes() {
        if crate::scanners::is_excluded_path(&change.path) {
            continue;
        }
        let content = &change.new_content;
        let lines: Vec<&str> = content.lines().collect();

        for (idx, line) in lines.iter().enumerate() {
            if r.pii.is_match(line) && !window_contains(&lines, idx, &r.encryption_token) {
                details.push(format!("{}:{}: PII-like identifier without nearby encryption/hashing", change.path, idx + 1));
                suggestions.push("GDPR Art. 32 — encrypt or hash PII at rest".to_string());
            }

            if r.sensitive_op.is_match(line) && !window_contains(&lines, idx, &r.audit_log_token) {
                details.push(format!("{}:{}: sensitive mutation without nearby audit log", change.path, idx + 1));
                suggestions.push("SOC2 CC7.2 — log privileged mutations".to_string());
            }

            if r.password_field.is_match(line) && !window_contains(&lines, idx, &r.hashing_token) {
                any_critical = true;
                details.push(format!("{}:{}: password field stored without nearby hashing", change.path, idx + 1));
                suggestions.push("SOC2 CC6.1 — never store plaintext passwords".to_string());
            }

            if r.user_data_collection.is_match(line) && !window_contains(&lines, idx, &r.consent_token) {
                details.push(format!("{}:{}: user data collection without nearby consent tracking", change.path, idx + 1));
                suggestions.push("GDPR Art. 7 — record consent at collection time".to_string());
            }

            if r.http_route.is_match(line) && !window_contains(&lines, idx, &r.auth_token) {
                any_critical = true;
                details.push(format!("{}:{}: route handler without nearby auth check", change.path, idx + 1));
                suggestions.push("SOC2 CC6.1 — require authentication on every route".to_string());
            }
        }

        if r.user_data_type.is_match(content) && !file_contains(content, &r.deletion_capability) {
            any_critical = true;
            details.push(format!("{}: user-data type declared with no deletion capability in file", change.path));
            suggestions.push("GDPR Art. 17 — provide a right-to-erasure path".to_string());
        }

        if r.data_storage_creation.is_match(content) && !file_contains(content, &r.retention_token) {
            details.push(format!("{}: data storage created with no retention policy token in file", change.path));
            suggestions.push("GDPR Art. 5(1)(e) — define a retention policy".to_string());
        }
    }

    if details.is_empty() {
        return Finding::passed("compliance", "no compliance gaps detected");
    }

    let message = if any_critical {
        "critical compliance gap(s) detected".to_string()
    } else {
        "compliance gap(s) detected".to_string()
    };

    // Critical compliance findings roll up to Warning at default severity;
    // config may elevate this scanner to Block.
    Finding::warning("compliance", message, details, suggestions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Change, ChangeSet};
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn ctx_with(content: &str) -> Context {
        Context::pre_execution("t", PathBuf::from("/repo"), HashMap::new()).with_change_set(ChangeSet::new(vec![Change {
            path: "src/handlers.ts".to_string(),
            new_content: content.to_string(),
            explanation: String::new(),
        }]))
    }

    #[test]
    fn flags_password_without_hashing() {
        let ctx = ctx_with("const password = req.body.password;\nuser.password = password;\n");
        let finding = execute(&ctx);
        assert_eq!(finding.status, crate::finding::Status::Warning);
        assert!(finding.detail_lines.iter().any(|l| l.contains("password field")));
    }

    #[test]
    fn clears_flag_when_hashing_nearby() {
        let ctx = ctx_with("const password = bcrypt.hashSync(req.body.password, 10);\n");
        let finding = execute(&ctx);
        assert_eq!(finding.status, crate::finding::Status::Passed);
    }

    #[test]
    fn flags_route_without_auth() {
        let ctx = ctx_with("app.post('/users/:id', (req, res) => {\n  res.send(ok);\n});\n");
        let finding = execute(&ctx);
        assert_eq!(finding.status, crate::finding::Status::Warning);
        assert!(finding.detail_lines.iter().any(|l| l.contains("auth check")));
    }
}
