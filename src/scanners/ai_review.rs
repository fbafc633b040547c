//! AI Code Review: post-execution scanner, default severity Warn.

use crate::finding::Finding;
use crate::providers::{AiModelProvider, ReviewCategory, ReviewResponse, ReviewSeverity};
use crate::types::Context;

const SYSTEM_PROMPT: &str = "You are a code reviewer. Respond with a JSON object: \
    {\"issues\": [{\"line\": N, \"severity\": \"critical|high|medium|low\", \"message\": \"...\", \
    \"category\": \"security|bug|performance|quality|documentation\"}], \"suggestions\": [\"...\"]}.";

/// Extracts the first `{ ... }` block from `body`, tolerating surrounding
/// prose or markdown fencing.
fn extract_json_object(body: &str) -> Option<&str> {
    let start = body.find('{')?;
    let mut depth = 0i32;
    for (offset, ch) in body[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&body[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

pub async fn execute(ctx: &Context, provider: &dyn AiModelProvider) -> Finding {
    let Some(change_set) = ctx.change_set() else {
        return Finding::skipped("ai_review", "no change set available pre-execution");
    };

    let mut all_details = Vec::new();
    let mut all_suggestions = Vec::new();
    let mut any_critical = false;
    let mut any_high_or_medium = false;
    let mut any_parsed = false;

    for change in change_set.changes() {
        let user_prompt = format!(
            "Review the following change to `{}`:\n\n{}",
            change.path, change.new_content
        );

        let body = match provider.review(SYSTEM_PROMPT, &user_prompt, 2048).await {
            Ok(body) => body,
            Err(_) => continue,
        };

        let Some(json_slice) = extract_json_object(&body) else {
            continue;
        };

        let Ok(response) = serde_json::from_str::<ReviewResponse>(json_slice) else {
            continue;
        };

        any_parsed = true;
        for issue in &response.issues {
            match issue.severity {
                ReviewSeverity::Critical => any_critical = true,
                ReviewSeverity::High | ReviewSeverity::Medium => any_high_or_medium = true,
                ReviewSeverity::Low => {}
            }
            all_details.push(format!(
                "{}:{} [{:?}/{:?}] {}",
                change.path, issue.line, issue.severity, issue.category, issue.message
            ));
        }
        all_suggestions.extend(response.suggestions.clone());
    }

    if !any_parsed {
        return Finding::skipped("ai_review", "AI provider response unparsable or unavailable");
    }

    if any_critical {
        return Finding::failed(
            "ai_review",
            crate::finding::Severity::Block,
            "critical issue(s) reported by AI review",
            all_details,
            all_suggestions,
        );
    }

    if any_high_or_medium {
        return Finding::warning("ai_review", "issue(s) reported by AI review", all_details, all_suggestions);
    }

    Finding::passed("ai_review", "no significant issues reported")
}

#[allow(dead_code)]
fn category_label(c: ReviewCategory) -> &'static str {
    match c {
        ReviewCategory::Security => "security",
        ReviewCategory::Bug => "bug",
        ReviewCategory::Performance => "performance",
        ReviewCategory::Quality => "quality",
        ReviewCategory::Documentation => "documentation",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Change, ChangeSet};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::PathBuf;

    struct FakeProvider(String);

    #[async_trait]
    impl AiModelProvider for FakeProvider {
        async fn review(&self, _s: &str, _u: &str, _m: u32) -> crate::error::Result<String> {
            Ok(self.0.clone())
        }
    }

    fn ctx() -> Context {
        Context::pre_execution("t", PathBuf::from("/repo"), HashMap::new()).with_change_set(ChangeSet::new(vec![Change {
            path: "src/a.ts".to_string(),
            new_content: "const x = 1;".to_string(),
            explanation: String::new(),
        }]))
    }

    #[tokio::test]
    async fn skips_on_non_json_body() {
        let provider = FakeProvider("I couldn't review this, sorry.".to_string());
        let finding = execute(&ctx(), &provider).await;
        assert_eq!(finding.status, crate::finding::Status::Skipped);
        assert!(!finding.is_blocking());
    }

    #[tokio::test]
    async fn extracts_json_despite_surrounding_prose() {
        let body = "Here you go:\n```json\n{\"issues\": [{\"line\": 1, \"severity\": \"critical\", \"message\": \"sql injection\", \"category\": \"security\"}], \"suggestions\": [\"parameterize\"]}\n```\nLet me know if you need more.";
        let provider = FakeProvider(body.to_string());
        let finding = execute(&ctx(), &provider).await;
        assert!(finding.is_blocking());
        assert!(finding.detail_lines[0].contains("sql injection"));
    }
}
