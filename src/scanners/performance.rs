//! Performance: post-execution scanner, default severity Warn.
//!
//! Line-based heuristics over each Change's new content. All regexes here
//! are written to stay linear-time on pathological input — no nested
//! quantifiers over attacker-controlled text.

use crate::finding::Finding;
use crate::types::Context;
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Weight {
    Low,
    Medium,
    High,
}

struct Heuristics {
    loop_open: Regex,
    loop_close_window: usize,
    db_call: Regex,
    blocking_io: Regex,
    filter_then_find: Regex,
    catastrophic_regex: Regex,
    json_parse: Regex,
    debug_log: Regex,
}

fn heuristics() -> &'static Heuristics {
    static CELL: OnceLock<Heuristics> = OnceLock::new();
    CELL.get_or_init(|| Heuristics {
        loop_open: Regex::new(r"\b(for|while)\s*\(").unwrap(),
        loop_close_window: 12,
        db_call: Regex::new(r"(?i)\.(query|find|findOne|exec|execute|select)\s*\(").unwrap(),
        blocking_io: Regex::new(r"(?i)\b(readFileSync|writeFileSync|execSync|spawnSync)\s*\(").unwrap(),
        filter_then_find: Regex::new(r"\.filter\([^)]*\)\s*\.\s*find\(").unwrap(),
        // deliberately simple literal shapes, not a general regex parser
        catastrophic_regex: Regex::new(r"\(\.\*\)\+|\.\*\.\*|\([^)]*\)[*+]\([^)]*\)[*+]").unwrap(),
        json_parse: Regex::new(r"JSON\.parse\(").unwrap(),
        debug_log: Regex::new(r"(?i)console\.(log|debug)\(").unwrap(),
    })
}

/// Whether a loop header opens within `window` lines above `line_idx`.
fn inside_loop_window(lines: &[&str], line_idx: usize, window: usize) -> bool {
    let h = heuristics();
    let start = line_idx.saturating_sub(window);
    lines[start..line_idx].iter().any(|l| h.loop_open.is_match(l))
}

pub fn execute(ctx: &Context) -> Finding {
    let Some(change_set) = ctx.change_set() else {
        return Finding::skipped("performance", "no change set available pre-execution");
    };

    let h = heuristics();
    let mut details = Vec::new();
    let mut highest = None::<Weight>;

    for change in change_set.changes() {
        if crate::scanners::is_excluded_path(&change.path) {
            continue;
        }
        let lines: Vec<&str> = change.new_content.lines().collect();
        let mut loop_depth_markers = Vec::new();

        for (idx, line) in lines.iter().enumerate() {
            if h.loop_open.is_match(line) {
                loop_depth_markers.push(idx);
            }

            if h.db_call.is_match(line) && inside_loop_window(&lines, idx, h.loop_close_window) {
                details.push(format!("{}:{}: database call inside loop", change.path, idx + 1));
                highest = Some(highest.map_or(Weight::High, |w| w.max(Weight::High)));
            }

            if h.blocking_io.is_match(line) && inside_loop_window(&lines, idx, h.loop_close_window) {
                details.push(format!("{}:{}: blocking I/O call inside loop", change.path, idx + 1));
                highest = Some(highest.map_or(Weight::High, |w| w.max(Weight::High)));
            }

            if h.loop_open.is_match(line) && inside_loop_window(&lines, idx, h.loop_close_window) {
                details.push(format!("{}:{}: nested loop detected", change.path, idx + 1));
                highest = Some(highest.map_or(Weight::Medium, |w| w.max(Weight::Medium)));
            }

            if h.filter_then_find.is_match(line) {
                details.push(format!("{}:{}: chained filter-then-find over same collection", change.path, idx + 1));
                highest = Some(highest.map_or(Weight::Medium, |w| w.max(Weight::Medium)));
            }

            if h.catastrophic_regex.is_match(line) {
                details.push(format!("{}:{}: regex shape prone to catastrophic backtracking", change.path, idx + 1));
                highest = Some(highest.map_or(Weight::Medium, |w| w.max(Weight::Medium)));
            }

            if h.json_parse.is_match(line) && inside_loop_window(&lines, idx, h.loop_close_window) {
                details.push(format!("{}:{}: JSON parsing inside loop", change.path, idx + 1));
                highest = Some(highest.map_or(Weight::Medium, |w| w.max(Weight::Medium)));
            }

            if h.debug_log.is_match(line) {
                details.push(format!("{}:{}: uncommented debug logging statement", change.path, idx + 1));
                highest = Some(highest.map_or(Weight::Low, |w| w.max(Weight::Low)));
            }
        }

        let _ = loop_depth_markers;
    }

    match highest {
        None => Finding::passed("performance", "no performance issues detected"),
        Some(_) => Finding::warning(
            "performance",
            "potential performance issue(s) detected",
            details,
            vec!["review flagged lines for hot-path cost".to_string()],
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Change, ChangeSet};
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn ctx_with(content: &str) -> Context {
        Context::pre_execution("t", PathBuf::from("/repo"), HashMap::new()).with_change_set(ChangeSet::new(vec![Change {
            path: "src/a.ts".to_string(),
            new_content: content.to_string(),
            explanation: String::new(),
        }]))
    }

    #[test]
    fn detects_db_call_in_loop() {
        let ctx = ctx_with("for (const id of ids) {\n  await db.query(id);\n}\n");
        let finding = execute(&ctx);
        assert_eq!(finding.status, crate::finding::Status::Warning);
        assert!(finding.detail_lines.iter().any(|l| l.contains("database call")));
    }

    #[test]
    fn passes_clean_code() {
        let ctx = ctx_with("function add(a: number, b: number): number {\n  return a + b;\n}\n");
        let finding = execute(&ctx);
        assert_eq!(finding.status, crate::finding::Status::Passed);
    }
}
