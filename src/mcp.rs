//! MCP (Model Context Protocol) server over stdio.
//!
//! Implements JSON-RPC 2.0 over newline-delimited stdin/stdout so that an
//! orchestrator can call SGE tools natively inside a session.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::checkpoint::CheckpointManager;
use crate::config;
use crate::providers::ai_model::CliAiModelProvider;
use crate::providers::cargo_audit::CargoAuditProvider;
use crate::providers::git::Git2WorkingTreeProvider;
use crate::registry::Registry;
use crate::scanners::Providers;
use crate::types::{Change, ChangeSet, Context};
use std::collections::HashMap;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// JSON-RPC 2.0 types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Option<Value>,
}

#[derive(Serialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

#[derive(Serialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

impl JsonRpcResponse {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// MCP tool definitions
// ---------------------------------------------------------------------------

fn tool_definitions() -> Value {
    serde_json::json!({
        "tools": [
            {
                "name": "sge_audit",
                "description": "Run both pre- and post-execution guardrail phases on a Change Set and report the aggregate verdict.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "repository": { "type": "string", "description": "Path to the repository working tree" },
                        "task": { "type": "string", "description": "Task description for the Context" },
                        "changes": {
                            "type": "array",
                            "description": "Proposed file edits",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "path": { "type": "string" },
                                    "new_content": { "type": "string" },
                                    "explanation": { "type": "string" }
                                },
                                "required": ["path", "new_content"]
                            }
                        }
                    },
                    "required": ["repository", "changes"]
                }
            },
            {
                "name": "sge_checkpoint_create",
                "description": "Create a checkpoint of the current working-tree commit reference.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "repository": { "type": "string" },
                        "description": { "type": "string" }
                    },
                    "required": ["repository"]
                }
            },
            {
                "name": "sge_checkpoint_list",
                "description": "List all checkpoints recorded for a repository.",
                "inputSchema": {
                    "type": "object",
                    "properties": { "repository": { "type": "string" } },
                    "required": ["repository"]
                }
            },
            {
                "name": "sge_rollback",
                "description": "Roll back a repository's working tree to a previously created checkpoint.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "repository": { "type": "string" },
                        "checkpoint_id": { "type": "string" }
                    },
                    "required": ["repository", "checkpoint_id"]
                }
            },
            {
                "name": "sge_info",
                "description": "Show the effective configuration for a repository: guardrail overrides, rollback policy, sandbox policy.",
                "inputSchema": {
                    "type": "object",
                    "properties": { "repository": { "type": "string" } },
                    "required": ["repository"]
                }
            }
        ]
    })
}

// ---------------------------------------------------------------------------
// Tool handlers
// ---------------------------------------------------------------------------

fn default_providers() -> Providers {
    Providers {
        package_audit: Arc::new(CargoAuditProvider),
        ai_model: Arc::new(CliAiModelProvider::new("claude")),
    }
}

async fn handle_sge_audit(params: &Value) -> Value {
    let Some(repository) = params.get("repository").and_then(|v| v.as_str()) else {
        return tool_error("Missing required parameter: repository");
    };
    let task = params.get("task").and_then(|v| v.as_str()).unwrap_or("").to_string();
    let repo_path = PathBuf::from(repository);

    let changes: Vec<Change> = match params.get("changes").and_then(|v| v.as_array()) {
        Some(arr) => arr
            .iter()
            .filter_map(|c| serde_json::from_value::<Change>(c.clone()).ok())
            .collect(),
        None => return tool_error("Missing required parameter: changes"),
    };

    let cfg = config::build_config(&repo_path).unwrap_or_default();
    let effective = cfg.effective_for_repo(repository);
    let registry = match Registry::with_defaults(default_providers(), &effective.guardrails) {
        Ok(r) => r,
        Err(e) => return tool_error(&format!("failed to build registry: {e}")),
    };

    let ctx = Context::pre_execution(task, repo_path, HashMap::new());
    let pre = registry.run(crate::finding::Phase::PreExecution, &ctx).await;
    if pre.should_block {
        return tool_result(&format!("Blocked at pre-execution: {} findings blocking", pre.findings.iter().filter(|f| f.is_blocking()).count()));
    }

    let post_ctx = ctx.with_change_set(ChangeSet::new(changes));
    let post = registry.run(crate::finding::Phase::PostExecution, &post_ctx).await;

    let summary = format!(
        "pre: passed={} post: passed={} should_block={}\n{}",
        pre.passed,
        post.passed,
        post.should_block,
        post.findings
            .iter()
            .map(|f| format!("  [{:?}/{:?}] {}: {}", f.status, f.severity, f.scanner_id, f.message))
            .collect::<Vec<_>>()
            .join("\n")
    );

    tool_result(&summary)
}

fn handle_sge_checkpoint_create(params: &Value) -> Value {
    let Some(repository) = params.get("repository").and_then(|v| v.as_str()) else {
        return tool_error("Missing required parameter: repository");
    };
    let description = params.get("description").and_then(|v| v.as_str()).unwrap_or("manual checkpoint");
    let repo_path = Path::new(repository);

    let provider = match Git2WorkingTreeProvider::open(repo_path) {
        Ok(p) => p,
        Err(e) => return tool_error(&format!("failed to open repository: {e}")),
    };
    let manager = match CheckpointManager::new(Box::new(provider), repo_path) {
        Ok(m) => m,
        Err(e) => return tool_error(&format!("failed to open checkpoint index: {e}")),
    };

    match manager.create_checkpoint(repository, description, vec![], HashMap::new()) {
        Ok(checkpoint) => tool_result(&format!("created checkpoint {} at {}", checkpoint.id, checkpoint.commit_ref)),
        Err(e) => tool_error(&format!("failed to create checkpoint: {e}")),
    }
}

fn handle_sge_checkpoint_list(params: &Value) -> Value {
    let Some(repository) = params.get("repository").and_then(|v| v.as_str()) else {
        return tool_error("Missing required parameter: repository");
    };
    let repo_path = Path::new(repository);

    let provider = match Git2WorkingTreeProvider::open(repo_path) {
        Ok(p) => p,
        Err(e) => return tool_error(&format!("failed to open repository: {e}")),
    };
    let manager = match CheckpointManager::new(Box::new(provider), repo_path) {
        Ok(m) => m,
        Err(e) => return tool_error(&format!("failed to open checkpoint index: {e}")),
    };

    let list = manager.list();
    if list.is_empty() {
        return tool_result("no checkpoints recorded");
    }
    let text = list
        .iter()
        .map(|c| format!("{} | {} | {} | {}", c.id, c.created_at.to_rfc3339(), c.commit_ref, c.description))
        .collect::<Vec<_>>()
        .join("\n");
    tool_result(&text)
}

fn handle_sge_rollback(params: &Value) -> Value {
    let Some(repository) = params.get("repository").and_then(|v| v.as_str()) else {
        return tool_error("Missing required parameter: repository");
    };
    let Some(checkpoint_id) = params.get("checkpoint_id").and_then(|v| v.as_str()) else {
        return tool_error("Missing required parameter: checkpoint_id");
    };
    let repo_path = Path::new(repository);

    let provider = match Git2WorkingTreeProvider::open(repo_path) {
        Ok(p) => p,
        Err(e) => return tool_error(&format!("failed to open repository: {e}")),
    };
    let manager = match CheckpointManager::new(Box::new(provider), repo_path) {
        Ok(m) => m,
        Err(e) => return tool_error(&format!("failed to open checkpoint index: {e}")),
    };

    match manager.rollback(checkpoint_id) {
        Ok(result) if result.success => tool_result(&format!("rolled back to {checkpoint_id}")),
        Ok(result) => tool_error(&result.error.unwrap_or_else(|| "rollback failed".to_string())),
        Err(e) => tool_error(&format!("rollback error: {e}")),
    }
}

fn handle_sge_info(params: &Value) -> Value {
    let repository = params.get("repository").and_then(|v| v.as_str()).unwrap_or(".");
    let cfg = config::build_config(Path::new(repository)).unwrap_or_default();
    let effective = cfg.effective_for_repo(repository);

    let text = format!(
        "Guardrail overrides: {}\nRollback: enabled={} auto_rollback_on_block={} create_checkpoints={}\nSandbox: enabled={} image={} cpu_fraction={} memory_bytes={} timeout={:?} network_isolation={}",
        effective.guardrails.len(),
        effective.rollback.enabled,
        effective.rollback.auto_rollback_on_block,
        effective.rollback.create_checkpoints,
        effective.sandbox.enabled,
        effective.sandbox.image,
        effective.sandbox.cpu_fraction,
        effective.sandbox.memory_bytes,
        effective.sandbox.timeout,
        effective.sandbox.network_isolation,
    );

    tool_result(&text)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn tool_result(text: &str) -> Value {
    serde_json::json!([{
        "type": "text",
        "text": text,
        "isError": false
    }])
}

fn tool_error(text: &str) -> Value {
    serde_json::json!([{
        "type": "text",
        "text": text,
        "isError": true
    }])
}

// ---------------------------------------------------------------------------
// JSON-RPC dispatch
// ---------------------------------------------------------------------------

async fn dispatch(req: &JsonRpcRequest) -> Option<JsonRpcResponse> {
    match req.method.as_str() {
        "initialize" => {
            let id = req.id.clone().unwrap_or(Value::Null);
            Some(JsonRpcResponse::success(
                id,
                serde_json::json!({
                    "protocolVersion": "2025-06-18",
                    "capabilities": {
                        "tools": { "listChanged": false }
                    },
                    "serverInfo": {
                        "name": "sge",
                        "version": env!("CARGO_PKG_VERSION")
                    }
                }),
            ))
        }

        "notifications/initialized" => None,

        "tools/list" => {
            let id = req.id.clone().unwrap_or(Value::Null);
            Some(JsonRpcResponse::success(id, tool_definitions()))
        }

        "tools/call" => {
            let id = req.id.clone().unwrap_or(Value::Null);
            let params = req.params.as_ref();

            let tool_name = params.and_then(|p| p.get("name")).and_then(|n| n.as_str()).unwrap_or("");
            let arguments = params.and_then(|p| p.get("arguments")).cloned().unwrap_or_else(|| serde_json::json!({}));

            let content = match tool_name {
                "sge_audit" => handle_sge_audit(&arguments).await,
                "sge_checkpoint_create" => handle_sge_checkpoint_create(&arguments),
                "sge_checkpoint_list" => handle_sge_checkpoint_list(&arguments),
                "sge_rollback" => handle_sge_rollback(&arguments),
                "sge_info" => handle_sge_info(&arguments),
                unknown => tool_error(&format!("Unknown tool: {unknown}")),
            };

            Some(JsonRpcResponse::success(id, serde_json::json!({ "content": content })))
        }

        _ => req.id.clone().map(|id| JsonRpcResponse::error(id, -32601, format!("Method not found: {}", req.method))),
    }
}

// ---------------------------------------------------------------------------
// Main serve loop
// ---------------------------------------------------------------------------

/// Run the MCP server, reading JSON-RPC from stdin and writing to stdout.
pub async fn serve() -> Result<()> {
    eprintln!("SGE MCP server starting (stdio mode)");

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();

    for line_result in stdin.lock().lines() {
        let line = match line_result {
            Ok(l) => l,
            Err(e) => {
                eprintln!("stdin read error: {e}");
                break;
            }
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let req: JsonRpcRequest = match serde_json::from_str(trimmed) {
            Ok(r) => r,
            Err(e) => {
                eprintln!("JSON parse error: {e} | input: {trimmed}");
                let resp = JsonRpcResponse::error(Value::Null, -32700, "Parse error");
                let json = serde_json::to_string(&resp).unwrap_or_default();
                let _ = writeln!(stdout, "{json}");
                let _ = stdout.flush();
                continue;
            }
        };

        if let Some(resp) = dispatch(&req).await {
            let json = serde_json::to_string(&resp).unwrap_or_default();
            writeln!(stdout, "{json}")?;
            stdout.flush()?;
        }
    }

    eprintln!("SGE MCP server shutting down");
    Ok(())
}
