use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use sge::checkpoint::CheckpointManager;
use sge::config;
use sge::coordinator::{Coordinator, TaskExecutor};
use sge::finding::PipelineResult;
use sge::providers::ai_model::CliAiModelProvider;
use sge::providers::cargo_audit::CargoAuditProvider;
use sge::providers::git::Git2WorkingTreeProvider;
use sge::scanners::Providers;
use sge::types::{Change, ChangeSet, Context as SgeContext};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "sge", version, about = "Safety Guardrail Engine")]
enum Cli {
    /// Run both pipeline phases against a Change Set file
    Audit {
        /// Repository working tree
        repository: PathBuf,

        /// JSON file containing an array of `{ path, new_content, explanation }`
        changeset: PathBuf,

        /// Task description recorded on the Context
        #[arg(long, default_value = "")]
        task: String,
    },

    /// Checkpoint management
    #[command(subcommand)]
    Checkpoint(CheckpointCmd),

    /// Roll back a repository to a checkpoint
    Rollback {
        repository: PathBuf,
        checkpoint_id: String,
    },

    /// Start as MCP server for native orchestrator integration
    Serve,

    /// Show effective configuration for a repository
    Info {
        #[arg(default_value = ".")]
        repository: PathBuf,
    },
}

#[derive(clap::Subcommand)]
enum CheckpointCmd {
    Create {
        repository: PathBuf,
        #[arg(long, default_value = "manual checkpoint")]
        description: String,
    },
    List {
        repository: PathBuf,
    },
    Delete {
        repository: PathBuf,
        checkpoint_id: String,
    },
    Cleanup {
        repository: PathBuf,
        /// Remove checkpoints older than this many days
        days: i64,
    },
}

/// A `TaskExecutor` for the CLI front-end: the Change Set is read once from
/// a file rather than produced by a live orchestrator — planning tasks and
/// generating edits is out of scope here.
struct StaticChangeSetExecutor {
    change_set: ChangeSet,
}

#[async_trait::async_trait]
impl TaskExecutor for StaticChangeSetExecutor {
    async fn execute(&self, _ctx: &SgeContext) -> sge::error::Result<ChangeSet> {
        Ok(self.change_set.clone())
    }
}

fn default_providers() -> Providers {
    Providers {
        package_audit: Arc::new(CargoAuditProvider),
        ai_model: Arc::new(CliAiModelProvider::new("claude")),
    }
}

fn print_pipeline_result(label: &str, result: &PipelineResult) {
    let verdict = if result.should_block {
        "BLOCKED".red().bold()
    } else if result.findings.iter().any(|f| f.status == sge::finding::Status::Warning) {
        "WARN".yellow().bold()
    } else {
        "PASS".green().bold()
    };
    println!("{label}: {verdict}");
    for finding in &result.findings {
        println!("  [{:?}/{:?}] {}: {}", finding.status, finding.severity, finding.scanner_id, finding.message);
        for line in &finding.detail_lines {
            println!("    {line}");
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("sge=info".parse().unwrap()))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli {
        Cli::Audit { repository, changeset, task } => {
            let raw = std::fs::read_to_string(&changeset)
                .with_context(|| format!("reading change set from {}", changeset.display()))?;
            let changes: Vec<Change> = serde_json::from_str(&raw).context("parsing change set JSON")?;

            let cfg = config::build_config(&repository)?;
            let effective = cfg.effective_for_repo(&repository.to_string_lossy());

            let provider = Git2WorkingTreeProvider::open(&repository).context("opening repository")?;
            let checkpoint_manager = CheckpointManager::new(Box::new(provider), &repository)?;

            let coordinator = Coordinator::new(
                effective,
                default_providers(),
                checkpoint_manager,
                Box::new(StaticChangeSetExecutor { change_set: ChangeSet::new(changes) }),
            )?;

            let result = coordinator.run_task(&task, repository.clone(), HashMap::new()).await?;

            if let Some(pre) = &result.pre_execution {
                print_pipeline_result("pre-execution", pre);
            }
            if let Some(post) = &result.post_execution {
                print_pipeline_result("post-execution", post);
            }
            if let Some(rollback) = &result.rollback {
                println!(
                    "rollback: triggered={} success={:?}",
                    rollback.triggered,
                    rollback.result.as_ref().map(|r| r.success)
                );
            }

            std::process::exit(if result.should_block() {
                2
            } else if !result.passed() {
                1
            } else {
                0
            });
        }

        Cli::Checkpoint(cmd) => match cmd {
            CheckpointCmd::Create { repository, description } => {
                let provider = Git2WorkingTreeProvider::open(&repository)?;
                let manager = CheckpointManager::new(Box::new(provider), &repository)?;
                let checkpoint = manager.create_checkpoint(&repository.to_string_lossy(), &description, vec![], HashMap::new())?;
                println!("created checkpoint {} at {}", checkpoint.id, checkpoint.commit_ref);
            }
            CheckpointCmd::List { repository } => {
                let provider = Git2WorkingTreeProvider::open(&repository)?;
                let manager = CheckpointManager::new(Box::new(provider), &repository)?;
                for checkpoint in manager.list() {
                    println!("{} | {} | {} | {}", checkpoint.id, checkpoint.created_at.to_rfc3339(), checkpoint.commit_ref, checkpoint.description);
                }
            }
            CheckpointCmd::Delete { repository, checkpoint_id } => {
                let provider = Git2WorkingTreeProvider::open(&repository)?;
                let manager = CheckpointManager::new(Box::new(provider), &repository)?;
                let removed = manager.delete(&checkpoint_id)?;
                println!("{}", if removed { "deleted" } else { "not found" });
            }
            CheckpointCmd::Cleanup { repository, days } => {
                let provider = Git2WorkingTreeProvider::open(&repository)?;
                let manager = CheckpointManager::new(Box::new(provider), &repository)?;
                let removed = manager.cleanup(days)?;
                println!("removed {removed} checkpoint(s) older than {days} day(s)");
            }
        },

        Cli::Rollback { repository, checkpoint_id } => {
            let provider = Git2WorkingTreeProvider::open(&repository)?;
            let manager = CheckpointManager::new(Box::new(provider), &repository)?;
            let result = manager.rollback(&checkpoint_id)?;
            if result.success {
                println!("rolled back to {checkpoint_id}");
            } else {
                eprintln!("rollback failed: {}", result.error.unwrap_or_default());
                std::process::exit(2);
            }
        }

        Cli::Serve => {
            sge::mcp::serve().await?;
        }

        Cli::Info { repository } => {
            let cfg = config::build_config(&repository)?;
            let effective = cfg.effective_for_repo(&repository.to_string_lossy());
            println!("guardrails:");
            for kind in sge::scanners::ScannerKind::ALL {
                let over = effective.guardrails.get(kind.id());
                let enabled = over.map_or(true, |o| o.enabled);
                let severity = over.map_or(kind.default_severity(), |o| o.severity);
                println!("  {:<18} enabled={enabled} severity={severity:?}", kind.id());
            }
            println!(
                "rollback: enabled={} auto_rollback_on_block={} create_checkpoints={}",
                effective.rollback.enabled, effective.rollback.auto_rollback_on_block, effective.rollback.create_checkpoints
            );
            println!(
                "sandbox: enabled={} image={} cpu_fraction={} memory_bytes={} timeout={:?} network_isolation={}",
                effective.sandbox.enabled,
                effective.sandbox.image,
                effective.sandbox.cpu_fraction,
                effective.sandbox.memory_bytes,
                effective.sandbox.timeout,
                effective.sandbox.network_isolation,
            );
        }
    }

    Ok(())
}
