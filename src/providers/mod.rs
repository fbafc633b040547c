//! External collaborator interfaces.
//!
//! Each provider is an abstract capability, not a concrete vendor: the
//! Registry and Coordinator hold `Box<dyn Trait>` handles so tests can swap
//! in fakes without touching git, a container runtime, or a network.

pub mod ai_model;
pub mod cargo_audit;
pub mod container;
pub mod git;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// `{ severity, title, package, version, patched_versions, recommendation }`
/// as returned by the Package-Audit Provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnerabilityRecord {
    pub severity: AuditSeverity,
    pub title: String,
    pub package: String,
    pub version: String,
    pub patched_versions: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    Critical,
    High,
    Moderate,
    Low,
    Info,
}

/// Given a repository path, return vulnerability records for its manifest.
#[async_trait]
pub trait PackageAuditProvider: Send + Sync {
    async fn audit(&self, repo: &std::path::Path) -> crate::error::Result<Vec<VulnerabilityRecord>>;
}

/// `{ line, severity, message, category }` issue reported by the AI reviewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewIssue {
    pub line: u32,
    pub severity: ReviewSeverity,
    pub message: String,
    pub category: ReviewCategory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewSeverity {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewCategory {
    Security,
    Bug,
    Performance,
    Quality,
    Documentation,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewResponse {
    #[serde(default)]
    pub issues: Vec<ReviewIssue>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

/// Given `{ system_prompt, user_prompt, max_tokens }`, return the raw
/// provider response body. Extraction/tolerance of surrounding prose is the
/// caller's job (see `scanners::ai_review`), not the provider's.
#[async_trait]
pub trait AiModelProvider: Send + Sync {
    async fn review(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
    ) -> crate::error::Result<String>;
}

/// Abstract version-control capability. All arguments are passed as
/// structured arrays to the underlying implementation — never concatenated
/// into a shell string — so shell-metacharacter injection is structurally
/// impossible.
pub trait WorkingTreeProvider: Send + Sync {
    fn current_branch(&self) -> crate::error::Result<String>;
    fn current_commit(&self) -> crate::error::Result<String>;
    fn create_branch(&self, name: &str, from_ref: &str) -> crate::error::Result<()>;
    fn hard_reset(&self, to_ref: &str) -> crate::error::Result<()>;
    fn changed_files(&self, from_ref: &str, to_ref: &str) -> crate::error::Result<Vec<String>>;
    fn stash(&self, label: &str) -> crate::error::Result<bool>;
    fn prune_worktrees(&self) -> crate::error::Result<()>;
}

/// Result of running code or a test command inside (or, on fallback,
/// outside) the isolated executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub execution_time: std::time::Duration,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ContainerLimits {
    pub cpu_fraction: f64,
    pub memory_bytes: u64,
    pub timeout: std::time::Duration,
    pub network_isolation: bool,
}

/// Abstract isolated code-execution capability. The "read-only mount of
/// the temp directory at a fixed workspace path" lives here; the
/// cleanup-guarantee and local-fallback policy live one layer up in
/// `crate::sandbox`.
#[async_trait]
pub trait ContainerRuntimeProvider: Send + Sync {
    /// Short-timeout liveness probe; `false` triggers the local fallback.
    async fn ping(&self) -> bool;

    async fn run(
        &self,
        image: &str,
        workdir: &std::path::Path,
        command: &[String],
        limits: &ContainerLimits,
    ) -> crate::error::Result<ExecResult>;
}
