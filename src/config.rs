//! Configuration.
//!
//! Layered precedence:
//!   1. CLI flags (applied by the caller after `load`)
//!   2. Environment variables
//!   3. `sge.toml` / `.sge/safety-config.json` (if present)
//!   4. Compiled defaults

use crate::finding::Severity;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Per-scanner override: enable/disable + severity escalation/demotion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailOverride {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub severity: Severity,
    #[serde(default)]
    pub options: serde_json::Value,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackConfig {
    pub enabled: bool,
    pub auto_rollback_on_block: bool,
    pub create_checkpoints: bool,
}

impl Default for RollbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_rollback_on_block: true,
            create_checkpoints: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    pub enabled: bool,
    pub image: String,
    pub cpu_fraction: f64,
    pub memory_bytes: u64,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    pub network_isolation: bool,
    pub mount_workspace: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            image: "sge-runner:latest".to_string(),
            cpu_fraction: 0.5,
            memory_bytes: 512 * 1024 * 1024,
            timeout: Duration::from_secs(60),
            network_isolation: true,
            mount_workspace: true,
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// Full Config (§3), global with optional per-repository overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub guardrails: HashMap<String, GuardrailOverride>,
    #[serde(default)]
    pub rollback: RollbackConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub per_repo_overrides: HashMap<String, PartialConfig>,
}

/// A partial config applied on top of the global config for one repository.
/// All fields optional; `None` means "inherit the global value".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartialConfig {
    #[serde(default)]
    pub guardrails: HashMap<String, GuardrailOverride>,
    pub rollback: Option<RollbackConfig>,
    pub sandbox: Option<SandboxConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            guardrails: HashMap::new(),
            rollback: RollbackConfig::default(),
            sandbox: SandboxConfig::default(),
            per_repo_overrides: HashMap::new(),
        }
    }
}

impl Config {
    /// Merge a repo's partial override on top of this global config.
    /// Per-scanner guardrail entries are merged key-by-key so a repo only
    /// needs to name the scanners it wants to change.
    pub fn effective_for_repo(&self, repo_id: &str) -> Config {
        let mut merged = self.clone();
        if let Some(partial) = self.per_repo_overrides.get(repo_id) {
            for (id, over) in &partial.guardrails {
                merged.guardrails.insert(id.clone(), over.clone());
            }
            if let Some(rollback) = &partial.rollback {
                merged.rollback = rollback.clone();
            }
            if let Some(sandbox) = &partial.sandbox {
                merged.sandbox = sandbox.clone();
            }
        }
        merged
    }
}

// ---------------------------------------------------------------------------
// TOML loader (`sge.toml`)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TomlConfig {
    #[serde(default)]
    guardrails: HashMap<String, GuardrailOverride>,
    rollback: Option<RollbackConfig>,
    sandbox: Option<SandboxConfig>,
    #[serde(default, rename = "per_repo")]
    per_repo_overrides: HashMap<String, PartialConfig>,
}

pub fn load_toml_config(path: &Path) -> crate::error::Result<Config> {
    let content = std::fs::read_to_string(path)?;
    let toml_cfg: TomlConfig = toml::from_str(&content)
        .map_err(|e| crate::error::SgeError::Configuration(format!("{}: {e}", path.display())))?;
    Ok(Config {
        guardrails: toml_cfg.guardrails,
        rollback: toml_cfg.rollback.unwrap_or_default(),
        sandbox: toml_cfg.sandbox.unwrap_or_default(),
        per_repo_overrides: toml_cfg.per_repo_overrides,
    })
}

/// Load `.sge/safety-config.json` — the machine-written alternate surface
/// (§6). A missing file is not an error; callers fall back to `sge.toml` or
/// compiled defaults.
pub fn load_json_config(path: &Path) -> crate::error::Result<Config> {
    let content = std::fs::read_to_string(path)?;
    let cfg: Config = serde_json::from_str(&content)?;
    Ok(cfg)
}

/// Apply environment variable overrides on top of a loaded config.
/// Env vars always win over file-based config.
fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("SGE_ROLLBACK_ENABLED") {
        if let Ok(b) = v.parse::<bool>() {
            cfg.rollback.enabled = b;
        }
    }
    if let Ok(v) = std::env::var("SGE_AUTO_ROLLBACK_ON_BLOCK") {
        if let Ok(b) = v.parse::<bool>() {
            cfg.rollback.auto_rollback_on_block = b;
        }
    }
    if let Ok(v) = std::env::var("SGE_SANDBOX_ENABLED") {
        if let Ok(b) = v.parse::<bool>() {
            cfg.sandbox.enabled = b;
        }
    }
    if let Ok(v) = std::env::var("SGE_SANDBOX_TIMEOUT_SECS") {
        if let Ok(secs) = v.parse::<u64>() {
            cfg.sandbox.timeout = Duration::from_secs(secs);
        }
    }
}

/// Build the effective `Config` for `repo_root`: `sge.toml` (or the legacy
/// `.sge/safety-config.json`) layered with env var overrides.
///
/// Precedence, highest wins: env vars > `sge.toml` > `.sge/safety-config.json`
/// > compiled defaults. The JSON surface is consulted only when no
/// `sge.toml` is present.
pub fn build_config(repo_root: &Path) -> crate::error::Result<Config> {
    let toml_path = repo_root.join("sge.toml");
    let json_path = repo_root.join(".sge").join("safety-config.json");

    let mut cfg = if toml_path.exists() {
        tracing::info!("loading config from {}", toml_path.display());
        load_toml_config(&toml_path)?
    } else if json_path.exists() {
        tracing::info!("loading config from {}", json_path.display());
        load_json_config(&json_path)?
    } else {
        tracing::info!("no config file found, using defaults");
        Config::default()
    };

    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let cfg = Config::default();
        assert!(cfg.rollback.enabled);
        assert!(cfg.rollback.auto_rollback_on_block);
        assert!(!cfg.sandbox.enabled);
        assert_eq!(cfg.sandbox.cpu_fraction, 0.5);
        assert_eq!(cfg.sandbox.memory_bytes, 512 * 1024 * 1024);
        assert_eq!(cfg.sandbox.timeout, Duration::from_secs(60));
    }

    #[test]
    fn per_repo_override_merges_guardrails() {
        let mut cfg = Config::default();
        cfg.guardrails.insert(
            "secret_scanner".to_string(),
            GuardrailOverride {
                enabled: true,
                severity: Severity::Block,
                options: serde_json::Value::Null,
            },
        );
        let mut partial = PartialConfig::default();
        partial.guardrails.insert(
            "secret_scanner".to_string(),
            GuardrailOverride {
                enabled: false,
                severity: Severity::Warn,
                options: serde_json::Value::Null,
            },
        );
        cfg.per_repo_overrides.insert("repo-a".to_string(), partial);

        let effective = cfg.effective_for_repo("repo-a");
        let over = &effective.guardrails["secret_scanner"];
        assert!(!over.enabled);
        assert_eq!(over.severity, Severity::Warn);

        // Unrelated repo keeps the global setting.
        let unaffected = cfg.effective_for_repo("repo-b");
        assert!(unaffected.guardrails["secret_scanner"].enabled);
    }
}
