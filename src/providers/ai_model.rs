//! AI Model Provider: shells out to an agent CLI and reads its reply back
//! from stdout.

use super::AiModelProvider;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

/// Shells out to a CLI agent, feeding it the system+user prompt on stdin and
/// reading its reply from stdout. No retry/watchdog logic here — a provider
/// failure degrades the calling scanner to `Skipped`, it never crashes the
/// coordinator.
pub struct CliAiModelProvider {
    pub command: String,
    pub timeout: Duration,
}

impl CliAiModelProvider {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            timeout: Duration::from_secs(60),
        }
    }
}

#[async_trait]
impl AiModelProvider for CliAiModelProvider {
    async fn review(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
    ) -> crate::error::Result<String> {
        let mut cmd = Command::new(&self.command);
        cmd.arg("-p")
            .arg(user_prompt)
            .arg("--system-prompt")
            .arg(system_prompt)
            .arg("--max-tokens")
            .arg(max_tokens.to_string())
            .arg("--output-format")
            .arg("text")
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| crate::error::SgeError::Provider {
            provider: "ai_model",
            message: format!("failed to spawn {}: {e}", self.command),
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.shutdown().await;
        }

        let output = timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| crate::error::SgeError::Provider {
                provider: "ai_model",
                message: "timed out awaiting review response".to_string(),
            })?
            .map_err(|e| crate::error::SgeError::Provider {
                provider: "ai_model",
                message: e.to_string(),
            })?;

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
