//! Container-Runtime Provider, backed by the `docker` CLI.
//!
//! Spawn, race against a deadline, force-kill on expiry.

use super::{ContainerLimits, ContainerRuntimeProvider, ExecResult};
use async_trait::async_trait;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;

/// Same per-stream cap as the local-fallback sandbox path — the Isolated
/// Executor's 10 MiB-per-stream limit is a property of the executor as a
/// whole, not just its fallback path.
const MAX_STREAM_BYTES: usize = 10 * 1024 * 1024;

fn capped(bytes: &[u8]) -> String {
    let take = bytes.len().min(MAX_STREAM_BYTES);
    String::from_utf8_lossy(&bytes[..take]).into_owned()
}

pub struct DockerContainerRuntimeProvider;

#[async_trait]
impl ContainerRuntimeProvider for DockerContainerRuntimeProvider {
    async fn ping(&self) -> bool {
        timeout(Duration::from_secs(2), Command::new("docker").arg("info").output())
            .await
            .ok()
            .and_then(|r| r.ok())
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    async fn run(
        &self,
        image: &str,
        workdir: &Path,
        command: &[String],
        limits: &ContainerLimits,
    ) -> crate::error::Result<ExecResult> {
        let start = Instant::now();

        let mut cmd = Command::new("docker");
        cmd.arg("run")
            .arg("--rm")
            .arg("--cpus")
            .arg(format!("{:.2}", limits.cpu_fraction))
            .arg("--memory")
            .arg(limits.memory_bytes.to_string())
            .arg("-v")
            .arg(format!("{}:/workspace:ro", workdir.display()))
            .arg("-w")
            .arg("/workspace");

        if limits.network_isolation {
            cmd.arg("--network").arg("none");
        }

        cmd.arg(image);
        for arg in command {
            cmd.arg(arg);
        }

        let mut child = cmd
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| crate::error::SgeError::Provider {
                provider: "container_runtime",
                message: e.to_string(),
            })?;

        match timeout(limits.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(ExecResult {
                success: output.status.success(),
                stdout: capped(&output.stdout),
                stderr: capped(&output.stderr),
                exit_code: output.status.code().unwrap_or(-1),
                execution_time: start.elapsed(),
                error: None,
            }),
            Ok(Err(e)) => Err(crate::error::SgeError::Provider {
                provider: "container_runtime",
                message: e.to_string(),
            }),
            Err(_) => Ok(ExecResult {
                success: false,
                stdout: String::new(),
                stderr: String::new(),
                exit_code: -1,
                execution_time: start.elapsed(),
                error: Some("container execution timed out".to_string()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capped_truncates_at_the_stream_limit() {
        let huge = vec![b'x'; MAX_STREAM_BYTES + 1024];
        assert_eq!(capped(&huge).len(), MAX_STREAM_BYTES);
    }

    #[test]
    fn capped_passes_small_output_through_unchanged() {
        assert_eq!(capped(b"hello"), "hello");
    }
}
