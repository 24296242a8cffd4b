//! Firewall effector: invokes the `zoplog-firewall-ipset-add` helper,
//! falling back to `sudo -n` on failure.
//!
//! Dispatch between the direct and sudo-fallback invocation strategies is
//! expressed as a `trait Effector` chosen at runtime rather than compile
//! time, since both strategies apply to the same target regardless of
//! platform.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;

use crate::config::EFFECTOR_TIMEOUT_SECS;

/// Captured result of a single helper invocation attempt.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Invokes the firewall helper with `(blocklist_id, ip)`. Implementations
/// differ in how the process is launched (direct vs. `sudo -n`).
pub trait Effector: Send + Sync {
    fn invoke(
        &self,
        helper_path: &str,
        blocklist_id: i64,
        ip: &str,
    ) -> impl std::future::Future<Output = ExecOutput> + Send;
}

async fn run_with_timeout(mut cmd: Command) -> ExecOutput {
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    match timeout(Duration::from_secs(EFFECTOR_TIMEOUT_SECS), cmd.output()).await {
        Ok(Ok(output)) => ExecOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        },
        Ok(Err(e)) => ExecOutput {
            success: false,
            stdout: String::new(),
            stderr: format!("failed to spawn: {e}"),
        },
        Err(_) => ExecOutput {
            success: false,
            stdout: String::new(),
            stderr: "timed out".to_string(),
        },
    }
}

/// Runs the helper directly: `<helper> <blocklist_id> <ip>`.
pub struct DirectExec;

impl Effector for DirectExec {
    async fn invoke(&self, helper_path: &str, blocklist_id: i64, ip: &str) -> ExecOutput {
        let mut cmd = Command::new(helper_path);
        cmd.arg(blocklist_id.to_string()).arg(ip);
        run_with_timeout(cmd).await
    }
}

/// Runs the helper via `sudo -n <helper> <blocklist_id> <ip>` (non-interactive
/// sudo; fails immediately rather than prompting for a password).
pub struct SudoExec;

impl Effector for SudoExec {
    async fn invoke(&self, helper_path: &str, blocklist_id: i64, ip: &str) -> ExecOutput {
        let mut cmd = Command::new("sudo");
        cmd.arg("-n").arg(helper_path).arg(blocklist_id.to_string()).arg(ip);
        run_with_timeout(cmd).await
    }
}

/// Tries `DirectExec` first; on non-zero exit, retries once via `SudoExec`.
/// Both attempts' stdout/stderr are logged; on persistent failure this logs
/// an error and returns without propagating — fire-and-forget, since the
/// PacketLog row for this host was already written regardless of whether
/// enforcement succeeds.
pub async fn apply_block(helper_path: &str, blocklist_id: i64, ip: &str) {
    let direct = DirectExec.invoke(helper_path, blocklist_id, ip).await;
    if direct.success {
        tracing::debug!("firewall helper succeeded directly for {ip}");
        return;
    }
    tracing::debug!(
        "firewall helper direct attempt failed for {ip}: {}",
        direct.stderr.trim()
    );

    let via_sudo = SudoExec.invoke(helper_path, blocklist_id, ip).await;
    if via_sudo.success {
        tracing::debug!("firewall helper succeeded via sudo -n for {ip}");
        return;
    }

    tracing::error!(
        "firewall helper failed for {ip} (blocklist {blocklist_id}): direct={:?} sudo={:?}",
        direct.stderr.trim(),
        via_sudo.stderr.trim()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_direct_exec_nonexistent_binary_fails_without_panicking() {
        let out = DirectExec
            .invoke("/nonexistent/zoplog-firewall-ipset-add", 1, "192.0.2.1")
            .await;
        assert!(!out.success);
    }

    #[tokio::test]
    async fn test_apply_block_with_nonexistent_helper_does_not_panic() {
        apply_block("/nonexistent/zoplog-firewall-ipset-add", 1, "192.0.2.1").await;
    }
}
