//! Process tree termination.
//!
//! The host process is spawned as the leader of its own process group, so
//! signalling the group reaches every descendant it started.

use std::process::ExitStatus;
use std::time::Duration;

use anyhow::Result;
use tokio::process::Child;

use crate::util::process::ProcessBuilder;

/// Terminate `child` and its descendants.
///
/// Asks politely first; after `timeout` the whole tree is killed. Returns
/// the child's exit status once it has been reaped.
pub async fn terminate_tree(child: &mut Child, timeout: Duration) -> Option<ExitStatus> {
    let Some(pid) = child.id() else {
        // already reaped
        return child.wait().await.ok();
    };

    if let Err(err) = signal_tree(pid, false).await {
        tracing::debug!(pid, "failed to signal process tree: {:#}", err);
    }

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => {
            // stragglers left in the group
            let _ = signal_tree(pid, true).await;
            status.ok()
        }
        Err(_) => {
            tracing::warn!(
                pid,
                "process did not exit within {}ms, killing it",
                timeout.as_millis()
            );
            let _ = signal_tree(pid, true).await;
            let _ = child.start_kill();
            child.wait().await.ok()
        }
    }
}

#[cfg(unix)]
async fn signal_tree(pid: u32, force: bool) -> Result<()> {
    let signal = if force { "-KILL" } else { "-TERM" };
    let group = format!("-{}", pid);
    ProcessBuilder::new("kill")
        .args([signal, "--", group.as_str()])
        .exec_and_check()
        .await?;
    Ok(())
}

#[cfg(windows)]
async fn signal_tree(pid: u32, force: bool) -> Result<()> {
    let pid = pid.to_string();
    let mut process = ProcessBuilder::new("taskkill").args(["/PID", pid.as_str(), "/T"]);
    if force {
        process = process.arg("/F");
    }
    process.exec_and_check().await?;
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Stdio;

    #[tokio::test]
    async fn test_terminates_group() {
        let mut cmd = ProcessBuilder::new("sh")
            .args(["-c", "sleep 30 & sleep 30; wait"])
            .own_process_group()
            .command();
        cmd.stdout(Stdio::null());
        let mut child = cmd.spawn().unwrap();

        let status = tokio::time::timeout(
            Duration::from_secs(5),
            terminate_tree(&mut child, Duration::from_secs(2)),
        )
        .await
        .unwrap();

        assert!(status.is_some());
        assert!(child.id().is_none());
    }

    #[tokio::test]
    async fn test_already_exited() {
        let mut child = ProcessBuilder::new("true").command().spawn().unwrap();
        child.wait().await.unwrap();

        let status = terminate_tree(&mut child, Duration::from_millis(100)).await;
        assert!(status.unwrap().success());
    }
}
