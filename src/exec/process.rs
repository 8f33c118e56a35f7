// src/exec/process.rs

//! Starting and stopping service processes.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::config::ServiceSpec;
use crate::dag::{ResourceMap, ServiceName};
use crate::types::Readiness;

/// The value a process-backed service contributes to the resource map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceHandle {
    pub name: ServiceName,
    /// OS process ID, if the platform reported one.
    pub pid: Option<u32>,
}

/// Start the service process and wait until it is ready.
///
/// Returns the child if it is still running (so it can be stopped later),
/// or `None` for a one-shot service that has already exited successfully.
/// If this future is dropped, the child is killed.
pub async fn launch(
    spec: &ServiceSpec,
    deps: &ResourceMap,
) -> Result<(ServiceHandle, Option<Child>)> {
    info!(service = %spec.name, cmd = %spec.cmd, "starting service process");

    let mut cmd = shell_command(&spec.cmd);
    cmd.env("BOOTDAG_SERVICE", &spec.name)
        .env("BOOTDAG_NEEDS", spec.needs.join(","));
    for dep in deps.names() {
        if let Some(pid) = deps.get::<ServiceHandle>(dep).and_then(|h| h.pid) {
            cmd.env(format!("BOOTDAG_{}_PID", env_key(dep)), pid.to_string());
        }
    }

    cmd.stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning process for service '{}'", spec.name))?;

    let handle = ServiceHandle {
        name: spec.name.clone(),
        pid: child.id(),
    };

    // Always consume stderr so buffers don't fill; log at debug.
    if let Some(stderr) = child.stderr.take() {
        let name = spec.name.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(service = %name, "stderr: {}", line);
            }
        });
    }

    let stdout = child
        .stdout
        .take()
        .map(|s| BufReader::new(s).lines())
        .ok_or_else(|| anyhow!("no stdout pipe for service '{}'", spec.name))?;

    match &spec.readiness {
        Readiness::Exit => {
            drain_stdout(&spec.name, stdout);
            let status = child
                .wait()
                .await
                .with_context(|| format!("waiting for process of service '{}'", spec.name))?;
            if !status.success() {
                bail!("one-shot service exited with {status}");
            }
            info!(service = %spec.name, "one-shot service completed");
            Ok((handle, None))
        }
        Readiness::After(delay) => {
            drain_stdout(&spec.name, stdout);
            tokio::select! {
                _ = tokio::time::sleep(*delay) => {}
                status = child.wait() => {
                    return Err(exited_early(status?));
                }
            }
            info!(service = %spec.name, pid = ?handle.pid, "service ready (ready_after elapsed)");
            Ok((handle, Some(child)))
        }
        Readiness::Stdout(pattern) => {
            let mut stdout = stdout;
            wait_for_line(&spec.name, pattern, &mut stdout, &mut child).await?;
            drain_stdout(&spec.name, stdout);
            info!(service = %spec.name, pid = ?handle.pid, "service ready (stdout matched)");
            Ok((handle, Some(child)))
        }
    }
}

/// Force-kill a running service process (SIGKILL on Unix) and wait up to
/// `grace` for it to be reaped.
pub async fn stop(name: ServiceName, child: Option<Child>, grace: Duration) -> Result<()> {
    let Some(mut child) = child else {
        debug!(service = %name, "one-shot service; nothing to stop");
        return Ok(());
    };

    if let Some(status) = child.try_wait()? {
        warn!(service = %name, %status, "service process had already exited");
        return Ok(());
    }

    child
        .start_kill()
        .with_context(|| format!("killing process of service '{name}'"))?;

    let status = tokio::time::timeout(grace, child.wait())
        .await
        .map_err(|_| anyhow!("service '{name}' did not exit within {grace:?} of being killed"))??;

    info!(service = %name, %status, "service stopped");
    Ok(())
}

async fn wait_for_line(
    name: &str,
    pattern: &Regex,
    stdout: &mut Lines<BufReader<ChildStdout>>,
    child: &mut Child,
) -> Result<()> {
    loop {
        tokio::select! {
            biased;

            line = stdout.next_line() => {
                match line.with_context(|| format!("reading stdout of service '{name}'"))? {
                    Some(line) => {
                        debug!(service = %name, "stdout: {}", line);
                        if pattern.is_match(&line) {
                            return Ok(());
                        }
                    }
                    None => {
                        let status = child.wait().await?;
                        bail!("stdout closed before `ready_on_stdout` matched; process exited with {status}");
                    }
                }
            }
            status = child.wait() => {
                return Err(exited_early(status?));
            }
        }
    }
}

fn drain_stdout(name: &str, mut lines: Lines<BufReader<ChildStdout>>) {
    let name = name.to_string();
    tokio::spawn(async move {
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(service = %name, "stdout: {}", line);
        }
        debug!(service = %name, "stdout closed");
    });
}

fn exited_early(status: ExitStatus) -> anyhow::Error {
    anyhow!("process exited with {status} before becoming ready")
}

/// Build a shell command appropriate for the platform.
fn shell_command(line: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(line);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(line);
        c
    }
}

/// `"my-db"` -> `"MY_DB"`.
fn env_key(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_are_shell_safe() {
        assert_eq!(env_key("db"), "DB");
        assert_eq!(env_key("my-cache.v2"), "MY_CACHE_V2");
    }
}
