//! Child process execution with captured output and a hard time limit.

use std::{ffi::OsString, io, path::Path, process::Stdio, time::Duration};

use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::Command,
    time::timeout,
};
use tracing::warn;

use super::env::EnvPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was ended by a signal.
    pub exit_code: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Exited(ProcessOutput),
    /// The child was killed and reaped.
    TimedOut,
}

async fn read_all<R: AsyncRead + Unpin>(reader: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut r) = reader {
        if let Err(e) = r.read_to_end(&mut buf).await {
            warn!(error = %e, "reading child output failed");
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Spawn `program args` with stdin closed and both output streams captured.
/// `limit` bounds the whole run, including draining the pipes, which a
/// backgrounded grandchild can hold open after the worker itself exits.
/// Spawn failures are returned as `Err`.
pub async fn run_with_timeout(
    program: &Path,
    args: &[OsString],
    env: &EnvPolicy,
    limit: Duration,
) -> io::Result<RunOutcome> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    env.apply(&mut cmd);

    let mut child = cmd.spawn()?;

    let mut stdout_task = tokio::spawn(read_all(child.stdout.take()));
    let mut stderr_task = tokio::spawn(read_all(child.stderr.take()));

    let finished = timeout(limit, async {
        let status = child.wait().await?;
        let stdout = (&mut stdout_task).await.unwrap_or_default();
        let stderr = (&mut stderr_task).await.unwrap_or_default();
        Ok::<_, io::Error>(ProcessOutput {
            exit_code: status.code(),
            success: status.success(),
            stdout,
            stderr,
        })
    })
    .await;

    match finished {
        Ok(output) => Ok(RunOutcome::Exited(output?)),
        Err(_) => {
            if let Ok(None) = child.try_wait() {
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to kill timed out worker");
                }
            }
            stdout_task.abort();
            stderr_task.abort();
            Ok(RunOutcome::TimedOut)
        }
    }
}
