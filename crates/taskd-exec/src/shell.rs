//! One-shot `sh -c` execution with a hard timeout and bounded capture.
//!
//! The child runs in its own process group so that a timeout or an output
//! overflow kills the whole pipeline, not just the shell.

use std::process::Stdio;

use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::{Child, Command},
};
use tracing::{debug, warn};

use crate::{
    error::{ExecError, ExecFailure},
    types::{ExecOptions, ExecOutput},
};

const READ_CHUNK: usize = 8 * 1024;

/// Run `command` through `shell -c` and capture its output.
///
/// Returns `Ok` whenever the process exits on its own, whatever its exit
/// code. Judging success is the caller's business.
///
/// # Errors
///
/// - `Spawn`: the shell could not be started.
/// - `Timeout`: the command outlived `options.timeout`.
/// - `OutputLimitExceeded`: stdout or stderr grew past `options.max_buffer_bytes`.
/// - `Io`: reading a pipe or waiting on the child failed.
///
/// Every error except `Spawn` carries the output captured so far.
pub async fn run(shell: &str, command: &str, options: &ExecOptions) -> Result<ExecOutput, ExecFailure> {
    debug!(shell, command, "spawning command");

    let mut cmd = Command::new(shell);
    cmd.arg("-c")
        .arg(command)
        .envs(options.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    {
        cmd.process_group(0);
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| ExecFailure::bare(ExecError::Spawn(format!("{shell}: {e}"))))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let mut out_buf = Vec::new();
    let mut err_buf = Vec::new();
    let limit = options.max_buffer_bytes;

    let capture = async {
        tokio::try_join!(
            read_capped(stdout, &mut out_buf, limit),
            read_capped(stderr, &mut err_buf, limit),
        )?;
        child.wait().await.map_err(ExecError::Io)
    };
    let outcome = tokio::time::timeout(options.timeout, capture).await;

    let error = match outcome {
        Ok(Ok(status)) => {
            return Ok(ExecOutput {
                exit_code: status.code().unwrap_or(-1),
                stdout: strip_text(&out_buf),
                stderr: strip_text(&err_buf),
            });
        }
        Ok(Err(e)) => e,
        Err(_elapsed) => ExecError::Timeout {
            ms: options.timeout.as_millis() as u64,
        },
    };

    warn!(command, error = %error, "command aborted, killing process group");
    kill_and_reap(&mut child).await;

    Err(ExecFailure {
        error,
        stdout: strip_text(&out_buf),
        stderr: strip_text(&err_buf),
    })
}

/// Drain `reader` into `buf`, refusing to grow past `limit` bytes.
async fn read_capped<R>(reader: Option<R>, buf: &mut Vec<u8>, limit: usize) -> Result<(), ExecError>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok(());
    };

    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        if buf.len() + n > limit {
            let room = limit - buf.len();
            buf.extend_from_slice(&chunk[..room]);
            return Err(ExecError::OutputLimitExceeded { limit });
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// SIGKILL the child's process group, then wait so no zombie is left behind.
async fn kill_and_reap(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            // Safety: the child was spawned as leader of its own group, so
            // -pid addresses exactly that group.
            unsafe {
                libc::kill(-(pid as libc::pid_t), libc::SIGKILL);
            }
        }
    }

    if let Err(e) = child.start_kill() {
        debug!("start_kill after group kill: {e}");
    }
    if let Err(e) = child.wait().await {
        warn!("failed to reap killed command: {e}");
    }
}

/// Strip ANSI escape codes and convert bytes to a UTF-8 string.
fn strip_text(raw: &[u8]) -> String {
    let clean = strip_ansi_escapes::strip(raw);
    String::from_utf8_lossy(&clean).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn opts(timeout_ms: u64, limit: usize) -> ExecOptions {
        ExecOptions {
            timeout: Duration::from_millis(timeout_ms),
            max_buffer_bytes: limit,
            env: Vec::new(),
        }
    }

    #[tokio::test]
    async fn captures_stdout_and_stderr_separately() {
        let out = run("sh", "echo out; echo err >&2", &opts(5_000, 1024))
            .await
            .unwrap();
        assert_eq!(out.exit_code, 0);
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");
    }

    #[tokio::test]
    async fn non_zero_exit_is_still_ok() {
        let out = run("sh", "exit 3", &opts(5_000, 1024)).await.unwrap();
        assert_eq!(out.exit_code, 3);
    }

    #[tokio::test]
    async fn extra_env_is_visible_to_command() {
        let mut options = opts(5_000, 1024);
        options
            .env
            .push(("TASKD_SHELL_TEST_VAR".to_string(), "/etc/tool.conf".to_string()));
        let out = run("sh", "printf '%s' \"$TASKD_SHELL_TEST_VAR\"", &options)
            .await
            .unwrap();
        assert_eq!(out.stdout, "/etc/tool.conf");
    }

    #[tokio::test]
    async fn timeout_kills_long_command() {
        let start = Instant::now();
        let failure = run("sh", "echo started; sleep 30", &opts(300, 1024))
            .await
            .unwrap_err();
        assert!(matches!(failure.error, ExecError::Timeout { ms: 300 }));
        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(failure.stdout, "started\n");
    }

    #[tokio::test]
    async fn oversized_output_is_rejected() {
        let failure = run("sh", "printf '%05000d' 0", &opts(5_000, 1024))
            .await
            .unwrap_err();
        assert!(matches!(
            failure.error,
            ExecError::OutputLimitExceeded { limit: 1024 }
        ));
        assert_eq!(failure.stdout.len(), 1024);
    }

    #[tokio::test]
    async fn missing_shell_is_a_spawn_error() {
        let failure = run("/nonexistent/taskd-shell", "true", &opts(1_000, 1024))
            .await
            .unwrap_err();
        assert!(matches!(failure.error, ExecError::Spawn(_)));
    }

    #[tokio::test]
    async fn ansi_sequences_are_stripped() {
        let out = run("sh", "printf '\\033[31mred\\033[0m'", &opts(5_000, 1024))
            .await
            .unwrap();
        assert_eq!(out.stdout, "red");
    }
}
