//! Runs one external command with optional stdin, environment and timeout.
//!
//! On timeout the child receives SIGTERM (then SIGKILL) and the result is
//! flagged as timed out.

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Result of running a command.
#[derive(Debug)]
pub struct CommandOutput {
    /// Exit status 0 and no timeout.
    pub success: bool,
    /// The exit code, if the process exited normally.
    pub exit_code: Option<i32>,
    /// Whether the command was terminated due to timeout.
    pub timed_out: bool,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
}

/// How long a timed-out command gets to exit after SIGTERM before SIGKILL.
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Spawns `program`, feeds it `stdin_input`, and waits for it to exit.
///
/// `timeout` bounds the whole exchange: writing stdin, draining output and
/// waiting for exit. On expiry the child gets SIGTERM, then SIGKILL after
/// [`KILL_GRACE`], and is reaped before returning.
pub async fn run_command(
    program: &str,
    args: &[String],
    envs: &[(&str, String)],
    stdin_input: Option<&str>,
    timeout: Option<Duration>,
) -> std::io::Result<CommandOutput> {
    let mut command = Command::new(program);
    command.args(args);
    command.envs(envs.iter().map(|(key, value)| (*key, value.as_str())));
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());
    command.stdin(if stdin_input.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    command.kill_on_drop(true);

    debug!(command = %program, args = ?args, "Spawning command");
    let mut child = command.spawn()?;

    let result = match timeout {
        Some(duration) => tokio::time::timeout(duration, exchange(&mut child, stdin_input))
            .await
            .ok(),
        None => Some(exchange(&mut child, stdin_input).await),
    };

    let Some(result) = result else {
        warn!(
            command = %program,
            timeout_secs = timeout.map_or(0.0, |d| d.as_secs_f64()),
            "Command timeout reached, sending SIGTERM"
        );
        let status = terminate_child(&mut child).await?;
        return Ok(CommandOutput {
            success: false,
            exit_code: status.code(),
            timed_out: true,
            stdout: String::new(),
            stderr: String::new(),
        });
    };

    let (status, stdout_lines, stderr_lines) = result?;
    Ok(CommandOutput {
        success: status.success(),
        exit_code: status.code(),
        timed_out: false,
        stdout: stdout_lines.join("\n"),
        stderr: stderr_lines.join("\n"),
    })
}

/// Writes stdin, drains stdout and stderr, and waits for the child to exit.
async fn exchange(
    child: &mut Child,
    stdin_input: Option<&str>,
) -> std::io::Result<(ExitStatus, Vec<String>, Vec<String>)> {
    let stdin_handle = child.stdin.take();
    let stdout_handle = child.stdout.take();
    let stderr_handle = child.stderr.take();

    // All three run concurrently so no pipe fills up and blocks the child.
    let stdin_future = async {
        if let Some(input) = stdin_input
            && let Some(mut stdin) = stdin_handle
        {
            // A command that exits without reading stdin closes the pipe early.
            if let Err(e) = stdin.write_all(input.as_bytes()).await {
                debug!(error = %e, "Command did not read all of stdin");
            }
        }
        Ok::<_, std::io::Error>(())
    };

    let stdout_future = async {
        let mut lines_out = Vec::new();
        if let Some(stdout) = stdout_handle {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                lines_out.push(line);
            }
        }
        Ok::<_, std::io::Error>(lines_out)
    };

    let stderr_future = async {
        let mut lines_out = Vec::new();
        if let Some(stderr) = stderr_handle {
            let mut lines = BufReader::new(stderr).lines();
            while let Some(line) = lines.next_line().await? {
                lines_out.push(line);
            }
        }
        Ok::<_, std::io::Error>(lines_out)
    };

    let ((), stdout_lines, stderr_lines) =
        tokio::try_join!(stdin_future, stdout_future, stderr_future)?;
    let status = child.wait().await?;
    Ok((status, stdout_lines, stderr_lines))
}

/// Sends SIGTERM, escalates to SIGKILL after [`KILL_GRACE`], and reaps.
async fn terminate_child(child: &mut Child) -> std::io::Result<ExitStatus> {
    if let Some(pid) = child.id() {
        let pid = Pid::from_raw(pid as i32);
        debug!(%pid, "Sending SIGTERM to child process");
        let _ = kill(pid, Signal::SIGTERM);
    }

    if let Ok(status) = tokio::time::timeout(KILL_GRACE, child.wait()).await {
        return status;
    }

    warn!(
        grace_secs = KILL_GRACE.as_secs(),
        "Command ignored SIGTERM, sending SIGKILL"
    );
    child.start_kill()?;
    child.wait().await
}
