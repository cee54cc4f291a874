//! Builder for executing external tool commands with timeout and
//! cancellation support.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use rh_core::{Error, Result};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Default command timeout: 5 minutes.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// How many trailing stderr lines to keep in a failure message. ffmpeg
/// prints its banner and per-stream info first; the cause is at the end.
const ERROR_TAIL_LINES: usize = 20;

/// Output captured from a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Process exit status.
    pub status: ExitStatus,
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
}

/// A builder for constructing and executing external tool invocations.
///
/// # Example
///
/// ```no_run
/// use rh_av::ToolCommand;
/// use std::path::PathBuf;
///
/// # async fn example() -> rh_core::Result<()> {
/// let output = ToolCommand::new(PathBuf::from("ffprobe"))
///     .args(["-v", "quiet", "-print_format", "json", "-show_format"])
///     .arg("/path/to/video.mkv")
///     .execute()
///     .await?;
/// println!("{}", output.stdout);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ToolCommand {
    /// Create a new command for the given program path.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Set the maximum execution time.
    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = d;
        self
    }

    fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    /// Execute the command, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tool`] if spawning fails, the process times out, or it
    /// exits non-zero (the message carries the tail of stderr).
    pub async fn execute(&self) -> Result<ToolOutput> {
        self.execute_cancellable(&CancellationToken::new()).await
    }

    /// Like [`execute`](Self::execute), but the process is killed as soon as
    /// `cancel` fires, yielding [`Error::Cancelled`].
    pub async fn execute_cancellable(&self, cancel: &CancellationToken) -> Result<ToolOutput> {
        let program_name = self.program_name();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(tool = %program_name, args = ?self.args, "Spawning tool");

        let child = cmd
            .spawn()
            .map_err(|e| Error::tool(&program_name, format!("failed to spawn: {e}")))?;

        // Dropping the wait future drops the child, and kill_on_drop reaps it.
        let result = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(Error::Cancelled(format!("{program_name} was cancelled")));
            }
            r = tokio::time::timeout(self.timeout, child.wait_with_output()) => r,
        };

        let output = match result {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(Error::tool(program_name, format!("wait failed: {e}"))),
            Err(_) => {
                return Err(Error::tool(
                    program_name,
                    format!("timed out after {}s", self.timeout.as_secs_f64()),
                ))
            }
        };
        check_exit(&program_name, output)
    }
}

/// Capture `output`, failing with the tail of stderr on a non-zero exit.
fn check_exit(program_name: &str, output: std::process::Output) -> Result<ToolOutput> {
    let captured = ToolOutput {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    if captured.status.success() {
        return Ok(captured);
    }
    Err(Error::tool(
        program_name,
        format!(
            "exited with {}: {}",
            captured.status,
            tail(&captured.stderr, ERROR_TAIL_LINES)
        ),
    ))
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.trim().lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}
