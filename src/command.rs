//! External process execution.
//!
//! Every simulator and AppleScript operation goes through [`Executor`], so the
//! fallback logic above it can be exercised with scripted executors in tests.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

/// Default timeout for external commands.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Time a child gets to exit after SIGTERM before it is killed.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// Per-invocation options.
#[derive(Debug, Clone)]
pub struct CommandOptions {
    /// Maximum run time.
    pub timeout: Duration,
    /// Working directory.
    pub cwd: Option<PathBuf>,
    /// Extra environment variables.
    pub env: HashMap<String, String>,
    /// Bytes written to the child's stdin, which is then closed.
    pub stdin: Option<String>,
}

impl Default for CommandOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            cwd: None,
            env: HashMap::new(),
            stdin: None,
        }
    }
}

impl CommandOptions {
    /// Options with the given timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    /// Feed `input` to the child's stdin.
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Command line, for diagnostics.
    pub command: String,
    /// Exit code, `-1` when terminated by a signal.
    pub exit_code: i32,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
    /// `exit_code == 0`.
    pub success: bool,
    /// Wall-clock run time.
    pub elapsed: Duration,
}

impl CommandOutput {
    /// Stdout on success, stderr on failure.
    pub fn output(&self) -> &str {
        if self.success {
            &self.stdout
        } else if self.stderr.trim().is_empty() {
            "Command failed"
        } else {
            &self.stderr
        }
    }

    /// Stdout and stderr joined, for pattern checks that may hit either stream.
    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }
}

/// Runs external programs.
#[async_trait::async_trait]
pub trait Executor: Send + Sync {
    /// Run `argv[0]` with the remaining arguments.
    ///
    /// A non-zero exit is reported through [`CommandOutput::success`], not as
    /// an error.
    async fn execute(&self, argv: &[&str], options: &CommandOptions) -> Result<CommandOutput>;

    /// Run with default options and the given timeout.
    async fn run(&self, argv: &[&str], timeout: Duration) -> Result<CommandOutput> {
        self.execute(argv, &CommandOptions::with_timeout(timeout))
            .await
    }
}

/// Executor backed by `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct CommandRunner;

impl CommandRunner {
    /// Create a runner.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Executor for CommandRunner {
    async fn execute(&self, argv: &[&str], options: &CommandOptions) -> Result<CommandOutput> {
        let command_line = argv.join(" ");
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| Error::Internal("empty command".into()))?;

        tracing::info!(command = %command_line, "Executing command");
        let started = Instant::now();

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(if options.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref cwd) = options.cwd {
            cmd.current_dir(cwd);
        }
        cmd.envs(&options.env);

        let mut child = cmd.spawn().map_err(|source| Error::CommandSpawn {
            command: command_line.clone(),
            source,
        })?;

        if let (Some(input), Some(mut stdin)) = (options.stdin.clone(), child.stdin.take()) {
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(input.as_bytes()).await {
                    tracing::warn!("Failed to write command stdin: {}", e);
                }
            });
        }

        let stdout_task = capture(child.stdout.take());
        let stderr_task = capture(child.stderr.take());

        let status = match tokio::time::timeout(options.timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                stdout_task.abort();
                stderr_task.abort();
                terminate(&mut child, &command_line).await;
                tracing::error!(
                    command = %command_line,
                    timeout_secs = options.timeout.as_secs_f64(),
                    "Command timed out"
                );
                return Err(Error::CommandTimeout {
                    command: command_line,
                    timeout: options.timeout,
                });
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();
        let exit_code = status.code().unwrap_or(-1);
        let output = CommandOutput {
            command: command_line,
            exit_code,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            success: exit_code == 0,
            elapsed: started.elapsed(),
        };

        if output.success {
            tracing::info!(
                command = %output.command,
                elapsed_ms = output.elapsed.as_millis() as u64,
                "Command completed"
            );
        } else {
            tracing::error!(
                command = %output.command,
                exit_code,
                elapsed_ms = output.elapsed.as_millis() as u64,
                "Command failed"
            );
        }
        if !output.stdout.is_empty() {
            tracing::debug!(stdout = %output.stdout.trim_end(), "Command stdout");
        }
        if !output.stderr.is_empty() {
            tracing::debug!(stderr = %output.stderr.trim_end(), "Command stderr");
        }

        Ok(output)
    }
}

fn capture<R>(stream: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut stream) = stream {
            let _ = stream.read_to_end(&mut buf).await;
        }
        buf
    })
}

/// SIGTERM, a grace period, then SIGKILL.
async fn terminate(child: &mut tokio::process::Child, command_line: &str) {
    if send_sigterm(child)
        && tokio::time::timeout(TERMINATE_GRACE, child.wait())
            .await
            .is_ok()
    {
        return;
    }

    tracing::warn!(command = %command_line, "Killing unresponsive command");
    if let Err(e) = child.kill().await {
        tracing::warn!("Failed to kill command: {}", e);
    }
}

#[cfg(unix)]
fn send_sigterm(child: &tokio::process::Child) -> bool {
    let Some(pid) = child.id().and_then(|pid| libc::pid_t::try_from(pid).ok()) else {
        return false;
    };
    // SAFETY: `pid` belongs to a child we spawned and have not reaped yet.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc != 0 {
        tracing::debug!(
            "SIGTERM to {} failed: {}",
            pid,
            std::io::Error::last_os_error()
        );
    }
    rc == 0
}

#[cfg(not(unix))]
fn send_sigterm(_child: &tokio::process::Child) -> bool {
    false
}
