use std::process::{Command, Output, Stdio};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, trace};
use wait_timeout::ChildExt;

/// A builder for executing external commands with unified error handling.
///
/// All multiplexer access goes through here so every invocation gets the
/// same logging and the same bounded-wait behavior.
pub struct Cmd<'a> {
    command: &'a str,
    args: Vec<&'a str>,
    timeout: Option<Duration>,
}

impl<'a> Cmd<'a> {
    /// Create a new command builder
    pub fn new(command: &'a str) -> Self {
        Self {
            command,
            args: Vec::new(),
            timeout: None,
        }
    }

    /// Add a single argument
    pub fn arg(mut self, arg: &'a str) -> Self {
        self.args.push(arg);
        self
    }

    /// Add multiple arguments
    pub fn args(mut self, args: &[&'a str]) -> Self {
        self.args.extend_from_slice(args);
        self
    }

    /// Bound the wait for the child process. On expiry the child is killed
    /// and the call fails.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Execute the command and return the output.
    /// Returns an error if the command fails (non-zero exit code).
    pub fn run(self) -> Result<Output> {
        let Cmd {
            command,
            args,
            timeout,
        } = self;

        trace!(command, args = ?args, "cmd:run start");

        let mut cmd = Command::new(command);
        cmd.args(&args);

        let output = match timeout {
            None => cmd.output().with_context(|| {
                format!("Failed to execute command: {} {}", command, args.join(" "))
            })?,
            Some(limit) => run_with_deadline(cmd, limit, command, &args)?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(
                command,
                args = ?args,
                status = ?output.status.code(),
                stderr = %stderr.trim(),
                "cmd:run failure"
            );
            return Err(anyhow!(
                "Command failed: {} {}\n{}",
                command,
                args.join(" "),
                stderr.trim()
            ));
        }
        trace!(command, "cmd:run success");
        Ok(output)
    }

    /// Execute the command and return stdout with the trailing newline
    /// removed. Interior whitespace is preserved (pane captures are
    /// whitespace-significant).
    pub fn run_and_capture_stdout(self) -> Result<String> {
        let output = self.run()?;
        let mut stdout = String::from_utf8(output.stdout)?;
        if stdout.ends_with('\n') {
            stdout.pop();
        }
        Ok(stdout)
    }

    /// Execute the command, returning Ok(true) if it succeeds, Ok(false) if
    /// it exits non-zero. Used for probe commands like `tmux has-session`.
    pub fn run_as_check(self) -> Result<bool> {
        let Cmd { command, args, .. } = self;
        trace!(command, args = ?args, "cmd:check start");

        let output = Command::new(command)
            .args(&args)
            .output()
            .with_context(|| {
                format!("Failed to execute command: {} {}", command, args.join(" "))
            })?;

        let success = output.status.success();
        trace!(command, success, "cmd:check result");
        Ok(success)
    }
}

fn run_with_deadline(
    mut cmd: Command,
    limit: Duration,
    command: &str,
    args: &[&str],
) -> Result<Output> {
    use std::io::Read;

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd
        .spawn()
        .with_context(|| format!("Failed to spawn command: {} {}", command, args.join(" ")))?;

    match child.wait_timeout(limit)? {
        Some(status) => {
            let mut stdout = Vec::new();
            let mut stderr = Vec::new();
            if let Some(mut out) = child.stdout.take() {
                let _ = out.read_to_end(&mut stdout);
            }
            if let Some(mut err) = child.stderr.take() {
                let _ = err.read_to_end(&mut stderr);
            }
            Ok(Output {
                status,
                stdout,
                stderr,
            })
        }
        None => {
            let _ = child.kill();
            let _ = child.wait();
            debug!(
                command,
                timeout_ms = limit.as_millis() as u64,
                "cmd:run timeout"
            );
            Err(anyhow!(
                "Command timed out after {:?}: {} {}",
                limit,
                command,
                args.join(" ")
            ))
        }
    }
}
