//! Bounded subprocess execution.
//!
//! Every external tool invocation in the pipeline is wall-clock bounded;
//! a timeout converts into a failed step, never an uncaught fault.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use crate::error::Result;

/// Captured output of a bounded subprocess run.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was killed on timeout or ended by
    /// a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// stderr if non-empty, else stdout, else a fallback describing the
    /// exit status. Used to build failure messages.
    pub fn error_text(&self) -> String {
        if self.timed_out {
            return "timeout".to_string();
        }
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        match self.status {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Run a command, killing it if it exceeds `timeout`.
///
/// Pipes are drained on reader threads so a chatty child cannot deadlock on
/// a full pipe buffer.
pub fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> Result<CommandOutput> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdout_handle = spawn_reader(child.stdout.take());
    let stderr_handle = spawn_reader(child.stderr.take());

    let (status, timed_out) = wait_with_deadline(&mut child, timeout)?;

    let stdout = stdout_handle.join().unwrap_or_default();
    let stderr = stderr_handle.join().unwrap_or_default();

    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        timed_out,
    })
}

/// Convenience wrapper: (success, output-or-error-text).
pub fn run_checked(cmd: &mut Command, timeout: Duration) -> (bool, String) {
    match run_with_timeout(cmd, timeout) {
        Ok(out) if out.success() => (true, out.stdout.trim().to_string()),
        Ok(out) => (false, out.error_text()),
        Err(e) => {
            let text = if is_not_found(&e) {
                "command not found".to_string()
            } else {
                e.to_string()
            };
            (false, text)
        }
    }
}

fn is_not_found(e: &crate::error::CoreError) -> bool {
    matches!(
        e,
        crate::error::CoreError::Io(io) if io.kind() == std::io::ErrorKind::NotFound
    )
}

fn spawn_reader<R: Read + Send + 'static>(
    source: Option<R>,
) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut reader) = source {
            let mut bytes = Vec::new();
            if reader.read_to_end(&mut bytes).is_ok() {
                buf = String::from_utf8_lossy(&bytes).into_owned();
            }
        }
        buf
    })
}

fn wait_with_deadline(child: &mut Child, timeout: Duration) -> Result<(Option<i32>, bool)> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok((status.code(), false));
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Ok((None, true));
        }
        std::thread::sleep(Duration::from_millis(25));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_successful_command_captures_stdout() {
        let mut cmd = Command::new("echo");
        cmd.arg("hello");
        let out = run_with_timeout(&mut cmd, Duration::from_secs(5)).unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
        assert!(!out.timed_out);
    }

    #[test]
    fn test_timeout_kills_process() {
        let mut cmd = Command::new("sleep");
        cmd.arg("10");
        let start = Instant::now();
        let out = run_with_timeout(&mut cmd, Duration::from_millis(200)).unwrap();
        assert!(out.timed_out);
        assert!(out.status.is_none());
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_missing_binary_reports_not_found() {
        let mut cmd = Command::new("fuzzsmith-definitely-not-a-binary");
        let (ok, text) = run_checked(&mut cmd, Duration::from_secs(1));
        assert!(!ok);
        assert_eq!(text, "command not found");
    }

    #[test]
    fn test_nonzero_exit_reports_error_text() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo oops >&2; exit 3"]);
        let out = run_with_timeout(&mut cmd, Duration::from_secs(5)).unwrap();
        assert!(!out.success());
        assert_eq!(out.status, Some(3));
        assert_eq!(out.error_text(), "oops");
    }
}
