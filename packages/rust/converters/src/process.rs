//! External process execution capability.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Captured result of a finished process.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Last non-empty stderr line, for error messages.
    pub fn stderr_tail(&self) -> String {
        String::from_utf8_lossy(&self.stderr)
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .unwrap_or_default()
            .trim()
            .to_string()
    }
}

/// Why a process could not produce output.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("'{program}' timed out after {}s", .after.as_secs())]
    TimedOut { program: String, after: Duration },
}

/// Runs external programs. Converters only ever talk to this trait.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `program` with `args`, killing it once `limit` elapses.
    async fn run(
        &self,
        program: &str,
        args: &[String],
        limit: Duration,
    ) -> std::result::Result<ProcessOutput, ProcessError>;

    /// Whether `program` can be started at all.
    fn is_available(&self, program: &str) -> bool;
}

/// [`ProcessRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        limit: Duration,
    ) -> std::result::Result<ProcessOutput, ProcessError> {
        debug!(program, ?args, timeout_secs = limit.as_secs(), "running external process");

        let child = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                program: program.to_string(),
                source,
            })?;

        // Dropping the child on timeout kills it.
        match timeout(limit, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(ProcessOutput {
                stdout: output.stdout,
                stderr: output.stderr,
                exit_code: output.status.code(),
            }),
            Ok(Err(source)) => Err(ProcessError::Spawn {
                program: program.to_string(),
                source,
            }),
            Err(_) => Err(ProcessError::TimedOut {
                program: program.to_string(),
                after: limit,
            }),
        }
    }

    fn is_available(&self, program: &str) -> bool {
        find_executable(program).is_some()
    }
}

/// Resolve `program` to an executable file, searching `PATH` for bare names.
pub fn find_executable(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|p| is_executable(p))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file() || path.with_extension("exe").is_file()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let out = TokioProcessRunner
            .run("sh", &["-c".into(), "printf hello; exit 3".into()], Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.stdout_lossy(), "hello");
        assert_eq!(out.exit_code, Some(3));
        assert!(!out.success());
    }

    #[tokio::test]
    async fn kills_on_timeout() {
        let err = TokioProcessRunner
            .run("sleep", &["5".into()], Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::TimedOut { .. }));
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let err = TokioProcessRunner
            .run("definitely-not-a-real-binary-xyz", &[], Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }

    #[test]
    fn finds_shell_on_path() {
        assert!(TokioProcessRunner.is_available("sh"));
        assert!(!TokioProcessRunner.is_available("definitely-not-a-real-binary-xyz"));
    }

    #[test]
    fn stderr_tail_is_last_line() {
        let out = ProcessOutput {
            stderr: b"warning: x\nerror: broken file\n\n".to_vec(),
            ..ProcessOutput::default()
        };
        assert_eq!(out.stderr_tail(), "error: broken file");
    }
}
