//! External command execution.

use super::line::split_command_line;
use crate::errors::{CommandExecutionError, E2eError, E2eResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// How long to wait for output readers after the process has exited.
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// An external command to run.
///
/// The working directory is implicit: the process's current directory at the
/// time of invocation. Use [`crate::workdir::with_directory`] to scope it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    /// The original command line, used in logs and errors.
    pub line: String,
    /// Executable to spawn.
    pub program: String,
    /// Arguments.
    pub args: Vec<String>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
    /// Maximum duration; the runner default applies when `None`.
    pub timeout: Option<Duration>,
}

impl ExternalCommand {
    /// Creates a command from a program and pre-split arguments.
    #[must_use]
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let program = program.into();
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        let line = std::iter::once(program.as_str())
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            line,
            program,
            args,
            env: Vec::new(),
            timeout: None,
        }
    }

    /// Parses a command line into a command.
    pub fn parse(line: impl Into<String>) -> E2eResult<Self> {
        let line = line.into();
        let mut words = split_command_line(&line)?.into_iter();
        let program = words.next().unwrap_or_default();
        Ok(Self {
            program,
            args: words.collect(),
            line,
            env: Vec::new(),
            timeout: None,
        })
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Sets the maximum duration.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Outcome of a command that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// The command line.
    pub command: String,
    /// Exit code; `-1` when terminated by a signal.
    pub exit_code: i32,
    /// Interleaved stdout and stderr.
    pub output: String,
    /// Wall-clock duration.
    pub duration: Duration,
}

impl CommandOutput {
    /// Returns true if the command exited with status zero.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Converts a nonzero exit into [`E2eError::CommandExecution`].
    pub fn check(self) -> E2eResult<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(CommandExecutionError::non_zero(self.command, self.exit_code, self.output).into())
        }
    }
}

/// Runs external commands.
///
/// `run` returns `Ok` for any command that ran to completion, whatever its
/// exit code. Only spawn failures and exceeded time limits are errors.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs a command and captures its combined output.
    async fn run(&self, command: &ExternalCommand) -> E2eResult<CommandOutput>;
}

impl std::fmt::Debug for dyn CommandRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn CommandRunner")
    }
}

/// Parses `line` and runs it with `runner`.
pub async fn run_line(runner: &dyn CommandRunner, line: &str) -> E2eResult<CommandOutput> {
    let command = ExternalCommand::parse(line)?;
    runner.run(&command).await
}

/// A [`CommandRunner`] that spawns real processes with tokio.
#[derive(Debug, Clone)]
pub struct SystemCommandRunner {
    default_timeout: Duration,
    env: Vec<(String, String)>,
}

impl Default for SystemCommandRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(600))
    }
}

impl SystemCommandRunner {
    /// Creates a runner with the given default per-command time limit.
    #[must_use]
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            default_timeout,
            env: Vec::new(),
        }
    }

    /// Adds an environment variable passed to every command.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, command: &ExternalCommand) -> E2eResult<CommandOutput> {
        let limit = command.timeout.unwrap_or(self.default_timeout);
        debug!(command = %command.line, timeout_secs = limit.as_secs_f64(), "Running command");

        let start = Instant::now();
        let mut child = tokio::process::Command::new(&command.program)
            .args(&command.args)
            .envs(self.env.iter().cloned())
            .envs(command.env.iter().cloned())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CommandExecutionError::spawn(&command.line, e.to_string()))?;

        let buffer = Arc::new(Mutex::new(String::new()));
        let readers = [
            child.stdout.take().map(|out| spawn_reader(out, buffer.clone())),
            child.stderr.take().map(|err| spawn_reader(err, buffer.clone())),
        ];

        let waited = tokio::time::timeout(limit, child.wait()).await;
        let timed_out = waited.is_err();
        if timed_out {
            if let Err(e) = child.kill().await {
                warn!(command = %command.line, error = %e, "Failed to kill timed out command");
            }
        }
        for reader in readers.into_iter().flatten() {
            drain_reader(reader).await;
        }
        let output = std::mem::take(&mut *buffer.lock());
        let duration = start.elapsed();

        let status = match waited {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => return Err(E2eError::Io(e)),
            Err(_) => {
                warn!(command = %command.line, ?limit, "Command timed out");
                return Err(CommandExecutionError::timed_out(&command.line, limit, output).into());
            }
        };

        let exit_code = status.code().unwrap_or(-1);
        debug!(
            command = %command.line,
            exit_code,
            duration_ms = duration.as_millis() as u64,
            "Command finished"
        );

        Ok(CommandOutput {
            command: command.line.clone(),
            exit_code,
            output,
            duration,
        })
    }
}

// Reads raw bytes until EOF; invalid UTF-8 is replaced, never fatal.
fn spawn_reader<R>(reader: R, buffer: Arc<Mutex<String>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut raw = Vec::new();
        loop {
            raw.clear();
            match reader.read_until(b'\n', &mut raw).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&raw);
                    let line = line.trim_end_matches(['\r', '\n']);
                    trace!(line = %line, "command output");
                    let mut buf = buffer.lock();
                    buf.push_str(line);
                    buf.push('\n');
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read command output");
                    break;
                }
            }
        }
    })
}

// A grandchild can keep a pipe open after its parent exits.
async fn drain_reader(mut reader: JoinHandle<()>) {
    if tokio::time::timeout(READER_DRAIN_TIMEOUT, &mut reader).await.is_err() {
        reader.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CommandFailureKind;

    #[test]
    fn test_parse_command() {
        let cmd = ExternalCommand::parse("make uninstall ignore-not-found=true").unwrap();
        assert_eq!(cmd.program, "make");
        assert_eq!(cmd.args, vec!["uninstall", "ignore-not-found=true"]);
        assert_eq!(cmd.line, "make uninstall ignore-not-found=true");
    }

    #[test]
    fn test_check_nonzero() {
        let output = CommandOutput {
            command: "false".to_string(),
            exit_code: 1,
            output: String::new(),
            duration: Duration::ZERO,
        };
        let err = output.check().unwrap_err();
        match err {
            E2eError::CommandExecution(e) => {
                assert_eq!(e.kind, CommandFailureKind::NonZeroExit);
                assert_eq!(e.exit_code, Some(1));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runs_and_captures_combined_output() {
        let runner = SystemCommandRunner::default();
        let output = run_line(&runner, "sh -c 'echo out; echo err 1>&2'").await.unwrap();
        assert!(output.success());
        assert!(output.output.contains("out\n"));
        assert!(output.output.contains("err\n"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_not_an_error() {
        let runner = SystemCommandRunner::default();
        let output = run_line(&runner, "sh -c 'echo nope; exit 3'").await.unwrap();
        assert_eq!(output.exit_code, 3);
        assert!(!output.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invalid_utf8_output_is_drained() {
        let runner = SystemCommandRunner::default();
        let script = r#"sh -c 'printf "\377\n"; i=0; while [ $i -lt 5000 ]; do echo "line $i"; i=$((i+1)); done; echo done'"#;
        let output = run_line(&runner, script).await.unwrap();

        assert_eq!(output.exit_code, 0);
        assert!(output.output.starts_with('\u{FFFD}'));
        assert!(output.output.contains("line 4999\n"));
        assert!(output.output.ends_with("done\n"));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_distinct() {
        let runner = SystemCommandRunner::default();
        let err = run_line(&runner, "e2eflow-definitely-missing-binary --flag")
            .await
            .unwrap_err();
        match err {
            E2eError::CommandExecution(e) => assert_eq!(e.kind, CommandFailureKind::Spawn),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_command() {
        let runner = SystemCommandRunner::default();
        let command = ExternalCommand::parse("sleep 10")
            .unwrap()
            .with_timeout(Duration::from_millis(200));
        let start = Instant::now();
        let err = runner.run(&command).await.unwrap_err();
        assert!(start.elapsed() < Duration::from_secs(5));
        match err {
            E2eError::CommandExecution(e) => assert_eq!(e.kind, CommandFailureKind::TimedOut),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_env_is_passed() {
        let runner = SystemCommandRunner::default().with_env("E2E_RUNNER_VAR", "shared");
        let command = ExternalCommand::parse("sh -c 'echo $E2E_RUNNER_VAR-$E2E_CMD_VAR'")
            .unwrap()
            .with_env("E2E_CMD_VAR", "local");
        let output = runner.run(&command).await.unwrap();
        assert_eq!(output.output.trim(), "shared-local");
    }
}
