// src/system/executor.rs

use crate::CancellationToken;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command as StdCommand, Stdio};
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Command could not be started with '{shell}': {source}")]
    Spawn {
        shell: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Command exited with {status}: {output}")]
    NonZeroExitStatus { status: String, output: String },
    #[error("Command produced output that was not valid UTF-8")]
    InvalidUtf8Output(#[source] std::string::FromUtf8Error),
    #[error("Could not wait for command: {0}")]
    Wait(#[source] std::io::Error),
    #[error("Command timed out after {0:?}")]
    TimedOut(Duration),
    #[error("Operation was cancelled by the user.")]
    Cancelled,
}

impl ExecutionError {
    /// Combined stdout and stderr captured before the failure, if any.
    pub(crate) fn output(&self) -> &str {
        match self {
            Self::NonZeroExitStatus { output, .. } => output,
            _ => "",
        }
    }
}

/// Captured output of a successful script run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs a script with the given extra environment and captures its output.
/// The resolver uses it for `command` and `subOptionsCommand`.
pub trait ShellRunner: Send + Sync {
    fn run(
        &self,
        script: &str,
        env: &BTreeMap<String, String>,
        cancellation_token: &CancellationToken,
    ) -> Result<CapturedOutput, ExecutionError>;
}

/// Returns an error if the token has been set.
pub fn check_for_cancellation(cancellation_token: &CancellationToken) -> Result<(), ExecutionError> {
    if cancellation_token.load(Ordering::SeqCst) {
        Err(ExecutionError::Cancelled)
    } else {
        Ok(())
    }
}

/// Runs scripts through the system shell (`sh -c` or `cmd /C`), inheriting
/// the process environment.
#[derive(Debug, Clone)]
pub struct SystemShell {
    program: PathBuf,
    args: Vec<String>,
    timeout: Option<Duration>,
    cwd: Option<PathBuf>,
}

impl Default for SystemShell {
    fn default() -> Self {
        if cfg!(target_os = "windows") {
            Self::new("cmd", vec!["/C".to_string()])
        } else {
            Self::new("sh", vec!["-c".to_string()])
        }
    }
}

impl SystemShell {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: None,
            cwd: None,
        }
    }

    /// Kills scripts that run longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cwd(mut self, cwd: Option<PathBuf>) -> Self {
        self.cwd = cwd;
        self
    }

    fn spawn(&self, script: &str, env: &BTreeMap<String, String>) -> Result<Child, ExecutionError> {
        let mut command = StdCommand::new(&self.program);
        command
            .args(&self.args)
            .arg(script)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &self.cwd {
            command.current_dir(dunce::simplified(cwd));
        }

        command.spawn().map_err(|source| ExecutionError::Spawn {
            shell: self.program.display().to_string(),
            source,
        })
    }
}

impl ShellRunner for SystemShell {
    fn run(
        &self,
        script: &str,
        env: &BTreeMap<String, String>,
        cancellation_token: &CancellationToken,
    ) -> Result<CapturedOutput, ExecutionError> {
        check_for_cancellation(cancellation_token)?;

        log::debug!("Executing with {}: {}", self.program.display(), script);
        let mut child = self.spawn(script, env)?;
        let stdout_reader = drain(child.stdout.take());
        let stderr_reader = drain(child.stderr.take());
        let started = Instant::now();

        // Poll so cancellation and timeouts can interrupt the script.
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if check_for_cancellation(cancellation_token).is_err() {
                        log::debug!("Cancellation requested, killing process {}", child.id());
                        kill(&mut child);
                        return Err(ExecutionError::Cancelled);
                    }
                    if let Some(timeout) = self.timeout.filter(|t| started.elapsed() >= *t) {
                        // Grandchildren may still hold the pipes, so the readers are not joined.
                        kill(&mut child);
                        return Err(ExecutionError::TimedOut(timeout));
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    kill(&mut child);
                    return Err(ExecutionError::Wait(e));
                }
            }
        };

        let stdout = collect(stdout_reader);
        let stderr = collect(stderr_reader);
        if !status.success() {
            return Err(ExecutionError::NonZeroExitStatus {
                status: status.to_string(),
                output: combine(stdout, stderr),
            });
        }

        Ok(CapturedOutput {
            stdout: String::from_utf8(stdout).map_err(ExecutionError::InvalidUtf8Output)?,
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }
}

type Reader = Option<JoinHandle<Vec<u8>>>;

// Pipes are drained on their own threads so a chatty script cannot block on a full pipe.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Reader {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            if let Err(e) = pipe.read_to_end(&mut buffer) {
                log::warn!("Failed to read command output: {}", e);
            }
            buffer
        })
    })
}

fn collect(reader: Reader) -> Vec<u8> {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

fn combine(stdout: Vec<u8>, stderr: Vec<u8>) -> String {
    let mut output = String::from_utf8_lossy(&stdout).into_owned();
    output.push_str(&String::from_utf8_lossy(&stderr));
    output
}

fn kill(child: &mut Child) {
    if let Err(e) = child.kill() {
        log::warn!("Failed to kill child process {}: {}", child.id(), e);
    }
    child.wait().ok();
}
