//! Toolchain process execution
//!
//! Runs one [`Invocation`] as a child process and reports how it ended:
//! - The environment is cleared and only [`ENV_ALLOWLIST`] is passed through
//! - The child leads its own process group so termination reaches the
//!   compiler's subprocesses (cc1plus, as, ld) too
//! - stdout and stderr are drained on separate threads so a chatty compiler
//!   cannot block on a full pipe
//! - The wall-clock limit and cancellation are polled while the child runs;
//!   either one sends SIGTERM to the group, then SIGKILL after the grace period

use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cancel::CancellationToken;
use crate::invocation::Invocation;
use crate::timeout::{TimeoutConfig, TimeoutEnforcer};

/// Environment variables passed to the toolchain; everything else is dropped.
pub const ENV_ALLOWLIST: &[&str] = &[
    "PATH",
    "HOME",
    "LANG",
    "LC_ALL",
    "TMPDIR",
    "USER",
    "DOCKER_HOST",
];

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Errors from executor operations
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error while waiting for the toolchain: {0}")]
    Io(#[from] io::Error),
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// Limits applied to one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Wall-clock limit for the whole invocation
    pub timeout: Duration,
    /// Time between SIGTERM and SIGKILL
    pub grace: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::from(&TimeoutConfig::default())
    }
}

impl From<&TimeoutConfig> for ExecutorConfig {
    fn from(config: &TimeoutConfig) -> Self {
        Self {
            timeout: config.overall(),
            grace: config.grace(),
        }
    }
}

/// How the toolchain process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Exited normally with this code
    Exited(i32),
    /// Killed by this signal, not by us
    Signaled(i32),
    /// Exceeded the wall-clock limit and was terminated
    TimedOut,
    /// Cancellation was requested and the process was terminated
    Cancelled,
}

/// Result of one execution
#[derive(Debug, Clone)]
pub struct BuildResult {
    pub outcome: BuildOutcome,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub duration: Duration,
}

impl BuildResult {
    /// Diagnostics as text; invalid UTF-8 is replaced
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    pub fn success(&self) -> bool {
        self.outcome == BuildOutcome::Exited(0)
    }
}

/// Runs toolchain invocations
#[derive(Debug, Clone, Default)]
pub struct Executor {
    config: ExecutorConfig,
    cancel: CancellationToken,
}

impl Executor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Use a shared cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the invocation to completion, timeout or cancellation
    pub fn run(&self, invocation: &Invocation) -> ExecutorResult<BuildResult> {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .env_clear()
            .envs(allowed_env())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &invocation.working_dir {
            command.current_dir(dir);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        debug!(program = %invocation.program, args = ?invocation.args, "spawning toolchain");
        let start = Instant::now();
        let mut child = command.spawn().map_err(|source| ExecutorError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        self.cancel.set_active_group(child.id() as i32);
        let outcome = self.supervise(&mut child);
        self.cancel.clear_active_group();
        let outcome = outcome?;

        let stdout = join_drain(stdout);
        let stderr = join_drain(stderr);
        let duration = start.elapsed();

        info!(
            outcome = ?outcome,
            duration_ms = duration.as_millis() as u64,
            stderr_bytes = stderr.len(),
            "toolchain finished"
        );

        Ok(BuildResult {
            outcome,
            stdout,
            stderr,
            duration,
        })
    }

    /// Wait for the child, its deadline or cancellation
    fn supervise(&self, child: &mut Child) -> ExecutorResult<BuildOutcome> {
        let enforcer = TimeoutEnforcer::new(self.config.timeout);
        loop {
            if let Some(status) = child.try_wait()? {
                // Anything the toolchain left running would hold the output
                // pipes open past the deadline.
                signal_group(child, GroupSignal::Kill);
                return Ok(exit_outcome(status));
            }
            if self.cancel.is_cancelled() {
                warn!(pid = child.id(), "cancellation requested, terminating toolchain");
                self.terminate(child)?;
                return Ok(BuildOutcome::Cancelled);
            }
            if enforcer.expired() {
                warn!(
                    pid = child.id(),
                    limit_secs = enforcer.limit().as_secs(),
                    "toolchain exceeded time limit, terminating"
                );
                self.terminate(child)?;
                return Ok(BuildOutcome::TimedOut);
            }
            std::thread::sleep(POLL_INTERVAL.min(enforcer.remaining().max(Duration::from_millis(1))));
        }
    }

    /// SIGTERM the process group, then SIGKILL after the grace period
    fn terminate(&self, child: &mut Child) -> ExecutorResult<()> {
        signal_group(child, GroupSignal::Term);

        let start = Instant::now();
        while start.elapsed() < self.config.grace {
            if child.try_wait()?.is_some() {
                // The leader is gone; make sure nothing it forked lingers.
                signal_group(child, GroupSignal::Kill);
                return Ok(());
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        debug!(pid = child.id(), "grace period elapsed, sending SIGKILL");
        signal_group(child, GroupSignal::Kill);
        let _ = child.kill();
        child.wait()?;
        Ok(())
    }
}

fn allowed_env() -> Vec<(String, String)> {
    ENV_ALLOWLIST
        .iter()
        .filter_map(|key| std::env::var(key).ok().map(|value| (key.to_string(), value)))
        .collect()
}

fn drain<R: Read + Send + 'static>(stream: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    stream.map(|mut stream| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stream.read_to_end(&mut buf);
            buf
        })
    })
}

fn join_drain(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

fn exit_outcome(status: ExitStatus) -> BuildOutcome {
    if let Some(code) = status.code() {
        return BuildOutcome::Exited(code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return BuildOutcome::Signaled(signal);
        }
    }
    BuildOutcome::Exited(-1)
}

enum GroupSignal {
    Term,
    Kill,
}

#[cfg(unix)]
fn signal_group(child: &Child, which: GroupSignal) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let signal = match which {
        GroupSignal::Term => Signal::SIGTERM,
        GroupSignal::Kill => Signal::SIGKILL,
    };
    // ESRCH just means the group already exited.
    let _ = killpg(Pid::from_raw(child.id() as i32), signal);
}

#[cfg(not(unix))]
fn signal_group(_child: &Child, _which: GroupSignal) {}

/// SIGKILL a process group by id
#[cfg(unix)]
pub fn kill_group(pgid: i32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let _ = killpg(Pid::from_raw(pgid), Signal::SIGKILL);
}

#[cfg(not(unix))]
pub fn kill_group(_pgid: i32) {}
