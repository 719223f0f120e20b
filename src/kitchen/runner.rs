// src/kitchen/runner.rs

//! External process execution with a shared deadline
//!
//! Every external tool the pipeline drives (git, the host package manager,
//! build systems, signing tools) goes through [`CommandRunner`]. Child
//! processes get their own process group so a timeout or cancellation kills
//! the whole tree a build system spawned, not only the direct child. Once a
//! step's leader exits, anything it left running in its group is killed too,
//! and output collection is bounded by the same deadline.

use crate::error::{Error, Result, Stage};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::collections::BTreeMap;
use std::io::Read;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Interval between deadline/cancellation checks while a child runs
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long to wait for output readers after a child was killed
const KILL_GRACE: Duration = Duration::from_secs(1);

/// Shared cancellation switch, flipped by signal handlers
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Overall time budget for one pipeline run
#[derive(Debug, Clone)]
pub struct Deadline {
    started: Instant,
    limit: Duration,
    cancel: CancelFlag,
}

impl Deadline {
    pub fn new(limit: Duration, cancel: CancelFlag) -> Self {
        Self {
            started: Instant::now(),
            limit,
            cancel,
        }
    }

    /// Time left, or `None` once expired
    pub fn remaining(&self) -> Option<Duration> {
        self.limit.checked_sub(self.started.elapsed())
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// Fail with a timeout error if the run must stop
    pub fn check(&self, stage: Stage) -> Result<()> {
        if let Some(reason) = self.interruption() {
            return Err(Error::Timeout { stage, reason });
        }
        Ok(())
    }

    fn interruption(&self) -> Option<String> {
        if self.cancel.is_cancelled() {
            Some("run cancelled".to_string())
        } else if self.remaining().is_none() {
            Some(format!(
                "pipeline exceeded {}s timeout",
                self.limit.as_secs()
            ))
        } else {
            None
        }
    }
}

/// One external command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
        }
    }

    /// Run `script` with `sh -c`
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new("sh").arg("-e").arg("-c").arg(script)
    }

    /// Build from an argv vector; `None` if it is empty
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone()).args(args.iter().cloned()))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs(mut self, vars: &BTreeMap<String, String>) -> Self {
        self.env
            .extend(vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Human-readable command line
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code; `None` if killed by a signal or never started
    pub exit_code: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }

    /// Last `lines` lines of combined output
    pub fn tail(&self, lines: usize) -> String {
        let combined = self.combined();
        let all: Vec<&str> = combined.lines().collect();
        all[all.len().saturating_sub(lines)..].join("\n")
    }
}

/// Runs commands under a [`Deadline`]
#[derive(Debug, Clone)]
pub struct CommandRunner {
    deadline: Deadline,
    /// Variables removed from every child environment
    hidden_env: Vec<String>,
}

impl CommandRunner {
    pub fn new(deadline: Deadline) -> Self {
        Self {
            deadline,
            hidden_env: Vec::new(),
        }
    }

    /// Never pass `name` to a child, even if a spec sets it
    pub fn hide_env(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !name.is_empty() && !self.hidden_env.contains(&name) {
            self.hidden_env.push(name);
        }
        self
    }

    pub fn deadline(&self) -> &Deadline {
        &self.deadline
    }

    /// Run a command to completion
    ///
    /// A non-zero exit is reported through [`CommandOutput::success`], as is
    /// a program that could not be started. Only an expired deadline or a
    /// cancellation is an `Err`, tagged with `stage`.
    pub fn run(&self, spec: &CommandSpec, stage: Stage) -> Result<CommandOutput> {
        self.deadline.check(stage)?;
        debug!("Running: {}", spec.display());

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);
        for name in &self.hidden_env {
            command.env_remove(name);
        }
        if let Some(dir) = &spec.cwd {
            command.current_dir(dir);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return Ok(CommandOutput {
                    exit_code: None,
                    success: false,
                    stdout: String::new(),
                    stderr: format!("failed to start '{}': {}", spec.program, e),
                });
            }
        };

        let group = i32::try_from(child.id()).ok().map(Pid::from_raw);
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = loop {
            let wait = self
                .deadline
                .remaining()
                .map_or(Duration::ZERO, |left| left.min(POLL_INTERVAL));
            if let Some(status) = child.wait_timeout(wait)? {
                break status;
            }
            if let Some(reason) = self.deadline.interruption() {
                warn!("Stopping '{}': {}", spec.display(), reason);
                terminate(&mut child);
                let _ = collect(stdout, KILL_GRACE);
                let _ = collect(stderr, KILL_GRACE);
                return Err(Error::Timeout { stage, reason });
            }
        };

        // Background processes the step left behind die with it
        if let Some(group) = group {
            let _ = killpg(group, Signal::SIGKILL);
        }

        let stdout = self.finish_reader(stdout, spec, stage)?;
        let stderr = self.finish_reader(stderr, spec, stage)?;
        Ok(CommandOutput {
            exit_code: status.code(),
            success: status.success(),
            stdout,
            stderr,
        })
    }

    /// Wait for a pipe reader, giving up when the run must stop
    ///
    /// A process that escaped the step's group can hold the pipe open
    /// indefinitely.
    fn finish_reader(
        &self,
        reader: Option<Receiver<String>>,
        spec: &CommandSpec,
        stage: Stage,
    ) -> Result<String> {
        let Some(reader) = reader else {
            return Ok(String::new());
        };
        loop {
            let wait = self
                .deadline
                .remaining()
                .map_or(Duration::ZERO, |left| left.min(POLL_INTERVAL));
            match reader.recv_timeout(wait) {
                Ok(text) => return Ok(text),
                Err(RecvTimeoutError::Disconnected) => return Ok(String::new()),
                Err(RecvTimeoutError::Timeout) => {
                    if let Some(reason) = self.deadline.interruption() {
                        warn!("Output of '{}' still open: {}", spec.display(), reason);
                        return Err(Error::Timeout { stage, reason });
                    }
                }
            }
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<Receiver<String>> {
    pipe.map(|mut pipe| {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
        });
        rx
    })
}

fn collect(reader: Option<Receiver<String>>, wait: Duration) -> String {
    reader
        .and_then(|rx| rx.recv_timeout(wait).ok())
        .unwrap_or_default()
}

fn terminate(child: &mut Child) {
    if let Ok(pid) = i32::try_from(child.id()) {
        let _ = killpg(Pid::from_raw(pid), Signal::SIGKILL);
    }
    let _ = child.kill();
    let _ = child.wait();
}
