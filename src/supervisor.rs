// SPDX-License-Identifier: PMPL-1.0-or-later

//! Supervised execution of one stress binary.
//!
//! A launcher thread spawns the child, hands its pid back over a one-shot
//! channel, then blocks on the child and reports the exit over a second
//! channel. The caller selects between that completion channel and a
//! one-shot timer. Whichever fires first decides the outcome, so a run is
//! either completed or timed out, never both.
//!
//! A timed-out child gets `SIGQUIT` first. If it is still alive once the
//! grace period runs out it is killed outright, and `run` only returns after
//! the launcher has reaped it, so the next run never shares the binary or
//! run directory with a leftover process.
//!
//! Standard input is inherited, standard output discarded and standard
//! error captured in the run's log file. The log is deleted after a clean
//! pass and kept as evidence otherwise.

use crate::types::RunOutcome;
use crossbeam_channel::{select, Receiver, Sender};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

pub const TIMEOUT_MARKER: &str = "STDSTRESS TIMEOUT";
pub const SPAWN_FAILED_MARKER: &str = "STDSTRESS SPAWN FAILED";

/// How long a timed-out child gets to exit after the quit signal.
pub const TERMINATION_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("creating run log {}: {source}", .path.display())]
    Log {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("starting launcher thread: {0}")]
    Launcher(#[source] io::Error),
}

/// Delivers the termination requests to a timed-out child.
pub trait Terminator: Send + Sync {
    /// First request, sent when the timer fires.
    fn terminate(&self, pid: u32) -> io::Result<()>;

    /// Sent once if the child outlives the grace period after `terminate`.
    fn kill(&self, pid: u32) -> io::Result<()>;
}

/// Sends `SIGQUIT`, which asks the runtime for a goroutine dump on its way
/// out, and `SIGKILL` for a child that traps it.
#[derive(Debug, Default, Clone, Copy)]
pub struct QuitSignal;

impl Terminator for QuitSignal {
    #[cfg(unix)]
    fn terminate(&self, pid: u32) -> io::Result<()> {
        send_signal(pid, nix::sys::signal::Signal::SIGQUIT)
    }

    #[cfg(unix)]
    fn kill(&self, pid: u32) -> io::Result<()> {
        send_signal(pid, nix::sys::signal::Signal::SIGKILL)
    }

    #[cfg(not(unix))]
    fn terminate(&self, _pid: u32) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "quit signal is only available on unix",
        ))
    }

    #[cfg(not(unix))]
    fn kill(&self, _pid: u32) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "kill by pid is only available on unix",
        ))
    }
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: nix::sys::signal::Signal) -> io::Result<()> {
    use nix::unistd::Pid;

    let pid = i32::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    nix::sys::signal::kill(Pid::from_raw(pid), signal).map_err(io::Error::from)
}

/// What happened to one supervised run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Completed { success: bool },
    TimedOut { pid: u32 },
    SpawnFailed,
}

impl RunState {
    pub fn outcome(&self) -> RunOutcome {
        match self {
            RunState::Completed { success: true } => RunOutcome::Passed,
            RunState::Completed { success: false } => RunOutcome::RuntimeFailed,
            RunState::TimedOut { .. } => RunOutcome::TimedOut,
            RunState::SpawnFailed => RunOutcome::SpawnFailed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisedRun {
    pub state: RunState,
    pub pid: Option<u32>,
    pub elapsed: Duration,
    /// Present unless the run passed cleanly.
    pub log: Option<PathBuf>,
}

impl SupervisedRun {
    pub fn outcome(&self) -> RunOutcome {
        self.state.outcome()
    }
}

pub struct Supervisor {
    timeout: Option<Duration>,
    grace: Duration,
    terminator: Box<dyn Terminator>,
}

impl Supervisor {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self::with_terminator(timeout, Box::new(QuitSignal))
    }

    pub fn with_terminator(timeout: Option<Duration>, terminator: Box<dyn Terminator>) -> Self {
        Self {
            timeout,
            grace: TERMINATION_GRACE,
            terminator,
        }
    }

    /// How long a timed-out child may take to exit before it is killed.
    pub fn grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Run `binary` from `run_dir`, capturing its stderr into `log_path`.
    pub fn run(
        &self,
        binary: &Path,
        run_dir: &Path,
        log_path: &Path,
        env: &[(OsString, OsString)],
    ) -> Result<SupervisedRun, SupervisorError> {
        let log_error = |source| SupervisorError::Log {
            path: log_path.to_path_buf(),
            source,
        };
        let mut log = File::create(log_path).map_err(log_error)?;
        let child_stderr = log.try_clone().map_err(log_error)?;

        // A relative program path would be resolved against `run_dir`.
        let program = std::path::absolute(binary).unwrap_or_else(|_| binary.to_path_buf());
        let mut command = Command::new(&program);
        command
            .current_dir(run_dir)
            .envs(env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::inherit())
            .stdout(Stdio::null())
            .stderr(Stdio::from(child_stderr));

        let (handoff_tx, handoff_rx) = crossbeam_channel::bounded(1);
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let started = Instant::now();
        let launcher = thread::Builder::new()
            .name("stdstress-launcher".to_string())
            .spawn(move || launch(command, handoff_tx, done_tx))
            .map_err(SupervisorError::Launcher)?;

        let pid = match handoff_rx.recv() {
            Ok(Ok(pid)) => pid,
            Ok(Err(reason)) => {
                let _ = launcher.join();
                let _ = writeln!(log, "{}: {}", SPAWN_FAILED_MARKER, reason);
                tracing::warn!(binary = %binary.display(), %reason, "stress binary did not spawn");
                return Ok(SupervisedRun {
                    state: RunState::SpawnFailed,
                    pid: None,
                    elapsed: started.elapsed(),
                    log: Some(log_path.to_path_buf()),
                });
            }
            Err(_) => {
                let _ = launcher.join();
                let _ = writeln!(log, "{}: launcher exited without a process", SPAWN_FAILED_MARKER);
                return Ok(SupervisedRun {
                    state: RunState::SpawnFailed,
                    pid: None,
                    elapsed: started.elapsed(),
                    log: Some(log_path.to_path_buf()),
                });
            }
        };

        let state = self.await_completion(pid, &done_rx, &mut log);
        let elapsed = started.elapsed();

        if let RunState::TimedOut { .. } = state {
            self.reap_timed_out(pid, &done_rx, &mut log);
        }
        let _ = launcher.join();
        drop(log);

        let log = if state == (RunState::Completed { success: true }) {
            if let Err(err) = fs::remove_file(log_path) {
                tracing::warn!(log = %log_path.display(), %err, "could not remove passing run log");
            }
            None
        } else {
            Some(log_path.to_path_buf())
        };

        Ok(SupervisedRun {
            state,
            pid: Some(pid),
            elapsed,
            log,
        })
    }

    /// Wait out the grace period, then kill. Returns once the child is gone.
    fn reap_timed_out(&self, pid: u32, done: &Receiver<bool>, log: &mut File) {
        if done.recv_timeout(self.grace).is_ok() {
            return;
        }
        tracing::warn!(
            pid,
            grace = ?self.grace,
            "timed-out process ignored the quit signal, killing it"
        );
        let _ = writeln!(log, "{} killed after {:?} grace", TIMEOUT_MARKER, self.grace);
        if let Err(err) = self.terminator.kill(pid) {
            // ESRCH here means it exited on its own in the meantime.
            tracing::warn!(pid, %err, "could not kill timed-out process");
        }
        // The launcher always reports once `wait` returns, or hangs up.
        let _ = done.recv();
    }

    fn await_completion(&self, pid: u32, done: &Receiver<bool>, log: &mut File) -> RunState {
        let Some(timeout) = self.timeout else {
            return RunState::Completed {
                success: done.recv().unwrap_or(false),
            };
        };

        let timer = crossbeam_channel::after(timeout);
        select! {
            recv(done) -> exit => RunState::Completed {
                success: exit.unwrap_or(false),
            },
            recv(timer) -> _ => {
                let _ = writeln!(log, "{} after {:?}", TIMEOUT_MARKER, timeout);
                if let Err(err) = self.terminator.terminate(pid) {
                    tracing::warn!(pid, %err, "could not signal timed-out process");
                }
                tracing::info!(pid, ?timeout, "stress binary timed out");
                RunState::TimedOut { pid }
            },
        }
    }
}

fn launch(mut command: Command, handoff: Sender<Result<u32, String>>, done: Sender<bool>) {
    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => {
            let _ = handoff.send(Err(err.to_string()));
            return;
        }
    };
    if handoff.send(Ok(child.id())).is_err() {
        let _ = child.kill();
        let _ = child.wait();
        return;
    }
    let success = child.wait().map(|status| status.success()).unwrap_or(false);
    let _ = done.send(success);
}
