//! External process launch and the foreground wait.
//!
//! Spawning goes through `std::process::Command`, which resolves the first
//! token against `PATH` the way `execvp` would. Waiting uses raw `waitpid`
//! because the foreground wait must observe stop transitions (`WUNTRACED`),
//! which `std`'s `Child::wait` does not report.

use anyhow::Result;
use libc::pid_t;
use std::io::{self, Write};
use std::process::Command;

use crate::command::Flow;
use crate::jobs::JobState;
use crate::signals::record_stopped;
use crate::state::Shell;

/// How a foreground wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The child exited, was killed by a signal, or had already been reaped
    /// by the signal thread.
    Exited,
    /// The child was stopped from the terminal and is still alive.
    Stopped,
}

/// Launch `tokens` as an external process.
///
/// Foreground launches block until the child exits or stops; background
/// launches register a Running job and return immediately. A spawn failure is
/// reported on `out` and leaves all shell state unchanged.
pub fn launch(shell: &mut Shell, tokens: &[String], background: bool, out: &mut dyn Write) -> Result<Flow> {
    let Some((program, args)) = tokens.split_first() else {
        return Ok(Flow::Continue);
    };

    let child = match Command::new(program).args(args).spawn() {
        Ok(child) => child,
        Err(err) => {
            writeln!(out, "jobsh: {}: {}", program, err)?;
            return Ok(Flow::Continue);
        }
    };
    let pid = child.id() as pid_t;
    let command_line = tokens.join(" ");

    if background {
        let mut state = shell.lock_state();
        let id = state.jobs.insert(pid, command_line.clone(), JobState::Running);
        writeln!(out, "[{}] {}\t{}", id, pid, command_line)?;
        return Ok(Flow::Continue);
    }

    shell.lock_state().foreground = Some(pid);
    // The lock is released while we block; the signal thread stays free to
    // reap background jobs and to react to a terminal stop.
    let outcome = wait_foreground(pid);
    let mut state = shell.lock_state();
    state.foreground = None;
    if outcome == WaitOutcome::Stopped {
        record_stopped(&mut state, pid, out)?;
    }
    Ok(Flow::Continue)
}

/// Block until `pid` exits or stops.
///
/// `EINTR` restarts the wait. `ECHILD` means the signal thread's reap loop
/// collected the child first; that only happens after termination, so it
/// counts as an exit.
pub fn wait_foreground(pid: pid_t) -> WaitOutcome {
    loop {
        let mut status: i32 = 0;
        let rc = unsafe { libc::waitpid(pid, &mut status, libc::WUNTRACED) };
        if rc == pid {
            if libc::WIFSTOPPED(status) {
                return WaitOutcome::Stopped;
            }
            return WaitOutcome::Exited;
        }
        if rc == -1 && io::Error::last_os_error().raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return WaitOutcome::Exited;
    }
}

/// Deliver `signal` to `pid`, surfacing the OS error on failure.
pub fn send_signal(pid: pid_t, signal: i32) -> io::Result<()> {
    if unsafe { libc::kill(pid, signal) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
