//! Asynchronous signal handling.
//!
//! Signals are never acted on in interrupt context. A dedicated thread drains
//! a [`Signals`] iterator and performs all job-table bookkeeping as ordinary
//! code under the shared-state mutex, so the main loop and the signal side
//! can never observe a half-applied mutation.

use anyhow::Result;
use libc::pid_t;
use signal_hook::consts::signal::{SIGCHLD, SIGINT, SIGTSTP};
use signal_hook::iterator::Signals;
use std::io::{self, Result as IoResult, Write};
use std::thread;

use crate::jobs::JobState;
use crate::state::{SharedState, ShellState, lock};

/// Install the signal thread.
///
/// SIGCHLD drives the non-blocking reap loop, SIGTSTP records a stopped
/// foreground child, and SIGINT is swallowed so a Ctrl-C aimed at a
/// foreground child never takes the shell down with it.
pub fn install(state: SharedState) -> Result<()> {
    let mut signals = Signals::new([SIGCHLD, SIGTSTP, SIGINT])?;
    thread::Builder::new().name("signals".into()).spawn(move || {
        for signal in signals.forever() {
            match signal {
                SIGCHLD => reap_children(&state),
                SIGTSTP => {
                    let mut st = lock(&state);
                    if let Some(pid) = st.foreground {
                        let _ = record_stopped(&mut st, pid, &mut io::stdout());
                    }
                }
                // The child gets its own copy from the terminal.
                SIGINT => {}
                _ => {}
            }
        }
    })?;
    Ok(())
}

/// Drain every pending child-termination notification without blocking.
///
/// Each terminated pid that matches a tracked job gets a completion line and
/// is removed from the table. Pids with no job (the currently-waited
/// foreground child) are reaped silently. `WUNTRACED` is deliberately not
/// passed here: stop transitions belong to the foreground wait.
pub fn reap_children(state: &SharedState) {
    loop {
        let mut status: i32 = 0;
        let pid = unsafe { libc::waitpid(-1, &mut status, libc::WNOHANG) };
        if pid <= 0 {
            break;
        }
        let mut st = lock(state);
        if let Some(job) = st.jobs.remove_pid(pid) {
            println!("[{}]  Done\t{}", job.id, job.command);
        }
    }
}

/// Record `pid` as a Stopped job, labeled with the most recent history entry,
/// and print the updated job listing.
///
/// Insert-if-absent: both the SIGTSTP path and the foreground wait call this
/// when they observe a stop, and whichever runs second must not produce a
/// second job for the same pid.
pub fn record_stopped(st: &mut ShellState, pid: pid_t, out: &mut dyn Write) -> IoResult<()> {
    if st.jobs.find_pid(pid).is_some() {
        return Ok(());
    }
    let command = st.last_history().unwrap_or_default().to_string();
    let id = st.jobs.insert(pid, command, JobState::Stopped);
    writeln!(out, "\njob [{}] stopped: {}", id, pid)?;
    st.jobs.write_listing(out)
}
