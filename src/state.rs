use libc::pid_t;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::alias::AliasTable;
use crate::jobs::JobTable;

/// State shared between the main dispatch loop and the signal thread.
///
/// Everything the signal thread may touch lives here, behind one mutex: the
/// job table, the foreground-process marker, and the input history (the
/// SIGTSTP path labels a freshly stopped job with the most recent entry).
pub struct ShellState {
    pub jobs: JobTable,
    /// Pid of the child the main thread is currently blocked on, if any.
    ///
    /// Set right before the foreground wait and cleared right after; its
    /// presence is what tells the SIGTSTP path that the stop belongs to the
    /// foreground child and not to some background job.
    pub foreground: Option<pid_t>,
    /// Append-only record of non-empty input lines, in input order.
    pub history: Vec<String>,
}

pub type SharedState = Arc<Mutex<ShellState>>;

impl ShellState {
    pub fn new() -> Self {
        Self {
            jobs: JobTable::new(),
            foreground: None,
            history: Vec::new(),
        }
    }

    pub fn shared() -> SharedState {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn push_history(&mut self, line: String) {
        self.history.push(line);
    }

    pub fn last_history(&self) -> Option<&str> {
        self.history.last().map(String::as_str)
    }
}

impl Default for ShellState {
    fn default() -> Self {
        Self::new()
    }
}

/// Lock the shared state, recovering from poisoning.
///
/// A panic on either side while holding the lock leaves the table in whatever
/// consistent state the last completed mutation produced, so continuing with
/// the inner value is safe.
pub fn lock(state: &SharedState) -> MutexGuard<'_, ShellState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-session dispatch context handed to every built-in.
///
/// Bundles the thread-safe shared state with the main-thread-only alias
/// table.
pub struct Shell {
    pub state: SharedState,
    pub aliases: AliasTable,
}

impl Shell {
    pub fn new(state: SharedState) -> Self {
        Self {
            state,
            aliases: AliasTable::new(),
        }
    }

    pub fn lock_state(&self) -> MutexGuard<'_, ShellState> {
        lock(&self.state)
    }
}
