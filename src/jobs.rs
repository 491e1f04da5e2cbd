use libc::pid_t;
use std::fmt;
use std::io::{Result as IoResult, Write};

/// Run state of a tracked job.
///
/// There is no `Done` variant on purpose: a completed job is removed from the
/// table by the reaper, never kept around in a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Running,
    Stopped,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Running => f.write_str("Running"),
            JobState::Stopped => f.write_str("Stopped"),
        }
    }
}

/// One tracked external process.
///
/// Created when a command is launched in the background or when a foreground
/// child is stopped from the terminal. Removed when the process is reaped,
/// killed, or promoted back to the foreground.
#[derive(Debug, Clone)]
pub struct Job {
    /// Table-unique id, shown as `[N]` and referenced by `bg %N` / `fg %N`.
    pub id: usize,
    /// OS process id; stable for the lifetime of the job.
    pub pid: pid_t,
    /// Launch tokens joined with single spaces, for display.
    pub command: String,
    pub state: JobState,
}

/// Insertion-ordered collection of jobs.
///
/// Owned by [`ShellState`](crate::state::ShellState) and therefore mutated
/// only under its mutex; both the built-ins and the signal thread go through
/// that single lock.
pub struct JobTable {
    jobs: Vec<Job>,
    next_id: usize,
}

impl JobTable {
    pub fn new() -> Self {
        Self {
            jobs: Vec::new(),
            next_id: 1,
        }
    }

    /// Add a job and return its id.
    ///
    /// Ids come from a strictly monotonic counter, so an id freed by removing
    /// a job is never handed out again within the same session.
    pub fn insert(&mut self, pid: pid_t, command: String, state: JobState) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        self.jobs.push(Job {
            id,
            pid,
            command,
            state,
        });
        id
    }

    pub fn get(&self, id: usize) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| j.id == id)
    }

    pub fn find_pid(&self, pid: pid_t) -> Option<&Job> {
        self.jobs.iter().find(|j| j.pid == pid)
    }

    /// Remove and return the job tracking `pid`, if any.
    pub fn remove_pid(&mut self, pid: pid_t) -> Option<Job> {
        let index = self.jobs.iter().position(|j| j.pid == pid)?;
        Some(self.jobs.remove(index))
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    /// Write one `[id]  State<TAB>command` line per job, in insertion order,
    /// or a distinct message when the table is empty.
    pub fn write_listing(&self, out: &mut dyn Write) -> IoResult<()> {
        if self.jobs.is_empty() {
            return writeln!(out, "no active jobs");
        }
        for job in &self.jobs {
            writeln!(out, "[{}]  {}\t{}", job.id, job.state, job.command)?;
        }
        Ok(())
    }
}

impl Default for JobTable {
    fn default() -> Self {
        Self::new()
    }
}
