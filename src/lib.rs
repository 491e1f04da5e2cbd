//! An interactive command interpreter with job control.
//!
//! This crate provides the building blocks of a small shell: alias expansion,
//! built-in command dispatch, external process launch, and a job table kept
//! consistent with real OS process state by a signal-driven reaper. Launched
//! processes run in the foreground or background and move between running and
//! stopped states via job-control signals.
//!
//! The main entry points are [`Dispatcher`], which resolves one tokenized
//! command line, and [`signals::install`], which starts the thread that
//! converts asynchronous `SIGCHLD`/`SIGTSTP` delivery into ordinary
//! synchronized job-table updates.

pub mod alias;
mod builtin;
pub mod command;
mod dispatch;
pub mod jobs;
pub mod launcher;
pub mod signals;
pub mod state;

pub use command::Flow;
pub use dispatch::{Dispatcher, tokenize};
pub use state::{Shell, ShellState};
