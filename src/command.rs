use anyhow::Result;
use std::io::Write;

use crate::state::Shell;

/// What the dispatch loop should do after a command has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Read the next input line.
    Continue,
    /// Terminate the shell; invoking `exit` is the only way to produce this.
    Exit,
}

/// Object-safe trait for anything the dispatcher can run.
///
/// Implemented by built-ins via a blanket impl in [`crate::builtin`].
pub trait ExecutableCommand {
    /// Executes the command against the shell context, writing all
    /// user-visible output to `out`.
    fn execute(self: Box<Self>, shell: &mut Shell, out: &mut dyn Write) -> Result<Flow>;
}

/// Factory that tries to create a command from a name and its arguments.
///
/// Returns `None` when the factory doesn't recognize the `name`; the
/// dispatcher then falls through to the next factory and finally to the
/// external-process launcher.
pub trait CommandFactory {
    fn try_create(&self, name: &str, args: &[&str]) -> Option<Box<dyn ExecutableCommand>>;
}
