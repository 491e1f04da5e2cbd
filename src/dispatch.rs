use anyhow::Result;
use std::io::Write;

use crate::builtin::{Alias, Bg, Cd, Exit, Fg, History, Jobs, Kill, Unalias};
use crate::command::{CommandFactory, Flow};
use crate::launcher;
use crate::state::Shell;

/// How many alias substitution rounds a single input line may trigger.
///
/// `alias x=x` would otherwise recurse forever; the chain is cut here and
/// reported as a loop.
const MAX_ALIAS_DEPTH: usize = 64;

/// Factory allows creating instances of ExecutableCommand.
///
/// One `Factory<T>` per built-in; the [`CommandFactory`] impl lives next to
/// the built-ins in [`crate::builtin`].
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

/// Split a raw input line into tokens.
///
/// Splits on single spaces with no quoting support; a token containing a
/// literal space cannot be expressed.
pub fn tokenize(line: &str) -> Vec<String> {
    line.split(' ')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Strip a trailing `&` token, reporting whether the command should run in
/// the background. A lone `&` is left alone and will fail at spawn time.
fn split_background(mut tokens: Vec<String>) -> (Vec<String>, bool) {
    if tokens.len() > 1 && tokens.last().map(String::as_str) == Some("&") {
        tokens.pop();
        return (tokens, true);
    }
    (tokens, false)
}

/// Resolves one tokenized command line: alias substitution, then built-in
/// lookup, then fallback to the external launcher.
pub struct Dispatcher {
    factories: Vec<Box<dyn CommandFactory>>,
}

impl Dispatcher {
    pub fn new(factories: Vec<Box<dyn CommandFactory>>) -> Self {
        Self { factories }
    }

    /// Run one command line and report whether the shell should keep reading.
    pub fn dispatch(&self, shell: &mut Shell, tokens: Vec<String>, out: &mut dyn Write) -> Result<Flow> {
        self.dispatch_at(shell, tokens, out, 0)
    }

    fn dispatch_at(
        &self,
        shell: &mut Shell,
        tokens: Vec<String>,
        out: &mut dyn Write,
        depth: usize,
    ) -> Result<Flow> {
        if tokens.is_empty() {
            return Ok(Flow::Continue);
        }

        // One substitution round per call; multi-level aliasing works by
        // repeated recursive dispatch.
        if let Some(replacement) = shell.aliases.lookup(&tokens[0]).map(<[String]>::to_vec) {
            if depth >= MAX_ALIAS_DEPTH {
                writeln!(out, "jobsh: {}: alias expansion loop", tokens[0])?;
                return Ok(Flow::Continue);
            }
            let mut expanded = replacement;
            expanded.extend(tokens.into_iter().skip(1));
            return self.dispatch_at(shell, expanded, out, depth + 1);
        }

        let args: Vec<&str> = tokens.iter().skip(1).map(String::as_str).collect();
        for factory in &self.factories {
            if let Some(cmd) = factory.try_create(&tokens[0], &args) {
                return cmd.execute(shell, out);
            }
        }

        let (tokens, background) = split_background(tokens);
        launcher::launch(shell, &tokens, background, out)
    }
}

impl Default for Dispatcher {
    /// A dispatcher knowing the full built-in command set.
    fn default() -> Self {
        Self::new(vec![
            Box::new(Factory::<Cd>::default()),
            Box::new(Factory::<Exit>::default()),
            Box::new(Factory::<History>::default()),
            Box::new(Factory::<Jobs>::default()),
            Box::new(Factory::<Bg>::default()),
            Box::new(Factory::<Fg>::default()),
            Box::new(Factory::<Kill>::default()),
            Box::new(Factory::<Alias>::default()),
            Box::new(Factory::<Unalias>::default()),
        ])
    }
}
