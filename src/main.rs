use anyhow::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::env;
use std::io;
use std::sync::Arc;

use jobsh::{Dispatcher, Flow, Shell, ShellState, signals, tokenize};

fn prompt() -> String {
    match env::current_dir() {
        Ok(dir) => format!("jobsh:{}$ ", dir.display()),
        Err(_) => "jobsh$ ".to_string(),
    }
}

fn main() -> Result<()> {
    let state = ShellState::shared();
    signals::install(Arc::clone(&state))?;

    let mut shell = Shell::new(state);
    let dispatcher = Dispatcher::default();
    let mut rl = DefaultEditor::new()?;

    loop {
        match rl.readline(&prompt()) {
            Ok(line) => {
                if !line.is_empty() {
                    rl.add_history_entry(line.as_str())?;
                    shell.lock_state().push_history(line.clone());
                }
                match dispatcher.dispatch(&mut shell, tokenize(&line), &mut io::stdout()) {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Exit) => break,
                    Err(err) => eprintln!("jobsh: {:#}", err),
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("jobsh: {}", err);
                break;
            }
        }
    }

    Ok(())
}
