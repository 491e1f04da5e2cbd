use anyhow::{Context, Result, anyhow, bail};
use argh::{EarlyExit, FromArgs};
use std::env;
use std::io::Write;
use std::path::PathBuf;

use crate::command::{CommandFactory, ExecutableCommand, Flow};
use crate::dispatch::Factory;
use crate::jobs::JobState;
use crate::launcher::{WaitOutcome, send_signal, wait_foreground};
use crate::signals::record_stopped;
use crate::state::Shell;

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed
/// directly in-process without spawning a child process.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "jobs" or "cd".
    fn name() -> &'static str;

    /// Executes the command against the shell context.
    ///
    /// Errors are reported to the user and never abort the shell; see the
    /// blanket [`ExecutableCommand`] impl below.
    fn execute(self, shell: &mut Shell, out: &mut dyn Write) -> Result<Flow>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(self: Box<Self>, shell: &mut Shell, out: &mut dyn Write) -> Result<Flow> {
        match T::execute(*self, shell, out) {
            Ok(flow) => Ok(flow),
            Err(e) => {
                writeln!(out, "jobsh: {:#}", e)?;
                Ok(Flow::Continue)
            }
        }
    }
}

/// Carries argh's usage or error text for a recognized built-in whose
/// arguments did not parse.
struct InvalidArgs {
    output: String,
}

impl ExecutableCommand for InvalidArgs {
    fn execute(self: Box<Self>, _shell: &mut Shell, out: &mut dyn Write) -> Result<Flow> {
        write!(out, "{}", self.output)?;
        Ok(Flow::Continue)
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn try_create(&self, name: &str, args: &[&str]) -> Option<Box<dyn ExecutableCommand>> {
        if name != T::name() {
            return None;
        }
        Some(match T::from_args(&[name], args) {
            Ok(cmd) => Box::new(cmd),
            Err(EarlyExit { output, .. }) => Box::new(InvalidArgs { output }),
        })
    }
}

/// Parse a job reference of the form `%<id>`.
fn parse_job_ref(reference: &str) -> Result<usize> {
    let digits = reference
        .strip_prefix('%')
        .ok_or_else(|| anyhow!("job id must be prefixed with '%'"))?;
    digits
        .parse()
        .map_err(|_| anyhow!("invalid job id: {}", reference))
}

#[derive(FromArgs)]
/// Change the current working directory.
/// Defaults to $HOME when no target is given.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(self, _shell: &mut Shell, _out: &mut dyn Write) -> Result<Flow> {
        let target = match self.target {
            Some(t) if !t.is_empty() => PathBuf::from(t),
            _ => PathBuf::from(env::var("HOME").context("cd: no target and HOME not set")?),
        };
        env::set_current_dir(&target)
            .with_context(|| format!("cd: can't chdir to {}", target.display()))?;
        Ok(Flow::Continue)
    }
}

#[derive(FromArgs)]
/// Exit the shell.
pub struct Exit {}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(self, _shell: &mut Shell, _out: &mut dyn Write) -> Result<Flow> {
        Ok(Flow::Exit)
    }
}

#[derive(FromArgs)]
/// Print every recorded input line, oldest first.
pub struct History {}

impl BuiltinCommand for History {
    fn name() -> &'static str {
        "history"
    }

    fn execute(self, shell: &mut Shell, out: &mut dyn Write) -> Result<Flow> {
        let state = shell.lock_state();
        for line in &state.history {
            writeln!(out, "{}", line)?;
        }
        Ok(Flow::Continue)
    }
}

#[derive(FromArgs)]
/// List all tracked jobs.
pub struct Jobs {}

impl BuiltinCommand for Jobs {
    fn name() -> &'static str {
        "jobs"
    }

    fn execute(self, shell: &mut Shell, out: &mut dyn Write) -> Result<Flow> {
        shell.lock_state().jobs.write_listing(out)?;
        Ok(Flow::Continue)
    }
}

#[derive(FromArgs)]
/// Resume a stopped job in the background.
pub struct Bg {
    #[argh(positional)]
    /// job reference of the form %<id>
    pub job: String,
}

impl BuiltinCommand for Bg {
    fn name() -> &'static str {
        "bg"
    }

    fn execute(self, shell: &mut Shell, out: &mut dyn Write) -> Result<Flow> {
        let id = parse_job_ref(&self.job).context("bg")?;
        let mut state = shell.lock_state();
        let job = state
            .jobs
            .get_mut(id)
            .ok_or_else(|| anyhow!("bg: %{}: no such job", id))?;
        if job.state == JobState::Running {
            bail!("bg: job {} is already running", id);
        }
        send_signal(job.pid, libc::SIGCONT)
            .with_context(|| format!("bg: can't resume process {}", job.pid))?;
        job.state = JobState::Running;
        writeln!(out, "[{}] {}\t{}", job.id, job.pid, job.command)?;
        Ok(Flow::Continue)
    }
}

#[derive(FromArgs)]
/// Resume a stopped job and bring it to the foreground.
pub struct Fg {
    #[argh(positional)]
    /// job reference of the form %<id>
    pub job: String,
}

impl BuiltinCommand for Fg {
    fn name() -> &'static str {
        "fg"
    }

    fn execute(self, shell: &mut Shell, out: &mut dyn Write) -> Result<Flow> {
        let id = parse_job_ref(&self.job).context("fg")?;
        let pid;
        {
            let mut state = shell.lock_state();
            let job = state
                .jobs
                .get_mut(id)
                .ok_or_else(|| anyhow!("fg: %{}: no such job", id))?;
            if job.state == JobState::Running {
                bail!("fg: job {} is already running", id);
            }
            send_signal(job.pid, libc::SIGCONT)
                .with_context(|| format!("fg: can't resume process {}", job.pid))?;
            job.state = JobState::Running;
            pid = job.pid;
            // The job leaves the table while it is under foreground
            // supervision; a new terminal stop re-registers it.
            if let Some(job) = state.jobs.remove_pid(pid) {
                writeln!(out, "{}", job.command)?;
            }
            state.foreground = Some(pid);
        }

        let outcome = wait_foreground(pid);
        let mut state = shell.lock_state();
        state.foreground = None;
        if outcome == WaitOutcome::Stopped {
            record_stopped(&mut state, pid, out)?;
        }
        Ok(Flow::Continue)
    }
}

#[derive(FromArgs)]
/// Send SIGKILL to a process by pid.
pub struct Kill {
    #[argh(positional)]
    /// process id to terminate
    pub pid: i32,
}

impl BuiltinCommand for Kill {
    fn name() -> &'static str {
        "kill"
    }

    fn execute(self, shell: &mut Shell, _out: &mut dyn Write) -> Result<Flow> {
        send_signal(self.pid, libc::SIGKILL)
            .with_context(|| format!("kill: ({}) signal delivery failed", self.pid))?;
        // Only a delivered signal drops the tracked job; the reaper would
        // remove it anyway, but this keeps `jobs` output current immediately.
        shell.lock_state().jobs.remove_pid(self.pid);
        Ok(Flow::Continue)
    }
}

#[derive(FromArgs)]
/// Define an alias, or list all aliases when no definition is given.
pub struct Alias {
    #[argh(positional, greedy)]
    /// definition of the form NAME='<command>'
    pub definition: Vec<String>,
}

impl BuiltinCommand for Alias {
    fn name() -> &'static str {
        "alias"
    }

    fn execute(self, shell: &mut Shell, out: &mut dyn Write) -> Result<Flow> {
        if self.definition.is_empty() {
            if shell.aliases.is_empty() {
                writeln!(out, "no aliases defined, use 'alias <name>=<command>' to add one")?;
            } else {
                for (name, replacement) in shell.aliases.iter() {
                    writeln!(out, "{} = {}", name, replacement.join(" "))?;
                }
            }
            return Ok(Flow::Continue);
        }

        // The tokenizer has no quoting, so `alias ll='ls -la'` arrives as two
        // tokens. Rejoin them and split at the first '=' instead.
        if self.definition.len() == 2 {
            let raw = self.definition.join(" ");
            if let Some((name, value)) = raw.split_once('=') {
                shell.aliases.define(name, trim_quotes(value));
                return Ok(Flow::Continue);
            }
        }
        writeln!(out, "usage: alias <name>='<command>'")?;
        Ok(Flow::Continue)
    }
}

/// Strip one level of matching single or double quotes.
fn trim_quotes(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 && (bytes[0] == b'\'' || bytes[0] == b'"') && bytes[bytes.len() - 1] == bytes[0] {
        return &value[1..value.len() - 1];
    }
    value
}

#[derive(FromArgs)]
/// Remove a single alias, or every alias with -a.
pub struct Unalias {
    #[argh(switch, short = 'a')]
    /// remove every alias
    pub all: bool,

    #[argh(positional)]
    /// alias name to remove
    pub name: Option<String>,
}

impl BuiltinCommand for Unalias {
    fn name() -> &'static str {
        "unalias"
    }

    fn execute(self, shell: &mut Shell, out: &mut dyn Write) -> Result<Flow> {
        if self.all {
            shell.aliases.clear();
            return Ok(Flow::Continue);
        }
        match self.name {
            Some(name) => {
                if !shell.aliases.remove(&name) {
                    bail!("unalias: {}: not found", name);
                }
            }
            None => writeln!(out, "usage: unalias [-a] <name>")?,
        }
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ShellState;
    use std::fs;
    use std::process::Command;
    use std::sync::{Mutex, MutexGuard, OnceLock};
    use std::time::{SystemTime, UNIX_EPOCH};

    fn lock_current_dir() -> MutexGuard<'static, ()> {
        static MUTEX: OnceLock<Mutex<()>> = OnceLock::new();
        MUTEX.get_or_init(|| Mutex::new(())).lock().unwrap()
    }

    fn test_shell() -> Shell {
        Shell::new(ShellState::shared())
    }

    fn run<T: BuiltinCommand>(cmd: T, shell: &mut Shell) -> (Result<Flow>, String) {
        let mut out = Vec::new();
        let res = cmd.execute(shell, &mut out);
        (res, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_exit_terminates() {
        let mut shell = test_shell();
        let (res, _) = run(Exit {}, &mut shell);
        assert_eq!(res.unwrap(), Flow::Exit);
    }

    #[test]
    fn test_cd_to_temp_dir_and_back() {
        let _guard = lock_current_dir();
        let orig = env::current_dir().unwrap();

        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
        let temp = env::temp_dir().join(format!("jobsh_cd_{}_{}", std::process::id(), nanos));
        fs::create_dir_all(&temp).unwrap();
        let canonical = fs::canonicalize(&temp).unwrap();

        let mut shell = test_shell();
        let cd = Cd {
            target: Some(canonical.to_string_lossy().into_owned()),
        };
        let (res, _) = run(cd, &mut shell);
        assert_eq!(res.unwrap(), Flow::Continue);
        assert_eq!(fs::canonicalize(env::current_dir().unwrap()).unwrap(), canonical);

        env::set_current_dir(&orig).unwrap();
        let _ = fs::remove_dir_all(&temp);
    }

    #[test]
    fn test_cd_nonexistent_path_errors() {
        let _guard = lock_current_dir();
        let orig = env::current_dir().unwrap();

        let mut shell = test_shell();
        let cd = Cd {
            target: Some(format!("missing_dir_{}", std::process::id())),
        };
        let res = cd.execute(&mut shell, &mut Vec::new());
        assert!(res.is_err());
        assert_eq!(env::current_dir().unwrap(), orig);
    }

    #[test]
    fn test_history_prints_lines_in_order() {
        let mut shell = test_shell();
        {
            let mut state = shell.lock_state();
            state.push_history("sleep 5 &".into());
            state.push_history("jobs".into());
        }
        let (res, text) = run(History {}, &mut shell);
        assert_eq!(res.unwrap(), Flow::Continue);
        assert_eq!(text, "sleep 5 &\njobs\n");
    }

    #[test]
    fn test_jobs_reports_empty_table() {
        let mut shell = test_shell();
        let (res, text) = run(Jobs {}, &mut shell);
        assert_eq!(res.unwrap(), Flow::Continue);
        assert_eq!(text, "no active jobs\n");
    }

    #[test]
    fn test_jobs_lists_tracked_jobs() {
        let mut shell = test_shell();
        shell
            .lock_state()
            .jobs
            .insert(4242, "sleep 30".into(), JobState::Stopped);
        let (_, text) = run(Jobs {}, &mut shell);
        assert!(text.contains("[1]"));
        assert!(text.contains("Stopped"));
        assert!(text.contains("sleep 30"));
    }

    #[test]
    fn test_bg_rejects_reference_without_percent() {
        let mut shell = test_shell();
        let (res, _) = run(Bg { job: "1".into() }, &mut shell);
        let err = res.unwrap_err().to_string();
        assert!(err.contains("bg"));
    }

    #[test]
    fn test_bg_unknown_job_id() {
        let mut shell = test_shell();
        let (res, _) = run(Bg { job: "%9".into() }, &mut shell);
        assert!(res.unwrap_err().to_string().contains("no such job"));
    }

    #[test]
    fn test_bg_on_running_job_errors_without_signaling() {
        let mut shell = test_shell();
        shell
            .lock_state()
            .jobs
            .insert(1, "sleep 30".into(), JobState::Running);
        let (res, _) = run(Bg { job: "%1".into() }, &mut shell);
        assert!(res.unwrap_err().to_string().contains("already running"));
        // Still tracked, still Running.
        assert_eq!(shell.lock_state().jobs.get(1).unwrap().state, JobState::Running);
    }

    #[test]
    fn test_bg_resumes_a_stopped_process() {
        let child = Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id() as libc::pid_t;
        send_signal(pid, libc::SIGSTOP).unwrap();

        let mut shell = test_shell();
        let id = shell
            .lock_state()
            .jobs
            .insert(pid, "sleep 30".into(), JobState::Stopped);

        let (res, text) = run(Bg { job: format!("%{}", id) }, &mut shell);
        assert_eq!(res.unwrap(), Flow::Continue);
        assert!(text.contains("sleep 30"));
        assert_eq!(shell.lock_state().jobs.get(id).unwrap().state, JobState::Running);

        send_signal(pid, libc::SIGKILL).unwrap();
        wait_foreground(pid);
    }

    #[test]
    fn test_fg_waits_for_the_promoted_job_to_exit() {
        let child = Command::new("sleep").arg("0.2").spawn().unwrap();
        let pid = child.id() as libc::pid_t;
        send_signal(pid, libc::SIGSTOP).unwrap();

        let mut shell = test_shell();
        let id = shell
            .lock_state()
            .jobs
            .insert(pid, "sleep 0.2".into(), JobState::Stopped);

        let (res, text) = run(Fg { job: format!("%{}", id) }, &mut shell);
        assert_eq!(res.unwrap(), Flow::Continue);
        assert!(text.contains("sleep 0.2"));

        let state = shell.lock_state();
        assert!(state.jobs.is_empty(), "fg must remove the job it reaps");
        assert_eq!(state.foreground, None);
    }

    #[test]
    fn test_fg_unknown_job_id() {
        let mut shell = test_shell();
        let (res, _) = run(Fg { job: "%3".into() }, &mut shell);
        assert!(res.unwrap_err().to_string().contains("no such job"));
    }

    #[test]
    fn test_kill_removes_tracked_job_on_delivery() {
        let child = Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id() as libc::pid_t;

        let mut shell = test_shell();
        shell
            .lock_state()
            .jobs
            .insert(pid, "sleep 30".into(), JobState::Running);

        let (res, _) = run(Kill { pid }, &mut shell);
        assert_eq!(res.unwrap(), Flow::Continue);
        assert!(shell.lock_state().jobs.is_empty());

        wait_foreground(pid);
    }

    #[test]
    fn test_kill_delivery_failure_leaves_table_unchanged() {
        // A fully reaped child's pid is no longer signalable.
        let mut child = Command::new("true").spawn().unwrap();
        child.wait().unwrap();
        let dead_pid = child.id() as libc::pid_t;

        let mut shell = test_shell();
        shell
            .lock_state()
            .jobs
            .insert(dead_pid, "true".into(), JobState::Running);

        let (res, _) = run(Kill { pid: dead_pid }, &mut shell);
        assert!(res.unwrap_err().to_string().contains("signal delivery failed"));
        assert!(shell.lock_state().jobs.find_pid(dead_pid).is_some());
    }

    #[test]
    fn test_kill_rejects_unparseable_pid_via_factory() {
        let factory = Factory::<Kill>::default();
        let cmd = factory.try_create("kill", &["not-a-pid"]).unwrap();
        let mut shell = test_shell();
        let mut out = Vec::new();
        let flow = cmd.execute(&mut shell, &mut out).unwrap();
        assert_eq!(flow, Flow::Continue);
        assert!(!out.is_empty(), "argh error text should be shown");
    }

    #[test]
    fn test_alias_defines_and_lists() {
        let mut shell = test_shell();
        let alias = Alias {
            definition: vec!["ll='ls".into(), "-la'".into()],
        };
        let (res, _) = run(alias, &mut shell);
        assert_eq!(res.unwrap(), Flow::Continue);
        assert_eq!(shell.aliases.lookup("ll").unwrap(), ["ls", "-la"]);

        let (_, text) = run(Alias { definition: vec![] }, &mut shell);
        assert_eq!(text, "ll = ls -la\n");
    }

    #[test]
    fn test_alias_wrong_arity_prints_usage() {
        let mut shell = test_shell();
        let alias = Alias {
            definition: vec!["gs=git-status".into()],
        };
        let (_, text) = run(alias, &mut shell);
        assert!(text.contains("usage: alias"));
        assert!(shell.aliases.is_empty());
    }

    #[test]
    fn test_alias_without_equals_prints_usage() {
        let mut shell = test_shell();
        let alias = Alias {
            definition: vec!["ll".into(), "ls".into()],
        };
        let (_, text) = run(alias, &mut shell);
        assert!(text.contains("usage: alias"));
    }

    #[test]
    fn test_unalias_all_clears_everything() {
        let mut shell = test_shell();
        shell.aliases.define("a", "x");
        shell.aliases.define("b", "y");
        let (res, _) = run(Unalias { all: true, name: None }, &mut shell);
        assert_eq!(res.unwrap(), Flow::Continue);
        assert!(shell.aliases.is_empty());
    }

    #[test]
    fn test_unalias_unknown_name_reports_and_keeps_table() {
        let mut shell = test_shell();
        shell.aliases.define("a", "x");
        let (res, _) = run(
            Unalias {
                all: false,
                name: Some("b".into()),
            },
            &mut shell,
        );
        assert!(res.unwrap_err().to_string().contains("not found"));
        assert!(shell.aliases.lookup("a").is_some());
    }

    #[test]
    fn test_unalias_without_arguments_prints_usage() {
        let mut shell = test_shell();
        let (_, text) = run(Unalias { all: false, name: None }, &mut shell);
        assert!(text.contains("usage: unalias"));
    }

    #[test]
    fn test_trim_quotes_handles_both_styles() {
        assert_eq!(trim_quotes("'ls -la'"), "ls -la");
        assert_eq!(trim_quotes("\"ls -la\""), "ls -la");
        assert_eq!(trim_quotes("ls"), "ls");
        assert_eq!(trim_quotes("'unbalanced"), "'unbalanced");
    }
}
