//! Compiles and runs the current buffer with external toolchains, and runs
//! ad-hoc shell commands for the terminal panel.
//!
//! Each job runs on its own thread and streams [`RunEvent`]s back over a
//! channel. The UI drains the receiver once per tick.

use crate::config::Config;
use crate::error::RunError;
use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    Output(String),
    Error(String),
    Info(String),
    Finished(i32),
    CompileFailed(i32),
    /// A program could not be started; the job is over.
    Failed(String),
}

impl RunEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunEvent::Finished(_) | RunEvent::CompileFailed(_) | RunEvent::Failed(_)
        )
    }
}

/// Program names for each supported language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub python: String,
    pub node: String,
    pub javac: String,
    pub java: String,
    pub gcc: String,
    pub gxx: String,
}

impl Toolchain {
    pub fn from_config(config: &Config) -> Self {
        Self {
            python: config.python.clone(),
            node: config.node.clone(),
            javac: config.javac.clone(),
            java: config.java.clone(),
            gcc: config.gcc.clone(),
            gxx: config.gxx.clone(),
        }
    }
}

impl Default for Toolchain {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub program: String,
    pub args: Vec<String>,
    pub compile: bool,
}

impl Step {
    fn new(program: &str, args: Vec<String>, compile: bool) -> Self {
        Self {
            program: program.to_string(),
            args,
            compile,
        }
    }

    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    pub steps: Vec<Step>,
}

fn extension(file_name: &str) -> Option<&str> {
    Path::new(file_name).extension().and_then(|e| e.to_str())
}

/// Chooses interpreter or compile-then-run steps by file extension.
pub fn plan_for(file_name: &str, dir: &Path, tools: &Toolchain) -> Result<RunPlan, RunError> {
    let source = dir.join(file_name).to_string_lossy().into_owned();
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("main")
        .to_string();
    let exe = || -> String {
        let mut path = dir.join(&stem).into_os_string();
        path.push(std::env::consts::EXE_SUFFIX);
        PathBuf::from(path).to_string_lossy().into_owned()
    };

    let ext = extension(file_name).map(|e| e.to_ascii_lowercase());
    let steps = match ext.as_deref() {
        Some("py") => vec![Step::new(&tools.python, vec![source], false)],
        Some("js") => vec![Step::new(&tools.node, vec![source], false)],
        Some("java") => vec![
            Step::new(&tools.javac, vec![source], true),
            Step::new(
                &tools.java,
                vec![
                    "-cp".to_string(),
                    dir.to_string_lossy().into_owned(),
                    stem.clone(),
                ],
                false,
            ),
        ],
        Some("c") => {
            let exe = exe();
            vec![
                Step::new(&tools.gcc, vec![source, "-o".to_string(), exe.clone()], true),
                Step::new(&exe, Vec::new(), false),
            ]
        }
        Some("cpp") => {
            let exe = exe();
            vec![
                Step::new(&tools.gxx, vec![source, "-o".to_string(), exe.clone()], true),
                Step::new(&exe, Vec::new(), false),
            ]
        }
        _ => {
            let shown = ext.map(|e| format!(".{e}")).unwrap_or_else(|| file_name.to_string());
            return Err(RunError::Unsupported(shown));
        }
    };
    Ok(RunPlan { steps })
}

/// Drops lines that look like stray editor commands.
pub fn clean_source(text: &str) -> String {
    text.split('\n')
        .filter(|line| !line.trim().starts_with(':'))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Writes `content` to a fresh temp dir under `file_name` and runs it.
pub fn spawn_file(
    file_name: &str,
    content: &str,
    tools: &Toolchain,
) -> Result<Receiver<RunEvent>, RunError> {
    let dir = tempfile::Builder::new().prefix("vimai-run-").tempdir()?;
    fs::write(dir.path().join(file_name), clean_source(content))?;
    let plan = plan_for(file_name, dir.path(), tools)?;
    tracing::info!(file = file_name, steps = plan.steps.len(), "starting run");

    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("vimai-runner".to_string())
        .spawn(move || {
            execute_plan(&plan, None, &tx);
            // removed once the job ends
            drop(dir);
        })?;
    Ok(rx)
}

/// Runs a user command line from the terminal panel.
pub fn spawn_shell(command: &str, cwd: Option<PathBuf>) -> Result<Receiver<RunEvent>, RunError> {
    let mut parts =
        shell_words::split(command).map_err(|e| RunError::BadCommand(e.to_string()))?;
    if parts.is_empty() {
        return Err(RunError::BadCommand(command.to_string()));
    }
    let program = parts.remove(0);
    let plan = RunPlan {
        steps: vec![Step::new(&program, parts, false)],
    };
    tracing::info!(command, "starting shell command");

    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("vimai-shell".to_string())
        .spawn(move || execute_plan(&plan, cwd.as_deref(), &tx))?;
    Ok(rx)
}

fn execute_plan(plan: &RunPlan, cwd: Option<&Path>, tx: &Sender<RunEvent>) {
    let last = plan.steps.len().saturating_sub(1);
    for (idx, step) in plan.steps.iter().enumerate() {
        let verb = if step.compile { "Compiling" } else { "Running" };
        let _ = tx.send(RunEvent::Info(format!("{verb} with: {}", step.display())));

        let code = match run_step(step, cwd, tx) {
            Ok(code) => code,
            Err(err) => {
                tracing::warn!(program = %step.program, %err, "run step failed");
                let _ = tx.send(RunEvent::Failed(format!("Error: {err}")));
                return;
            }
        };

        if step.compile && code != 0 {
            let _ = tx.send(RunEvent::CompileFailed(code));
            return;
        }
        if idx == last {
            let _ = tx.send(RunEvent::Finished(code));
        }
    }
}

fn run_step(step: &Step, cwd: Option<&Path>, tx: &Sender<RunEvent>) -> Result<i32, RunError> {
    let mut cmd = Command::new(&step.program);
    cmd.args(&step.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn().map_err(|source| RunError::Spawn {
        program: step.program.clone(),
        source,
    })?;

    let stderr_reader = child.stderr.take().map(|stderr| {
        let tx = tx.clone();
        thread::Builder::new()
            .name("vimai-runner-stderr".to_string())
            .spawn(move || forward_lines(stderr, &tx, RunEvent::Error))
    });

    if let Some(stdout) = child.stdout.take() {
        forward_lines(stdout, tx, RunEvent::Output);
    }

    if let Some(Ok(handle)) = stderr_reader {
        let _ = handle.join();
    }

    let status = child.wait()?;
    Ok(status.code().unwrap_or(-1))
}

fn forward_lines<R: Read>(reader: R, tx: &Sender<RunEvent>, wrap: fn(String) -> RunEvent) {
    for line in BufReader::new(reader).lines() {
        let Ok(line) = line else {
            break;
        };
        if tx.send(wrap(line)).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn collect(rx: Receiver<RunEvent>) -> Vec<RunEvent> {
        let mut events = Vec::new();
        while let Ok(ev) = rx.recv_timeout(Duration::from_secs(10)) {
            let done = ev.is_terminal();
            events.push(ev);
            if done {
                break;
            }
        }
        events
    }

    #[test]
    fn interpreted_languages_have_one_step() {
        let tools = Toolchain::default();
        let dir = Path::new("/tmp/job");

        let plan = plan_for("main.py", dir, &tools).unwrap();
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].program, "python");
        assert!(plan.steps[0].args[0].ends_with("main.py"));

        let plan = plan_for("app.js", dir, &tools).unwrap();
        assert_eq!(plan.steps[0].program, "node");
        assert!(!plan.steps[0].compile);
    }

    #[test]
    fn java_compiles_then_runs_class() {
        let plan = plan_for("Main.java", Path::new("/tmp/job"), &Toolchain::default()).unwrap();
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[0].program, "javac");
        assert!(plan.steps[0].compile);
        assert_eq!(plan.steps[1].program, "java");
        assert_eq!(plan.steps[1].args.first().map(String::as_str), Some("-cp"));
        assert_eq!(plan.steps[1].args.last().map(String::as_str), Some("Main"));
    }

    #[test]
    fn c_and_cpp_use_configured_compilers() {
        let tools = Toolchain {
            gcc: "clang".to_string(),
            ..Toolchain::default()
        };
        let dir = Path::new("/tmp/job");

        let plan = plan_for("testing.c", dir, &tools).unwrap();
        assert_eq!(plan.steps[0].program, "clang");
        let exe = plan.steps[0].args.last().cloned().unwrap();
        assert_eq!(plan.steps[1].program, exe);

        let plan = plan_for("testing.cpp", dir, &tools).unwrap();
        assert_eq!(plan.steps[0].program, "g++");
        assert!(plan.steps[0].display().starts_with("g++ "));
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let err = plan_for("README.md", Path::new("/tmp"), &Toolchain::default()).unwrap_err();
        assert_eq!(err.to_string(), "Unsupported file type .md");
        assert!(plan_for("Makefile", Path::new("/tmp"), &Toolchain::default()).is_err());
    }

    #[test]
    fn clean_source_drops_command_lines() {
        let text = "print('a')\n:w\n  :run\nx = {'k': 1}";
        assert_eq!(clean_source(text), "print('a')\nx = {'k': 1}");
    }

    #[test]
    fn shell_rejects_bad_input() {
        assert!(matches!(spawn_shell("", None), Err(RunError::BadCommand(_))));
        assert!(matches!(
            spawn_shell("echo \"unterminated", None),
            Err(RunError::BadCommand(_))
        ));
    }

    #[test]
    fn missing_program_reports_failure() {
        let rx = spawn_shell("vimai-no-such-program-xyz", None).unwrap();
        let events = collect(rx);
        assert!(matches!(events.first(), Some(RunEvent::Info(_))));
        match events.last() {
            Some(RunEvent::Failed(msg)) => assert!(msg.contains("vimai-no-such-program-xyz")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn shell_streams_both_pipes_and_exit_code() {
        let rx = spawn_shell("sh -c 'echo out; echo err 1>&2; exit 3'", None).unwrap();
        let events = collect(rx);
        assert!(events.contains(&RunEvent::Output("out".to_string())));
        assert!(events.contains(&RunEvent::Error("err".to_string())));
        assert_eq!(events.last(), Some(&RunEvent::Finished(3)));
    }
}
