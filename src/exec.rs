// src/exec.rs

//! Subprocess execution for installers and builders
//!
//! Every external tool (python, pip, pacman, pkgfile) is spawned through
//! [`CommandRunner`], which pins a parseable locale, isolates pip from user
//! configuration, captures output, enforces a timeout and honours the
//! pass-wide [`Interrupt`] flag.

use crate::error::{Error, Result};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;
use wait_timeout::ChildExt;

/// Environment applied to every spawned command
const BASE_ENV: &[(&str, &str)] = &[
    ("LC_ALL", "C"),
    ("PYTHONNOUSERSITE", "1"),
    ("PIP_CONFIG_FILE", "/dev/null"),
    ("PIP_DISABLE_PIP_VERSION_CHECK", "1"),
    ("PIP_NO_INPUT", "1"),
];

/// Granularity at which a running child checks the interrupt flag
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Shared cancellation flag
///
/// Cloning yields a handle to the same flag. Once raised, running commands
/// are killed and every later expensive step fails fast.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Runs external commands with a timeout and the base environment
#[derive(Debug, Clone)]
pub struct CommandRunner {
    timeout: Duration,
    interrupt: Interrupt,
    extra_path: Option<PathBuf>,
}

impl CommandRunner {
    pub fn new(timeout: Duration, interrupt: Interrupt) -> Self {
        Self {
            timeout,
            interrupt,
            extra_path: None,
        }
    }

    /// Prepend a directory (typically a venv's `bin`) to PATH
    pub fn with_path_prefix(mut self, dir: &Path) -> Self {
        self.extra_path = Some(dir.to_path_buf());
        self
    }

    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    /// Run a command, returning its output whatever the exit status
    pub fn run(&self, program: &str, args: &[&str], cwd: Option<&Path>) -> Result<CommandOutput> {
        if self.interrupt.is_raised() {
            return Err(Error::Interrupted);
        }

        let cmdline = command_line(program, args);
        match cwd {
            Some(dir) => debug!("Running subprocess from {}:\n{}", dir.display(), cmdline),
            None => debug!("Running subprocess:\n{}", cmdline),
        }

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in BASE_ENV {
            command.env(key, value);
        }
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }
        if let Some(prefix) = &self.extra_path {
            let path = std::env::var_os("PATH").unwrap_or_default();
            let mut paths = vec![prefix.clone()];
            paths.extend(std::env::split_paths(&path));
            command.env(
                "PATH",
                std::env::join_paths(paths).map_err(|e| Error::InitError(e.to_string()))?,
            );
        }

        let mut child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::ToolNotFound(program.to_string())
            } else {
                Error::IoError(e)
            }
        })?;

        // Drain pipes on separate threads so a chatty child never blocks on a full pipe
        let stdout_reader = child.stdout.take().map(spawn_reader);
        let stderr_reader = child.stderr.take().map(spawn_reader);

        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.wait_timeout(POLL_INTERVAL)? {
                break status;
            }
            if self.interrupt.is_raised() {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::Interrupted);
            }
            if started.elapsed() >= self.timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::CommandTimeout {
                    command: cmdline,
                    seconds: self.timeout.as_secs(),
                });
            }
        };

        let stdout = stdout_reader.map(join_reader).unwrap_or_default();
        let stderr = stderr_reader.map(join_reader).unwrap_or_default();

        Ok(CommandOutput {
            status,
            stdout,
            stderr,
        })
    }

    /// Run a command and fail unless it exits successfully
    pub fn run_checked(
        &self,
        program: &str,
        args: &[&str],
        cwd: Option<&Path>,
    ) -> Result<CommandOutput> {
        let output = self.run(program, args, cwd)?;
        if !output.success() {
            return Err(Error::CommandFailed {
                command: command_line(program, args),
                stderr: tail(&output.stderr, 20),
            });
        }
        Ok(output)
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_reader(handle: std::thread::JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

/// Shell-like rendering of a command for logs and errors
pub fn command_line(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .map(|arg| {
            if arg.is_empty() || arg.contains(|c: char| c.is_whitespace() || c == '\'') {
                format!("'{}'", arg.replace('\'', r"'\''"))
            } else {
                arg.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Last `lines` lines of some output
pub fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_quoting() {
        assert_eq!(command_line("pip", &["install", "foo==1.0"]), "pip install foo==1.0");
        assert_eq!(command_line("sh", &["-c", "echo hi"]), "sh -c 'echo hi'");
        assert_eq!(command_line("echo", &[""]), "echo ''");
    }

    #[test]
    fn test_tail() {
        assert_eq!(tail("a\nb\nc", 2), "b\nc");
        assert_eq!(tail("a", 5), "a");
    }

    #[test]
    fn test_interrupt_shared_between_clones() {
        let interrupt = Interrupt::new();
        let clone = interrupt.clone();
        assert!(!clone.is_raised());
        interrupt.raise();
        assert!(clone.is_raised());
    }

    #[test]
    fn test_run_refuses_when_interrupted() {
        let interrupt = Interrupt::new();
        interrupt.raise();
        let runner = CommandRunner::new(Duration::from_secs(5), interrupt);
        assert!(matches!(runner.run("true", &[], None), Err(Error::Interrupted)));
    }

    #[test]
    fn test_run_captures_output() {
        let runner = CommandRunner::new(Duration::from_secs(10), Interrupt::new());
        let output = runner.run("sh", &["-c", "echo out; echo err >&2; exit 3"], None).unwrap();
        let dir = tempfile::tempdir().unwrap();
        assert!(runner.run("true", &[], Some(dir.path())).unwrap().success());
        assert!(!output.success());
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
        assert!(runner.run_checked("sh", &["-c", "exit 1"], None).is_err());
    }

    #[test]
    fn test_run_missing_tool() {
        let runner = CommandRunner::new(Duration::from_secs(5), Interrupt::new());
        let result = runner.run("definitely-not-a-real-tool-xyz", &[], None);
        assert!(matches!(result, Err(Error::ToolNotFound(_))));
    }

    #[test]
    fn test_run_timeout() {
        let runner = CommandRunner::new(Duration::from_millis(300), Interrupt::new());
        let result = runner.run("sleep", &["5"], None);
        match result {
            Err(Error::CommandTimeout { command, .. }) => assert_eq!(command, "sleep 5"),
            other => panic!("expected timeout, got {:?}", other.map(|o| o.status)),
        }
    }
}
