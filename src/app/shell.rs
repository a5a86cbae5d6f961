// External command execution behind a trait so probes and the
// dispatcher can be exercised against recorded outputs.

use super::model::CmdOutput;
use anyhow::{Context, Result};
use std::path::Path;
use std::process::Command;

pub trait CommandRunner: Sync {
    /// Run a program to completion and capture exit code and output.
    fn run(&self, program: &str, args: &[&str]) -> Result<CmdOutput>;

    /// Read-only existence check used by install-marker probes.
    fn file_exists(&self, path: &Path) -> bool;

    /// Hand a command line to the shell without waiting for it. Used for
    /// long-running maintenance jobs (e.g. the Plex updater).
    fn run_detached(&self, command_line: &str) -> Result<()>;
}

/// Production runner backed by `std::process::Command`.
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CmdOutput> {
        let output = Command::new(program)
            .args(args)
            .output()
            .with_context(|| format!("Failed to execute {}", program))?;

        Ok(CmdOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn run_detached(&self, command_line: &str) -> Result<()> {
        Command::new("/bin/sh")
            .arg("-c")
            .arg(command_line)
            .spawn()
            .with_context(|| format!("Failed to spawn: {}", command_line))?;
        Ok(())
    }
}

#[cfg(test)]
pub use fake::FakeRunner;

#[cfg(test)]
mod fake {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Scripted runner for tests: command lines map to canned outputs,
    /// anything unscripted fails like a missing binary would.
    #[derive(Default)]
    pub struct FakeRunner {
        responses: HashMap<String, CmdOutput>,
        failures: HashSet<String>,
        files: HashSet<PathBuf>,
        pub calls: Mutex<Vec<String>>,
    }

    impl FakeRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn on(mut self, command_line: &str, code: i32, stdout: &str, stderr: &str) -> Self {
            self.responses.insert(
                command_line.to_string(),
                CmdOutput {
                    code,
                    stdout: stdout.to_string(),
                    stderr: stderr.to_string(),
                },
            );
            self
        }

        /// Make a command line fail at spawn time (binary missing,
        /// permission denied).
        pub fn broken(mut self, command_line: &str) -> Self {
            self.failures.insert(command_line.to_string());
            self
        }

        pub fn with_file(mut self, path: &str) -> Self {
            self.files.insert(PathBuf::from(path));
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CommandRunner for FakeRunner {
        fn run(&self, program: &str, args: &[&str]) -> Result<CmdOutput> {
            let mut line = program.to_string();
            for arg in args {
                line.push(' ');
                line.push_str(arg);
            }
            self.calls.lock().unwrap().push(line.clone());

            if self.failures.contains(&line) {
                anyhow::bail!("Failed to execute {}", program);
            }
            match self.responses.get(&line) {
                Some(out) => Ok(out.clone()),
                None => anyhow::bail!("no such command: {}", line),
            }
        }

        fn file_exists(&self, path: &Path) -> bool {
            self.files.contains(path)
        }

        fn run_detached(&self, command_line: &str) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("detached: {}", command_line));
            Ok(())
        }
    }
}
