//! Helpers for running the `fw` binary
//!
//! Wraps `std::process::Command` with a timeout, so a watch that never sees
//! its event fails the test instead of hanging it.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// CLI command builder with timing
pub struct FwCommand {
    working_dir: PathBuf,
    args: Vec<String>,
    env: HashMap<String, String>,
    timeout: Duration,
}

impl FwCommand {
    /// Create a new command in the given working directory
    ///
    /// The user config directory is pointed at `working_dir` so a real
    /// config file never leaks into a test.
    pub fn new(working_dir: impl AsRef<Path>) -> Self {
        let working_dir = working_dir.as_ref().to_path_buf();
        let mut env = HashMap::new();
        env.insert(
            "XDG_CONFIG_HOME".to_string(),
            working_dir.join("xdg").display().to_string(),
        );
        env.insert("FILEWATCH_CONFIG".to_string(), String::new());

        Self {
            working_dir,
            args: Vec::new(),
            env,
            timeout: Duration::from_secs(30),
        }
    }

    /// Add command arguments
    pub fn args(&mut self, args: &[&str]) -> &mut Self {
        self.args.extend(args.iter().map(|s| s.to_string()));
        self
    }

    /// Set environment variable
    pub fn env(&mut self, key: &str, value: &str) -> &mut Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    /// Set command timeout
    pub fn timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = timeout;
        self
    }

    /// Start the command without waiting for it
    pub fn spawn(&self) -> Result<Child> {
        Command::new(env!("CARGO_BIN_EXE_fw"))
            .args(&self.args)
            .current_dir(&self.working_dir)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to spawn fw")
    }

    /// Execute command and return result with timing
    pub fn execute(&self) -> Result<CommandResult> {
        self.execute_while(|| {})
    }

    /// Execute, calling `tick` every 100ms until the process exits
    pub fn execute_while(&self, mut tick: impl FnMut()) -> Result<CommandResult> {
        let start = Instant::now();
        let mut child = self.spawn()?;

        loop {
            if child.try_wait()?.is_some() {
                break;
            }
            if start.elapsed() > self.timeout {
                child.kill().ok();
                let output = child.wait_with_output()?;
                anyhow::bail!(
                    "Command timed out after {:?}:\nArgs: {:?}\nStdout: {}\nStderr: {}",
                    self.timeout,
                    self.args,
                    String::from_utf8_lossy(&output.stdout),
                    String::from_utf8_lossy(&output.stderr)
                );
            }
            tick();
            thread::sleep(Duration::from_millis(100));
        }

        let output = child
            .wait_with_output()
            .context("Failed to wait for command")?;

        Ok(CommandResult {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
            duration: start.elapsed(),
        })
    }

    /// Execute and assert success
    pub fn assert_success(&self) -> Result<CommandResult> {
        let result = self.execute()?;

        if !result.success() {
            anyhow::bail!(
                "Command failed (exit code: {}):\nArgs: {:?}\nStdout: {}\nStderr: {}",
                result.exit_code,
                self.args,
                result.stdout,
                result.stderr
            );
        }

        Ok(result)
    }

    /// Execute and expect failure
    pub fn assert_failure(&self) -> Result<CommandResult> {
        let result = self.execute()?;

        if result.success() {
            anyhow::bail!(
                "Command should have failed but succeeded:\nArgs: {:?}\nStdout: {}",
                self.args,
                result.stdout
            );
        }

        Ok(result)
    }
}

/// Command execution result with timing
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration: Duration,
}

impl CommandResult {
    /// Check if command succeeded
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn contains_stdout(&self, text: &str) -> bool {
        self.stdout.contains(text)
    }

    pub fn contains_stderr(&self, text: &str) -> bool {
        self.stderr.contains(text)
    }

    /// Parse each stdout line as JSON
    pub fn json_lines(&self) -> Result<Vec<serde_json::Value>> {
        self.stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).with_context(|| format!("Not JSON: {}", line)))
            .collect()
    }
}

/// Macro for convenient command construction
///
/// Usage:
/// ```ignore
/// fw!(dir, "config", "--show").assert_success()?;
/// ```
#[macro_export]
macro_rules! fw {
    ($dir:expr, $($arg:expr),*) => {{
        let mut cmd = $crate::common::cli::FwCommand::new($dir);
        cmd.args(&[$($arg),*]);
        cmd
    }};
}
