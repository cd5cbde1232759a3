// src/system/executor.rs

use crate::core::cmd_tree::ArgVals;
use crate::core::engine::ScriptRunner;
use crate::core::env::Env;
use crate::core::env_protocol;
use std::io::{self, BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command as StdCommand, Stdio};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Command could not be parsed: {0}")]
    CommandParse(String),
    #[error("No command specified to run.")]
    EmptyCommand,
    #[error("Command '{0}' could not be executed: {1}")]
    CommandFailed(String, std::io::Error),
    #[error("Could not read the output of '{0}': {1}")]
    OutputRead(String, std::io::Error),
}

/// Runs `External` executables as child processes.
///
/// The flattened env becomes the process environment and resolved argument values are
/// appended as positional arguments. Stdout lines carrying env records are applied to
/// the env; every other line is echoed. A leading `-` on the command line ignores the
/// exit status.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    cwd: Option<PathBuf>,
}

impl ProcessRunner {
    pub fn new(cwd: Option<PathBuf>) -> Self {
        Self { cwd }
    }

    fn spawn(
        &self,
        command_line: &str,
        parts: &[String],
        args: &ArgVals,
        env: &Env,
    ) -> Result<Child, ExecutionError> {
        let (program, fixed_args) = parts.split_first().ok_or(ExecutionError::EmptyCommand)?;
        let env_vars = env.flatten();
        let positional: Vec<&str> = args.iter().map(|(_, value)| value).collect();

        let mut command = StdCommand::new(dunce::simplified(Path::new(program)));
        command
            .args(fixed_args)
            .args(&positional)
            .envs(&env_vars)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if let Some(cwd) = &self.cwd {
            command.current_dir(dunce::simplified(cwd));
        }

        // Fallback for Windows built-ins like `echo`: retry through `cmd /C`.
        match command.spawn() {
            Ok(child) => Ok(child),
            Err(e) if e.kind() == ErrorKind::NotFound && cfg!(target_os = "windows") => {
                log::debug!("Command '{}' not found. Retrying with cmd /C.", program);
                let mut fallback = StdCommand::new("cmd");
                fallback
                    .arg("/C")
                    .arg(command_line)
                    .args(&positional)
                    .envs(&env_vars)
                    .stdout(Stdio::piped())
                    .stderr(Stdio::inherit());
                if let Some(cwd) = &self.cwd {
                    fallback.current_dir(dunce::simplified(cwd));
                }
                fallback
                    .spawn()
                    .map_err(|e| ExecutionError::CommandFailed(command_line.to_string(), e))
            }
            Err(e) => Err(ExecutionError::CommandFailed(command_line.to_string(), e)),
        }
    }
}

impl ScriptRunner for ProcessRunner {
    fn run(&self, command_line: &str, args: &ArgVals, env: &Env) -> anyhow::Result<bool> {
        let trimmed = command_line.trim();
        let (final_command_line, ignore_errors) = match trimmed.strip_prefix('-') {
            Some(rest) => (rest.trim(), true),
            None => (trimmed, false),
        };
        if final_command_line.is_empty() {
            return Err(ExecutionError::EmptyCommand.into());
        }

        let parts = shlex::split(final_command_line)
            .ok_or_else(|| ExecutionError::CommandParse(final_command_line.to_string()))?;
        let mut child = self.spawn(final_command_line, &parts, args, env)?;

        // The pipe is closed before waiting, so a failed read cannot leave the child blocked.
        let forwarded = match child.stdout.take() {
            Some(stdout) => {
                forward_output(BufReader::new(stdout), &mut io::stdout().lock(), env)
            }
            None => Ok(()),
        };
        let status = child
            .wait()
            .map_err(|e| ExecutionError::CommandFailed(final_command_line.to_string(), e))?;
        forwarded.map_err(|e| ExecutionError::OutputRead(final_command_line.to_string(), e))?;
        log::debug!("'{}' exited with {}", final_command_line, status);
        Ok(status.success() || ignore_errors)
    }
}

/// Copies `reader` to `out` line by line, applying env records to `env` instead of copying them.
///
/// Lines are handled as raw bytes; only valid UTF-8 lines can carry a record.
fn forward_output<R: BufRead, W: Write>(
    mut reader: R,
    out: &mut W,
    env: &Env,
) -> io::Result<()> {
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        let record = std::str::from_utf8(&line)
            .ok()
            .and_then(env_protocol::parse_line);
        match record {
            Some(record) => env_protocol::apply_record(env, &record),
            None => out.write_all(&line)?,
        }
    }
    out.flush()
}
