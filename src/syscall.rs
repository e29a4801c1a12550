// SPDX-License-Identifier: MIT

//! External process execution.
//!
//! Everything dotkeep delegates to version control, archiving, and
//! encryption runs as a blocking child process through this module. Calls
//! either capture
//! stdio for programmatic use or inherit it for interactive pass-through, and
//! a non-zero exit status is never swallowed.
//!
//! Multi-stage compositions (archive into encrypt, decrypt into extract) are
//! modeled as explicit [`Stage`] sequences. Every stage's exit status is
//! collected, so a failure in an early stage surfaces even when a later stage
//! exits zero after consuming an empty or truncated stream.

use std::{
    ffi::{OsStr, OsString},
    path::Path,
    process::{Command, Stdio},
};
use tracing::debug;

/// Run a command with captured stdio, failing on non-zero exit.
///
/// Returns combined stdout with trailing newlines chomped.
///
/// # Errors
///
/// - Return [`Error::Spawn`] if the command cannot be started.
/// - Return [`Error::ToolFailure`] if the command exits non-zero.
pub fn run_captured(
    program: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl Into<OsString>>,
) -> Result<String> {
    run_captured_from(None, program, args)
}

/// Run a command with captured stdio from a given working directory.
///
/// Same contract as [`run_captured`], with the child's working directory set
/// before it starts.
///
/// # Errors
///
/// - Return [`Error::Spawn`] if the command cannot be started.
/// - Return [`Error::ToolFailure`] if the command exits non-zero.
pub fn run_captured_in(
    dir: &Path,
    program: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl Into<OsString>>,
) -> Result<String> {
    run_captured_from(Some(dir), program, args)
}

fn run_captured_from(
    dir: Option<&Path>,
    program: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl Into<OsString>>,
) -> Result<String> {
    let args = args.into_iter().map(Into::into).collect::<Vec<_>>();
    debug!("run captured: {:?} {:?} (cwd {:?})", program.as_ref(), args, dir);

    let mut command = Command::new(program.as_ref());
    command.args(&args);
    if let Some(dir) = dir {
        command.current_dir(dir);
    }

    let output = command.output().map_err(|err| Error::Spawn {
        source: err,
        program: program.as_ref().to_os_string(),
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if !output.status.success() {
        return Err(Error::ToolFailure {
            program: program.as_ref().to_os_string(),
            code: output.status.code().unwrap_or(-1),
            detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(chomp(stdout))
}

/// Run a command with inherited stdio, failing on non-zero exit.
///
/// Used for pass-through invocations where the tool's own diagnostics and
/// prompts must reach the terminal untouched.
///
/// # Errors
///
/// - Return [`Error::Spawn`] if the command cannot be started.
/// - Return [`Error::ToolFailure`] if the command exits non-zero.
pub fn run_interactive(
    program: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl Into<OsString>>,
) -> Result<()> {
    let args = args.into_iter().map(Into::into).collect::<Vec<_>>();
    debug!("run interactive: {:?} {:?}", program.as_ref(), args);

    let status = Command::new(program.as_ref())
        .args(&args)
        .spawn()
        .map_err(|err| Error::Spawn {
            source: err,
            program: program.as_ref().to_os_string(),
        })?
        .wait()
        .map_err(|err| Error::Spawn {
            source: err,
            program: program.as_ref().to_os_string(),
        })?;

    if !status.success() {
        return Err(Error::ToolFailure {
            program: program.as_ref().to_os_string(),
            code: status.code().unwrap_or(-1),
            detail: String::new(),
        });
    }

    Ok(())
}

/// One stage of a process pipeline.
#[derive(Clone, Debug)]
pub struct Stage {
    program: OsString,
    args: Vec<OsString>,
}

impl Stage {
    pub fn new(
        program: impl Into<OsString>,
        args: impl IntoIterator<Item = impl Into<OsString>>,
    ) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn program(&self) -> &OsStr {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }
}

/// Run stages as a pipeline, stdout of each feeding stdin of the next.
///
/// The final stage inherits stdout so listings reach the terminal. All
/// stages inherit stderr. Every stage is waited on, and the first stage that
/// exited non-zero decides the pipeline's failure, regardless of what later
/// stages reported.
///
/// # Errors
///
/// - Return [`Error::Spawn`] if any stage cannot be started.
/// - Return [`Error::ToolFailure`] naming the earliest failed stage.
pub fn run_pipeline(stages: Vec<Stage>) -> Result<()> {
    let count = stages.len();
    let mut children = Vec::with_capacity(count);
    let mut upstream = None;

    for (index, stage) in stages.iter().enumerate() {
        debug!("pipeline stage {index}: {:?} {:?}", stage.program, stage.args);
        let mut command = Command::new(&stage.program);
        command.args(&stage.args);
        if let Some(out) = upstream.take() {
            command.stdin(Stdio::from(out));
        }
        if index + 1 < count {
            command.stdout(Stdio::piped());
        }

        let mut child = command.spawn().map_err(|err| Error::Spawn {
            source: err,
            program: stage.program.clone(),
        })?;
        upstream = child.stdout.take();
        children.push(child);
    }

    // Wait on every stage before judging any of them, so no child is left
    // behind and the earliest failure wins.
    let mut first_failure = None;
    for (stage, mut child) in stages.iter().zip(children) {
        let status = child.wait().map_err(|err| Error::Spawn {
            source: err,
            program: stage.program.clone(),
        })?;
        if !status.success() && first_failure.is_none() {
            first_failure = Some(Error::ToolFailure {
                program: stage.program.clone(),
                code: status.code().unwrap_or(-1),
                detail: String::new(),
            });
        }
    }

    match first_failure {
        Some(failure) => Err(failure),
        None => Ok(()),
    }
}

/// Check whether a program is reachable on `PATH`.
pub fn available(program: impl AsRef<OsStr>) -> bool {
    Command::new(program.as_ref())
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

/// Fail unless a required external tool is reachable on `PATH`.
///
/// # Errors
///
/// - Return [`Error::MissingTool`] naming the absent tool.
pub fn require(program: impl AsRef<OsStr>) -> Result<()> {
    if available(program.as_ref()) {
        Ok(())
    } else {
        Err(Error::MissingTool {
            program: program.as_ref().to_os_string(),
        })
    }
}

fn chomp(message: String) -> String {
    message
        .strip_suffix("\r\n")
        .or(message.strip_suffix('\n'))
        .map(ToString::to_string)
        .unwrap_or(message)
}

/// Process execution error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Required external tool is not installed.
    #[error("required tool {:?} not found on PATH", program)]
    MissingTool { program: OsString },

    /// Child process cannot be started or waited on.
    #[error("failed to run {:?}", program)]
    Spawn {
        #[source]
        source: std::io::Error,
        program: OsString,
    },

    /// Child process exited non-zero.
    #[error("{program:?} failed (exit {code}): {detail}")]
    ToolFailure {
        program: OsString,
        /// Exit code, or -1 when the child died to a signal.
        code: i32,
        detail: String,
    },
}

/// Friendly result alias :3
pub type Result<T, E = Error> = std::result::Result<T, E>;
