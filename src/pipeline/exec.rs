//! External tool invocation.
//!
//! Every stage is a thin wrapper around one external program. This module
//! resolves the program through [`tool_locate`], runs it to completion with
//! captured output and turns a non-zero exit into
//! [`PipelineError::ToolFailed`] carrying the exact command line and stderr.
//! There is no timeout: a hanging tool hangs the stage.

use crate::config::ToolSpec;
use crate::error::PipelineError;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, error};

/// Captured result of a successful tool run.
#[derive(Debug, Clone)]
pub struct ToolRun {
    pub stdout: String,
    pub stderr: String,
}

/// Resolve the executable behind `tool`.
pub fn resolve(tool: &ToolSpec) -> Result<PathBuf, PipelineError> {
    Ok(tool_locate::locate(&tool.program)?)
}

/// Run `tool` with its prefix arguments followed by `args`.
///
/// `cwd` sets the working directory; relative asset paths in the converter
/// and renderer resolve against it.
pub async fn run_tool(
    tool: &ToolSpec,
    args: &[OsString],
    cwd: Option<&Path>,
) -> Result<ToolRun, PipelineError> {
    let program = resolve(tool)?;
    let name = tool.display_name();
    let command_line = render_command(tool, args);
    debug!("Running: {}", command_line);

    let mut cmd = Command::new(&program);
    cmd.args(&tool.args)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let output = cmd
        .output()
        .await
        .map_err(|source| PipelineError::ToolSpawnFailed {
            tool: name.clone(),
            source,
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        error!("'{}' exited with {}: {}", name, output.status, stderr.trim());
        return Err(PipelineError::ToolFailed {
            tool: name,
            command: command_line,
            status: output.status.to_string(),
            stderr: stderr.trim().to_string(),
        });
    }

    if !stderr.trim().is_empty() {
        debug!("{} stderr: {}", name, stderr.trim());
    }
    Ok(ToolRun { stdout, stderr })
}

/// Shell-like rendering of the full command line for logs and errors.
pub fn render_command(tool: &ToolSpec, args: &[OsString]) -> String {
    std::iter::once(tool.program.clone())
        .chain(tool.args.iter().cloned())
        .chain(args.iter().map(|a| a.to_string_lossy().into_owned()))
        .map(|a| quote(&a))
        .collect::<Vec<_>>()
        .join(" ")
}

fn quote(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:+,@%".contains(c))
    {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Fail with [`PipelineError::MissingOutput`] unless `path` is a non-empty file.
pub fn expect_output(tool: &ToolSpec, path: &Path) -> Result<u64, PipelineError> {
    match std::fs::metadata(path) {
        Ok(m) if m.is_file() && m.len() > 0 => Ok(m.len()),
        _ => Err(PipelineError::MissingOutput {
            tool: tool.display_name(),
            path: path.to_path_buf(),
        }),
    }
}
