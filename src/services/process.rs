use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;

/// Characters of tool diagnostics kept in error messages.
pub const DIAGNOSTIC_TAIL_CHARS: usize = 2000;

/// Captured output of a successful tool run.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Build a command with piped output and no stdin.
pub fn tool_command<I, S>(program: &Path, args: I) -> Command
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command
        .args(args)
        .kill_on_drop(true)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    command
}

/// Run a tool to completion, killing it if it exceeds `limit`.
pub async fn run_tool(mut command: Command, limit: Duration) -> Result<ToolOutput, ToolError> {
    let program = command.as_std().get_program().to_string_lossy().into_owned();
    tracing::debug!(program = %program, "Running external tool");

    let output = match timeout(limit, command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(source)) => return Err(ToolError::Spawn { program, source }),
        Err(_) => {
            tracing::warn!(program = %program, timeout_secs = limit.as_secs(), "External tool timed out");
            return Err(ToolError::Timeout {
                program,
                secs: limit.as_secs(),
            });
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        let diagnostics = if stderr.trim().is_empty() { &stdout } else { &stderr };
        return Err(ToolError::Failed {
            program,
            code: output.status.code(),
            diagnostics: tail(diagnostics, DIAGNOSTIC_TAIL_CHARS),
        });
    }

    Ok(ToolOutput { stdout, stderr })
}

/// Last `max_chars` characters of `text`.
pub fn tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    text.chars().skip(count - max_chars).collect()
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("{program} could not be started: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} timed out after {secs}s")]
    Timeout { program: String, secs: u64 },

    #[error("{program} exited with status {code:?}: {diagnostics}")]
    Failed {
        program: String,
        code: Option<i32>,
        diagnostics: String,
    },
}
