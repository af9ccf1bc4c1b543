//! MCP-style subprocess tools: each invocation spawns a fresh child
//! process with stdio transport, runs one request to completion, and
//! tears down. No subprocess outlives a single [`Tool::execute`] call.

use super::{Tool, ToolKind, ToolResult};
use serde_json::Value;
use std::process::Stdio;
use tokio::io::{AsyncWriteExt, AsyncReadExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// A tool backed by an external command. `args` (JSON) is written to
/// the child's stdin as a single line; stdout is returned verbatim as
/// the tool result.
pub struct SubprocessTool {
    name: String,
    description: String,
    input_schema: Value,
    program: String,
    program_args: Vec<String>,
    /// `(source_env_var, renamed_env_var)` pairs applied to the child's
    /// environment on every invocation, e.g.
    /// `("GITHUB_PERSONAL_ACCESS_TOKEN", "GITHUB_TOKEN")`.
    env_renames: Vec<(String, String)>,
}

impl SubprocessTool {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        program: impl Into<String>,
        program_args: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            program: program.into(),
            program_args,
            env_renames: Vec::new(),
        }
    }

    /// Declares that `source` (if set in the parent process's
    /// environment) should be forwarded to the child as `renamed`.
    #[must_use]
    pub fn with_env_rename(mut self, source: impl Into<String>, renamed: impl Into<String>) -> Self {
        self.env_renames.push((source.into(), renamed.into()));
        self
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.program_args);
        for (source, renamed) in &self.env_renames {
            if let Ok(value) = std::env::var(source) {
                cmd.env(renamed, value);
            }
        }
        cmd.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd
    }
}

#[async_trait::async_trait]
impl Tool for SubprocessTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        self.input_schema.clone()
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Subprocess
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let mut child = match self.build_command().kill_on_drop(true).spawn() {
            Ok(c) => c,
            Err(e) => return ToolResult::error(format!("failed to spawn {}: {e}", self.program)),
        };

        if let Some(mut stdin) = child.stdin.take() {
            let payload = serde_json::to_vec(&args).unwrap_or_default();
            if let Err(e) = stdin.write_all(&payload).await {
                return ToolResult::error(format!("failed to write to {} stdin: {e}", self.program));
            }
        }

        match child.wait_with_output().await {
            Ok(out) if out.status.success() => {
                ToolResult::text(String::from_utf8_lossy(&out.stdout).trim().to_string())
            }
            Ok(out) => ToolResult::error(format!(
                "{} exited with {}: {}",
                self.program,
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            )),
            Err(e) => ToolResult::error(format!("failed to wait on {}: {e}", self.program)),
        }
    }

    async fn execute_cancellable(&self, args: Value, cancel: CancellationToken) -> ToolResult {
        let mut child = match self.build_command().kill_on_drop(true).spawn() {
            Ok(c) => c,
            Err(e) => return ToolResult::error(format!("failed to spawn {}: {e}", self.program)),
        };
        if let Some(mut stdin) = child.stdin.take() {
            let payload = serde_json::to_vec(&args).unwrap_or_default();
            let _ = stdin.write_all(&payload).await;
        }

        tokio::select! {
            status = child.wait() => match status {
                Ok(status) => {
                    let mut stdout = String::new();
                    let mut stderr = String::new();
                    if let Some(mut out) = child.stdout.take() {
                        let _ = out.read_to_string(&mut stdout).await;
                    }
                    if let Some(mut err) = child.stderr.take() {
                        let _ = err.read_to_string(&mut stderr).await;
                    }
                    if status.success() {
                        ToolResult::text(stdout.trim().to_string())
                    } else {
                        ToolResult::error(format!("{} exited with {status}: {}", self.program, stderr.trim()))
                    }
                }
                Err(e) => ToolResult::error(format!("failed to wait on {}: {e}", self.program)),
            },
            () = cancel.cancelled() => {
                let _ = child.kill().await;
                ToolResult::text("[cancelled]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_a_real_command_and_captures_stdout() {
        let tool = SubprocessTool::new("cat", "echoes stdin", Value::Null, "cat", Vec::new());
        let result = tool.execute(serde_json::json!({"x": 1})).await;
        assert!(matches!(result, ToolResult::Text(s) if s.contains("\"x\":1")));
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported_as_error() {
        let tool = SubprocessTool::new("false", "always fails", Value::Null, "false", Vec::new());
        let result = tool.execute(Value::Null).await;
        assert!(result.is_error());
    }

    #[tokio::test]
    async fn env_rename_forwards_renamed_variable() {
        unsafe {
            std::env::set_var("PERSAG_TEST_SOURCE_TOKEN", "secret-value");
        }
        let tool = SubprocessTool::new(
            "printenv",
            "prints env",
            Value::Null,
            "printenv",
            vec!["RENAMED_TOKEN".to_string()],
        )
        .with_env_rename("PERSAG_TEST_SOURCE_TOKEN", "RENAMED_TOKEN");
        let result = tool.execute(Value::Null).await;
        assert!(matches!(result, ToolResult::Text(s) if s == "secret-value"));
    }
}
