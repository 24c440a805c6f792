//! Built-in tools: workspace-scoped shell execution and file access.
//!
//! These are reference implementations of the tool interface, not a
//! sandbox on their own — the deny-list/allow-list `pre_tool_use` hooks
//! in `neuron-hook-security` are the safety boundary (spec §4.6, §4.9).
//! These tools additionally refuse to escape their configured workspace
//! root, as defense-in-depth.

use crate::{ToolDyn, ToolOutput};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;

/// Executes a shell command inside a fixed working directory.
pub struct ShellExecuteTool {
    workdir: PathBuf,
}

impl ShellExecuteTool {
    /// Create a shell tool scoped to `workdir`. All commands run with
    /// this as their current directory regardless of what the caller
    /// passes.
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

impl ToolDyn for ShellExecuteTool {
    fn name(&self) -> &str {
        "shell_execute"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the workspace directory and capture stdout/stderr."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {"type": "string", "description": "Shell command to run"}
            },
            "required": ["command"]
        })
    }

    fn call(
        &self,
        input: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = ToolOutput> + Send + '_>> {
        Box::pin(async move {
            let Some(command) = input.get("command").and_then(|v| v.as_str()) else {
                return ToolOutput::Error("invalid_input: missing 'command'".into());
            };

            let output = tokio::process::Command::new("sh")
                .arg("-c")
                .arg(command)
                .current_dir(&self.workdir)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output()
                .await;

            match output {
                Ok(out) => {
                    let mut text = String::from_utf8_lossy(&out.stdout).into_owned();
                    if !out.stderr.is_empty() {
                        text.push_str("\n--- stderr ---\n");
                        text.push_str(&String::from_utf8_lossy(&out.stderr));
                    }
                    ToolOutput::Text(text)
                }
                Err(e) => ToolOutput::Error(format!("execution_failed: {e}")),
            }
        })
    }
}

/// Reads a UTF-8 file from disk, scoped to an allow-listed root.
pub struct ReadFileTool {
    allowed_root: PathBuf,
}

impl ReadFileTool {
    /// Create a file-read tool scoped to `allowed_root`.
    pub fn new(allowed_root: impl Into<PathBuf>) -> Self {
        Self {
            allowed_root: allowed_root.into(),
        }
    }

    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let candidate = Path::new(path);
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.allowed_root.join(candidate)
        };
        let normalized = normalize(&joined);
        normalized
            .starts_with(normalize(&self.allowed_root))
            .then_some(normalized)
    }
}

fn normalize(path: &Path) -> PathBuf {
    use std::path::Component;
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

impl ToolDyn for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a UTF-8 text file within the workspace."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"}
            },
            "required": ["path"]
        })
    }

    fn call(
        &self,
        input: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = ToolOutput> + Send + '_>> {
        Box::pin(async move {
            let Some(path) = input.get("path").and_then(|v| v.as_str()) else {
                return ToolOutput::Error("invalid_input: missing 'path'".into());
            };
            let Some(resolved) = self.resolve(path) else {
                return ToolOutput::Error(format!("blocked: '{path}' outside allow-list"));
            };
            match tokio::fs::read_to_string(&resolved).await {
                Ok(content) => ToolOutput::Text(content),
                Err(e) => ToolOutput::Error(format!("execution_failed: {e}")),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn shell_execute_runs_command() {
        let dir = std::env::temp_dir();
        let tool = ShellExecuteTool::new(dir);
        let out = tool.call(json!({"command": "echo hi"})).await;
        match out {
            ToolOutput::Text(s) => assert!(s.contains("hi")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn shell_execute_missing_command() {
        let dir = std::env::temp_dir();
        let tool = ShellExecuteTool::new(dir);
        let out = tool.call(json!({})).await;
        assert!(out.is_error());
    }

    #[tokio::test]
    async fn read_file_reads_within_root() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("hello.txt");
        tokio::fs::write(&file_path, "hello world").await.unwrap();

        let tool = ReadFileTool::new(dir.path());
        let out = tool.call(json!({"path": "hello.txt"})).await;
        match out {
            ToolOutput::Text(s) => assert_eq!(s, "hello world"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn read_file_blocks_escape() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ReadFileTool::new(dir.path());
        let out = tool.call(json!({"path": "../../etc/passwd"})).await;
        assert!(out.is_error());
    }
}
