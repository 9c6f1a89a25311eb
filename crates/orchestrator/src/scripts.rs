use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use sandbox_core::{Result, SandboxError};
use tokio::process::Command;
use tracing::info;

/// Runs one user startup command.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    async fn run(&self, command: &str, cwd: &Path, env: &BTreeMap<String, String>) -> Result<()>;
}

/// Runs commands through `sh -c`, inheriting stdout and stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellScriptRunner;

#[async_trait]
impl ScriptRunner for ShellScriptRunner {
    async fn run(&self, command: &str, cwd: &Path, env: &BTreeMap<String, String>) -> Result<()> {
        info!(command, "Running startup script");

        let status = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(cwd)
            .envs(env)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|e| SandboxError::StartupScriptFailed {
                command: command.to_string(),
                reason: e.to_string(),
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(SandboxError::StartupScriptFailed {
                command: command.to_string(),
                reason: format!("exited with {status}"),
            })
        }
    }
}
