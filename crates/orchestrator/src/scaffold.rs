use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sandbox_core::{FunctionKind, FunctionSpec, ProjectManifest, Result, SandboxError};
use tokio::fs;
use tracing::info;

const HANDLER_FILE: &str = "index.js";

/// Creates handlers for declared functions that do not exist yet.
#[async_trait]
pub trait Scaffolder: Send + Sync {
    /// Returns the directories it created.
    async fn scaffold(
        &self,
        project_dir: &Path,
        manifest: &ProjectManifest,
    ) -> Result<Vec<PathBuf>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StubScaffolder;

impl StubScaffolder {
    fn handler_source(function: &FunctionSpec) -> String {
        match function.kind {
            FunctionKind::Http => format!(
                "exports.handler = async function http (req) {{\n  return {{\n    statusCode: 200,\n    headers: {{ 'content-type': 'application/json; charset=utf8' }},\n    body: JSON.stringify({{ function: '{}' }})\n  }}\n}}\n",
                function.name
            ),
            FunctionKind::Event | FunctionKind::Queue => format!(
                "exports.handler = async function {} (event) {{\n  console.log(JSON.stringify(event, null, 2))\n  return\n}}\n",
                function.kind.as_str()
            ),
            FunctionKind::Ws => {
                "exports.handler = async function ws (req) {\n  return { statusCode: 200 }\n}\n"
                    .to_string()
            }
        }
    }
}

#[async_trait]
impl Scaffolder for StubScaffolder {
    async fn scaffold(
        &self,
        project_dir: &Path,
        manifest: &ProjectManifest,
    ) -> Result<Vec<PathBuf>> {
        let mut created = Vec::new();

        for function in manifest.functions() {
            let dir = project_dir.join(&function.dir);
            if fs::try_exists(&dir).await.unwrap_or(false) {
                continue;
            }

            let failed =
                |e: std::io::Error| SandboxError::ScaffoldFailed(format!("{}: {e}", dir.display()));
            fs::create_dir_all(&dir).await.map_err(failed)?;
            fs::write(dir.join(HANDLER_FILE), Self::handler_source(&function))
                .await
                .map_err(failed)?;

            info!(function = %function.name, kind = function.kind.as_str(), "Created missing function");
            created.push(dir);
        }

        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sandbox_core::{HttpRoute, WsSection};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_creates_missing_functions() {
        let dir = TempDir::new().unwrap();
        let mut manifest = ProjectManifest::default_project();
        manifest.http.push(HttpRoute::new("get", "/api/items/:id"));
        manifest.queues.push("jobs".to_string());
        manifest.ws = WsSection { enabled: true };

        let created = StubScaffolder.scaffold(dir.path(), &manifest).await.unwrap();

        assert_eq!(created.len(), 5);
        let handler = std::fs::read_to_string(
            dir.path()
                .join("src/http/get-api-items-000id")
                .join(HANDLER_FILE),
        )
        .unwrap();
        assert!(handler.contains("statusCode: 200"));
        assert!(dir.path().join("src/queues/jobs/index.js").exists());
        assert!(dir.path().join("src/ws/disconnect/index.js").exists());
    }

    #[tokio::test]
    async fn test_existing_functions_are_left_alone() {
        let dir = TempDir::new().unwrap();
        let existing = dir.path().join("src/events/ping");
        std::fs::create_dir_all(&existing).unwrap();
        std::fs::write(existing.join("index.js"), "custom").unwrap();
        let mut manifest = ProjectManifest::default_project();
        manifest.events.push("ping".to_string());

        let created = StubScaffolder.scaffold(dir.path(), &manifest).await.unwrap();

        assert!(created.is_empty());
        assert_eq!(
            std::fs::read_to_string(existing.join("index.js")).unwrap(),
            "custom"
        );
    }

    #[tokio::test]
    async fn test_unwritable_location_fails() {
        let dir = TempDir::new().unwrap();
        // A file where the `src` directory should be
        std::fs::write(dir.path().join("src"), "").unwrap();
        let mut manifest = ProjectManifest::default_project();
        manifest.events.push("ping".to_string());

        let err = StubScaffolder
            .scaffold(dir.path(), &manifest)
            .await
            .unwrap_err();

        assert!(matches!(err, SandboxError::ScaffoldFailed(_)));
    }
}
