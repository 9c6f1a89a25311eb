//! Project manifest model and discovery.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;
use utoipa::ToSchema;

use crate::error::{Result, SandboxError};

pub const MANIFEST_FILE: &str = "sandbox.toml";
pub const MANIFEST_JSON_FILE: &str = "sandbox.json";
pub const SOURCE_DIR: &str = "src";

const DEFAULT_PROJECT_NAME: &str = "sandbox-app";
const HTTP_METHODS: [&str; 8] = ["get", "post", "put", "patch", "delete", "head", "options", "any"];

/// Project descriptor declaring what the sandbox should emulate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProjectManifest {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub http: Vec<HttpRoute>,
    #[serde(default)]
    pub ws: WsSection,
    #[serde(default)]
    pub tables: Vec<TableSpec>,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub queues: Vec<String>,
    #[serde(default)]
    pub sandbox: SandboxSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AppSection {
    pub name: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: DEFAULT_PROJECT_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HttpRoute {
    pub method: String,
    pub path: String,
}

impl HttpRoute {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into().to_ascii_lowercase(),
            path: path.into(),
        }
    }

    /// Function directory name, e.g. `get-index` or `get-api-items-000id`.
    pub fn function_name(&self) -> String {
        let trimmed = self.path.trim_matches('/');
        let slug = if trimmed.is_empty() {
            "index".to_string()
        } else {
            trimmed.replace('/', "-").replace(':', "000")
        };
        format!("{}-{}", self.method.to_ascii_lowercase(), slug)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct WsSection {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TableSpec {
    pub name: String,
    #[serde(default = "default_partition_key")]
    pub partition_key: String,
    #[serde(default)]
    pub sort_key: Option<String>,
}

fn default_partition_key() -> String {
    "id".to_string()
}

impl TableSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partition_key: default_partition_key(),
            sort_key: None,
        }
    }
}

/// Sandbox-only settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SandboxSettings {
    /// Shell commands run once every service is up
    #[serde(default)]
    pub startup: Vec<String>,
    /// Sandbox version the project expects
    #[serde(default)]
    pub version: Option<String>,
}

/// Kind of a deployable function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Http,
    Event,
    Queue,
    Ws,
}

impl FunctionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Event => "events",
            Self::Queue => "queues",
            Self::Ws => "ws",
        }
    }
}

/// A function declared by the manifest, with its working directory
/// relative to the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSpec {
    pub kind: FunctionKind,
    pub name: String,
    pub dir: PathBuf,
    /// Whether shared view templates are copied into this function
    pub receives_views: bool,
}

impl FunctionSpec {
    fn new(kind: FunctionKind, name: String) -> Self {
        let dir = Path::new(SOURCE_DIR).join(kind.as_str()).join(&name);
        Self {
            kind,
            name,
            dir,
            receives_views: false,
        }
    }
}

impl ProjectManifest {
    /// The implicit project used when no manifest is found: no routes,
    /// no tables, no events.
    pub fn default_project() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.http.is_empty()
            && self.tables.is_empty()
            && self.events.is_empty()
            && self.queues.is_empty()
            && !self.ws.enabled
    }

    /// Every function working directory the project declares.
    pub fn functions(&self) -> Vec<FunctionSpec> {
        let mut functions = Vec::new();

        for route in &self.http {
            let mut spec = FunctionSpec::new(FunctionKind::Http, route.function_name());
            spec.receives_views = route.method.eq_ignore_ascii_case("get");
            functions.push(spec);
        }
        for name in &self.events {
            functions.push(FunctionSpec::new(FunctionKind::Event, name.clone()));
        }
        for name in &self.queues {
            functions.push(FunctionSpec::new(FunctionKind::Queue, name.clone()));
        }
        if self.ws.enabled {
            for name in ["connect", "default", "disconnect"] {
                functions.push(FunctionSpec::new(FunctionKind::Ws, name.to_string()));
            }
        }

        functions
    }

    pub fn declares_event(&self, name: &str) -> bool {
        self.events.iter().any(|e| e == name)
    }

    pub fn declares_queue(&self, name: &str) -> bool {
        self.queues.iter().any(|q| q == name)
    }

    /// Normalize and check the manifest.
    pub fn validate(&mut self) -> std::result::Result<(), String> {
        for route in &mut self.http {
            route.method = route.method.to_ascii_lowercase();
            if !HTTP_METHODS.contains(&route.method.as_str()) {
                return Err(format!("unsupported http method `{}`", route.method));
            }
            if !route.path.starts_with('/') {
                return Err(format!("http path `{}` must start with `/`", route.path));
            }
        }

        for table in &self.tables {
            validate_table_name(&table.name)?;
        }

        for name in self.events.iter().chain(self.queues.iter()) {
            if matches!(name.as_str(), "" | "." | "..") || name.contains(['/', '\\']) {
                return Err(format!("invalid event or queue name `{name}`"));
            }
        }

        Ok(())
    }
}

/// Table names follow the emulated store's rules: 3-255 characters of
/// `[A-Za-z0-9_.-]`.
pub fn validate_table_name(name: &str) -> std::result::Result<(), String> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if (3..=255).contains(&name.len()) && valid_chars {
        Ok(())
    } else {
        Err(format!("invalid table name `{name}`"))
    }
}

/// A manifest together with the file it was read from.
#[derive(Debug, Clone)]
pub struct LoadedManifest {
    pub manifest: ProjectManifest,
    pub path: PathBuf,
}

#[async_trait]
pub trait ManifestReader: Send + Sync {
    /// Locate and parse the project manifest.
    ///
    /// Returns [`SandboxError::ManifestNotFound`] when there is none; callers
    /// decide whether that is fatal.
    async fn read(&self, project_dir: &Path) -> Result<LoadedManifest>;
}

/// Reads `sandbox.toml`, falling back to `sandbox.json`.
#[derive(Debug, Clone)]
pub struct FileManifestReader {
    file_names: Vec<String>,
}

impl FileManifestReader {
    pub fn new() -> Self {
        Self {
            file_names: vec![MANIFEST_FILE.to_string(), MANIFEST_JSON_FILE.to_string()],
        }
    }

    pub fn with_file_names(file_names: Vec<String>) -> Self {
        Self { file_names }
    }

    fn parse(path: &Path, content: &str) -> std::result::Result<ProjectManifest, String> {
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            serde_json::from_str(content).map_err(|e| e.to_string())
        } else {
            toml::from_str(content).map_err(|e| e.to_string())
        }
    }
}

impl Default for FileManifestReader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ManifestReader for FileManifestReader {
    async fn read(&self, project_dir: &Path) -> Result<LoadedManifest> {
        let candidates: Vec<PathBuf> = self
            .file_names
            .iter()
            .map(|name| project_dir.join(name))
            .collect();

        for path in &candidates {
            if !fs::try_exists(path).await.unwrap_or(false) {
                continue;
            }

            let content = fs::read_to_string(path).await?;
            let mut manifest =
                Self::parse(path, &content).map_err(|reason| SandboxError::ManifestInvalid {
                    path: path.clone(),
                    reason,
                })?;
            manifest
                .validate()
                .map_err(|reason| SandboxError::ManifestInvalid {
                    path: path.clone(),
                    reason,
                })?;

            debug!(path = %path.display(), "Manifest loaded");
            return Ok(LoadedManifest {
                manifest,
                path: path.clone(),
            });
        }

        Err(SandboxError::ManifestNotFound {
            searched: candidates,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MANIFEST: &str = r#"
events = ["ping"]
queues = ["jobs"]

[app]
name = "shop"

[[http]]
method = "GET"
path = "/"

[[http]]
method = "post"
path = "/api/items/:id"

[[tables]]
name = "items"
sort_key = "created"

[sandbox]
startup = ["echo ready"]
"#;

    #[test]
    fn test_default_project_is_empty() {
        let project = ProjectManifest::default_project();
        assert!(project.is_empty());
        assert!(project.functions().is_empty());
        assert_eq!(project.app.name, "sandbox-app");
    }

    #[test]
    fn test_function_names() {
        assert_eq!(HttpRoute::new("GET", "/").function_name(), "get-index");
        assert_eq!(
            HttpRoute::new("post", "/api/items/:id").function_name(),
            "post-api-items-000id"
        );
    }

    #[test]
    fn test_functions_enumeration() {
        let mut manifest: ProjectManifest = toml::from_str(MANIFEST).unwrap();
        manifest.validate().unwrap();
        manifest.ws.enabled = true;

        let functions = manifest.functions();
        let dirs: Vec<_> = functions.iter().map(|f| f.dir.clone()).collect();

        assert_eq!(functions.len(), 7);
        assert!(dirs.contains(&PathBuf::from("src/http/get-index")));
        assert!(dirs.contains(&PathBuf::from("src/events/ping")));
        assert!(dirs.contains(&PathBuf::from("src/queues/jobs")));
        assert!(dirs.contains(&PathBuf::from("src/ws/disconnect")));
        assert!(functions[0].receives_views);
        assert!(!functions[1].receives_views);
    }

    #[test]
    fn test_validate_rejects_bad_method() {
        let mut manifest = ProjectManifest::default_project();
        manifest.http.push(HttpRoute::new("fetch", "/"));
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_dot_names() {
        for name in [".", ".."] {
            let mut manifest = ProjectManifest::default_project();
            manifest.events.push(name.to_string());
            assert!(manifest.validate().is_err(), "event `{name}` accepted");

            let mut manifest = ProjectManifest::default_project();
            manifest.queues.push(name.to_string());
            assert!(manifest.validate().is_err(), "queue `{name}` accepted");
        }

        let mut manifest = ProjectManifest::default_project();
        manifest.events.push("v1.ping".to_string());
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_validate_table_names() {
        assert!(validate_table_name("items").is_ok());
        assert!(validate_table_name("ab").is_err());
        assert!(validate_table_name("bad\"name").is_err());
    }

    #[tokio::test]
    async fn test_read_toml_manifest() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join(MANIFEST_FILE), MANIFEST).unwrap();

        let loaded = FileManifestReader::new().read(temp_dir.path()).await.unwrap();

        assert_eq!(loaded.path, temp_dir.path().join(MANIFEST_FILE));
        assert_eq!(loaded.manifest.app.name, "shop");
        assert_eq!(loaded.manifest.http[0].method, "get");
        assert_eq!(loaded.manifest.tables[0].partition_key, "id");
        assert_eq!(loaded.manifest.sandbox.startup, vec!["echo ready"]);
    }

    #[tokio::test]
    async fn test_read_json_fallback() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join(MANIFEST_JSON_FILE),
            r#"{"app": {"name": "json-app"}, "events": ["hit"]}"#,
        )
        .unwrap();

        let loaded = FileManifestReader::new().read(temp_dir.path()).await.unwrap();
        assert_eq!(loaded.manifest.app.name, "json-app");
        assert!(loaded.manifest.declares_event("hit"));
    }

    #[tokio::test]
    async fn test_read_missing_manifest() {
        let temp_dir = TempDir::new().unwrap();

        let result = FileManifestReader::new().read(temp_dir.path()).await;

        match result {
            Err(SandboxError::ManifestNotFound { searched }) => assert_eq!(searched.len(), 2),
            other => panic!("expected ManifestNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_read_invalid_manifest() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join(MANIFEST_FILE), "[[http]]\nmethod = 1\n").unwrap();

        let result = FileManifestReader::new().read(temp_dir.path()).await;
        assert!(matches!(result, Err(SandboxError::ManifestInvalid { .. })));
    }
}
