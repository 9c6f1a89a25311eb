//! Copying shared project code into each function's working directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sandbox_core::{ProjectManifest, Result, SandboxError, SOURCE_DIR};
use tokio::fs;
use tracing::{debug, info};

const SHARED_DIR: &str = "shared";
const VIEWS_DIR: &str = "views";
const VENDOR_DIR: &str = "vendor";

/// Dependency manifest and the directory its installed packages live in.
const DEPENDENCY_MARKERS: [(&str, &str); 3] = [
    ("package.json", "node_modules"),
    ("requirements.txt", "vendor"),
    ("Gemfile", "vendor/bundle"),
];

#[async_trait]
pub trait Hydrator: Send + Sync {
    async fn hydrate(&self, project_dir: &Path, manifest: &ProjectManifest) -> Result<()>;
}

/// Copies `src/shared` into every function and `src/views` into GET http
/// functions, both under `<function>/vendor/`. Never installs packages.
#[derive(Debug, Default, Clone, Copy)]
pub struct SharedCodeHydrator;

#[async_trait]
impl Hydrator for SharedCodeHydrator {
    async fn hydrate(&self, project_dir: &Path, manifest: &ProjectManifest) -> Result<()> {
        let source = project_dir.join(SOURCE_DIR);
        let shared = existing_dir(source.join(SHARED_DIR)).await;
        let views = existing_dir(source.join(VIEWS_DIR)).await;

        let mut hydrated = 0;
        for function in manifest.functions() {
            let dir = project_dir.join(&function.dir);
            if !is_dir(&dir).await {
                debug!(function = %function.name, "Function directory missing, skipping");
                continue;
            }

            let vendor = dir.join(VENDOR_DIR);
            if let Some(shared) = &shared {
                copy_dir(shared, &vendor.join(SHARED_DIR)).await?;
            }
            if let (true, Some(views)) = (function.receives_views, &views) {
                copy_dir(views, &vendor.join(VIEWS_DIR)).await?;
            }
            hydrated += 1;
        }

        info!(functions = hydrated, "Project files hydrated into functions");
        Ok(())
    }
}

/// Function directories with a dependency manifest but nothing installed.
pub async fn uninstalled_dependencies(
    project_dir: &Path,
    manifest: &ProjectManifest,
) -> Vec<PathBuf> {
    let mut missing = Vec::new();
    for function in manifest.functions() {
        let dir = project_dir.join(&function.dir);
        for (marker, installed) in DEPENDENCY_MARKERS {
            if is_file(&dir.join(marker)).await && !is_dir(&dir.join(installed)).await {
                missing.push(dir.clone());
                break;
            }
        }
    }
    missing
}

async fn is_dir(path: &Path) -> bool {
    fs::metadata(path).await.is_ok_and(|m| m.is_dir())
}

async fn is_file(path: &Path) -> bool {
    fs::metadata(path).await.is_ok_and(|m| m.is_file())
}

async fn existing_dir(path: PathBuf) -> Option<PathBuf> {
    is_dir(&path).await.then_some(path)
}

fn hydration_error(path: &Path, e: std::io::Error) -> SandboxError {
    SandboxError::HydrationFailed(format!("{}: {e}", path.display()))
}

/// Recursively copy `from` into `to`, replacing files that already exist.
async fn copy_dir(from: &Path, to: &Path) -> Result<()> {
    let mut pending = vec![(from.to_path_buf(), to.to_path_buf())];

    while let Some((src, dst)) = pending.pop() {
        fs::create_dir_all(&dst)
            .await
            .map_err(|e| hydration_error(&dst, e))?;

        let mut entries = fs::read_dir(&src)
            .await
            .map_err(|e| hydration_error(&src, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| hydration_error(&src, e))?
        {
            let path = entry.path();
            let target = dst.join(entry.file_name());
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| hydration_error(&path, e))?;

            if file_type.is_dir() {
                pending.push((path, target));
            } else {
                fs::copy(&path, &target)
                    .await
                    .map_err(|e| hydration_error(&path, e))?;
            }
        }
    }

    Ok(())
}
