use std::io::ErrorKind;
use std::sync::Arc;

use async_trait::async_trait;
use sandbox_core::{ManifestReader, ProjectManifest, Result, SandboxError};
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::context::OrchestrationContext;

#[async_trait]
pub trait PortProbe: Send + Sync {
    async fn is_in_use(&self, port: u16) -> Result<bool>;
}

/// Probes by binding the port and releasing it straight away.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpPortProbe;

#[async_trait]
impl PortProbe for TcpPortProbe {
    async fn is_in_use(&self, port: u16) -> Result<bool> {
        // Port 0 asks the OS for any free port.
        if port == 0 {
            return Ok(false);
        }

        match TcpListener::bind(("0.0.0.0", port)).await {
            Ok(listener) => {
                drop(listener);
                Ok(false)
            }
            Err(e) if e.kind() == ErrorKind::AddrInUse => Ok(true),
            Err(e) => Err(SandboxError::PortProbeFailed {
                port,
                reason: e.to_string(),
            }),
        }
    }
}

/// Gates the run on a free port and settles which manifest is in effect.
pub struct PreflightValidator {
    probe: Arc<dyn PortProbe>,
    reader: Arc<dyn ManifestReader>,
}

impl PreflightValidator {
    pub fn new(probe: Arc<dyn PortProbe>, reader: Arc<dyn ManifestReader>) -> Self {
        Self { probe, reader }
    }

    pub async fn validate(&self, ctx: &mut OrchestrationContext) -> Result<()> {
        let port = ctx.port();
        if self.probe.is_in_use(port).await? {
            return Err(SandboxError::PortInUse { port });
        }
        debug!(port, "Port is free");

        match self.reader.read(&ctx.project_dir).await {
            Ok(loaded) => {
                info!(path = %loaded.path.display(), "Found project manifest, starting up");
                ctx.manifest = Arc::new(loaded.manifest);
                ctx.manifest_path = Some(loaded.path);
            }
            Err(SandboxError::ManifestNotFound { searched }) => {
                debug!(searched = searched.len(), "No manifest candidates matched");
                ctx.manifest = Arc::new(ProjectManifest::default_project());
                ctx.manifest_path = None;
                ctx.warn("No project manifest found, using default project");
            }
            Err(e) => return Err(e),
        }

        Ok(())
    }
}
