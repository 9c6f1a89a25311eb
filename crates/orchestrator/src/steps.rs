//! The startup steps a [`crate::Sandbox`] sequences.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use sandbox_core::{Result, SandboxError};
use tracing::{debug, info};

use crate::context::OrchestrationContext;
use crate::diagnostics;
use crate::env::{Environment, EnvironmentPreparer, PORT_ENV};
use crate::hydrate::{uninstalled_dependencies, Hydrator};
use crate::lifecycle::ServiceLifecycleCoordinator;
use crate::preflight::PreflightValidator;
use crate::scaffold::Scaffolder;
use crate::scripts::ScriptRunner;
use crate::sequencer::Step;

pub struct PreflightStep(pub Arc<PreflightValidator>);

#[async_trait]
impl Step<OrchestrationContext> for PreflightStep {
    fn name(&self) -> &str {
        "preflight"
    }

    async fn run(&self, ctx: &mut OrchestrationContext) -> Result<()> {
        self.0.validate(ctx).await
    }
}

/// Writes the resolved port, then fills in everything else.
pub struct EnvironmentStep {
    pub env: Arc<dyn Environment>,
    pub preparer: Arc<EnvironmentPreparer>,
}

#[async_trait]
impl Step<OrchestrationContext> for EnvironmentStep {
    fn name(&self) -> &str {
        "environment"
    }

    async fn run(&self, ctx: &mut OrchestrationContext) -> Result<()> {
        self.env.set(PORT_ENV, &ctx.port().to_string());
        self.preparer.prepare(ctx).await
    }
}

pub struct ScaffoldStep(pub Arc<dyn Scaffolder>);

#[async_trait]
impl Step<OrchestrationContext> for ScaffoldStep {
    fn name(&self) -> &str {
        "scaffold"
    }

    async fn run(&self, ctx: &mut OrchestrationContext) -> Result<()> {
        let created = self.0.scaffold(&ctx.project_dir, &ctx.manifest).await?;
        debug!(created = created.len(), "Scaffolding finished");
        Ok(())
    }
}

pub struct DependencyCheckStep;

#[async_trait]
impl Step<OrchestrationContext> for DependencyCheckStep {
    fn name(&self) -> &str {
        "dependency-check"
    }

    async fn run(&self, ctx: &mut OrchestrationContext) -> Result<()> {
        for dir in uninstalled_dependencies(&ctx.project_dir, &ctx.manifest).await {
            ctx.warn(format!(
                "Dependencies declared but not installed in {}",
                dir.display()
            ));
        }
        Ok(())
    }
}

pub struct HydrateStep(pub Arc<dyn Hydrator>);

#[async_trait]
impl Step<OrchestrationContext> for HydrateStep {
    fn name(&self) -> &str {
        "hydrate"
    }

    async fn run(&self, ctx: &mut OrchestrationContext) -> Result<()> {
        self.0.hydrate(&ctx.project_dir, &ctx.manifest).await
    }
}

pub struct ServicesStep(pub Arc<ServiceLifecycleCoordinator>);

#[async_trait]
impl Step<OrchestrationContext> for ServicesStep {
    fn name(&self) -> &str {
        "services"
    }

    async fn run(&self, ctx: &mut OrchestrationContext) -> Result<()> {
        let session = self.0.start_all(&ctx.subsystem_config()).await?;
        let port = session.port();
        info!(port, "Started HTTP gateway @ http://localhost:{}", port);
        ctx.session = Some(session);
        Ok(())
    }
}

pub struct ReadyStep;

#[async_trait]
impl Step<OrchestrationContext> for ReadyStep {
    fn name(&self) -> &str {
        "ready"
    }

    async fn run(&self, ctx: &mut OrchestrationContext) -> Result<()> {
        if !ctx.quiet {
            let elapsed = ctx.started_at.elapsed().as_millis();
            info!(elapsed_ms = elapsed as u64, "Started in {}ms", elapsed);
            info!("Local environment ready!");
        }
        Ok(())
    }
}

pub struct StartupScriptsStep(pub Arc<dyn ScriptRunner>);

#[async_trait]
impl Step<OrchestrationContext> for StartupScriptsStep {
    fn name(&self) -> &str {
        "startup-scripts"
    }

    async fn run(&self, ctx: &mut OrchestrationContext) -> Result<()> {
        for command in &ctx.manifest.sandbox.startup {
            self.0.run(command, &ctx.project_dir, &ctx.env).await?;
        }
        Ok(())
    }
}

/// Never fails.
pub struct GlobalInstallCheckStep {
    pub executable: Option<PathBuf>,
}

#[async_trait]
impl Step<OrchestrationContext> for GlobalInstallCheckStep {
    fn name(&self) -> &str {
        "global-install-check"
    }

    async fn run(&self, ctx: &mut OrchestrationContext) -> Result<()> {
        let Some(executable) = &self.executable else {
            return Ok(());
        };
        let warning = diagnostics::global_install_warning(
            executable,
            &ctx.project_dir,
            ctx.manifest.sandbox.version.as_deref(),
            env!("CARGO_PKG_VERSION"),
        );
        if let Some(warning) = warning {
            ctx.warn(warning);
        }
        Ok(())
    }
}

/// Session the services step left behind, or an error if it never ran.
pub(crate) fn take_session(ctx: &mut OrchestrationContext) -> Result<crate::SandboxSession> {
    ctx.session.take().ok_or_else(|| {
        SandboxError::start_failed(
            sandbox_core::Subsystem::HttpGateway,
            "services step did not run",
        )
    })
}
