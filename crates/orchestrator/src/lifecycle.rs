use std::sync::Arc;

use async_trait::async_trait;
use sandbox_core::{
    Result, SandboxError, Subsystem, SubsystemConfig, SubsystemHandle, SubsystemStarter,
};
use tracing::{error, info, warn};

use crate::sequencer::{Step, StepSequencer};
use crate::session::SandboxSession;

struct LaunchContext {
    config: SubsystemConfig,
    handles: Vec<Box<dyn SubsystemHandle>>,
}

struct StartSubsystem {
    name: String,
    starter: Arc<dyn SubsystemStarter>,
}

#[async_trait]
impl Step<LaunchContext> for StartSubsystem {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &mut LaunchContext) -> Result<()> {
        let subsystem = self.starter.subsystem();
        let handle = self
            .starter
            .start(&ctx.config)
            .await
            .map_err(|e| match e {
                SandboxError::SubsystemStartFailed { .. } => e,
                other => SandboxError::start_failed(subsystem, other),
            })?;
        info!(subsystem = %subsystem, "Subsystem started");
        ctx.handles.push(handle);
        Ok(())
    }
}

/// Brings the subsystems up in a fixed order: data store, event bus, gateway.
pub struct ServiceLifecycleCoordinator {
    starters: [Arc<dyn SubsystemStarter>; 3],
}

impl ServiceLifecycleCoordinator {
    pub fn new(
        data_store: Arc<dyn SubsystemStarter>,
        event_bus: Arc<dyn SubsystemStarter>,
        http_gateway: Arc<dyn SubsystemStarter>,
    ) -> Self {
        Self {
            starters: [data_store, event_bus, http_gateway],
        }
    }

    pub fn start_order(&self) -> Vec<Subsystem> {
        self.starters.iter().map(|s| s.subsystem()).collect()
    }

    /// Start every subsystem.
    ///
    /// On failure the handles that did start are closed in reverse order
    /// before the start error is returned, so nothing is left running.
    pub async fn start_all(&self, config: &SubsystemConfig) -> Result<SandboxSession> {
        let mut sequencer = StepSequencer::new();
        for starter in &self.starters {
            sequencer.push(Box::new(StartSubsystem {
                name: starter.subsystem().to_string(),
                starter: starter.clone(),
            }));
        }

        let mut launch = LaunchContext {
            config: config.clone(),
            handles: Vec::new(),
        };
        let outcome = sequencer.run_with(&mut launch).await;
        let mut session = SandboxSession::new(config.port, launch.handles);

        match outcome {
            Ok(()) => Ok(session),
            Err(e) => {
                let cause = e.into_root_cause();
                error!(error = %cause, started = session.len(), "Subsystem start failed");
                if let Err(teardown) = session.close().await {
                    warn!(error = %teardown, "Rollback of started subsystems failed");
                }
                Err(cause)
            }
        }
    }
}
