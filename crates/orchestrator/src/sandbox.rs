use std::path::PathBuf;
use std::sync::Arc;

use sandbox_core::{FileManifestReader, ManifestReader, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{ConfigResolver, DEFAULT_PORT};
use crate::context::OrchestrationContext;
use crate::diagnostics;
use crate::env::{
    DotenvPopulator, EnvDefaults, EnvPopulator, Environment, EnvironmentPreparer,
    ProcessEnvironment,
};
use crate::hydrate::{Hydrator, SharedCodeHydrator};
use crate::lifecycle::ServiceLifecycleCoordinator;
use crate::preflight::{PortProbe, PreflightValidator, TcpPortProbe};
use crate::scaffold::{Scaffolder, StubScaffolder};
use crate::scripts::{ScriptRunner, ShellScriptRunner};
use crate::sequencer::StepSequencer;
use crate::session::SandboxSession;
use crate::steps::{
    take_session, DependencyCheckStep, EnvironmentStep, GlobalInstallCheckStep, HydrateStep,
    PreflightStep, ReadyStep, ScaffoldStep, ServicesStep, StartupScriptsStep,
};

/// Which step list a run uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StartMode {
    /// preflight, environment, hydrate, services
    Standalone,
    /// Standalone plus scaffolding, dependency pre-check, ready report,
    /// startup scripts and the global-install diagnostic
    #[default]
    Extended,
}

impl StartMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StartMode::Standalone => "standalone",
            StartMode::Extended => "extended",
        }
    }
}

impl std::str::FromStr for StartMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "standalone" => Ok(StartMode::Standalone),
            "extended" => Ok(StartMode::Extended),
            other => Err(format!("unknown start mode: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StartParams {
    /// Raw option tokens, e.g. `["-p", "4000", "verbose"]`
    pub options: Vec<String>,
    /// Port used when neither the options nor `PORT` name one
    pub port: Option<u16>,
    pub project_dir: PathBuf,
    pub quiet: bool,
    pub mode: StartMode,
    pub cancel: Option<CancellationToken>,
}

impl Default for StartParams {
    fn default() -> Self {
        Self {
            options: Vec::new(),
            port: None,
            project_dir: PathBuf::from("."),
            quiet: false,
            mode: StartMode::default(),
            cancel: None,
        }
    }
}

/// Entry point: resolves configuration and runs the startup steps.
pub struct Sandbox {
    env: Arc<dyn Environment>,
    preflight: Arc<PreflightValidator>,
    preparer: Arc<EnvironmentPreparer>,
    hydrator: Arc<dyn Hydrator>,
    scaffolder: Arc<dyn Scaffolder>,
    scripts: Arc<dyn ScriptRunner>,
    services: Arc<ServiceLifecycleCoordinator>,
    executable: Option<PathBuf>,
}

impl Sandbox {
    pub fn builder(services: ServiceLifecycleCoordinator) -> SandboxBuilder {
        SandboxBuilder::new(services)
    }

    fn sequencer(&self, mode: StartMode) -> StepSequencer<OrchestrationContext> {
        let sequencer = StepSequencer::new()
            .step(PreflightStep(self.preflight.clone()))
            .step(EnvironmentStep {
                env: self.env.clone(),
                preparer: self.preparer.clone(),
            });

        match mode {
            StartMode::Standalone => sequencer
                .step(HydrateStep(self.hydrator.clone()))
                .step(ServicesStep(self.services.clone())),
            StartMode::Extended => sequencer
                .step(ScaffoldStep(self.scaffolder.clone()))
                .step(DependencyCheckStep)
                .step(HydrateStep(self.hydrator.clone()))
                .step(ServicesStep(self.services.clone()))
                .step(ReadyStep)
                .step(StartupScriptsStep(self.scripts.clone()))
                .step(GlobalInstallCheckStep {
                    executable: self.executable.clone(),
                }),
        }
    }

    pub async fn start(&self, params: StartParams) -> Result<SandboxSession> {
        let port = ConfigResolver::resolve(
            &params.options,
            self.env.as_ref(),
            params.port,
            DEFAULT_PORT,
        );
        let verbose = ConfigResolver::is_verbose(&params.options);
        info!(
            port = port.port(),
            source = port.source().as_str(),
            mode = params.mode.as_str(),
            "Starting sandbox"
        );

        let mut ctx = OrchestrationContext::new(port, params.project_dir, verbose, params.quiet);
        let mut sequencer = self.sequencer(params.mode);
        if let Some(token) = params.cancel {
            sequencer = sequencer.with_cancellation(token);
        }

        if let Err(e) = sequencer.run_with(&mut ctx).await {
            if let Some(mut session) = ctx.session.take() {
                if let Err(teardown) = session.close().await {
                    warn!(error = %teardown, "Closing the partial session failed");
                }
            }
            error!(error = %e, "Sandbox failed to start");
            return Err(e);
        }

        if let Some(warning) = diagnostics::credentials_warning(ctx.verbose, &ctx.env) {
            ctx.warn(warning);
        }

        let warnings = std::mem::take(&mut ctx.warnings);
        Ok(take_session(&mut ctx)?.with_warnings(warnings))
    }
}

pub struct SandboxBuilder {
    env: Arc<dyn Environment>,
    populator: Arc<dyn EnvPopulator>,
    defaults: EnvDefaults,
    probe: Arc<dyn PortProbe>,
    reader: Arc<dyn ManifestReader>,
    hydrator: Arc<dyn Hydrator>,
    scaffolder: Arc<dyn Scaffolder>,
    scripts: Arc<dyn ScriptRunner>,
    services: ServiceLifecycleCoordinator,
    executable: Option<PathBuf>,
}

impl SandboxBuilder {
    fn new(services: ServiceLifecycleCoordinator) -> Self {
        Self {
            env: Arc::new(ProcessEnvironment),
            populator: Arc::new(DotenvPopulator),
            defaults: EnvDefaults::default(),
            probe: Arc::new(TcpPortProbe),
            reader: Arc::new(FileManifestReader::new()),
            hydrator: Arc::new(SharedCodeHydrator),
            scaffolder: Arc::new(StubScaffolder),
            scripts: Arc::new(ShellScriptRunner),
            services,
            executable: std::env::current_exe().ok(),
        }
    }

    pub fn environment(mut self, env: Arc<dyn Environment>) -> Self {
        self.env = env;
        self
    }

    pub fn env_populator(mut self, populator: Arc<dyn EnvPopulator>) -> Self {
        self.populator = populator;
        self
    }

    pub fn env_defaults(mut self, defaults: EnvDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn port_probe(mut self, probe: Arc<dyn PortProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn manifest_reader(mut self, reader: Arc<dyn ManifestReader>) -> Self {
        self.reader = reader;
        self
    }

    pub fn hydrator(mut self, hydrator: Arc<dyn Hydrator>) -> Self {
        self.hydrator = hydrator;
        self
    }

    pub fn scaffolder(mut self, scaffolder: Arc<dyn Scaffolder>) -> Self {
        self.scaffolder = scaffolder;
        self
    }

    pub fn script_runner(mut self, scripts: Arc<dyn ScriptRunner>) -> Self {
        self.scripts = scripts;
        self
    }

    /// Path of the running executable, for the global-install diagnostic.
    pub fn executable(mut self, executable: Option<PathBuf>) -> Self {
        self.executable = executable;
        self
    }

    pub fn build(self) -> Sandbox {
        Sandbox {
            preflight: Arc::new(PreflightValidator::new(self.probe, self.reader)),
            preparer: Arc::new(EnvironmentPreparer::new(
                self.env.clone(),
                self.populator,
                self.defaults,
            )),
            env: self.env,
            hydrator: self.hydrator,
            scaffolder: self.scaffolder,
            scripts: self.scripts,
            services: Arc::new(self.services),
            executable: self.executable,
        }
    }
}
