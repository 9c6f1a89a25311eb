use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use orchestrator::{
    Environment, MapEnvironment, PortProbe, Sandbox, SandboxBuilder, ScriptRunner,
    ServiceLifecycleCoordinator, StartMode, StartParams,
};
use sandbox_core::{
    ProjectManifest, Result, SandboxError, Subsystem, SubsystemConfig, SubsystemHandle,
    SubsystemStarter,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

type Log = Arc<Mutex<Vec<String>>>;

struct FakeStarter {
    subsystem: Subsystem,
    log: Log,
}

struct FakeHandle {
    subsystem: Subsystem,
    live: bool,
    log: Log,
}

#[async_trait]
impl SubsystemStarter for FakeStarter {
    fn subsystem(&self) -> Subsystem {
        self.subsystem
    }

    async fn start(&self, config: &SubsystemConfig) -> Result<Box<dyn SubsystemHandle>> {
        self.log
            .lock()
            .unwrap()
            .push(format!("start {} on {}", self.subsystem, config.port));
        Ok(Box::new(FakeHandle {
            subsystem: self.subsystem,
            live: true,
            log: self.log.clone(),
        }))
    }
}

#[async_trait]
impl SubsystemHandle for FakeHandle {
    fn subsystem(&self) -> Subsystem {
        self.subsystem
    }

    fn is_live(&self) -> bool {
        self.live
    }

    async fn close(&mut self) -> Result<()> {
        self.live = false;
        self.log
            .lock()
            .unwrap()
            .push(format!("close {}", self.subsystem));
        Ok(())
    }
}

struct FreePort;

#[async_trait]
impl PortProbe for FreePort {
    async fn is_in_use(&self, _port: u16) -> Result<bool> {
        Ok(false)
    }
}

struct BusyPort;

#[async_trait]
impl PortProbe for BusyPort {
    async fn is_in_use(&self, _port: u16) -> Result<bool> {
        Ok(true)
    }
}

struct FailingScripts;

#[async_trait]
impl ScriptRunner for FailingScripts {
    async fn run(&self, command: &str, _cwd: &Path, _env: &BTreeMap<String, String>) -> Result<()> {
        Err(SandboxError::StartupScriptFailed {
            command: command.to_string(),
            reason: "exited with status 1".to_string(),
        })
    }
}

fn fake_services(log: &Log) -> ServiceLifecycleCoordinator {
    let starter = |subsystem| -> Arc<dyn SubsystemStarter> {
        Arc::new(FakeStarter {
            subsystem,
            log: log.clone(),
        })
    };
    ServiceLifecycleCoordinator::new(
        starter(Subsystem::DataStore),
        starter(Subsystem::EventBus),
        starter(Subsystem::HttpGateway),
    )
}

fn builder(log: &Log, env: Arc<MapEnvironment>) -> SandboxBuilder {
    Sandbox::builder(fake_services(log))
        .environment(env)
        .port_probe(Arc::new(FreePort))
        .executable(None)
}

fn params(dir: &TempDir) -> StartParams {
    StartParams {
        project_dir: dir.path().to_path_buf(),
        quiet: true,
        ..StartParams::default()
    }
}

#[tokio::test]
async fn test_default_start_without_manifest() {
    let dir = TempDir::new().unwrap();
    let log: Log = Arc::default();
    let env = Arc::new(MapEnvironment::new());
    let sandbox = builder(&log, env.clone()).build();

    let mut session = sandbox.start(params(&dir)).await.unwrap();

    assert_eq!(session.port(), 3333);
    assert_eq!(session.live_count(), 3);
    assert!(session
        .warnings()
        .iter()
        .any(|w| w.contains("No project manifest found")));
    assert_eq!(env.get("PORT").as_deref(), Some("3333"));
    assert_eq!(env.get("NODE_ENV").as_deref(), Some("testing"));
    assert_eq!(env.get("SESSION_TABLE_NAME").as_deref(), Some("jwe"));
    assert_eq!(env.get("ARC_EVENTS_PORT").as_deref(), Some("3334"));

    session.close().await.unwrap();
    assert_eq!(session.live_count(), 0);
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "start data store on 3333",
            "start event bus on 3333",
            "start http gateway on 3333",
            "close http gateway",
            "close event bus",
            "close data store",
        ]
    );
}

#[tokio::test]
async fn test_option_port_reaches_subsystems() {
    let dir = TempDir::new().unwrap();
    let log: Log = Arc::default();
    let env = Arc::new(MapEnvironment::from_iter([("PORT", "5000")]));
    let sandbox = builder(&log, env.clone()).build();

    let mut session = sandbox
        .start(StartParams {
            options: vec!["--port".to_string(), "4000".to_string()],
            mode: StartMode::Standalone,
            ..params(&dir)
        })
        .await
        .unwrap();

    assert_eq!(session.port(), 4000);
    assert_eq!(env.get("PORT").as_deref(), Some("4000"));
    assert_eq!(log.lock().unwrap()[0], "start data store on 4000");
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_port_in_use_aborts_before_anything_starts() {
    let dir = TempDir::new().unwrap();
    let log: Log = Arc::default();
    let sandbox = builder(&log, Arc::new(MapEnvironment::new()))
        .port_probe(Arc::new(BusyPort))
        .build();

    let err = sandbox.start(params(&dir)).await.unwrap_err();

    assert_eq!(err.failed_step(), Some((0, "preflight")));
    assert!(matches!(
        err.root_cause(),
        SandboxError::PortInUse { port: 3333 }
    ));
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_hydration_names_the_step() {
    struct BrokenHydrator;

    #[async_trait]
    impl orchestrator::Hydrator for BrokenHydrator {
        async fn hydrate(&self, _dir: &Path, _manifest: &ProjectManifest) -> Result<()> {
            Err(SandboxError::HydrationFailed("disk full".to_string()))
        }
    }

    let dir = TempDir::new().unwrap();
    let log: Log = Arc::default();
    let sandbox = builder(&log, Arc::new(MapEnvironment::new()))
        .hydrator(Arc::new(BrokenHydrator))
        .build();

    let err = sandbox
        .start(StartParams {
            mode: StartMode::Standalone,
            ..params(&dir)
        })
        .await
        .unwrap_err();

    assert_eq!(err.failed_step(), Some((2, "hydrate")));
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_startup_script_closes_services() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("sandbox.toml"),
        "[sandbox]\nstartup = [\"./seed.sh\"]\n",
    )
    .unwrap();
    let log: Log = Arc::default();
    let sandbox = builder(&log, Arc::new(MapEnvironment::new()))
        .script_runner(Arc::new(FailingScripts))
        .build();

    let err = sandbox.start(params(&dir)).await.unwrap_err();

    assert_eq!(err.failed_step(), Some((7, "startup-scripts")));
    assert!(matches!(
        err.root_cause(),
        SandboxError::StartupScriptFailed { command, .. } if command == "./seed.sh"
    ));
    let log = log.lock().unwrap();
    assert_eq!(log.len(), 6);
    assert_eq!(log[3], "close http gateway");
    assert_eq!(log[5], "close data store");
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let dir = TempDir::new().unwrap();
    let log: Log = Arc::default();
    let sandbox = builder(&log, Arc::new(MapEnvironment::new())).build();
    let token = CancellationToken::new();
    token.cancel();

    let err = sandbox
        .start(StartParams {
            cancel: Some(token),
            ..params(&dir)
        })
        .await
        .unwrap_err();

    assert!(matches!(err, SandboxError::Cancelled { before_step } if before_step == "preflight"));
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_verbose_run_reports_dummy_credentials() {
    let dir = TempDir::new().unwrap();
    let log: Log = Arc::default();
    let sandbox = builder(&log, Arc::new(MapEnvironment::new())).build();

    let mut session = sandbox
        .start(StartParams {
            options: vec!["verbose".to_string()],
            ..params(&dir)
        })
        .await
        .unwrap();

    assert!(session
        .warnings()
        .iter()
        .any(|w| w.contains("dummy credentials")));
    session.close().await.unwrap();
}
