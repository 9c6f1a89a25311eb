//! Full runs against the real data store, event bus and gateway.

use std::sync::Arc;
use std::time::Duration;

use db::{DataStoreEmulator, EventLogRepository, StoreSlot};
use events::{EventBus, EventBusEmulator};
use orchestrator::{
    Environment, MapEnvironment, Sandbox, ServiceLifecycleCoordinator, StartMode, StartParams,
};
use serde_json::{json, Value};
use server::GatewayStarter;
use tempfile::TempDir;

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

const MANIFEST: &str = r#"
events = ["ping"]

[app]
name = "e2e"

[[http]]
method = "get"
path = "/"

[[tables]]
name = "notes"
"#;

#[tokio::test]
async fn test_full_start_and_shutdown() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("sandbox.toml"), MANIFEST).unwrap();
    std::fs::create_dir_all(dir.path().join("src/shared")).unwrap();
    std::fs::write(dir.path().join("src/shared/util.js"), "module.exports = {}").unwrap();

    let port = free_port();
    let events_port = free_port();
    let env = Arc::new(MapEnvironment::from_iter([(
        "ARC_EVENTS_PORT",
        events_port.to_string(),
    )]));

    let bus = EventBus::new();
    let store = StoreSlot::new();
    let services = ServiceLifecycleCoordinator::new(
        Arc::new(DataStoreEmulator::new(store.clone())),
        Arc::new(EventBusEmulator::new(bus.clone(), store.clone())),
        Arc::new(GatewayStarter::new(bus.clone(), store.clone())),
    );
    let sandbox = Sandbox::builder(services)
        .environment(env.clone())
        .executable(None)
        .build();

    let mut session = sandbox
        .start(StartParams {
            options: vec!["-p".to_string(), port.to_string()],
            project_dir: dir.path().to_path_buf(),
            quiet: true,
            mode: StartMode::Extended,
            ..StartParams::default()
        })
        .await
        .unwrap();

    assert_eq!(session.live_count(), 3);
    assert!(session.warnings().is_empty());
    assert_eq!(env.get("PORT"), Some(port.to_string()));

    // Scaffolded, then hydrated
    let function = dir.path().join("src/http/get-index");
    assert!(function.join("index.js").exists());
    assert!(function.join("vendor/shared/util.js").exists());
    assert!(dir.path().join("src/events/ping/index.js").exists());

    let client = reqwest::Client::new();
    let gateway = format!("http://127.0.0.1:{port}");

    let health: Value = client
        .get(format!("{gateway}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    let tables: Value = client
        .get(format!("{gateway}/_sandbox/tables"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let names: Vec<_> = tables["tables"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["jwe", "notes"]);

    let published = client
        .post(format!("http://127.0.0.1:{events_port}/events"))
        .json(&json!({"name": "ping", "payload": {"n": 1}}))
        .send()
        .await
        .unwrap();
    assert!(published.status().is_success());

    let undeclared = client
        .post(format!("http://127.0.0.1:{events_port}/events"))
        .json(&json!({"name": "nope"}))
        .send()
        .await
        .unwrap();
    assert_eq!(undeclared.status().as_u16(), 404);

    let log = EventLogRepository::new(store.get().await.unwrap());
    let mut recorded = Vec::new();
    for _ in 0..50 {
        recorded = log.find_by_name("ping").await.unwrap();
        if !recorded.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(recorded.len(), 1);

    session.close().await.unwrap();
    assert_eq!(session.live_count(), 0);
    assert!(!store.is_available().await);
    let fresh = reqwest::Client::new();
    assert!(fresh.get(format!("{gateway}/health")).send().await.is_err());
}

#[tokio::test]
async fn test_occupied_port_fails_preflight() {
    let dir = TempDir::new().unwrap();
    let occupied = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
    let port = occupied.local_addr().unwrap().port();
    let env = Arc::new(MapEnvironment::from_iter([(
        "ARC_EVENTS_PORT",
        free_port().to_string(),
    )]));

    let bus = EventBus::new();
    let store = StoreSlot::new();
    let services = ServiceLifecycleCoordinator::new(
        Arc::new(DataStoreEmulator::new(store.clone())),
        Arc::new(EventBusEmulator::new(bus.clone(), store.clone())),
        Arc::new(GatewayStarter::new(bus, store.clone())),
    );
    let sandbox = Sandbox::builder(services)
        .environment(env)
        .executable(None)
        .build();

    let err = sandbox
        .start(StartParams {
            options: vec!["port".to_string(), port.to_string()],
            project_dir: dir.path().to_path_buf(),
            quiet: true,
            mode: StartMode::Standalone,
            ..StartParams::default()
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err.root_cause(),
        sandbox_core::SandboxError::PortInUse { .. }
    ));
    assert!(!store.is_available().await);
}
