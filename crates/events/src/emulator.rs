//! Event-bus emulator: an HTTP listener functions publish through, plus a
//! recorder that mirrors bus traffic into the data store.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use db::{EventLogRepository, EventRecord, StoreSlot};
use sandbox_core::{
    ProjectManifest, SandboxError, Subsystem, SubsystemConfig, SubsystemHandle, SubsystemStarter,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bus::EventBus;
use crate::types::{Event, EventEnvelope, PublishRequest, PublishResponse};

#[derive(Clone)]
struct BusState {
    bus: EventBus,
    manifest: Arc<ProjectManifest>,
}

enum PublishError {
    Undeclared { kind: &'static str, name: String },
}

impl IntoResponse for PublishError {
    fn into_response(self) -> Response {
        match self {
            PublishError::Undeclared { kind, name } => (
                StatusCode::NOT_FOUND,
                Json(json!({
                    "error": "not_found",
                    "message": format!("{kind} `{name}` is not declared in the project manifest"),
                })),
            )
                .into_response(),
        }
    }
}

/// Router served on the event-bus port.
pub fn event_router(bus: EventBus, manifest: Arc<ProjectManifest>) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/events", post(publish_event))
        .route("/queues", post(publish_queue))
        .with_state(BusState { bus, manifest })
}

async fn publish_event(
    State(state): State<BusState>,
    Json(request): Json<PublishRequest>,
) -> Result<Json<PublishResponse>, PublishError> {
    if !state.manifest.declares_event(&request.name) {
        return Err(PublishError::Undeclared {
            kind: "event",
            name: request.name,
        });
    }

    let (envelope, delivered) = state.bus.publish_event(request.name, request.payload);
    debug!(event_id = %envelope.id, delivered, "Event published");
    Ok(Json(PublishResponse {
        id: envelope.id,
        delivered,
    }))
}

async fn publish_queue(
    State(state): State<BusState>,
    Json(request): Json<PublishRequest>,
) -> Result<Json<PublishResponse>, PublishError> {
    if !state.manifest.declares_queue(&request.name) {
        return Err(PublishError::Undeclared {
            kind: "queue",
            name: request.name,
        });
    }

    let (envelope, delivered) = state.bus.publish_queue(request.name, request.payload);
    debug!(event_id = %envelope.id, delivered, "Queue message published");
    Ok(Json(PublishResponse {
        id: envelope.id,
        delivered,
    }))
}

/// Starts the bus listener on `events_port`.
pub struct EventBusEmulator {
    bus: EventBus,
    store: StoreSlot,
}

impl EventBusEmulator {
    pub fn new(bus: EventBus, store: StoreSlot) -> Self {
        Self { bus, store }
    }
}

#[async_trait]
impl SubsystemStarter for EventBusEmulator {
    fn subsystem(&self) -> Subsystem {
        Subsystem::EventBus
    }

    async fn start(
        &self,
        config: &SubsystemConfig,
    ) -> sandbox_core::Result<Box<dyn SubsystemHandle>> {
        let listener = TcpListener::bind(("0.0.0.0", config.events_port))
            .await
            .map_err(|e| SandboxError::start_failed(Subsystem::EventBus, e))?;
        let address = listener
            .local_addr()
            .map_err(|e| SandboxError::start_failed(Subsystem::EventBus, e))?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let recorder = tokio::spawn(record_events(
            self.bus.clone(),
            self.store.clone(),
            shutdown_rx.clone(),
        ));

        let app = event_router(self.bus.clone(), config.manifest.clone());
        let mut server_shutdown = shutdown_rx;
        let server = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = server_shutdown.changed().await;
            });
            if let Err(err) = serve.await {
                warn!(error = %err, "event bus listener exited with error");
            }
        });

        info!(address = %address, "Events and queues ready on local event bus");

        Ok(Box::new(EventBusHandle {
            address,
            shutdown: shutdown_tx,
            server: Some(server),
            recorder: Some(recorder),
        }))
    }
}

/// Mirrors named bus traffic into the store while one is running.
async fn record_events(bus: EventBus, store: StoreSlot, mut shutdown: watch::Receiver<bool>) {
    let mut events = bus.subscribe();
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            received = events.recv() => match received {
                Ok(envelope) => record_one(&bus, &store, &envelope).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Event recorder lagged, missed {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

/// Store one envelope. A failed write is reported on the bus as
/// [`Event::Error`], which carries no name and is never recorded itself.
async fn record_one(bus: &EventBus, store: &StoreSlot, envelope: &EventEnvelope) {
    let Some(name) = envelope.event.name() else {
        return;
    };
    let Some(pool) = store.get().await else {
        return;
    };

    let record = EventRecord {
        id: envelope.id.to_string(),
        kind: envelope.event.kind().to_string(),
        name: name.to_string(),
        payload: envelope.event.payload().cloned().unwrap_or_default(),
        created_at: envelope.timestamp,
    };
    if let Err(e) = EventLogRepository::new(pool).record(&record).await {
        warn!(error = %e, event = name, "Failed to record event");
        bus.publish(EventEnvelope::new(Event::Error {
            message: format!("Failed to record {} `{name}`: {e}", record.kind),
            context: Some(envelope.id.to_string()),
        }));
    }
}

pub struct EventBusHandle {
    address: SocketAddr,
    shutdown: watch::Sender<bool>,
    server: Option<JoinHandle<()>>,
    recorder: Option<JoinHandle<()>>,
}

impl EventBusHandle {
    /// Return the bound listening address.
    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }
}

#[async_trait]
impl SubsystemHandle for EventBusHandle {
    fn subsystem(&self) -> Subsystem {
        Subsystem::EventBus
    }

    fn is_live(&self) -> bool {
        self.server.as_ref().is_some_and(|task| !task.is_finished())
    }

    async fn close(&mut self) -> sandbox_core::Result<()> {
        let _ = self.shutdown.send(true);

        if let Some(recorder) = self.recorder.take() {
            if let Err(err) = recorder.await {
                warn!(error = %err, "event recorder task failed");
            }
        }
        if let Some(server) = self.server.take() {
            server
                .await
                .map_err(|err| SandboxError::teardown_failed(Subsystem::EventBus, err))?;
        }

        debug!(address = %self.address, "Event bus closed");
        Ok(())
    }
}
