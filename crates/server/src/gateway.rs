use std::net::SocketAddr;

use async_trait::async_trait;
use db::StoreSlot;
use events::{Event, EventBus, EventEnvelope};
use sandbox_core::{SandboxError, Subsystem, SubsystemConfig, SubsystemHandle, SubsystemStarter};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::create_router;
use crate::state::AppState;

/// Serves the project's HTTP and WebSocket surface on `port`.
pub struct GatewayStarter {
    bus: EventBus,
    store: StoreSlot,
}

impl GatewayStarter {
    pub fn new(bus: EventBus, store: StoreSlot) -> Self {
        Self { bus, store }
    }
}

#[async_trait]
impl SubsystemStarter for GatewayStarter {
    fn subsystem(&self) -> Subsystem {
        Subsystem::HttpGateway
    }

    async fn start(
        &self,
        config: &SubsystemConfig,
    ) -> sandbox_core::Result<Box<dyn SubsystemHandle>> {
        let listener = TcpListener::bind(("0.0.0.0", config.port))
            .await
            .map_err(|e| SandboxError::start_failed(Subsystem::HttpGateway, e))?;
        let address = listener
            .local_addr()
            .map_err(|e| SandboxError::start_failed(Subsystem::HttpGateway, e))?;

        let shutdown = CancellationToken::new();
        let state = AppState::with_shutdown(
            config.manifest.clone(),
            self.bus.clone(),
            self.store.clone(),
            shutdown.clone(),
        );
        let app = create_router(state);

        let signal = shutdown.clone();
        let server = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                signal.cancelled().await;
            });
            if let Err(err) = serve.await {
                warn!(error = %err, "gateway exited with error");
            }
        });

        self.bus.publish(EventEnvelope::new(Event::GatewayStarted {
            port: address.port(),
        }));
        info!(address = %address, "HTTP gateway listening");

        Ok(Box::new(GatewayHandle {
            address,
            shutdown,
            server: Some(server),
        }))
    }
}

pub struct GatewayHandle {
    address: SocketAddr,
    /// Stops the accept loop and every open WebSocket.
    shutdown: CancellationToken,
    server: Option<JoinHandle<()>>,
}

impl GatewayHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }
}

#[async_trait]
impl SubsystemHandle for GatewayHandle {
    fn subsystem(&self) -> Subsystem {
        Subsystem::HttpGateway
    }

    fn is_live(&self) -> bool {
        self.server.as_ref().is_some_and(|task| !task.is_finished())
    }

    fn local_port(&self) -> Option<u16> {
        Some(self.address.port())
    }

    async fn close(&mut self) -> sandbox_core::Result<()> {
        self.shutdown.cancel();

        if let Some(server) = self.server.take() {
            server
                .await
                .map_err(|err| SandboxError::teardown_failed(Subsystem::HttpGateway, err))?;
        }

        debug!(address = %self.address, "HTTP gateway closed");
        Ok(())
    }
}
