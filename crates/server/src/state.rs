use std::sync::Arc;

use db::{ItemRepository, StoreSlot};
use events::EventBus;
use sandbox_core::ProjectManifest;
use tokio_util::sync::CancellationToken;
use websocket::WsState;

#[derive(Clone)]
pub struct AppState {
    pub manifest: Arc<ProjectManifest>,
    pub event_bus: EventBus,
    pub ws: Arc<WsState>,
    store: StoreSlot,
}

impl AppState {
    pub fn new(manifest: Arc<ProjectManifest>, event_bus: EventBus, store: StoreSlot) -> Self {
        Self::with_shutdown(manifest, event_bus, store, CancellationToken::new())
    }

    /// State whose WebSocket connections end when `shutdown` is cancelled.
    pub fn with_shutdown(
        manifest: Arc<ProjectManifest>,
        event_bus: EventBus,
        store: StoreSlot,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            manifest,
            ws: Arc::new(WsState::with_shutdown(event_bus.clone(), shutdown)),
            event_bus,
            store,
        }
    }

    /// Item access on the running store, or `None` when no store is up.
    pub async fn items(&self) -> Option<ItemRepository> {
        self.store.get().await.map(ItemRepository::new)
    }
}
