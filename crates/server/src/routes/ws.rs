use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::IntoResponse;

use crate::state::AppState;

/// Upgrades `/ws` into a stream of bus envelopes.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    websocket::ws_handler(ws, State(state.ws.clone())).await
}
