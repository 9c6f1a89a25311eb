use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use events::EventBus;

use crate::messages::{ClientMessage, ServerMessage, SubscriptionFilter};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct WsState {
    pub event_bus: EventBus,
    shutdown: CancellationToken,
}

impl WsState {
    pub fn new(event_bus: EventBus) -> Self {
        Self::with_shutdown(event_bus, CancellationToken::new())
    }

    /// Open sockets are closed once `shutdown` is cancelled.
    pub fn with_shutdown(event_bus: EventBus, shutdown: CancellationToken) -> Self {
        Self {
            event_bus,
            shutdown,
        }
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<WsState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn send(sender: &mut SplitSink<WebSocket, Message>, message: &ServerMessage) -> bool {
    sender
        .send(Message::Text(message.to_json().into()))
        .await
        .is_ok()
}

async fn handle_socket(socket: WebSocket, state: Arc<WsState>) {
    let (mut sender, mut receiver) = socket.split();

    let mut event_rx = state.event_bus.subscribe();
    let mut filter: Option<SubscriptionFilter> = None;
    let mut subscribed = false;

    let mut heartbeat = interval(HEARTBEAT_INTERVAL);
    heartbeat.reset();

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }

            _ = heartbeat.tick() => {
                if !send(&mut sender, &ServerMessage::Pong).await {
                    break;
                }
            }

            event_result = event_rx.recv() => {
                match event_result {
                    Ok(envelope) => {
                        let wanted = subscribed
                            && filter.as_ref().map(|f| f.matches(&envelope)).unwrap_or(true);
                        if wanted && !send(&mut sender, &ServerMessage::Event { envelope }).await {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("WebSocket client lagged, missed {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }

            msg = tokio::time::timeout(CLIENT_TIMEOUT + HEARTBEAT_INTERVAL, receiver.next()) => {
                match msg {
                    Ok(Some(Ok(Message::Text(text)))) => {
                        let reply = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Subscribe { filter: new_filter }) => {
                                filter = new_filter.clone();
                                subscribed = true;
                                ServerMessage::Subscribed { filter: new_filter }
                            }
                            Ok(ClientMessage::Unsubscribe) => {
                                subscribed = false;
                                filter = None;
                                ServerMessage::Unsubscribed
                            }
                            Ok(ClientMessage::Ping) => ServerMessage::Pong,
                            Err(e) => ServerMessage::Error {
                                message: format!("Invalid message: {}", e),
                            },
                        };
                        if !send(&mut sender, &reply).await {
                            break;
                        }
                    }
                    Ok(Some(Ok(Message::Close(_)))) => {
                        break;
                    }
                    Ok(Some(Ok(Message::Ping(data)))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Some(Ok(_))) => {}
                    Ok(Some(Err(_))) | Ok(None) => {
                        break;
                    }
                    Err(_) => {
                        tracing::debug!("WebSocket client timeout, sending ping");
                    }
                }
            }
        }
    }

    tracing::debug!("WebSocket connection closed");
}
