//! WebSocket feed of playback and session events.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use crate::api::AppState;
use crate::services::ChannelSnapshot;

/// First message sent on every connection.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum WsOutgoing {
    InitialState { channels: Vec<ChannelSnapshot> },
}

impl WsOutgoing {
    fn to_message(&self) -> Option<Message> {
        serde_json::to_string(self)
            .ok()
            .map(|s| Message::Text(s.into()))
    }
}

async fn build_initial_state(state: &AppState) -> Option<Message> {
    let mut channels = Vec::new();
    for channel in state.controller.channels() {
        if let Some(snapshot) = state.controller.snapshot(channel).await {
            channels.push(snapshot);
        }
    }
    WsOutgoing::InitialState { channels }.to_message()
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn handle_ws(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.event_bridge.subscribe();

    log::info!("[WS] New connection established");

    if let Some(msg) = build_initial_state(&state).await {
        if sender.send(msg).await.is_err() {
            log::warn!("[WS] Failed to send initial state, client disconnected");
            return;
        }
    }

    loop {
        tokio::select! {
            msg = receiver.next() => match msg {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // The feed is one-way; anything else from the client is ignored.
                _ => {}
            },
            event = events.recv() => match event {
                Ok(event) => {
                    let Ok(json) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    log::warn!("[WS] Client lagged, {} event(s) dropped", n);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    log::info!("[WS] Connection closed");
}
