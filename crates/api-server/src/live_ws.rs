//! `WS /api/debug/live?owner_id=&link_id=` — the only consumer of the
//! Event Bus. No persistence, no replay: a subscriber only sees events
//! published while it is connected.

use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use linkforty_core::events::EventFilter;
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct LiveQuery {
    pub owner_id: Option<Uuid>,
    pub link_id: Option<Uuid>,
}

pub async fn live(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<LiveQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, query: LiveQuery) {
    let filter = EventFilter {
        owner_id: query.owner_id,
        link_id: query.link_id,
    };
    let mut stream = state.events.subscribe_stream(filter);

    loop {
        tokio::select! {
            event = stream.next() => {
                let Some(record) = event else { break };
                let Ok(json) = serde_json::to_string(&record) else { continue };
                if socket.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(_)) => break,
                }
            }
        }
    }
    debug!("live event subscriber disconnected");
}
