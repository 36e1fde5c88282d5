use crate::protocol::ServerMessage;
use crate::state::store::StoreEvent;
use crate::state::AppState;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

/// Spawn a background task that turns store change events into client messages
pub fn spawn_store_forwarder(state: Arc<AppState>) {
    let mut events = state.store.subscribe();
    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Store forwarder skipped {} events", skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            if let Some(msg) = to_message(&state, event).await {
                // Ignore send errors (no receivers connected is fine)
                state.broadcast_to_all(msg);
            }
        }
    });
}

async fn to_message(state: &AppState, event: StoreEvent) -> Option<ServerMessage> {
    match event {
        StoreEvent::Session(session) => Some(ServerMessage::SessionState { session: *session }),
        StoreEvent::Scores { session_id } => {
            let scores = state.store.leaderboard(&session_id).await;
            Some(ServerMessage::Scores { session_id, scores })
        }
        StoreEvent::Drawing(drawing) => Some(ServerMessage::LiveDrawing { drawing }),
    }
}
