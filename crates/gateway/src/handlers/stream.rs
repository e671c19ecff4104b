//! WebSocket transport for streaming generation sessions
//!
//! Frames are JSON text. Inbound frames are decoded into client messages and
//! fed to the session controller; its events are serialized back out. A frame
//! that cannot be decoded is answered with an `error` event and otherwise
//! ignored.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{stream, SinkExt, StreamExt};
use lessonforge_common::{
    auth::AuthContext,
    generation::{ClientMessage, ServerEvent},
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::AppState;

const EVENT_BUFFER: usize = 64;
const MESSAGE_BUFFER: usize = 16;

/// Upgrade to a WebSocket and run one generation session on it
pub async fn generate_stream(
    State(state): State<AppState>,
    auth: AuthContext,
    ws: WebSocketUpgrade,
) -> Response {
    info!(user_id = %auth.user_id, request_id = %auth.request_id, "Generation stream opened");
    ws.on_upgrade(move |socket| run_session(state, auth, socket))
}

async fn run_session(state: AppState, auth: AuthContext, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (event_tx, mut event_rx) = mpsc::channel::<ServerEvent>(EVENT_BUFFER);
    let (message_tx, message_rx) = mpsc::channel::<ClientMessage>(MESSAGE_BUFFER);

    let writer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, kind = event.kind(), "Failed to encode event");
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    let rejections = event_tx.clone();
    let reader = tokio::spawn(async move {
        while let Some(frame) = receiver.next().await {
            match frame {
                Ok(Message::Text(text)) => match ClientMessage::parse(text.as_str()) {
                    Ok(message) => {
                        if message_tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(error = %e, "Rejected client frame");
                        if rejections.send(ServerEvent::error(e.to_string())).await.is_err() {
                            break;
                        }
                    }
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(error = %e, "WebSocket receive failed");
                    break;
                }
            }
        }
    });

    let inbound = stream::unfold(message_rx, |mut rx| async move {
        rx.recv().await.map(|message| (message, rx))
    });

    let outcome = state.sessions.run(auth.user_id, inbound, event_tx).await;

    reader.abort();
    let _ = writer.await;
    info!(user_id = %auth.user_id, state = outcome.as_str(), "Generation stream closed");
}
