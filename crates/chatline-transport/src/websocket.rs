//! WebSocket transport for browser surfaces.

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};

use crate::{
    bridge::ChatBackend,
    protocol::{ClientMessage, ServerMessage},
};

/// WebSocket upgrade handler.
///
/// Use this as an Axum route handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(backend): State<ChatBackend>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, backend))
}

async fn handle_socket(socket: WebSocket, backend: ChatBackend) {
    let (mut sender, mut receiver) = socket.split();
    let (link, mut rx) = backend.connect();

    // Forward pushed messages to the socket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(e) => {
                    tracing::error!("Failed to serialize message: {e}");
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    if link.sync().is_err() {
        send_task.abort();
        return;
    }

    while let Some(msg) = receiver.next().await {
        let msg = match msg {
            Ok(Message::Text(text)) => text.as_str().to_owned(),
            Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                Ok(s) => s,
                Err(_) => continue,
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::error!("WebSocket error: {e}");
                break;
            }
        };

        let client_msg: ClientMessage = match serde_json::from_str(&msg) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("Invalid client message: {e}");
                if link.push(ServerMessage::error(format!("Invalid message: {e}"))).is_err() {
                    break;
                }
                continue;
            }
        };

        if link.handle(client_msg).is_err() {
            break;
        }
    }

    // Unsubscribes; in-flight sends keep running.
    drop(link);
    send_task.abort();
}

/// Create the chat router, serving the socket at `/ws`.
///
/// # Example
/// ```ignore
/// let app = Router::new()
///     .merge(create_chat_router(backend));
/// ```
#[must_use]
pub fn create_chat_router(backend: ChatBackend) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(backend)
}
