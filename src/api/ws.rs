//! The persistent push connection.
//!
//! Each socket runs a `select!` loop over inbound frames and an unbounded
//! event channel. The channel's sender half is what the Presence Table
//! hands out, so any task can push to a connected user. Handler failures
//! are converted to error events; the connection itself stays up.

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::state::AppState;
use crate::db::UserRepository;
use crate::realtime::{ClientEvent, DeleteScope, ServerEvent};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(rename = "userId")]
    pub user_id: String,
}

/// GET /ws?userId=<id>
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.user_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: String) {
    info!(user_id = %user_id, "Push connection opened");

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let (connection_id, online) = state.presence.connect(user_id.clone(), tx.clone()).await;

    // Best-effort persisted online flag; a storage hiccup must not kill the
    // connection.
    if let Err(e) = UserRepository::set_online(&state.db, &user_id, true).await {
        warn!(user_id = %user_id, error = %e, "Failed to persist online flag");
    }
    state
        .presence
        .broadcast(ServerEvent::GetOnlineUsers(online))
        .await;

    loop {
        tokio::select! {
            frame = stream.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        handle_client_event(&state, &tx, &text).await;
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {} // binary/ping/pong frames are ignored
                    Some(Err(e)) => {
                        debug!(user_id = %user_id, error = %e, "WebSocket error");
                        break;
                    }
                }
            }

            event = rx.recv() => {
                let Some(event) = event else { break };
                match serde_json::to_string(&event) {
                    Ok(json) => {
                        if sink.send(WsMessage::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "Failed to serialize server event"),
                }
            }
        }
    }

    // A stale disconnect (user already reconnected) returns None and leaves
    // the newer entry alone.
    if let Some((uid, online)) = state.presence.disconnect(connection_id).await {
        if let Err(e) = UserRepository::set_online(&state.db, &uid, false).await {
            warn!(user_id = %uid, error = %e, "Failed to persist offline flag");
        }
        state
            .presence
            .broadcast(ServerEvent::GetOnlineUsers(online))
            .await;
    }

    info!(user_id = %user_id, "Push connection closed");
}

/// Dispatch one inbound event. Every failure becomes a structured error
/// event back to this connection; nothing propagates.
async fn handle_client_event(
    state: &AppState,
    tx: &mpsc::UnboundedSender<ServerEvent>,
    raw: &str,
) {
    let event = match serde_json::from_str::<ClientEvent>(raw) {
        Ok(event) => event,
        Err(e) => {
            debug!(error = %e, "Unparseable client event");
            let _ = tx.send(ServerEvent::MessageSendError {
                message: "Invalid event format".to_string(),
                details: serde_json::json!({ "raw": raw }),
            });
            return;
        }
    };

    match event {
        ClientEvent::SendMessage {
            sender_id,
            receiver_id,
            message,
        } => {
            if sender_id.is_empty() || receiver_id.is_empty() || message.is_empty() {
                let _ = tx.send(ServerEvent::MessageSendError {
                    message: "Invalid message data".to_string(),
                    details: serde_json::json!({
                        "senderId": sender_id,
                        "receiverId": receiver_id,
                        "message": message,
                    }),
                });
                return;
            }

            match state.delivery.send(&sender_id, &receiver_id, &message).await {
                Ok(created) => {
                    // Ack to the sender's own connection; the receiver push
                    // already happened inside the engine.
                    let _ = tx.send(ServerEvent::MessageSent(created));
                }
                Err(e) => {
                    let _ = tx.send(ServerEvent::MessageSendError {
                        message: "Failed to send message".to_string(),
                        details: serde_json::json!({
                            "senderId": sender_id,
                            "receiverId": receiver_id,
                            "error": e.to_string(),
                        }),
                    });
                }
            }
        }

        ClientEvent::DeleteMessage {
            message_id,
            sender_id,
        } => {
            match state
                .delivery
                .delete(&sender_id, &message_id, DeleteScope::SenderOnly)
                .await
            {
                // Both participants were notified by the engine.
                Ok(_) => {}
                Err(e) => {
                    let _ = tx.send(ServerEvent::MessageDeleteError {
                        message: "Failed to delete message".to_string(),
                        details: serde_json::json!({
                            "messageId": message_id,
                            "senderId": sender_id,
                            "error": e.to_string(),
                        }),
                    });
                }
            }
        }

        ClientEvent::Ping => {
            let _ = tx.send(ServerEvent::Pong);
        }
    }
}
