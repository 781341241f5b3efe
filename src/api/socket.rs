//! WebSocket push channel.
//!
//! Each socket is one connection in the broker. Pushes go through a bounded
//! queue; if the queue overflows the socket is closed and the client is
//! expected to reconnect and catch up from a snapshot.

use crate::api::error::AppError;
use crate::api::{blocking, AppState};
use crate::subscriptions::{DeliveryError, PushMessage, Subscriber};
use crate::types::{ConnectionId, MatchId, Sequence};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, warn};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    JoinMatch { match_id: MatchId },
    #[serde(rename_all = "camelCase")]
    LeaveMatch { match_id: MatchId },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    Joined {
        match_id: MatchId,
        last_sequence: Option<Sequence>,
    },
    #[serde(rename_all = "camelCase")]
    Left { match_id: MatchId },
    Error { code: &'static str, message: String },
}

impl From<AppError> for ServerMessage {
    fn from(e: AppError) -> Self {
        ServerMessage::Error {
            code: e.code(),
            message: e.message(),
        }
    }
}

struct SocketSubscriber {
    id: ConnectionId,
    sender: mpsc::Sender<PushMessage>,
    overflow: Arc<Notify>,
}

impl Subscriber for SocketSubscriber {
    fn connection_id(&self) -> ConnectionId {
        self.id
    }

    fn deliver(&self, message: &PushMessage) -> Result<(), DeliveryError> {
        match self.sender.try_send(message.clone()) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.overflow.notify_one();
                Err(DeliveryError::BufferOverflow)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(DeliveryError::Disconnected),
        }
    }
}

pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let connection = state.store.next_connection_id();
    let (sender, mut pushes) = mpsc::channel(state.socket_buffer.max(1));
    let overflow = Arc::new(Notify::new());
    let subscriber: Arc<dyn Subscriber> = Arc::new(SocketSubscriber {
        id: connection,
        sender,
        overflow: Arc::clone(&overflow),
    });

    info!(connection = %connection, "socket connected");

    loop {
        tokio::select! {
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let reply = handle_client_message(&state, &subscriber, text.as_str()).await;
                    if send_json(&mut socket, &reply).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(connection = %connection, "socket receive failed: {e}");
                    break;
                }
            },
            push = pushes.recv() => match push {
                Some(message) => {
                    if send_json(&mut socket, &message).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            _ = overflow.notified() => {
                warn!(connection = %connection, "socket push buffer overflowed, closing");
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
        }
    }

    let released = state.store.disconnect(connection);
    info!(connection = %connection, subscriptions = released, "socket disconnected");
}

async fn handle_client_message(
    state: &AppState,
    subscriber: &Arc<dyn Subscriber>,
    text: &str,
) -> ServerMessage {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => return AppError::DecodingRequestFailed(e.to_string()).into(),
    };

    match message {
        ClientMessage::JoinMatch { match_id } => {
            let subscriber = Arc::clone(subscriber);
            // Join before reading the position so nothing after it is missed
            let joined = blocking(state, move |store| {
                store.subscribe(subscriber, match_id)?;
                store.last_sequence(match_id)
            })
            .await;
            match joined {
                Ok(last_sequence) => ServerMessage::Joined {
                    match_id,
                    last_sequence,
                },
                Err(e) => e.into(),
            }
        }
        ClientMessage::LeaveMatch { match_id } => {
            state
                .store
                .unsubscribe(subscriber.connection_id(), match_id);
            ServerMessage::Left { match_id }
        }
    }
}

async fn send_json<T: Serialize>(socket: &mut WebSocket, message: &T) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(message) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to encode socket message: {e}");
            return Ok(());
        }
    };
    socket.send(Message::Text(text.into())).await
}
