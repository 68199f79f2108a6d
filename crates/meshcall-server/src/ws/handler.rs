use crate::error::{AppError, Result};
use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::{header, HeaderMap, Uri},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use meshcall_protocol::{ClientMessage, ParticipantId, ServerMessage, SessionId};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct SessionQuery {
    #[serde(rename = "roomId")]
    pub room_id: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    Query(query): Query<SessionQuery>,
    State(state): State<AppState>,
) -> Result<Response> {
    let session_id = session_from_referer(&headers)
        .or_else(|| non_empty_session(query.room_id))
        .ok_or_else(|| AppError::BadRequest("roomId query parameter is required".to_string()))?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, session_id)))
}

/// Session id from the `roomId` query parameter of the page that opened the socket
pub fn session_from_referer(headers: &HeaderMap) -> Option<SessionId> {
    let referer = headers.get(header::REFERER)?.to_str().ok()?;
    let uri: Uri = referer.parse().ok()?;
    let Query(query) = Query::<SessionQuery>::try_from_uri(&uri).ok()?;
    non_empty_session(query.room_id)
}

fn non_empty_session(room_id: Option<String>) -> Option<SessionId> {
    room_id
        .filter(|id| !id.trim().is_empty())
        .map(SessionId::new)
}

async fn handle_socket(socket: WebSocket, state: AppState, session_id: SessionId) {
    let (mut sender, mut receiver) = socket.split();

    let participant_id = ParticipantId::new(Uuid::new_v4().to_string());

    let hello = match serde_json::to_string(&ServerMessage::Connected {
        participant_id: participant_id.clone(),
    }) {
        Ok(j) => j,
        Err(e) => {
            tracing::error!("Failed to serialize message: {}", e);
            return;
        }
    };
    if sender.send(Message::Text(hello.into())).await.is_err() {
        return;
    }

    tracing::info!(
        "Participant {} connected for session {}",
        participant_id,
        session_id
    );

    // Create channel for outbound messages
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    state
        .relay
        .add_connection(participant_id.clone(), session_id, tx)
        .await;

    // Spawn task to forward messages from channel to WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    // Handle incoming messages
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let client_msg: ClientMessage = match serde_json::from_str(&text) {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::warn!("Invalid message from {}: {}", participant_id, e);
                        continue;
                    }
                };

                handle_client_message(&state, &participant_id, client_msg).await;
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::error!("WebSocket error for participant {}: {}", participant_id, e);
                break;
            }
            _ => {}
        }
    }

    // Cleanup on disconnect, announces the departure to the session
    state.relay.remove_connection(&participant_id).await;

    send_task.abort();

    tracing::info!("Participant {} disconnected", participant_id);
}

async fn handle_client_message(
    state: &AppState,
    participant_id: &ParticipantId,
    message: ClientMessage,
) {
    match message {
        ClientMessage::Signal(envelope) => {
            state.relay.relay(participant_id, envelope).await;
        }
        ClientMessage::RequestJoin => {
            state.relay.join(participant_id).await;
        }
        ClientMessage::Ping => {
            state
                .relay
                .send_to_participant(participant_id, &ServerMessage::Pong)
                .await;
        }
    }
}
