use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use meshcall_protocol::{ClientMessage, ParticipantId, ServerMessage, SignalEnvelope};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tokio_tungstenite::tungstenite::Message;

use super::{SignalReceiver, SignalSender};
use crate::config::ClientConfig;

const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Connection to the relay.
///
/// Dropping the client aborts its tasks, which closes the socket and makes
/// the relay announce our departure.
pub struct SignalingClient {
    participant_id: ParticipantId,
    control: mpsc::UnboundedSender<ClientMessage>,
    signals: SignalSender,
    tasks: Vec<JoinHandle<()>>,
}

impl SignalingClient {
    /// Connect and wait for the relay to assign our identity
    pub async fn connect(config: &ClientConfig) -> Result<(Self, SignalReceiver)> {
        let mut request = config.signaling_url().into_client_request()?;
        request
            .headers_mut()
            .insert(header::REFERER, HeaderValue::from_str(&config.page_url())?);

        let (ws_stream, _) = connect_async(request).await?;
        let (mut write, mut read) = ws_stream.split();

        let participant_id = match read.next().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<ServerMessage>(&text)? {
                ServerMessage::Connected { participant_id } => participant_id,
                other => anyhow::bail!("Unexpected first message from relay: {:?}", other),
            },
            Some(Ok(other)) => anyhow::bail!("Unexpected first frame from relay: {:?}", other),
            Some(Err(e)) => return Err(e.into()),
            None => anyhow::bail!("Connection closed before an identity was assigned"),
        };
        tracing::info!(
            "Connected to relay as {} for room {}",
            participant_id,
            config.room_id
        );

        let (control_tx, mut control_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let (signals_tx, mut signals_rx) = mpsc::unbounded_channel::<SignalEnvelope>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<SignalEnvelope>();

        // Spawn task to handle outgoing messages
        let writer = tokio::spawn(async move {
            loop {
                let msg = tokio::select! {
                    Some(msg) = control_rx.recv() => msg,
                    Some(envelope) = signals_rx.recv() => ClientMessage::Signal(envelope),
                    else => break,
                };

                let json = match serde_json::to_string(&msg) {
                    Ok(j) => j,
                    Err(e) => {
                        tracing::error!("Failed to serialize message: {}", e);
                        continue;
                    }
                };

                if write.send(Message::Text(json.into())).await.is_err() {
                    tracing::error!("Failed to send WebSocket message");
                    break;
                }
            }
        });

        // Spawn task to handle incoming messages
        let reader = tokio::spawn(async move {
            while let Some(result) = read.next().await {
                match result {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(ServerMessage::Signal(envelope)) => {
                            if inbound_tx.send(envelope).is_err() {
                                break;
                            }
                        }
                        Ok(ServerMessage::Pong) => {}
                        Ok(ServerMessage::Connected { participant_id }) => {
                            tracing::warn!("Relay re-announced identity {}, ignoring", participant_id);
                        }
                        Err(e) => tracing::warn!("Malformed message from relay: {}", e),
                    },
                    Ok(Message::Close(_)) => {
                        tracing::info!("WebSocket closed by relay");
                        break;
                    }
                    Err(e) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
            tracing::debug!("Signaling reader finished");
        });

        // Start ping task
        let tx_ping = control_tx.clone();
        let pinger = tokio::spawn(async move {
            let mut interval = ping_interval();
            loop {
                interval.tick().await;
                if tx_ping.send(ClientMessage::Ping).is_err() {
                    break;
                }
            }
        });

        Ok((
            Self {
                participant_id,
                control: control_tx,
                signals: signals_tx,
                tasks: vec![writer, reader, pinger],
            },
            inbound_rx,
        ))
    }

    pub fn participant_id(&self) -> &ParticipantId {
        &self.participant_id
    }

    /// Announce ourselves to the session
    pub fn request_join(&self) {
        if self.control.send(ClientMessage::RequestJoin).is_err() {
            tracing::warn!("Signaling writer gone, join not sent");
        }
    }

    pub fn signal_sender(&self) -> SignalSender {
        self.signals.clone()
    }
}

/// Keepalive schedule, first ping one interval after connecting
fn ping_interval() -> Interval {
    interval_at(Instant::now() + PING_INTERVAL, PING_INTERVAL)
}

impl Drop for SignalingClient {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
