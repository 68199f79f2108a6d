use meshcall_protocol::{ParticipantId, ServerMessage, SessionId, SignalEnvelope, SignalPayload};
use std::collections::{HashMap, HashSet};
use tokio::sync::{mpsc, RwLock};

#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub session_id: SessionId,
    pub joined: bool,
}

/// Forwards signaling envelopes between participants of the same session.
///
/// Keeps no history: a session exists only while it has members, and an
/// envelope that cannot be delivered is dropped without telling the sender.
pub struct SignalingRelay {
    /// Map from participant ID to outbound message channel
    senders: RwLock<HashMap<ParticipantId, mpsc::UnboundedSender<String>>>,
    /// Map from participant ID to the session derived for its connection
    connection_info: RwLock<HashMap<ParticipantId, ConnectionInfo>>,
    /// Map from session ID to joined participants
    sessions: RwLock<HashMap<SessionId, HashSet<ParticipantId>>>,
}

impl SignalingRelay {
    pub fn new() -> Self {
        Self {
            senders: RwLock::new(HashMap::new()),
            connection_info: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn add_connection(
        &self,
        participant_id: ParticipantId,
        session_id: SessionId,
        sender: mpsc::UnboundedSender<String>,
    ) {
        self.senders
            .write()
            .await
            .insert(participant_id.clone(), sender);

        tracing::debug!(
            "Participant {} connected for session {}",
            participant_id,
            session_id
        );

        self.connection_info.write().await.insert(
            participant_id,
            ConnectionInfo {
                session_id,
                joined: false,
            },
        );
    }

    /// Add the participant to its session group and announce it to the rest
    pub async fn join(&self, participant_id: &ParticipantId) {
        let session_id = {
            let mut connections = self.connection_info.write().await;
            let Some(info) = connections.get_mut(participant_id) else {
                tracing::warn!("Join from unknown participant {}", participant_id);
                return;
            };
            info.joined = true;
            info.session_id.clone()
        };

        let others = {
            let mut sessions = self.sessions.write().await;
            let members = sessions.entry(session_id.clone()).or_default();
            members.insert(participant_id.clone());
            members
                .iter()
                .filter(|id| *id != participant_id)
                .cloned()
                .collect::<Vec<_>>()
        };

        tracing::info!(
            "Participant {} joined session {} ({} other members)",
            participant_id,
            session_id,
            others.len()
        );

        let envelope =
            SignalEnvelope::broadcast(SignalPayload::Joined).stamped(participant_id.clone());
        self.deliver(&others, &ServerMessage::Signal(envelope)).await;
    }

    /// Stamp the caller as sender, then deliver to the recipient or the whole session
    pub async fn relay(&self, participant_id: &ParticipantId, envelope: SignalEnvelope) {
        let Some(session_id) = self.session_of(participant_id).await else {
            tracing::warn!("Signal from unknown participant {}", participant_id);
            return;
        };

        let envelope = envelope.stamped(participant_id.clone());

        let targets: Vec<ParticipantId> = {
            let sessions = self.sessions.read().await;
            let Some(members) = sessions.get(&session_id) else {
                tracing::debug!("Session {} has no members, dropping signal", session_id);
                return;
            };

            match &envelope.recipient {
                Some(recipient) if members.contains(recipient) => vec![recipient.clone()],
                Some(recipient) => {
                    tracing::debug!(
                        "Recipient {} not in session {}, dropping {}",
                        recipient,
                        session_id,
                        envelope.payload.name()
                    );
                    return;
                }
                None => members
                    .iter()
                    .filter(|id| *id != participant_id)
                    .cloned()
                    .collect(),
            }
        };

        tracing::debug!(
            "Relaying {} from {} to {} participant(s)",
            envelope.payload.name(),
            participant_id,
            targets.len()
        );

        self.deliver(&targets, &ServerMessage::Signal(envelope)).await;
    }

    pub async fn remove_connection(&self, participant_id: &ParticipantId) {
        let info = self.connection_info.write().await.remove(participant_id);
        self.senders.write().await.remove(participant_id);

        let Some(info) = info else {
            return;
        };

        tracing::debug!(
            "Participant {} disconnected from session {}",
            participant_id,
            info.session_id
        );

        if !info.joined {
            return;
        }

        let remaining = {
            let mut sessions = self.sessions.write().await;
            let Some(members) = sessions.get_mut(&info.session_id) else {
                return;
            };
            members.remove(participant_id);
            let remaining: Vec<_> = members.iter().cloned().collect();
            if members.is_empty() {
                sessions.remove(&info.session_id);
                tracing::info!("Session {} is now empty", info.session_id);
            }
            remaining
        };

        let envelope =
            SignalEnvelope::broadcast(SignalPayload::Disconnected).stamped(participant_id.clone());
        self.deliver(&remaining, &ServerMessage::Signal(envelope)).await;
    }

    pub async fn send_to_participant(&self, participant_id: &ParticipantId, message: &ServerMessage) {
        self.deliver(std::slice::from_ref(participant_id), message).await;
    }

    pub async fn session_members(&self, session_id: &SessionId) -> Vec<ParticipantId> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn session_of(&self, participant_id: &ParticipantId) -> Option<SessionId> {
        self.connection_info
            .read()
            .await
            .get(participant_id)
            .map(|info| info.session_id.clone())
    }

    async fn deliver(&self, targets: &[ParticipantId], message: &ServerMessage) {
        if targets.is_empty() {
            return;
        }

        let json = match serde_json::to_string(message) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!("Failed to serialize message: {}", e);
                return;
            }
        };

        let senders = self.senders.read().await;
        for participant_id in targets {
            if let Some(sender) = senders.get(participant_id) {
                if let Err(e) = sender.send(json.clone()) {
                    tracing::error!("Failed to send message to {}: {}", participant_id, e);
                }
            }
        }
    }
}

impl Default for SignalingRelay {
    fn default() -> Self {
        Self::new()
    }
}
