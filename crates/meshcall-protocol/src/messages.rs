use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{IceCandidateData, ParticipantId, SessionDescription};

/// Messages sent from client to relay via WebSocket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Envelope to forward; any sender set by the client is overwritten
    Signal(SignalEnvelope),

    /// Join the session derived for this connection
    RequestJoin,

    /// Keepalive
    Ping,
}

/// Messages sent from relay to client via WebSocket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// First frame on every connection, carries the relay-assigned identity
    Connected { participant_id: ParticipantId },

    /// Envelope from another participant, sender stamped by the relay
    Signal(SignalEnvelope),

    /// Pong response to ping
    Pong,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("envelope carries no payload")]
    MissingPayload,

    #[error("envelope carries more than one payload: {0}")]
    AmbiguousPayload(String),
}

/// What an envelope carries. Exactly one per envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalPayload {
    Offer(SessionDescription),
    Answer(SessionDescription),
    IceCandidate(IceCandidateData),
    Joined,
    Presenting(bool),
    Disconnected,
    /// Ask the peer holding the offering role to start a negotiation
    NegotiationNeeded,
}

impl SignalPayload {
    pub fn name(&self) -> &'static str {
        match self {
            SignalPayload::Offer(_) => "offer",
            SignalPayload::Answer(_) => "answer",
            SignalPayload::IceCandidate(_) => "iceCandidate",
            SignalPayload::Joined => "joined",
            SignalPayload::Presenting(_) => "isPresenting",
            SignalPayload::Disconnected => "disconnected",
            SignalPayload::NegotiationNeeded => "negotiationNeeded",
        }
    }
}

/// Signaling message routed by the relay between members of one session.
///
/// On the wire this is a flat object with one optional field per payload kind;
/// decoding rejects objects that populate zero or several of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireEnvelope", into = "WireEnvelope")]
pub struct SignalEnvelope {
    pub sender: Option<ParticipantId>,
    pub recipient: Option<ParticipantId>,
    pub payload: SignalPayload,
}

impl SignalEnvelope {
    /// Envelope for every other member of the session
    pub fn broadcast(payload: SignalPayload) -> Self {
        Self {
            sender: None,
            recipient: None,
            payload,
        }
    }

    /// Envelope for a single participant
    pub fn to(recipient: ParticipantId, payload: SignalPayload) -> Self {
        Self {
            sender: None,
            recipient: Some(recipient),
            payload,
        }
    }

    /// Replace the sender with the identity the relay knows the caller by
    pub fn stamped(mut self, sender: ParticipantId) -> Self {
        self.sender = Some(sender);
        self
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sender: Option<ParticipantId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    recipient: Option<ParticipantId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    offer: Option<SessionDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    answer: Option<SessionDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ice_candidate: Option<IceCandidateData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    joined: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    is_presenting: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    disconnected: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    negotiation_needed: Option<bool>,
}

impl TryFrom<WireEnvelope> for SignalEnvelope {
    type Error = ProtocolError;

    fn try_from(wire: WireEnvelope) -> Result<Self, Self::Error> {
        let mut payloads = Vec::new();
        if let Some(offer) = wire.offer {
            payloads.push(SignalPayload::Offer(offer));
        }
        if let Some(answer) = wire.answer {
            payloads.push(SignalPayload::Answer(answer));
        }
        if let Some(candidate) = wire.ice_candidate {
            payloads.push(SignalPayload::IceCandidate(candidate));
        }
        // `joined: false` and `disconnected: false` carry no information
        if wire.joined == Some(true) {
            payloads.push(SignalPayload::Joined);
        }
        if let Some(presenting) = wire.is_presenting {
            payloads.push(SignalPayload::Presenting(presenting));
        }
        if wire.disconnected == Some(true) {
            payloads.push(SignalPayload::Disconnected);
        }
        if wire.negotiation_needed == Some(true) {
            payloads.push(SignalPayload::NegotiationNeeded);
        }

        if payloads.len() > 1 {
            let names: Vec<_> = payloads.iter().map(SignalPayload::name).collect();
            return Err(ProtocolError::AmbiguousPayload(names.join(", ")));
        }

        let payload = payloads.pop().ok_or(ProtocolError::MissingPayload)?;
        Ok(SignalEnvelope {
            sender: wire.sender,
            recipient: wire.recipient,
            payload,
        })
    }
}

impl From<SignalEnvelope> for WireEnvelope {
    fn from(envelope: SignalEnvelope) -> Self {
        let mut wire = WireEnvelope {
            sender: envelope.sender,
            recipient: envelope.recipient,
            ..Default::default()
        };
        match envelope.payload {
            SignalPayload::Offer(offer) => wire.offer = Some(offer),
            SignalPayload::Answer(answer) => wire.answer = Some(answer),
            SignalPayload::IceCandidate(candidate) => wire.ice_candidate = Some(candidate),
            SignalPayload::Joined => wire.joined = Some(true),
            SignalPayload::Presenting(presenting) => wire.is_presenting = Some(presenting),
            SignalPayload::Disconnected => wire.disconnected = Some(true),
            SignalPayload::NegotiationNeeded => wire.negotiation_needed = Some(true),
        }
        wire
    }
}
