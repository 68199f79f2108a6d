//! Wire protocol shared by the Meshcall relay and clients.
//!
//! Everything travelling over the signaling socket is defined here: the
//! socket-level [`ClientMessage`] / [`ServerMessage`] frames and the
//! [`SignalEnvelope`] they carry between participants of a session.

pub mod messages;
pub mod types;

pub use messages::{ClientMessage, ProtocolError, ServerMessage, SignalEnvelope, SignalPayload};
pub use types::{IceCandidateData, ParticipantId, SdpType, SessionDescription, SessionId};
