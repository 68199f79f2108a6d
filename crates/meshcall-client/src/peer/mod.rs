//! One negotiated connection per remote participant

mod connection;
mod link;
mod manager;
mod rtc;

pub use connection::{
    ConnectionEvent, ConnectionEventReceiver, ConnectionEventSender, ConnectionFactory,
    PeerConnection, PeerEvents, SenderId, TransportState,
};
pub use link::{LinkState, MAX_NEGOTIATION_FAILURES, PeerLink};
pub use manager::{ParticipantView, PeerConnectionManager, PeerRegistry};
pub use rtc::{RtcConnectionFactory, RtcPeerConnection};
