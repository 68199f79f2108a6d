mod websocket;

pub use websocket::SignalingClient;

use meshcall_protocol::SignalEnvelope;
use tokio::sync::mpsc;

/// Outbound envelopes, sender left unset for the relay to stamp
pub type SignalSender = mpsc::UnboundedSender<SignalEnvelope>;

/// Envelopes delivered by the relay, sender always set
pub type SignalReceiver = mpsc::UnboundedReceiver<SignalEnvelope>;
