pub mod handler;
pub mod relay;

pub use relay::SignalingRelay;
