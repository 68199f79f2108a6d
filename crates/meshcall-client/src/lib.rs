//! Meshcall client library
//!
//! This crate provides the participant side of a Meshcall session: the
//! signaling connection to the relay, one negotiated peer link per remote
//! participant, and the local camera, microphone and screen tracks those
//! links carry.

pub mod call;
pub mod config;
pub mod error;
pub mod media;
pub mod network;
pub mod peer;

pub use call::Call;
pub use config::ClientConfig;
pub use error::{ConnectionError, MediaError, PresentationError};
