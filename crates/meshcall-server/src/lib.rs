//! Meshcall signaling relay
//!
//! This module exposes the server components for testing and embedding.

pub mod error;
pub mod router;
pub mod state;
pub mod ws;

/// Create the relay application: the signaling socket plus the static client bundle
pub fn create_app(config: state::Config) -> axum::Router {
    let app_state = state::AppState::new(config);
    router::create_router(app_state)
}
