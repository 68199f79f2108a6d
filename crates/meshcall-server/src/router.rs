use crate::state::AppState;
use crate::ws;
use axum::{routing::get, Router};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState) -> Router {
    // Everything that is not the socket is the static client bundle
    let assets = ServeDir::new(&state.config.static_dir);

    Router::new()
        .route("/ws", get(ws::handler::ws_handler))
        .fallback_service(assets)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
