use crate::ws::relay::SignalingRelay;
use std::sync::Arc;

#[derive(Clone)]
pub struct Config {
    pub bind_address: String,
    /// Directory holding the static client bundle
    pub static_dir: String,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let static_dir = std::env::var("STATIC_DIR").unwrap_or_else(|_| "public".to_string());

        Ok(Config {
            bind_address,
            static_dir,
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub relay: Arc<SignalingRelay>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            relay: Arc::new(SignalingRelay::new()),
        }
    }
}
