use anyhow::{Context, Result};

pub const DEFAULT_SERVER_URL: &str = "http://localhost:3000";
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base HTTP URL of the relay, e.g. `http://localhost:3000`
    pub server_url: String,
    pub room_id: String,
    pub ice_servers: Vec<String>,
}

impl ClientConfig {
    pub fn new(server_url: impl Into<String>, room_id: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            room_id: room_id.into(),
            ice_servers: vec![DEFAULT_STUN_SERVER.to_string()],
        }
    }

    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let server_url = std::env::var("MESHCALL_SERVER_URL")
            .unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string());
        let room_id = std::env::var("MESHCALL_ROOM").context("MESHCALL_ROOM must be set")?;
        let ice_servers = std::env::var("STUN_SERVERS")
            .unwrap_or_else(|_| DEFAULT_STUN_SERVER.to_string())
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            server_url,
            room_id,
            ice_servers,
        })
    }

    /// Page URL the relay reads the session from (sent as the Referer)
    pub fn page_url(&self) -> String {
        format!(
            "{}/?roomId={}",
            self.server_url.trim_end_matches('/'),
            urlencoding::encode(&self.room_id)
        )
    }

    pub fn signaling_url(&self) -> String {
        // Convert http to ws
        let ws_url = self
            .server_url
            .trim_end_matches('/')
            .replace("http://", "ws://")
            .replace("https://", "wss://");
        format!("{}/ws", ws_url)
    }
}
