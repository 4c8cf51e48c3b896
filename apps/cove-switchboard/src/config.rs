use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// How often the reaper runs both sweeps.
    pub sweep_interval_seconds: u64,
    /// Ringing calls older than this are force-ended.
    pub ring_timeout_seconds: u64,
    /// Base URL of the chat backend's internal directory endpoints.
    /// Absent means the in-memory directory (local/dev runs).
    pub directory_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env::var("COVE_SWITCHBOARD_PORT")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(8090),
            sweep_interval_seconds: env::var("COVE_SWEEP_INTERVAL")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(30),
            ring_timeout_seconds: env::var("COVE_RING_TIMEOUT")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(60),
            directory_url: env::var("COVE_DIRECTORY_URL")
                .ok()
                .filter(|value| !value.trim().is_empty()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8090,
            sweep_interval_seconds: 30,
            ring_timeout_seconds: 60,
            directory_url: None,
        }
    }
}
