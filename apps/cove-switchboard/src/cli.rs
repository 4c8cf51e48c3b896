use clap::Parser;

use crate::config::Config;

/// Call signaling and session server for the cove chat backend.
#[derive(Debug, Parser)]
#[command(name = "cove-switchboard")]
pub struct Cli {
    /// Listen port (overrides COVE_SWITCHBOARD_PORT).
    #[arg(long)]
    pub port: Option<u16>,

    /// Reaper interval in seconds (overrides COVE_SWEEP_INTERVAL).
    #[arg(long)]
    pub sweep_interval: Option<u64>,

    /// Ring timeout in seconds (overrides COVE_RING_TIMEOUT).
    #[arg(long)]
    pub ring_timeout: Option<u64>,

    /// Chat backend directory base URL (overrides COVE_DIRECTORY_URL).
    #[arg(long)]
    pub directory_url: Option<String>,
}

impl Cli {
    pub fn apply(self, config: &mut Config) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(interval) = self.sweep_interval {
            config.sweep_interval_seconds = interval;
        }
        if let Some(timeout) = self.ring_timeout {
            config.ring_timeout_seconds = timeout;
        }
        if self.directory_url.is_some() {
            config.directory_url = self.directory_url;
        }
    }
}
