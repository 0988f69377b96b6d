//! Runtime configuration for chat-relay.
//!
//! Configuration is loaded from a JSON file or constructed programmatically.
//! Every section falls back to its defaults for missing fields. The upstream
//! API key is never stored here; only the name of the environment variable
//! that holds it.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

/// Default system instruction prepended when a conversation has none.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "chat-relay", about = "SSE relay for streaming chat completions")]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// HTTP listen address (overrides `server.listen`).
    #[arg(long)]
    pub listen: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub log_json: bool,

    /// Serve from the built-in mock backend instead of the upstream API.
    #[arg(long)]
    pub mock: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,

    /// Upstream completion API.
    pub upstream: UpstreamConfig,

    /// Relay loop behavior.
    pub relay: RelayConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g. "0.0.0.0:8000").
    pub listen: String,

    /// The single browser origin allowed to call the relay endpoints.
    pub cors_origin: String,

    /// Interval for SSE keep-alive comments while upstream is idle (0 = off).
    pub keep_alive_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8000".to_string(),
            cors_origin: "http://localhost:5173".to_string(),
            keep_alive_secs: 0,
        }
    }
}

/// Upstream chat-completion API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the OpenAI-compatible API, without a trailing slash.
    pub api_base: String,

    /// Model identifier sent with every request.
    pub model: String,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Whole-request timeout in seconds, streaming included.
    pub request_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            connect_timeout_secs: 10,
            request_timeout_secs: 300,
        }
    }
}

impl UpstreamConfig {
    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.is_empty())
    }

    /// Endpoint for streaming chat completions.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }
}

/// Relay loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Instruction used when a conversation carries no system message.
    pub system_prompt: String,

    /// Pause after each forwarded fragment in milliseconds (0 = none).
    pub pacing_delay_ms: u64,

    /// Text carried by the `complete` event. Empty by default.
    pub completion_marker: String,

    /// Follow the `complete` record with a named `event: complete` record.
    pub named_complete_event: bool,

    /// Capacity of the per-request event channel.
    pub channel_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            pacing_delay_ms: 10,
            completion_marker: String::new(),
            named_complete_event: true,
            channel_capacity: 32,
        }
    }
}

impl RelayConfig {
    pub fn pacing_delay(&self) -> Duration {
        Duration::from_millis(self.pacing_delay_ms)
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for missing fields.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }
}
