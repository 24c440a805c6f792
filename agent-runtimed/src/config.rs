//! Runtime configuration, per spec §6's configuration surface.
//!
//! Loaded from a TOML file (default path `./agent-runtimed.toml`,
//! overridable via `--config`/`AGENT_RUNTIMED_CONFIG`), with every field
//! defaulted so a bare `[package]`-less file — or no file at all — still
//! produces a usable config.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// HTTP bind address, e.g. `0.0.0.0:8080`.
    pub bind_addr: String,
    /// Identifier of the default provider (informational; the only
    /// concrete provider wired in this binary is the mock one).
    pub default_provider: String,
    /// Default model identifier passed to the provider.
    pub default_model: String,
    /// Hard cap on reason-act iterations per turn.
    pub max_iterations: u32,
    /// Max tokens budget for context assembly.
    pub max_tokens: u32,
    /// Tokens reserved for the model's response, subtracted from the
    /// context budget.
    pub response_reserve: usize,
    /// Below this deterministic weight, the Noise Filter rejects input.
    pub noise_threshold: f64,
    /// Daily spend ceiling in USD.
    pub daily_limit_usd: String,
    /// Monthly spend ceiling in USD.
    pub monthly_limit_usd: String,
    /// Per-call spend ceiling in USD.
    pub per_call_limit_usd: String,
    /// Whether bearer-token auth (and the optional HMAC integrity layer)
    /// is enforced.
    pub require_auth: bool,
    /// Shared secret backing both the bearer token and the HMAC
    /// signature layer. Required when `require_auth` is true.
    pub shared_secret: Option<String>,
    /// Maximum swarms running at once, process-wide.
    pub max_concurrent_swarms: usize,
    /// Maximum workers per swarm launch.
    pub max_agents_per_swarm: usize,
    /// Default per-swarm deadline, milliseconds.
    pub swarm_default_timeout_ms: u64,
    /// Idle session time-to-live before the reaper terminates it, milliseconds.
    pub idle_session_ttl_ms: u64,
    /// Filesystem roots the `read_file`/`write_file`/`edit_file` tools
    /// may touch. Empty means no filesystem tool restriction is applied
    /// beyond what the tools themselves enforce.
    pub tool_allow_paths: Vec<String>,
    /// Shell commands the `run_shell` tool refuses to execute.
    pub tool_deny_commands: Vec<String>,
    /// Directory for the filesystem state backend. `None` keeps session
    /// history and user profiles in memory only.
    pub state_dir: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            default_provider: "mock".to_string(),
            default_model: "mock-1".to_string(),
            max_iterations: 20,
            max_tokens: 128_000,
            response_reserve: 4096,
            noise_threshold: 0.3,
            daily_limit_usd: "10".to_string(),
            monthly_limit_usd: "200".to_string(),
            per_call_limit_usd: "1".to_string(),
            require_auth: false,
            shared_secret: None,
            max_concurrent_swarms: 10,
            max_agents_per_swarm: 10,
            swarm_default_timeout_ms: 5 * 60 * 1000,
            idle_session_ttl_ms: 30 * 60 * 1000,
            tool_allow_paths: Vec::new(),
            tool_deny_commands: Vec::new(),
            state_dir: None,
        }
    }
}

impl RuntimeConfig {
    /// Load from `path` if it exists, falling back to defaults if it
    /// doesn't. A present-but-malformed file is an error — unlike a
    /// missing one, that's a configuration mistake worth failing on.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.display().to_string(), e.to_string()))?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse(path.display().to_string(), e.to_string()))
    }

    /// `swarm_default_timeout_ms` as a [`Duration`].
    pub fn swarm_default_timeout(&self) -> Duration {
        Duration::from_millis(self.swarm_default_timeout_ms)
    }

    /// `idle_session_ttl_ms` as a [`Duration`].
    pub fn idle_session_ttl(&self) -> Duration {
        Duration::from_millis(self.idle_session_ttl_ms)
    }
}

/// Failure modes for loading [`RuntimeConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file exists but couldn't be read.
    #[error("failed to read config file {0}: {1}")]
    Read(String, String),
    /// The config file exists but isn't valid TOML for this shape.
    #[error("failed to parse config file {0}: {1}")]
    Parse(String, String),
}
