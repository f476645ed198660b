//! Persistent application configuration model and defaults.

/// Root configuration persisted to `bookrpc.toml`.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    /// Delay between poll cycles, in milliseconds. Also the reconnect
    /// backoff: one global tier, no exponential growth.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    15_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Clamps loaded values into a usable range.
pub fn sanitize_config(config: Config) -> Config {
    Config {
        poll_interval_ms: config.poll_interval_ms.max(1_000),
    }
}
