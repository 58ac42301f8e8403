//! Environment-driven configuration with local-dev fallbacks.

use std::time::Duration;

const DEFAULT_WS_URL: &str = "ws://localhost:8080/ws/chat";
const DEFAULT_API_URL: &str = "http://127.0.0.1:8080/api";
const DEFAULT_USER_ID: &str = "local-dev";
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
const DEFAULT_RECONNECT_DELAY_MS: u64 = 1000;

/// Client configuration. Every field can be overridden from the
/// environment; the defaults target a backend on localhost:8080.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base WebSocket URL (`ECHO_WS_URL`). The conversation id is appended
    /// as a `chatId` query parameter.
    pub ws_url: String,
    /// Base HTTP API URL (`ECHO_API_URL`) for history and commit calls.
    pub api_url: String,
    /// Sender identity stamped on outbound user envelopes (`ECHO_USER_ID`).
    pub user_id: String,
    /// Reconnect attempt bound (`ECHO_MAX_RECONNECT_ATTEMPTS`).
    pub max_reconnect_attempts: u32,
    /// Base backoff delay (`ECHO_RECONNECT_DELAY_MS`); actual wait is
    /// `base × attempt` (linear, not exponential).
    pub reconnect_base_delay: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        let delay_ms = env_parse("ECHO_RECONNECT_DELAY_MS", DEFAULT_RECONNECT_DELAY_MS);
        Self {
            ws_url: env_or("ECHO_WS_URL", DEFAULT_WS_URL),
            api_url: env_or("ECHO_API_URL", DEFAULT_API_URL),
            user_id: env_or("ECHO_USER_ID", DEFAULT_USER_ID),
            max_reconnect_attempts: env_parse(
                "ECHO_MAX_RECONNECT_ATTEMPTS",
                DEFAULT_MAX_RECONNECT_ATTEMPTS,
            ),
            reconnect_base_delay: Duration::from_millis(delay_ms),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            user_id: DEFAULT_USER_ID.to_string(),
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_base_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_target_local_backend() {
        let cfg = Config::default();
        assert_eq!(cfg.ws_url, "ws://localhost:8080/ws/chat");
        assert_eq!(cfg.api_url, "http://127.0.0.1:8080/api");
        assert_eq!(cfg.max_reconnect_attempts, 5);
        assert_eq!(cfg.reconnect_base_delay, Duration::from_millis(1000));
    }
}
