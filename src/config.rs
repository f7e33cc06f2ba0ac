//! Client configuration.
//!
//! DESIGN
//! ======
//! Everything is read from `STICKERBOARD_*` environment variables with
//! defaults that match the production server. Empty values count as unset.
//! Lookup goes through a closure so tests never mutate the process
//! environment.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use std::time::Duration;

pub const ENV_BASE_URL: &str = "STICKERBOARD_BASE_URL";
pub const ENV_TOKEN: &str = "STICKERBOARD_TOKEN";
pub const ENV_BOARD_ID: &str = "STICKERBOARD_BOARD_ID";
pub const ENV_RECONNECT_BASE_MS: &str = "STICKERBOARD_RECONNECT_BASE_MS";
pub const ENV_RECONNECT_MAX_MS: &str = "STICKERBOARD_RECONNECT_MAX_MS";
pub const ENV_RECONNECT_ATTEMPTS: &str = "STICKERBOARD_RECONNECT_ATTEMPTS";
pub const ENV_HEARTBEAT_MS: &str = "STICKERBOARD_HEARTBEAT_MS";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "STICKERBOARD_REQUEST_TIMEOUT_MS";

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(30);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Error raised when an environment value cannot be parsed.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} must be a non-negative integer, got `{value}`")]
    InvalidNumber { key: &'static str, value: String },
    #[error("{key} must be greater than zero")]
    Zero { key: &'static str },
}

/// Exponential backoff schedule for reconnect attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first attempt.
    pub base: Duration,
    /// Upper bound on any single delay.
    pub max: Duration,
    /// Attempts allowed before the session is given up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { base: Duration::from_secs(1), max: Duration::from_secs(30), max_attempts: 5 }
    }
}

impl ReconnectPolicy {
    /// Delay before attempt `attempt` (1-based): `min(base * 2^(attempt-1), max)`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base.saturating_mul(1_u32 << exponent).min(self.max)
    }
}

/// Everything needed to talk to one board.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// HTTP(S) origin of the API server.
    pub base_url: String,
    /// Bearer token; the live channel refuses to start without one.
    pub token: Option<String>,
    pub board_id: Option<i64>,
    pub reconnect: ReconnectPolicy,
    /// Interval between heartbeat pings while the channel is open.
    pub heartbeat_every: Duration,
    /// Deadline for the live-channel handshake and for each REST call.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            token: None,
            board_id: None,
            reconnect: ReconnectPolicy::default(),
            heartbeat_every: DEFAULT_HEARTBEAT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Load config from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a numeric variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load config through an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a numeric variable does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|s| s.trim().to_owned()).filter(|s| !s.is_empty());
        let defaults = Self::default();

        let base_url = get(ENV_BASE_URL).unwrap_or(defaults.base_url);
        let token = get(ENV_TOKEN);
        let board_id = match get(ENV_BOARD_ID) {
            Some(raw) => Some(parse_number::<i64>(ENV_BOARD_ID, raw)?),
            None => None,
        };
        let base = millis_or(get(ENV_RECONNECT_BASE_MS), ENV_RECONNECT_BASE_MS, defaults.reconnect.base)?;
        let max = millis_or(get(ENV_RECONNECT_MAX_MS), ENV_RECONNECT_MAX_MS, defaults.reconnect.max)?;
        let max_attempts = match get(ENV_RECONNECT_ATTEMPTS) {
            Some(raw) => parse_number::<u32>(ENV_RECONNECT_ATTEMPTS, raw)?,
            None => defaults.reconnect.max_attempts,
        };
        let heartbeat_every = millis_or(get(ENV_HEARTBEAT_MS), ENV_HEARTBEAT_MS, defaults.heartbeat_every)?;
        if heartbeat_every.is_zero() {
            return Err(ConfigError::Zero { key: ENV_HEARTBEAT_MS });
        }
        let request_timeout =
            millis_or(get(ENV_REQUEST_TIMEOUT_MS), ENV_REQUEST_TIMEOUT_MS, defaults.request_timeout)?;
        if request_timeout.is_zero() {
            return Err(ConfigError::Zero { key: ENV_REQUEST_TIMEOUT_MS });
        }

        Ok(Self {
            base_url,
            token,
            board_id,
            reconnect: ReconnectPolicy { base, max, max_attempts },
            heartbeat_every,
            request_timeout,
        })
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_board(mut self, board_id: i64) -> Self {
        self.board_id = Some(board_id);
        self
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, raw: String) -> Result<T, ConfigError> {
    raw.parse::<T>().map_err(|_| ConfigError::InvalidNumber { key, value: raw })
}

fn millis_or(raw: Option<String>, key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match raw {
        Some(raw) => parse_number::<u64>(key, raw).map(Duration::from_millis),
        None => Ok(default),
    }
}
