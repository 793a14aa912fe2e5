use std::time::Duration;

use reqwest::StatusCode;
use snmpkey_common::config::Config;

const MAX_DELAY: Duration = Duration::from_secs(30);

/// Bounded exponential backoff for transient controller failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl From<&Config> for RetryPolicy {
    fn from(cfg: &Config) -> Self {
        Self {
            max_retries: cfg.max_retries,
            base_delay: cfg.retry_backoff,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (zero based).
    pub fn delay(&self, retry: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(retry))
            .min(MAX_DELAY)
    }

    pub fn allows(&self, retry: u32) -> bool {
        retry < self.max_retries
    }
}

/// Whether a request may be sent again after a failure that leaves its effect unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replay {
    /// Reads and idempotent writes: retried on 5xx, timeouts and connect errors.
    Safe,
    /// Requests that create something: only retried when they never reached the controller.
    ConnectOnly,
}

impl Replay {
    pub fn retries_status(self, status: StatusCode) -> bool {
        self == Replay::Safe && is_transient_status(status)
    }

    pub fn retries_error(self, err: &reqwest::Error) -> bool {
        match self {
            Replay::Safe => is_transient_error(err),
            Replay::ConnectOnly => err.is_connect(),
        }
    }
}

/// 5xx answers are retried, everything else is final.
pub fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
}

/// Connection refused/reset and timeouts are worth another try.
pub fn is_transient_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
