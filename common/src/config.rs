use std::time::Duration;

/// Junos command that prints only the encrypted SNMPv3 key lines in `set` form.
pub const DEFAULT_COMMAND: &str =
    r#"show configuration snmp v3 | display set | match "authentication-key|privacy-key""#;

pub const DEFAULT_PROPERTY_SET: &str = "snmp_auth";

pub struct Config {
    /// Upper bound on devices being worked on at the same time.
    pub concurrency: usize,
    /// Applied to every single HTTP request made against the controller.
    pub request_timeout: Duration,
    /// Retries on transient failures (connect errors, timeouts, 5xx).
    ///
    /// Authentication and validation failures are never retried.
    pub max_retries: u32,
    /// Delay before the first retry, doubled on every following one.
    pub retry_backoff: Duration,
    pub poll_interval: Duration,
    /// A command that is still running after this many polls counts as timed out.
    pub max_poll_attempts: u32,
    pub command: String,
    /// Disabling this accepts self-signed controller certificates.
    pub verify_tls: bool,
    pub property_set_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency: 8,
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
            poll_interval: Duration::from_secs(3),
            max_poll_attempts: 30,
            command: DEFAULT_COMMAND.to_string(),
            verify_tls: true,
            property_set_name: DEFAULT_PROPERTY_SET.to_string(),
        }
    }
}
