//! Configuration System
//!
//! Layered configuration for the relay: retry and probe budgets, injection polling,
//! the pending-script slot, and logging. Defaults come from the merge policy, then the
//! global config file, the workspace config files, and `TABRELAY__*` environment variables.

use crate::backoff::Backoff;
use crate::error::RelayError;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

mod loader;
mod merge;
mod sources;

pub use loader::ConfigLoader;

/// Upper bound for either retry layer; retries compound across sender and coordinator.
pub const MAX_RETRY_BUDGET: u32 = 3;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Caller-side retrying sender
    #[serde(default)]
    pub retry: RetryConfig,

    /// Coordinator liveness probes
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Inline-element injection polling
    #[serde(default)]
    pub injection: InjectionConfig,

    /// Pending-script slot
    #[serde(default)]
    pub pending: PendingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Retrying sender settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    500
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.max_retries, self.base_delay_ms)
    }
}

/// Liveness probe settings used when an optimistic send fails
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Total probes before giving up (at least 1)
    #[serde(default = "default_max_probes")]
    pub max_probes: u32,
    #[serde(default = "default_probe_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_probes() -> u32 {
    2
}

fn default_probe_delay_ms() -> u64 {
    100
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            max_probes: default_max_probes(),
            base_delay_ms: default_probe_delay_ms(),
        }
    }
}

impl ProbeConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.max_probes.saturating_sub(1), self.base_delay_ms)
    }
}

/// Inline-element injection polling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectionConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,
}

fn default_poll_interval_ms() -> u64 {
    10
}

fn default_max_poll_attempts() -> u32 {
    100
}

impl Default for InjectionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_attempts: default_max_poll_attempts(),
        }
    }
}

impl InjectionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Poll ceiling expressed as wall time.
    pub fn ceiling(&self) -> Duration {
        self.poll_interval()
            .saturating_mul(self.max_poll_attempts)
    }
}

/// Pending-script slot settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingConfig {
    /// JSON file backing the slot; in-memory when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Stashed scripts older than this are discarded instead of run
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
}

fn default_max_age_secs() -> u64 {
    300
}

impl Default for PendingConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_age_secs: default_max_age_secs(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Retry(String),
    Probe(String),
    Injection(String),
    Pending(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Retry(msg) => write!(f, "retry: {}", msg),
            ValidationError::Probe(msg) => write!(f, "probe: {}", msg),
            ValidationError::Injection(msg) => write!(f, "injection: {}", msg),
            ValidationError::Pending(msg) => write!(f, "pending: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl RelayConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.retry.max_retries > MAX_RETRY_BUDGET {
            errors.push(ValidationError::Retry(format!(
                "max_retries {} exceeds {} (retries compound with coordinator probes)",
                self.retry.max_retries, MAX_RETRY_BUDGET
            )));
        }
        if self.retry.base_delay_ms == 0 {
            errors.push(ValidationError::Retry(
                "base_delay_ms must be greater than 0".to_string(),
            ));
        }

        if self.probe.max_probes == 0 {
            errors.push(ValidationError::Probe(
                "max_probes must be at least 1".to_string(),
            ));
        }
        if self.probe.max_probes > MAX_RETRY_BUDGET + 1 {
            errors.push(ValidationError::Probe(format!(
                "max_probes {} exceeds {}",
                self.probe.max_probes,
                MAX_RETRY_BUDGET + 1
            )));
        }
        if self.probe.base_delay_ms == 0 {
            errors.push(ValidationError::Probe(
                "base_delay_ms must be greater than 0".to_string(),
            ));
        }

        if self.injection.poll_interval_ms == 0 {
            errors.push(ValidationError::Injection(
                "poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.injection.max_poll_attempts == 0 {
            errors.push(ValidationError::Injection(
                "max_poll_attempts must be at least 1".to_string(),
            ));
        }

        if let Some(path) = &self.pending.path {
            if path.as_os_str().is_empty() {
                errors.push(ValidationError::Pending(
                    "path cannot be empty".to_string(),
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and fold every problem into one error.
    pub fn validated(self) -> Result<Self, RelayError> {
        match self.validate() {
            Ok(()) => Ok(self),
            Err(errors) => Err(RelayError::Config(
                errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; "),
            )),
        }
    }
}
