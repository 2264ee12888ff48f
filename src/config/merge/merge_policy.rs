//! Merge rules: defaults, override order, conflict handling.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("retry.max_retries", 2)?
        .set_default("retry.base_delay_ms", 500)?
        .set_default("probe.max_probes", 2)?
        .set_default("probe.base_delay_ms", 100)?
        .set_default("injection.poll_interval_ms", 10)?
        .set_default("injection.max_poll_attempts", 100)?
        .set_default("pending.max_age_secs", 300)
}
