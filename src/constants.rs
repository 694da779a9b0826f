// -
// Routing

/// Suffix appended to a key namespace to form its event topic
pub(crate) const TOPIC_SUFFIX: &str = ".events";

// -
// Configuration sources

/// Environment variable naming the TOML config file
pub(crate) const CONFIG_PATH_ENV: &str = "TELEHUB_CONFIG";

/// Prefix for environment overrides, e.g. `TELEHUB__HUB__SUBSCRIBER_BUFFER_SIZE`
pub(crate) const ENV_PREFIX: &str = "TELEHUB";

// -
// Change detection

/// Top-level fields of a raw JSON snapshot that never count as a change
pub(crate) const VOLATILE_RAW_FIELDS: &[&str] = &["timestamp", "observed_at", "uptime", "collected_at"];
