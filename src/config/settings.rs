//! Settings blocks of a pipeline configuration
//!
//! Every block deserializes with defaults for missing fields, so a config
//! file only needs to name what it changes.
//!
//! # Main Types
//!
//! - [`LoggingSettings`] - Default tracing filter
//! - [`PoolSettings`] - Buffer pool sizing overrides
//! - [`DispatchSettings`] - How the controlling thread drains engine callbacks
//! - [`RunSettings`] - Limits for the demo run

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is not set
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    "info,vcgraph=debug".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

/// Buffer pool sizing
///
/// `None` means "use what the port recommends".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSettings {
    #[serde(default)]
    pub buffer_count: Option<u32>,
    #[serde(default)]
    pub buffer_size: Option<u32>,
}

/// Engine callback dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSettings {
    /// How long one dispatch call waits for the first event
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,

    /// Upper bound on events handled per dispatch call
    #[serde(default = "default_max_events_per_poll")]
    pub max_events_per_poll: usize,

    /// Callback queue capacity; 0 for unbounded. A bounded queue must hold
    /// every buffer of every pool; the pipeline refuses pools that would not
    /// fit.
    #[serde(default)]
    pub queue_capacity: usize,
}

fn default_poll_timeout_ms() -> u64 {
    100
}

fn default_max_events_per_poll() -> usize {
    64
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            poll_timeout_ms: default_poll_timeout_ms(),
            max_events_per_poll: default_max_events_per_poll(),
            queue_capacity: 0,
        }
    }
}

impl DispatchSettings {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

/// Limits for a demo run on the reference engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSettings {
    /// Frames each capture port produces before signalling end of stream
    #[serde(default = "default_frames")]
    pub frames: u64,

    /// Give up after this many consecutive empty dispatch polls
    #[serde(default = "default_max_idle_polls")]
    pub max_idle_polls: u32,
}

fn default_frames() -> u64 {
    90
}

fn default_max_idle_polls() -> u32 {
    20
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            frames: default_frames(),
            max_idle_polls: default_max_idle_polls(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_defaults() {
        let settings = DispatchSettings::default();
        assert_eq!(settings.poll_timeout(), Duration::from_millis(100));
        assert_eq!(settings.max_events_per_poll, 64);
        assert_eq!(settings.queue_capacity, 0);
    }

    #[test]
    fn test_partial_blocks_fill_defaults() {
        let dispatch: DispatchSettings = serde_json::from_str(r#"{"poll_timeout_ms": 5}"#).unwrap();
        assert_eq!(dispatch.poll_timeout_ms, 5);
        assert_eq!(dispatch.max_events_per_poll, 64);

        let pool: PoolSettings = toml::from_str("buffer_count = 6").unwrap();
        assert_eq!(pool.buffer_count, Some(6));
        assert_eq!(pool.buffer_size, None);
    }
}
