//! Queuing options.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Options for the queuing client and consumer runners.
///
/// # Example
///
/// ```
/// use herald_queue::QueueConfig;
///
/// let config = QueueConfig {
///     group_name: "svcA".to_string(),
///     prefix: Some("evt".to_string()),
///     ..QueueConfig::default()
/// };
/// assert_eq!(config.communication_channel, "notification");
/// assert_eq!(config.stream_batch_size, 50);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Consumer group name. Defaults to the running binary's name.
    #[serde(default = "default_group_name")]
    pub group_name: String,

    /// Consumer name within the group. Defaults to the host name.
    #[serde(default = "default_machine_name")]
    pub machine_name: String,

    /// Prefix prepended to every stream key and the channel.
    #[serde(default)]
    pub prefix: Option<String>,

    /// Pub/sub channel used for wake-up notifications.
    #[serde(default = "default_communication_channel")]
    pub communication_channel: String,

    /// Broker round-trips slower than this are logged, in milliseconds.
    #[serde(default = "default_slow_command_ms")]
    pub slow_command_ms: u64,

    /// Pending entries idle longer than this are reclaimed, in milliseconds.
    /// Also the sweep period.
    #[serde(default = "default_stream_idle_ms")]
    pub stream_idle_ms: u64,

    /// Maximum entries read or inspected per broker call.
    #[serde(default = "default_stream_batch_size")]
    pub stream_batch_size: usize,

    /// Approximate maximum stream length. None keeps every entry.
    #[serde(default)]
    pub stream_max_size: Option<usize>,

    /// Maximum concurrent drain loops per stream key.
    #[serde(default = "default_worker_task_limit")]
    pub worker_task_limit: usize,

    /// Consecutive runner restarts before the failure surfaces.
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,

    /// Broker ping period in milliseconds.
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,

    /// Create consumer groups at the newest entry instead of the beginning.
    #[serde(default)]
    pub group_newest_id: bool,

    /// Start new consumers at the newest entry.
    #[serde(default)]
    pub consumer_newest_id: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            group_name: default_group_name(),
            machine_name: default_machine_name(),
            prefix: None,
            communication_channel: default_communication_channel(),
            slow_command_ms: default_slow_command_ms(),
            stream_idle_ms: default_stream_idle_ms(),
            stream_batch_size: default_stream_batch_size(),
            stream_max_size: None,
            worker_task_limit: default_worker_task_limit(),
            retry_limit: default_retry_limit(),
            health_check_interval_ms: default_health_check_interval_ms(),
            group_newest_id: false,
            consumer_newest_id: false,
        }
    }
}

impl QueueConfig {
    /// Slow-command threshold.
    #[must_use]
    pub const fn slow_command(&self) -> Duration {
        Duration::from_millis(self.slow_command_ms)
    }

    /// Idle time before a pending entry is reclaimed.
    #[must_use]
    pub const fn stream_idle(&self) -> Duration {
        Duration::from_millis(self.stream_idle_ms)
    }

    /// Health check period.
    #[must_use]
    pub const fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    /// Returns the prefix, treating a blank one as absent.
    #[must_use]
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref().filter(|p| !p.trim().is_empty())
    }
}

fn default_group_name() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|path| path.file_stem().map(|stem| stem.to_string_lossy().into_owned()))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "herald".to_string())
}

fn default_machine_name() -> String {
    ["HOSTNAME", "COMPUTERNAME"]
        .into_iter()
        .find_map(|var| std::env::var(var).ok())
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

fn default_communication_channel() -> String {
    "notification".to_string()
}

fn default_slow_command_ms() -> u64 {
    2000
}

fn default_stream_idle_ms() -> u64 {
    5000
}

fn default_stream_batch_size() -> usize {
    50
}

fn default_worker_task_limit() -> usize {
    5
}

fn default_retry_limit() -> u32 {
    3
}

fn default_health_check_interval_ms() -> u64 {
    30000
}
