pub mod cli;

use std::time::Duration;

use crate::emitter::EmitterConfig;
use crate::watch::WatchConfig;

pub use cli::*;

/// Everything the monitor needs at runtime, independent of how it was parsed.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub watch: WatchConfig,
    pub emitter: EmitterConfig,
    /// Capacity of the queue between the pod watch and the restart detector.
    pub queue_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            watch: WatchConfig::default(),
            emitter: EmitterConfig::default(),
            queue_capacity: 128,
        }
    }
}

impl From<&Cli> for MonitorConfig {
    fn from(cli: &Cli) -> Self {
        Self {
            watch: WatchConfig {
                timeout_base: Duration::from_secs(cli.watch_timeout_secs),
            },
            emitter: EmitterConfig {
                reason: cli.event_reason.clone(),
                source_component: cli.event_source.clone(),
                submit_timeout: Duration::from_secs(cli.event_timeout_secs),
            },
            queue_capacity: cli.queue_capacity,
        }
    }
}
