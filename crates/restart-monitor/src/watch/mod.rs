//! Resumable list+watch over the cluster's pods.
//!
//! [`WatchCoordinator`] turns the API server's list and watch responses into
//! an ordered stream of [`LifecycleEvent`]s, re-listing whenever the server
//! reports that the watch cursor expired.

pub mod coordinator;
pub mod cursor;

use core::error::Error;
use std::time::Duration;

use error_stack::Report;
use rand::Rng;

use crate::k8s::PodSnapshot;

pub use coordinator::WatchCoordinator;
pub use cursor::Cursor;

#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Each watch picks its server-side timeout from `[timeout_base, 2 * timeout_base)`.
    pub timeout_base: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            timeout_base: Duration::from_secs(5 * 60),
        }
    }
}

impl WatchConfig {
    /// Randomized timeout so that many monitors do not reconnect in lockstep.
    pub fn randomized_timeout(&self) -> Duration {
        let factor = rand::rng().random_range(1.0..2.0);
        self.timeout_base.mul_f64(factor)
    }
}

/// A pod change as delivered to the restart detector.
#[derive(Debug, Clone)]
pub enum PodChange {
    Added(PodSnapshot),
    Modified(PodSnapshot),
    Deleted(PodSnapshot),
}

impl PodChange {
    pub fn pod(&self) -> &PodSnapshot {
        match self {
            Self::Added(pod) | Self::Modified(pod) | Self::Deleted(pod) => pod,
        }
    }
}

/// Item of the queue between the watch and the consumer loop.
#[derive(Debug)]
pub enum LifecycleEvent {
    Pod {
        resource_version: String,
        change: PodChange,
    },
    /// The watch failed for good; nothing follows this event.
    Error(Report<WatchError>),
}

impl LifecycleEvent {
    pub fn pod(change: PodChange) -> Self {
        Self::Pod {
            resource_version: change.pod().resource_version.clone(),
            change,
        }
    }
}

/// Errors that end the pod watch.
#[derive(Debug, derive_more::Display)]
pub enum WatchError {
    #[display("Failed to list pods")]
    ListFailed,
    #[display("Failed to watch pods since resource version {resource_version}")]
    WatchFailed { resource_version: String },
    #[display("Lifecycle event queue closed")]
    QueueClosed,
}

impl Error for WatchError {}
