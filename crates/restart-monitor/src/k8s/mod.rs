//! Kubernetes integration module.
//!
//! The main components are:
//! - [`ClusterClient`]: list/watch/create-event access to the API server
//! - [`PodSnapshot`]: the restart-relevant part of a pod
//! - [`ClusterError`]: structured API failures, including cursor expiry

pub mod client;
pub mod error;
#[cfg(test)]
pub(crate) mod fake;
pub mod types;

pub use client::init_kube_client;
pub use client::ClusterClient;
pub use client::KubeClusterClient;
pub use client::WatchStream;
pub use error::ClusterError;
pub use types::ContainerState;
pub use types::PodList;
pub use types::PodSnapshot;
pub use types::Termination;
pub use types::WatchItem;
