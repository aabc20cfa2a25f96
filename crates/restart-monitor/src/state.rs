//! Last-known pod snapshots, keyed by pod UID.

use std::collections::HashMap;

use tracing::debug;

use crate::k8s::PodSnapshot;
use crate::watch::PodChange;

/// In-memory view of the cluster's pods.
///
/// Owned by the consumer loop; holds at most one snapshot per UID and always
/// the one from the last change applied for that UID.
#[derive(Debug, Default)]
pub struct PodStore {
    pods: HashMap<String, PodSnapshot>,
}

impl PodStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a change and return the snapshot it should be diffed against.
    ///
    /// Only a modification of an already known pod yields a baseline. Added
    /// pods replace any stored snapshot without a diff, which is what a full
    /// re-list after cursor expiry produces.
    pub fn apply(&mut self, change: PodChange) -> Option<PodSnapshot> {
        match change {
            PodChange::Added(pod) => {
                let uid = pod.uid.clone();
                if self.pods.insert(uid, pod).is_some() {
                    debug!("Replaced known pod snapshot from a list");
                }
                None
            }
            PodChange::Modified(pod) => {
                let previous = self.pods.insert(pod.uid.clone(), pod);
                if previous.is_none() {
                    debug!("Modified pod without baseline, skipping diff");
                }
                previous
            }
            PodChange::Deleted(pod) => {
                self.pods.remove(&pod.uid);
                None
            }
        }
    }

    pub fn get(&self, uid: &str) -> Option<&PodSnapshot> {
        self.pods.get(uid)
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.pods.contains_key(uid)
    }

    pub fn len(&self) -> usize {
        self.pods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pods.is_empty()
    }
}
