use chrono::DateTime;
use chrono::Utc;
use error_stack::Report;
use k8s_openapi::api::core::v1::ContainerStatus;
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::api::core::v1::Pod;

use crate::k8s::ClusterError;

/// Immutable view of a pod as observed at one resource version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodSnapshot {
    pub uid: String,
    pub namespace: String,
    pub name: String,
    pub resource_version: String,
    pub containers: Vec<ContainerState>,
    pub init_containers: Vec<ContainerState>,
}

/// Restart bookkeeping for a single container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerState {
    pub name: String,
    pub restart_count: u32,
    /// Taken from the container's last terminated state, if it ever terminated.
    pub last_termination: Option<Termination>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Termination {
    pub exit_code: i32,
    pub reason: String,
    pub message: Option<String>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Result of a full pod list.
#[derive(Debug, Clone, Default)]
pub struct PodList {
    pub items: Vec<PodSnapshot>,
    /// Resource version of the collection, the starting point for a watch.
    pub resource_version: String,
}

/// A single item decoded from a pod watch.
#[derive(Debug, Clone)]
pub enum WatchItem {
    Added(PodSnapshot),
    Modified(PodSnapshot),
    Deleted(PodSnapshot),
    Bookmark { resource_version: String },
    /// An object that could not be read as a pod, with its resource version
    /// when it carried one.
    Unexpected {
        kind: String,
        resource_version: Option<String>,
    },
}

impl TryFrom<Pod> for PodSnapshot {
    type Error = Report<ClusterError>;

    fn try_from(pod: Pod) -> Result<Self, Self::Error> {
        let metadata = pod.metadata;
        let name = metadata.name.unwrap_or_default();
        let uid = metadata
            .uid
            .filter(|uid| !uid.is_empty())
            .ok_or_else(|| {
                Report::new(ClusterError::MalformedObject {
                    message: format!("pod '{name}' has no uid"),
                })
            })?;

        let (containers, init_containers) = match pod.status {
            Some(status) => (
                container_states(status.container_statuses),
                container_states(status.init_container_statuses),
            ),
            None => (Vec::new(), Vec::new()),
        };

        Ok(Self {
            uid,
            namespace: metadata.namespace.unwrap_or_default(),
            name,
            resource_version: metadata.resource_version.unwrap_or_default(),
            containers,
            init_containers,
        })
    }
}

fn container_states(statuses: Option<Vec<ContainerStatus>>) -> Vec<ContainerState> {
    statuses
        .unwrap_or_default()
        .into_iter()
        .map(ContainerState::from)
        .collect()
}

impl From<ContainerStatus> for ContainerState {
    fn from(status: ContainerStatus) -> Self {
        let last_termination = status
            .last_state
            .and_then(|state| state.terminated)
            .map(|terminated| Termination {
                exit_code: terminated.exit_code,
                reason: terminated.reason.unwrap_or_default(),
                message: terminated.message.filter(|message| !message.is_empty()),
                finished_at: terminated.finished_at.map(|time| time.0),
            });

        Self {
            name: status.name,
            // the API server never reports negative counts
            restart_count: u32::try_from(status.restart_count).unwrap_or(0),
            last_termination,
        }
    }
}

impl PodSnapshot {
    /// Builds the involved-object reference that attaches an event to this pod.
    pub fn object_reference(&self) -> Result<ObjectReference, Report<ClusterError>> {
        let missing = match (self.name.is_empty(), self.uid.is_empty()) {
            (true, _) => Some("pod has no name"),
            (false, true) => Some("pod has no uid"),
            (false, false) => None,
        };
        if let Some(message) = missing {
            return Err(Report::new(ClusterError::Reference {
                namespace: self.namespace.clone(),
                name: self.name.clone(),
                message: message.to_string(),
            }));
        }

        Ok(ObjectReference {
            api_version: Some("v1".to_string()),
            kind: Some("Pod".to_string()),
            namespace: Some(self.namespace.clone()),
            name: Some(self.name.clone()),
            uid: Some(self.uid.clone()),
            resource_version: Some(self.resource_version.clone()).filter(|rv| !rv.is_empty()),
            ..Default::default()
        })
    }

    /// Reference carrying only what is known for sure, `None` without a name.
    pub fn partial_reference(&self) -> Option<ObjectReference> {
        if self.name.is_empty() {
            return None;
        }
        Some(ObjectReference {
            api_version: Some("v1".to_string()),
            kind: Some("Pod".to_string()),
            namespace: Some(self.namespace.clone()),
            name: Some(self.name.clone()),
            uid: Some(self.uid.clone()).filter(|uid| !uid.is_empty()),
            ..Default::default()
        })
    }
}
