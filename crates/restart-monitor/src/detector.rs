//! Restart detection between two snapshots of the same pod.

use std::collections::HashMap;
use std::fmt;

use chrono::DateTime;
use chrono::Utc;
use tracing::warn;

use crate::k8s::ContainerState;
use crate::k8s::PodSnapshot;
use crate::k8s::Termination;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Regular,
    Init,
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Regular => f.write_str("Container"),
            Self::Init => f.write_str("Init container"),
        }
    }
}

/// A container restart observed between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartRecord {
    pub pod_uid: String,
    pub namespace: String,
    pub pod_name: String,
    pub container: String,
    pub kind: ContainerKind,
    pub restart_count: u32,
    pub reason: String,
    pub exit_code: i32,
    pub message: Option<String>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RestartRecord {
    fn new(
        pod: &PodSnapshot,
        kind: ContainerKind,
        container: &ContainerState,
        termination: &Termination,
    ) -> Self {
        Self {
            pod_uid: pod.uid.clone(),
            namespace: pod.namespace.clone(),
            pod_name: pod.name.clone(),
            container: container.name.clone(),
            kind,
            restart_count: container.restart_count,
            reason: termination.reason.clone(),
            exit_code: termination.exit_code,
            message: termination.message.clone(),
            finished_at: termination.finished_at,
        }
    }

    /// Human readable description used as the event message.
    pub fn message(&self) -> String {
        let mut message = format!(
            "{} {} in pod {}/{} restarted.\nReason: {}, exit code: {}.",
            self.kind, self.container, self.namespace, self.pod_name, self.reason, self.exit_code
        );
        if let Some(detail) = self.message.as_deref().filter(|detail| !detail.is_empty()) {
            message.push_str("\nMessage: ");
            message.push_str(detail);
        }
        message
    }
}

/// Containers of `current` whose restart counter grew since `previous`.
///
/// Regular and init containers are compared separately, matched by name.
/// Containers missing from either side never count, and a counter that grew
/// by several restarts between two observations yields a single record.
pub fn detect_restarts(current: &PodSnapshot, previous: &PodSnapshot) -> Vec<RestartRecord> {
    let mut restarts = diff_containers(
        current,
        ContainerKind::Regular,
        &current.containers,
        &previous.containers,
    );
    restarts.extend(diff_containers(
        current,
        ContainerKind::Init,
        &current.init_containers,
        &previous.init_containers,
    ));
    restarts
}

fn diff_containers(
    pod: &PodSnapshot,
    kind: ContainerKind,
    current: &[ContainerState],
    previous: &[ContainerState],
) -> Vec<RestartRecord> {
    let previous: HashMap<&str, &ContainerState> = previous
        .iter()
        .map(|container| (container.name.as_str(), container))
        .collect();

    current
        .iter()
        .filter_map(|container| {
            let before = previous.get(container.name.as_str())?;
            if container.restart_count <= before.restart_count {
                return None;
            }

            let Some(termination) = &container.last_termination else {
                warn!(
                    namespace = %pod.namespace,
                    pod = %pod.name,
                    container = %container.name,
                    restart_count = container.restart_count,
                    "Restart counter increased without a termination record, skipping"
                );
                return None;
            };
            Some(RestartRecord::new(pod, kind, container, termination))
        })
        .collect()
}
