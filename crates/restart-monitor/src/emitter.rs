//! Records detected restarts as core/v1 events on the restarted pod.

use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use k8s_openapi::api::core::v1::Event;
use k8s_openapi::api::core::v1::EventSource;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use tracing::info;
use tracing::warn;

use crate::detector::RestartRecord;
use crate::k8s::ClusterClient;
use crate::k8s::PodSnapshot;

#[derive(Debug, Clone)]
pub struct EmitterConfig {
    /// Reason set on every recorded event.
    pub reason: String,
    /// Reported as the event's source component.
    pub source_component: String,
    /// Upper bound on a single event submission.
    pub submit_timeout: Duration,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            reason: "ContainerRestart".to_string(),
            source_component: "kube-restart-monitor".to_string(),
            submit_timeout: Duration::from_secs(30),
        }
    }
}

pub struct EventEmitter<C: ?Sized> {
    client: Arc<C>,
    config: EmitterConfig,
}

impl<C: ClusterClient + ?Sized> EventEmitter<C> {
    pub fn new(client: Arc<C>, config: EmitterConfig) -> Self {
        Self { client, config }
    }

    /// Submit one warning event for `record`.
    ///
    /// Failures and submissions that outlast `submit_timeout` are logged and
    /// swallowed, the event is not retried. Returns whether the API server
    /// accepted the event.
    pub async fn emit(&self, pod: &PodSnapshot, record: &RestartRecord) -> bool {
        let Some(event) = self.build_event(pod, record, Utc::now()) else {
            return false;
        };
        if let Some(message) = &event.message {
            info!("{message}");
        }

        let submission = self.client.create_event(event);
        match tokio::time::timeout(self.config.submit_timeout, submission).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(
                    namespace = %record.namespace,
                    pod = %record.pod_name,
                    container = %record.container,
                    "Unable to write event: {e:?}"
                );
                false
            }
            Err(_) => {
                warn!(
                    namespace = %record.namespace,
                    pod = %record.pod_name,
                    container = %record.container,
                    timeout_secs = self.config.submit_timeout.as_secs_f64(),
                    "Gave up writing event, the API server did not answer in time"
                );
                false
            }
        }
    }

    /// Build the event for `record`, observed at `now`.
    ///
    /// Returns `None` when not even a partial reference to the pod exists.
    pub fn build_event(
        &self,
        pod: &PodSnapshot,
        record: &RestartRecord,
        now: DateTime<Utc>,
    ) -> Option<Event> {
        let involved_object = match self.client.resolve_reference(pod) {
            Ok(reference) => reference,
            Err(e) => {
                warn!("Could not construct reference to pod {}/{}: {e:?}", pod.namespace, pod.name);
                let Some(reference) = pod.partial_reference() else {
                    warn!(
                        container = %record.container,
                        "Dropping restart event for pod without a name"
                    );
                    return None;
                };
                reference
            }
        };

        let timestamp = Time(record.finished_at.unwrap_or(now));
        let nanos = now.timestamp_nanos_opt().unwrap_or_default();

        Some(Event {
            metadata: ObjectMeta {
                name: Some(format!("{}.{:x}", pod.name, nanos)),
                namespace: Some(pod.namespace.clone()),
                ..Default::default()
            },
            involved_object,
            reason: Some(self.config.reason.clone()),
            message: Some(record.message()),
            first_timestamp: Some(timestamp.clone()),
            last_timestamp: Some(timestamp),
            count: Some(1),
            type_: Some("Warning".to_string()),
            source: Some(EventSource {
                component: Some(self.config.source_component.clone()),
                host: None,
            }),
            ..Default::default()
        })
    }
}
