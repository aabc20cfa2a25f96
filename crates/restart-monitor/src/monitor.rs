//! The consumer loop: store, detect, emit.

use core::error::Error;

use error_stack::Report;
use tokio::sync::mpsc;
use tracing::debug;

use crate::detector::detect_restarts;
use crate::emitter::EventEmitter;
use crate::k8s::ClusterClient;
use crate::state::PodStore;
use crate::watch::LifecycleEvent;

#[derive(Debug, derive_more::Display)]
pub enum MonitorError {
    #[display("Pod watch failed")]
    WatchFailed,
    #[display("Pod watch stopped delivering events")]
    StreamClosed,
}

impl Error for MonitorError {}

/// Applies lifecycle events in delivery order and reports container restarts.
pub struct RestartMonitor<C: ?Sized> {
    store: PodStore,
    emitter: EventEmitter<C>,
}

impl<C: ClusterClient + ?Sized> RestartMonitor<C> {
    pub fn new(emitter: EventEmitter<C>) -> Self {
        Self {
            store: PodStore::new(),
            emitter,
        }
    }

    pub fn store(&self) -> &PodStore {
        &self.store
    }

    /// Drain the queue until the watch fails.
    ///
    /// Never returns `Ok`: the producer runs forever unless it fails, so a
    /// closed queue is an error as well.
    pub async fn run(
        &mut self,
        mut events: mpsc::Receiver<LifecycleEvent>,
    ) -> Result<(), Report<MonitorError>> {
        while let Some(event) = events.recv().await {
            self.handle(event).await?;
        }
        Err(Report::new(MonitorError::StreamClosed))
    }

    /// Apply one event and return the number of restarts detected.
    pub async fn handle(&mut self, event: LifecycleEvent) -> Result<usize, Report<MonitorError>> {
        let (resource_version, change) = match event {
            LifecycleEvent::Pod {
                resource_version,
                change,
            } => (resource_version, change),
            LifecycleEvent::Error(report) => {
                return Err(report.change_context(MonitorError::WatchFailed))
            }
        };

        let uid = change.pod().uid.clone();
        debug!(%uid, %resource_version, "Applying pod change");

        let Some(previous) = self.store.apply(change) else {
            return Ok(0);
        };
        let Some(current) = self.store.get(&uid) else {
            return Ok(0);
        };

        let restarts = detect_restarts(current, &previous);
        for record in &restarts {
            self.emitter.emit(current, record).await;
        }
        Ok(restarts.len())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use similar_asserts::assert_eq;
    use test_log::test;

    use super::*;
    use crate::emitter::EmitterConfig;
    use crate::k8s::fake::container;
    use crate::k8s::fake::expired;
    use crate::k8s::fake::pod;
    use crate::k8s::fake::restarted;
    use crate::k8s::fake::FakeClusterClient;
    use crate::k8s::fake::WatchSession;
    use crate::k8s::WatchItem;
    use crate::watch::PodChange;
    use crate::watch::WatchConfig;
    use crate::watch::WatchCoordinator;
    use crate::watch::WatchError;

    fn monitor(client: &Arc<FakeClusterClient>) -> RestartMonitor<FakeClusterClient> {
        RestartMonitor::new(EventEmitter::new(client.clone(), EmitterConfig::default()))
    }

    /// Runs coordinator and monitor against `client` until `events` events were recorded.
    async fn run_until_events(client: &Arc<FakeClusterClient>, events: usize) -> RestartMonitor<FakeClusterClient> {
        let (sender, receiver) = mpsc::channel(128);
        let coordinator = WatchCoordinator::new(client.clone(), WatchConfig::default());
        let watch = tokio::spawn(coordinator.run(sender));

        let mut monitor = monitor(client);
        let waited = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::select! {
                result = monitor.run(receiver) => panic!("monitor stopped: {result:?}"),
                _ = async {
                    // let the watch drain completely, then check the event count
                    while client.watches().len() < 2 || client.events().len() < events {
                        tokio::task::yield_now().await;
                    }
                    for _ in 0..100 {
                        tokio::task::yield_now().await;
                    }
                } => {}
            }
        })
        .await;
        watch.abort();
        assert!(waited.is_ok(), "scenario did not settle");
        monitor
    }

    fn modified(pod: crate::k8s::PodSnapshot) -> Result<WatchItem, crate::k8s::ClusterError> {
        Ok(WatchItem::Modified(pod))
    }

    #[test(tokio::test)]
    async fn oom_killed_restart_records_one_event() {
        let client = Arc::new(FakeClusterClient::new());
        client.push_list("10", vec![pod("uid-p", "p", "5", vec![container("c", 0)])]);
        client.push_watch(WatchSession::Items(vec![modified(pod(
            "uid-p",
            "p",
            "11",
            vec![restarted("c", 1, "OOMKilled", 137)],
        ))]));

        run_until_events(&client, 1).await;

        let events = client.events();
        assert_eq!(events.len(), 1);
        let message = events[0].message.clone().unwrap_or_default();
        assert!(message.contains("Container c in pod default/p restarted."));
        assert!(message.contains("Reason: OOMKilled, exit code: 137."));
        assert_eq!(events[0].involved_object.uid.as_deref(), Some("uid-p"));
    }

    #[test(tokio::test)]
    async fn recreated_pod_with_same_name_has_no_baseline() {
        let client = Arc::new(FakeClusterClient::new());
        client.push_list("10", vec![pod("uid-old", "p", "5", vec![container("c", 0)])]);
        client.push_watch(WatchSession::Items(vec![
            Ok(WatchItem::Deleted(pod("uid-old", "p", "11", vec![container("c", 0)]))),
            // the replacement already restarted once before it was first seen
            Ok(WatchItem::Added(pod("uid-new", "p", "12", vec![restarted("c", 1, "Error", 1)]))),
            modified(pod("uid-new", "p", "13", vec![restarted("c", 1, "Error", 1)])),
        ]));

        let monitor = run_until_events(&client, 0).await;

        assert!(client.events().is_empty());
        assert!(!monitor.store().contains("uid-old"));
        assert_eq!(
            monitor.store().get("uid-new").map(|pod| pod.resource_version.as_str()),
            Some("13")
        );
    }

    #[test(tokio::test)]
    async fn new_uid_first_seen_as_modified_is_not_diffed() {
        let client = Arc::new(FakeClusterClient::new());
        client.push_list("10", vec![pod("uid-old", "p", "5", vec![container("c", 0)])]);
        client.push_watch(WatchSession::Items(vec![
            Ok(WatchItem::Deleted(pod("uid-old", "p", "11", vec![container("c", 0)]))),
            modified(pod("uid-new", "p", "12", vec![restarted("c", 1, "Error", 1)])),
        ]));

        run_until_events(&client, 0).await;

        assert!(client.events().is_empty());
    }

    #[test(tokio::test)]
    async fn unchanged_counters_record_nothing() {
        let client = Arc::new(FakeClusterClient::new());
        client.push_list("10", vec![pod("uid-p", "p", "5", vec![container("c", 0)])]);
        client.push_watch(WatchSession::Items(vec![
            modified(pod("uid-p", "p", "11", vec![container("c", 0)])),
            modified(pod("uid-p", "p", "12", vec![container("c", 0)])),
        ]));

        let monitor = run_until_events(&client, 0).await;

        assert!(client.events().is_empty());
        assert_eq!(
            monitor.store().get("uid-p").map(|pod| pod.resource_version.as_str()),
            Some("12")
        );
    }

    #[test(tokio::test)]
    async fn relist_after_expiry_does_not_report_restarts() {
        let client = Arc::new(FakeClusterClient::new());
        client.push_list("10", vec![pod("uid-p", "p", "5", vec![container("c", 0)])]);
        client.push_watch(WatchSession::Items(vec![Err(expired())]));
        // restarted while the cursor was stale; the re-list is the new baseline
        client.push_list(
            "50",
            vec![pod("uid-p", "p", "40", vec![restarted("c", 2, "Error", 1)])],
        );

        let monitor = run_until_events(&client, 0).await;

        assert!(client.events().is_empty());
        assert_eq!(client.list_calls(), 2);
        assert_eq!(
            monitor.store().get("uid-p").map(|pod| pod.containers[0].restart_count),
            Some(2)
        );
    }

    #[test(tokio::test)]
    async fn restart_after_relist_is_diffed_against_relisted_snapshot() {
        let client = Arc::new(FakeClusterClient::new());
        client.push_list("10", vec![pod("uid-p", "p", "5", vec![container("c", 0)])]);
        client.push_watch(WatchSession::Items(vec![Err(expired())]));
        client.push_list("50", vec![pod("uid-p", "p", "40", vec![restarted("c", 2, "Error", 1)])]);
        client.push_watch(WatchSession::Items(vec![
            modified(pod("uid-p", "p", "51", vec![restarted("c", 2, "Error", 1)])),
            modified(pod("uid-p", "p", "52", vec![restarted("c", 3, "Error", 1)])),
        ]));

        run_until_events(&client, 1).await;

        assert_eq!(client.events().len(), 1);
    }

    #[test(tokio::test)]
    async fn rejected_event_does_not_stop_detection() {
        let client = Arc::new(FakeClusterClient::new());
        client.reject_events();
        let mut monitor = monitor(&client);

        monitor
            .handle(LifecycleEvent::pod(PodChange::Added(pod("a", "a", "1", vec![container("c", 0)]))))
            .await
            .unwrap();
        let detected = monitor
            .handle(LifecycleEvent::pod(PodChange::Modified(pod(
                "a",
                "a",
                "2",
                vec![restarted("c", 1, "Error", 1)],
            ))))
            .await
            .unwrap();
        assert_eq!(detected, 1);

        monitor
            .handle(LifecycleEvent::pod(PodChange::Added(pod("b", "b", "3", vec![container("c", 0)]))))
            .await
            .unwrap();
        assert!(monitor.store().contains("b"));
    }

    #[test(tokio::test)]
    async fn unanswered_event_does_not_stall_detection() {
        let client = Arc::new(FakeClusterClient::new());
        client.hang_events();
        let mut monitor = RestartMonitor::new(EventEmitter::new(
            client.clone(),
            EmitterConfig {
                submit_timeout: Duration::from_millis(50),
                ..Default::default()
            },
        ));

        let detected = tokio::time::timeout(Duration::from_secs(5), async {
            monitor
                .handle(LifecycleEvent::pod(PodChange::Added(pod("a", "a", "1", vec![container("c", 0)]))))
                .await
                .unwrap();
            monitor
                .handle(LifecycleEvent::pod(PodChange::Modified(pod(
                    "a",
                    "a",
                    "2",
                    vec![restarted("c", 1, "Error", 1)],
                ))))
                .await
                .unwrap()
        })
        .await
        .expect("consumer stalled on event submission");
        assert_eq!(detected, 1);

        monitor
            .handle(LifecycleEvent::pod(PodChange::Added(pod("b", "b", "3", vec![container("c", 0)]))))
            .await
            .unwrap();
        assert!(monitor.store().contains("b"));
    }

    #[test(tokio::test)]
    async fn watch_failure_ends_the_loop() {
        let client = Arc::new(FakeClusterClient::new());
        let mut monitor = monitor(&client);
        let (sender, receiver) = mpsc::channel(4);

        sender
            .send(LifecycleEvent::Error(Report::new(WatchError::ListFailed)))
            .await
            .unwrap();

        let err = monitor.run(receiver).await.unwrap_err();
        assert!(matches!(err.current_context(), MonitorError::WatchFailed));
    }

    #[test(tokio::test)]
    async fn closed_queue_ends_the_loop() {
        let client = Arc::new(FakeClusterClient::new());
        let mut monitor = monitor(&client);
        let (sender, receiver) = mpsc::channel(4);
        drop(sender);

        let err = monitor.run(receiver).await.unwrap_err();
        assert!(matches!(err.current_context(), MonitorError::StreamClosed));
    }
}
