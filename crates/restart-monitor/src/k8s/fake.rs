//! In-memory cluster used by the tests.

use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::TimeZone;
use chrono::Utc;
use error_stack::Report;
use futures::future;
use futures::stream;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Event;

use crate::k8s::ClusterClient;
use crate::k8s::ClusterError;
use crate::k8s::ContainerState;
use crate::k8s::PodList;
use crate::k8s::PodSnapshot;
use crate::k8s::Termination;
use crate::k8s::WatchItem;
use crate::k8s::WatchStream;

/// One scripted watch connection.
pub(crate) enum WatchSession {
    /// The watch opens and yields these items, then the server closes it.
    Items(Vec<Result<WatchItem, ClusterError>>),
    /// The watch request itself fails.
    Rejected(ClusterError),
}

/// Replays scripted list and watch responses and records created events.
///
/// Once the scripted watch sessions run out, further watches stay open
/// without delivering anything.
#[derive(Default)]
pub(crate) struct FakeClusterClient {
    lists: Mutex<VecDeque<Result<PodList, ClusterError>>>,
    sessions: Mutex<VecDeque<WatchSession>>,
    watches: Mutex<Vec<(String, Duration)>>,
    events: Mutex<Vec<Event>>,
    reject_events: AtomicBool,
    hang_events: AtomicBool,
    list_calls: AtomicUsize,
}

impl FakeClusterClient {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_list(&self, resource_version: &str, items: Vec<PodSnapshot>) {
        self.lists.lock().unwrap().push_back(Ok(PodList {
            items,
            resource_version: resource_version.to_string(),
        }));
    }

    pub(crate) fn push_list_error(&self, error: ClusterError) {
        self.lists.lock().unwrap().push_back(Err(error));
    }

    pub(crate) fn push_watch(&self, session: WatchSession) {
        self.sessions.lock().unwrap().push_back(session);
    }

    pub(crate) fn reject_events(&self) {
        self.reject_events.store(true, Ordering::SeqCst);
    }

    /// Event submissions never get an answer.
    pub(crate) fn hang_events(&self) {
        self.hang_events.store(true, Ordering::SeqCst);
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Resource versions and timeouts of every watch opened so far.
    pub(crate) fn watches(&self) -> Vec<(String, Duration)> {
        self.watches.lock().unwrap().clone()
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClusterClient for FakeClusterClient {
    async fn list_pods(&self) -> Result<PodList, Report<ClusterError>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        match self.lists.lock().unwrap().pop_front() {
            Some(Ok(list)) => Ok(list),
            Some(Err(error)) => Err(Report::new(error)),
            None => Err(Report::new(ClusterError::ListFailed)),
        }
    }

    async fn watch_pods(
        &self,
        resource_version: &str,
        timeout: Duration,
    ) -> Result<WatchStream, Report<ClusterError>> {
        self.watches
            .lock()
            .unwrap()
            .push((resource_version.to_string(), timeout));

        match self.sessions.lock().unwrap().pop_front() {
            Some(WatchSession::Items(items)) => Ok(stream::iter(
                items.into_iter().map(|item| item.map_err(Report::new)),
            )
            .boxed()),
            Some(WatchSession::Rejected(error)) => Err(Report::new(error)),
            None => Ok(stream::pending::<Result<WatchItem, Report<ClusterError>>>().boxed()),
        }
    }

    async fn create_event(&self, event: Event) -> Result<(), Report<ClusterError>> {
        if self.hang_events.load(Ordering::SeqCst) {
            future::pending::<()>().await;
        }
        if self.reject_events.load(Ordering::SeqCst) {
            return Err(Report::new(ClusterError::EventRejected {
                namespace: event.metadata.namespace.unwrap_or_default(),
                name: event.metadata.name.unwrap_or_default(),
            }));
        }
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

pub(crate) fn expired() -> ClusterError {
    ClusterError::CursorExpired {
        message: "too old resource version".to_string(),
    }
}

pub(crate) fn pod(uid: &str, name: &str, resource_version: &str, containers: Vec<ContainerState>) -> PodSnapshot {
    PodSnapshot {
        uid: uid.to_string(),
        namespace: "default".to_string(),
        name: name.to_string(),
        resource_version: resource_version.to_string(),
        containers,
        init_containers: Vec::new(),
    }
}

pub(crate) fn container(name: &str, restart_count: u32) -> ContainerState {
    ContainerState {
        name: name.to_string(),
        restart_count,
        last_termination: None,
    }
}

pub(crate) fn restarted(name: &str, restart_count: u32, reason: &str, exit_code: i32) -> ContainerState {
    ContainerState {
        name: name.to_string(),
        restart_count,
        last_termination: Some(Termination {
            exit_code,
            reason: reason.to_string(),
            message: None,
            finished_at: Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
        }),
    }
}
