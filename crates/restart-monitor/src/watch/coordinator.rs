use std::sync::Arc;

use error_stack::Report;
use error_stack::ResultExt;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::k8s::ClusterClient;
use crate::k8s::ClusterError;
use crate::k8s::WatchItem;
use crate::watch::Cursor;
use crate::watch::LifecycleEvent;
use crate::watch::PodChange;
use crate::watch::WatchConfig;
use crate::watch::WatchError;

enum WatchState {
    /// Full list pending, every pod is re-delivered as added.
    Listing,
    /// Incremental watch from the cursor.
    Watching(Cursor),
}

enum SessionEnd {
    /// The server or the timeout closed the watch; resume from the cursor.
    Closed,
    /// The cursor is no longer retained by the server.
    Expired,
}

/// Produces the pod lifecycle stream for the consumer loop.
///
/// Lists every pod once, then watches from the list's resource version.
/// Closed watches are reopened from the last delivered resource version; an
/// expired cursor triggers a fresh list. Any other failure is forwarded as
/// [`LifecycleEvent::Error`] and ends the coordinator.
pub struct WatchCoordinator<C: ?Sized> {
    client: Arc<C>,
    config: WatchConfig,
}

impl<C: ClusterClient + ?Sized> WatchCoordinator<C> {
    pub fn new(client: Arc<C>, config: WatchConfig) -> Self {
        Self { client, config }
    }

    /// Run until the queue closes or the watch fails.
    #[tracing::instrument(skip_all)]
    pub async fn run(self, sender: mpsc::Sender<LifecycleEvent>) {
        info!("Starting pod watch");

        let report = match self.drive(&sender).await {
            Ok(never) => match never {},
            Err(report) => report,
        };
        if matches!(report.current_context(), WatchError::QueueClosed) {
            info!("Lifecycle event queue closed, stopping pod watch");
            return;
        }

        error!("Pod watch failed: {report:?}");
        if sender.send(LifecycleEvent::Error(report)).await.is_err() {
            warn!("Consumer loop is gone, watch failure not delivered");
        }
    }

    async fn drive(
        &self,
        sender: &mpsc::Sender<LifecycleEvent>,
    ) -> Result<std::convert::Infallible, Report<WatchError>> {
        let mut state = WatchState::Listing;
        loop {
            state = match state {
                WatchState::Listing => WatchState::Watching(self.list(sender).await?),
                WatchState::Watching(mut cursor) => {
                    match self.watch(&mut cursor, sender).await? {
                        SessionEnd::Closed => WatchState::Watching(cursor),
                        SessionEnd::Expired => {
                            info!(
                                resource_version = %cursor,
                                "Watch resource version expired, restarting from a full list"
                            );
                            WatchState::Listing
                        }
                    }
                }
            };
        }
    }

    /// Deliver every existing pod as added and return the list's cursor.
    async fn list(&self, sender: &mpsc::Sender<LifecycleEvent>) -> Result<Cursor, Report<WatchError>> {
        let list = self
            .client
            .list_pods()
            .await
            .change_context(WatchError::ListFailed)?;

        info!(
            pods = list.items.len(),
            resource_version = %list.resource_version,
            "Listed pods"
        );

        for pod in list.items {
            deliver(sender, LifecycleEvent::pod(PodChange::Added(pod))).await?;
        }

        Ok(Cursor::new(list.resource_version))
    }

    /// Run one watch connection, advancing `cursor` past every delivered item.
    async fn watch(
        &self,
        cursor: &mut Cursor,
        sender: &mpsc::Sender<LifecycleEvent>,
    ) -> Result<SessionEnd, Report<WatchError>> {
        let timeout = self.config.randomized_timeout();
        info!(
            resource_version = %cursor,
            timeout_secs = timeout.as_secs(),
            "Watching pods"
        );

        let mut stream = match self.client.watch_pods(cursor.as_str(), timeout).await {
            Ok(stream) => stream,
            Err(report) => return classify_failure(report, cursor),
        };

        while let Some(item) = stream.next().await {
            let change = match item {
                Ok(WatchItem::Added(pod)) => PodChange::Added(pod),
                Ok(WatchItem::Modified(pod)) => PodChange::Modified(pod),
                Ok(WatchItem::Deleted(pod)) => PodChange::Deleted(pod),
                Ok(WatchItem::Bookmark { resource_version }) => {
                    cursor.advance(&resource_version);
                    continue;
                }
                Ok(WatchItem::Unexpected {
                    kind,
                    resource_version,
                }) => {
                    warn!(%kind, "Skipping unexpected object on pod watch");
                    if let Some(resource_version) = resource_version {
                        cursor.advance(&resource_version);
                    }
                    continue;
                }
                Err(report) => return classify_failure(report, cursor),
            };

            cursor.advance(&change.pod().resource_version);
            deliver(sender, LifecycleEvent::pod(change)).await?;
        }

        debug!(resource_version = %cursor, "Pod watch closed by server");
        Ok(SessionEnd::Closed)
    }
}

fn classify_failure(
    report: Report<ClusterError>,
    cursor: &Cursor,
) -> Result<SessionEnd, Report<WatchError>> {
    if report.current_context().is_cursor_expired() {
        return Ok(SessionEnd::Expired);
    }
    Err(report.change_context(WatchError::WatchFailed {
        resource_version: cursor.to_string(),
    }))
}

async fn deliver(
    sender: &mpsc::Sender<LifecycleEvent>,
    event: LifecycleEvent,
) -> Result<(), Report<WatchError>> {
    sender
        .send(event)
        .await
        .map_err(|_| Report::new(WatchError::QueueClosed))
}
