use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use error_stack::Report;
use error_stack::ResultExt;
use futures::stream::BoxStream;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Event;
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::api::core::v1::Pod;
use kube::api::DynamicObject;
use kube::api::ListParams;
use kube::api::PostParams;
use kube::api::WatchEvent;
use kube::config::KubeConfigOptions;
use kube::config::Kubeconfig;
use kube::Api;
use kube::Client;
use kube::Config;

use crate::k8s::error::classify_kube_error;
use crate::k8s::ClusterError;
use crate::k8s::PodList;
use crate::k8s::PodSnapshot;
use crate::k8s::WatchItem;

pub type WatchStream = BoxStream<'static, Result<WatchItem, Report<ClusterError>>>;

/// Access to the cluster control plane.
///
/// Everything the monitor does against the API server goes through this
/// trait so that tests can substitute an in-memory cluster.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// List every pod in the cluster along with the collection resource version.
    async fn list_pods(&self) -> Result<PodList, Report<ClusterError>>;

    /// Open a pod watch starting after `resource_version`.
    ///
    /// The server closes the stream after `timeout`. A resource version the
    /// server no longer retains is reported as [`ClusterError::CursorExpired`],
    /// either from this call or as an item of the stream.
    async fn watch_pods(
        &self,
        resource_version: &str,
        timeout: Duration,
    ) -> Result<WatchStream, Report<ClusterError>>;

    /// Create a core/v1 event in the event's namespace.
    async fn create_event(&self, event: Event) -> Result<(), Report<ClusterError>>;

    /// Resolve the involved-object reference for a pod.
    fn resolve_reference(&self, pod: &PodSnapshot) -> Result<ObjectReference, Report<ClusterError>> {
        pod.object_reference()
    }
}

/// Builds a client from an explicit kubeconfig or from the environment.
///
/// The read timeout is disabled: watches stay open for minutes without any
/// traffic on a quiet cluster and are bounded by their server-side timeout.
pub async fn init_kube_client(
    master: Option<&str>,
    kubeconfig: Option<PathBuf>,
) -> Result<Client, Report<ClusterError>> {
    let mut config = match kubeconfig {
        Some(kubeconfig_path) => {
            // Load kubeconfig from the specified file
            let kubeconfig = Kubeconfig::read_from(&kubeconfig_path).change_context(
                ClusterError::ConnectionFailed {
                    message: format!(
                        "Failed to read kubeconfig file: {}",
                        kubeconfig_path.display()
                    ),
                },
            )?;

            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .change_context(ClusterError::ConnectionFailed {
                    message: format!(
                        "Failed to create config from kubeconfig: {}",
                        kubeconfig_path.display()
                    ),
                })?
        }
        None => {
            // in-cluster or ~/.kube/config
            Config::infer()
                .await
                .change_context(ClusterError::ConnectionFailed {
                    message: "Failed to infer Kubernetes configuration".to_string(),
                })?
        }
    };

    if let Some(master) = master.filter(|master| !master.is_empty()) {
        config.cluster_url = master.parse::<http::Uri>().change_context(
            ClusterError::ConnectionFailed {
                message: format!("Invalid API server URL: {master}"),
            },
        )?;
    }
    config.read_timeout = None;

    Client::try_from(config).change_context(ClusterError::ConnectionFailed {
        message: "Failed to create Kubernetes client".to_string(),
    })
}

/// [`ClusterClient`] backed by a live API server.
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn watch_request(
        resource_version: &str,
        timeout: Duration,
    ) -> Result<http::Request<Vec<u8>>, Report<ClusterError>> {
        // kube's WatchParams caps the timeout below 295s, so build the request directly
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("watch", "true")
            .append_pair("resourceVersion", resource_version)
            .append_pair("timeoutSeconds", &timeout.as_secs().max(1).to_string())
            .append_pair("allowWatchBookmarks", "true")
            .finish();

        http::Request::get(format!("/api/v1/pods?{query}"))
            .body(Vec::new())
            .change_context(ClusterError::WatchFailed)
            .attach_printable("failed to build watch request")
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn list_pods(&self) -> Result<PodList, Report<ClusterError>> {
        let api: Api<Pod> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| classify_kube_error(e, ClusterError::ListFailed))?;

        let mut items = Vec::with_capacity(list.items.len());
        for pod in list.items {
            match PodSnapshot::try_from(pod) {
                Ok(snapshot) => items.push(snapshot),
                Err(e) => tracing::warn!("Skipping listed pod: {e:?}"),
            }
        }

        Ok(PodList {
            items,
            resource_version: list.metadata.resource_version.unwrap_or_default(),
        })
    }

    async fn watch_pods(
        &self,
        resource_version: &str,
        timeout: Duration,
    ) -> Result<WatchStream, Report<ClusterError>> {
        let request = Self::watch_request(resource_version, timeout)?;
        let stream = self
            .client
            .request_events::<DynamicObject>(request)
            .await
            .map_err(|e| classify_kube_error(e, ClusterError::WatchFailed))?;

        Ok(stream
            .map(|event| match event {
                Ok(event) => watch_item(event),
                Err(e) => Err(classify_kube_error(e, ClusterError::WatchFailed)),
            })
            .boxed())
    }

    async fn create_event(&self, event: Event) -> Result<(), Report<ClusterError>> {
        let namespace = event.metadata.namespace.clone().unwrap_or_default();
        let name = event.metadata.name.clone().unwrap_or_default();
        let api: Api<Event> = Api::namespaced(self.client.clone(), &namespace);

        api.create(&PostParams::default(), &event)
            .await
            .map_err(|e| {
                classify_kube_error(e, ClusterError::EventRejected {
                    namespace: namespace.clone(),
                    name: name.clone(),
                })
            })?;
        Ok(())
    }
}

fn watch_item(event: WatchEvent<DynamicObject>) -> Result<WatchItem, Report<ClusterError>> {
    let item = match event {
        WatchEvent::Added(object) => decode_pod(object).map_or_else(|item| item, WatchItem::Added),
        WatchEvent::Modified(object) => {
            decode_pod(object).map_or_else(|item| item, WatchItem::Modified)
        }
        WatchEvent::Deleted(object) => {
            decode_pod(object).map_or_else(|item| item, WatchItem::Deleted)
        }
        WatchEvent::Bookmark(bookmark) => WatchItem::Bookmark {
            resource_version: bookmark.metadata.resource_version,
        },
        WatchEvent::Error(status) => return Err(Report::new(ClusterError::from_status(&status))),
    };
    Ok(item)
}

/// Decodes a watched object as a pod, or describes it as `WatchItem::Unexpected`.
fn decode_pod(object: DynamicObject) -> Result<PodSnapshot, WatchItem> {
    let kind = object
        .types
        .as_ref()
        .map(|types| format!("{}/{}", types.api_version, types.kind))
        .unwrap_or_else(|| "<untyped>".to_string());
    let resource_version = object
        .metadata
        .resource_version
        .clone()
        .filter(|version| !version.is_empty());
    let unexpected = |kind: String| WatchItem::Unexpected {
        kind,
        resource_version: resource_version.clone(),
    };
    if !kind.ends_with("/Pod") {
        return Err(unexpected(kind));
    }

    let pod = serde_json::to_value(object)
        .and_then(serde_json::from_value::<Pod>)
        .map_err(|e| unexpected(format!("{kind} ({e})")))?;
    PodSnapshot::try_from(pod).map_err(|e| unexpected(format!("{kind} ({e})")))
}
