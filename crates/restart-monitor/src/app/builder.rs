use std::sync::Arc;

use anyhow::Result;

use crate::app::core::Application;
use crate::config::Cli;
use crate::config::MonitorConfig;
use crate::k8s::init_kube_client;
use crate::k8s::ClusterClient;
use crate::k8s::KubeClusterClient;

/// Builds an [`Application`] from the command line.
pub struct ApplicationBuilder {
    cli: Cli,
}

impl ApplicationBuilder {
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    pub async fn build(self) -> Result<Application> {
        let config = MonitorConfig::from(&self.cli);

        let client = init_kube_client(self.cli.master.as_deref(), self.cli.kubeconfig.clone())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to initialize Kubernetes client: {e:?}"))?;
        let client: Arc<dyn ClusterClient> = Arc::new(KubeClusterClient::new(client));

        tracing::info!(
            reason = %config.emitter.reason,
            watch_timeout_base = ?config.watch.timeout_base,
            queue_capacity = config.queue_capacity,
            "Kubernetes client initialized"
        );

        Ok(Application::new(client, config))
    }
}
