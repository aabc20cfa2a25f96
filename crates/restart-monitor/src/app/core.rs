use std::sync::Arc;

use anyhow::Result;

use crate::app::tasks::Tasks;
use crate::config::MonitorConfig;
use crate::k8s::ClusterClient;

/// Application core structure with explicit dependencies
pub struct Application {
    client: Arc<dyn ClusterClient>,
    config: MonitorConfig,
}

impl Application {
    pub fn new(client: Arc<dyn ClusterClient>, config: MonitorConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn client(&self) -> Arc<dyn ClusterClient> {
        self.client.clone()
    }

    /// Run until the pod watch fails or a termination signal arrives.
    ///
    /// A watch failure is returned as an error so that the process exits
    /// non-zero and its supervisor restarts it.
    pub async fn run(&self) -> Result<()> {
        tracing::info!("Starting restart monitor tasks...");

        let mut tasks = Tasks::new();
        tasks.spawn_all_tasks(self);

        let result = tasks.wait_for_completion().await;
        tasks.abort_all();

        if let Err(e) = &result {
            tracing::error!("Restart monitor failed: {e:?}");
        }
        result
    }
}
