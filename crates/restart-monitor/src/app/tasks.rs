use anyhow::Result;
use error_stack::Report;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::app::core::Application;
use crate::emitter::EventEmitter;
use crate::monitor::MonitorError;
use crate::monitor::RestartMonitor;
use crate::watch::LifecycleEvent;
use crate::watch::WatchCoordinator;

/// Task manager, responsible for starting the pod watch and the consumer loop
#[derive(Default)]
pub struct Tasks {
    watch_task: Option<JoinHandle<()>>,
    monitor_task: Option<JoinHandle<Result<(), Report<MonitorError>>>>,
}

impl Tasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the watch producer and the restart consumer, joined by a bounded queue
    pub fn spawn_all_tasks(&mut self, app: &Application) {
        let (sender, receiver) = mpsc::channel::<LifecycleEvent>(app.config().queue_capacity);

        self.watch_task = Some(self.spawn_watch_task(app, sender));
        self.monitor_task = Some(self.spawn_monitor_task(app, receiver));
    }

    /// Wait for the consumer loop to fail or for a shutdown signal
    pub async fn wait_for_completion(&mut self) -> Result<()> {
        let Some(monitor_task) = self.monitor_task.as_mut() else {
            anyhow::bail!("Restart monitor tasks were not started");
        };

        tokio::select! {
            signal = shutdown_signal() => {
                let signal = signal?;
                tracing::info!("Received {signal}, shutting down");
                Ok(())
            }
            result = monitor_task => {
                match result {
                    Ok(Ok(())) => {
                        tracing::warn!("Restart monitor completed unexpectedly");
                        Ok(())
                    }
                    Ok(Err(report)) => Err(anyhow::anyhow!("{report:?}")),
                    Err(e) => {
                        tracing::error!("Restart monitor task failed: {e}");
                        Err(e.into())
                    }
                }
            }
        }
    }

    /// Abort whatever is still running; there is nothing to flush.
    pub fn abort_all(&mut self) {
        if let Some(task) = self.watch_task.take() {
            task.abort();
        }
        if let Some(task) = self.monitor_task.take() {
            task.abort();
        }
    }

    fn spawn_watch_task(
        &self,
        app: &Application,
        sender: mpsc::Sender<LifecycleEvent>,
    ) -> JoinHandle<()> {
        let coordinator = WatchCoordinator::new(app.client(), app.config().watch.clone());
        tokio::spawn(async move {
            tracing::info!("Starting pod watch task");
            coordinator.run(sender).await;
            tracing::info!("Pod watch task completed");
        })
    }

    fn spawn_monitor_task(
        &self,
        app: &Application,
        receiver: mpsc::Receiver<LifecycleEvent>,
    ) -> JoinHandle<Result<(), Report<MonitorError>>> {
        let emitter = EventEmitter::new(app.client(), app.config().emitter.clone());
        tokio::spawn(async move {
            tracing::info!("Starting restart monitor task");
            let mut monitor = RestartMonitor::new(emitter);
            monitor.run(receiver).await
        })
    }
}

async fn shutdown_signal() -> Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => Ok("SIGTERM"),
            _ = sigint.recv() => Ok("SIGINT"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok("Ctrl+C")
    }
}
