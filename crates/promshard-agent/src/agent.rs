//! Core agent implementation

use crate::config::AgentConfig;
use crate::inventory::FileInventory;
use crate::scheduler::GenerationScheduler;
use crate::Result;
use promshard_cache::{GenerationMetrics, GenerationService, Invalidation};
use std::sync::Arc;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// The promshard daemon: inventory watcher plus one scheduler task per kind
pub struct Agent {
    config: AgentConfig,
    inventory: Arc<FileInventory>,
    service: Arc<GenerationService>,
    scheduler: GenerationScheduler,
    shutdown: CancellationToken,
    tasks: Vec<(String, JoinHandle<()>)>,
}

impl Agent {
    /// Validate the configuration and load the inventory
    pub fn new(config: AgentConfig) -> Result<Self> {
        config.validate()?;

        let metrics = Arc::new(GenerationMetrics::new()?);
        let invalidation = Arc::new(Invalidation::new());
        let inventory = Arc::new(FileInventory::open(
            config.inventory.path.clone(),
            invalidation.clone(),
        )?);
        let service = Arc::new(GenerationService::new(
            inventory.store(),
            config.generator.clone(),
            metrics,
        ));
        let scheduler = GenerationScheduler::new(service.clone(), invalidation, &config.scheduler);

        Ok(Self {
            config,
            inventory,
            service,
            scheduler,
            shutdown: CancellationToken::new(),
            tasks: Vec::new(),
        })
    }

    /// Start the inventory watcher and the scheduler tasks
    pub fn start(&mut self) -> Result<()> {
        info!(
            inventory = %self.config.inventory.path.display(),
            config_dir = %self.config.generator.config_dir.display(),
            kinds = ?self.scheduler.kinds(),
            "Starting promshard agent"
        );

        let inventory = self.inventory.clone();
        let interval = self.config.inventory.reload_interval();
        let cancel = self.shutdown.clone();
        self.tasks.push((
            "inventory-watcher".to_string(),
            tokio::spawn(async move { inventory.watch(interval, cancel).await }),
        ));

        for (kind, handle) in self
            .scheduler
            .kinds()
            .iter()
            .zip(self.scheduler.spawn(self.shutdown.clone()))
        {
            self.tasks.push((format!("scheduler-{}", kind), handle));
        }

        info!("promshard agent started");
        Ok(())
    }

    /// Cancel every task and wait for it to finish
    pub async fn stop(&mut self) -> Result<()> {
        info!("Stopping promshard agent");
        self.shutdown.cancel();

        for (name, handle) in self.tasks.drain(..) {
            if let Err(e) = handle.await {
                warn!(task = %name, error = %e, "Task ended abnormally");
            }
        }

        info!("promshard agent stopped");
        Ok(())
    }

    /// Run the agent until a shutdown signal is received
    pub async fn run(&mut self) -> Result<()> {
        self.start()?;

        tokio::select! {
            _ = self.shutdown.cancelled() => {
                info!("Received shutdown request");
            }
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C signal");
            }
            _ = wait_for_termination() => {
                info!("Received termination signal");
            }
        }

        self.stop().await
    }

    /// Token that stops the agent when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn service(&self) -> &Arc<GenerationService> {
        &self.service
    }
}

#[cfg(unix)]
async fn wait_for_termination() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() {
    std::future::pending::<()>().await;
}

impl Drop for Agent {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
