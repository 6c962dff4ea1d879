use std::future::Future;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::broker::Broker;
use crate::config::BrokerConfig;
use crate::embeddings::EmbeddingStrategy;
use crate::errors::EmbedError;
use crate::handle::EmbedHandle;
use crate::pending::PendingTable;
use crate::shutdown::{Lifecycle, ServerControl, ShutdownCoordinator};

/// Process-wide embedding service: broker, worker pool, and shutdown
/// coordinator with an explicit open/close lifecycle.
///
/// Opened once per process and passed by reference to everything that
/// embeds; there are no ambient globals.
pub struct EmbedService {
    broker: Broker,
    coordinator: Arc<ShutdownCoordinator>,
    core: Mutex<Option<JoinHandle<()>>>,
    default_timeout: Duration,
}

impl EmbedService {
    /// Starts the worker pool and broker loop.
    pub fn open(config: BrokerConfig, strategy: Arc<dyn EmbeddingStrategy>) -> Self {
        let pending = PendingTable::new();
        let closed = Arc::new(AtomicBool::new(false));
        let coordinator = Arc::new(ShutdownCoordinator::new(
            pending.clone(),
            closed.clone(),
            config.grace_timeout,
        ));
        let (broker, core) = Broker::start(
            &config,
            strategy,
            pending,
            closed,
            coordinator.lifecycle(),
        );
        info!(
            pool_size = config.pool_size,
            max_pending = config.max_pending,
            "embedding service opened"
        );
        Self {
            broker,
            coordinator,
            core: Mutex::new(Some(core)),
            default_timeout: config.default_timeout,
        }
    }

    /// Submits `text` and waits for the embedding vector.
    ///
    /// The timeout is enforced on both legs: the broker expires the request
    /// once dispatched, and this wrapper covers time spent queued behind a
    /// saturated pool.
    pub async fn request_embedding(
        &self,
        text: impl Into<String>,
        timeout: Duration,
    ) -> Result<Vec<f32>, EmbedError> {
        let mut handle = self.broker.submit(text, timeout).await?;
        match tokio::time::timeout(timeout, handle.result()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                handle.cancel();
                Err(EmbedError::Timeout)
            }
        }
    }

    /// [`request_embedding`](Self::request_embedding) with the configured
    /// default timeout.
    pub async fn embed(&self, text: impl Into<String>) -> Result<Vec<f32>, EmbedError> {
        self.request_embedding(text, self.default_timeout).await
    }

    /// Submits `text` and returns the handle, for callers that need to
    /// cancel individually.
    pub async fn submit(
        &self,
        text: impl Into<String>,
        timeout: Duration,
    ) -> Result<EmbedHandle, EmbedError> {
        self.broker.submit(text, timeout).await
    }

    pub fn lifecycle(&self) -> watch::Receiver<Lifecycle> {
        self.coordinator.lifecycle()
    }

    pub fn state(&self) -> Lifecycle {
        self.coordinator.state()
    }

    /// The hosting server's stop handshake.
    pub fn server_control(&self) -> ServerControl {
        ServerControl::new(self.coordinator.lifecycle())
    }

    /// Begins the drain protocol; idempotent.
    pub async fn shutdown(&self) {
        self.coordinator.drain().await;
    }

    /// Serves until `signal` resolves, then drains.
    pub async fn run_until(&self, signal: impl Future<Output = ()>) {
        self.coordinator.run(signal).await;
    }

    /// Drains (if not already done) and joins the broker loop.
    pub async fn close(&self) {
        self.coordinator.drain().await;
        let core = self.core.lock().unwrap().take();
        if let Some(core) = core {
            let _ = core.await;
        }
        info!("embedding service closed");
    }
}
