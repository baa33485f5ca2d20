//! A single pool worker.
//!
//! Each worker owns one queue connection and one flush engine at a time. When
//! a cycle fails, the worker logs, waits for the reconnect delay and starts
//! over on a fresh connection.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use log_sink_repository::BulkIndexProvider;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::stats::PipelineStats;
use crate::loader::BulkFlushEngine;
use crate::queue::{QueueBroker, QueueConsumer};

/// Per-worker settings copied from the pool configuration.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub bulk_size: usize,
    pub bulk_timeout: Duration,
    pub reconnect_delay: Duration,
}

pub struct Worker {
    id: usize,
    consumer_name: String,
    broker: Arc<dyn QueueBroker>,
    provider: Arc<dyn BulkIndexProvider>,
    settings: WorkerSettings,
    stats: Arc<PipelineStats>,
}

impl Worker {
    pub fn new(
        id: usize,
        consumer_name: String,
        broker: Arc<dyn QueueBroker>,
        provider: Arc<dyn BulkIndexProvider>,
        settings: WorkerSettings,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            id,
            consumer_name,
            broker,
            provider,
            settings,
            stats,
        }
    }

    /// Run connect/consume/flush cycles until `shutdown` is cancelled.
    ///
    /// Errors and panics inside a cycle never end the worker.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(worker_id = self.id, consumer = %self.consumer_name, "Worker started");

        while !shutdown.is_cancelled() {
            let session = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                session = self.broker.open_session(&self.consumer_name) => session,
            };

            let session = match session {
                Ok(session) => session,
                Err(e) => {
                    warn!(worker_id = self.id, error = %e, "Failed to open queue session");
                    if !self.back_off(&shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            let consumer = QueueConsumer::new(session, self.settings.bulk_timeout);
            let mut engine = BulkFlushEngine::new(
                self.id,
                consumer,
                Arc::clone(&self.provider),
                self.settings.bulk_size,
                Arc::clone(&self.stats),
            );

            match AssertUnwindSafe(engine.run(&shutdown)).catch_unwind().await {
                Ok(Ok(())) => break,
                Ok(Err(e)) if e.is_connection_lost() => {
                    warn!(worker_id = self.id, error = %e, "Connection lost, reconnecting");
                }
                Ok(Err(e)) => {
                    error!(worker_id = self.id, error = %e, "Worker cycle failed, restarting");
                }
                Err(_) => {
                    error!(worker_id = self.id, "Worker cycle panicked, restarting");
                }
            }

            if !self.back_off(&shutdown).await {
                break;
            }
        }

        info!(worker_id = self.id, "Worker stopped");
    }

    /// Sleep for the reconnect delay. Returns `false` if shutdown interrupted it.
    async fn back_off(&self, shutdown: &CancellationToken) -> bool {
        self.stats.record_reconnect();
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => false,
            _ = tokio::time::sleep(self.settings.reconnect_delay) => true,
        }
    }
}
