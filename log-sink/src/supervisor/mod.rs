//! Supervisor module for the log sink.
//!
//! Runs a fixed-size pool of independent workers, reports progress, and stops
//! the pool on request or on a termination signal.

mod stats;
mod worker;

pub use stats::{PipelineStats, StatsSnapshot};
pub use worker::{Worker, WorkerSettings};

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use log_sink_repository::BulkIndexProvider;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::errors::IngestError;
use crate::queue::QueueBroker;

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of workers.
    pub concurrency: usize,
    /// Maximum actions per bulk request.
    pub bulk_size: usize,
    /// How long a worker waits for the next message before flushing.
    pub bulk_timeout: Duration,
    /// Consumer names are `<prefix>-<worker index>`.
    pub consumer_prefix: String,
    /// How long `stop` waits for workers before aborting them.
    pub shutdown_grace: Duration,
    /// Pause before a failed worker reconnects.
    pub reconnect_delay: Duration,
    /// Interval between progress log lines.
    pub progress_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            bulk_size: 100,
            bulk_timeout: Duration::from_secs(60),
            consumer_prefix: "log-sink".to_string(),
            shutdown_grace: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(5),
            progress_interval: Duration::from_secs(10),
        }
    }
}

/// How the workers ended during `stop`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Workers that returned within the grace period.
    pub graceful: usize,
    /// Workers aborted after the grace period.
    pub aborted: usize,
}

/// Fixed-size pool of workers draining the queue into the bulk backend.
///
/// Workers share nothing but the broker, the provider and the counters.
/// Each one opens its own queue session.
pub struct WorkerPool {
    config: PoolConfig,
    broker: Arc<dyn QueueBroker>,
    provider: Arc<dyn BulkIndexProvider>,
    stats: Arc<PipelineStats>,
    shutdown: CancellationToken,
    workers: Vec<JoinHandle<()>>,
    reporter: Option<JoinHandle<()>>,
}

impl WorkerPool {
    /// Create a pool. No worker runs until `start`.
    pub fn new(
        config: PoolConfig,
        broker: Arc<dyn QueueBroker>,
        provider: Arc<dyn BulkIndexProvider>,
    ) -> Self {
        Self {
            config,
            broker,
            provider,
            stats: Arc::new(PipelineStats::new()),
            shutdown: CancellationToken::new(),
            workers: Vec::new(),
            reporter: None,
        }
    }

    /// Configured number of workers.
    pub fn size(&self) -> usize {
        self.config.concurrency
    }

    /// Number of worker tasks that have not finished.
    pub fn running_workers(&self) -> usize {
        self.workers.iter().filter(|h| !h.is_finished()).count()
    }

    /// Token that stops the pool when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Current counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Spawn the workers and the progress reporter.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - All workers were spawned
    /// * `Err(IngestError)` - If the pool is already running, was stopped, or
    ///   has a concurrency of zero
    #[instrument(skip(self), fields(concurrency = self.config.concurrency))]
    pub fn start(&mut self) -> Result<(), IngestError> {
        if !self.workers.is_empty() {
            return Err(IngestError::queue("worker pool is already running"));
        }
        if self.shutdown.is_cancelled() {
            return Err(IngestError::queue("worker pool has been stopped"));
        }
        if self.config.concurrency == 0 {
            return Err(IngestError::queue("worker pool needs at least one worker"));
        }

        let settings = WorkerSettings {
            bulk_size: self.config.bulk_size,
            bulk_timeout: self.config.bulk_timeout,
            reconnect_delay: self.config.reconnect_delay,
        };

        for id in 0..self.config.concurrency {
            let worker = Worker::new(
                id,
                format!("{}-{}", self.config.consumer_prefix, id),
                Arc::clone(&self.broker),
                Arc::clone(&self.provider),
                settings.clone(),
                Arc::clone(&self.stats),
            );
            self.workers.push(tokio::spawn(worker.run(self.shutdown.clone())));
        }

        self.reporter = Some(tokio::spawn(report_progress(
            Arc::clone(&self.stats),
            self.config.progress_interval,
            self.shutdown.clone(),
        )));

        info!(
            concurrency = self.config.concurrency,
            bulk_size = self.config.bulk_size,
            bulk_timeout_secs = self.config.bulk_timeout.as_secs_f64(),
            "Worker pool started"
        );
        Ok(())
    }

    /// Signal every worker to stop and wait for them.
    ///
    /// Workers that have not returned within the shutdown grace period are
    /// aborted. Their unacknowledged messages stay on the queue. When this
    /// returns, no worker task is running.
    pub async fn stop(&mut self) -> ShutdownReport {
        info!("Stopping worker pool");
        self.shutdown.cancel();

        let mut workers = std::mem::take(&mut self.workers);
        let mut report = ShutdownReport::default();

        // Handles before `joined` have completed and must not be polled again.
        let mut joined = 0;
        let drained = tokio::time::timeout(self.config.shutdown_grace, async {
            for handle in workers.iter_mut() {
                log_worker_exit(handle.await);
                joined += 1;
            }
        })
        .await;
        report.graceful = joined;

        if drained.is_err() {
            let stragglers = workers.split_off(joined);
            for handle in &stragglers {
                if handle.is_finished() {
                    report.graceful += 1;
                } else {
                    handle.abort();
                    report.aborted += 1;
                }
            }
            warn!(
                aborted = report.aborted,
                grace_secs = self.config.shutdown_grace.as_secs_f64(),
                "Workers did not stop within the grace period"
            );
            for result in join_all(stragglers).await {
                log_worker_exit(result);
            }
        }

        if let Some(reporter) = self.reporter.take() {
            if let Err(e) = reporter.await {
                warn!(error = %e, "Progress reporter ended abnormally");
            }
        }

        let totals = self.stats.snapshot();
        info!(
            graceful = report.graceful,
            aborted = report.aborted,
            pulled = totals.pulled,
            acknowledged = totals.acknowledged,
            failed = totals.failed,
            "Worker pool stopped"
        );
        report
    }

    /// Start the pool and run until a termination signal arrives or the
    /// shutdown token is cancelled, then stop it.
    pub async fn run(&mut self) -> Result<ShutdownReport, IngestError> {
        self.start()?;

        let token = self.shutdown.clone();
        tokio::select! {
            _ = termination_signal() => info!("Received shutdown signal"),
            _ = token.cancelled() => info!("Shutdown requested"),
        }

        Ok(self.stop().await)
    }
}

fn log_worker_exit(result: Result<(), JoinError>) {
    match result {
        Ok(()) => {}
        Err(e) if e.is_cancelled() => debug!("Worker aborted"),
        Err(e) => error!(error = %e, "Worker task panicked"),
    }
}

/// Resolve on SIGINT, or on SIGTERM where available.
async fn termination_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
                return;
            }
            Err(e) => warn!(error = %e, "Failed to install SIGTERM handler"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

async fn report_progress(stats: Arc<PipelineStats>, every: Duration, shutdown: CancellationToken) {
    let mut timer = interval(every.max(Duration::from_millis(1)));
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately.
    timer.tick().await;

    let mut prev = stats.snapshot();
    let mut prev_time = std::time::Instant::now();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = timer.tick() => {
                let current = stats.snapshot();
                let now = std::time::Instant::now();
                let elapsed_secs = now.duration_since(prev_time).as_secs_f64();

                let acked_per_sec = if elapsed_secs > 0.0 {
                    (current.acknowledged.saturating_sub(prev.acknowledged) as f64) / elapsed_secs
                } else {
                    0.0
                };

                info!(
                    pulled = current.pulled,
                    submitted = current.submitted,
                    acknowledged = current.acknowledged,
                    failed = current.failed,
                    reconnects = current.reconnects,
                    acknowledged_per_sec = format!("{:.2}", acked_per_sec),
                    "Indexing progress"
                );

                prev = current;
                prev_time = now;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::InMemoryBroker;
    use async_trait::async_trait;
    use log_sink_repository::{BulkIndexError, BulkWriteSummary};
    use log_sink_shared::IndexAction;

    struct NullProvider;

    #[async_trait]
    impl BulkIndexProvider for NullProvider {
        async fn ensure_ready(&self) -> Result<(), BulkIndexError> {
            Ok(())
        }

        async fn bulk_write(
            &self,
            _actions: &[IndexAction],
        ) -> Result<BulkWriteSummary, BulkIndexError> {
            Ok(BulkWriteSummary::default())
        }
    }

    fn pool(concurrency: usize) -> WorkerPool {
        let config = PoolConfig {
            concurrency,
            bulk_timeout: Duration::from_millis(20),
            shutdown_grace: Duration::from_secs(1),
            ..PoolConfig::default()
        };
        WorkerPool::new(config, Arc::new(InMemoryBroker::new()), Arc::new(NullProvider))
    }

    #[test]
    fn test_default_config() {
        let config = PoolConfig::default();
        assert!(config.concurrency >= 1);
        assert_eq!(config.bulk_size, 100);
        assert_eq!(config.bulk_timeout, Duration::from_secs(60));
        assert_eq!(config.consumer_prefix, "log-sink");
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let mut pool = pool(2);
        pool.start().unwrap();
        assert!(pool.start().is_err());
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_rejected() {
        let mut pool = pool(0);
        assert!(pool.start().is_err());
    }

    #[tokio::test]
    async fn test_idle_pool_stops_gracefully() {
        let mut pool = pool(3);
        pool.start().unwrap();
        assert_eq!(pool.size(), 3);

        let report = pool.stop().await;

        assert_eq!(report, ShutdownReport { graceful: 3, aborted: 0 });
        assert_eq!(pool.running_workers(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_token_ends_run() {
        let mut pool = pool(1);
        let token = pool.shutdown_token();
        token.cancel();

        // A cancelled pool refuses to start.
        assert!(pool.run().await.is_err());
    }
}
