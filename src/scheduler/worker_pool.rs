//! Worker pool draining the in-memory task queue.
//!
//! This module provides the coordinator that spawns a fixed number of async
//! workers over one shared queue. Each worker wraps the completion client in
//! a retry loop and appends the resulting pair to the shared result store.
//!
//! # Features
//!
//! - Configurable number of workers
//! - Per-task retry with configurable backoff (unbounded by default)
//! - Optional dead-letter file for tasks that exhaust a retry cap
//! - Pool statistics tracking

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use rand::RngExt;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::llm::CompletionProvider;
use crate::store::ResultStore;

use super::queue::{self, QueueError, TaskQueue};
use super::task::Task;

/// Default number of concurrent workers.
pub const DEFAULT_WORKERS: usize = 6;

/// Default wait between retry attempts.
const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// Default cap on a grown backoff interval.
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Errors that can occur in the worker pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Failed to enqueue a task.
    #[error("Task queue error: {0}")]
    Queue(#[from] QueueError),
}

/// Retry discipline applied around each completion call.
///
/// The default preserves the baseline behavior: retry forever with a fixed
/// one-second wait, so every task is eventually processed. A retry cap,
/// exponential growth, and jitter are opt-in.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum attempts per task. `None` retries indefinitely.
    pub max_attempts: Option<u32>,
    /// Wait before the first retry.
    pub initial_backoff: Duration,
    /// Growth factor applied per retry. 1.0 keeps the backoff fixed.
    pub backoff_multiplier: f64,
    /// Upper bound on the grown backoff.
    pub max_backoff: Duration,
    /// Randomize each wait within [base/2, base] to decorrelate workers.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            initial_backoff: DEFAULT_BACKOFF,
            backoff_multiplier: 1.0,
            max_backoff: DEFAULT_MAX_BACKOFF,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Sets the retry cap.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Sets the initial backoff.
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Sets the backoff growth factor.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Sets the backoff cap.
    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    /// Enables jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Returns whether `attempts` completed attempts exhaust the cap.
    pub fn exhausted(&self, attempts: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempts >= max,
            None => false,
        }
    }

    /// Computes the wait after the `attempt`-th failed call (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let grown = self.initial_backoff.as_millis() as f64
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let capped = grown.min(self.max_backoff.as_millis() as f64).max(0.0) as u64;

        if self.jitter && capped > 1 {
            let half = capped / 2;
            Duration::from_millis(half + rand::rng().random_range(0..=capped - half))
        } else {
            Duration::from_millis(capped)
        }
    }
}

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker tasks to spawn.
    pub num_workers: usize,
    /// Model ID passed to the completion provider.
    pub model: String,
    /// Retry discipline for each task.
    pub retry: RetryPolicy,
    /// Where to write tasks that exhausted the retry cap, if anywhere.
    pub dead_letter_path: Option<PathBuf>,
}

impl WorkerPoolConfig {
    /// Creates a configuration for the given model with default workers and
    /// unbounded retry.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            num_workers: DEFAULT_WORKERS,
            model: model.into(),
            retry: RetryPolicy::default(),
            dead_letter_path: None,
        }
    }

    /// Sets the number of workers.
    pub fn with_num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers.max(1);
        self
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the dead-letter output path.
    pub fn with_dead_letter_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.dead_letter_path = Some(path.into());
        self
    }
}

/// Statistics about a finished pool run.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Total number of workers in the pool.
    pub num_workers: usize,
    /// Tasks that produced a pair in the result store.
    pub tasks_completed: u64,
    /// Tasks written to the dead-letter file after exhausting the cap.
    pub tasks_dead_lettered: u64,
    /// Completion calls made across all tasks, retries included.
    pub attempts_total: u64,
}

impl PoolStats {
    /// Total attempts beyond each task's first call.
    pub fn retries(&self) -> u64 {
        self.attempts_total
            .saturating_sub(self.tasks_completed + self.tasks_dead_lettered)
    }
}

/// Shared state for tracking pool statistics.
struct SharedPoolStats {
    tasks_completed: AtomicU64,
    tasks_dead_lettered: AtomicU64,
    attempts_total: AtomicU64,
}

impl SharedPoolStats {
    fn new() -> Self {
        Self {
            tasks_completed: AtomicU64::new(0),
            tasks_dead_lettered: AtomicU64::new(0),
            attempts_total: AtomicU64::new(0),
        }
    }

    fn record_attempt(&self) {
        self.attempts_total.fetch_add(1, Ordering::SeqCst);
    }

    fn record_completion(&self) {
        self.tasks_completed.fetch_add(1, Ordering::SeqCst);
    }

    fn record_dead_letter(&self) {
        self.tasks_dead_lettered.fetch_add(1, Ordering::SeqCst);
    }

    fn to_pool_stats(&self, num_workers: usize) -> PoolStats {
        PoolStats {
            num_workers,
            tasks_completed: self.tasks_completed.load(Ordering::SeqCst),
            tasks_dead_lettered: self.tasks_dead_lettered.load(Ordering::SeqCst),
            attempts_total: self.attempts_total.load(Ordering::SeqCst),
        }
    }
}

/// A task that exhausted its retry cap, as recorded in the dead-letter file.
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetter {
    /// 1-based task index.
    pub index: usize,
    /// The prompt that kept failing.
    pub prompt: String,
    /// Its reference example.
    pub reference: String,
    /// The final error, rendered.
    pub error: String,
    /// Attempts made before giving up.
    pub attempts: u32,
}

/// Worker pool that drains a task list through the completion provider.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    provider: Arc<dyn CompletionProvider>,
    store: Arc<ResultStore>,
    stats: Arc<SharedPoolStats>,
}

impl WorkerPool {
    /// Creates a new worker pool over a shared provider and result store.
    pub fn new(
        config: WorkerPoolConfig,
        provider: Arc<dyn CompletionProvider>,
        store: Arc<ResultStore>,
    ) -> Self {
        Self {
            config,
            provider,
            store,
            stats: Arc::new(SharedPoolStats::new()),
        }
    }

    /// Runs every task to completion and returns only once all workers have
    /// exited.
    ///
    /// The queue is sized to hold the whole task list, so enqueueing never
    /// blocks; closing it after the last push is the drain signal. With the
    /// default unbounded retry, returning implies every task produced a pair.
    pub async fn run(&self, tasks: Vec<Task>) -> Result<PoolStats, PoolError> {
        let total = tasks.len();
        let (producer, task_queue) = queue::channel(total);
        let task_queue = Arc::new(task_queue);
        let dead_letters: Arc<Mutex<Vec<DeadLetter>>> = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::with_capacity(self.config.num_workers);
        for i in 0..self.config.num_workers {
            let worker = Worker {
                id: format!("worker-{}", i),
                queue: Arc::clone(&task_queue),
                provider: Arc::clone(&self.provider),
                store: Arc::clone(&self.store),
                model: self.config.model.clone(),
                retry: self.config.retry.clone(),
                stats: Arc::clone(&self.stats),
                dead_letters: Arc::clone(&dead_letters),
            };
            handles.push(tokio::spawn(worker.run()));
        }
        info!(num_workers = self.config.num_workers, tasks = total, "Worker pool started");

        for task in tasks {
            producer.push(task).await?;
        }
        producer.close();

        for result in join_all(handles).await {
            if let Err(e) = result {
                error!(error = %e, "Worker task panicked");
            }
        }

        self.write_dead_letters(&dead_letters);

        let stats = self.stats.to_pool_stats(self.config.num_workers);
        info!(
            completed = stats.tasks_completed,
            dead_lettered = stats.tasks_dead_lettered,
            retries = stats.retries(),
            "Worker pool drained"
        );
        Ok(stats)
    }

    /// Returns current pool statistics.
    pub fn stats(&self) -> PoolStats {
        self.stats.to_pool_stats(self.config.num_workers)
    }

    /// A failed write is logged rather than surfaced: by the time we get
    /// here the store already holds every completed pair, and losing the
    /// dead-letter report must not lose the run.
    fn write_dead_letters(&self, dead_letters: &Mutex<Vec<DeadLetter>>) {
        let entries = dead_letters.lock().expect("dead-letter lock poisoned");
        if entries.is_empty() {
            return;
        }
        let Some(ref path) = self.config.dead_letter_path else {
            warn!(
                count = entries.len(),
                "Tasks exhausted retries but no dead-letter path is configured; dropping them"
            );
            return;
        };

        let write_result = serde_json::to_vec_pretty(&*entries)
            .map_err(std::io::Error::other)
            .and_then(|data| std::fs::write(path, data));
        match write_result {
            Ok(()) => {
                warn!(count = entries.len(), path = %path.display(), "Wrote dead-letter file")
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to write dead-letter file")
            }
        }
    }
}

/// A single worker draining the shared queue.
struct Worker {
    id: String,
    queue: Arc<TaskQueue>,
    provider: Arc<dyn CompletionProvider>,
    store: Arc<ResultStore>,
    model: String,
    retry: RetryPolicy,
    stats: Arc<SharedPoolStats>,
    dead_letters: Arc<Mutex<Vec<DeadLetter>>>,
}

impl Worker {
    /// Main worker loop: pull tasks until the queue is closed and drained.
    async fn run(self) {
        info!(worker_id = %self.id, "Worker started");

        while let Some(task) = self.queue.pop().await {
            self.process_task(task).await;
        }

        info!(worker_id = %self.id, "Worker stopped");
    }

    /// Retries one task until it yields a usable answer or the cap runs out.
    async fn process_task(&self, task: Task) {
        info!(worker_id = %self.id, task = task.index, "Processing prompt");

        let mut attempts = 0u32;
        loop {
            attempts += 1;
            self.stats.record_attempt();

            match self.provider.complete(&self.model, &task.prompt).await {
                Ok(completion) => {
                    self.store
                        .append_exchange(task.reference.clone(), completion.answer);
                    self.stats.record_completion();
                    info!(
                        worker_id = %self.id,
                        task = task.index,
                        attempts,
                        "Processed prompt successfully"
                    );
                    return;
                }
                Err(e) => {
                    if self.retry.exhausted(attempts) {
                        error!(
                            worker_id = %self.id,
                            task = task.index,
                            attempts,
                            error = %e,
                            "Retry cap exhausted, dead-lettering task"
                        );
                        self.dead_letters
                            .lock()
                            .expect("dead-letter lock poisoned")
                            .push(DeadLetter {
                                index: task.index,
                                prompt: task.prompt,
                                reference: task.reference,
                                error: e.to_string(),
                                attempts,
                            });
                        self.stats.record_dead_letter();
                        return;
                    }

                    warn!(
                        worker_id = %self.id,
                        task = task.index,
                        attempt = attempts,
                        error = %e,
                        "Completion attempt failed, retrying"
                    );
                    tokio::time::sleep(self.retry.backoff_for(attempts)).await;
                }
            }
        }
    }
}
