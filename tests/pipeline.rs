//! End-to-end tests for the generation pipeline.
//!
//! These drive the worker pool against a stub completion provider, covering
//! completeness, retry convergence, pair atomicity under concurrency, the
//! dead-letter path, and persistence determinism.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::RngExt;

use pairforge::error::LlmError;
use pairforge::export::DatasetWriter;
use pairforge::llm::{Completion, CompletionProvider};
use pairforge::scheduler::{RetryPolicy, Task, WorkerPool, WorkerPoolConfig};
use pairforge::shutdown::ShutdownController;
use pairforge::store::{ChatMessage, ResultStore, Role};

/// Stub provider: fails a prompt a preset number of times, then answers
/// `ok-<index>` for prompts of the form `prompt-<index>`.
struct StubProvider {
    /// Failures to inject per prompt before succeeding.
    failures: HashMap<String, u32>,
    /// Calls observed per prompt.
    calls: Mutex<HashMap<String, u32>>,
    /// Upper bound for random artificial latency per call, if any.
    max_latency: Option<Duration>,
}

impl StubProvider {
    fn new() -> Self {
        Self {
            failures: HashMap::new(),
            calls: Mutex::new(HashMap::new()),
            max_latency: None,
        }
    }

    fn with_failures(mut self, prompt: &str, count: u32) -> Self {
        self.failures.insert(prompt.to_string(), count);
        self
    }

    fn with_max_latency(mut self, latency: Duration) -> Self {
        self.max_latency = Some(latency);
        self
    }

    fn calls_for(&self, prompt: &str) -> u32 {
        self.calls
            .lock()
            .expect("calls lock poisoned")
            .get(prompt)
            .copied()
            .unwrap_or(0)
    }

    fn answer_for(prompt: &str) -> String {
        let index = prompt.trim_start_matches("prompt-");
        format!("ok-{index}")
    }
}

#[async_trait]
impl CompletionProvider for StubProvider {
    async fn complete(&self, _model: &str, prompt: &str) -> Result<Completion, LlmError> {
        let call_number = {
            let mut calls = self.calls.lock().expect("calls lock poisoned");
            let entry = calls.entry(prompt.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };

        if let Some(max) = self.max_latency {
            let wait = rand::rng().random_range(0..=max.as_millis() as u64);
            tokio::time::sleep(Duration::from_millis(wait)).await;
        }

        let failures = self.failures.get(prompt).copied().unwrap_or(0);
        if call_number <= failures {
            return Err(LlmError::RequestFailed(format!(
                "injected failure {call_number} for {prompt}"
            )));
        }

        Ok(Completion {
            answer: Self::answer_for(prompt),
        })
    }
}

fn make_tasks(count: usize) -> Vec<Task> {
    (1..=count)
        .map(|i| Task::new(i, format!("prompt-{i}"), format!("example-{i}")))
        .collect()
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy::default().with_initial_backoff(Duration::from_millis(1))
}

#[tokio::test]
async fn test_single_worker_preserves_task_order() {
    let provider = Arc::new(StubProvider::new());
    let store = Arc::new(ResultStore::new());
    let config = WorkerPoolConfig::new("stub-model").with_num_workers(1);

    let pool = WorkerPool::new(config, provider, Arc::clone(&store));
    let stats = pool.run(make_tasks(3)).await.expect("run should succeed");

    assert_eq!(stats.tasks_completed, 3);
    assert_eq!(
        store.snapshot(),
        vec![
            ChatMessage::user("example-1"),
            ChatMessage::assistant("ok-1"),
            ChatMessage::user("example-2"),
            ChatMessage::assistant("ok-2"),
            ChatMessage::user("example-3"),
            ChatMessage::assistant("ok-3"),
        ]
    );
}

#[tokio::test]
async fn test_retry_convergence_makes_exactly_k_plus_one_calls() {
    let provider = Arc::new(StubProvider::new().with_failures("prompt-1", 4));
    let store = Arc::new(ResultStore::new());
    let config = WorkerPoolConfig::new("stub-model")
        .with_num_workers(1)
        .with_retry(fast_retry());

    let pool = WorkerPool::new(config, Arc::clone(&provider) as Arc<dyn CompletionProvider>, Arc::clone(&store));
    let stats = pool.run(make_tasks(1)).await.expect("run should succeed");

    assert_eq!(provider.calls_for("prompt-1"), 5);
    assert_eq!(stats.attempts_total, 5);
    assert_eq!(stats.tasks_completed, 1);
    assert_eq!(stats.retries(), 4);
    assert_eq!(
        store.snapshot(),
        vec![
            ChatMessage::user("example-1"),
            ChatMessage::assistant("ok-1"),
        ]
    );
}

#[tokio::test]
async fn test_completeness_despite_transient_failures() {
    let mut provider = StubProvider::new().with_max_latency(Duration::from_millis(3));
    for i in 1..=12 {
        // A spread of failure counts, including none.
        provider = provider.with_failures(&format!("prompt-{i}"), (i % 4) as u32);
    }
    let provider = Arc::new(provider);
    let store = Arc::new(ResultStore::new());
    let config = WorkerPoolConfig::new("stub-model")
        .with_num_workers(3)
        .with_retry(fast_retry());

    let pool = WorkerPool::new(config, provider, Arc::clone(&store));
    let stats = pool.run(make_tasks(12)).await.expect("run should succeed");

    assert_eq!(stats.tasks_completed, 12);
    assert_eq!(store.len(), 24);
}

#[tokio::test]
async fn test_pairing_invariant_under_concurrency() {
    let provider = Arc::new(StubProvider::new().with_max_latency(Duration::from_millis(5)));
    let store = Arc::new(ResultStore::new());
    let config = WorkerPoolConfig::new("stub-model")
        .with_num_workers(4)
        .with_retry(fast_retry());

    let pool = WorkerPool::new(config, provider, Arc::clone(&store));
    pool.run(make_tasks(40)).await.expect("run should succeed");

    let snapshot = store.snapshot();
    assert_eq!(snapshot.len(), 80);

    let mut seen = HashSet::new();
    for pair in snapshot.chunks(2) {
        assert_eq!(pair[0].role, Role::User);
        assert_eq!(pair[1].role, Role::Assistant);
        // Both halves belong to the same task.
        let index = pair[0].content.trim_start_matches("example-").to_string();
        assert_eq!(pair[1].content, format!("ok-{index}"));
        seen.insert(index);
    }
    // Every task appended exactly once, in whatever completion order.
    assert_eq!(seen.len(), 40);
}

#[tokio::test]
async fn test_stress_no_lost_or_duplicated_appends() {
    let workers = 6;
    let tasks_per_worker = 15;
    let total = workers * tasks_per_worker;

    let mut provider = StubProvider::new().with_max_latency(Duration::from_millis(4));
    for i in 1..=total {
        provider = provider.with_failures(&format!("prompt-{i}"), (i % 3) as u32);
    }
    let provider = Arc::new(provider);
    let store = Arc::new(ResultStore::new());
    let config = WorkerPoolConfig::new("stub-model")
        .with_num_workers(workers)
        .with_retry(fast_retry().with_jitter(true));

    let pool = WorkerPool::new(config, provider, Arc::clone(&store));
    let stats = pool.run(make_tasks(total)).await.expect("run should succeed");

    assert_eq!(stats.tasks_completed, total as u64);
    let snapshot = store.snapshot();
    assert_eq!(snapshot.len(), 2 * total);

    let expected: HashSet<(String, String)> = (1..=total)
        .map(|i| (format!("example-{i}"), format!("ok-{i}")))
        .collect();
    let actual: HashSet<(String, String)> = snapshot
        .chunks(2)
        .map(|pair| (pair[0].content.clone(), pair[1].content.clone()))
        .collect();
    assert_eq!(actual, expected);
}

#[tokio::test]
async fn test_capped_retries_dead_letter_poison_task() {
    let dir = tempfile::tempdir().expect("tempdir");
    let dead_path = dir.path().join("dead.json");

    // prompt-2 never succeeds.
    let provider = Arc::new(StubProvider::new().with_failures("prompt-2", u32::MAX));
    let store = Arc::new(ResultStore::new());
    let config = WorkerPoolConfig::new("stub-model")
        .with_num_workers(2)
        .with_retry(fast_retry().with_max_attempts(3))
        .with_dead_letter_path(&dead_path);

    let pool = WorkerPool::new(
        config,
        Arc::clone(&provider) as Arc<dyn CompletionProvider>,
        Arc::clone(&store),
    );
    let stats = pool.run(make_tasks(3)).await.expect("run should succeed");

    assert_eq!(stats.tasks_completed, 2);
    assert_eq!(stats.tasks_dead_lettered, 1);
    assert_eq!(provider.calls_for("prompt-2"), 3);
    assert_eq!(store.len(), 4);

    let data = std::fs::read_to_string(&dead_path).expect("dead-letter file written");
    let entries: Vec<serde_json::Value> = serde_json::from_str(&data).expect("valid JSON");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["index"], 2);
    assert_eq!(entries[0]["attempts"], 3);
    assert!(entries[0]["error"]
        .as_str()
        .expect("error is a string")
        .contains("injected failure"));
}

#[tokio::test]
async fn test_unwritable_dead_letter_path_keeps_completed_pairs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out_path = dir.path().join("normal_data.json");
    // A path whose parent directory does not exist, so the write fails.
    let dead_path = dir.path().join("missing-dir").join("dead.json");

    let provider = Arc::new(StubProvider::new().with_failures("prompt-2", u32::MAX));
    let store = Arc::new(ResultStore::new());
    let controller = Arc::new(ShutdownController::new(
        Arc::clone(&store),
        DatasetWriter::new(&out_path),
    ));
    let config = WorkerPoolConfig::new("stub-model")
        .with_num_workers(2)
        .with_retry(fast_retry().with_max_attempts(2))
        .with_dead_letter_path(&dead_path);

    let pool = WorkerPool::new(config, provider, Arc::clone(&store));
    let stats = pool
        .run(make_tasks(3))
        .await
        .expect("a failed dead-letter write must not abort the run");

    assert_eq!(stats.tasks_completed, 2);
    assert_eq!(stats.tasks_dead_lettered, 1);
    assert_eq!(store.len(), 4);
    assert!(!dead_path.exists());

    // The completed pairs still reach the dataset file.
    assert!(controller.finalize());
    let data = std::fs::read(&out_path).expect("dataset written");
    let parsed: Vec<ChatMessage> = serde_json::from_slice(&data).expect("valid JSON");
    assert_eq!(parsed.len(), 4);
}

#[tokio::test]
async fn test_run_then_finalize_persists_full_dataset_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out_path = dir.path().join("normal_data.json");

    let provider = Arc::new(StubProvider::new());
    let store = Arc::new(ResultStore::new());
    let controller = Arc::new(ShutdownController::new(
        Arc::clone(&store),
        DatasetWriter::new(&out_path),
    ));

    let config = WorkerPoolConfig::new("stub-model").with_num_workers(2);
    let pool = WorkerPool::new(config, provider, Arc::clone(&store));
    pool.run(make_tasks(5)).await.expect("run should succeed");

    assert!(controller.finalize());
    let first = std::fs::read(&out_path).expect("dataset written");
    let parsed: Vec<ChatMessage> = serde_json::from_slice(&first).expect("valid JSON");
    assert_eq!(parsed, store.snapshot());
    assert_eq!(parsed.len(), 10);

    // The competing exit path is a no-op once the gate has latched.
    assert!(!controller.finalize());
    let second = std::fs::read(&out_path).expect("dataset still there");
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_interrupt_snapshot_contains_only_whole_pairs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out_path = dir.path().join("normal_data.json");

    let provider = Arc::new(StubProvider::new().with_max_latency(Duration::from_millis(5)));
    let store = Arc::new(ResultStore::new());
    let controller = Arc::new(ShutdownController::new(
        Arc::clone(&store),
        DatasetWriter::new(&out_path),
    ));

    let config = WorkerPoolConfig::new("stub-model").with_num_workers(4);
    let pool = WorkerPool::new(config, provider, Arc::clone(&store));

    // Finalize from another task mid-run, standing in for the signal path.
    let run = tokio::spawn(async move { pool.run(make_tasks(30)).await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    controller.finalize();

    let data = std::fs::read_to_string(&out_path).expect("snapshot written");
    let parsed: Vec<ChatMessage> = serde_json::from_str(&data).expect("valid JSON");
    assert_eq!(parsed.len() % 2, 0, "snapshot split a pair");
    for pair in parsed.chunks(2) {
        assert_eq!(pair[0].role, Role::User);
        assert_eq!(pair[1].role, Role::Assistant);
        let index = pair[0].content.trim_start_matches("example-");
        assert_eq!(pair[1].content, format!("ok-{index}"));
    }

    // The run itself still completes everything.
    let stats = run
        .await
        .expect("run task should not panic")
        .expect("run should succeed");
    assert_eq!(stats.tasks_completed, 30);
}
