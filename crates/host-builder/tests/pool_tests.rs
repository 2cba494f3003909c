//! Worker pool tests against an in-memory management API.
//!
//! These cover delivery guarantees, failure isolation and cooperative
//! cancellation without any network I/O.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use foreman_host_builder::{
    HostJobProcessor, HostPayload, HostRecord, Job, JobQueue, ReferenceKind, RemoteClient,
    RemoteError, ShutdownCoordinator, WorkerPool,
};
use serde_json::json;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

// =============================================================================
// Fake management API
// =============================================================================

/// Records every create request and fails or panics on selected hosts.
#[derive(Default)]
struct FakeForeman {
    /// Hosts that already exist.
    existing: HashSet<String>,
    /// Hosts whose create request is rejected.
    reject: HashSet<String>,
    /// Hosts whose create request panics.
    panic_on: HashSet<String>,
    /// Names submitted to `create_host`, in call order.
    created: Mutex<Vec<String>>,
    /// Number of `create_host` calls.
    create_calls: AtomicUsize,
    /// When set, `create_host` signals `started` and waits for `release`.
    gate: Option<Gate>,
}

struct Gate {
    started: Notify,
    release: Notify,
}

fn payload_name(payload: &HostPayload) -> String {
    payload
        .get("name")
        .and_then(|n| n.as_str())
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl RemoteClient for FakeForeman {
    async fn find_host_by_name_prefix(&self, name: &str) -> Result<Vec<HostRecord>, RemoteError> {
        if self.existing.contains(name) {
            Ok(vec![HostRecord {
                id: 1,
                name: format!("{name}.example.com"),
            }])
        } else {
            Ok(Vec::new())
        }
    }

    async fn resolve(
        &self,
        _kind: ReferenceKind,
        _identifier: &str,
    ) -> Result<Option<u64>, RemoteError> {
        Ok(Some(5))
    }

    async fn create_host(&self, payload: HostPayload) -> Result<HostRecord, RemoteError> {
        let name = payload_name(&payload);
        self.create_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.started.notify_one();
            gate.release.notified().await;
        }

        if self.panic_on.contains(&name) {
            panic!("malformed host {name}");
        }
        if self.reject.contains(&name) {
            return Err(RemoteError::Api {
                status: 422,
                message: "Name has already been taken".to_string(),
            });
        }

        self.created.lock().unwrap().push(name.clone());
        Ok(HostRecord {
            id: 100,
            name: format!("{name}.example.com"),
        })
    }
}

fn queue_of(names: &[&str]) -> Arc<JobQueue> {
    Arc::new(names.iter().map(|n| Job::new(*n).unwrap()).collect())
}

fn pool(workers: usize, queue: Arc<JobQueue>, client: Arc<FakeForeman>) -> WorkerPool {
    WorkerPool::new(workers, queue, HostJobProcessor::new(client))
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_each_job_processed_exactly_once() {
    let names: Vec<String> = (0..200).map(|i| format!("host{i}")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let client = Arc::new(FakeForeman::default());
    let queue = queue_of(&refs);

    let summary = pool(8, Arc::clone(&queue), Arc::clone(&client))
        .run(&CancellationToken::new())
        .await;

    let created = client.created.lock().unwrap().clone();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for name in &created {
        *counts.entry(name.as_str()).or_default() += 1;
    }

    assert_eq!(created.len(), 200);
    assert!(counts.values().all(|&c| c == 1), "a host was created twice");
    assert_eq!(summary.tally.created, 200);
    assert_eq!(summary.exit_code(), 0);
    assert!(queue.is_empty());
}

#[tokio::test]
async fn test_existing_hosts_are_not_created() {
    let client = Arc::new(FakeForeman {
        existing: HashSet::from(["web1".to_string()]),
        ..FakeForeman::default()
    });

    let summary = pool(2, queue_of(&["web1", "web2"]), Arc::clone(&client))
        .run(&CancellationToken::new())
        .await;

    assert_eq!(summary.tally.already_exists, 1);
    assert_eq!(summary.tally.created, 1);
    assert_eq!(*client.created.lock().unwrap(), ["web2"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_job_does_not_stop_others() {
    let client = Arc::new(FakeForeman {
        reject: HashSet::from(["bad".to_string()]),
        ..FakeForeman::default()
    });

    let summary = pool(2, queue_of(&["bad", "good1", "good2"]), Arc::clone(&client))
        .run(&CancellationToken::new())
        .await;

    assert_eq!(summary.tally.failed, 1);
    assert_eq!(summary.tally.created, 2);
    assert_eq!(summary.exit_code(), 3);

    let mut created = client.created.lock().unwrap().clone();
    created.sort();
    assert_eq!(created, ["good1", "good2"]);
}

#[tokio::test]
async fn test_panicking_job_is_isolated() {
    let client = Arc::new(FakeForeman {
        panic_on: HashSet::from(["boom".to_string()]),
        ..FakeForeman::default()
    });

    // A single worker must survive the panic and carry on with the queue.
    let summary = pool(1, queue_of(&["boom", "after"]), Arc::clone(&client))
        .run(&CancellationToken::new())
        .await;

    assert_eq!(summary.tally.errored, 1);
    assert_eq!(summary.tally.created, 1);
    assert_eq!(*client.created.lock().unwrap(), ["after"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_malformed_host_does_not_stop_others() {
    let client = Arc::new(FakeForeman::default());
    let mut fields = HostPayload::new();
    fields.insert("subnet".into(), json!(["a", "b"]));
    let queue: Arc<JobQueue> = Arc::new(
        [
            Job::new("good1").unwrap(),
            Job::from_fields("bad", fields).unwrap(),
            Job::new("good2").unwrap(),
        ]
        .into_iter()
        .collect(),
    );

    let summary = pool(2, queue, Arc::clone(&client))
        .run(&CancellationToken::new())
        .await;

    assert_eq!(summary.tally.created, 2);
    assert_eq!(summary.tally.errored, 1);
    assert_eq!(summary.exit_code(), 3);

    let mut created = client.created.lock().unwrap().clone();
    created.sort();
    assert_eq!(created, ["good1", "good2"]);
}

#[tokio::test]
async fn test_empty_queue_stops_without_processing() {
    let client = Arc::new(FakeForeman::default());

    let summary = pool(4, Arc::new(JobQueue::new()), Arc::clone(&client))
        .run(&CancellationToken::new())
        .await;

    assert_eq!(summary.tally.processed(), 0);
    assert_eq!(summary.workers_cancelled, 0);
    assert_eq!(client.create_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancelled_before_start_leaves_queue_untouched() {
    let client = Arc::new(FakeForeman::default());
    let queue = queue_of(&["a", "b", "c"]);
    let token = CancellationToken::new();
    token.cancel();

    let summary = pool(3, Arc::clone(&queue), Arc::clone(&client))
        .run(&token)
        .await;

    assert_eq!(summary.workers_cancelled, 3);
    assert_eq!(summary.tally.processed(), 0);
    assert_eq!(queue.len(), 3);
    assert!(summary.interrupted());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_in_flight_job_finishes_after_cancellation() {
    let client = Arc::new(FakeForeman {
        gate: Some(Gate {
            started: Notify::new(),
            release: Notify::new(),
        }),
        ..FakeForeman::default()
    });
    let queue = queue_of(&["first", "second", "third"]);
    let shutdown = ShutdownCoordinator::new();

    let run = {
        let pool = pool(1, Arc::clone(&queue), Arc::clone(&client));
        let token = shutdown.token();
        tokio::spawn(async move { pool.run(&token).await })
    };

    let gate = client.gate.as_ref().unwrap();
    tokio::time::timeout(Duration::from_secs(5), gate.started.notified())
        .await
        .expect("first create never started");

    shutdown.trigger("SIGINT");
    gate.release.notify_one();

    let summary = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("pool did not stop")
        .unwrap();

    assert_eq!(*client.created.lock().unwrap(), ["first"]);
    assert_eq!(client.create_calls.load(Ordering::SeqCst), 1);
    assert_eq!(summary.tally.created, 1);
    assert_eq!(summary.workers_cancelled, 1);
    assert_eq!(summary.exit_code(), 130);
    assert_eq!(summary.remaining, 2);
    assert_eq!(queue.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_signal_during_last_job_is_clean_exit() {
    let client = Arc::new(FakeForeman {
        gate: Some(Gate {
            started: Notify::new(),
            release: Notify::new(),
        }),
        ..FakeForeman::default()
    });
    let queue = queue_of(&["only"]);
    let shutdown = ShutdownCoordinator::new();

    let run = {
        let pool = pool(1, Arc::clone(&queue), Arc::clone(&client));
        let token = shutdown.token();
        tokio::spawn(async move { pool.run(&token).await })
    };

    let gate = client.gate.as_ref().unwrap();
    tokio::time::timeout(Duration::from_secs(5), gate.started.notified())
        .await
        .expect("create never started");

    shutdown.trigger("SIGTERM");
    gate.release.notify_one();

    let summary = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("pool did not stop")
        .unwrap();

    assert_eq!(summary.tally.created, 1);
    assert_eq!(summary.workers_cancelled, 1);
    assert_eq!(summary.remaining, 0);
    assert!(!summary.interrupted());
    assert_eq!(summary.exit_code(), 0);
}
