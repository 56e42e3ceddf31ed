//! Worker pool — a bounded set of threads, each consuming ingestion
//! events end-to-end (classification, adapter chain, persistence,
//! exception generation) before acknowledging.
//!
//! Workers share no in-memory state; the document store is the single
//! synchronization point. Acknowledgement is implicit: a delivery leaves
//! the queue only after the router returns, and failed attempts re-enter
//! via the retry schedule or the dead-letter path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info};

use crate::pipeline::{HandleOutcome, ProcessingRouter};
use crate::queue::{IngestionQueue, RetryOutcome};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Starts `worker_count` worker threads.
    ///
    /// # Panics
    /// Panics if `worker_count` is 0.
    pub fn start(
        queue: Arc<IngestionQueue>,
        router: Arc<ProcessingRouter>,
        worker_count: usize,
    ) -> Self {
        assert!(worker_count > 0, "worker_count must be > 0");
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let queue = Arc::clone(&queue);
            let router = Arc::clone(&router);
            let shutdown_flag = Arc::clone(&shutdown);

            let handle = thread::spawn(move || {
                run_worker(worker_id, queue, router, shutdown_flag);
            });
            workers.push(handle);
        }

        info!("Started {} workers", worker_count);

        Self { workers, shutdown }
    }

    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    pub fn wait(self) {
        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }
        info!("All workers have stopped");
    }
}

fn run_worker(
    worker_id: usize,
    queue: Arc<IngestionQueue>,
    router: Arc<ProcessingRouter>,
    shutdown: Arc<AtomicBool>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        let Some(delivery) = queue.next(POLL_INTERVAL) else {
            continue;
        };

        debug!(
            "Worker {} processing {} (attempt {})",
            worker_id, delivery.event.storage_path, delivery.attempt
        );

        match router.handle(&delivery) {
            HandleOutcome::Ack => {}
            HandleOutcome::Retry { error } => match queue.retry(delivery) {
                RetryOutcome::Scheduled { attempt, delay } => {
                    debug!(
                        "Worker {} scheduled redelivery {} in {:?}",
                        worker_id, attempt, delay
                    );
                }
                RetryOutcome::DeadLettered(dead) => {
                    router.dead_letter(&dead, &error);
                }
            },
        }
    }

    debug!("Worker {} stopped", worker_id);
}
