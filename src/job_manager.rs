//! Async Job Manager (C9, spec §4.9), grounded on
//! `original_source/backend/async_document_processor.py`'s
//! `AsyncDocumentProcessor` (bounded worker pool, FIFO queue, progress
//! callback map, cooperative cancellation) and the teacher's
//! `push_notification_service.rs` background-worker loop shape.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::metrics;
use crate::models::{Job, JobOptions, JobStatus};

pub type ProgressCallback = Arc<dyn Fn(&Job) + Send + Sync>;

struct JobEntry {
    job: Mutex<Job>,
    cancellation: CancellationToken,
}

/// Bounded worker pool + FIFO queue + cancellation + progress callbacks +
/// retention (spec §4.9).
pub struct JobManager {
    jobs: DashMap<String, Arc<JobEntry>>,
    callbacks: DashMap<String, Mutex<Vec<ProgressCallback>>>,
    sender: mpsc::Sender<String>,
    retention: Duration,
    worker_handles: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

pub type JobHandler = Arc<dyn Fn(Job, CancellationToken) -> futures::future::BoxFuture<'static, ()> + Send + Sync>;

impl JobManager {
    /// `worker_count` workers pull from a bounded FIFO `mpsc` queue, as the
    /// teacher's push-notification worker pulls from its own queue.
    pub fn start(worker_count: usize, queue_capacity: usize, retention: Duration, handler: JobHandler) -> Arc<Self> {
        let (sender, receiver) = mpsc::channel::<String>(queue_capacity);
        let jobs: DashMap<String, Arc<JobEntry>> = DashMap::new();
        let manager = Arc::new(Self {
            jobs,
            callbacks: DashMap::new(),
            sender,
            retention,
            worker_handles: Mutex::new(Vec::new()),
        });

        let receiver = Arc::new(AsyncMutex::new(receiver));
        let mut handles = Vec::new();
        for worker_id in 0..worker_count.max(1) {
            let receiver = receiver.clone();
            let manager = manager.clone();
            let handler = handler.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let job_id = {
                        let mut rx = receiver.lock().await;
                        rx.recv().await
                    };
                    let Some(job_id) = job_id else { break };

                    let Some(entry) = manager.jobs.get(&job_id).map(|e| e.clone()) else { continue };
                    {
                        let job = entry.job.lock();
                        if job.status == JobStatus::Cancelled {
                            debug!(worker_id, job_id = %job_id, "discarding already-cancelled job");
                            continue;
                        }
                    }

                    let job_snapshot = entry.job.lock().clone();
                    metrics::JOB_QUEUE_DEPTH.with_label_values(&[&metrics::owner_bucket(&job_snapshot.owner_id)]).dec();
                    let worker_label = worker_id.to_string();
                    metrics::WORKER_BUSY.with_label_values(&[&worker_label]).set(1.0);
                    info!(worker_id, job_id = %job_id, "worker picked up job");
                    handler(job_snapshot, entry.cancellation.clone()).await;
                    metrics::WORKER_BUSY.with_label_values(&[&worker_label]).set(0.0);
                }
            }));
        }

        *manager.worker_handles.lock() = handles;
        manager
    }

    /// Deterministic job id derivation for idempotent submission within
    /// a short dedup window (spec §4.9, §8 "submit idempotence").
    pub fn derive_job_id(owner_id: &str, file_hash: &str) -> String {
        Job::derive_id(owner_id, file_hash, Utc::now())
    }

    pub async fn submit(&self, document_id: Uuid, owner_id: String, options: JobOptions, job_id: String) -> Job {
        if let Some(existing) = self.jobs.get(&job_id) {
            return existing.job.lock().clone();
        }

        let job = Job::new(document_id, owner_id, options, job_id.clone());
        let entry = Arc::new(JobEntry { job: Mutex::new(job.clone()), cancellation: CancellationToken::new() });
        self.jobs.insert(job_id.clone(), entry);

        if self.sender.send(job_id).await.is_err() {
            error!("job queue receiver dropped, job manager is shutting down");
        } else {
            metrics::JOB_QUEUE_DEPTH.with_label_values(&[&metrics::owner_bucket(&job.owner_id)]).inc();
        }

        job
    }

    pub fn update_progress(&self, job_id: &str, progress: u8) {
        if let Some(entry) = self.jobs.get(job_id) {
            let snapshot = {
                let mut job = entry.job.lock();
                job.set_progress(progress);
                job.clone()
            };
            self.notify(job_id, &snapshot);
        }
    }

    pub fn mark_started(&self, job_id: &str) {
        if let Some(entry) = self.jobs.get(job_id) {
            let mut job = entry.job.lock();
            job.status = JobStatus::Processing;
            job.started_at = Some(Utc::now());
        }
    }

    pub fn mark_completed(&self, job_id: &str, status: JobStatus) {
        if let Some(entry) = self.jobs.get(job_id) {
            let snapshot = {
                let mut job = entry.job.lock();
                job.status = status;
                job.completed_at = Some(Utc::now());
                if status == JobStatus::Completed {
                    job.progress = 100;
                }
                job.clone()
            };
            self.notify(job_id, &snapshot);
        }
    }

    /// Cancellation per spec §4.9/§5: a no-op on an already-terminal job.
    pub fn cancel(&self, job_id: &str) -> bool {
        let Some(entry) = self.jobs.get(job_id) else { return false };
        let mut job = entry.job.lock();
        if job.status.is_terminal() {
            return false;
        }
        job.status = JobStatus::Cancelled;
        job.completed_at = Some(Utc::now());
        entry.cancellation.cancel();
        true
    }

    pub fn get(&self, job_id: &str) -> Option<Job> {
        self.jobs.get(job_id).map(|e| e.job.lock().clone())
    }

    /// Registers a progress callback. Callback panics are caught and
    /// swallowed (spec §4.9: "callback exceptions are logged and
    /// swallowed").
    pub fn on_progress(&self, job_id: &str, callback: ProgressCallback) {
        self.callbacks.entry(job_id.to_string()).or_insert_with(|| Mutex::new(Vec::new())).lock().push(callback);
    }

    fn notify(&self, job_id: &str, job: &Job) {
        if let Some(callbacks) = self.callbacks.get(job_id) {
            for callback in callbacks.lock().iter() {
                let callback = callback.clone();
                let job = job.clone();
                if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback(&job))).is_err() {
                    warn!(job_id, "progress callback panicked, swallowing");
                }
            }
        }
    }

    /// Evicts completed/failed/cancelled jobs older than `retention` from
    /// memory only; database records are untouched (spec §4.9).
    pub fn evict_expired(&self) {
        let cutoff = Utc::now() - chrono::Duration::from_std(self.retention).unwrap_or(chrono::Duration::hours(24));
        let mut expired = Vec::new();
        for entry in self.jobs.iter() {
            let job = entry.job.lock();
            if job.status.is_terminal() {
                if let Some(completed_at) = job.completed_at {
                    if completed_at < cutoff {
                        expired.push(entry.key().clone());
                    }
                }
            }
        }
        for job_id in expired {
            self.jobs.remove(&job_id);
            self.callbacks.remove(&job_id);
        }
    }

    pub fn shutdown(&self) {
        for handle in self.worker_handles.lock().iter() {
            handle.abort();
        }
    }
}
