//! Interval scheduler.
//!
//! One ticker task scans the registered publications every tick and submits
//! the due ones to a bounded work queue served by a fixed worker pool. A
//! publication stays marked as enqueued until its trigger has returned or the
//! queued work is dropped, so at most one interval trigger per publication is
//! in flight, also across a stop and restart.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

/// A publication the scheduler can drive.
pub trait ScheduledPublication: Send + Sync {
    /// Registration key.
    fn id(&self) -> Uuid;

    /// Whether the publication is due at `now`.
    fn is_due(&self, now: Instant) -> bool;

    /// Perform the interval trigger and record the publication time.
    ///
    /// Runs on the blocking pool.
    fn fire(&self);
}

/// Scheduler tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Period of the due scan
    pub tick: Duration,
    /// Capacity of the work queue
    pub queue_size: usize,
    /// Number of workers
    pub workers: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(50),
            queue_size: 50,
            workers: 5,
        }
    }
}

type Job = Arc<dyn ScheduledPublication>;

#[derive(Default)]
struct Shared {
    publications: RwLock<HashMap<Uuid, Job>>,
    enqueued: Mutex<HashSet<Uuid>>,
}

impl Shared {
    fn is_registered(&self, id: Uuid) -> bool {
        self.publications
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    /// Due publications not yet enqueued; marks them enqueued.
    fn take_due(self: &Arc<Self>, now: Instant) -> Vec<Work> {
        let publications = self.publications.read().unwrap_or_else(PoisonError::into_inner);
        let mut enqueued = self.enqueued.lock().unwrap_or_else(PoisonError::into_inner);

        let mut due = Vec::new();
        for publication in publications.values() {
            let id = publication.id();
            if !enqueued.contains(&id) && publication.is_due(now) {
                enqueued.insert(id);
                due.push(Work {
                    job: Arc::clone(publication),
                    _ticket: Ticket {
                        id,
                        shared: Arc::clone(self),
                    },
                });
            }
        }
        due
    }

    fn complete(&self, id: Uuid) {
        self.enqueued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    #[cfg(test)]
    fn is_enqueued(&self, id: Uuid) -> bool {
        self.enqueued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&id)
    }
}

/// Enqueued mark of one publication, released on drop.
struct Ticket {
    id: Uuid,
    shared: Arc<Shared>,
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.shared.complete(self.id);
    }
}

/// A due publication travelling through the work queue.
struct Work {
    job: Job,
    _ticket: Ticket,
}

impl Work {
    fn run(self) {
        self.job.fire();
    }
}

struct Running {
    ticker: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
}

/// Shared interval scheduler of one application.
pub struct Scheduler {
    config: SchedulerConfig,
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

impl Scheduler {
    /// Create a stopped scheduler.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared::default()),
            running: Mutex::new(None),
        }
    }

    /// Scheduler tuning.
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Register a publication. Replaces one with the same id.
    pub fn add(&self, publication: Arc<dyn ScheduledPublication>) {
        self.shared
            .publications
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(publication.id(), publication);
    }

    /// Deregister a publication.
    ///
    /// A trigger already running finishes; queued work for it is skipped.
    pub fn remove(&self, id: Uuid) {
        self.shared
            .publications
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    /// Number of registered publications.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared
            .publications
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no publication is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the ticker is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Spawn the ticker and the worker pool. Starting twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns error if called outside a tokio runtime.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;

        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.is_some() {
            return Ok(());
        }

        let (work_tx, work_rx) = mpsc::channel::<Work>(self.config.queue_size.max(1));
        let work_rx = Arc::new(tokio::sync::Mutex::new(work_rx));

        let workers = (0..self.config.workers.max(1))
            .map(|_| handle.spawn(run_worker(Arc::clone(&self.shared), Arc::clone(&work_rx))))
            .collect();
        let ticker = handle.spawn(run_ticker(Arc::clone(&self.shared), self.config.tick, work_tx));

        tracing::debug!(
            workers = self.config.workers,
            queue_size = self.config.queue_size,
            tick_ms = u64::try_from(self.config.tick.as_millis()).unwrap_or(u64::MAX),
            "Scheduler started"
        );

        *running = Some(Running { ticker, workers });
        Ok(())
    }

    /// Halt the ticker and the workers. Stopping twice is a no-op.
    ///
    /// Triggers already running on the blocking pool finish and keep their
    /// publication marked as enqueued until they return; queued work is
    /// dropped.
    pub fn stop(&self) {
        let Some(running) = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return;
        };

        running.ticker.abort();
        for worker in running.workers {
            worker.abort();
        }

        tracing::debug!("Scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("publications", &self.len())
            .field("running", &self.is_running())
            .finish()
    }
}

async fn run_ticker(shared: Arc<Shared>, tick: Duration, work_tx: mpsc::Sender<Work>) {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        for work in shared.take_due(Instant::now()) {
            // Blocks while the queue is full
            if work_tx.send(work).await.is_err() {
                return;
            }
        }
    }
}

async fn run_worker(shared: Arc<Shared>, work_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Work>>>) {
    loop {
        let next = work_rx.lock().await.recv().await;
        let Some(work) = next else {
            break;
        };

        let id = work.job.id();
        if !shared.is_registered(id) {
            continue;
        }
        if let Err(e) = tokio::task::spawn_blocking(move || work.run()).await {
            tracing::warn!(error = %e, publication = %id, "Interval trigger failed");
        }
    }
}

/// Errors for scheduler operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    /// No tokio runtime to spawn on
    #[error("scheduler must be started inside a tokio runtime")]
    NoRuntime,
}
