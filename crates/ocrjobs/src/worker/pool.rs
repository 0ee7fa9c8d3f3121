use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, info, warn};

use crate::error::WorkerError;
use crate::jobs::JobManager;
use crate::processor::Recognizer;
use crate::worker::task::OcrTask;

pub const SHUTDOWN_MESSAGE: &str = "service shut down before processing started";

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Fixed set of OS threads executing recognition tasks.
///
/// The queue is unbounded so `submit` never blocks the request path. All
/// methods take `&self` so the pool can be shared behind an `Arc`.
pub struct WorkerPool {
    task_sender: Mutex<Option<Sender<OcrTask>>>,
    task_receiver: Receiver<OcrTask>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown: Arc<AtomicBool>,
    /// Job ids queued or running.
    scheduled: Arc<Mutex<HashSet<String>>>,
    manager: JobManager,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl WorkerPool {
    /// Starts `worker_count` workers.
    pub fn new(
        manager: JobManager,
        recognizer: Recognizer,
        worker_count: usize,
    ) -> Result<Self, WorkerError> {
        if worker_count == 0 {
            return Err(WorkerError::SpawnFailed(
                "worker_count must be > 0".to_string(),
            ));
        }

        let (task_sender, task_receiver) = unbounded::<OcrTask>();
        let shutdown = Arc::new(AtomicBool::new(false));
        let scheduled = Arc::new(Mutex::new(HashSet::new()));

        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let task_rx = task_receiver.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let scheduled_ids = Arc::clone(&scheduled);
            let worker_manager = manager.clone();
            let worker_recognizer = recognizer.clone();

            let spawned = thread::Builder::new()
                .name(format!("ocr-worker-{}", worker_id))
                .spawn(move || {
                    run_worker(
                        worker_id,
                        task_rx,
                        shutdown_flag,
                        scheduled_ids,
                        worker_manager,
                        worker_recognizer,
                    );
                });

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    shutdown.store(true, Ordering::SeqCst);
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(WorkerError::SpawnFailed(e.to_string()));
                }
            }
        }

        info!("Started {} workers", worker_count);

        Ok(Self {
            task_sender: Mutex::new(Some(task_sender)),
            task_receiver,
            workers: Mutex::new(workers),
            shutdown,
            scheduled,
            manager,
        })
    }

    /// Queues a task. Never blocks on recognition.
    pub fn submit(&self, task: OcrTask) -> Result<(), WorkerError> {
        if self.is_shutdown() {
            return Err(WorkerError::ChannelClosed);
        }

        if !lock(&self.scheduled).insert(task.job_id.clone()) {
            return Err(WorkerError::AlreadyScheduled(task.job_id));
        }

        let sender = lock(&self.task_sender);
        let result = match sender.as_ref() {
            Some(sender) => sender.send(task).map_err(|e| e.into_inner()),
            None => Err(task),
        };

        result.map_err(|task| {
            lock(&self.scheduled).remove(&task.job_id);
            WorkerError::ChannelClosed
        })
    }

    /// Number of tasks waiting for a worker.
    pub fn queued(&self) -> usize {
        self.task_receiver.len()
    }

    /// Stops intake. Running tasks finish; queued ones are failed by `wait`.
    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Joins the workers, then fails every task that never started.
    pub fn wait(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        drop(lock(&self.task_sender).take());

        let workers = std::mem::take(&mut *lock(&self.workers));
        for (i, worker) in workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        let mut abandoned = 0;
        for task in self.task_receiver.try_iter() {
            match self.manager.fail(&task.job_id, SHUTDOWN_MESSAGE) {
                Ok(_) => abandoned += 1,
                Err(e) => error!(
                    "Job {} could not be failed during shutdown: {}",
                    task.job_id, e
                ),
            }
            lock(&self.scheduled).remove(&task.job_id);
        }
        if abandoned > 0 {
            warn!("Failed {} queued job(s) at shutdown", abandoned);
        }

        info!("All workers have stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

fn run_worker(
    worker_id: usize,
    task_receiver: Receiver<OcrTask>,
    shutdown: Arc<AtomicBool>,
    scheduled: Arc<Mutex<HashSet<String>>>,
    manager: JobManager,
    recognizer: Recognizer,
) {
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::SeqCst) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match task_receiver.recv_timeout(POLL_INTERVAL) {
            Ok(task) => {
                debug!("Worker {} processing job {}", worker_id, task.job_id);
                task.execute(&manager, &recognizer);
                lock(&scheduled).remove(&task.job_id);
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                continue;
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                debug!("Worker {} task channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}
