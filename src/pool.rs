//! A fixed-size pool of worker threads.

use std::num::NonZeroUsize;
use std::sync::{mpsc, Arc};
use std::thread;

use log::{debug, error, info};
use parking_lot::Mutex;

use crate::spawn::{Job, Spawn};

const POOL_CLOSED: &str = "tried to execute a task on a thread pool that is shutting down";

/// Runs jobs on a fixed set of worker threads, first come first served.
///
/// Dropping the pool closes its queue, lets the workers drain the jobs
/// already queued and joins them.
///
/// Workers are shared by every promise spawned on the pool, and combinator
/// tasks block a worker while they wait for their parent. Jobs are taken in
/// submission order, so a parent always starts before its children, but user
/// tasks that wait on promises spawned *after* them can starve a small pool.
///
/// ```
/// use thenable::{Promise, ThreadPool};
/// use std::num::NonZeroUsize;
/// use std::sync::Arc;
///
/// let pool = Arc::new(ThreadPool::new(NonZeroUsize::new(2).unwrap()));
/// let promise: Promise<_> = Promise::spawn_on(pool, || Ok(20)).chain(|v| Ok(v + 1));
/// assert_eq!(promise.wait(), Ok(21));
/// ```
pub struct ThreadPool {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Vec<Worker>,
}

impl ThreadPool {
    /// Creates a pool with `size` worker threads.
    pub fn new(size: NonZeroUsize) -> Self {
        let (sender, receiver) = mpsc::channel();
        let receiver = Arc::new(Mutex::new(receiver));
        let workers = (0..size.get())
            .map(|id| Worker::new(id, receiver.clone()))
            .collect();

        ThreadPool {
            sender: Mutex::new(Some(sender)),
            workers,
        }
    }

    /// Creates a pool with one worker per available CPU.
    pub fn with_available_parallelism() -> Self {
        let size = thread::available_parallelism().unwrap_or(NonZeroUsize::MIN);
        Self::new(size)
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }
}

impl Spawn for ThreadPool {
    fn spawn(&self, job: Job) {
        let sender = self.sender.lock();
        match sender.as_ref() {
            Some(sender) => {
                // The rejected job comes back inside the error and is dropped here.
                if sender.send(job).is_err() {
                    error!("{POOL_CLOSED}");
                }
            }
            None => error!("{POOL_CLOSED}"),
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        drop(self.sender.lock().take());

        let current = thread::current().id();
        for worker in self.workers.iter_mut() {
            info!("shutting down worker {}", worker.id);
            if let Some(thread) = worker.thread.take() {
                // The last handle can be released by a job on one of our own
                // workers; that worker exits on its own once the queue closes.
                if thread.thread().id() == current {
                    debug!("worker {} is dropping its own pool; detaching", worker.id);
                    continue;
                }
                if thread.join().is_err() {
                    error!("worker {} panicked", worker.id);
                }
            }
        }
    }
}

struct Worker {
    id: usize,
    thread: Option<thread::JoinHandle<()>>,
}

impl Worker {
    fn new(id: usize, receiver: Arc<Mutex<mpsc::Receiver<Job>>>) -> Self {
        let spawned = thread::Builder::new()
            .name(format!("thenable-pool-{id}"))
            .spawn(move || loop {
                // The guard is a temporary, so the queue is unlocked before the job runs.
                let message = receiver.lock().recv();
                match message {
                    Ok(job) => {
                        debug!("worker {id} got a job; executing");
                        job()
                    }
                    Err(_) => {
                        debug!("worker {id} disconnected; shutting down");
                        break;
                    }
                }
            });
        let thread = match spawned {
            Ok(thread) => Some(thread),
            Err(err) => {
                error!("failed to start worker {id}: {err}");
                None
            }
        };
        Worker { id, thread }
    }
}
