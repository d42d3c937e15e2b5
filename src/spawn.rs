//! Where promise tasks run.
//!
//! A promise never runs its own task: it hands a boxed job to a [`Spawn`]
//! implementation and waits to be completed. [`ThreadSpawner`] gives every
//! job its own OS thread, [`ThreadPool`](crate::ThreadPool) shares a fixed
//! set of workers, and any other executor can be plugged in by implementing
//! the trait.

use std::sync::{Arc, OnceLock};
use std::thread;

use log::{error, trace};

/// A unit of work handed to a spawner.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// The capability to run a job "somewhere else".
///
/// Implementations must either run the job or drop it. A dropped job
/// completes its promise with [`Error::TaskDropped`](crate::Error::TaskDropped),
/// so a spawner can never leave a promise pending forever.
pub trait Spawn: Send + Sync {
    fn spawn(&self, job: Job);
}

/// Runs every job on a freshly created thread.
#[derive(Debug, Clone, Default)]
pub struct ThreadSpawner {
    name: Option<String>,
    stack_size: Option<usize>,
}

impl ThreadSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> Builder {
        Builder::new()
    }
}

impl Spawn for ThreadSpawner {
    fn spawn(&self, job: Job) {
        let mut builder = thread::Builder::new();
        if let Some(name) = &self.name {
            builder = builder.name(name.clone());
        }
        if let Some(size) = self.stack_size {
            builder = builder.stack_size(size);
        }
        // On failure the closure (and the job inside it) is dropped, which
        // settles the promise with `TaskDropped`.
        match builder.spawn(job) {
            Ok(handle) => trace!("spawned task thread {:?}", handle.thread().id()),
            Err(err) => error!("failed to spawn task thread: {err}"),
        }
    }
}

/// Configuration for a [`ThreadSpawner`].
///
/// ```
/// use thenable::{Promise, ThreadSpawner};
/// use std::sync::Arc;
///
/// let spawner = Arc::new(ThreadSpawner::builder().name("worker").stack_size(256 * 1024).build());
/// let promise: Promise<_> = Promise::spawn_on(spawner, || {
///     Ok(std::thread::current().name().map(String::from))
/// });
/// assert_eq!(promise.wait(), Ok(Some("worker".to_string())));
/// ```
#[derive(Debug, Default)]
pub struct Builder {
    spawner: ThreadSpawner,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names every thread the spawner creates.
    #[inline]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.spawner.name = Some(name.into());
        self
    }

    /// Sets the stack size of every thread the spawner creates.
    #[inline]
    pub fn stack_size(mut self, stack_size: usize) -> Self {
        self.spawner.stack_size = Some(stack_size);
        self
    }

    pub fn build(self) -> ThreadSpawner {
        self.spawner
    }
}

/// The spawner used by [`Promise::spawn`](crate::Promise::spawn).
pub fn default_spawner() -> Arc<dyn Spawn> {
    static DEFAULT: OnceLock<Arc<dyn Spawn>> = OnceLock::new();
    DEFAULT
        .get_or_init(|| Arc::new(ThreadSpawner::builder().name("thenable").build()))
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_thread_spawner_runs_job_elsewhere() {
        let (tx, rx) = mpsc::channel();
        let here = thread::current().id();
        ThreadSpawner::new().spawn(Box::new(move || {
            tx.send(thread::current().id()).unwrap();
        }));
        assert_ne!(rx.recv().unwrap(), here);
    }

    #[test]
    fn test_builder_names_threads() {
        let (tx, rx) = mpsc::channel();
        let spawner = Builder::new().name("named").build();
        spawner.spawn(Box::new(move || {
            tx.send(thread::current().name().map(String::from)).unwrap();
        }));
        assert_eq!(rx.recv().unwrap().as_deref(), Some("named"));
    }

    #[test]
    fn test_default_spawner_is_shared() {
        assert!(Arc::ptr_eq(&default_spawner(), &default_spawner()));
    }
}
