//! The single-assignment cell behind every [`Promise`].
//!
//! A promise is pending until the task it was spawned with returns, then it
//! holds that task's `Result` forever. Any number of parties may wait for it
//! at the same time: blocked threads, async tasks and internal continuations
//! all register a [`Waiter`] under the cell's lock and are signalled exactly
//! once when the result lands.
//!
//! The result lives in a [`OnceLock`], so reads after completion never take
//! a lock. The mutex guards only the waiter list: the result is stored and
//! the list taken while it is held, and the waiters are signalled after it
//! has been released.

use std::fmt;
use std::future::{Future, IntoFuture};
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{mpsc, Arc, OnceLock};
use std::task::{Context, Poll, Waker};

use log::{error, trace, warn};
use parking_lot::Mutex;

use crate::spawn::{default_spawner, Spawn};
use crate::Error;

type Outcome<T, E> = Arc<Result<T, E>>;

/// A handle to the eventual result of a background task.
///
/// Handles are cheap to clone; every clone observes the same result.
///
/// # Examples
///
/// ```
/// use thenable::{Error, Promise};
///
/// let answer: Promise<i32> = Promise::spawn(|| Ok(6 * 7));
/// assert_eq!(answer.wait(), Ok(42));
///
/// let failed: Promise<i32> = Promise::spawn(|| Err(Error::msg("boom")));
/// assert_eq!(failed.wait(), Err(Error::msg("boom")));
/// ```
///
/// # Deadlocks
///
/// A task that waits on its own promise never returns, and the promise never
/// settles. Nothing detects this.
pub struct Promise<T, E = Error> {
    shared: Arc<Shared<T, E>>,
}

struct Shared<T, E> {
    /// Written once, under `waiters`' lock.
    result: OnceLock<Outcome<T, E>>,
    waiters: Mutex<Vec<Waiter<T, E>>>,
    spawner: Arc<dyn Spawn>,
}

/// One party to notify when a promise settles.
enum Waiter<T, E> {
    /// A thread blocked in [`Promise::wait`].
    Thread(mpsc::SyncSender<Outcome<T, E>>),
    /// An async task polling a [`Settle`] future. The slot's address
    /// identifies the future when it is dropped early.
    Task(Arc<Mutex<Waker>>),
    /// An internal continuation, run on the completing thread.
    Callback(Box<dyn FnOnce(Outcome<T, E>) + Send>),
}

impl<T, E> Waiter<T, E> {
    fn signal(self, result: &Outcome<T, E>) {
        match self {
            // The receiver may be gone; that's fine.
            Waiter::Thread(tx) => {
                let _ = tx.try_send(result.clone());
            }
            Waiter::Task(slot) => {
                let waker = slot.lock().clone();
                waker.wake();
            }
            Waiter::Callback(f) => f(result.clone()),
        }
    }
}

impl<T, E> Shared<T, E> {
    fn new(result: Option<Outcome<T, E>>, spawner: Arc<dyn Spawn>) -> Self {
        Shared {
            result: result.map_or_else(OnceLock::new, OnceLock::from),
            waiters: Mutex::new(Vec::new()),
            spawner,
        }
    }

    /// Stores the result and wakes everyone waiting on it. Returns `false`,
    /// leaving the cell untouched, if the promise had already settled.
    ///
    /// A waiter that panics is logged and skipped; the rest are still
    /// signalled.
    fn complete(&self, result: Result<T, E>) -> bool {
        let result = Arc::new(result);
        let waiters = {
            let mut waiters = self.waiters.lock();
            if self.result.set(result.clone()).is_err() {
                error!("tried to complete a promise that has already settled");
                return false;
            }
            mem::take(&mut *waiters)
        };

        trace!("promise settled; waking {} waiter(s)", waiters.len());
        for waiter in waiters {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| waiter.signal(&result))) {
                error!("promise waiter panicked: {}", Error::from_panic(payload));
            }
        }
        true
    }

    /// Registers `waiter`, unless the promise has already settled, in which
    /// case the waiter is handed back together with the result.
    fn attach(&self, waiter: Waiter<T, E>) -> Option<(Waiter<T, E>, Outcome<T, E>)> {
        if let Some(result) = self.result.get() {
            return Some((waiter, result.clone()));
        }
        let mut waiters = self.waiters.lock();
        // Checked again under the lock, which `complete` holds while storing.
        if let Some(result) = self.result.get() {
            return Some((waiter, result.clone()));
        }
        waiters.push(waiter);
        None
    }

    /// Unregisters the task waiter signalling through `slot`, if the promise
    /// is still pending.
    fn detach(&self, slot: &Arc<Mutex<Waker>>) {
        if self.result.get().is_some() {
            return;
        }
        self.waiters.lock().retain(|waiter| match waiter {
            Waiter::Task(other) => !Arc::ptr_eq(other, slot),
            _ => true,
        });
    }
}

/// The worker side of a promise.
///
/// Whatever happens to the job, the promise settles: a panicking task
/// settles it with [`Error::Panicked`], and a job dropped before it ran
/// settles it with [`Error::TaskDropped`].
struct Completer<T, E: From<Error>> {
    shared: Option<Arc<Shared<T, E>>>,
}

impl<T, E: From<Error>> Completer<T, E> {
    fn run<F>(mut self, task: F)
    where
        F: FnOnce() -> Result<T, E>,
    {
        let result = match panic::catch_unwind(AssertUnwindSafe(task)) {
            Ok(result) => result,
            Err(payload) => {
                let err = Error::from_panic(payload);
                warn!("{err}");
                Err(E::from(err))
            }
        };
        if let Some(shared) = self.shared.take() {
            shared.complete(result);
        }
    }
}

impl<T, E: From<Error>> Drop for Completer<T, E> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            warn!("promise task was dropped before it ran");
            shared.complete(Err(E::from(Error::TaskDropped)));
        }
    }
}

impl<T, E> Promise<T, E>
where
    T: Send + Sync + 'static,
    E: From<Error> + Send + Sync + 'static,
{
    /// Runs `task` on the [default spawner](crate::default_spawner) and
    /// returns a promise for its result.
    ///
    /// The promise is returned before the task starts.
    pub fn spawn<F>(task: F) -> Self
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        Self::spawn_on(default_spawner(), task)
    }

    /// Runs `task` on `spawner`. Promises derived from this one with
    /// [`chain`](Self::chain) and friends run on the same spawner.
    pub fn spawn_on<F>(spawner: Arc<dyn Spawn>, task: F) -> Self
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        let shared = Arc::new(Shared::new(None, spawner.clone()));
        let completer = Completer {
            shared: Some(shared.clone()),
        };
        trace!("spawning promise task");
        spawner.spawn(Box::new(move || completer.run(task)));
        Promise { shared }
    }
}

impl<T, E> Promise<T, E> {
    /// A promise that has already settled with `result`.
    pub fn settled(result: Result<T, E>) -> Self {
        Promise {
            shared: Arc::new(Shared::new(Some(Arc::new(result)), default_spawner())),
        }
    }

    /// A promise that has already succeeded with `value`.
    pub fn resolved(value: T) -> Self {
        Self::settled(Ok(value))
    }

    /// A promise that has already failed with `err`.
    pub fn rejected(err: E) -> Self {
        Self::settled(Err(err))
    }

    /// `true` until the promise settles. Only a hint: the promise may
    /// settle right after this returns.
    pub fn is_pending(&self) -> bool {
        self.shared.result.get().is_none()
    }

    pub(crate) fn spawner(&self) -> Arc<dyn Spawn> {
        self.shared.spawner.clone()
    }

    /// Runs `f` with the result once the promise settles: right away on the
    /// calling thread if it already has, otherwise on the completing thread.
    /// `f` runs exactly once and never under the promise's lock.
    pub(crate) fn on_settle<F>(&self, f: F)
    where
        F: FnOnce(Arc<Result<T, E>>) + Send + 'static,
    {
        if let Some((waiter, result)) = self.shared.attach(Waiter::Callback(Box::new(f))) {
            waiter.signal(&result);
        }
    }
}

impl<T: Clone, E: Clone> Promise<T, E> {
    /// Blocks the current thread until the promise settles and returns a
    /// copy of its result.
    pub fn wait(&self) -> Result<T, E> {
        loop {
            let (tx, rx) = mpsc::sync_channel(1);
            if let Some((_, result)) = self.shared.attach(Waiter::Thread(tx)) {
                return (*result).clone();
            }
            // The sender lives in the cell we hold a reference to, so it is
            // only dropped after sending.
            if let Ok(result) = rx.recv() {
                return (*result).clone();
            }
        }
    }

    /// The result if the promise has settled, without blocking or
    /// registering a waiter.
    pub fn read(&self) -> Option<Result<T, E>> {
        self.shared.result.get().map(|result| (**result).clone())
    }
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Promise {
            shared: self.shared.clone(),
        }
    }
}

impl<T, E> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.is_pending() { "pending" } else { "settled" };
        f.debug_struct("Promise").field("state", &state).finish()
    }
}

/// Future returned by `.await`ing a [`Promise`].
///
/// ```
/// use thenable::Promise;
/// use futures::executor::block_on;
///
/// let promise: Promise<&str> = Promise::spawn(|| Ok("🍓"));
/// assert_eq!(block_on(async { promise.await }), Ok("🍓"));
/// ```
#[must_use = "futures do nothing unless `.await`ed or `poll`ed"]
pub struct Settle<T, E> {
    promise: Promise<T, E>,
    waker: Option<Arc<Mutex<Waker>>>,
}

impl<T: Clone, E: Clone> IntoFuture for Promise<T, E> {
    type Output = Result<T, E>;
    type IntoFuture = Settle<T, E>;

    fn into_future(self) -> Self::IntoFuture {
        Settle {
            promise: self,
            waker: None,
        }
    }
}

impl<T: Clone, E: Clone> Future for Settle<T, E> {
    type Output = Result<T, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        let shared = &this.promise.shared;
        if let Some(result) = shared.result.get() {
            return Poll::Ready((**result).clone());
        }

        // Only one waiter per future; later polls just refresh the waker it
        // signals.
        match &this.waker {
            Some(slot) => {
                let mut waker = slot.lock();
                if !waker.will_wake(cx.waker()) {
                    *waker = cx.waker().clone();
                }
            }
            None => {
                let slot = Arc::new(Mutex::new(cx.waker().clone()));
                if let Some((_, result)) = shared.attach(Waiter::Task(slot.clone())) {
                    return Poll::Ready((*result).clone());
                }
                this.waker = Some(slot);
            }
        }

        // The promise may have settled, and read the old waker, while the
        // slot was being refreshed.
        match shared.result.get() {
            Some(result) => Poll::Ready((**result).clone()),
            None => Poll::Pending,
        }
    }
}

impl<T, E> Drop for Settle<T, E> {
    fn drop(&mut self) {
        if let Some(slot) = self.waker.take() {
            self.promise.shared.detach(&slot);
        }
    }
}
