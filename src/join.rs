//! Combinators over many promises.
//!
//! These block the calling thread. Each input gets one continuation that
//! reports its outcome, so none of them spawn extra tasks.

use std::iter;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};

use log::trace;
use parking_lot::Mutex;

use crate::latch::Latch;
use crate::{Error, Promise};

/// How one promise settled, as reported by [`all_settled`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled<T, E> {
    Fulfilled(T),
    Rejected(E),
}

impl<T, E> Settled<T, E> {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Settled::Fulfilled(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Settled::Rejected(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Settled::Fulfilled(value) => Some(value),
            Settled::Rejected(_) => None,
        }
    }

    pub fn err(&self) -> Option<&E> {
        match self {
            Settled::Fulfilled(_) => None,
            Settled::Rejected(err) => Some(err),
        }
    }

    pub fn into_result(self) -> Result<T, E> {
        self.into()
    }
}

impl<T, E> From<Result<T, E>> for Settled<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Settled::Fulfilled(value),
            Err(err) => Settled::Rejected(err),
        }
    }
}

impl<T, E> From<Settled<T, E>> for Result<T, E> {
    fn from(settled: Settled<T, E>) -> Self {
        match settled {
            Settled::Fulfilled(value) => Ok(value),
            Settled::Rejected(err) => Err(err),
        }
    }
}

/// Waits for every promise and returns their values in input order together
/// with every error that occurred.
///
/// A failed input leaves `T::default()` in its slot, and the errors come in
/// no particular order, so which input failed can't be told from the
/// result. Use [`all_settled`] when that matters.
///
/// ```
/// use thenable::{all, Error, Promise};
///
/// let promises: Vec<Promise<i32>> = vec![
///     Promise::spawn(|| Ok(1)),
///     Promise::spawn(|| Err(Error::msg("two"))),
///     Promise::spawn(|| Ok(3)),
/// ];
/// let (values, errors) = all(promises);
/// assert_eq!(values, vec![1, 0, 3]);
/// assert_eq!(errors, vec![Error::msg("two")]);
/// ```
pub fn all<T, E, I>(promises: I) -> (Vec<T>, Vec<E>)
where
    I: IntoIterator<Item = Promise<T, E>>,
    T: Clone + Default + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    let promises: Vec<_> = promises.into_iter().collect();
    let latch = Arc::new(Latch::new(promises.len()));
    let values: Arc<Mutex<Vec<T>>> = Arc::new(Mutex::new(
        iter::repeat_with(T::default).take(promises.len()).collect(),
    ));
    let errors = Arc::new(Mutex::new(Vec::new()));
    trace!("waiting for all of {} promise(s)", promises.len());

    for (i, promise) in promises.iter().enumerate() {
        let latch = latch.clone();
        let values = values.clone();
        let errors = errors.clone();
        promise.on_settle(move |result| {
            match &*result {
                Ok(value) => {
                    let value = value.clone();
                    values.lock()[i] = value;
                }
                Err(err) => {
                    let err = err.clone();
                    errors.lock().push(err);
                }
            }
            latch.count_down();
        });
    }

    latch.wait();
    let values = mem::take(&mut *values.lock());
    let errors = mem::take(&mut *errors.lock());
    (values, errors)
}

/// Waits for every promise and reports how each one settled, in input
/// order.
///
/// ```
/// use thenable::{all_settled, Error, Promise, Settled};
///
/// let promises: Vec<Promise<i32>> = vec![
///     Promise::spawn(|| Ok(10)),
///     Promise::spawn(|| Err(Error::msg("a"))),
/// ];
/// assert_eq!(
///     all_settled(promises),
///     vec![Settled::Fulfilled(10), Settled::Rejected(Error::msg("a"))],
/// );
/// ```
pub fn all_settled<T, E, I>(promises: I) -> Vec<Settled<T, E>>
where
    I: IntoIterator<Item = Promise<T, E>>,
    T: Clone + Send + Sync + 'static,
    E: Clone + From<Error> + Send + Sync + 'static,
{
    let promises: Vec<_> = promises.into_iter().collect();
    let latch = Arc::new(Latch::new(promises.len()));
    let slots: Arc<Mutex<Vec<Option<Settled<T, E>>>>> = Arc::new(Mutex::new(
        iter::repeat_with(|| None).take(promises.len()).collect(),
    ));
    trace!("waiting for {} promise(s) to settle", promises.len());

    for (i, promise) in promises.iter().enumerate() {
        let latch = latch.clone();
        let slots = slots.clone();
        promise.on_settle(move |result| {
            let settled = Settled::from((*result).clone());
            slots.lock()[i] = Some(settled);
            latch.count_down();
        });
    }

    latch.wait();
    let slots = mem::take(&mut *slots.lock());
    slots
        .into_iter()
        // Every slot is filled once the latch opens.
        .map(|slot| slot.unwrap_or_else(|| Settled::Rejected(E::from(Error::TaskDropped))))
        .collect()
}

/// Returns the outcome of whichever promise settles first, success or
/// failure. Later outcomes are ignored.
///
/// When several promises settle at about the same time any one of them may
/// win. An empty input fails with [`Error::EmptyRace`] instead of waiting
/// forever.
///
/// ```
/// use thenable::{race, Promise};
/// use std::{thread, time::Duration};
///
/// let slow: Promise<&str> = Promise::spawn(|| {
///     thread::sleep(Duration::from_millis(200));
///     Ok("slow")
/// });
/// let fast: Promise<&str> = Promise::spawn(|| Ok("fast"));
/// assert_eq!(race([slow, fast]), Ok("fast"));
/// ```
pub fn race<T, E, I>(promises: I) -> Result<T, E>
where
    I: IntoIterator<Item = Promise<T, E>>,
    T: Clone + Send + Sync + 'static,
    E: Clone + From<Error> + Send + Sync + 'static,
{
    let promises: Vec<_> = promises.into_iter().collect();
    if promises.is_empty() {
        return Err(E::from(Error::EmptyRace));
    }

    let (tx, rx) = mpsc::sync_channel(1);
    let decided = Arc::new(AtomicBool::new(false));
    for promise in &promises {
        let tx = tx.clone();
        let decided = decided.clone();
        promise.on_settle(move |result| {
            if decided
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                let _ = tx.send(result);
            }
        });
    }
    drop(tx);

    match rx.recv() {
        Ok(result) => (*result).clone(),
        // Only reachable if every continuation was dropped unrun.
        Err(_) => Err(E::from(Error::TaskDropped)),
    }
}

/// Returns the value of whichever promise succeeds first. If every promise
/// fails, returns the error of the last one to fail.
///
/// An empty input fails with [`Error::EmptyRace`].
///
/// ```
/// use thenable::{any, Error, Promise};
///
/// let promises: Vec<Promise<i32>> = vec![
///     Promise::spawn(|| Err(Error::msg("nope"))),
///     Promise::spawn(|| Ok(7)),
/// ];
/// assert_eq!(any(promises), Ok(7));
/// ```
pub fn any<T, E, I>(promises: I) -> Result<T, E>
where
    I: IntoIterator<Item = Promise<T, E>>,
    T: Clone + Send + Sync + 'static,
    E: Clone + From<Error> + Send + Sync + 'static,
{
    let promises: Vec<_> = promises.into_iter().collect();
    if promises.is_empty() {
        return Err(E::from(Error::EmptyRace));
    }

    let total = promises.len();
    let (tx, rx) = mpsc::sync_channel(1);
    let decided = Arc::new(AtomicBool::new(false));
    let failures = Arc::new(AtomicUsize::new(0));
    for promise in &promises {
        let tx = tx.clone();
        let decided = decided.clone();
        let failures = failures.clone();
        promise.on_settle(move |result| {
            let wins = match &*result {
                Ok(_) => decided
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok(),
                // Nobody can have succeeded if this is the last failure.
                Err(_) => failures.fetch_add(1, Ordering::AcqRel) + 1 == total,
            };
            if wins {
                let _ = tx.send(result);
            }
        });
    }
    drop(tx);

    match rx.recv() {
        Ok(result) => (*result).clone(),
        Err(_) => Err(E::from(Error::TaskDropped)),
    }
}
