//! Combinators that derive a new promise from one parent.
//!
//! Each one spawns a child task on the parent's spawner. The child waits for
//! the parent and then applies the user function, so the function always
//! runs on a worker, exactly once, and never while any promise lock is held.
//!
//! | combinator | parent `Ok(v)` | parent `Err(e)` |
//! |---|---|---|
//! | [`chain`](Promise::chain) | `f(v)` | `Err(e)` |
//! | [`recover`](Promise::recover) | `Ok(U::default())` | `f(e)` |
//! | [`finalize`](Promise::finalize) | `Ok(v)`, or `Err` from `f` | `Ok(T::default())`, or `Err` from `f` |
//! | [`pipe`](Promise::pipe) | `f(Ok(v))` | `f(Err(e))` |

use crate::{Error, Promise};

impl<T, E> Promise<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + From<Error> + Send + Sync + 'static,
{
    /// Runs `f` with the value if this promise succeeds. A failure is passed
    /// on untouched and `f` is never called.
    ///
    /// ```
    /// use thenable::Promise;
    ///
    /// let promise: Promise<i32> = Promise::spawn(|| Ok(2))
    ///     .chain(|v| Ok(v + 3))
    ///     .chain(|v| Ok(v * 10));
    /// assert_eq!(promise.wait(), Ok(50));
    /// ```
    pub fn chain<U, F>(&self, f: F) -> Promise<U, E>
    where
        U: Send + Sync + 'static,
        F: FnOnce(T) -> Result<U, E> + Send + 'static,
    {
        let parent = self.clone();
        Promise::spawn_on(self.spawner(), move || f(parent.wait()?))
    }

    /// Runs `f` with the error if this promise fails. A success settles the
    /// new promise with `U::default()` and `f` is never called; use
    /// [`finalize`](Self::finalize) to keep the original value.
    ///
    /// ```
    /// use thenable::{Error, Promise};
    ///
    /// let promise: Promise<i32> = Promise::spawn(|| Err(Error::msg("x")));
    /// assert_eq!(promise.recover(|_| Ok(42)).wait(), Ok(42));
    /// ```
    pub fn recover<U, F>(&self, f: F) -> Promise<U, E>
    where
        U: Default + Send + Sync + 'static,
        F: FnOnce(E) -> Result<U, E> + Send + 'static,
    {
        let parent = self.clone();
        Promise::spawn_on(self.spawner(), move || match parent.wait() {
            Ok(_) => Ok(U::default()),
            Err(err) => f(err),
        })
    }

    /// Runs `f` with the outcome whichever way this promise settles.
    ///
    /// The new promise keeps this promise's value, and its error is whatever
    /// `f` returns: `None` clears a failure (the value is then
    /// `T::default()`), `Some` sets one. Returning the parent's error passes
    /// it through.
    ///
    /// ```
    /// use thenable::{Error, Promise};
    ///
    /// let promise: Promise<i32> = Promise::spawn(|| Err(Error::msg("e")));
    /// let logged = promise.finalize(|outcome| outcome.as_ref().err().cloned());
    /// assert_eq!(logged.wait(), Err(Error::msg("e")));
    /// ```
    pub fn finalize<F>(&self, f: F) -> Promise<T, E>
    where
        T: Default,
        F: FnOnce(&Result<T, E>) -> Option<E> + Send + 'static,
    {
        let parent = self.clone();
        Promise::spawn_on(self.spawner(), move || {
            let outcome = parent.wait();
            match f(&outcome) {
                Some(err) => Err(err),
                None => Ok(outcome.unwrap_or_default()),
            }
        })
    }

    /// Maps the outcome, success or failure, into a promise of another type.
    ///
    /// ```
    /// use thenable::{Error, Promise};
    ///
    /// let promise: Promise<i32> = Promise::spawn(|| Err(Error::msg("bad")));
    /// let described = promise.pipe(|outcome| match outcome {
    ///     Ok(v) => Ok(format!("got {v}")),
    ///     Err(err) => Ok(format!("failed: {err}")),
    /// });
    /// assert_eq!(described.wait(), Ok("failed: bad".to_string()));
    /// ```
    pub fn pipe<U, F>(&self, f: F) -> Promise<U, E>
    where
        U: Send + Sync + 'static,
        F: FnOnce(Result<T, E>) -> Result<U, E> + Send + 'static,
    {
        let parent = self.clone();
        Promise::spawn_on(self.spawner(), move || f(parent.wait()))
    }
}

#[cfg(test)]
mod tests {
    use crate::{Error, Promise};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn test_chain_error_skips_callback() {
        init();
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let promise: Promise<i32> = Promise::spawn(|| Err(Error::msg("boom")));
        let child = promise.chain(move |v| {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(v + 1)
        });
        assert_eq!(child.wait(), Err(Error::msg("boom")));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_chain_callback_error_becomes_child_error() {
        init();
        let promise: Promise<i32> = Promise::resolved(1);
        let child: Promise<String> = promise.chain(|_| Err(Error::msg("callback")));
        assert_eq!(child.wait(), Err(Error::msg("callback")));
    }

    #[test]
    fn test_chain_can_change_type() {
        let promise: Promise<i32> = Promise::resolved(4);
        assert_eq!(promise.chain(|v| Ok(vec![v; 2])).wait(), Ok(vec![4, 4]));
    }

    #[test]
    fn test_recover_on_success_yields_default() {
        init();
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let promise: Promise<i32> = Promise::spawn(|| Ok(9));
        let child: Promise<String> = promise.recover(move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(String::from("unused"))
        });
        assert_eq!(child.wait(), Ok(String::new()));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_recover_can_fail_again() {
        let promise: Promise<i32> = Promise::rejected(Error::msg("first"));
        let child: Promise<i32> =
            promise.recover(|err| Err(Error::msg(format!("{err}, then second"))));
        assert_eq!(child.wait(), Err(Error::msg("first, then second")));
    }

    #[test]
    fn test_finalize_runs_once_on_both_paths() {
        init();
        let calls = Arc::new(AtomicUsize::new(0));
        let ok: Promise<i32> = Promise::spawn(|| Ok(1));
        let err: Promise<i32> = Promise::spawn(|| Err(Error::msg("e")));

        let counted = calls.clone();
        let ok = ok.finalize(move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
            None
        });
        let counted = calls.clone();
        let err = err.finalize(move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
            None
        });

        assert_eq!(ok.wait(), Ok(1));
        assert_eq!(err.wait(), Ok(0));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_finalize_can_replace_error() {
        let promise: Promise<i32> = Promise::resolved(5);
        let child = promise.finalize(|outcome| {
            assert_eq!(outcome, &Ok(5));
            Some(Error::msg("cleanup failed"))
        });
        assert_eq!(child.wait(), Err(Error::msg("cleanup failed")));
    }

    #[test]
    fn test_pipe_sees_both_outcomes() {
        let ok: Promise<i32> = Promise::resolved(3);
        let err: Promise<i32> = Promise::rejected(Error::msg("no"));
        let flatten = |outcome: Result<i32, Error>| Ok(outcome.is_ok());
        assert_eq!(ok.pipe(flatten).wait(), Ok(true));
        assert_eq!(err.pipe(flatten).wait(), Ok(false));
    }

    #[test]
    fn test_panicking_callback_settles_child() {
        init();
        let promise: Promise<i32> = Promise::resolved(1);
        let child: Promise<i32> = promise.chain(|_| panic!("in callback"));
        assert_eq!(child.wait(), Err(Error::Panicked("in callback".into())));
        assert_eq!(promise.wait(), Ok(1));
    }

    #[test]
    fn test_error_identity_survives_chain() {
        #[derive(Debug, thiserror::Error)]
        #[error("io")]
        struct Io;

        let original = Error::task(Io);
        let thrown = original.clone();
        let promise: Promise<i32> = Promise::spawn(move || Err(thrown));
        let child = promise.chain(|v| Ok(v)).chain(|v| Ok(v));
        assert_eq!(child.wait(), Err(original));
        assert_ne!(child.wait(), Err(Error::task(Io)));
    }
}
