//! Promises for tasks running on background threads.
//!
//! A [`Promise`] is spawned with a task returning `Result<T, E>` and settles
//! exactly once, when that task returns. Any number of threads or async
//! tasks can wait on it, and new promises can be derived from it:
//!
//! - [`chain`](Promise::chain) runs on success,
//! - [`recover`](Promise::recover) runs on failure,
//! - [`finalize`](Promise::finalize) runs either way and keeps the value,
//! - [`pipe`](Promise::pipe) maps the whole outcome.
//!
//! Groups of promises are combined with [`all`], [`all_settled`], [`race`]
//! and [`any`].
//!
//! # Examples
//!
//! ```
//! use thenable::{all_settled, Error, Promise, Settled};
//!
//! let parsed: Promise<i32> = Promise::spawn(|| "12".parse::<i32>().map_err(Error::task));
//! let doubled = parsed.chain(|n| Ok(n * 2));
//! let broken: Promise<i32> = Promise::spawn(|| Err(Error::msg("no input")));
//!
//! let outcomes = all_settled([doubled, broken.clone()]);
//! assert_eq!(outcomes[0], Settled::Fulfilled(24));
//! assert!(outcomes[1].is_rejected());
//!
//! let fallback = broken.recover(|_| Ok(-1));
//! assert_eq!(fallback.wait(), Ok(-1));
//! ```
//!
//! Tasks run on the [default spawner](default_spawner), one thread per task,
//! unless another [`Spawn`] implementation such as a [`ThreadPool`] is
//! passed to [`Promise::spawn_on`]. A panicking task settles its promise with
//! [`Error::Panicked`] instead of leaving it pending.
//!
//! There is no cancellation and no timeout: once spawned, a task runs to
//! completion.

mod error;
mod join;
mod latch;
mod pool;
mod promise;
mod spawn;
mod then;

pub use error::Error;
pub use join::{all, all_settled, any, race, Settled};
pub use pool::ThreadPool;
pub use promise::{Promise, Settle};
pub use spawn::{default_spawner, Builder, Job, Spawn, ThreadSpawner};
