use std::any::Any;
use std::sync::Arc;

use thiserror::Error;

/// The error a promise settles with when nothing more specific is chosen.
///
/// Promises are generic over their error type, but the library itself has to
/// report a few failures of its own (a panicking task, a task the spawner
/// threw away, a race over nothing). Those are raised as this type and
/// converted into the promise's error type through `From<Error>`.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("{0}")]
    Message(Arc<str>),
    #[error(transparent)]
    Task(Arc<dyn std::error::Error + Send + Sync + 'static>),
    #[error("task panicked: {0}")]
    Panicked(Arc<str>),
    #[error("task was dropped before it ran")]
    TaskDropped,
    #[error("race over an empty set of promises")]
    EmptyRace,
}

impl Error {
    /// Plain message error.
    pub fn msg(message: impl Into<Arc<str>>) -> Self {
        Error::Message(message.into())
    }

    /// Wraps any error. Two `Task` errors are equal only if they wrap the
    /// same allocation, so identity survives every combinator.
    pub fn task<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Task(Arc::new(err))
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message: Arc<str> = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).into()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.as_str().into()
        } else {
            "Box<dyn Any>".into()
        };
        Error::Panicked(message)
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Error::Message(a), Error::Message(b)) => a == b,
            (Error::Task(a), Error::Task(b)) => Arc::ptr_eq(a, b),
            (Error::Panicked(a), Error::Panicked(b)) => a == b,
            (Error::TaskDropped, Error::TaskDropped) => true,
            (Error::EmptyRace, Error::EmptyRace) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[derive(Debug, thiserror::Error)]
    #[error("disk on fire")]
    struct DiskError;

    #[test]
    fn test_task_errors_compare_by_identity() {
        let a = Error::task(DiskError);
        let b = Error::task(DiskError);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_eq!(a.to_string(), "disk on fire");
    }

    #[test]
    fn test_messages_compare_by_value() {
        assert_eq!(Error::msg("boom"), Error::msg(String::from("boom")));
        assert_ne!(Error::msg("boom"), Error::Panicked("boom".into()));
    }

    #[test]
    fn test_panic_payloads() {
        let err = Error::from_panic(Box::new("static"));
        assert_eq!(err, Error::Panicked("static".into()));
        let err = Error::from_panic(Box::new(String::from("owned")));
        assert_eq!(err.to_string(), "task panicked: owned");
        let err = Error::from_panic(Box::new(7u8));
        assert_eq!(err, Error::Panicked("Box<dyn Any>".into()));
    }
}
