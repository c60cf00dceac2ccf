use std::fmt;

/// Error returned by [`Group::run`](crate::sync::single_flight::Group::run)
/// to the owning caller and every coalesced waiter alike.
#[derive(Clone, PartialEq, Eq)]
pub enum RunError<E> {
    /// The work returned an error; the same value is shared with all waiters.
    Failed(E),
    /// The work panicked; carries the panic message.
    Panicked(String),
    /// The owning call was dropped before the work completed.
    Abandoned,
}

impl<E> fmt::Debug for RunError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::Failed(_) => f.write_str("RunError::Failed(..)"),
            RunError::Panicked(msg) => write!(f, "RunError::Panicked({msg:?})"),
            RunError::Abandoned => f.write_str("RunError::Abandoned"),
        }
    }
}

impl<E> fmt::Display for RunError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::Failed(_) => f.write_str("work failed"),
            RunError::Panicked(msg) => write!(f, "work panicked: {msg}"),
            RunError::Abandoned => f.write_str("work abandoned before completion"),
        }
    }
}

impl<E> std::error::Error for RunError<E> {}
