//! Synchronization primitives for multi-threaded async programming.

pub mod barrier;
pub mod broadcast;
pub mod error;
pub mod single_flight;
mod waker_set;
