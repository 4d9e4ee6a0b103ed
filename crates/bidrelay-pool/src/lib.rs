#![doc = include_str!("../README.md")]

mod error;
mod manager;
mod worker;

#[cfg(test)]
mod tests;

pub use error::{PoolError, Result};
pub use manager::{PoolStats, WorkerPool};

/// An opaque unit of work. Jobs carry no result channel; anything they
/// produce must be sent out through state they capture.
pub type Job = Box<dyn FnOnce() + Send + 'static>;
