//! Readiness polling.
//!
//! A [`Condition`] is a stateless predicate over the environment plus a
//! timeout and a poll interval. [`wait_for`] re-evaluates it until it holds,
//! the timeout elapses, or the run is cancelled.

mod condition;
mod poller;

pub use condition::{Condition, ProbeFuture};
pub use poller::wait_for;
