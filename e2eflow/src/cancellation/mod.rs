//! Cooperative cancellation for test runs.
//!
//! The [`CancellationToken`] travels inside the run context so readiness
//! waits and long commands can observe an externally triggered stop.

mod token;

pub use token::CancellationToken;
