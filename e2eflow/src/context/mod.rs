//! Run context.
//!
//! [`E2eContext`] accumulates the handles acquired by setup stages so that
//! later stages, checks and teardown can consume them.

mod execution;
mod identity;

pub use execution::E2eContext;
pub use identity::RunIdentity;
