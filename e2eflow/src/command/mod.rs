//! External command runner.
//!
//! Build and deploy tools are treated as opaque commands with an exit status
//! and captured output. Spawn failures and exceeded time limits are errors;
//! a nonzero exit is an ordinary [`CommandOutput`] the caller classifies.

mod line;
mod runner;

pub use line::split_command_line;
pub use runner::{run_line, CommandOutput, CommandRunner, ExternalCommand, SystemCommandRunner};

#[cfg(test)]
pub use runner::MockCommandRunner;
