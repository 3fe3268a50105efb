//! Observability utilities.

mod logging;
mod spans;

pub use logging::{init_tracing, LogFormat};
pub use spans::{SpanTimer, StageSpanAttributes};
