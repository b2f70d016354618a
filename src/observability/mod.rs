//! Logging and metrics export.

mod logging;
mod metrics;

pub use logging::{build_filter, init as init_logging};
pub use metrics::{install_prometheus, install_recorder};
