mod metrics;
mod metrics_handler;

pub use metrics::{init_metrics, Metrics};
pub use metrics_handler::handle_metrics;
