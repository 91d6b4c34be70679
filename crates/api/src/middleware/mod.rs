pub mod logging;

pub use logging::{get_tracing_layer, logging_middleware};
