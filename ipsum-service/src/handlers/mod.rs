//! HTTP handlers for the ipsum service.

pub mod generate;
pub mod health;
pub mod metrics;

pub use generate::generate_lorem;
pub use health::health_check;
pub use metrics::metrics;
