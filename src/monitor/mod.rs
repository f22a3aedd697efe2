pub mod evaluator;
pub mod probe;
pub mod runner;

pub use runner::{CycleSummary, MonitorEngine};
