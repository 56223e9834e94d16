//! Execution timing and run reporting.

pub mod export;
pub mod metrics;
pub mod timer;

pub use export::{JsonExporter, ReportExporter, RunReport};
pub use metrics::{TimingStats, TimingSummary};
pub use timer::{Checkpoint, ExecutionTimer};
