pub mod cycle;
pub mod dedup;
pub mod matcher;
pub mod scheduler;
pub mod stats;


pub use cycle::{CycleError, CycleOutcome, CycleResult, MonitoringCycle, ProcessingError};
pub use dedup::DedupTracker;
pub use matcher::matches;
pub use scheduler::{Scheduler, SchedulerState};
pub use stats::StatsRecorder;
