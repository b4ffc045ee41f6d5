//! Fleet-wide client statistics for Convoy
//!
//! Samples every routable worker's metrics endpoint concurrently, tolerates
//! partial failure by flagging unobserved workers as stale, and writes the
//! aggregate to a JSON report for external collaborators. The daemon feeds
//! each aggregate's total into the supervisor's capacity pressure handling.

pub mod aggregate;
pub mod error;
pub mod report;
pub mod source;

pub use aggregate::{AggregateStats, StatsAggregator, WorkerStats};
pub use error::{StatsError, StatsResult};
pub use report::ReportWriter;
pub use source::{HttpStatsSource, StatsSource, WorkerMetrics};
