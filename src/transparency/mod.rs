//! Transparency module for the GradeGuard monitor.
//!
//! Tracks what a monitoring session observed and recorded, so operators and
//! candidates can audit the session independently of the event log.

pub mod stats;

// Re-export commonly used types
pub use stats::{
    create_shared_stats, create_shared_stats_with_persistence, CumulativeStats, MonitorStats,
    SessionStats, SharedMonitorStats,
};
