//! Synchronization module
//!
//! The periodic scheduler that emits sync beacons and statistics reports,
//! and the metrics it reports.

pub mod scheduler;
pub mod stats;

pub use self::scheduler::{SyncRole, SyncScheduler, TickOutcome};
pub use self::stats::{StatsSnapshot, TxLatency};
