//! Core types for the NAN engine
//!
//! Errors, addresses, identifiers and the node configuration shared by every
//! other module.

pub mod error;
pub mod serde;
pub mod types;

pub use self::error::{Error, Result};
pub use self::types::{Config, InstanceId, MacAddr, NetworkId};

/// Largest frame the radio transmit primitive accepts
pub const MAX_FRAME_SIZE: usize = 512;

/// Largest service-info payload carried in a single follow-up
pub const MAX_SERVICE_PAYLOAD: usize = 249;

/// Beacon interval (TU) that marks a sync beacon
pub const SYNC_BEACON_INTERVAL_TU: u16 = 512;

/// Default number of tracked peers
pub const DEFAULT_PEER_CAPACITY: usize = 10;

/// Default per-peer outbound queue depth
pub const DEFAULT_QUEUE_CAPACITY: usize = 5;
