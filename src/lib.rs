//! NAN Aware: neighbor discovery, cluster sync and short messages over raw
//! 802.11 management frames
//!
//! Nodes announce themselves with sync beacons, answer each other's publish
//! and subscribe service discovery frames, and exchange payloads of up to
//! 249 bytes in follow-up frames sent right after the peer's sync beacon.
//! The radio driver sits behind [`network::Radio`]; [`network::UdpMedium`]
//! stands in for it on a host.
//!
//! ```no_run
//! use std::sync::Arc;
//! use nan_aware::core::Config;
//! use nan_aware::network::{LogSink, NanNode, UdpMedium};
//!
//! # async fn demo() -> nan_aware::Result<()> {
//! let medium = Arc::new(UdpMedium::bind("0.0.0.0:5228".parse().unwrap())?);
//! let node = NanNode::new(Config::default(), medium.clone(), Arc::new(LogSink))?;
//! medium.spawn_receiver(node.frame_sender())?;
//! node.run().await
//! # }
//! ```

pub mod core;
pub mod network;
pub mod protocol;
pub mod sync;
pub mod time;
pub mod util;

// Re-export commonly used items
pub use crate::core::{Config, Error, MacAddr, Result};
pub use crate::network::{NanNode, NodeHandle};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
