use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::core::{Config, InstanceId, MacAddr, NetworkId, Result};
use crate::network::discovery::PeerTable;
use crate::network::radio::{MessageSink, Radio};
use crate::sync::stats::TxLatency;
use crate::time::{util, Clock};
use crate::util::hex_dump;
use super::attribute::{ClusterAttribute, MasterIndication};
use super::frame::Frame;

/// Running counters of the local node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NodeCounters {
    pub sync_beacons_sent: u64,
    pub sync_beacons_received: u64,
    pub discovery_beacons_received: u64,
    /// Action frames carrying the NAN OUI
    pub nan_packets: u64,
    pub publishes_received: u64,
    pub subscribes_received: u64,
    pub messages_in: u64,
    pub messages_out: u64,
    /// Follow-ups addressed to another node, seen in promiscuous mode
    pub foreign_packets: u64,
    pub malformed_frames: u64,
    pub unrecognized_frames: u64,
    pub transmit_failures: u64,
    /// Frames lost because the worker queue was full
    pub rx_dropped: u64,
    pub captured_packets: u64,
    /// Bytes captured since the last statistics report
    pub captured_bytes: u64,
}

/// This device's identity, cluster membership and counters
#[derive(Debug, Clone)]
pub struct LocalNodeState {
    pub mac: MacAddr,
    /// Cluster of the most recently accepted frame; last writer wins
    pub network_id: NetworkId,
    pub instance_id: InstanceId,
    pub master_preference: u8,
    pub master_random: u8,
    pub counters: NodeCounters,
    pub last_sent_sync: Duration,
    pub last_received_sync: Duration,
    pub last_received_discovery: Duration,
    pub dump: bool,
    pub tx_latency: TxLatency,
    /// Largest gap between a received sync beacon and one of our sends
    pub max_post_sync: Duration,
}

impl LocalNodeState {
    pub fn from_config(config: &Config) -> Self {
        LocalNodeState {
            mac: config.mac.unwrap_or_else(MacAddr::random),
            network_id: NetworkId::default(),
            instance_id: InstanceId(config.instance_id),
            master_preference: config.master_preference,
            master_random: config.master_random.unwrap_or_else(rand::random),
            counters: NodeCounters::default(),
            last_sent_sync: Duration::ZERO,
            last_received_sync: Duration::ZERO,
            last_received_discovery: Duration::ZERO,
            dump: config.dump,
            tx_latency: TxLatency::default(),
            max_post_sync: Duration::ZERO,
        }
    }

    pub fn master_indication(&self) -> MasterIndication {
        MasterIndication {
            preference: self.master_preference,
            random: self.master_random,
        }
    }

    /// Cluster attribute naming this node as anchor master
    ///
    /// Anchor election is not modelled, so the node always announces itself
    /// with zero hops and a zero time delta.
    pub fn cluster_attribute(&self) -> ClusterAttribute {
        ClusterAttribute {
            anchor_master: self.mac,
            anchor_random: self.master_random,
            anchor_preference: self.master_preference,
            hop_count: 0,
            time_delta: 0,
        }
    }

    /// Joins the cluster of the latest frame, returning whether it changed
    pub fn adopt_network_id(&mut self, network_id: NetworkId) -> bool {
        if self.network_id == network_id {
            return false;
        }
        debug!(from = %self.network_id, to = %network_id, "Cluster network id changed");
        self.network_id = network_id;
        true
    }
}

/// Everything a dispatch or scheduler step may touch
///
/// Built by the worker that serializes receive and timer events, and handed
/// to one operation at a time.
pub struct NodeContext<'a> {
    pub node: &'a mut LocalNodeState,
    pub peers: &'a mut PeerTable,
    pub radio: &'a dyn Radio,
    pub sink: &'a dyn MessageSink,
    pub clock: &'a dyn Clock,
}

impl NodeContext<'_> {
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// Hands a frame to the radio, recording latency and failures
    ///
    /// Failures are counted and logged, then returned; nothing is retried here.
    pub fn transmit(&mut self, frame: &Frame, label: &'static str) -> Result<()> {
        let started = self.clock.now();
        let result = self.radio.transmit(frame.as_bytes());
        let finished = self.clock.now();

        let latency = util::elapsed(finished, started);
        let post_sync = util::elapsed(started, self.node.last_received_sync);
        self.node.tx_latency.record(latency);
        if post_sync > self.node.max_post_sync {
            self.node.max_post_sync = post_sync;
        }

        if self.node.dump {
            debug!("OUT {}\n{}", label, hex_dump(frame.as_bytes()));
        }

        match result {
            Ok(()) => {
                if !TxLatency::is_typical(latency) {
                    debug!(
                        frame = label,
                        len = frame.len(),
                        tx_us = util::as_micros(latency),
                        post_sync_us = util::as_micros(post_sync),
                        "Slow or early transmit"
                    );
                }
                Ok(())
            }
            Err(e) => {
                self.node.counters.transmit_failures += 1;
                warn!(frame = label, len = frame.len(), "Transmit failed: {}", e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Error;
    use crate::network::radio::{LogSink, RecordingRadio};
    use crate::protocol::codec::encode_sync_beacon;
    use crate::time::ManualClock;

    fn config() -> Config {
        Config {
            mac: Some(MacAddr([2, 0, 0, 0, 0, 1])),
            master_random: Some(9),
            ..Default::default()
        }
    }

    #[test]
    fn test_from_config() {
        let node = LocalNodeState::from_config(&config());
        assert_eq!(node.mac, MacAddr([2, 0, 0, 0, 0, 1]));
        assert_eq!(node.instance_id, InstanceId(1));
        assert_eq!(node.master_indication(), MasterIndication { preference: 129, random: 9 });
        assert_eq!(node.cluster_attribute().anchor_master, node.mac);
        assert_eq!(node.counters, NodeCounters::default());
    }

    #[test]
    fn test_random_identity_when_unset() {
        let node = LocalNodeState::from_config(&Config::default());
        assert!(!node.mac.is_broadcast());
        assert_eq!(node.mac.0[0] & 0x02, 0x02);
    }

    #[test]
    fn test_adopt_network_id() {
        let mut node = LocalNodeState::from_config(&config());
        assert!(node.adopt_network_id(NetworkId([1, 2])));
        assert!(!node.adopt_network_id(NetworkId([1, 2])));
        assert!(node.adopt_network_id(NetworkId([3, 4])));
        assert_eq!(node.network_id, NetworkId([3, 4]));
    }

    #[test]
    fn test_transmit_records_latency_and_failures() {
        let mut node = LocalNodeState::from_config(&config());
        let mut peers = PeerTable::new(10, 5);
        let radio = RecordingRadio::new();
        let clock = ManualClock::new(Duration::from_secs(1));
        clock.auto_advance(Duration::from_micros(80));
        let frame = encode_sync_beacon(&node, 512).unwrap();

        let mut ctx = NodeContext {
            node: &mut node,
            peers: &mut peers,
            radio: &radio,
            sink: &LogSink,
            clock: &clock,
        };
        ctx.transmit(&frame, "sync").unwrap();
        assert_eq!(ctx.node.tx_latency.count, 1);
        assert_eq!(ctx.node.tx_latency.max, Duration::from_micros(80));

        radio.fail_with(Some(-1));
        let err = ctx.transmit(&frame, "sync").unwrap_err();
        assert!(matches!(err, Error::TransmitFailure { code: -1 }));
        assert_eq!(ctx.node.counters.transmit_failures, 1);
        assert_eq!(radio.sent().len(), 1);
    }
}
