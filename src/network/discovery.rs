use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, warn};

use crate::core::{Error, InstanceId, MacAddr, NetworkId, Result, MAX_SERVICE_PAYLOAD};
use crate::protocol::attribute::ClusterAttribute;
use crate::protocol::message::BeaconKind;
use crate::time::util;

/// Payload waiting for the peer's next transmit opportunity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub payload: Bytes,
    pub queued_at: Duration,
}

impl OutboundMessage {
    pub fn new(payload: impl Into<Bytes>, queued_at: Duration) -> Result<Self> {
        let payload = payload.into();
        if payload.len() > MAX_SERVICE_PAYLOAD {
            return Err(Error::PayloadTooLarge {
                len: payload.len(),
                max: MAX_SERVICE_PAYLOAD,
            });
        }
        Ok(OutboundMessage { payload, queued_at })
    }
}

/// State kept for a discovered neighbor
#[derive(Debug, Clone)]
pub struct PeerRecord {
    pub mac: MacAddr,
    pub network_id: Option<NetworkId>,
    /// The peer's own instance id, learned from its service descriptors
    pub instance_id: InstanceId,
    pub sync_beacons: u64,
    pub discovery_beacons: u64,
    pub messages_in: u64,
    pub messages_out: u64,
    pub first_seen: Duration,
    pub last_seen: Duration,
    /// Anchor master the peer announced in its last beacon
    pub announced_anchor: Option<ClusterAttribute>,
    last_subscribe: Option<Duration>,
    queue: VecDeque<OutboundMessage>,
    queue_capacity: usize,
}

impl PeerRecord {
    fn new(mac: MacAddr, now: Duration, queue_capacity: usize) -> Self {
        PeerRecord {
            mac,
            network_id: None,
            instance_id: InstanceId::default(),
            sync_beacons: 0,
            discovery_beacons: 0,
            messages_in: 0,
            messages_out: 0,
            first_seen: now,
            last_seen: now,
            announced_anchor: None,
            last_subscribe: None,
            queue: VecDeque::with_capacity(queue_capacity),
            queue_capacity,
        }
    }

    pub fn record_beacon(&mut self, kind: BeaconKind, network_id: NetworkId, now: Duration) {
        self.network_id = Some(network_id);
        self.last_seen = now;
        match kind {
            BeaconKind::Sync => self.sync_beacons += 1,
            BeaconKind::Discovery => self.discovery_beacons += 1,
        }
    }

    pub fn record_service_descriptor(&mut self, instance_id: InstanceId, now: Duration) {
        self.instance_id = instance_id;
        self.last_seen = now;
    }

    /// Marks the peer as heard from in `network_id` without a beacon
    pub fn record_action(&mut self, network_id: NetworkId, now: Duration) {
        self.network_id = Some(network_id);
        self.last_seen = now;
    }

    /// Whether a subscribe may go to this peer at `now`
    pub fn subscribe_due(&self, now: Duration, holdoff: Duration) -> bool {
        self.last_subscribe
            .map_or(true, |sent| util::elapsed(now, sent) >= holdoff)
    }

    pub fn record_subscribe(&mut self, now: Duration) {
        self.last_subscribe = Some(now);
    }

    /// Appends to the outbound queue; a full queue rejects the new message
    pub fn enqueue_outbound(&mut self, message: OutboundMessage) -> Result<()> {
        if self.queue.len() >= self.queue_capacity {
            return Err(Error::QueueFull);
        }
        self.queue.push_back(message);
        Ok(())
    }

    /// Removes and returns the oldest queued message
    pub fn dequeue_next(&mut self) -> Option<OutboundMessage> {
        self.queue.pop_front()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn summary(&self) -> PeerSummary {
        PeerSummary {
            mac: self.mac,
            network_id: self.network_id,
            instance_id: self.instance_id.0,
            sync_beacons: self.sync_beacons,
            discovery_beacons: self.discovery_beacons,
            messages_in: self.messages_in,
            messages_out: self.messages_out,
            last_seen_ms: self.last_seen.as_millis() as u64,
            queued: self.queue.len(),
        }
    }
}

/// Snapshot of one peer for diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerSummary {
    pub mac: MacAddr,
    pub network_id: Option<NetworkId>,
    pub instance_id: u8,
    pub sync_beacons: u64,
    pub discovery_beacons: u64,
    pub messages_in: u64,
    pub messages_out: u64,
    pub last_seen_ms: u64,
    pub queued: usize,
}

/// Bounded table of neighbors keyed by hardware address
///
/// When full, the least recently seen peer makes room for a new one.
#[derive(Debug)]
pub struct PeerTable {
    peers: HashMap<MacAddr, PeerRecord>,
    capacity: usize,
    queue_capacity: usize,
    evictions: u64,
}

impl PeerTable {
    pub fn new(capacity: usize, queue_capacity: usize) -> Self {
        PeerTable {
            peers: HashMap::with_capacity(capacity),
            capacity: capacity.max(1),
            queue_capacity,
            evictions: 0,
        }
    }

    /// Returns the record for `mac`, creating it (and evicting) if needed
    pub fn lookup_or_create(&mut self, mac: MacAddr, now: Duration) -> &mut PeerRecord {
        if !self.peers.contains_key(&mac) {
            if self.peers.len() >= self.capacity {
                self.evict_stalest();
            }
            debug!(peer = %mac, "New peer");
        }
        let queue_capacity = self.queue_capacity;
        self.peers
            .entry(mac)
            .or_insert_with(|| PeerRecord::new(mac, now, queue_capacity))
    }

    pub fn get(&self, mac: &MacAddr) -> Option<&PeerRecord> {
        self.peers.get(mac)
    }

    pub fn get_mut(&mut self, mac: &MacAddr) -> Option<&mut PeerRecord> {
        self.peers.get_mut(mac)
    }

    /// Queues a message for `mac`, tracking the peer if it is not known yet
    pub fn enqueue(&mut self, mac: MacAddr, payload: Bytes, now: Duration) -> Result<()> {
        let message = OutboundMessage::new(payload, now)?;
        self.lookup_or_create(mac, now).enqueue_outbound(message)
    }

    /// Queues a copy of `payload` for every known peer
    ///
    /// Returns how many peers accepted it; peers with a full queue are skipped.
    pub fn enqueue_all(&mut self, payload: Bytes, now: Duration) -> Result<usize> {
        let message = OutboundMessage::new(payload, now)?;
        let mut accepted = 0;
        for peer in self.peers.values_mut() {
            match peer.enqueue_outbound(message.clone()) {
                Ok(()) => accepted += 1,
                Err(_) => debug!(peer = %peer.mac, "Outbound queue full, broadcast skipped"),
            }
        }
        Ok(accepted)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// Summaries ordered by address
    pub fn summaries(&self) -> Vec<PeerSummary> {
        let mut out: Vec<_> = self.peers.values().map(PeerRecord::summary).collect();
        out.sort_by_key(|p| p.mac);
        out
    }

    fn evict_stalest(&mut self) {
        let stalest = self
            .peers
            .values()
            .min_by_key(|p| (p.last_seen, p.mac))
            .map(|p| p.mac);
        if let Some(mac) = stalest {
            if let Some(peer) = self.peers.remove(&mac) {
                self.evictions += 1;
                if peer.queue_len() > 0 {
                    warn!(
                        peer = %mac,
                        dropped = peer.queue_len(),
                        "Evicted peer with queued messages"
                    );
                } else {
                    debug!(peer = %mac, "Evicted stale peer");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn mac(last: u8) -> MacAddr {
        MacAddr([2, 0, 0, 0, 0, last])
    }

    fn msg(tag: u8) -> OutboundMessage {
        OutboundMessage::new(vec![tag], Duration::ZERO).unwrap()
    }

    #[test]
    fn test_queue_bound() {
        let mut table = PeerTable::new(10, 5);
        let peer = table.lookup_or_create(mac(1), Duration::ZERO);
        for i in 0..5 {
            assert_ok!(peer.enqueue_outbound(msg(i)));
        }
        let err = assert_err!(peer.enqueue_outbound(msg(5)));
        assert!(matches!(err, Error::QueueFull));
        assert_eq!(peer.queue_len(), 5);
    }

    #[test]
    fn test_dequeue_is_fifo() {
        let mut table = PeerTable::new(10, 5);
        let peer = table.lookup_or_create(mac(1), Duration::ZERO);
        for i in 0..3 {
            peer.enqueue_outbound(msg(i)).unwrap();
        }
        assert_eq!(peer.dequeue_next().unwrap().payload.as_ref(), &[0]);
        peer.enqueue_outbound(msg(3)).unwrap();
        assert_eq!(peer.dequeue_next().unwrap().payload.as_ref(), &[1]);
        assert_eq!(peer.dequeue_next().unwrap().payload.as_ref(), &[2]);
        assert_eq!(peer.dequeue_next().unwrap().payload.as_ref(), &[3]);
        assert!(peer.dequeue_next().is_none());
    }

    #[test]
    fn test_full_queue_accepts_after_dequeue() {
        let mut table = PeerTable::new(10, 5);
        let peer = table.lookup_or_create(mac(1), Duration::ZERO);
        for i in 0..5 {
            peer.enqueue_outbound(msg(i)).unwrap();
        }
        peer.dequeue_next();
        assert!(peer.enqueue_outbound(msg(9)).is_ok());
    }

    #[test]
    fn test_outbound_message_size_limit() {
        assert!(OutboundMessage::new(vec![0u8; 249], Duration::ZERO).is_ok());
        assert!(matches!(
            OutboundMessage::new(vec![0u8; 250], Duration::ZERO),
            Err(Error::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_lookup_or_create_is_keyed() {
        let mut table = PeerTable::new(10, 5);
        table.lookup_or_create(mac(1), Duration::ZERO).messages_in = 3;
        table.lookup_or_create(mac(2), Duration::ZERO);
        assert_eq!(table.len(), 2);
        assert_eq!(table.lookup_or_create(mac(1), Duration::ZERO).messages_in, 3);
        assert_eq!(table.get(&mac(2)).unwrap().messages_in, 0);
    }

    #[test]
    fn test_evicts_least_recently_seen() {
        let mut table = PeerTable::new(3, 5);
        for i in 1..=3u8 {
            table.lookup_or_create(mac(i), Duration::from_secs(i as u64));
        }
        // Peer 1 is refreshed, leaving peer 2 as the stalest.
        table
            .get_mut(&mac(1))
            .unwrap()
            .record_action(NetworkId([1, 1]), Duration::from_secs(10));

        table.lookup_or_create(mac(4), Duration::from_secs(11));
        assert_eq!(table.len(), 3);
        assert!(table.get(&mac(2)).is_none());
        assert!(table.get(&mac(1)).is_some());
        assert!(table.get(&mac(4)).is_some());
        assert_eq!(table.evictions(), 1);
    }

    #[test]
    fn test_record_beacon_counts_by_kind() {
        let mut table = PeerTable::new(10, 5);
        let peer = table.lookup_or_create(mac(1), Duration::ZERO);
        peer.record_beacon(BeaconKind::Sync, NetworkId([1, 2]), Duration::from_millis(5));
        peer.record_beacon(BeaconKind::Discovery, NetworkId([3, 4]), Duration::from_millis(6));
        peer.record_beacon(BeaconKind::Discovery, NetworkId([3, 4]), Duration::from_millis(7));
        assert_eq!(peer.sync_beacons, 1);
        assert_eq!(peer.discovery_beacons, 2);
        assert_eq!(peer.network_id, Some(NetworkId([3, 4])));
        assert_eq!(peer.last_seen, Duration::from_millis(7));
    }

    #[test]
    fn test_record_service_descriptor() {
        let mut table = PeerTable::new(10, 5);
        let peer = table.lookup_or_create(mac(1), Duration::ZERO);
        peer.record_service_descriptor(InstanceId(4), Duration::from_secs(2));
        assert_eq!(peer.instance_id, InstanceId(4));
        assert_eq!(peer.last_seen, Duration::from_secs(2));
    }

    #[test]
    fn test_subscribe_holdoff() {
        let holdoff = Duration::from_millis(490);
        let mut table = PeerTable::new(10, 5);
        let peer = table.lookup_or_create(mac(1), Duration::ZERO);
        assert!(peer.subscribe_due(Duration::ZERO, holdoff));

        peer.record_subscribe(Duration::from_secs(1));
        assert!(!peer.subscribe_due(Duration::from_millis(1489), holdoff));
        assert!(peer.subscribe_due(Duration::from_millis(1490), holdoff));
    }

    #[test]
    fn test_enqueue_all() {
        let mut table = PeerTable::new(10, 1);
        table.lookup_or_create(mac(1), Duration::ZERO);
        table.lookup_or_create(mac(2), Duration::ZERO);
        table.enqueue(mac(2), Bytes::from_static(b"x"), Duration::ZERO).unwrap();

        let accepted = table.enqueue_all(Bytes::from_static(b"all"), Duration::ZERO).unwrap();
        assert_eq!(accepted, 1);
        assert_eq!(table.get(&mac(1)).unwrap().queue_len(), 1);
    }

    #[test]
    fn test_summaries_sorted() {
        let mut table = PeerTable::new(10, 5);
        table.lookup_or_create(mac(9), Duration::ZERO);
        table.lookup_or_create(mac(3), Duration::from_millis(1500));
        let summaries = table.summaries();
        assert_eq!(summaries[0].mac, mac(3));
        assert_eq!(summaries[0].last_seen_ms, 1500);
        assert_eq!(summaries[1].mac, mac(9));
    }
}
