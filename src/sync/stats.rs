use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::{MacAddr, NetworkId};
use crate::core::serde::duration_secs;
use crate::protocol::NodeCounters;
use super::scheduler::SyncRole;

/// Lower edge of the usual transmit call duration
pub const TYPICAL_TX_MIN: Duration = Duration::from_micros(50);
/// Upper edge of the usual transmit call duration
pub const TYPICAL_TX_MAX: Duration = Duration::from_micros(150);

/// Running statistics over transmit call durations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TxLatency {
    pub count: u64,
    #[serde(with = "duration_secs")]
    pub total: Duration,
    #[serde(with = "duration_secs")]
    pub min: Duration,
    #[serde(with = "duration_secs")]
    pub max: Duration,
}

impl TxLatency {
    pub fn record(&mut self, latency: Duration) {
        if self.count == 0 || latency < self.min {
            self.min = latency;
        }
        if latency > self.max {
            self.max = latency;
        }
        self.count += 1;
        self.total = self.total.saturating_add(latency);
    }

    pub fn mean(&self) -> Duration {
        match u32::try_from(self.count) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.total / n,
            Err(_) => Duration::from_secs_f64(self.total.as_secs_f64() / self.count as f64),
        }
    }

    /// Whether a transmit took the usual 50..=150 µs
    pub fn is_typical(latency: Duration) -> bool {
        (TYPICAL_TX_MIN..=TYPICAL_TX_MAX).contains(&latency)
    }
}

/// Periodic statistics report
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub reported_at: DateTime<Utc>,
    #[serde(with = "duration_secs")]
    pub uptime: Duration,
    pub mac: MacAddr,
    pub network_id: NetworkId,
    pub role: SyncRole,
    pub counters: NodeCounters,
    pub peer_count: usize,
    pub peer_evictions: u64,
    pub tx_latency: TxLatency,
    #[serde(with = "duration_secs")]
    pub max_post_sync: Duration,
}

impl StatsSnapshot {
    /// Captured bytes per second over `window`
    pub fn capture_rate(&self, window: Duration) -> f64 {
        if window.is_zero() {
            return 0.0;
        }
        self.counters.captured_bytes as f64 / window.as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tx_latency_record() {
        let mut latency = TxLatency::default();
        assert_eq!(latency.mean(), Duration::ZERO);

        latency.record(Duration::from_micros(100));
        latency.record(Duration::from_micros(60));
        latency.record(Duration::from_micros(200));

        assert_eq!(latency.count, 3);
        assert_eq!(latency.min, Duration::from_micros(60));
        assert_eq!(latency.max, Duration::from_micros(200));
        assert_eq!(latency.total, Duration::from_micros(360));
        assert_eq!(latency.mean(), Duration::from_micros(120));
    }

    #[test]
    fn test_is_typical() {
        assert!(!TxLatency::is_typical(Duration::from_micros(49)));
        assert!(TxLatency::is_typical(Duration::from_micros(50)));
        assert!(TxLatency::is_typical(Duration::from_micros(150)));
        assert!(!TxLatency::is_typical(Duration::from_micros(151)));
    }

    #[test]
    fn test_snapshot_serialization() {
        let mut counters = NodeCounters::default();
        counters.sync_beacons_sent = 4;
        counters.captured_bytes = 2000;
        let snapshot = StatsSnapshot {
            reported_at: Utc::now(),
            uptime: Duration::from_millis(1500),
            mac: MacAddr([2, 0, 0, 0, 0, 1]),
            network_id: NetworkId([0xAB, 0xCD]),
            role: SyncRole::Anchor,
            counters,
            peer_count: 2,
            peer_evictions: 0,
            tx_latency: TxLatency::default(),
            max_post_sync: Duration::ZERO,
        };

        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["uptime"], 1.5);
        assert_eq!(value["mac"], "02:00:00:00:00:01");
        assert_eq!(value["role"], "Anchor");
        assert_eq!(value["counters"]["sync_beacons_sent"], 4);
        assert_eq!(value["peer_count"], 2);
        assert_eq!(snapshot.capture_rate(Duration::from_secs(10)), 200.0);
        assert_eq!(snapshot.capture_rate(Duration::ZERO), 0.0);
    }
}
