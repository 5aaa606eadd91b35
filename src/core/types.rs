use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{Error, Result};

/// 48-bit hardware address
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// The all-ones broadcast address
    pub const BROADCAST: MacAddr = MacAddr([0xFF; 6]);

    /// Generates a random, locally administered unicast address
    pub fn random() -> Self {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; 6];
        rng.fill(&mut bytes);
        // Locally administered, unicast.
        bytes[0] = (bytes[0] | 0x02) & 0xFE;
        MacAddr(bytes)
    }

    /// Reads an address from the first 6 bytes of `bytes`
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; 6] = bytes.get(..6)?.try_into().ok()?;
        Some(MacAddr(raw))
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddr({})", self)
    }
}

impl FromStr for MacAddr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut bytes = [0u8; 6];
        let mut parts = s.split(|c| c == ':' || c == '-');
        for byte in bytes.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| Error::config(format!("MAC address too short: {}", s)))?;
            *byte = u8::from_str_radix(part, 16)
                .map_err(|e| Error::config(format!("Invalid MAC octet {:?}: {}", part, e)))?;
        }
        if parts.next().is_some() {
            return Err(Error::config(format!("MAC address too long: {}", s)));
        }
        Ok(MacAddr(bytes))
    }
}

/// 2-byte cluster identifier carried in the last two BSSID octets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct NetworkId(pub [u8; 2]);

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}{:02x}", self.0[0], self.0[1])
    }
}

/// Small handle a node picks for its published service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct InstanceId(pub u8);

/// Configuration for a NAN node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Hardware address; a random local address is used when absent
    pub mac: Option<MacAddr>,
    /// Master preference announced in sync beacons
    pub master_preference: u8,
    /// Master random factor; drawn at startup when absent
    pub master_random: Option<u8>,
    /// Instance id of our published service
    pub instance_id: u8,
    /// Beacon interval (TU) written into our sync beacons
    pub sync_interval_tu: u16,
    /// Minimum spacing between two of our sync beacons
    #[serde(with = "super::serde::duration_secs")]
    pub sync_guard: Duration,
    /// Nominal scheduler period
    #[serde(with = "super::serde::duration_secs")]
    pub tick_interval: Duration,
    /// Delays below this are treated as a late callback
    #[serde(with = "super::serde::duration_secs")]
    pub min_delay: Duration,
    /// Delay used in place of a near-zero one
    #[serde(with = "super::serde::duration_secs")]
    pub drift_fallback: Duration,
    /// Period of the aggregated statistics report
    #[serde(with = "super::serde::duration_secs")]
    pub stats_interval: Duration,
    /// Minimum spacing between two subscribes sent to the same peer
    #[serde(with = "super::serde::duration_secs")]
    pub subscribe_holdoff: Duration,
    /// Delay before the first scheduler tick, to hear existing clusters first
    #[serde(with = "super::serde::duration_secs")]
    pub startup_delay: Duration,
    /// Maximum number of tracked peers
    pub peer_capacity: usize,
    /// Per-peer outbound queue capacity
    pub queue_capacity: usize,
    /// Service info attached to our publish/subscribe frames
    pub service_info: Vec<u8>,
    /// Drop service descriptors whose service id is not ours
    pub strict_service_id: bool,
    /// Hex-dump inbound and outbound frames
    pub dump: bool,
    /// Logical interface id reported with upward deliveries
    pub interface_id: u32,
    /// Capacity of the worker command queue
    pub command_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mac: None,
            master_preference: 129,
            master_random: None,
            instance_id: 1,
            sync_interval_tu: super::SYNC_BEACON_INTERVAL_TU,
            sync_guard: Duration::from_millis(490),
            tick_interval: Duration::from_millis(512),
            min_delay: Duration::from_millis(1),
            drift_fallback: Duration::from_millis(100),
            stats_interval: Duration::from_secs(10),
            subscribe_holdoff: Duration::from_millis(490),
            startup_delay: Duration::from_secs(5),
            peer_capacity: super::DEFAULT_PEER_CAPACITY,
            queue_capacity: super::DEFAULT_QUEUE_CAPACITY,
            service_info: Vec::new(),
            strict_service_id: false,
            dump: false,
            interface_id: 0,
            command_buffer: 256,
        }
    }
}

impl Config {
    /// Checks the configuration for values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.peer_capacity == 0 {
            return Err(Error::config("peer_capacity must be at least 1"));
        }
        if self.queue_capacity == 0 {
            return Err(Error::config("queue_capacity must be at least 1"));
        }
        if self.command_buffer == 0 {
            return Err(Error::config("command_buffer must be at least 1"));
        }
        if self.tick_interval.is_zero() || self.min_delay >= self.tick_interval {
            return Err(Error::config("min_delay must be below a non-zero tick_interval"));
        }
        if self.drift_fallback.is_zero() {
            return Err(Error::config("drift_fallback must be non-zero"));
        }
        if self.subscribe_holdoff.is_zero() {
            return Err(Error::config("subscribe_holdoff must be non-zero"));
        }
        if self.service_info.len() > super::MAX_SERVICE_PAYLOAD {
            return Err(Error::PayloadTooLarge {
                len: self.service_info.len(),
                max: super::MAX_SERVICE_PAYLOAD,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_random_is_local_unicast() {
        let mac = MacAddr::random();
        assert_eq!(mac.0[0] & 0x02, 0x02);
        assert_eq!(mac.0[0] & 0x01, 0x00);
        assert!(!mac.is_broadcast());
    }

    #[test]
    fn test_mac_parse_and_display() {
        let mac: MacAddr = "02:eb:23:0a:c9:31".parse().unwrap();
        assert_eq!(mac.0, [0x02, 0xeb, 0x23, 0x0a, 0xc9, 0x31]);
        assert_eq!(mac.to_string(), "02:eb:23:0a:c9:31");

        assert!("02:eb:23".parse::<MacAddr>().is_err());
        assert!("02:eb:23:0a:c9:31:00".parse::<MacAddr>().is_err());
        assert!("zz:eb:23:0a:c9:31".parse::<MacAddr>().is_err());
    }

    #[test]
    fn test_mac_from_slice() {
        assert_eq!(MacAddr::from_slice(&[0xFF; 8]), Some(MacAddr::BROADCAST));
        assert_eq!(MacAddr::from_slice(&[1, 2, 3]), None);
    }

    #[test]
    fn test_config_defaults_validate() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.queue_capacity, 5);
        assert_eq!(config.peer_capacity, 10);
    }

    #[test]
    fn test_config_rejects_bad_values() {
        let config = Config {
            queue_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = Config {
            min_delay: Duration::from_secs(1),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            subscribe_holdoff: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = Config {
            service_info: vec![0; 300],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::PayloadTooLarge { .. })));
    }

    #[test]
    fn test_config_json_roundtrip() {
        let config = Config {
            mac: Some(MacAddr([2, 0, 0, 0, 0, 1])),
            dump: true,
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"02:00:00:00:00:01\""));

        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.mac, config.mac);
        assert_eq!(parsed.sync_guard, Duration::from_millis(490));
        assert!(parsed.dump);
    }

    #[test]
    fn test_config_partial_json_uses_defaults() {
        let parsed: Config = serde_json::from_str(r#"{"instance_id": 7}"#).unwrap();
        assert_eq!(parsed.instance_id, 7);
        assert_eq!(parsed.tick_interval, Duration::from_millis(512));
    }
}
