use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::types::MacAddr;

/// Durations as fractional seconds, for use with `#[serde(with = ...)]`
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Serializes a MAC address as `aa:bb:cc:dd:ee:ff`
impl Serialize for MacAddr {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// Deserializes a MAC address from `aa:bb:cc:dd:ee:ff` or `aa-bb-..`
impl<'de> Deserialize<'de> for MacAddr {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_duration_serialization() {
        #[derive(Serialize, Deserialize)]
        struct Test {
            #[serde(with = "duration_secs")]
            delay: Duration,
        }

        let original = Test {
            delay: Duration::from_millis(1500),
        };

        let serialized = serde_json::to_string(&original).unwrap();
        assert_eq!(serialized, r#"{"delay":1.5}"#);
        let deserialized: Test = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized.delay, original.delay);

        assert!(serde_json::from_str::<Test>(r#"{"delay":-1.0}"#).is_err());
    }

    #[test]
    fn test_mac_serialization() {
        let mac = MacAddr([0x50, 0x6f, 0x9a, 0x01, 0x02, 0x03]);
        let json = serde_json::to_string(&mac).unwrap();
        assert_eq!(json, r#""50:6f:9a:01:02:03""#);

        let parsed: MacAddr = serde_json::from_str(r#""50-6F-9A-01-02-03""#).unwrap();
        assert_eq!(parsed, mac);
    }
}
