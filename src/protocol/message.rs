use crate::core::{Error, InstanceId, MacAddr, NetworkId, Result, SYNC_BEACON_INTERVAL_TU};
use super::attribute::{
    decode_tlv_sequence, AttributeId, ClusterAttribute, MasterIndication, TlvIter,
};
use super::frame::{FrameHeader, FrameKind};
use super::{
    ACTION_ATTR_START, ACTION_CATEGORY, ACTION_CODE, ACTION_OUI, ACTION_PROTOCOL,
    ACTION_VENDOR_SPECIFIC, BEACON_ATTR_START, BEACON_IE_START, BEACON_INTERVAL,
    CATEGORY_PUBLIC_ACTION, ELEMENT_VENDOR_SPECIFIC, NAN_OUI_TYPE, WFA_OUI,
};

/// Beacon flavour, told apart by the interval field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeaconKind {
    /// ~512 TU: sent in discovery windows, opens a transmit opportunity
    Sync,
    /// ~100 TU: presence only
    Discovery,
}

impl BeaconKind {
    pub fn from_interval(interval_tu: u16) -> Self {
        if interval_tu == SYNC_BEACON_INTERVAL_TU {
            BeaconKind::Sync
        } else {
            BeaconKind::Discovery
        }
    }
}

/// Decoded beacon
#[derive(Debug, Clone)]
pub struct BeaconInfo {
    pub source: MacAddr,
    pub network_id: NetworkId,
    pub interval_tu: u16,
    pub kind: BeaconKind,
    pub master: Option<MasterIndication>,
    pub cluster: Option<ClusterAttribute>,
    pub service_ids: Vec<[u8; 6]>,
    /// Set when the NAN element was present but its attributes were cut short
    pub attributes_truncated: bool,
}

/// Parses a beacon
///
/// The fixed parameters are required. The NAN vendor element is decoded on a
/// best-effort basis: a missing or foreign element leaves the attribute
/// fields empty, and a malformed one keeps whatever decoded before the fault.
pub fn parse_beacon(frame: &[u8]) -> Result<BeaconInfo> {
    let header = FrameHeader::parse(frame)?;
    if header.kind() != FrameKind::Beacon {
        return Err(Error::unrecognized(format!(
            "type {:#04x} is not a beacon",
            header.type_byte()
        )));
    }
    if frame.len() < BEACON_IE_START {
        return Err(Error::malformed(format!(
            "beacon of {} bytes lacks fixed parameters",
            frame.len()
        )));
    }

    let interval_tu = u16::from_le_bytes([frame[BEACON_INTERVAL], frame[BEACON_INTERVAL + 1]]);
    let mut info = BeaconInfo {
        source: header.source(),
        network_id: header.network_id(),
        interval_tu,
        kind: BeaconKind::from_interval(interval_tu),
        master: None,
        cluster: None,
        service_ids: Vec::new(),
        attributes_truncated: false,
    };

    let Some(region) = nan_element(frame) else {
        return Ok(info);
    };
    for item in decode_tlv_sequence(region, 0) {
        let tlv = match item {
            Ok(tlv) => tlv,
            Err(_) => {
                info.attributes_truncated = true;
                break;
            }
        };
        let parsed = match tlv.id() {
            AttributeId::MasterIndication => {
                MasterIndication::parse(tlv.value).map(|m| info.master = Some(m))
            }
            AttributeId::Cluster => {
                ClusterAttribute::parse(tlv.value).map(|c| info.cluster = Some(c))
            }
            AttributeId::ServiceIdList => {
                info.service_ids.extend(
                    tlv.value
                        .chunks_exact(6)
                        .map(|c| [c[0], c[1], c[2], c[3], c[4], c[5]]),
                );
                Ok(())
            }
            _ => Ok(()),
        };
        if parsed.is_err() {
            info.attributes_truncated = true;
            break;
        }
    }
    Ok(info)
}

/// Attribute region of the NAN vendor element of a beacon, if present
fn nan_element(frame: &[u8]) -> Option<&[u8]> {
    let ie = frame.get(BEACON_IE_START..BEACON_ATTR_START)?;
    if ie[0] != ELEMENT_VENDOR_SPECIFIC || ie[2..5] != WFA_OUI || ie[5] != NAN_OUI_TYPE {
        return None;
    }
    // Element length counts the OUI and type.
    let end = (BEACON_IE_START + 2 + ie[1] as usize).min(frame.len());
    frame.get(BEACON_ATTR_START..end)
}

/// A NAN service discovery action frame
#[derive(Debug, Clone, Copy)]
pub struct ActionFrame<'a> {
    pub header: FrameHeader<'a>,
}

impl<'a> ActionFrame<'a> {
    /// Lazily decodes the attributes following the fixed parameters
    pub fn attributes(&self) -> TlvIter<'a> {
        decode_tlv_sequence(self.header.frame(), ACTION_ATTR_START)
    }
}

/// Validates the fixed parameters of an action frame
///
/// A frame that is not public-action/vendor-specific with the NAN OUI and
/// protocol id is reported as [`Error::UnrecognizedProtocol`]; only a frame
/// too short to hold the fixed parameters is [`Error::MalformedFrame`].
pub fn parse_action(frame: &[u8]) -> Result<ActionFrame<'_>> {
    let header = FrameHeader::parse(frame)?;
    if header.kind() != FrameKind::Action {
        return Err(Error::unrecognized(format!(
            "type {:#04x} is not an action frame",
            header.type_byte()
        )));
    }
    if frame.len() < ACTION_ATTR_START {
        return Err(Error::malformed(format!(
            "action frame of {} bytes lacks fixed parameters",
            frame.len()
        )));
    }
    if frame[ACTION_CATEGORY] != CATEGORY_PUBLIC_ACTION
        || frame[ACTION_CODE] != ACTION_VENDOR_SPECIFIC
        || frame[ACTION_OUI..ACTION_OUI + 3] != WFA_OUI
    {
        return Err(Error::unrecognized(format!(
            "action {:02x}/{:02x} oui {:02x}{:02x}{:02x}",
            frame[ACTION_CATEGORY],
            frame[ACTION_CODE],
            frame[ACTION_OUI],
            frame[ACTION_OUI + 1],
            frame[ACTION_OUI + 2]
        )));
    }
    if frame[ACTION_PROTOCOL] != NAN_OUI_TYPE {
        return Err(Error::unrecognized(format!(
            "WFA action with protocol id {:#04x}",
            frame[ACTION_PROTOCOL]
        )));
    }
    Ok(ActionFrame { header })
}

/// Service control byte of a service descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceControl {
    /// Publish, service info present
    Publish,
    /// Subscribe, service info present
    Subscribe,
    /// Follow-up, service info present
    FollowUp,
    Other(u8),
}

impl ServiceControl {
    pub fn from_u8(byte: u8) -> Self {
        match byte {
            0x10 => ServiceControl::Publish,
            0x11 => ServiceControl::Subscribe,
            0x12 => ServiceControl::FollowUp,
            other => ServiceControl::Other(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            ServiceControl::Publish => 0x10,
            ServiceControl::Subscribe => 0x11,
            ServiceControl::FollowUp => 0x12,
            ServiceControl::Other(other) => other,
        }
    }
}

/// Service descriptor attribute value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceDescriptor<'a> {
    pub service_id: [u8; 6],
    pub instance_id: InstanceId,
    pub requestor_instance_id: InstanceId,
    pub control: ServiceControl,
    pub service_info: &'a [u8],
}

impl<'a> ServiceDescriptor<'a> {
    /// service id + instance + requestor + control + info length
    pub const FIXED_LEN: usize = 10;

    pub fn parse(value: &'a [u8]) -> Result<Self> {
        if value.len() < Self::FIXED_LEN {
            return Err(Error::malformed(format!(
                "service descriptor of {} bytes, need at least {}",
                value.len(),
                Self::FIXED_LEN
            )));
        }
        let info_len = value[9] as usize;
        let info = value
            .get(Self::FIXED_LEN..Self::FIXED_LEN + info_len)
            .ok_or_else(|| {
                Error::malformed(format!(
                    "service info declares {} bytes, attribute holds {}",
                    info_len,
                    value.len() - Self::FIXED_LEN
                ))
            })?;
        let mut service_id = [0u8; 6];
        service_id.copy_from_slice(&value[0..6]);
        Ok(ServiceDescriptor {
            service_id,
            instance_id: InstanceId(value[6]),
            requestor_instance_id: InstanceId(value[7]),
            control: ServiceControl::from_u8(value[8]),
            service_info: info,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::FrameBuilder;
    use crate::protocol::{SERVICE_ID, TYPE_ACTION, TYPE_BEACON};

    const PEER: MacAddr = MacAddr([0x02, 0x11, 0x22, 0x33, 0x44, 0x55]);

    fn broadcast_beacon(network_id: NetworkId) -> FrameBuilder {
        FrameBuilder::management(TYPE_BEACON, MacAddr::BROADCAST, PEER, network_id)
    }

    fn action_prefix() -> FrameBuilder {
        FrameBuilder::management(TYPE_ACTION, MacAddr::BROADCAST, PEER, NetworkId([1, 2]))
            .put_u8(CATEGORY_PUBLIC_ACTION)
            .put_u8(ACTION_VENDOR_SPECIFIC)
            .put_slice(&WFA_OUI)
            .put_u8(NAN_OUI_TYPE)
    }

    #[test]
    fn test_beacon_kind_from_interval() {
        assert_eq!(BeaconKind::from_interval(512), BeaconKind::Sync);
        assert_eq!(BeaconKind::from_interval(100), BeaconKind::Discovery);
        assert_eq!(BeaconKind::from_interval(128), BeaconKind::Discovery);
    }

    #[test]
    fn test_parse_beacon_without_nan_element() {
        let frame = broadcast_beacon(NetworkId([9, 8]))
            .put_slice(&[0; 8])
            .put_u16_le(100)
            .put_u16_le(0)
            .build()
            .unwrap();
        let info = parse_beacon(frame.as_bytes()).unwrap();
        assert_eq!(info.kind, BeaconKind::Discovery);
        assert_eq!(info.network_id, NetworkId([9, 8]));
        assert!(info.master.is_none());
        assert!(!info.attributes_truncated);
    }

    #[test]
    fn test_parse_beacon_rejects_short_fixed_params() {
        let frame = broadcast_beacon(NetworkId::default())
            .put_slice(&[0; 9])
            .build()
            .unwrap();
        assert!(matches!(
            parse_beacon(frame.as_bytes()),
            Err(Error::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_parse_beacon_truncated_element() {
        let mut raw = broadcast_beacon(NetworkId::default())
            .put_slice(&[0; 8])
            .put_u16_le(512)
            .put_u16_le(0)
            .element(
                ELEMENT_VENDOR_SPECIFIC,
                &[0x50, 0x6F, 0x9A, 0x13, 0x00, 0x02, 0x00, 129, 3, 0x01, 0x0d, 0x00, 1, 2],
            )
            .build()
            .unwrap()
            .into_bytes()
            .to_vec();
        raw.truncate(raw.len() - 1);

        let info = parse_beacon(&raw).unwrap();
        assert_eq!(info.kind, BeaconKind::Sync);
        assert_eq!(info.master, Some(MasterIndication { preference: 129, random: 3 }));
        assert!(info.cluster.is_none());
        assert!(info.attributes_truncated);
    }

    #[test]
    fn test_parse_action_validates_fixed_fields() {
        let frame = action_prefix().build().unwrap();
        let action = parse_action(frame.as_bytes()).unwrap();
        assert_eq!(action.header.source(), PEER);
        assert_eq!(action.attributes().count(), 0);

        let mut raw = frame.as_bytes().to_vec();
        raw[ACTION_OUI] = 0x00;
        assert!(matches!(parse_action(&raw), Err(Error::UnrecognizedProtocol(_))));

        let mut raw = frame.as_bytes().to_vec();
        raw[ACTION_PROTOCOL] = 0x09;
        assert!(matches!(parse_action(&raw), Err(Error::UnrecognizedProtocol(_))));

        let raw = &frame.as_bytes()[..ACTION_ATTR_START - 1];
        assert!(matches!(parse_action(raw), Err(Error::MalformedFrame(_))));
    }

    #[test]
    fn test_service_descriptor_parse() {
        let mut value = SERVICE_ID.to_vec();
        value.extend_from_slice(&[4, 1, 0x12, 3, b'a', b'b', b'c']);
        let sd = ServiceDescriptor::parse(&value).unwrap();
        assert_eq!(sd.service_id, SERVICE_ID);
        assert_eq!(sd.instance_id, InstanceId(4));
        assert_eq!(sd.requestor_instance_id, InstanceId(1));
        assert_eq!(sd.control, ServiceControl::FollowUp);
        assert_eq!(sd.service_info, b"abc");
    }

    #[test]
    fn test_service_descriptor_info_overrun() {
        let mut value = SERVICE_ID.to_vec();
        value.extend_from_slice(&[4, 1, 0x12, 200, b'a']);
        assert!(matches!(
            ServiceDescriptor::parse(&value),
            Err(Error::MalformedFrame(_))
        ));
        assert!(ServiceDescriptor::parse(&SERVICE_ID).is_err());
    }

    #[test]
    fn test_service_control_mapping() {
        for byte in [0x10, 0x11, 0x12, 0x00, 0x22] {
            assert_eq!(ServiceControl::from_u8(byte).as_u8(), byte);
        }
    }
}
