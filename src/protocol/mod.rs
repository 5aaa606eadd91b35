//! Protocol implementation module
//!
//! Wire layout of NAN beacons and service discovery action frames, the TLV
//! attribute decoder, frame encoders, the local node state and the dispatch
//! state machine for received frames.
//!
//! All multi-byte integers on the wire are little-endian.

pub mod attribute;
pub mod codec;
pub mod dispatch;
pub mod frame;
pub mod message;
pub mod state;

pub use self::attribute::{decode_tlv_sequence, AttributeId, Tlv, TlvIter, TlvSequence};
pub use self::codec::{
    encode_discovery_action, encode_service_message, encode_sync_beacon, AirCodec, AirFrame,
    ServiceType,
};
pub use self::dispatch::{Dispatcher, Disposition, DropReason};
pub use self::frame::{Frame, FrameBuilder, FrameHeader, FrameKind};
pub use self::message::{
    parse_action, parse_beacon, ActionFrame, BeaconInfo, BeaconKind, ServiceControl,
    ServiceDescriptor,
};
pub use self::state::{LocalNodeState, NodeContext, NodeCounters};

// Frame type/subtype byte
pub const TYPE_BEACON: u8 = 0x80;
pub const TYPE_ACTION: u8 = 0xD0;

// Header offsets
pub const FRAME_DST: usize = 4;
pub const FRAME_SRC: usize = 10;
pub const FRAME_BSSID: usize = 16;
/// Last two BSSID octets carry the cluster network id
pub const FRAME_NETWORK_ID: usize = 20;
pub const FRAME_SEQ: usize = 22;
/// Length of the management header; fixed parameters start here
pub const HEADER_LEN: usize = 24;

// Beacon fixed parameters
pub const BEACON_TIMESTAMP: usize = 24;
pub const BEACON_INTERVAL: usize = 32;
pub const BEACON_CAPABILITIES: usize = 34;
/// Vendor specific element wrapping the NAN attributes
pub const BEACON_IE_START: usize = 36;
pub const BEACON_ATTR_START: usize = 42;

// Action frame fixed parameters
pub const ACTION_CATEGORY: usize = 24;
pub const ACTION_CODE: usize = 25;
pub const ACTION_OUI: usize = 26;
pub const ACTION_PROTOCOL: usize = 29;
pub const ACTION_ATTR_START: usize = 30;

/// Wi-Fi Alliance OUI
pub const WFA_OUI: [u8; 3] = [0x50, 0x6F, 0x9A];
/// OUI type for NAN
pub const NAN_OUI_TYPE: u8 = 0x13;
pub const CATEGORY_PUBLIC_ACTION: u8 = 0x04;
pub const ACTION_VENDOR_SPECIFIC: u8 = 0x09;
pub const ELEMENT_VENDOR_SPECIFIC: u8 = 0xDD;

/// Cluster BSSID; the last two octets are replaced by the network id
pub const RENDEZVOUS_BSSID: [u8; 6] = [0x50, 0x6F, 0x9A, 0x01, 0x00, 0x00];
/// Octets of the BSSID checked by the receive filter
pub const RENDEZVOUS_PREFIX_LEN: usize = 3;

/// Hash of the "l3dmesh" service name, our published service id
pub const SERVICE_ID: [u8; 6] = [0x75, 0x94, 0x31, 0x93, 0xEA, 0xC9];

pub const BEACON_CAPABILITY_BITS: u16 = 0x0420;

/// Follow-up payload prefix that requests an echo
pub const PING_MARKER: &[u8; 4] = b"PING";
/// Prefix of the echo reply
pub const PONG_MARKER: &[u8; 4] = b"PONG";
/// Probe sent directly to a publisher we just heard
pub const PUBLISH_PROBE: &[u8] = b"PINGp";
