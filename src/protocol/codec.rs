use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::{Error, InstanceId, MacAddr, Result, MAX_FRAME_SIZE, MAX_SERVICE_PAYLOAD};
use super::attribute::AttributeId;
use super::frame::{Frame, FrameBuilder};
use super::message::ServiceControl;
use super::state::LocalNodeState;
use super::{
    ACTION_VENDOR_SPECIFIC, BEACON_CAPABILITY_BITS, CATEGORY_PUBLIC_ACTION,
    ELEMENT_VENDOR_SPECIFIC, NAN_OUI_TYPE, SERVICE_ID, TYPE_ACTION, TYPE_BEACON, WFA_OUI,
};

/// Device capability attribute value: committed DW info, 2.4 GHz only
const DEVICE_CAPABILITY: [u8; 9] = [0x00, 0x01, 0x00, 0x04, 0x01, 0x00, 0x00, 0x14, 0x00];

/// Availability attribute value advertising every slot on channel 6
const AVAILABILITY: [u8; 27] = [
    0x0b, 0x01, 0x00, 0x16, 0x00, 0x1a, 0x10, 0x18, 0x00, 0x04, 0xfe, 0xff, 0xff, 0x3f, 0x31,
    0x51, 0xff, 0x07, 0x00, 0x80, 0x20, 0x00, 0x0f, 0x80, 0x01, 0x00, 0x0f,
];

/// Which discovery function a publish/subscribe frame announces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceType {
    Publish,
    Subscribe,
}

impl ServiceType {
    pub fn control(self) -> ServiceControl {
        match self {
            ServiceType::Publish => ServiceControl::Publish,
            ServiceType::Subscribe => ServiceControl::Subscribe,
        }
    }
}

/// Builds a sync beacon announcing this node as its own anchor master
///
/// The timestamp field is left zero: the radio overwrites it on transmit.
pub fn encode_sync_beacon(node: &LocalNodeState, interval_tu: u16) -> Result<Frame> {
    let mut nan = Vec::with_capacity(34);
    nan.put_slice(&WFA_OUI);
    nan.put_u8(NAN_OUI_TYPE);
    put_attribute(&mut nan, AttributeId::MasterIndication, &node.master_indication().to_bytes());
    put_attribute(&mut nan, AttributeId::Cluster, &node.cluster_attribute().to_bytes());
    put_attribute(&mut nan, AttributeId::ServiceIdList, &SERVICE_ID);

    FrameBuilder::management(TYPE_BEACON, MacAddr::BROADCAST, node.mac, node.network_id)
        .put_slice(&[0u8; 8])
        .put_u16_le(interval_tu)
        .put_u16_le(BEACON_CAPABILITY_BITS)
        .element(ELEMENT_VENDOR_SPECIFIC, &nan)
        .build()
}

/// Builds a broadcast publish or subscribe service discovery frame
pub fn encode_discovery_action(
    node: &LocalNodeState,
    service_type: ServiceType,
    requestor_instance_id: InstanceId,
    payload: &[u8],
) -> Result<Frame> {
    let control = service_type.control();
    let descriptor = service_descriptor(node.instance_id, requestor_instance_id, control, payload)?;
    let extension = [node.instance_id.0, 0x00, 0x02, 0x02];

    action_frame(node, MacAddr::BROADCAST)
        .attribute(AttributeId::DeviceCapability.as_u8(), &DEVICE_CAPABILITY)
        .attribute(AttributeId::Availability.as_u8(), &AVAILABILITY)
        .attribute(AttributeId::ServiceDescriptorExtension.as_u8(), &extension)
        .attribute(AttributeId::ServiceDescriptor.as_u8(), &descriptor)
        .build()
}

/// Builds a follow-up carrying `payload` to one peer
pub fn encode_service_message(
    node: &LocalNodeState,
    destination: MacAddr,
    remote_instance_id: InstanceId,
    payload: &[u8],
) -> Result<Frame> {
    let descriptor = service_descriptor(
        node.instance_id,
        remote_instance_id,
        ServiceControl::FollowUp,
        payload,
    )?;

    action_frame(node, destination)
        .attribute(AttributeId::ServiceDescriptor.as_u8(), &descriptor)
        .build()
}

fn action_frame(node: &LocalNodeState, destination: MacAddr) -> FrameBuilder {
    FrameBuilder::management(TYPE_ACTION, destination, node.mac, node.network_id)
        .put_u8(CATEGORY_PUBLIC_ACTION)
        .put_u8(ACTION_VENDOR_SPECIFIC)
        .put_slice(&WFA_OUI)
        .put_u8(NAN_OUI_TYPE)
}

fn service_descriptor(
    instance_id: InstanceId,
    other_instance_id: InstanceId,
    control: ServiceControl,
    payload: &[u8],
) -> Result<Vec<u8>> {
    if payload.len() > MAX_SERVICE_PAYLOAD {
        return Err(Error::PayloadTooLarge {
            len: payload.len(),
            max: MAX_SERVICE_PAYLOAD,
        });
    }
    let mut value = Vec::with_capacity(10 + payload.len());
    value.put_slice(&SERVICE_ID);
    value.put_u8(instance_id.0);
    value.put_u8(other_instance_id.0);
    value.put_u8(control.as_u8());
    value.put_u8(payload.len() as u8);
    value.put_slice(payload);
    Ok(value)
}

fn put_attribute(buf: &mut impl BufMut, id: AttributeId, value: &[u8]) {
    buf.put_u8(id.as_u8());
    buf.put_u16_le(value.len() as u16);
    buf.put_slice(value);
}

/// A frame as carried over a simulated medium
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AirFrame {
    pub rssi: i8,
    pub channel: u8,
    pub frame: Bytes,
}

/// Datagram codec for [`AirFrame`]: `[rssi, channel, frame..]`
#[derive(Debug, Clone, Copy, Default)]
pub struct AirCodec;

impl AirCodec {
    pub const HEADER_LEN: usize = 2;

    pub fn new() -> Self {
        AirCodec
    }
}

impl Decoder for AirCodec {
    type Item = AirFrame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.is_empty() {
            return Ok(None);
        }
        // Each datagram is one frame; consume it even when rejecting it.
        if src.len() < Self::HEADER_LEN {
            src.clear();
            return Err(Error::malformed("datagram shorter than air header"));
        }
        if src.len() - Self::HEADER_LEN > MAX_FRAME_SIZE {
            let len = src.len() - Self::HEADER_LEN;
            src.clear();
            return Err(Error::PayloadTooLarge {
                len,
                max: MAX_FRAME_SIZE,
            });
        }

        let rssi = src.get_i8();
        let channel = src.get_u8();
        let frame = src.split().freeze();
        Ok(Some(AirFrame { rssi, channel, frame }))
    }
}

impl Encoder<AirFrame> for AirCodec {
    type Error = Error;

    fn encode(&mut self, item: AirFrame, dst: &mut BytesMut) -> Result<()> {
        if item.frame.len() > MAX_FRAME_SIZE {
            return Err(Error::PayloadTooLarge {
                len: item.frame.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        dst.reserve(Self::HEADER_LEN + item.frame.len());
        dst.put_i8(item.rssi);
        dst.put_u8(item.channel);
        dst.extend_from_slice(&item.frame);
        Ok(())
    }
}
