use bytes::{BufMut, Bytes, BytesMut};

use crate::core::{Error, MacAddr, NetworkId, Result, MAX_FRAME_SIZE};
use super::{
    FRAME_BSSID, FRAME_DST, FRAME_NETWORK_ID, FRAME_SRC, HEADER_LEN,
    RENDEZVOUS_BSSID, RENDEZVOUS_PREFIX_LEN, TYPE_ACTION, TYPE_BEACON,
};

/// Management frame classes handled by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Beacon,
    Action,
    Other(u8),
}

impl FrameKind {
    pub fn from_type_byte(byte: u8) -> Self {
        match byte {
            TYPE_BEACON => FrameKind::Beacon,
            TYPE_ACTION => FrameKind::Action,
            other => FrameKind::Other(other),
        }
    }
}

/// An encoded frame ready for the radio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(Bytes);

impl Frame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn kind(&self) -> FrameKind {
        FrameKind::from_type_byte(self.0.first().copied().unwrap_or(0))
    }

    /// Header view of this frame
    pub fn header(&self) -> Result<FrameHeader<'_>> {
        FrameHeader::parse(&self.0)
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Builder for management frames
///
/// Writes the 24-byte header up front; fixed parameters and attributes are
/// appended in order.
#[derive(Debug)]
pub struct FrameBuilder {
    buf: BytesMut,
}

impl FrameBuilder {
    /// Starts a frame with the given type byte and addressing
    pub fn management(frame_type: u8, dst: MacAddr, src: MacAddr, network_id: NetworkId) -> Self {
        let mut buf = BytesMut::with_capacity(MAX_FRAME_SIZE);
        buf.put_u8(frame_type);
        buf.put_u8(0); // flags
        buf.put_u16_le(0); // duration
        buf.put_slice(&dst.0);
        buf.put_slice(&src.0);
        buf.put_slice(&RENDEZVOUS_BSSID[..4]);
        buf.put_slice(&network_id.0);
        buf.put_u16_le(0); // seq/frag, filled in by the driver
        debug_assert_eq!(buf.len(), HEADER_LEN);
        FrameBuilder { buf }
    }

    pub fn put_u8(mut self, value: u8) -> Self {
        self.buf.put_u8(value);
        self
    }

    pub fn put_u16_le(mut self, value: u16) -> Self {
        self.buf.put_u16_le(value);
        self
    }

    pub fn put_slice(mut self, value: &[u8]) -> Self {
        self.buf.put_slice(value);
        self
    }

    /// Appends a NAN attribute: 1-byte id, 2-byte LE length, value
    pub fn attribute(mut self, id: u8, value: &[u8]) -> Self {
        self.buf.put_u8(id);
        self.buf.put_u16_le(value.len() as u16);
        self.buf.put_slice(value);
        self
    }

    /// Appends an 802.11 element: 1-byte id, 1-byte length, value
    pub fn element(mut self, id: u8, value: &[u8]) -> Self {
        self.buf.put_u8(id);
        self.buf.put_u8(value.len() as u8);
        self.buf.put_slice(value);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Finishes the frame, rejecting frames the radio cannot carry
    pub fn build(self) -> Result<Frame> {
        if self.buf.len() > MAX_FRAME_SIZE {
            return Err(Error::PayloadTooLarge {
                len: self.buf.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        Ok(Frame(self.buf.freeze()))
    }
}

/// Borrowed view over the management header of a received frame
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader<'a> {
    raw: &'a [u8],
}

impl<'a> FrameHeader<'a> {
    /// Parses the header, failing if the buffer is shorter than 24 bytes
    pub fn parse(raw: &'a [u8]) -> Result<Self> {
        if raw.len() < HEADER_LEN {
            return Err(Error::malformed(format!(
                "frame of {} bytes is shorter than the {} byte header",
                raw.len(),
                HEADER_LEN
            )));
        }
        Ok(FrameHeader { raw })
    }

    pub fn kind(&self) -> FrameKind {
        FrameKind::from_type_byte(self.raw[0])
    }

    pub fn type_byte(&self) -> u8 {
        self.raw[0]
    }

    pub fn destination(&self) -> MacAddr {
        self.mac_at(FRAME_DST)
    }

    pub fn source(&self) -> MacAddr {
        self.mac_at(FRAME_SRC)
    }

    pub fn bssid(&self) -> MacAddr {
        self.mac_at(FRAME_BSSID)
    }

    pub fn network_id(&self) -> NetworkId {
        NetworkId([self.raw[FRAME_NETWORK_ID], self.raw[FRAME_NETWORK_ID + 1]])
    }

    /// Whether the BSSID carries the rendezvous prefix
    pub fn has_rendezvous_bssid(&self) -> bool {
        self.raw[FRAME_BSSID..FRAME_BSSID + RENDEZVOUS_PREFIX_LEN]
            == RENDEZVOUS_BSSID[..RENDEZVOUS_PREFIX_LEN]
    }

    /// The whole frame this header belongs to
    pub fn frame(&self) -> &'a [u8] {
        self.raw
    }

    fn mac_at(&self, offset: usize) -> MacAddr {
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&self.raw[offset..offset + 6]);
        MacAddr(mac)
    }
}
