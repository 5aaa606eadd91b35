//! NAN attribute (TLV) decoding
//!
//! Attributes are a 1-byte id, a 2-byte little-endian length and `length`
//! value bytes. Decoding is lazy and truncate-on-error: the first entry that
//! would read past the end of the buffer ends the sequence with a
//! [`Error::MalformedFrame`], and everything yielded before it stays valid.

use std::fmt;

use crate::core::{Error, MacAddr, Result};

/// Size of the id + length prefix
pub const TLV_HEADER_LEN: usize = 3;

/// Attribute ids produced or consumed by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeId {
    MasterIndication,
    Cluster,
    ServiceIdList,
    ServiceDescriptor,
    ServiceDescriptorExtension,
    DeviceCapability,
    Availability,
    Unknown(u8),
}

impl AttributeId {
    pub fn from_u8(id: u8) -> Self {
        match id {
            0x00 => AttributeId::MasterIndication,
            0x01 => AttributeId::Cluster,
            0x02 => AttributeId::ServiceIdList,
            0x03 => AttributeId::ServiceDescriptor,
            0x0E => AttributeId::ServiceDescriptorExtension,
            0x0F => AttributeId::DeviceCapability,
            0x12 => AttributeId::Availability,
            other => AttributeId::Unknown(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            AttributeId::MasterIndication => 0x00,
            AttributeId::Cluster => 0x01,
            AttributeId::ServiceIdList => 0x02,
            AttributeId::ServiceDescriptor => 0x03,
            AttributeId::ServiceDescriptorExtension => 0x0E,
            AttributeId::DeviceCapability => 0x0F,
            AttributeId::Availability => 0x12,
            AttributeId::Unknown(other) => other,
        }
    }
}

/// One decoded attribute borrowing its value from the frame
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Tlv<'a> {
    pub tag: u8,
    /// Offset of the tag byte within the decoded buffer
    pub offset: usize,
    pub value: &'a [u8],
}

impl<'a> Tlv<'a> {
    pub fn id(&self) -> AttributeId {
        AttributeId::from_u8(self.tag)
    }
}

impl fmt::Debug for Tlv<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tlv")
            .field("tag", &self.tag)
            .field("offset", &self.offset)
            .field("len", &self.value.len())
            .finish()
    }
}

/// Lazy iterator over the attributes of a buffer
///
/// Yields `Ok` entries until the buffer is exhausted, or a single `Err` after
/// which it is fused.
#[derive(Debug, Clone)]
pub struct TlvIter<'a> {
    buf: &'a [u8],
    offset: usize,
    done: bool,
}

/// Decodes the attributes of `buffer` starting at `start_offset`
pub fn decode_tlv_sequence(buffer: &[u8], start_offset: usize) -> TlvIter<'_> {
    TlvIter {
        buf: buffer,
        offset: start_offset,
        done: false,
    }
}

impl<'a> TlvIter<'a> {
    /// Drains the iterator, keeping the valid prefix and the error that ended it
    pub fn collect_truncated(self) -> TlvSequence<'a> {
        let mut entries = Vec::new();
        let mut error = None;
        for item in self {
            match item {
                Ok(tlv) => entries.push(tlv),
                Err(e) => error = Some(e),
            }
        }
        TlvSequence { entries, error }
    }

    fn fail(&mut self, msg: String) -> Option<Result<Tlv<'a>>> {
        self.done = true;
        Some(Err(Error::malformed(msg)))
    }
}

impl<'a> Iterator for TlvIter<'a> {
    type Item = Result<Tlv<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let len = self.buf.len();
        if self.offset == len {
            self.done = true;
            return None;
        }
        if self.offset > len || len - self.offset < TLV_HEADER_LEN {
            let offset = self.offset;
            return self.fail(format!(
                "attribute header at {} overruns {} byte buffer",
                offset, len
            ));
        }

        let tag = self.buf[self.offset];
        let value_len =
            u16::from_le_bytes([self.buf[self.offset + 1], self.buf[self.offset + 2]]) as usize;
        let value_start = self.offset + TLV_HEADER_LEN;
        if len - value_start < value_len {
            let offset = self.offset;
            return self.fail(format!(
                "attribute {:#04x} at {} declares {} bytes, only {} remain",
                tag,
                offset,
                value_len,
                len - value_start
            ));
        }

        let entry_end = value_start + value_len;
        let tlv = Tlv {
            tag,
            offset: self.offset,
            value: &self.buf[value_start..entry_end],
        };
        self.offset = entry_end;
        Some(Ok(tlv))
    }
}

impl std::iter::FusedIterator for TlvIter<'_> {}

/// Result of draining a [`TlvIter`]
#[derive(Debug)]
pub struct TlvSequence<'a> {
    /// Entries decoded before the sequence ended
    pub entries: Vec<Tlv<'a>>,
    /// Set when the sequence was cut short by a malformed entry
    pub error: Option<Error>,
}

impl TlvSequence<'_> {
    pub fn is_truncated(&self) -> bool {
        self.error.is_some()
    }
}

/// Master indication attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasterIndication {
    pub preference: u8,
    pub random: u8,
}

impl MasterIndication {
    pub const LEN: usize = 2;

    pub fn parse(value: &[u8]) -> Result<Self> {
        match value {
            [preference, random, ..] => Ok(MasterIndication {
                preference: *preference,
                random: *random,
            }),
            _ => Err(Error::malformed("master indication shorter than 2 bytes")),
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        [self.preference, self.random]
    }
}

/// Cluster attribute: the anchor master as seen by the sender
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterAttribute {
    pub anchor_master: MacAddr,
    pub anchor_random: u8,
    pub anchor_preference: u8,
    pub hop_count: u8,
    /// Anchor master beacon transmit time, low 32 bits
    pub time_delta: u32,
}

impl ClusterAttribute {
    pub const LEN: usize = 13;

    pub fn parse(value: &[u8]) -> Result<Self> {
        if value.len() < Self::LEN {
            return Err(Error::malformed(format!(
                "cluster attribute of {} bytes, expected {}",
                value.len(),
                Self::LEN
            )));
        }
        Ok(ClusterAttribute {
            anchor_master: MacAddr::from_slice(&value[0..6])
                .ok_or_else(|| Error::malformed("cluster attribute anchor address"))?,
            anchor_random: value[6],
            anchor_preference: value[7],
            hop_count: value[8],
            time_delta: u32::from_le_bytes([value[9], value[10], value[11], value[12]]),
        })
    }

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[0..6].copy_from_slice(&self.anchor_master.0);
        out[6] = self.anchor_random;
        out[7] = self.anchor_preference;
        out[8] = self.hop_count;
        out[9..13].copy_from_slice(&self.time_delta.to_le_bytes());
        out
    }
}
