//! The 9-octet framing layer (RFC 7540 §4) and typed views over the
//! payloads of SETTINGS, WINDOW_UPDATE, GOAWAY, DATA and HEADERS frames.

use crate::error::{ErrorCode, FrameError};
use crate::flags::{DataFlags, Flags, HeadersFlags, SettingsFlags};
use crate::types::{FrameType, SettingsParameter};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_traits::{FromPrimitive, ToPrimitive};
use std::io::{self, Read, Write};

/// The fixed-size header that precedes every frame's payload.
///
/// `type_byte` is kept raw rather than eagerly resolved to a `FrameType`:
/// RFC 7540 requires unknown frame types to be silently discarded by the
/// frame's receiver, not rejected by the codec (spec §4.7 "Unknown types").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub length: u32,
    pub type_byte: u8,
    pub flags: u8,
    /// Already masked: the reserved high bit is cleared on receive per the
    /// wire invariant in spec §3.
    pub stream_id: u32,
}

impl FrameHeader {
    pub const SIZE: usize = 9;

    /// The frame type, if this crate recognizes it.
    pub fn typ(&self) -> Option<FrameType> {
        FrameType::from_u8(self.type_byte)
    }

    fn unmarshal(buf: &[u8; Self::SIZE]) -> Self {
        let length = u32::from(buf[0]) << 16 | u32::from(buf[1]) << 8 | u32::from(buf[2]);
        let type_byte = buf[3];
        let flags = buf[4];
        let stream_id = u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]) & U31_MASK;
        Self {
            length,
            type_byte,
            flags,
            stream_id,
        }
    }

    fn marshal(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        let len = self.length.to_be_bytes();
        buf[0..3].copy_from_slice(&len[1..4]);
        buf[3] = self.type_byte;
        buf[4] = self.flags;
        buf[5..9].copy_from_slice(&(self.stream_id & U31_MASK).to_be_bytes());
        buf
    }
}

const U31_MASK: u32 = u32::MAX >> 1;

/// A frame header plus its raw, not-yet-interpreted payload bytes.
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(typ: FrameType, flags: u8, stream_id: u32, payload: Bytes) -> Self {
        Self {
            header: FrameHeader {
                length: payload.len() as u32,
                type_byte: typ.to_u8().expect("FrameType is repr(u8)"),
                flags,
                stream_id,
            },
            payload,
        }
    }

    /// Reads exactly one frame off `reader`. A short read on the 9-octet
    /// header or the payload surfaces as `FrameError::Io`.
    pub fn read_from(reader: &mut impl Read) -> Result<Self, FrameError> {
        let mut header_buf = [0u8; FrameHeader::SIZE];
        reader.read_exact(&mut header_buf)?;
        let header = FrameHeader::unmarshal(&header_buf);

        let mut payload = vec![0u8; header.length as usize];
        reader.read_exact(&mut payload)?;

        Ok(Self {
            header,
            payload: Bytes::from(payload),
        })
    }

    /// Writes the frame as a single 9-octet header followed by its payload.
    pub fn write_to(&self, writer: &mut impl Write) -> io::Result<()> {
        writer.write_all(&self.header.marshal())?;
        writer.write_all(&self.payload)?;
        Ok(())
    }

    /// The flags of this frame, typed according to its frame type.
    pub fn flags(&self) -> Flags {
        match self.header.typ() {
            Some(FrameType::Data) => Flags::Data(DataFlags::from_bits_truncate(self.header.flags)),
            Some(FrameType::Headers) => Flags::Headers(HeadersFlags::from_bits_truncate(self.header.flags)),
            Some(FrameType::Settings) => Flags::Settings(SettingsFlags::from_bits_truncate(self.header.flags)),
            _ => Flags::None,
        }
    }
}

/// https://httpwg.org/specs/rfc7540.html#SETTINGS
#[derive(Debug, Clone)]
pub struct SettingsPayload {
    pub ack: bool,
    pub values: Vec<(SettingsParameter, u32)>,
}

impl SettingsPayload {
    pub fn ack() -> Self {
        Self {
            ack: true,
            values: Vec::new(),
        }
    }

    pub fn decode(frame: &Frame) -> Result<Self, FrameError> {
        let ack = matches!(frame.flags(), Flags::Settings(f) if f.contains(SettingsFlags::ACK));
        if ack && !frame.payload.is_empty() {
            return Err(FrameError::SettingsAckNotEmpty);
        }
        if frame.payload.len() % 6 != 0 {
            return Err(FrameError::SettingsNotMultipleOfSix(frame.payload.len()));
        }

        let mut values = Vec::with_capacity(frame.payload.len() / 6);
        for chunk in frame.payload.chunks(6) {
            let key = u16::from_be_bytes([chunk[0], chunk[1]]);
            let value = u32::from_be_bytes([chunk[2], chunk[3], chunk[4], chunk[5]]);
            // The spec requires unknown settings to be ignored, not rejected.
            if let Some(param) = SettingsParameter::from_u16(key) {
                values.push((param, value));
            }
        }
        Ok(Self { ack, values })
    }

    pub fn encode(&self) -> Frame {
        let mut payload = BytesMut::with_capacity(self.values.len() * 6);
        for (param, value) in &self.values {
            payload.put_u16(param.to_u16().expect("SettingsParameter is repr(u16)"));
            payload.put_u32(*value);
        }
        let flags = if self.ack { SettingsFlags::ACK.bits() } else { 0 };
        Frame::new(FrameType::Settings, flags, 0, payload.freeze())
    }
}

/// https://httpwg.org/specs/rfc7540.html#WINDOW_UPDATE
#[derive(Debug, Clone, Copy)]
pub struct WindowUpdatePayload {
    pub increment: u32,
}

impl WindowUpdatePayload {
    pub fn decode(frame: &Frame) -> Result<Self, FrameError> {
        if frame.payload.len() != 4 {
            return Err(FrameError::WindowUpdateLength(frame.payload.len()));
        }
        let increment = u32::from_be_bytes(frame.payload[..4].try_into().unwrap()) & U31_MASK;
        if increment == 0 {
            return Err(FrameError::ZeroWindowIncrement);
        }
        Ok(Self { increment })
    }

    pub fn encode(&self, stream_id: u32) -> Frame {
        let mut payload = BytesMut::with_capacity(4);
        payload.put_u32(self.increment & U31_MASK);
        Frame::new(FrameType::WindowUpdate, 0, stream_id, payload.freeze())
    }
}

/// https://httpwg.org/specs/rfc7540.html#GOAWAY
#[derive(Debug, Clone)]
pub struct GoAwayPayload {
    pub last_stream_id: u32,
    pub error_code: ErrorCode,
    pub debug_data: Bytes,
}

impl GoAwayPayload {
    pub fn decode(frame: &Frame) -> Result<Self, FrameError> {
        if frame.payload.len() < 8 {
            return Err(FrameError::GoawayTooShort);
        }
        let mut buf = frame.payload.clone();
        let last_stream_id = buf.get_u32() & U31_MASK;
        let code = buf.get_u32();
        let error_code = ErrorCode::from_u32(code).unwrap_or(ErrorCode::Internal);
        Ok(Self {
            last_stream_id,
            error_code,
            debug_data: buf,
        })
    }

    pub fn encode(&self) -> Frame {
        let mut payload = BytesMut::with_capacity(8 + self.debug_data.len());
        payload.put_u32(self.last_stream_id & U31_MASK);
        payload.put_u32(
            self.error_code
                .to_u32()
                .expect("ErrorCode is repr(u32)"),
        );
        payload.put_slice(&self.debug_data);
        Frame::new(FrameType::GoAway, 0, 0, payload.freeze())
    }
}

/// The DATA payload, already stripped of its optional padding.
#[derive(Debug, Clone)]
pub struct DataPayload {
    pub data: Bytes,
}

impl DataPayload {
    pub fn decode(frame: &Frame) -> Result<Self, FrameError> {
        let padded = matches!(frame.flags(), Flags::Data(f) if f.contains(DataFlags::PADDED));
        let data = strip_padding(&frame.payload, padded)?;
        Ok(Self { data })
    }
}

/// The HEADERS payload, stripped of its optional padding and priority
/// prefix. `fragment` is the header block still awaiting HPACK decoding.
#[derive(Debug, Clone)]
pub struct HeadersPayload {
    pub dependency: Option<u32>,
    pub exclusive: Option<bool>,
    pub weight: Option<u8>,
    pub fragment: Bytes,
}

impl HeadersPayload {
    pub fn decode(frame: &Frame) -> Result<Self, FrameError> {
        let (padded, prioritized) = match frame.flags() {
            Flags::Headers(f) => (
                f.contains(HeadersFlags::PADDED),
                f.contains(HeadersFlags::PRIORITY),
            ),
            _ => (false, false),
        };

        let mut rest = strip_padding(&frame.payload, padded)?;

        let (dependency, exclusive, weight) = if prioritized {
            if rest.len() < 5 {
                return Err(FrameError::PayloadTooShort);
            }
            let raw_dep = rest.get_u32();
            let exclusive = raw_dep & !U31_MASK != 0;
            let dependency = raw_dep & U31_MASK;
            let weight = rest.get_u8();
            (Some(dependency), Some(exclusive), Some(weight))
        } else {
            (None, None, None)
        };

        Ok(Self {
            dependency,
            exclusive,
            weight,
            fragment: rest,
        })
    }
}

/// Strips the optional pad-length octet and trailing padding shared by DATA
/// and HEADERS frames (RFC 7540 §6.1/§6.2).
fn strip_padding(payload: &Bytes, padded: bool) -> Result<Bytes, FrameError> {
    if !padded {
        return Ok(payload.clone());
    }
    if payload.is_empty() {
        return Err(FrameError::PayloadTooShort);
    }
    let pad_len = payload[0] as usize;
    let body_len = payload
        .len()
        .checked_sub(1 + pad_len)
        .ok_or(FrameError::PayloadTooShort)?;
    Ok(payload.slice(1..1 + body_len))
}
