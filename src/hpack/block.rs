//! Header block representations (RFC 7541 §6): Indexed, the three Literal
//! forms, and Dynamic Table Size Update. `Encoder`/`Decoder` each own one
//! `HeaderTable` half of the compression context and are not
//! interchangeable between connections.

use super::huffman;
use super::integer::{decode_integer, encode_integer};
use super::table::HeaderTable;
use crate::error::HpackError;
use crate::types::Headers;
use bytes::{BufMut, Bytes, BytesMut};

/// Headers whose literal value should never enter the dynamic table, per
/// the per-key encode policy: `authorization` is sensitive, everything
/// else is either no-index or incremental.
fn is_never_index(name: &str) -> bool {
    name.eq_ignore_ascii_case("authorization")
}

/// Headers whose value is typically unique per-request and not worth
/// indexing, e.g. `:path` carrying a request-specific URL.
fn is_no_index(name: &str) -> bool {
    name.eq_ignore_ascii_case(":path")
}

pub struct Encoder {
    table: HeaderTable,
}

impl Encoder {
    pub fn new(max_size: usize) -> Self {
        Self {
            table: HeaderTable::new(max_size),
        }
    }

    pub fn set_max_size(&mut self, new_max: usize) {
        self.table.set_max_size(new_max);
    }

    /// Encodes a full header list into one header block fragment. Applies
    /// the same encoding policy as the reference header list builder:
    /// exact table hits are Indexed, sensitive names are Never-Indexed,
    /// `:path` is No-Indexed, everything else is written with Incremental
    /// Indexing so it becomes available to later frames.
    pub fn encode(&mut self, headers: &Headers) -> Bytes {
        let mut out = BytesMut::new();
        for (name, value) in headers {
            let name = name.to_ascii_lowercase();
            match self.table.find(&name, value) {
                Some((idx, false)) => {
                    encode_integer(&mut out, idx as u32, 7, 0x80);
                }
                found => {
                    let policy = if is_never_index(&name) {
                        LiteralIndexType::NeverIndex
                    } else if is_no_index(&name) {
                        LiteralIndexType::NoIndex
                    } else {
                        LiteralIndexType::IncrementalIndex
                    };
                    self.encode_literal(&mut out, &name, value, found.map(|(i, _)| i), policy);
                    if policy == LiteralIndexType::IncrementalIndex {
                        self.table.insert(name, value.clone());
                    }
                }
            }
        }
        out.freeze()
    }

    fn encode_literal(
        &self,
        out: &mut BytesMut,
        name: &str,
        value: &str,
        name_index: Option<usize>,
        policy: LiteralIndexType,
    ) {
        let (prefix_bits, prefix_len) = match policy {
            LiteralIndexType::IncrementalIndex => (0b0100_0000, 6),
            LiteralIndexType::NoIndex => (0b0000_0000, 4),
            LiteralIndexType::NeverIndex => (0b0001_0000, 4),
        };
        match name_index {
            Some(idx) => encode_integer(out, idx as u32, prefix_len, prefix_bits),
            None => {
                out.put_u8(prefix_bits);
                encode_string(out, name.as_bytes());
            }
        }
        encode_string(out, value.as_bytes());
    }

    /// Directly emits a dynamic-table-size-update; callers send this when
    /// they want to shrink the peer-visible table ahead of normal traffic.
    pub fn encode_size_update(&mut self, new_max: usize) -> Bytes {
        self.table.set_max_size(new_max);
        let mut out = BytesMut::new();
        encode_integer(&mut out, new_max as u32, 5, 0b0010_0000);
        out.freeze()
    }
}

fn encode_string(out: &mut BytesMut, raw: &[u8]) {
    let huffman_encoded = huffman::encode(raw);
    if huffman_encoded.len() < raw.len() {
        encode_integer(out, huffman_encoded.len() as u32, 7, 0x80);
        out.extend_from_slice(&huffman_encoded);
    } else {
        encode_integer(out, raw.len() as u32, 7, 0x00);
        out.extend_from_slice(raw);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LiteralIndexType {
    IncrementalIndex,
    NoIndex,
    NeverIndex,
}

pub struct Decoder {
    table: HeaderTable,
}

impl Decoder {
    pub fn new(max_size: usize) -> Self {
        Self {
            table: HeaderTable::new(max_size),
        }
    }

    pub fn set_max_size(&mut self, new_max: usize) {
        self.table.set_max_size(new_max);
    }

    /// Decodes a complete header block fragment into an ordered header
    /// list, applying any dynamic-table-size-updates and incremental
    /// indexing insertions along the way.
    pub fn decode(&mut self, mut buf: &[u8]) -> Result<Headers, HpackError> {
        let mut headers = Headers::new();
        let mut seen_representation = false;
        while !buf.is_empty() {
            let first = buf[0];
            if first & 0b1000_0000 != 0 {
                let (idx, n) = decode_integer(buf, 7)?;
                let (name, value) = self.table.lookup(idx as usize)?;
                headers.push((name.to_string(), value.to_string()));
                buf = &buf[n..];
                seen_representation = true;
            } else if first & 0b0100_0000 != 0 {
                let n = self.decode_literal(buf, 6, true, &mut headers)?;
                buf = &buf[n..];
                seen_representation = true;
            } else if first & 0b0010_0000 != 0 {
                if seen_representation {
                    return Err(HpackError::SizeUpdateNotAtStart);
                }
                let (new_max, n) = decode_integer(buf, 5)?;
                self.table.set_max_size(new_max as usize);
                buf = &buf[n..];
            } else if first & 0b0001_0000 != 0 {
                let n = self.decode_literal(buf, 4, false, &mut headers)?;
                buf = &buf[n..];
                seen_representation = true;
            } else {
                let n = self.decode_literal(buf, 4, false, &mut headers)?;
                buf = &buf[n..];
                seen_representation = true;
            }
        }
        Ok(headers)
    }

    fn decode_literal(
        &mut self,
        buf: &[u8],
        prefix_len: u8,
        incremental: bool,
        headers: &mut Headers,
    ) -> Result<usize, HpackError> {
        let (name_index, mut consumed) = decode_integer(buf, prefix_len)?;
        let name = if name_index == 0 {
            let (s, n) = decode_string(&buf[consumed..])?;
            consumed += n;
            s
        } else {
            self.table.lookup(name_index as usize)?.0.to_string()
        };
        let (value, n) = decode_string(&buf[consumed..])?;
        consumed += n;
        if incremental {
            self.table.insert(name.clone(), value.clone());
        }
        headers.push((name, value));
        Ok(consumed)
    }
}

fn decode_string(buf: &[u8]) -> Result<(String, usize), HpackError> {
    let huffman_encoded = *buf.first().ok_or(HpackError::Truncated)? & 0x80 != 0;
    let (len, prefix_len) = decode_integer(buf, 7)?;
    let len = len as usize;
    let data = buf
        .get(prefix_len..prefix_len + len)
        .ok_or(HpackError::StringTruncated)?;
    let raw = if huffman_encoded {
        huffman::decode(data)?
    } else {
        Bytes::copy_from_slice(data)
    };
    let s = String::from_utf8(raw.to_vec()).map_err(|_| HpackError::StringTruncated)?;
    Ok((s, prefix_len + len))
}
