//! Bounds-checked reader over DER encoded bytes.
//!
//! Every structure in a `TimeStampResp` is walked through a [`DerCursor`].
//! The cursor never copies: it hands out [`Tlv`] views that borrow the
//! caller's buffer, and a nested cursor created from a [`Tlv`] can never see
//! bytes outside of that element's declared content.

use std::fmt::Display;

use der::oid::ObjectIdentifier;

use crate::{
    errors::{TsError, TsErrorKind},
    utils::to_hex_str,
};

pub const TAG_BOOLEAN: u8 = 0x01;
pub const TAG_INTEGER: u8 = 0x02;
pub const TAG_BIT_STRING: u8 = 0x03;
pub const TAG_OCTET_STRING: u8 = 0x04;
pub const TAG_NULL: u8 = 0x05;
pub const TAG_OID: u8 = 0x06;
pub const TAG_UTF8_STRING: u8 = 0x0c;
pub const TAG_GENERALIZED_TIME: u8 = 0x18;
pub const TAG_SEQUENCE: u8 = 0x30;
pub const TAG_SET: u8 = 0x31;

/// `[n]` IMPLICIT tag of a primitive value.
pub const fn context(n: u8) -> u8 {
    0x80 | n
}

/// `[n]` tag of a constructed value.
pub const fn context_constructed(n: u8) -> u8 {
    0xa0 | n
}

// Four length octets already cover any buffer this crate is handed.
const MAX_LENGTH_OCTETS: usize = 4;

/// One decoded tag/length/value element.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Tlv<'a> {
    pub tag: u8,
    /// Offset of the tag byte in the outermost buffer.
    pub offset: usize,
    /// Tag, length and content octets.
    pub raw: &'a [u8],
    /// Content octets only.
    pub value: &'a [u8],
}

impl<'a> Tlv<'a> {
    pub fn header_len(&self) -> usize {
        self.raw.len() - self.value.len()
    }

    pub fn content_offset(&self) -> usize {
        self.offset + self.header_len()
    }

    /// Cursor over the content octets of this element.
    pub fn cursor(&self) -> DerCursor<'a> {
        DerCursor {
            data: self.value,
            pos: 0,
            base: self.content_offset(),
        }
    }
}

/// Content octets of an OBJECT IDENTIFIER.
///
/// Only the base-128 framing is checked, so arcs of any width are accepted.
/// Known identifiers are recognized by comparing encodings.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Oid<'a>(&'a [u8]);

impl<'a> Oid<'a> {
    /// Returns `None` when `bytes` is empty, ends inside an arc or pads an
    /// arc with a leading `0x80`.
    pub fn from_content(bytes: &'a [u8]) -> Option<Self> {
        if bytes.last()? & 0x80 != 0 {
            return None;
        }

        let mut arc_start = true;
        for b in bytes {
            if arc_start && *b == 0x80 {
                return None;
            }
            arc_start = b & 0x80 == 0;
        }

        Some(Self(bytes))
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.0
    }

    /// The same identifier as a `der` value, if it fits `der`'s limits.
    pub fn to_object_identifier(&self) -> Option<ObjectIdentifier> {
        ObjectIdentifier::from_bytes(self.0).ok()
    }

    // None when an arc does not fit in 128 bits
    fn arcs(&self) -> Option<Vec<u128>> {
        let mut arcs = vec![];
        let mut value: u128 = 0;
        for b in self.0 {
            if value >> 121 != 0 {
                return None;
            }
            value = (value << 7) | (b & 0x7f) as u128;
            if b & 0x80 == 0 {
                if arcs.is_empty() {
                    let first = (value / 40).min(2);
                    arcs.push(first);
                    arcs.push(value - first * 40);
                } else {
                    arcs.push(value);
                }
                value = 0;
            }
        }
        Some(arcs)
    }
}

impl PartialEq<ObjectIdentifier> for Oid<'_> {
    fn eq(&self, other: &ObjectIdentifier) -> bool {
        self.0 == other.as_bytes()
    }
}

impl Display for Oid<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.arcs() {
            Some(arcs) => {
                let dotted = arcs
                    .iter()
                    .map(|arc| arc.to_string())
                    .collect::<Vec<_>>()
                    .join(".");
                write!(f, "{}", dotted)
            }
            None => write!(f, "#{}", to_hex_str(self.0)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DerCursor<'a> {
    data: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> DerCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            base: 0,
        }
    }

    /// Absolute offset of the next byte to be read.
    pub fn position(&self) -> usize {
        self.base + self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn peek_tag(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    /// Reads the next tag/length header and steps over its content.
    ///
    /// Fails with `Truncated` when fewer than two bytes remain or when the
    /// declared length runs past the end of this cursor's window. The cursor
    /// does not move on failure.
    pub fn read_tlv(&mut self) -> Result<Tlv<'a>, TsError> {
        let data: &'a [u8] = self.data;
        let start = self.pos;
        let rest = data.get(start..).unwrap_or_default();

        if rest.len() < 2 {
            return Err(self.error(
                TsErrorKind::Truncated,
                format!("{} byte(s) left, need a tag and a length", rest.len()),
            ));
        }

        let tag = rest[0];
        if tag & 0x1f == 0x1f {
            return Err(self.error(
                TsErrorKind::Malformed,
                format!("multi-byte tag 0x{:02x} is not used by this format", tag),
            ));
        }

        let first = rest[1];
        let (length, header_len) = if first < 0x80 {
            (first as usize, 2)
        } else {
            let octets = (first & 0x7f) as usize;
            if octets == 0 {
                return Err(self.error(
                    TsErrorKind::Malformed,
                    "indefinite length is not allowed in DER",
                ));
            }
            if octets > MAX_LENGTH_OCTETS {
                return Err(self.error(
                    TsErrorKind::Malformed,
                    format!("{} length octets", octets),
                ));
            }
            let encoded = rest.get(2..2 + octets).ok_or_else(|| {
                self.error(TsErrorKind::Truncated, "length octets run past the end")
            })?;
            let length = encoded
                .iter()
                .fold(0usize, |acc, b| (acc << 8) | *b as usize);
            (length, 2 + octets)
        };

        if length > rest.len() - header_len {
            return Err(self.error(
                TsErrorKind::Truncated,
                format!(
                    "tag 0x{:02x} declares {} bytes, only {} available",
                    tag,
                    length,
                    rest.len() - header_len
                ),
            ));
        }

        let end = header_len + length;
        self.pos = start + end;

        log::trace!(
            "tlv @{} tag=0x{:02x} len={}",
            self.base + start,
            tag,
            length
        );

        Ok(Tlv {
            tag,
            offset: self.base + start,
            raw: &rest[..end],
            value: &rest[header_len..end],
        })
    }

    /// Reads the next element, which must carry `expected` as its tag.
    pub fn read_tag(&mut self, expected: u8) -> Result<Tlv<'a>, TsError> {
        match self.peek_tag() {
            Some(tag) if tag != expected => Err(self.error(
                TsErrorKind::UnexpectedTag,
                format!("expected tag 0x{:02x}, found 0x{:02x}", expected, tag),
            )),
            _ => self.read_tlv(),
        }
    }

    /// Reads the next element only if it carries `tag`.
    pub fn read_optional(&mut self, tag: u8) -> Result<Option<Tlv<'a>>, TsError> {
        if self.peek_tag() == Some(tag) {
            self.read_tlv().map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn skip(&mut self) -> Result<(), TsError> {
        self.read_tlv().map(|_| ())
    }

    /// Reads a SEQUENCE and returns a cursor over its content.
    pub fn read_sequence(&mut self) -> Result<DerCursor<'a>, TsError> {
        Ok(self.read_tag(TAG_SEQUENCE)?.cursor())
    }

    pub fn read_small_int(&mut self) -> Result<i64, TsError> {
        let tlv = self.read_tag(TAG_INTEGER)?;
        decode_small_int(&tlv)
    }

    /// Reads a non-negative INTEGER as big-endian magnitude bytes.
    pub fn read_unsigned_integer(&mut self) -> Result<&'a [u8], TsError> {
        let tlv = self.read_tag(TAG_INTEGER)?;
        unsigned_integer_bytes(&tlv)
    }

    pub fn read_octet_string(&mut self) -> Result<&'a [u8], TsError> {
        Ok(self.read_tag(TAG_OCTET_STRING)?.value)
    }

    pub fn read_bool(&mut self) -> Result<bool, TsError> {
        let tlv = self.read_tag(TAG_BOOLEAN)?;
        decode_bool(&tlv)
    }

    pub fn read_object_identifier(&mut self) -> Result<Oid<'a>, TsError> {
        let tlv = self.read_tag(TAG_OID)?;
        Oid::from_content(tlv.value).ok_or_else(|| {
            TsError::new(
                TsErrorKind::Malformed,
                format!(
                    "invalid OID encoding {} at offset {}",
                    to_hex_str(tlv.value),
                    tlv.offset
                ),
            )
        })
    }

    /// Fails with `Malformed` unless every byte of this window was consumed.
    pub fn finish(&self, what: &str) -> Result<(), TsError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self.error(
                TsErrorKind::Malformed,
                format!("{} has {} unconsumed byte(s)", what, self.remaining()),
            ))
        }
    }

    fn error<S: Into<String>>(&self, kind: TsErrorKind, message: S) -> TsError {
        TsError::new(
            kind,
            format!("at offset {}: {}", self.position(), message.into()),
        )
    }
}

/// Decodes an INTEGER that must fit into an `i64`.
pub fn decode_small_int(tlv: &Tlv<'_>) -> Result<i64, TsError> {
    let bytes = tlv.value;
    if bytes.is_empty() || bytes.len() > 8 {
        return Err(TsError::new(
            TsErrorKind::Malformed,
            format!(
                "integer at offset {} has {} content bytes",
                tlv.offset,
                bytes.len()
            ),
        ));
    }

    let seed: i64 = if bytes[0] & 0x80 != 0 { -1 } else { 0 };
    Ok(bytes
        .iter()
        .fold(seed, |acc, b| (acc << 8) | *b as i64))
}

/// Magnitude of a non-negative INTEGER with redundant leading zeros removed.
pub fn unsigned_integer_bytes<'a>(tlv: &Tlv<'a>) -> Result<&'a [u8], TsError> {
    let bytes = tlv.value;
    if bytes.is_empty() {
        return Err(TsError::new(
            TsErrorKind::Malformed,
            format!("empty integer at offset {}", tlv.offset),
        ));
    }
    if bytes[0] & 0x80 != 0 {
        return Err(TsError::new(
            TsErrorKind::Malformed,
            format!("negative integer at offset {}", tlv.offset),
        ));
    }

    let skip = bytes
        .iter()
        .take(bytes.len() - 1)
        .take_while(|b| **b == 0)
        .count();
    Ok(&bytes[skip..])
}

pub fn decode_bool(tlv: &Tlv<'_>) -> Result<bool, TsError> {
    match tlv.value {
        [b] => Ok(*b != 0),
        _ => Err(TsError::new(
            TsErrorKind::Malformed,
            format!("boolean at offset {} is not one byte", tlv.offset),
        )),
    }
}
