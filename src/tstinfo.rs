use std::fmt::Display;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use digest::DynDigest;
use rsa::BigUint;

use crate::{
    algorithm::{resolve_algorithm_identifier, Algorithm},
    cert::name::{decode_name, Name},
    der_cursor::{
        context, context_constructed, decode_bool, decode_small_int, DerCursor, Oid, Tlv,
        TAG_BOOLEAN, TAG_GENERALIZED_TIME, TAG_INTEGER, TAG_SEQUENCE,
    },
    errors::{TsError, TsErrorKind},
    utils::to_hex_str,
};

/// Calendar time carried by `genTime`.
///
/// Fractional seconds are accepted and dropped. `utc_offset_minutes` is zero
/// for a `Z` suffix and for times that carry no zone at all.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SignedTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub utc_offset_minutes: i16,
}

impl Display for SignedTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )?;
        if self.utc_offset_minutes == 0 {
            write!(f, " UTC")
        } else {
            let sign = if self.utc_offset_minutes < 0 { '-' } else { '+' };
            let abs = self.utc_offset_minutes.unsigned_abs();
            write!(f, " {}{:02}:{:02}", sign, abs / 60, abs % 60)
        }
    }
}

impl SignedTime {
    /// Scans the content octets of a GeneralizedTime:
    /// `YYYYMMDDHHMM[SS[.fff]][Z|+hhmm|-hhmm]`.
    pub fn parse_generalized(bytes: &[u8]) -> Result<Self, TsError> {
        let mut scanner = TimeScanner { bytes, pos: 0 };

        let year = scanner.digits(4)? as u16;
        let month = scanner.digits(2)? as u8;
        let day = scanner.digits(2)? as u8;
        let hour = scanner.digits(2)? as u8;
        let minute = scanner.digits(2)? as u8;

        let mut second = 0;
        if scanner.peek().map_or(false, |c| c.is_ascii_digit()) {
            second = scanner.digits(2)? as u8;

            if matches!(scanner.peek(), Some(b'.') | Some(b',')) {
                scanner.pos += 1;
                let start = scanner.pos;
                while scanner.peek().map_or(false, |c| c.is_ascii_digit()) {
                    scanner.pos += 1;
                }
                if scanner.pos == start {
                    return Err(scanner.error("empty fraction"));
                }
            }
        }

        let utc_offset_minutes = match scanner.peek() {
            Some(b'Z') => {
                scanner.pos += 1;
                0
            }
            Some(sign @ (b'+' | b'-')) => {
                scanner.pos += 1;
                let hh = scanner.digits(2)?;
                let mm = scanner.digits(2)?;
                if hh > 23 || mm > 59 {
                    return Err(scanner.error("zone offset out of range"));
                }
                let minutes = (hh * 60 + mm) as i16;
                if sign == b'-' {
                    -minutes
                } else {
                    minutes
                }
            }
            _ => 0,
        };

        if scanner.pos != bytes.len() {
            return Err(scanner.error("unexpected trailing characters"));
        }

        if !(1..=12).contains(&month)
            || !(1..=31).contains(&day)
            || hour > 23
            || minute > 59
            || second > 60
        {
            return Err(scanner.error("field out of range"));
        }

        Ok(Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
            utc_offset_minutes,
        })
    }

    /// Converts to a UTC instant, applying the zone offset.
    pub fn to_datetime(self: &Self) -> Result<DateTime<Utc>, TsError> {
        let date = NaiveDate::from_ymd_opt(self.year as i32, self.month as u32, self.day as u32)
            .ok_or_else(|| {
                TsError::new(TsErrorKind::Malformed, format!("invalid date {}", self))
            })?;
        // chrono models a leap second as 59s + 1000ms
        let local = if self.second == 60 {
            date.and_hms_milli_opt(self.hour as u32, self.minute as u32, 59, 1_000)
        } else {
            date.and_hms_opt(self.hour as u32, self.minute as u32, self.second as u32)
        }
        .ok_or_else(|| TsError::new(TsErrorKind::Malformed, format!("invalid time {}", self)))?;

        let utc = local - chrono::Duration::minutes(self.utc_offset_minutes as i64);
        Ok(Utc.from_utc_datetime(&utc))
    }
}

struct TimeScanner<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> TimeScanner<'a> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn digits(&mut self, n: usize) -> Result<u32, TsError> {
        let field = self
            .bytes
            .get(self.pos..self.pos + n)
            .ok_or_else(|| self.error("too short"))?;
        if !field.iter().all(u8::is_ascii_digit) {
            return Err(self.error("expected digits"));
        }
        self.pos += n;
        Ok(field
            .iter()
            .fold(0u32, |acc, c| acc * 10 + (c - b'0') as u32))
    }

    fn error(&self, what: &str) -> TsError {
        TsError::new(
            TsErrorKind::Malformed,
            format!(
                "GeneralizedTime {:?} at character {}: {}",
                String::from_utf8_lossy(self.bytes),
                self.pos,
                what
            ),
        )
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Accuracy {
    pub seconds: Option<u64>,
    pub millis: Option<u16>,
    pub micros: Option<u16>,
}

impl Display for Accuracy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = vec![];
        if let Some(s) = self.seconds {
            parts.push(format!("{}s", s));
        }
        if let Some(ms) = self.millis {
            parts.push(format!("{}ms", ms));
        }
        if let Some(us) = self.micros {
            parts.push(format!("{}us", us));
        }
        if parts.is_empty() {
            write!(f, "unspecified")
        } else {
            write!(f, "±{}", parts.join(" "))
        }
    }
}

impl Accuracy {
    fn parse(mut cursor: DerCursor<'_>) -> Result<Self, TsError> {
        let seconds = match cursor.read_optional(TAG_INTEGER)? {
            Some(tlv) => Some(non_negative(&tlv)? as u64),
            None => None,
        };
        let millis = match cursor.read_optional(context(0))? {
            Some(tlv) => Some(sub_second(&tlv)?),
            None => None,
        };
        let micros = match cursor.read_optional(context(1))? {
            Some(tlv) => Some(sub_second(&tlv)?),
            None => None,
        };
        cursor.finish("Accuracy")?;

        Ok(Self {
            seconds,
            millis,
            micros,
        })
    }
}

fn non_negative(tlv: &Tlv<'_>) -> Result<i64, TsError> {
    let value = decode_small_int(tlv)?;
    if value < 0 {
        return Err(TsError::new(
            TsErrorKind::Malformed,
            format!("negative value at offset {}", tlv.offset),
        ));
    }
    Ok(value)
}

fn sub_second(tlv: &Tlv<'_>) -> Result<u16, TsError> {
    let value = non_negative(tlv)?;
    if value > 999 {
        return Err(TsError::new(
            TsErrorKind::Malformed,
            format!("accuracy field {} at offset {} exceeds 999", value, tlv.offset),
        ));
    }
    Ok(value as u16)
}

/// Decoded `TSTInfo`, the content the TSA signs.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TstInfo<'a> {
    pub policy: Oid<'a>,
    /// Algorithm of the message imprint.
    pub digest_algorithm: Algorithm,
    /// Hash of the stamped payload; borrows the reply buffer.
    pub payload_digest: &'a [u8],
    pub serial_number: BigUint,
    pub signed_time: SignedTime,
    pub accuracy: Option<Accuracy>,
    pub ordering: bool,
    /// Two's-complement content octets of the nonce INTEGER.
    pub nonce: Option<&'a [u8]>,
    pub tsa_name: Option<Name>,
}

impl<'a> TstInfo<'a> {
    /// Reads a `TSTInfo` SEQUENCE.
    pub fn parse(cursor: &mut DerCursor<'a>) -> Result<Self, TsError> {
        let mut seq = cursor.read_sequence()?;

        let version = seq.read_small_int()?;
        if version != 1 {
            return Err(TsError::new(
                TsErrorKind::Malformed,
                format!("TSTInfo version {}", version),
            ));
        }

        let policy = seq.read_object_identifier()?;

        let mut imprint = seq.read_sequence()?;
        let digest_algorithm = resolve_algorithm_identifier(&mut imprint)?;
        let payload_digest = imprint.read_octet_string()?;
        imprint.finish("MessageImprint")?;
        if let Some(len) = digest_algorithm.digest_len() {
            if len != payload_digest.len() {
                return Err(TsError::new(
                    TsErrorKind::Malformed,
                    format!(
                        "{} message imprint has {} bytes, expected {}",
                        digest_algorithm,
                        payload_digest.len(),
                        len
                    ),
                ));
            }
        }

        let serial_number = BigUint::from_bytes_be(seq.read_unsigned_integer()?);

        let gen_time = seq.read_tag(TAG_GENERALIZED_TIME)?;
        let signed_time = SignedTime::parse_generalized(gen_time.value)?;

        let accuracy = match seq.read_optional(TAG_SEQUENCE)? {
            Some(tlv) => Some(Accuracy::parse(tlv.cursor())?),
            None => None,
        };

        let ordering = match seq.read_optional(TAG_BOOLEAN)? {
            Some(tlv) => decode_bool(&tlv)?,
            None => false,
        };

        let nonce = match seq.read_optional(TAG_INTEGER)? {
            Some(tlv) if tlv.value.is_empty() => {
                return Err(TsError::new(
                    TsErrorKind::Malformed,
                    format!("empty nonce at offset {}", tlv.offset),
                ))
            }
            Some(tlv) => Some(tlv.value),
            None => None,
        };

        let tsa_name = match seq.read_optional(context_constructed(0))? {
            Some(tlv) => Some(Self::parse_tsa_name(tlv.cursor())?),
            None => None,
        };

        if let Some(extensions) = seq.read_optional(context_constructed(1))? {
            log::debug!(
                "skipping {} byte(s) of TSTInfo extensions",
                extensions.value.len()
            );
        }

        seq.finish("TSTInfo")?;

        log::debug!(
            "TSTInfo: policy {}, serial {}, time {}, imprint {} {}",
            policy,
            serial_number,
            signed_time,
            digest_algorithm,
            to_hex_str(payload_digest)
        );

        Ok(Self {
            policy,
            digest_algorithm,
            payload_digest,
            serial_number,
            signed_time,
            accuracy,
            ordering,
            nonce,
            tsa_name,
        })
    }

    // tsa is an explicitly tagged GeneralName; only directoryName is decoded.
    fn parse_tsa_name(mut cursor: DerCursor<'_>) -> Result<Name, TsError> {
        let general_name = cursor.read_tlv()?;
        if general_name.tag != context_constructed(4) {
            return Err(TsError::new(
                TsErrorKind::Malformed,
                format!(
                    "unsupported GeneralName choice 0x{:02x} for the TSA name",
                    general_name.tag
                ),
            ));
        }
        cursor.finish("tsa")?;

        let mut inner = general_name.cursor();
        let name = inner.read_tag(TAG_SEQUENCE)?;
        inner.finish("directoryName")?;
        decode_name(name.raw)
    }

    /// Compares the digest of `payload` with the message imprint.
    pub fn verify_payload(self: &Self, payload: &[u8]) -> Result<(), TsError> {
        let mut digester = self.payload_digester()?;
        digester.update(payload);
        digester.finish()
    }

    /// Incremental form of [`TstInfo::verify_payload`] for payloads that do
    /// not fit in memory.
    pub fn payload_digester(self: &Self) -> Result<PayloadDigester<'a>, TsError> {
        Ok(PayloadDigester {
            hasher: self.digest_algorithm.new_digest()?,
            expected: self.payload_digest,
        })
    }
}

pub struct PayloadDigester<'a> {
    hasher: Box<dyn DynDigest>,
    expected: &'a [u8],
}

impl<'a> PayloadDigester<'a> {
    pub fn update(self: &mut Self, data: &[u8]) {
        self.hasher.update(data);
    }

    pub fn finish(self: Self) -> Result<(), TsError> {
        let actual = self.hasher.finalize();
        if actual.as_ref() == self.expected {
            Ok(())
        } else {
            Err(TsError::new(
                TsErrorKind::PayloadMismatch,
                format!(
                    "payload digest {} does not match the imprint {}",
                    to_hex_str(&actual),
                    to_hex_str(self.expected)
                ),
            ))
        }
    }
}
