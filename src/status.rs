use std::fmt::Display;

use crate::{
    der_cursor::{DerCursor, TAG_BIT_STRING, TAG_SEQUENCE, TAG_UTF8_STRING},
    errors::{TsError, TsErrorKind},
};

/// Upper bound on the decoded status text, in bytes.
pub const MAX_STATUS_TEXT: usize = 2048;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PkiStatus {
    Granted,
    GrantedWithMods,
    Rejection,
    Waiting,
    RevocationWarning,
    RevocationNotification,
}

impl TryFrom<i64> for PkiStatus {
    type Error = TsError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Granted),
            1 => Ok(Self::GrantedWithMods),
            2 => Ok(Self::Rejection),
            3 => Ok(Self::Waiting),
            4 => Ok(Self::RevocationWarning),
            5 => Ok(Self::RevocationNotification),
            v => Err(TsError::new(
                TsErrorKind::Malformed,
                format!("unknown PKIStatus {}", v),
            )),
        }
    }
}

impl Display for PkiStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PkiStatus::Granted => "granted",
            PkiStatus::GrantedWithMods => "grantedWithMods",
            PkiStatus::Rejection => "rejection",
            PkiStatus::Waiting => "waiting",
            PkiStatus::RevocationWarning => "revocationWarning",
            PkiStatus::RevocationNotification => "revocationNotification",
        };
        write!(f, "{}", s)
    }
}

/// Named bits of `PKIFailureInfo`. Bit `n` of the BIT STRING is bit `n` of the mask.
pub const FAILURE_NAMES: [(u32, &str); 8] = [
    (0, "badAlg"),
    (2, "badRequest"),
    (5, "badDataFormat"),
    (14, "timeNotAvailable"),
    (15, "unacceptedPolicy"),
    (16, "unacceptedExtension"),
    (17, "addInfoNotAvailable"),
    (25, "systemFailure"),
];

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PkiStatusInfo {
    pub status: PkiStatus,
    pub status_string: Option<String>,
    pub fail_info: Option<u32>,
}

impl Display for PkiStatusInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.status)?;
        if let Some(text) = &self.status_string {
            write!(f, " \"{}\"", text)?;
        }
        if self.fail_info.is_some() {
            write!(f, " [{}]", self.failure_names().join(", "))?;
        }
        Ok(())
    }
}

impl PkiStatusInfo {
    /// Reads a `PKIStatusInfo` SEQUENCE.
    pub fn parse(cursor: &mut DerCursor<'_>) -> Result<Self, TsError> {
        let mut seq = cursor.read_sequence()?;
        let status = PkiStatus::try_from(seq.read_small_int()?)?;

        let status_string = match seq.read_optional(TAG_SEQUENCE)? {
            Some(text) => Some(Self::decode_free_text(text.cursor())?),
            None => None,
        };

        let fail_info = match seq.read_optional(TAG_BIT_STRING)? {
            Some(bits) => Some(Self::decode_fail_info(bits.value, bits.offset)?),
            None => None,
        };

        seq.finish("PKIStatusInfo")?;

        log::debug!("PKIStatus: {}", status);
        Ok(Self {
            status,
            status_string,
            fail_info,
        })
    }

    pub fn is_granted(self: &Self) -> bool {
        matches!(
            self.status,
            PkiStatus::Granted | PkiStatus::GrantedWithMods
        )
    }

    pub fn has_failure(self: &Self, bit: u32) -> bool {
        bit < 32 && self.fail_info.unwrap_or(0) & (1 << bit) != 0
    }

    /// Names of the failure bits that are set; unnamed bits appear as `bit<n>`.
    pub fn failure_names(self: &Self) -> Vec<String> {
        (0..32)
            .filter(|bit| self.has_failure(*bit))
            .map(|bit| {
                FAILURE_NAMES
                    .iter()
                    .find(|(n, _)| *n == bit)
                    .map(|(_, name)| name.to_string())
                    .unwrap_or_else(|| format!("bit{}", bit))
            })
            .collect()
    }

    // PKIFreeText: SEQUENCE SIZE (1..MAX) OF UTF8String, joined by newlines.
    fn decode_free_text(mut cursor: DerCursor<'_>) -> Result<String, TsError> {
        if cursor.is_empty() {
            return Err(TsError::new(
                TsErrorKind::Malformed,
                "empty PKIFreeText",
            ));
        }

        let mut text = String::new();
        let mut truncated = false;
        while !cursor.is_empty() {
            let item = cursor.read_tag(TAG_UTF8_STRING)?;
            let s = std::str::from_utf8(item.value).map_err(|err| {
                TsError::new(
                    TsErrorKind::Malformed,
                    format!("status text at offset {}: {}", item.offset, err),
                )
            })?;

            if truncated {
                continue;
            }
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(s);

            if text.len() > MAX_STATUS_TEXT {
                let mut end = MAX_STATUS_TEXT;
                while !text.is_char_boundary(end) {
                    end -= 1;
                }
                text.truncate(end);
                truncated = true;
                log::debug!("status text truncated to {} bytes", end);
            }
        }

        Ok(text)
    }

    fn decode_fail_info(content: &[u8], offset: usize) -> Result<u32, TsError> {
        let malformed = |what: &str| {
            TsError::new(
                TsErrorKind::Malformed,
                format!("failInfo at offset {}: {}", offset, what),
            )
        };

        let (unused, data) = match content {
            [unused, data @ ..] if !data.is_empty() => (*unused, data),
            _ => return Err(malformed("empty bit string")),
        };
        if unused > 7 {
            return Err(malformed("more than 7 unused bits"));
        }
        if data.len() > 4 {
            return Err(malformed("more than 32 bits"));
        }

        let mut mask = 0u32;
        for (index, byte) in data.iter().enumerate() {
            let byte = if index == data.len() - 1 {
                byte & (0xffu8 << unused)
            } else {
                *byte
            };
            for i in 0..8 {
                if byte & (0x80 >> i) != 0 {
                    mask |= 1 << (index * 8 + i);
                }
            }
        }

        Ok(mask)
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    fn parse(bytes: &[u8]) -> Result<PkiStatusInfo, TsError> {
        let mut cursor = DerCursor::new(bytes);
        let info = PkiStatusInfo::parse(&mut cursor)?;
        cursor.finish("test")?;
        Ok(info)
    }

    #[test]
    fn test_granted_without_optionals() {
        let info = parse(&hex!("30 03 02 01 00")).unwrap();
        assert_eq!(info.status, PkiStatus::Granted);
        assert!(info.is_granted());
        assert_eq!(info.status_string, None);
        assert_eq!(info.fail_info, None);
        assert!(info.failure_names().is_empty());
    }

    #[test]
    fn test_rejection_fixture() {
        let reply = include_bytes!("./examples/rejection.tsr");
        let mut outer = DerCursor::new(reply);
        let mut resp = outer.read_sequence().unwrap();
        let info = PkiStatusInfo::parse(&mut resp).unwrap();

        assert_eq!(info.status, PkiStatus::Rejection);
        assert!(!info.is_granted());
        assert_eq!(
            info.status_string.as_deref(),
            Some("Requested policy is not supported.")
        );
        assert_eq!(info.fail_info, Some(1 << 15));
        assert_eq!(info.failure_names(), vec!["unacceptedPolicy".to_owned()]);
        assert!(resp.is_empty());
    }

    #[test]
    fn test_multiple_texts_are_joined() {
        let info = parse(&hex!("30 0d 02 01 02 30 08 0c 02 61 62 0c 02 63 64")).unwrap();
        assert_eq!(info.status_string.as_deref(), Some("ab\ncd"));
    }

    #[test]
    fn test_long_text_is_truncated_on_char_boundary() {
        // 1500 two-byte characters: 3000 bytes of content
        let text = "é".repeat(1500);
        let mut item = vec![0x0c, 0x82, 0x0b, 0xb8];
        item.extend_from_slice(text.as_bytes());
        let mut free_text = vec![0x30, 0x82, 0x0b, 0xbc];
        free_text.extend(item);
        let mut content = vec![0x02, 0x01, 0x02];
        content.extend(free_text);
        let mut bytes = vec![0x30, 0x82, 0x0b, 0xc3];
        bytes.extend(content);

        let info = parse(&bytes).unwrap();
        let decoded = info.status_string.unwrap();
        assert_eq!(decoded.len(), MAX_STATUS_TEXT);
        assert!(decoded.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_fail_info_bits() {
        // badAlg (bit 0) and badDataFormat (bit 5), 2 unused bits
        let info = parse(&hex!("30 07 02 01 02 03 02 02 84")).unwrap();
        assert_eq!(info.fail_info, Some(0b10_0001));
        assert_eq!(info.failure_names(), vec!["badAlg", "badDataFormat"]);

        // systemFailure (bit 25) with unused bits masked off
        let info = parse(&hex!("30 0a 02 01 02 03 05 06 00 00 00 7f")).unwrap();
        assert!(info.has_failure(25));
        assert_eq!(info.fail_info, Some(1 << 25));
    }

    #[test]
    fn test_invalid_fail_info() {
        for bytes in [
            &hex!("30 06 02 01 02 03 01 00")[..],
            &hex!("30 07 02 01 02 03 02 08 80")[..],
            &hex!("30 0b 02 01 02 03 06 00 01 02 03 04 05")[..],
        ] {
            assert_eq!(parse(bytes).unwrap_err().kind(), TsErrorKind::Malformed);
        }
    }

    #[test]
    fn test_invalid_status_and_text() {
        assert_eq!(
            parse(&hex!("30 03 02 01 06")).unwrap_err().kind(),
            TsErrorKind::Malformed
        );
        assert_eq!(
            parse(&hex!("30 09 02 01 02 30 04 0c 02 c3 28")).unwrap_err().kind(),
            TsErrorKind::Malformed
        );
        assert_eq!(
            parse(&hex!("30 07 02 01 02 30 02 13 00")).unwrap_err().kind(),
            TsErrorKind::UnexpectedTag
        );
        assert_eq!(
            parse(&hex!("30 06 02 01 00 05 01 00")).unwrap_err().kind(),
            TsErrorKind::Malformed
        );
    }
}
