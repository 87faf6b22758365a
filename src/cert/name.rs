use der::{
    asn1::{BmpString, Ia5StringRef, PrintableStringRef, TeletexStringRef, Utf8StringRef},
    oid::{db::DB, ObjectIdentifier},
    Any, Decode, Encode, Tag, Tagged,
};
use std::fmt::Display;
use x509_cert::attr::AttributeTypeAndValue;

use crate::{
    errors::{TsError, TsErrorKind, TsResult},
    utils::{to_hex_str, VecInto},
};

pub type Name = RdnSequence;

/// Decodes a DER `Name` (an RDNSequence) for display and comparison.
pub fn decode_name(der: &[u8]) -> Result<Name, TsError> {
    let name = x509_cert::name::RdnSequence::from_der(der).map_app_err(TsErrorKind::Malformed)?;
    Ok(name.into())
}

/// An X.501 `Name`. Equality is ordered: two names holding the same RDNs in
/// a different sequence are different issuers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RdnSequence(pub Vec<RelativeDistinguishedName>);

impl Display for RdnSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rdn = self
            .0
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{}", rdn)
    }
}

impl From<x509_cert::name::RdnSequence> for RdnSequence {
    fn from(value: x509_cert::name::RdnSequence) -> Self {
        Self(value.0.vec_into())
    }
}

/// One RDN rendered as `KEY=value` strings. An RDN is a SET, so members
/// compare without regard to order.
#[derive(Clone, Debug)]
pub struct RelativeDistinguishedName(pub Vec<String>);

impl PartialEq for RelativeDistinguishedName {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len() && self.0.iter().all(|atv| other.0.contains(atv))
    }
}

impl Eq for RelativeDistinguishedName {}

impl Display for RelativeDistinguishedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join(", "))
    }
}

impl From<x509_cert::name::RelativeDistinguishedName> for RelativeDistinguishedName {
    fn from(value: x509_cert::name::RelativeDistinguishedName) -> Self {
        Self(value.0.iter().map(render_attribute).collect())
    }
}

fn render_attribute(atv: &AttributeTypeAndValue) -> String {
    let value = match attribute_text(&atv.value) {
        Some(text) => escape_value(&text),
        None => match atv.value.to_der() {
            Ok(der) => format!("#{}", to_hex_str(&der)),
            Err(_) => "#".to_owned(),
        },
    };

    format!("{}={}", attribute_key(atv.oid), value)
}

/// Shortest registered name for the attribute type, upper-cased, or the
/// dotted OID.
fn attribute_key(oid: ObjectIdentifier) -> String {
    DB.find_names_for_oid(oid)
        .min_by_key(|name| name.len())
        .map(|name| name.to_ascii_uppercase())
        .unwrap_or_else(|| oid.to_string())
}

fn attribute_text(value: &Any) -> Option<String> {
    match value.tag() {
        Tag::PrintableString => PrintableStringRef::try_from(value).ok().map(|s| s.to_string()),
        Tag::Utf8String => Utf8StringRef::try_from(value).ok().map(|s| s.to_string()),
        Tag::Ia5String => Ia5StringRef::try_from(value).ok().map(|s| s.to_string()),
        Tag::TeletexString => TeletexStringRef::try_from(value).ok().map(|s| s.to_string()),
        // UTF-16
        Tag::BmpString => value.decode_as::<BmpString>().ok().map(|s| s.to_string()),
        _ => None,
    }
}

/// RFC 4514 escaping of an attribute value.
fn escape_value(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    let last = text.chars().count().saturating_sub(1);

    for (i, c) in text.chars().enumerate() {
        match c {
            '#' if i == 0 => escaped.push_str("\\#"),
            ' ' if i == 0 || i == last => escaped.push_str("\\ "),
            '"' | '+' | ',' | ';' | '<' | '>' | '\\' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '\x00'..='\x1f' | '\x7f' => escaped.push_str(&format!("\\{:02x}", c as u8)),
            _ => escaped.push(c),
        }
    }

    escaped
}
