pub mod name;

mod certificate;
mod certificate_chain;

pub use certificate::{Certificate, Validity};
pub use certificate_chain::{CertificateChain, ChainIter};
use name::Name;

use crate::{
    der_cursor::{DerCursor, TAG_SEQUENCE},
    errors::TsError,
    utils::to_hex_str,
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IssuerAndSerialNumber<'a> {
    pub issuer: Name,
    /// Magnitude bytes of the serial number, leading zeros removed.
    pub serial_number: &'a [u8],
}

impl<'a> IssuerAndSerialNumber<'a> {
    pub fn parse(cursor: &mut DerCursor<'a>) -> Result<Self, TsError> {
        let mut seq = cursor.read_sequence()?;
        let issuer = name::decode_name(seq.read_tag(TAG_SEQUENCE)?.raw)?;
        let serial_number = seq.read_unsigned_integer()?;
        seq.finish("IssuerAndSerialNumber")?;

        Ok(Self {
            issuer,
            serial_number,
        })
    }
}

impl std::fmt::Display for IssuerAndSerialNumber<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} #{}", self.issuer, to_hex_str(self.serial_number))
    }
}
