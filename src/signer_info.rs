use der::oid::ObjectIdentifier;

use crate::{
    algorithm::{resolve_algorithm_identifier, Algorithm},
    cert::IssuerAndSerialNumber,
    der_cursor::{context_constructed, DerCursor, TAG_SEQUENCE, TAG_SET},
    errors::{TsError, TsErrorKind},
    utils::to_hex_str,
};

pub const ID_MESSAGE_DIGEST: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");
pub const ID_AA_SIGNING_CERTIFICATE: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.16.2.12");
pub const ID_AA_SIGNING_CERTIFICATE_V2: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.16.2.47");

/// Hash of the signing certificate from an ESS signing-certificate attribute.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SigningCertHash<'a> {
    pub algorithm: Algorithm,
    pub hash: &'a [u8],
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SignerInfo<'a> {
    pub signer_identity: IssuerAndSerialNumber<'a>,
    pub digest_algorithm: Algorithm,
    /// Complete `[0]` element including its tag and length octets.
    pub signed_attributes_raw: Option<&'a [u8]>,
    /// Value of the message-digest attribute.
    pub attr_digest: Option<&'a [u8]>,
    pub signing_cert_hash: Option<SigningCertHash<'a>>,
    pub signature_algorithm: Algorithm,
    pub signature: &'a [u8],
}

impl<'a> SignerInfo<'a> {
    /// Reads one `SignerInfo` SEQUENCE.
    ///
    /// Only the version 1 form, which names the signer by issuer and serial
    /// number, is accepted; any other version is `UnsupportedSignerForm`.
    /// Unsigned attributes are skipped.
    pub fn parse(cursor: &mut DerCursor<'a>) -> Result<Self, TsError> {
        let mut seq = cursor.read_sequence()?;

        let version = seq.read_small_int()?;
        if version != 1 {
            return Err(TsError::new(
                TsErrorKind::UnsupportedSignerForm,
                match version {
                    3 => "SignerInfo version 3 (subjectKeyIdentifier)".to_owned(),
                    other => format!("SignerInfo version {}", other),
                },
            ));
        }

        let signer_identity = IssuerAndSerialNumber::parse(&mut seq)?;
        let digest_algorithm = resolve_algorithm_identifier(&mut seq)?;

        let mut signed_attributes_raw = None;
        let mut attrs = SignedAttributes::default();
        if let Some(tlv) = seq.read_optional(context_constructed(0))? {
            signed_attributes_raw = Some(tlv.raw);
            attrs = SignedAttributes::parse(tlv.cursor())?;

            if attrs.message_digest.is_none() {
                return Err(TsError::new(
                    TsErrorKind::Malformed,
                    "signed attributes without a message-digest attribute",
                ));
            }
        }

        let signature_algorithm = resolve_algorithm_identifier(&mut seq)?;
        let signature = seq.read_octet_string()?;

        if let Some(unsigned) = seq.read_optional(context_constructed(1))? {
            log::debug!(
                "skipping {} byte(s) of unsigned attributes",
                unsigned.value.len()
            );
        }
        seq.finish("SignerInfo")?;

        if let (Some(digest), Some(len)) = (attrs.message_digest, digest_algorithm.digest_len()) {
            if digest.len() != len {
                return Err(TsError::new(
                    TsErrorKind::Malformed,
                    format!(
                        "message-digest attribute has {} bytes, {} needs {}",
                        digest.len(),
                        digest_algorithm,
                        len
                    ),
                ));
            }
        }

        log::debug!(
            "SignerInfo: {}, digest {}, signature {}",
            signer_identity,
            digest_algorithm,
            signature_algorithm
        );

        Ok(Self {
            signer_identity,
            digest_algorithm,
            signed_attributes_raw,
            attr_digest: attrs.message_digest,
            signing_cert_hash: attrs.signing_cert_hash,
            signature_algorithm,
            signature,
        })
    }
}

#[derive(Default)]
struct SignedAttributes<'a> {
    message_digest: Option<&'a [u8]>,
    signing_cert_hash: Option<SigningCertHash<'a>>,
}

impl<'a> SignedAttributes<'a> {
    // Repeated attributes keep the longest value seen.
    fn parse(mut cursor: DerCursor<'a>) -> Result<Self, TsError> {
        let mut attrs = Self::default();

        while !cursor.is_empty() {
            let mut attribute = cursor.read_sequence()?;
            let oid = attribute.read_object_identifier()?;
            let mut values = attribute.read_tag(TAG_SET)?.cursor();
            attribute.finish("Attribute")?;

            if oid == ID_MESSAGE_DIGEST {
                let digest = values.read_octet_string()?;
                log::trace!("message-digest {}", to_hex_str(digest));
                if attrs.message_digest.map_or(true, |d| digest.len() > d.len()) {
                    attrs.message_digest = Some(digest);
                }
            } else if oid == ID_AA_SIGNING_CERTIFICATE {
                let hash = Self::ess_cert_id(&mut values)?;
                attrs.keep_longest(hash);
            } else if oid == ID_AA_SIGNING_CERTIFICATE_V2 {
                let hash = Self::ess_cert_id_v2(&mut values)?;
                attrs.keep_longest(hash);
            } else {
                log::trace!("skipping signed attribute {}", oid);
            }
        }

        Ok(attrs)
    }

    fn keep_longest(self: &mut Self, hash: SigningCertHash<'a>) {
        log::trace!(
            "signing certificate {} {}",
            hash.algorithm,
            to_hex_str(hash.hash)
        );
        if self
            .signing_cert_hash
            .as_ref()
            .map_or(true, |h| hash.hash.len() > h.hash.len())
        {
            self.signing_cert_hash = Some(hash);
        }
    }

    // SigningCertificate ::= SEQUENCE { certs SEQUENCE OF ESSCertID, ... }
    // ESSCertID ::= SEQUENCE { certHash OCTET STRING, ... }
    fn ess_cert_id(values: &mut DerCursor<'a>) -> Result<SigningCertHash<'a>, TsError> {
        let mut certs = values.read_sequence()?.read_sequence()?;
        let mut cert_id = certs.read_sequence()?;

        Ok(SigningCertHash {
            algorithm: Algorithm::Sha1,
            hash: cert_id.read_octet_string()?,
        })
    }

    // ESSCertIDv2 ::= SEQUENCE { hashAlgorithm DEFAULT sha256, certHash OCTET STRING, ... }
    fn ess_cert_id_v2(values: &mut DerCursor<'a>) -> Result<SigningCertHash<'a>, TsError> {
        let mut certs = values.read_sequence()?.read_sequence()?;
        let mut cert_id = certs.read_sequence()?;

        let algorithm = if cert_id.peek_tag() == Some(TAG_SEQUENCE) {
            resolve_algorithm_identifier(&mut cert_id)?
        } else {
            Algorithm::Sha256
        };

        Ok(SigningCertHash {
            algorithm,
            hash: cert_id.read_octet_string()?,
        })
    }
}
