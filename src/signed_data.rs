use der::oid::{db::rfc5911::ID_SIGNED_DATA, ObjectIdentifier};

use crate::{
    algorithm::{resolve_algorithm_identifier_set, Algorithm},
    cert::CertificateChain,
    der_cursor::{context_constructed, DerCursor, TAG_OCTET_STRING, TAG_SET},
    errors::{TsError, TsErrorKind},
    signer_info::SignerInfo,
    tstinfo::TstInfo,
    utils::to_hex_str,
};

pub const ID_CT_TST_INFO: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.16.1.4");

/// Digest that is signed when signed attributes are present.
///
/// The attributes are hashed as an explicit SET OF, so the `[0]` tag of the
/// encoded element is replaced with `0x31`; length and content are unchanged.
pub fn signed_attributes_digest(algorithm: &Algorithm, raw: &[u8]) -> Result<Vec<u8>, TsError> {
    let content = raw.get(1..).filter(|rest| !rest.is_empty()).ok_or_else(|| {
        TsError::new(TsErrorKind::Malformed, "signed attributes are too short")
    })?;

    let mut hasher = algorithm.new_digest()?;
    hasher.update(&[TAG_SET]);
    hasher.update(content);
    Ok(hasher.finalize().to_vec())
}

/// The `timeStampToken` of a reply: a CMS SignedData over a TSTInfo.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TimeStampToken<'a> {
    /// Recognized entry of the SignedData `digestAlgorithms` set.
    pub digest_algorithm: Algorithm,
    /// Content octets of the eContent OCTET STRING.
    pub signed_content: &'a [u8],
    pub tst_info: TstInfo<'a>,
    pub certificate_chain: CertificateChain<'a>,
    pub signer_info: SignerInfo<'a>,
    /// Whether an ESS signing-certificate hash matched a certificate;
    /// `None` without such an attribute.
    pub signing_certificate_matched: Option<bool>,
}

impl<'a> TimeStampToken<'a> {
    /// Reads the token ContentInfo, decodes its TSTInfo, certificates and
    /// first SignerInfo, and moves the signing certificate to the head of the
    /// chain. Nothing is verified yet.
    ///
    /// With `strict_signer_match` an ESS hash that names none of the
    /// certificates is an error instead of a fall back to the first one.
    pub fn parse(cursor: &mut DerCursor<'a>, strict_signer_match: bool) -> Result<Self, TsError> {
        let mut content_info = cursor.read_sequence()?;
        let content_type = content_info.read_object_identifier()?;
        if content_type != ID_SIGNED_DATA {
            return Err(TsError::new(
                TsErrorKind::Malformed,
                format!("token content type {} is not signedData", content_type),
            ));
        }
        let mut explicit = content_info.read_tag(context_constructed(0))?.cursor();
        content_info.finish("ContentInfo")?;

        let mut signed_data = explicit.read_sequence()?;
        explicit.finish("ContentInfo content")?;

        let version = signed_data.read_small_int()?;
        log::debug!("SignedData version {}", version);

        let digest_algorithm = resolve_algorithm_identifier_set(&mut signed_data)?;

        let (signed_content, tst_info) = Self::parse_encapsulated_content(&mut signed_data)?;

        let mut certificate_chain = match signed_data.read_optional(context_constructed(0))? {
            Some(set) => CertificateChain::collect(set.cursor())?,
            None => {
                log::debug!("token carries no certificates");
                CertificateChain::new()
            }
        };

        if let Some(crls) = signed_data.read_optional(context_constructed(1))? {
            log::debug!("skipping {} byte(s) of CRLs", crls.value.len());
        }

        let mut signer_infos = signed_data.read_tag(TAG_SET)?.cursor();
        let signer_info = SignerInfo::parse(&mut signer_infos)?;
        if !signer_infos.is_empty() {
            log::debug!(
                "ignoring {} byte(s) of further SignerInfos",
                signer_infos.remaining()
            );
        }
        signed_data.finish("SignedData")?;

        let signing_certificate_matched = match &signer_info.signing_cert_hash {
            Some(ess) => {
                let matched =
                    certificate_chain.promote_signing_certificate(&ess.algorithm, ess.hash)?;
                if !matched {
                    if strict_signer_match {
                        return Err(TsError::new(
                            TsErrorKind::SignerCertificateNotFound,
                            format!(
                                "no certificate matches the {} hash {}",
                                ess.algorithm,
                                to_hex_str(ess.hash)
                            ),
                        ));
                    }
                    log::warn!(
                        "signing certificate hash matches none of {} certificate(s), using the first",
                        certificate_chain.len()
                    );
                }
                Some(matched)
            }
            None => None,
        };

        Ok(Self {
            digest_algorithm,
            signed_content,
            tst_info,
            certificate_chain,
            signer_info,
            signing_certificate_matched,
        })
    }

    // EncapsulatedContentInfo ::= SEQUENCE { eContentType, [0] EXPLICIT OCTET STRING }
    fn parse_encapsulated_content(
        signed_data: &mut DerCursor<'a>,
    ) -> Result<(&'a [u8], TstInfo<'a>), TsError> {
        let mut encap = signed_data.read_sequence()?;
        let econtent_type = encap.read_object_identifier()?;
        if econtent_type != ID_CT_TST_INFO {
            return Err(TsError::new(
                TsErrorKind::Malformed,
                format!("eContentType {} is not id-ct-TSTInfo", econtent_type),
            ));
        }
        let mut econtent = encap.read_tag(context_constructed(0))?.cursor();
        encap.finish("EncapsulatedContentInfo")?;

        let octets = econtent.read_tag(TAG_OCTET_STRING)?;
        econtent.finish("eContent")?;

        let mut content = octets.cursor();
        let tst_info = TstInfo::parse(&mut content)?;
        content.finish("eContent octets")?;

        Ok((octets.value, tst_info))
    }

    /// Digest the signature is checked against.
    ///
    /// Without signed attributes this is the digest of the eContent octets.
    /// With them, the message-digest attribute must equal that digest and
    /// the signer must use the SignedData digest algorithm; the result is
    /// then the digest of the re-tagged signed attributes.
    pub fn verification_digest(self: &Self) -> Result<Vec<u8>, TsError> {
        let algorithm = &self.digest_algorithm;
        if algorithm.is_unknown() {
            return Err(TsError::new(
                TsErrorKind::UnknownAlgorithm,
                format!("SignedData digest algorithm {}", algorithm),
            ));
        }

        let content_digest = algorithm.digest(self.signed_content)?;
        let signer = &self.signer_info;

        let raw = match signer.signed_attributes_raw {
            Some(raw) => raw,
            None => {
                log::debug!("no signed attributes, content digest is signed directly");
                return Ok(content_digest);
            }
        };

        if signer.digest_algorithm != *algorithm {
            return Err(TsError::new(
                TsErrorKind::DigestMismatch,
                format!(
                    "SignerInfo digest algorithm {} differs from {}",
                    signer.digest_algorithm, algorithm
                ),
            ));
        }

        let attr_digest = signer.attr_digest.ok_or_else(|| {
            TsError::new(
                TsErrorKind::Malformed,
                "signed attributes without a message-digest attribute",
            )
        })?;
        if attr_digest != content_digest.as_slice() {
            return Err(TsError::new(
                TsErrorKind::DigestMismatch,
                format!(
                    "message-digest {} does not match content digest {}",
                    to_hex_str(attr_digest),
                    to_hex_str(&content_digest)
                ),
            ));
        }

        signed_attributes_digest(&signer.digest_algorithm, raw)
    }

    /// Checks the SignerInfo signature with the head of the certificate chain.
    pub fn verify_signature(self: &Self) -> Result<(), TsError> {
        let digest = self.verification_digest()?;
        let cert = self.certificate_chain.head().ok_or_else(|| {
            TsError::new(
                TsErrorKind::SignerCertificateNotFound,
                "token carries no certificate to verify with",
            )
        })?;

        cert.verify_digest(
            &self.digest_algorithm,
            &self.signer_info.signature_algorithm,
            &digest,
            self.signer_info.signature,
        )?;

        log::debug!("signature verified with {}", cert.subject);
        Ok(())
    }
}
