use std::fmt::Display;

use chrono::{DateTime, Utc};
use der::{
    oid::{
        db::rfc5912::{SECP_256_R_1, SECP_384_R_1},
        ObjectIdentifier,
    },
    Decode,
};
use p256::ecdsa::signature::hazmat::PrehashVerifier;
use rsa::{pkcs1::DecodeRsaPublicKey, traits::PublicKeyParts, RsaPublicKey};

use crate::{
    algorithm::Algorithm,
    der_cursor::{DerCursor, TAG_SEQUENCE},
    errors::{TsError, TsErrorKind, TsResult},
    utils::{to_hex_str, IndentString},
};

use super::name::RdnSequence;

/// Certificate found in the `certificates` field of a SignedData.
///
/// Keeps the exact DER bytes it was decoded from so that ESS certificate
/// hashes can be computed over them.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Certificate<'a> {
    pub serial_number: Vec<u8>,
    pub issuer: RdnSequence,
    pub subject: RdnSequence,
    pub validity: Validity,
    pub public_key_algorithm: Algorithm,
    pub signature_algorithm: Algorithm,
    raw: &'a [u8],
    __inner: x509_cert::Certificate,
}

impl Display for Certificate<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Certificate:")?;
        writeln!(
            f,
            "{}",
            format!(
                "Serial Number: {}\nIssuer: {}\nSubject: {}\nValidity:\n{}\nPublic Key: {}\nSignature Algorithm: {}",
                to_hex_str(&self.serial_number),
                self.issuer,
                self.subject,
                self.validity.to_string().indent(4),
                self.public_key_description(),
                self.signature_algorithm,
            )
            .indent(4)
        )
    }
}

impl<'a> Certificate<'a> {
    /// Reads one certificate SEQUENCE from `cursor`.
    pub fn parse(cursor: &mut DerCursor<'a>) -> Result<Self, TsError> {
        let tlv = cursor.read_tag(TAG_SEQUENCE)?;
        let cert = x509_cert::Certificate::from_der(tlv.raw).map_err(|err| {
            TsError::new(
                TsErrorKind::Malformed,
                format!("certificate at offset {}: {}", tlv.offset, err),
            )
        })?;

        Ok(Self::from_parts(tlv.raw, cert))
    }

    /// Decodes a standalone DER certificate; trailing bytes are rejected.
    pub fn from_der(der: &'a [u8]) -> Result<Self, TsError> {
        let mut cursor = DerCursor::new(der);
        let cert = Self::parse(&mut cursor)?;
        cursor.finish("certificate")?;
        Ok(cert)
    }

    fn from_parts(raw: &'a [u8], value: x509_cert::Certificate) -> Self {
        let tbs = &value.tbs_certificate;
        let serial_number = tbs.serial_number.as_bytes().to_vec();
        let issuer = tbs.issuer.clone().into();
        let subject = tbs.subject.clone().into();
        let validity = tbs.validity.into();
        let public_key_algorithm = tbs.subject_public_key_info.algorithm.oid.into();
        let signature_algorithm = value.signature_algorithm.oid.into();

        Self {
            serial_number,
            issuer,
            subject,
            validity,
            public_key_algorithm,
            signature_algorithm,
            raw,
            __inner: value,
        }
    }

    /// Exact DER encoding as it appeared in the reply.
    pub fn der_bytes(self: &Self) -> &'a [u8] {
        self.raw
    }

    pub fn is_selfsigned(self: &Self) -> bool {
        self.issuer == self.subject
    }

    fn public_key_bytes(self: &Self) -> &[u8] {
        self.__inner
            .tbs_certificate
            .subject_public_key_info
            .subject_public_key
            .raw_bytes()
    }

    fn curve(self: &Self) -> Option<ObjectIdentifier> {
        self.__inner
            .tbs_certificate
            .subject_public_key_info
            .algorithm
            .parameters
            .as_ref()
            .and_then(|params| params.decode_as::<ObjectIdentifier>().ok())
    }

    fn public_key_description(self: &Self) -> String {
        match &self.public_key_algorithm {
            Algorithm::RSA => match RsaPublicKey::from_pkcs1_der(self.public_key_bytes()) {
                Ok(key) => format!("RSA ({} bit)", key.n().bits()),
                Err(_) => "RSA (invalid)".to_owned(),
            },
            Algorithm::EcPublicKey => match self.curve() {
                Some(SECP_256_R_1) => "ECDSA P-256".to_owned(),
                Some(SECP_384_R_1) => "ECDSA P-384".to_owned(),
                Some(curve) => format!("EC ({})", curve),
                None => "EC (no curve)".to_owned(),
            },
            other => other.to_string(),
        }
    }

    /// Checks `signature` over an already computed `digest`.
    ///
    /// RSA keys use PKCS#1 v1.5 with `digest_algorithm`; EC keys on P-256
    /// and P-384 take a DER encoded ECDSA signature.
    pub fn verify_digest(
        self: &Self,
        digest_algorithm: &Algorithm,
        signature_algorithm: &Algorithm,
        digest: &[u8],
        signature: &[u8],
    ) -> Result<(), TsError> {
        if signature_algorithm.is_unknown() {
            return Err(TsError::new(
                TsErrorKind::UnknownAlgorithm,
                format!("signature algorithm {}", signature_algorithm),
            ));
        }
        let mismatch = || {
            TsError::new(
                TsErrorKind::SignatureInvalid,
                format!(
                    "signature algorithm {} cannot be used with a {} key",
                    signature_algorithm, self.public_key_algorithm
                ),
            )
        };

        match &self.public_key_algorithm {
            Algorithm::RSA => {
                if !signature_algorithm.is_rsa() {
                    return Err(mismatch());
                }
                let key = RsaPublicKey::from_pkcs1_der(self.public_key_bytes())
                    .map_app_err(TsErrorKind::InvalidPublicKey)?;
                let scheme = digest_algorithm.new_pkcs1v15sign()?;
                key.verify(scheme, digest, signature)
                    .map_app_err(TsErrorKind::SignatureInvalid)
            }
            Algorithm::EcPublicKey => {
                if !signature_algorithm.is_ecdsa() {
                    return Err(mismatch());
                }
                match self.curve() {
                    Some(SECP_256_R_1) => {
                        let key = p256::ecdsa::VerifyingKey::from_sec1_bytes(self.public_key_bytes())
                            .map_app_err(TsErrorKind::InvalidPublicKey)?;
                        let signature = p256::ecdsa::Signature::from_der(signature)
                            .map_app_err(TsErrorKind::SignatureInvalid)?;
                        key.verify_prehash(digest, &signature)
                            .map_app_err(TsErrorKind::SignatureInvalid)
                    }
                    Some(SECP_384_R_1) => {
                        let key = p384::ecdsa::VerifyingKey::from_sec1_bytes(self.public_key_bytes())
                            .map_app_err(TsErrorKind::InvalidPublicKey)?;
                        let signature = p384::ecdsa::Signature::from_der(signature)
                            .map_app_err(TsErrorKind::SignatureInvalid)?;
                        key.verify_prehash(digest, &signature)
                            .map_app_err(TsErrorKind::SignatureInvalid)
                    }
                    Some(curve) => Err(TsError::new(
                        TsErrorKind::UnknownAlgorithm,
                        format!("elliptic curve {}", curve),
                    )),
                    None => Err(TsError::new(
                        TsErrorKind::InvalidPublicKey,
                        "EC public key without a named curve",
                    )),
                }
            }
            other => Err(TsError::new(
                TsErrorKind::UnknownAlgorithm,
                format!("public key algorithm {}", other),
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Validity {
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

impl From<x509_cert::time::Validity> for Validity {
    fn from(value: x509_cert::time::Validity) -> Self {
        Self {
            not_before: value.not_before.to_system_time().into(),
            not_after: value.not_after.to_system_time().into(),
        }
    }
}

impl Display for Validity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Not Before: {}\nNot After : {}",
            self.not_before, self.not_after
        )
    }
}
