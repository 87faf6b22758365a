use std::fmt::Display;

use der::oid::{
    db::rfc5912::{
        ECDSA_WITH_SHA_224, ECDSA_WITH_SHA_256, ECDSA_WITH_SHA_384, ECDSA_WITH_SHA_512,
        ID_EC_PUBLIC_KEY, ID_SHA_1, ID_SHA_224, ID_SHA_256, ID_SHA_384, ID_SHA_512,
        RSA_ENCRYPTION, SHA_1_WITH_RSA_ENCRYPTION, SHA_224_WITH_RSA_ENCRYPTION,
        SHA_256_WITH_RSA_ENCRYPTION, SHA_384_WITH_RSA_ENCRYPTION, SHA_512_WITH_RSA_ENCRYPTION,
    },
    ObjectIdentifier,
};
use digest::{Digest, DynDigest};
use rsa::Pkcs1v15Sign;
use sha1::Sha1;
use sha2::{Sha224, Sha256, Sha384, Sha512};

use crate::{
    der_cursor::{DerCursor, Oid, TAG_NULL, TAG_SET},
    errors::{TsError, TsErrorKind},
};

pub const ID_MD_5: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.2.5");

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Algorithm {
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
    Md5,
    RSA,
    Sha1WithRSA,
    Sha224WithRSA,
    Sha256WithRSA,
    Sha384WithRSA,
    Sha512WithRSA,
    EcPublicKey,
    EcdsaWithSha224,
    EcdsaWithSha256,
    EcdsaWithSha384,
    EcdsaWithSha512,
    /// Dotted form of an OID that is not in the table.
    Unknown(String),
}

impl Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Algorithm::Unknown(oid) if oid.is_empty() => write!(f, "Unknown"),
            Algorithm::Unknown(oid) => write!(f, "Unknown({})", oid),
            other => write!(f, "{:?}", other),
        }
    }
}

impl From<ObjectIdentifier> for Algorithm {
    fn from(value: ObjectIdentifier) -> Self {
        match value {
            ID_SHA_1 => Self::Sha1,
            ID_SHA_224 => Self::Sha224,
            ID_SHA_256 => Self::Sha256,
            ID_SHA_384 => Self::Sha384,
            ID_SHA_512 => Self::Sha512,
            ID_MD_5 => Self::Md5,
            RSA_ENCRYPTION => Self::RSA,
            SHA_1_WITH_RSA_ENCRYPTION => Self::Sha1WithRSA,
            SHA_224_WITH_RSA_ENCRYPTION => Self::Sha224WithRSA,
            SHA_256_WITH_RSA_ENCRYPTION => Self::Sha256WithRSA,
            SHA_384_WITH_RSA_ENCRYPTION => Self::Sha384WithRSA,
            SHA_512_WITH_RSA_ENCRYPTION => Self::Sha512WithRSA,
            ID_EC_PUBLIC_KEY => Self::EcPublicKey,
            ECDSA_WITH_SHA_224 => Self::EcdsaWithSha224,
            ECDSA_WITH_SHA_256 => Self::EcdsaWithSha256,
            ECDSA_WITH_SHA_384 => Self::EcdsaWithSha384,
            ECDSA_WITH_SHA_512 => Self::EcdsaWithSha512,
            oid => Self::Unknown(oid.to_string()),
        }
    }
}

impl From<Oid<'_>> for Algorithm {
    fn from(value: Oid<'_>) -> Self {
        value
            .to_object_identifier()
            .map(Algorithm::from)
            .filter(|algorithm| !algorithm.is_unknown())
            .unwrap_or_else(|| Self::Unknown(value.to_string()))
    }
}

impl From<x509_cert::spki::AlgorithmIdentifierOwned> for Algorithm {
    fn from(value: x509_cert::spki::AlgorithmIdentifierOwned) -> Self {
        value.oid.into()
    }
}

impl Algorithm {
    pub fn is_unknown(self: &Self) -> bool {
        matches!(self, Algorithm::Unknown(_))
    }

    pub fn is_rsa(self: &Self) -> bool {
        matches!(
            self,
            Algorithm::RSA
                | Algorithm::Sha1WithRSA
                | Algorithm::Sha224WithRSA
                | Algorithm::Sha256WithRSA
                | Algorithm::Sha384WithRSA
                | Algorithm::Sha512WithRSA
        )
    }

    pub fn is_ecdsa(self: &Self) -> bool {
        matches!(
            self,
            Algorithm::EcPublicKey
                | Algorithm::EcdsaWithSha224
                | Algorithm::EcdsaWithSha256
                | Algorithm::EcdsaWithSha384
                | Algorithm::EcdsaWithSha512
        )
    }

    /// Output size in bytes of the digest this algorithm names or implies.
    pub fn digest_len(self: &Self) -> Option<usize> {
        match self {
            Algorithm::Md5 => Some(16),
            Algorithm::Sha1 | Algorithm::Sha1WithRSA => Some(20),
            Algorithm::Sha224 | Algorithm::Sha224WithRSA | Algorithm::EcdsaWithSha224 => Some(28),
            Algorithm::Sha256 | Algorithm::Sha256WithRSA | Algorithm::EcdsaWithSha256 => Some(32),
            Algorithm::Sha384 | Algorithm::Sha384WithRSA | Algorithm::EcdsaWithSha384 => Some(48),
            Algorithm::Sha512 | Algorithm::Sha512WithRSA | Algorithm::EcdsaWithSha512 => Some(64),
            _ => None,
        }
    }

    pub fn new_digest(self: &Self) -> Result<Box<dyn DynDigest>, TsError> {
        match self {
            Algorithm::Sha1 | Algorithm::Sha1WithRSA => Ok(Sha1::new().box_clone()),
            Algorithm::Sha224 | Algorithm::Sha224WithRSA | Algorithm::EcdsaWithSha224 => {
                Ok(Sha224::new().box_clone())
            }
            Algorithm::Sha256 | Algorithm::Sha256WithRSA | Algorithm::EcdsaWithSha256 => {
                Ok(Sha256::new().box_clone())
            }
            Algorithm::Sha384 | Algorithm::Sha384WithRSA | Algorithm::EcdsaWithSha384 => {
                Ok(Sha384::new().box_clone())
            }
            Algorithm::Sha512 | Algorithm::Sha512WithRSA | Algorithm::EcdsaWithSha512 => {
                Ok(Sha512::new().box_clone())
            }
            _ => Err(TsError::new(
                TsErrorKind::UnknownAlgorithm,
                format!("digest: {}", self),
            )),
        }
    }

    /// One-shot digest of `data`.
    pub fn digest(self: &Self, data: &[u8]) -> Result<Vec<u8>, TsError> {
        let mut hasher = self.new_digest()?;
        hasher.update(data);
        Ok(hasher.finalize().to_vec())
    }

    pub fn new_pkcs1v15sign(self: &Self) -> Result<Pkcs1v15Sign, TsError> {
        match self {
            Algorithm::Sha1 | Algorithm::Sha1WithRSA => Ok(Pkcs1v15Sign::new::<Sha1>()),
            Algorithm::Sha224 | Algorithm::Sha224WithRSA => Ok(Pkcs1v15Sign::new::<Sha224>()),
            Algorithm::Sha256 | Algorithm::Sha256WithRSA => Ok(Pkcs1v15Sign::new::<Sha256>()),
            Algorithm::Sha384 | Algorithm::Sha384WithRSA => Ok(Pkcs1v15Sign::new::<Sha384>()),
            Algorithm::Sha512 | Algorithm::Sha512WithRSA => Ok(Pkcs1v15Sign::new::<Sha512>()),
            _ => Err(TsError::new(
                TsErrorKind::UnknownAlgorithm,
                format!("pkcs1v15sign: {}", self),
            )),
        }
    }
}

/// Reads one `AlgorithmIdentifier` SEQUENCE: an OID followed by an optional
/// NULL or an arbitrary parameter element, which is skipped.
///
/// An unrecognized OID is not an error here; callers decide whether they
/// need the algorithm.
pub fn resolve_algorithm_identifier(cursor: &mut DerCursor<'_>) -> Result<Algorithm, TsError> {
    let mut seq = cursor.read_sequence()?;
    let oid = seq.read_object_identifier()?;

    if let Some(null) = seq.read_optional(TAG_NULL)? {
        if !null.value.is_empty() {
            return Err(TsError::new(
                TsErrorKind::Malformed,
                format!("NULL parameters with content at offset {}", null.offset),
            ));
        }
    } else if !seq.is_empty() {
        seq.skip()?;
    }
    seq.finish("AlgorithmIdentifier")?;

    let algorithm = Algorithm::from(oid);
    log::trace!("algorithm {} -> {}", oid, algorithm);
    Ok(algorithm)
}

/// Reads a SET OF `AlgorithmIdentifier`.
///
/// When several entries are recognized the last one wins. An empty set, or
/// one without any recognized entry, yields `Algorithm::Unknown`.
pub fn resolve_algorithm_identifier_set(cursor: &mut DerCursor<'_>) -> Result<Algorithm, TsError> {
    let mut set = cursor.read_tag(TAG_SET)?.cursor();
    let mut result = Algorithm::Unknown(String::new());

    while !set.is_empty() {
        let algorithm = resolve_algorithm_identifier(&mut set)?;
        if !algorithm.is_unknown() || result.is_unknown() {
            result = algorithm;
        }
    }

    log::debug!("digest algorithm set resolved to {}", result);
    Ok(result)
}
