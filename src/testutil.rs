//! DER writers and reply builders shared by the unit tests.

use der::oid::{
    db::rfc5912::{
        ECDSA_WITH_SHA_224, ECDSA_WITH_SHA_256, ECDSA_WITH_SHA_384, ECDSA_WITH_SHA_512,
        ID_EC_PUBLIC_KEY, ID_SHA_1, ID_SHA_224, ID_SHA_256, ID_SHA_384, ID_SHA_512,
        RSA_ENCRYPTION, SHA_1_WITH_RSA_ENCRYPTION, SHA_224_WITH_RSA_ENCRYPTION,
        SHA_256_WITH_RSA_ENCRYPTION, SHA_384_WITH_RSA_ENCRYPTION, SHA_512_WITH_RSA_ENCRYPTION,
    },
    ObjectIdentifier,
};
use der::{oid::db::rfc5911::ID_SIGNED_DATA, Decode, Encode};
use rsa::{pkcs8::DecodePrivateKey, RsaPrivateKey};

use crate::{
    algorithm::{Algorithm, ID_MD_5},
    signed_data::{signed_attributes_digest, ID_CT_TST_INFO},
    signer_info::{ID_AA_SIGNING_CERTIFICATE, ID_AA_SIGNING_CERTIFICATE_V2, ID_MESSAGE_DIGEST},
};

pub const ID_CONTENT_TYPE: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.3");

pub const CA_DER: &[u8] = include_bytes!("./examples/ca.der");
pub const TSA_DER: &[u8] = include_bytes!("./examples/tsa.der");
pub const TSA_KEY_DER: &[u8] = include_bytes!("./examples/tsa.key.der");
pub const PAYLOAD: &[u8] = include_bytes!("./examples/payload.bin");

pub mod enc {
    use super::*;

    pub fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
        let mut out = vec![tag];
        let len = content.len();
        if len < 0x80 {
            out.push(len as u8);
        } else {
            let bytes = (len as u32).to_be_bytes();
            let skip = bytes.iter().take_while(|b| **b == 0).count();
            out.push(0x80 | (4 - skip) as u8);
            out.extend_from_slice(&bytes[skip..]);
        }
        out.extend_from_slice(content);
        out
    }

    pub fn seq(parts: &[&[u8]]) -> Vec<u8> {
        tlv(0x30, &parts.concat())
    }

    pub fn set(parts: &[&[u8]]) -> Vec<u8> {
        tlv(0x31, &parts.concat())
    }

    pub fn small_int(value: i64) -> Vec<u8> {
        let bytes = value.to_be_bytes();
        let mut start = 0;
        while start < 7 {
            let redundant = (bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
                || (bytes[start] == 0xff && bytes[start + 1] & 0x80 != 0);
            if !redundant {
                break;
            }
            start += 1;
        }
        tlv(0x02, &bytes[start..])
    }

    pub fn unsigned_int(magnitude: &[u8]) -> Vec<u8> {
        let mut content = vec![];
        if magnitude.first().map_or(true, |b| b & 0x80 != 0) {
            content.push(0);
        }
        content.extend_from_slice(magnitude);
        tlv(0x02, &content)
    }

    pub fn oid(oid: ObjectIdentifier) -> Vec<u8> {
        tlv(0x06, oid.as_bytes())
    }

    /// OID from its dotted form, without `der`'s arc and length limits.
    pub fn dotted_oid(dotted: &str) -> Vec<u8> {
        let arcs: Vec<u128> = dotted.split('.').map(|arc| arc.parse().unwrap()).collect();
        let mut content = vec![];
        let first = arcs[0] * 40 + arcs[1];
        for arc in std::iter::once(first).chain(arcs[2..].iter().copied()) {
            let mut groups = vec![(arc & 0x7f) as u8];
            let mut rest = arc >> 7;
            while rest > 0 {
                groups.push((rest & 0x7f) as u8 | 0x80);
                rest >>= 7;
            }
            groups.reverse();
            content.extend(groups);
        }
        tlv(0x06, &content)
    }

    pub fn octet_string(content: &[u8]) -> Vec<u8> {
        tlv(0x04, content)
    }

    pub fn null() -> Vec<u8> {
        vec![0x05, 0x00]
    }

    pub fn generalized_time(value: &str) -> Vec<u8> {
        tlv(0x18, value.as_bytes())
    }

    pub fn algorithm(algorithm: &Algorithm) -> Vec<u8> {
        seq(&[&algorithm_oid(algorithm), &null()])
    }

    pub fn attribute(oid_value: ObjectIdentifier, value: &[u8]) -> Vec<u8> {
        seq(&[&oid(oid_value), &set(&[value])])
    }
}

/// Encoded OID of `algorithm`.
pub fn algorithm_oid(algorithm: &Algorithm) -> Vec<u8> {
    let oid = match algorithm {
        Algorithm::Sha1 => ID_SHA_1,
        Algorithm::Sha224 => ID_SHA_224,
        Algorithm::Sha256 => ID_SHA_256,
        Algorithm::Sha384 => ID_SHA_384,
        Algorithm::Sha512 => ID_SHA_512,
        Algorithm::Md5 => ID_MD_5,
        Algorithm::RSA => RSA_ENCRYPTION,
        Algorithm::Sha1WithRSA => SHA_1_WITH_RSA_ENCRYPTION,
        Algorithm::Sha224WithRSA => SHA_224_WITH_RSA_ENCRYPTION,
        Algorithm::Sha256WithRSA => SHA_256_WITH_RSA_ENCRYPTION,
        Algorithm::Sha384WithRSA => SHA_384_WITH_RSA_ENCRYPTION,
        Algorithm::Sha512WithRSA => SHA_512_WITH_RSA_ENCRYPTION,
        Algorithm::EcPublicKey => ID_EC_PUBLIC_KEY,
        Algorithm::EcdsaWithSha224 => ECDSA_WITH_SHA_224,
        Algorithm::EcdsaWithSha256 => ECDSA_WITH_SHA_256,
        Algorithm::EcdsaWithSha384 => ECDSA_WITH_SHA_384,
        Algorithm::EcdsaWithSha512 => ECDSA_WITH_SHA_512,
        Algorithm::Unknown(dotted) => return enc::dotted_oid(dotted),
    };
    enc::oid(oid)
}

/// Issuer name of the fixture TSA certificate.
pub fn tsa_issuer() -> Vec<u8> {
    let cert = x509_cert::Certificate::from_der(TSA_DER).unwrap();
    cert.tbs_certificate.issuer.to_der().unwrap()
}

/// TSTInfo with the given imprint and time; serial 42, no optional fields.
pub fn tst_info(algorithm: &Algorithm, imprint: &[u8], gen_time: &str) -> Vec<u8> {
    let policy = enc::oid(ObjectIdentifier::new_unwrap("1.3.6.1.4.1.99999.1.1"));
    tst_info_with(&policy, algorithm, imprint, gen_time, &[])
}

/// TSTInfo with an encoded `policy` OID and `optional` fields appended after
/// the genTime.
pub fn tst_info_with(
    policy: &[u8],
    algorithm: &Algorithm,
    imprint: &[u8],
    gen_time: &str,
    optional: &[&[u8]],
) -> Vec<u8> {
    enc::seq(&[
        &enc::small_int(1),
        policy,
        &enc::seq(&[&enc::algorithm(algorithm), &enc::octet_string(imprint)]),
        &enc::small_int(42),
        &enc::generalized_time(gen_time),
        &optional.concat(),
    ])
}

#[derive(Clone, Debug)]
pub struct SignerInfoBuilder {
    version: i64,
    digest_algorithm: Algorithm,
    attributes: Option<Vec<Vec<u8>>>,
    signature_algorithm: Algorithm,
    signature: Vec<u8>,
    unsigned: Option<Vec<u8>>,
    trailing: Vec<u8>,
}

impl SignerInfoBuilder {
    pub fn new() -> Self {
        Self {
            version: 1,
            digest_algorithm: Algorithm::Sha256,
            attributes: None,
            signature_algorithm: Algorithm::RSA,
            signature: vec![0; 4],
            unsigned: None,
            trailing: vec![],
        }
    }

    pub fn version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }

    pub fn digest_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.digest_algorithm = algorithm;
        self
    }

    pub fn signature_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.signature_algorithm = algorithm;
        self
    }

    pub fn signature(mut self, signature: &[u8]) -> Self {
        self.signature = signature.to_vec();
        self
    }

    pub fn raw_attribute(mut self, attribute: Vec<u8>) -> Self {
        self.attributes.get_or_insert_with(Vec::new).push(attribute);
        self
    }

    pub fn message_digest(self, digest: &[u8]) -> Self {
        self.raw_attribute(enc::attribute(ID_MESSAGE_DIGEST, &enc::octet_string(digest)))
    }

    pub fn content_type(self, content_type: ObjectIdentifier) -> Self {
        self.raw_attribute(enc::attribute(ID_CONTENT_TYPE, &enc::oid(content_type)))
    }

    pub fn signing_certificate_v1(self, hash: &[u8]) -> Self {
        let cert_id = enc::seq(&[&enc::octet_string(hash)]);
        let value = enc::seq(&[&enc::seq(&[&cert_id])]);
        self.raw_attribute(enc::attribute(ID_AA_SIGNING_CERTIFICATE, &value))
    }

    pub fn signing_certificate_v2(self, algorithm: Option<Algorithm>, hash: &[u8]) -> Self {
        let cert_id = match algorithm {
            Some(algorithm) => enc::seq(&[&enc::algorithm(&algorithm), &enc::octet_string(hash)]),
            None => enc::seq(&[&enc::octet_string(hash)]),
        };
        let value = enc::seq(&[&enc::seq(&[&cert_id])]);
        self.raw_attribute(enc::attribute(ID_AA_SIGNING_CERTIFICATE_V2, &value))
    }

    pub fn unsigned_attributes(mut self, content: &[u8]) -> Self {
        self.unsigned = Some(content.to_vec());
        self
    }

    pub fn trailing(mut self, bytes: &[u8]) -> Self {
        self.trailing = bytes.to_vec();
        self
    }

    /// Encoded `[0]` signed attributes element, empty without attributes.
    pub fn signed_attributes(&self) -> Vec<u8> {
        match &self.attributes {
            Some(attributes) => enc::tlv(0xa0, &attributes.concat()),
            None => vec![],
        }
    }

    pub fn build(&self) -> Vec<u8> {
        let sid = enc::seq(&[&tsa_issuer(), &enc::unsigned_int(&[0x10, 0x01])]);
        let unsigned = match &self.unsigned {
            Some(content) => enc::tlv(0xa1, content),
            None => vec![],
        };

        enc::seq(&[
            &enc::small_int(self.version),
            &sid,
            &enc::algorithm(&self.digest_algorithm),
            &self.signed_attributes(),
            &enc::algorithm(&self.signature_algorithm),
            &enc::octet_string(&self.signature),
            &unsigned,
            &self.trailing,
        ])
    }
}

#[derive(Clone, Debug)]
enum Ess {
    None,
    V1,
    V2,
}

/// Builds complete granted replies signed with the fixture RSA TSA key.
#[derive(Clone, Debug)]
pub struct ReplyBuilder {
    digest_algorithms: Vec<Algorithm>,
    content_type: ObjectIdentifier,
    tst_info: Vec<u8>,
    certificates: Vec<Vec<u8>>,
    crls: Option<Vec<u8>>,
    signed_attributes: bool,
    message_digest: Option<Vec<u8>>,
    ess: Ess,
    signer_version: i64,
    signature_algorithm: Algorithm,
    trailing: Vec<u8>,
}

impl ReplyBuilder {
    pub fn new() -> Self {
        let imprint = Algorithm::Sha256.digest(PAYLOAD).unwrap();

        Self {
            digest_algorithms: vec![Algorithm::Sha256],
            content_type: ID_CT_TST_INFO,
            tst_info: tst_info(&Algorithm::Sha256, &imprint, "20261018060945Z"),
            certificates: vec![TSA_DER.to_vec(), CA_DER.to_vec()],
            crls: None,
            signed_attributes: true,
            message_digest: None,
            ess: Ess::V2,
            signer_version: 1,
            signature_algorithm: Algorithm::Sha256WithRSA,
            trailing: vec![],
        }
    }

    pub fn digest_algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.digest_algorithms = algorithms;
        self
    }

    pub fn content_type(mut self, content_type: ObjectIdentifier) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn tst_info(mut self, tst_info: Vec<u8>) -> Self {
        self.tst_info = tst_info;
        self
    }

    /// Certificates in discovery order; an empty list omits the field.
    pub fn certificates(mut self, certificates: Vec<Vec<u8>>) -> Self {
        self.certificates = certificates;
        self
    }

    pub fn crls(mut self, content: Vec<u8>) -> Self {
        self.crls = Some(content);
        self
    }

    pub fn signed_attributes(mut self, present: bool) -> Self {
        self.signed_attributes = present;
        self
    }

    pub fn message_digest(mut self, digest: Vec<u8>) -> Self {
        self.message_digest = Some(digest);
        self
    }

    pub fn ess_v1(mut self) -> Self {
        self.ess = Ess::V1;
        self
    }

    pub fn no_ess(mut self) -> Self {
        self.ess = Ess::None;
        self
    }

    pub fn signer_version(mut self, version: i64) -> Self {
        self.signer_version = version;
        self
    }

    pub fn signature_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.signature_algorithm = algorithm;
        self
    }

    pub fn trailing(mut self, bytes: &[u8]) -> Self {
        self.trailing = bytes.to_vec();
        self
    }

    /// Encoded ContentInfo of the token.
    pub fn token(&self) -> Vec<u8> {
        let signer_digest = Algorithm::Sha256;
        let content_digest = signer_digest.digest(&self.tst_info).unwrap();

        let mut signer = SignerInfoBuilder::new()
            .version(self.signer_version)
            .digest_algorithm(signer_digest.clone())
            .signature_algorithm(self.signature_algorithm.clone());

        let to_sign = if self.signed_attributes {
            signer = signer.content_type(ID_CT_TST_INFO).message_digest(
                self.message_digest.as_deref().unwrap_or(&content_digest[..]),
            );
            signer = match self.ess {
                Ess::None => signer,
                Ess::V1 => signer
                    .signing_certificate_v1(&Algorithm::Sha1.digest(TSA_DER).unwrap()),
                Ess::V2 => signer
                    .signing_certificate_v2(None, &Algorithm::Sha256.digest(TSA_DER).unwrap()),
            };
            signed_attributes_digest(&signer_digest, &signer.signed_attributes()).unwrap()
        } else {
            content_digest
        };

        let key = RsaPrivateKey::from_pkcs8_der(TSA_KEY_DER).unwrap();
        let signature = key
            .sign(signer_digest.new_pkcs1v15sign().unwrap(), &to_sign)
            .unwrap();
        let signer = signer.signature(&signature);

        let digest_algorithms: Vec<Vec<u8>> =
            self.digest_algorithms.iter().map(enc::algorithm).collect();
        let digest_algorithms: Vec<&[u8]> =
            digest_algorithms.iter().map(Vec::as_slice).collect();

        let encap = enc::seq(&[
            &enc::oid(self.content_type),
            &enc::tlv(0xa0, &enc::octet_string(&self.tst_info)),
        ]);
        let certificates = if self.certificates.is_empty() {
            vec![]
        } else {
            enc::tlv(0xa0, &self.certificates.concat())
        };
        let crls = match &self.crls {
            Some(content) => enc::tlv(0xa1, content),
            None => vec![],
        };

        let signed_data = enc::seq(&[
            &enc::small_int(3),
            &enc::set(&digest_algorithms),
            &encap,
            &certificates,
            &crls,
            &enc::set(&[&signer.build()]),
        ]);

        enc::seq(&[&enc::oid(ID_SIGNED_DATA), &enc::tlv(0xa0, &signed_data)])
    }

    /// Encoded TimeStampResp with a granted status.
    pub fn build(&self) -> Vec<u8> {
        let status = enc::seq(&[&enc::small_int(0)]);
        let mut reply = enc::seq(&[&status, &self.token()]);
        reply.extend_from_slice(&self.trailing);
        reply
    }
}
