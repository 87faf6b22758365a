//! Decoder and verifier for RFC 3161 time-stamp replies.
//!
//! [`parse`] walks a DER `TimeStampResp`, decodes the status, the TSTInfo,
//! the TSA certificates and the CMS SignerInfo, and checks the signature
//! before handing anything back. Decoded fields borrow the input buffer.
//!
//! ```no_run
//! let reply = std::fs::read("reply.tsr").unwrap();
//! let parsed = tspverify::parse(&reply).unwrap();
//! if let Some(tst_info) = &parsed.tst_info {
//!     println!("stamped at {}", tst_info.signed_time);
//! }
//! ```

use algorithm::Algorithm;
use cert::CertificateChain;
use der_cursor::DerCursor;
use errors::{TsError, TsErrorKind};
use signed_data::TimeStampToken;
use signer_info::SignerInfo;
use status::PkiStatusInfo;
use tstinfo::{PayloadDigester, TstInfo};

pub mod algorithm;
pub mod cert;
pub mod der_cursor;
pub mod errors;
pub mod signed_data;
pub mod signer_info;
pub mod status;
pub mod tstinfo;
pub mod utils;
pub use der;

#[cfg(test)]
mod testutil;

/// Decoded and verified time-stamp reply.
///
/// A reply whose status carries no token has `tst_info` and `signer_info`
/// set to `None` and an empty certificate chain.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TsReply<'a> {
    pub status: PkiStatusInfo,
    pub tst_info: Option<TstInfo<'a>>,
    pub signer_info: Option<SignerInfo<'a>>,
    pub certificate_chain: CertificateChain<'a>,
    /// Digest algorithm of the token SignedData.
    pub digest_algorithm: Option<Algorithm>,
    /// Whether the ESS signing-certificate hash matched a certificate.
    pub signing_certificate_matched: Option<bool>,
}

impl<'a> TsReply<'a> {
    fn without_token(status: PkiStatusInfo) -> Self {
        Self {
            status,
            tst_info: None,
            signer_info: None,
            certificate_chain: CertificateChain::new(),
            digest_algorithm: None,
            signing_certificate_matched: None,
        }
    }

    fn from_token(status: PkiStatusInfo, token: TimeStampToken<'a>) -> Self {
        Self {
            status,
            tst_info: Some(token.tst_info),
            signer_info: Some(token.signer_info),
            certificate_chain: token.certificate_chain,
            digest_algorithm: Some(token.digest_algorithm),
            signing_certificate_matched: token.signing_certificate_matched,
        }
    }

    pub fn is_granted(self: &Self) -> bool {
        self.status.is_granted() && self.tst_info.is_some()
    }

    /// Checks that `payload` is the data this reply stamped.
    pub fn verify_payload(self: &Self, payload: &[u8]) -> Result<(), TsError> {
        self.token_info()?.verify_payload(payload)
    }

    /// Incremental form of [`TsReply::verify_payload`].
    pub fn payload_digester(self: &Self) -> Result<PayloadDigester<'a>, TsError> {
        self.token_info()?.payload_digester()
    }

    fn token_info(self: &Self) -> Result<&TstInfo<'a>, TsError> {
        self.tst_info.as_ref().ok_or_else(|| {
            TsError::new(
                TsErrorKind::PayloadMismatch,
                format!("reply with status {} carries no time-stamp token", self.status),
            )
        })
    }
}

/// Reply decoding options.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ReplyParser {
    strict_signer_match: bool,
    minimum_digest: Option<Algorithm>,
}

impl ReplyParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail with `SignerCertificateNotFound` when an ESS signing-certificate
    /// hash matches none of the certificates, instead of verifying with the
    /// first one.
    pub fn set_strict_signer_match(self: &mut Self, strict: bool) -> &mut Self {
        self.strict_signer_match = strict;
        self
    }

    /// Reject tokens whose message imprint or SignedData digest is shorter
    /// than `algorithm`.
    pub fn set_minimum_digest(self: &mut Self, algorithm: Algorithm) -> &mut Self {
        self.minimum_digest = Some(algorithm);
        self
    }

    pub fn parse<'a>(self: &Self, buf: &'a [u8]) -> Result<TsReply<'a>, TsError> {
        let mut input = DerCursor::new(buf);
        let mut resp = input.read_sequence()?;
        input.finish("input")?;

        let status = PkiStatusInfo::parse(&mut resp)?;
        if resp.is_empty() {
            log::debug!("reply without a token, status {}", status);
            return Ok(TsReply::without_token(status));
        }

        let token = TimeStampToken::parse(&mut resp, self.strict_signer_match)?;
        resp.finish("TimeStampResp")?;

        self.check_minimum_digest("message imprint", &token.tst_info.digest_algorithm)?;
        self.check_minimum_digest("SignedData digest", &token.digest_algorithm)?;

        token.verify_signature()?;

        Ok(TsReply::from_token(status, token))
    }

    fn check_minimum_digest(self: &Self, what: &str, algorithm: &Algorithm) -> Result<(), TsError> {
        let minimum = match &self.minimum_digest {
            Some(minimum) => minimum,
            None => return Ok(()),
        };

        match (algorithm.digest_len(), minimum.digest_len()) {
            (Some(len), Some(required)) if len >= required => Ok(()),
            (_, None) => Ok(()),
            _ => Err(TsError::new(
                TsErrorKind::WeakAlgorithm,
                format!("{} uses {}, at least {} is required", what, algorithm, minimum),
            )),
        }
    }
}

/// Decodes and verifies `buf` with default options.
pub fn parse(buf: &[u8]) -> Result<TsReply<'_>, TsError> {
    ReplyParser::new().parse(buf)
}
