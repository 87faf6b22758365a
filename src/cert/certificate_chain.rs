use crate::{
    algorithm::Algorithm,
    der_cursor::DerCursor,
    errors::{TsError, TsErrorKind},
    utils::to_hex_str,
};

use super::Certificate;

/// Certificates carried by a time-stamp token.
///
/// Certificates are kept in discovery order. One of them is the head: the
/// certificate the signature is checked against. It starts as the first
/// certificate and moves to the one named by an ESS signing-certificate hash
/// when that hash matches. Logical order is the head followed by the others
/// in discovery order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CertificateChain<'a> {
    certs: Vec<Certificate<'a>>,
    head: usize,
}

impl<'a> CertificateChain<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes every certificate in the content of a `CertificateSet`.
    pub fn collect(mut cursor: DerCursor<'a>) -> Result<Self, TsError> {
        let mut certs = vec![];
        while !cursor.is_empty() {
            let cert = Certificate::parse(&mut cursor)?;
            log::debug!("certificate {}: {}", certs.len(), cert.subject);
            certs.push(cert);
        }

        Ok(Self { certs, head: 0 })
    }

    /// Moves the first certificate whose `algorithm` digest equals `hash` to
    /// the head. Returns whether a certificate matched.
    pub fn promote_signing_certificate(
        self: &mut Self,
        algorithm: &Algorithm,
        hash: &[u8],
    ) -> Result<bool, TsError> {
        match algorithm.digest_len() {
            Some(len) if len != hash.len() => {
                return Err(TsError::new(
                    TsErrorKind::Malformed,
                    format!(
                        "{} certificate hash has {} bytes, expected {}",
                        algorithm,
                        hash.len(),
                        len
                    ),
                ));
            }
            None => {
                return Err(TsError::new(
                    TsErrorKind::UnknownAlgorithm,
                    format!("certificate hash algorithm {}", algorithm),
                ));
            }
            _ => {}
        }

        for (index, cert) in self.certs.iter().enumerate() {
            if algorithm.digest(cert.der_bytes())? == hash {
                log::debug!("signing certificate is {}: {}", index, cert.subject);
                self.head = index;
                return Ok(true);
            }
        }

        log::debug!("no certificate matches {} {}", algorithm, to_hex_str(hash));
        Ok(false)
    }

    /// Certificate the signature is verified with.
    pub fn head(self: &Self) -> Option<&Certificate<'a>> {
        self.certs.get(self.head)
    }

    pub fn len(self: &Self) -> usize {
        self.certs.len()
    }

    pub fn is_empty(self: &Self) -> bool {
        self.certs.is_empty()
    }

    /// Certificates in logical order, head first.
    pub fn iter<'c>(self: &'c Self) -> ChainIter<'c, 'a> {
        ChainIter {
            chain: self,
            step: 0,
        }
    }

    /// Certificates in the order they appeared in the reply.
    pub fn discovery_order(self: &Self) -> &[Certificate<'a>] {
        &self.certs
    }
}

impl<'c, 'a> IntoIterator for &'c CertificateChain<'a> {
    type Item = &'c Certificate<'a>;
    type IntoIter = ChainIter<'c, 'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct ChainIter<'c, 'a> {
    chain: &'c CertificateChain<'a>,
    step: usize,
}

impl<'c, 'a> Iterator for ChainIter<'c, 'a> {
    type Item = &'c Certificate<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let head = self.chain.head;
        let index = match self.step {
            0 => head,
            step if step <= head => step - 1,
            step => step,
        };
        self.step += 1;
        self.chain.certs.get(index)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.chain.certs.len().saturating_sub(self.step);
        (left, Some(left))
    }
}
