use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TsErrorKind {
    /// Buffer shorter than a declared length.
    Truncated,

    /// Structural tag mismatch.
    UnexpectedTag,

    /// Field present but semantically invalid.
    Malformed,

    /// SignerInfo version other than 1.
    UnsupportedSignerForm,

    /// Message-digest attribute does not match the stamped content.
    DigestMismatch,

    /// Cryptographic signature verification failed.
    SignatureInvalid,

    /// Algorithm required for verification is not supported.
    UnknownAlgorithm,

    /// No certificate available to verify the signature with.
    SignerCertificateNotFound,

    /// Invalid Public Key.
    InvalidPublicKey,

    /// Digest weaker than the configured minimum.
    WeakAlgorithm,

    /// Payload does not match the stamped message imprint.
    PayloadMismatch,
}

#[derive(Debug)]
pub struct TsError {
    pub kind: TsErrorKind,
    pub message: String,
}

impl TsError {
    pub fn new<S: Into<String>>(kind: TsErrorKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(self: &Self) -> TsErrorKind {
        self.kind
    }
}

impl fmt::Display for TsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{:?}", self.kind)
        } else {
            write!(f, "{:?}: {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for TsError {}

pub trait TsResult<T> {
    fn map_app_err(self: Self, kind: TsErrorKind) -> Result<T, TsError>;
}

impl<T, E> TsResult<T> for std::result::Result<T, E>
where
    E: fmt::Display,
{
    fn map_app_err(self: Self, kind: TsErrorKind) -> Result<T, TsError> {
        self.map_err(|err| TsError {
            kind: kind,
            message: err.to_string(),
        })
    }
}
