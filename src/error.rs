use core::fmt;

/// Errors surfaced by the [`Session`](crate::Session) interface.
///
/// After any of these is returned the session is closed and every further
/// call fails with [`Error::InvalidSequence`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// Nonces must be between 1 and 15 bytes.
    InvalidNonceLength,

    /// Tags must be between 8 and 16 bytes.
    InvalidTagLength,

    /// The operation is not permitted in the session's current phase,
    /// e.g. absorbing associated data after message bytes were fed, or
    /// mixing encryption and decryption within one session.
    InvalidSequence,

    /// `digest`/`verify` was called while message bytes were still
    /// buffered; the stream must be finalized first.
    PendingData,

    /// The authentication tag did not match. Any plaintext already
    /// produced by this session must be discarded.
    MacMismatch,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidNonceLength => f.write_str("nonce must be 1..=15 bytes"),
            Error::InvalidTagLength => f.write_str("tag length must be 8..=16 bytes"),
            Error::InvalidSequence => f.write_str("operation not permitted in the current phase"),
            Error::PendingData => f.write_str("message bytes still buffered; finalize the stream"),
            Error::MacMismatch => f.write_str("authentication tag mismatch"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

impl From<Error> for aead::Error {
    fn from(_: Error) -> aead::Error {
        aead::Error
    }
}
