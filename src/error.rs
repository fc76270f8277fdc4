//! The error type returned by every fallible operation.

use std::fmt::Display;

use thiserror::Error;

/// Represents errors that can occur in the pemca library.
///
/// Every variant carries a human readable message. Wrapping layers add
/// context with [`CaError::context`] instead of replacing the variant, so a
/// caller can still tell a bad input file from a failed signature.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaError {
    /// Error during data encoding.
    #[error("Failed to encode data: {0}")]
    EncodingError(String),

    /// Malformed or wrong-type PEM/DER input.
    #[error("Failed to decode data: {0}")]
    DecodingError(String),

    /// Error due to invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Error during key generation.
    #[error("Key generation error: {0}")]
    KeyGenerationError(String),

    /// The passphrase source failed to produce a passphrase.
    #[error("Passphrase error: {0}")]
    PassphraseError(String),

    /// The certificate or request could not be created from the template.
    #[error("Signing error: {0}")]
    SigningError(String),

    /// Reading or writing a stream or file failed.
    #[error("I/O error: {0}")]
    IoError(String),
}

impl CaError {
    /// Prefixes the message with `context`, keeping the error kind.
    pub fn context(self, context: impl Display) -> Self {
        match self {
            CaError::EncodingError(msg) => CaError::EncodingError(format!("{context}: {msg}")),
            CaError::DecodingError(msg) => CaError::DecodingError(format!("{context}: {msg}")),
            CaError::InvalidInput(msg) => CaError::InvalidInput(format!("{context}: {msg}")),
            CaError::KeyGenerationError(msg) => {
                CaError::KeyGenerationError(format!("{context}: {msg}"))
            }
            CaError::PassphraseError(msg) => CaError::PassphraseError(format!("{context}: {msg}")),
            CaError::SigningError(msg) => CaError::SigningError(format!("{context}: {msg}")),
            CaError::IoError(msg) => CaError::IoError(format!("{context}: {msg}")),
        }
    }
}

impl From<der::Error> for CaError {
    /// Converts a `der::Error` into a `CaError`.
    fn from(err: der::Error) -> Self {
        CaError::DecodingError(err.to_string())
    }
}

impl From<pem::PemError> for CaError {
    fn from(err: pem::PemError) -> Self {
        CaError::DecodingError(err.to_string())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CaError>;
