//! Passphrase sources used to encrypt and decrypt private keys.
//!
//! The codec only ever asks a [`PassphraseSource`] for a passphrase when one
//! is actually needed, so an interactive source is never prompted for a
//! plaintext key.

use crate::error::Result;

/// Supplies the passphrase for a single encrypt or decrypt operation.
///
/// Implementations may block (for example while waiting for terminal input).
/// The codec calls [`PassphraseSource::passphrase`] at most once per
/// operation and may not call it at all. An empty passphrase means "no
/// passphrase".
pub trait PassphraseSource {
    fn passphrase(&self) -> Result<Vec<u8>>;
}

/// A source that always returns the same passphrase.
#[derive(Clone, Default)]
pub struct ConstPassphrase {
    passphrase: Vec<u8>,
}

impl ConstPassphrase {
    pub fn new(passphrase: impl Into<Vec<u8>>) -> Self {
        Self {
            passphrase: passphrase.into(),
        }
    }
}

impl std::fmt::Debug for ConstPassphrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstPassphrase").finish_non_exhaustive()
    }
}

impl PassphraseSource for ConstPassphrase {
    fn passphrase(&self) -> Result<Vec<u8>> {
        Ok(self.passphrase.clone())
    }
}

/// A source for callers that never want encryption, e.g. a `-nopass` flag.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPassphrase;

impl PassphraseSource for NoPassphrase {
    fn passphrase(&self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

impl<F> PassphraseSource for F
where
    F: Fn() -> Result<Vec<u8>>,
{
    fn passphrase(&self) -> Result<Vec<u8>> {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CaError;

    #[test]
    fn test_const_passphrase() {
        let source = ConstPassphrase::new("hunter2");
        assert_eq!(source.passphrase().unwrap(), b"hunter2".to_vec());
        assert!(!format!("{source:?}").contains("hunter2"));
    }

    #[test]
    fn test_closure_source() {
        let source = || -> Result<Vec<u8>> {
            Err(CaError::PassphraseError("cannot read passphrase".to_string()))
        };
        assert!(matches!(
            source.passphrase(),
            Err(CaError::PassphraseError(_))
        ));
    }
}
