//! Reading and writing single PEM blocks, optionally passphrase-encrypted.

pub mod encryption;

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use tracing::debug;

pub use encryption::PemCipher;

use crate::error::{CaError, Result};
use crate::passphrase::PassphraseSource;

/// PEM type tag of an X.509 certificate.
pub const CERTIFICATE_TAG: &str = "CERTIFICATE";
/// PEM type tag of a PKCS#10 certificate signing request.
pub const CERTIFICATE_REQUEST_TAG: &str = "CERTIFICATE REQUEST";
/// PEM type tag of a PKCS#1 RSA private key.
pub const RSA_PRIVATE_KEY_TAG: &str = "RSA PRIVATE KEY";
/// PEM type tag of a SEC1 elliptic curve private key.
pub const EC_PRIVATE_KEY_TAG: &str = "EC PRIVATE KEY";
/// PEM type tag of a PKCS#8 private key. Accepted on read only.
pub const PRIVATE_KEY_TAG: &str = "PRIVATE KEY";

/// A decoded PEM block: type tag, RFC 1421 headers and payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub tag: String,
    /// Headers in the order they appear in the encoding.
    pub headers: Vec<(String, String)>,
    pub contents: Vec<u8>,
}

impl Block {
    /// Creates a block without headers.
    pub fn new(tag: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            tag: tag.into(),
            headers: Vec::new(),
            contents: contents.into(),
        }
    }

    /// Returns the value of the first header named `key`.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Reports whether the block carries legacy PEM encryption parameters.
    pub fn is_encrypted(&self) -> bool {
        self.header(encryption::DEK_INFO).is_some()
    }

    fn to_pem(&self) -> Result<::pem::Pem> {
        let mut pem = ::pem::Pem::new(self.tag.clone(), self.contents.clone());
        for (key, value) in &self.headers {
            pem.headers_mut()
                .add(key, value)
                .map_err(|e| CaError::EncodingError(format!("invalid PEM header {key:?}: {e}")))?;
        }
        Ok(pem)
    }

    /// Encodes the block as PEM text with LF line endings.
    pub fn to_pem_string(&self) -> Result<String> {
        let config = ::pem::EncodeConfig::new().set_line_ending(::pem::LineEnding::LF);
        Ok(::pem::encode_config(&self.to_pem()?, config))
    }
}

impl From<::pem::Pem> for Block {
    fn from(pem: ::pem::Pem) -> Self {
        let headers = pem
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            tag: pem.tag().to_string(),
            headers,
            contents: pem.into_contents(),
        }
    }
}

/// Reads every byte from `reader` and decodes the first PEM block found.
///
/// The block's type tag is not checked.
pub fn read_pem<R: Read>(mut reader: R) -> Result<Block> {
    let mut buf = Vec::new();
    reader
        .read_to_end(&mut buf)
        .map_err(|e| CaError::IoError(e.to_string()))?;
    let pem = ::pem::parse(&buf)
        .map_err(|e| CaError::DecodingError(format!("invalid PEM data: {e}")))?;
    Ok(Block::from(pem))
}

/// Reads a PEM block and decrypts it if it is encrypted.
///
/// `source` is only consulted when the block carries a `DEK-Info` header.
/// The returned block keeps its tag, holds the plaintext and has the
/// encryption headers removed.
pub fn read_encrypted_pem<R: Read>(reader: R, source: &dyn PassphraseSource) -> Result<Block> {
    let mut block = read_pem(reader)?;
    if !block.is_encrypted() {
        return Ok(block);
    }
    debug!(tag = %block.tag, "fetching passphrase to decrypt PEM block");
    let passphrase = source.passphrase()?;
    block.contents = encryption::decrypt(&block, &passphrase)
        .map_err(|e| e.context("cannot decode block"))?;
    block
        .headers
        .retain(|(k, _)| k != encryption::PROC_TYPE && k != encryption::DEK_INFO);
    Ok(block)
}

/// Reads the first PEM block of the file at `path`.
pub fn read_pem_file(path: impl AsRef<Path>) -> Result<Block> {
    let path = path.as_ref();
    let file = open(path)?;
    read_pem(file)
}

/// Reads the first PEM block of the file at `path`, decrypting if needed.
pub fn read_encrypted_pem_file(
    path: impl AsRef<Path>,
    source: &dyn PassphraseSource,
) -> Result<Block> {
    let path = path.as_ref();
    let file = open(path)?;
    read_encrypted_pem(file, source)
}

pub(crate) fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| CaError::IoError(format!("cannot open {}: {e}", path.display())))
}

/// Writes `block` in PEM text form.
pub fn write_pem<W: Write>(mut writer: W, block: &Block) -> Result<()> {
    writer
        .write_all(block.to_pem_string()?.as_bytes())
        .map_err(|e| CaError::IoError(e.to_string()))
}

/// Writes `block`, encrypting it with `cipher` when a passphrase is given.
///
/// No passphrase is requested when `cipher` is `None` or `source` is `None`.
/// An empty passphrase writes the block unencrypted.
pub fn write_encrypted_pem<W: Write>(
    writer: W,
    block: &Block,
    source: Option<&dyn PassphraseSource>,
    cipher: Option<PemCipher>,
) -> Result<()> {
    let (Some(cipher), Some(source)) = (cipher, source) else {
        return write_pem(writer, block);
    };
    debug!(tag = %block.tag, "fetching passphrase to encrypt PEM block");
    let passphrase = source.passphrase()?;
    if passphrase.is_empty() {
        return write_pem(writer, block);
    }
    let encrypted = encryption::encrypt(block, &passphrase, cipher)
        .map_err(|e| e.context("cannot encrypt block"))?;
    write_pem(writer, &encrypted)
}
