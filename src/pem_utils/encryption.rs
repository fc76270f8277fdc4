//! Legacy OpenSSL PEM encryption (`Proc-Type: 4,ENCRYPTED` / `DEK-Info`).
//!
//! The key is derived with `EVP_BytesToKey` (MD5, one round, the first eight
//! bytes of the IV as salt) and the payload is encrypted in CBC mode with
//! PKCS#7 padding.

use std::str::FromStr;

use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockCipher, BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit};
use md5::{Digest, Md5};
use rand_core::{OsRng, RngCore};
use tracing::debug;

use super::Block;
use crate::error::{CaError, Result};

pub(crate) const PROC_TYPE: &str = "Proc-Type";
pub(crate) const DEK_INFO: &str = "DEK-Info";
const PROC_TYPE_ENCRYPTED: &str = "4,ENCRYPTED";

/// Symmetric ciphers supported for PEM encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PemCipher {
    Des,
    TripleDes,
    Aes128,
    Aes192,
    Aes256,
}

impl PemCipher {
    const ALL: [PemCipher; 5] = [
        PemCipher::Des,
        PemCipher::TripleDes,
        PemCipher::Aes128,
        PemCipher::Aes192,
        PemCipher::Aes256,
    ];

    /// The cipher name used in the `DEK-Info` header.
    pub fn dek_name(self) -> &'static str {
        match self {
            PemCipher::Des => "DES-CBC",
            PemCipher::TripleDes => "DES-EDE3-CBC",
            PemCipher::Aes128 => "AES-128-CBC",
            PemCipher::Aes192 => "AES-192-CBC",
            PemCipher::Aes256 => "AES-256-CBC",
        }
    }

    fn from_dek_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.dek_name() == name)
    }

    fn key_len(self) -> usize {
        match self {
            PemCipher::Des => 8,
            PemCipher::TripleDes => 24,
            PemCipher::Aes128 => 16,
            PemCipher::Aes192 => 24,
            PemCipher::Aes256 => 32,
        }
    }

    fn block_len(self) -> usize {
        match self {
            PemCipher::Des | PemCipher::TripleDes => 8,
            PemCipher::Aes128 | PemCipher::Aes192 | PemCipher::Aes256 => 16,
        }
    }

    fn encrypt(self, key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        match self {
            PemCipher::Des => cbc_encrypt::<des::Des>(key, iv, data),
            PemCipher::TripleDes => cbc_encrypt::<des::TdesEde3>(key, iv, data),
            PemCipher::Aes128 => cbc_encrypt::<aes::Aes128>(key, iv, data),
            PemCipher::Aes192 => cbc_encrypt::<aes::Aes192>(key, iv, data),
            PemCipher::Aes256 => cbc_encrypt::<aes::Aes256>(key, iv, data),
        }
    }

    fn decrypt(self, key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        match self {
            PemCipher::Des => cbc_decrypt::<des::Des>(key, iv, data),
            PemCipher::TripleDes => cbc_decrypt::<des::TdesEde3>(key, iv, data),
            PemCipher::Aes128 => cbc_decrypt::<aes::Aes128>(key, iv, data),
            PemCipher::Aes192 => cbc_decrypt::<aes::Aes192>(key, iv, data),
            PemCipher::Aes256 => cbc_decrypt::<aes::Aes256>(key, iv, data),
        }
    }
}

impl FromStr for PemCipher {
    type Err = CaError;

    /// Parses the short cipher names `des`, `3des`, `aes128`, `aes192` and `aes256`.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "des" => Ok(PemCipher::Des),
            "3des" => Ok(PemCipher::TripleDes),
            "aes128" => Ok(PemCipher::Aes128),
            "aes192" => Ok(PemCipher::Aes192),
            "aes256" => Ok(PemCipher::Aes256),
            _ => Err(CaError::InvalidInput(format!("unsupported cipher {s:?}"))),
        }
    }
}

fn cbc_encrypt<C>(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>>
where
    C: BlockEncryptMut + BlockCipher + KeyInit,
{
    let encryptor = cbc::Encryptor::<C>::new_from_slices(key, iv)
        .map_err(|e| CaError::EncodingError(e.to_string()))?;
    Ok(encryptor.encrypt_padded_vec_mut::<Pkcs7>(data))
}

fn cbc_decrypt<C>(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>>
where
    C: BlockDecryptMut + BlockCipher + KeyInit,
{
    let decryptor = cbc::Decryptor::<C>::new_from_slices(key, iv)
        .map_err(|e| CaError::DecodingError(e.to_string()))?;
    decryptor
        .decrypt_padded_vec_mut::<Pkcs7>(data)
        .map_err(|_| CaError::DecodingError("incorrect passphrase".to_string()))
}

/// OpenSSL `EVP_BytesToKey` with MD5 and a single iteration.
fn derive_key(passphrase: &[u8], salt: &[u8], len: usize) -> Vec<u8> {
    let mut key = Vec::with_capacity(len + 16);
    let mut prev: Vec<u8> = Vec::new();
    while key.len() < len {
        let mut hasher = Md5::new();
        hasher.update(&prev);
        hasher.update(passphrase);
        hasher.update(salt);
        prev = hasher.finalize().to_vec();
        key.extend_from_slice(&prev);
    }
    key.truncate(len);
    key
}

/// Encrypts the payload of `block`, returning a block with the same tag and
/// the `Proc-Type` and `DEK-Info` headers set.
pub fn encrypt(block: &Block, passphrase: &[u8], cipher: PemCipher) -> Result<Block> {
    let mut iv = vec![0u8; cipher.block_len()];
    OsRng
        .try_fill_bytes(&mut iv)
        .map_err(|e| CaError::EncodingError(format!("cannot generate IV: {e}")))?;
    let key = derive_key(passphrase, &iv[..8], cipher.key_len());
    let contents = cipher.encrypt(&key, &iv, &block.contents)?;
    debug!(tag = %block.tag, cipher = cipher.dek_name(), "encrypted PEM block");

    let mut headers = vec![
        (PROC_TYPE.to_string(), PROC_TYPE_ENCRYPTED.to_string()),
        (
            DEK_INFO.to_string(),
            format!("{},{}", cipher.dek_name(), hex::encode_upper(&iv)),
        ),
    ];
    headers.extend(
        block
            .headers
            .iter()
            .filter(|(k, _)| k != PROC_TYPE && k != DEK_INFO)
            .cloned(),
    );
    Ok(Block {
        tag: block.tag.clone(),
        headers,
        contents,
    })
}

/// Decrypts the payload of an encrypted `block`.
pub fn decrypt(block: &Block, passphrase: &[u8]) -> Result<Vec<u8>> {
    let dek = block
        .header(DEK_INFO)
        .ok_or_else(|| CaError::DecodingError("no DEK-Info header in block".to_string()))?;
    let (name, hex_iv) = dek
        .split_once(',')
        .ok_or_else(|| CaError::DecodingError(format!("malformed DEK-Info header {dek:?}")))?;
    let cipher = PemCipher::from_dek_name(name.trim())
        .ok_or_else(|| CaError::DecodingError(format!("unknown encryption mode {name:?}")))?;
    let iv = hex::decode(hex_iv.trim())
        .map_err(|e| CaError::DecodingError(format!("malformed IV: {e}")))?;
    if iv.len() != cipher.block_len() {
        return Err(CaError::DecodingError(
            "incorrect IV size in DEK-Info header".to_string(),
        ));
    }
    if block.contents.is_empty() || block.contents.len() % cipher.block_len() != 0 {
        return Err(CaError::DecodingError(
            "encrypted PEM data is not a multiple of the block size".to_string(),
        ));
    }
    let key = derive_key(passphrase, &iv[..8], cipher.key_len());
    let plaintext = cipher.decrypt(&key, &iv, &block.contents)?;
    debug!(tag = %block.tag, cipher = cipher.dek_name(), "decrypted PEM block");
    Ok(plaintext)
}
