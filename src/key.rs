//! Key generation, PEM import/export and the [`Signer`] capability.

use std::fmt;
use std::io::{Read, Write};
use std::path::Path;
use std::str::FromStr;

use const_oid::ObjectIdentifier;
use const_oid::db::rfc5912::{
    ID_EC_PUBLIC_KEY, RSA_ENCRYPTION, SECP_224_R_1, SECP_256_R_1, SECP_384_R_1, SECP_521_R_1,
};
use der::{Decode, Encode};
use pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey};
use rand_core::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::signature::{SignatureEncoding, Signer as _, Verifier as _};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use tracing::{debug, info};
use x509_cert::spki::SubjectPublicKeyInfoOwned;

use crate::cert::SignatureAlgorithm;
use crate::error::{CaError, Result};
use crate::passphrase::PassphraseSource;
use crate::pem_utils::{
    self, Block, EC_PRIVATE_KEY_TAG, PRIVATE_KEY_TAG, PemCipher, RSA_PRIVATE_KEY_TAG,
};

/// Named curves available for ECDSA keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcCurve {
    P224,
    P256,
    P384,
    P521,
}

impl EcCurve {
    /// The curve's short name, as accepted by [`str::parse`].
    pub fn name(self) -> &'static str {
        match self {
            EcCurve::P224 => "p224",
            EcCurve::P256 => "p256",
            EcCurve::P384 => "p384",
            EcCurve::P521 => "p521",
        }
    }

    fn oid(self) -> ObjectIdentifier {
        match self {
            EcCurve::P224 => SECP_224_R_1,
            EcCurve::P256 => SECP_256_R_1,
            EcCurve::P384 => SECP_384_R_1,
            EcCurve::P521 => SECP_521_R_1,
        }
    }

    fn from_oid(oid: ObjectIdentifier) -> Result<Self> {
        [EcCurve::P224, EcCurve::P256, EcCurve::P384, EcCurve::P521]
            .into_iter()
            .find(|curve| curve.oid() == oid)
            .ok_or_else(|| CaError::DecodingError(format!("unsupported elliptic curve {oid}")))
    }
}

impl FromStr for EcCurve {
    type Err = CaError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "p224" => Ok(EcCurve::P224),
            "p256" => Ok(EcCurve::P256),
            "p384" => Ok(EcCurve::P384),
            "p521" => Ok(EcCurve::P521),
            _ => Err(CaError::InvalidInput(format!("unsupported curve {s:?}"))),
        }
    }
}

impl fmt::Display for EcCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The kind of key to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Rsa { bits: usize },
    Ecdsa(EcCurve),
}

/// Capability of an asymmetric private key to sign certificates and requests.
pub trait Signer {
    /// The public half of the key.
    fn public_key(&self) -> PublicKey;

    /// The algorithm [`Signer::sign`] produces signatures for.
    fn signature_algorithm(&self) -> SignatureAlgorithm;

    /// Signs `msg`, returning the signature in its X.509 encoding (a DER
    /// `Ecdsa-Sig-Value` for ECDSA, the raw PKCS#1 v1.5 signature for RSA).
    fn sign(&self, msg: &[u8]) -> Result<Vec<u8>>;
}

/// Supported private keys.
#[derive(Clone)]
pub enum KeyPair {
    Rsa(Box<RsaPrivateKey>),
    EcdsaP224(p224::SecretKey),
    EcdsaP256(p256::SecretKey),
    EcdsaP384(p384::SecretKey),
    EcdsaP521(p521::SecretKey),
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPair::Rsa(private) => write!(f, "KeyPair::Rsa({} bits)", private.size() * 8),
            KeyPair::EcdsaP224(_) => f.write_str("KeyPair::EcdsaP224"),
            KeyPair::EcdsaP256(_) => f.write_str("KeyPair::EcdsaP256"),
            KeyPair::EcdsaP384(_) => f.write_str("KeyPair::EcdsaP384"),
            KeyPair::EcdsaP521(_) => f.write_str("KeyPair::EcdsaP521"),
        }
    }
}

impl KeyPair {
    /// Generates a new key of the requested kind from the OS random source.
    pub fn generate(key_type: KeyType) -> Result<Self> {
        match key_type {
            KeyType::Rsa { bits } => Self::generate_rsa(bits),
            KeyType::Ecdsa(curve) => Ok(Self::generate_ecdsa(curve)),
        }
    }

    /// Generate an RSA key pair with the specified number of bits.
    pub fn generate_rsa(bits: usize) -> Result<Self> {
        let mut rng = OsRng;
        let private = RsaPrivateKey::new(&mut rng, bits).map_err(|e| {
            CaError::KeyGenerationError(format!("cannot generate {bits}-bit RSA key: {e}"))
        })?;
        info!(bits, "generated RSA key");
        Ok(KeyPair::Rsa(Box::new(private)))
    }

    /// Generate an ECDSA key pair on the given curve.
    pub fn generate_ecdsa(curve: EcCurve) -> Self {
        let mut rng = OsRng;
        let key = match curve {
            EcCurve::P224 => KeyPair::EcdsaP224(p224::SecretKey::random(&mut rng)),
            EcCurve::P256 => KeyPair::EcdsaP256(p256::SecretKey::random(&mut rng)),
            EcCurve::P384 => KeyPair::EcdsaP384(p384::SecretKey::random(&mut rng)),
            EcCurve::P521 => KeyPair::EcdsaP521(p521::SecretKey::random(&mut rng)),
        };
        info!(%curve, "generated ECDSA key");
        key
    }
}

impl Signer for KeyPair {
    fn public_key(&self) -> PublicKey {
        match self {
            KeyPair::Rsa(private) => PublicKey::Rsa(RsaPublicKey::from(private.as_ref())),
            KeyPair::EcdsaP224(secret) => PublicKey::EcdsaP224(secret.public_key()),
            KeyPair::EcdsaP256(secret) => PublicKey::EcdsaP256(secret.public_key()),
            KeyPair::EcdsaP384(secret) => PublicKey::EcdsaP384(secret.public_key()),
            KeyPair::EcdsaP521(secret) => PublicKey::EcdsaP521(secret.public_key()),
        }
    }

    fn signature_algorithm(&self) -> SignatureAlgorithm {
        match self {
            KeyPair::Rsa(_) => SignatureAlgorithm::Sha256WithRSA,
            KeyPair::EcdsaP224(_) => SignatureAlgorithm::Sha224WithECDSA,
            KeyPair::EcdsaP256(_) => SignatureAlgorithm::Sha256WithECDSA,
            KeyPair::EcdsaP384(_) => SignatureAlgorithm::Sha384WithECDSA,
            KeyPair::EcdsaP521(_) => SignatureAlgorithm::Sha512WithECDSA,
        }
    }

    fn sign(&self, msg: &[u8]) -> Result<Vec<u8>> {
        let failed = |e: rsa::signature::Error| CaError::SigningError(e.to_string());
        match self {
            KeyPair::Rsa(private) => {
                let signing_key =
                    rsa::pkcs1v15::SigningKey::<Sha256>::new(private.as_ref().clone());
                Ok(signing_key.try_sign(msg).map_err(failed)?.to_vec())
            }
            KeyPair::EcdsaP224(secret) => {
                let signing_key =
                    p224::ecdsa::SigningKey::from_bytes(&secret.to_bytes()).map_err(failed)?;
                let signature: p224::ecdsa::Signature = signing_key.try_sign(msg).map_err(failed)?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
            KeyPair::EcdsaP256(secret) => {
                let signing_key =
                    p256::ecdsa::SigningKey::from_bytes(&secret.to_bytes()).map_err(failed)?;
                let signature: p256::ecdsa::Signature = signing_key.try_sign(msg).map_err(failed)?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
            KeyPair::EcdsaP384(secret) => {
                let signing_key =
                    p384::ecdsa::SigningKey::from_bytes(&secret.to_bytes()).map_err(failed)?;
                let signature: p384::ecdsa::Signature = signing_key.try_sign(msg).map_err(failed)?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
            KeyPair::EcdsaP521(secret) => {
                let signing_key =
                    p521::ecdsa::SigningKey::from_bytes(&secret.to_bytes()).map_err(failed)?;
                let signature: p521::ecdsa::Signature = signing_key.try_sign(msg).map_err(failed)?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
        }
    }
}

/// Public keys of the supported key types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PublicKey {
    Rsa(RsaPublicKey),
    EcdsaP224(p224::PublicKey),
    EcdsaP256(p256::PublicKey),
    EcdsaP384(p384::PublicKey),
    EcdsaP521(p521::PublicKey),
}

impl PublicKey {
    /// Decodes a SubjectPublicKeyInfo into a supported public key.
    pub fn from_x509spki(spki: &SubjectPublicKeyInfoOwned) -> Result<Self> {
        let der = spki.to_der()?;
        let invalid =
            |e: pkcs8::spki::Error| CaError::DecodingError(format!("invalid public key: {e}"));
        match spki.algorithm.oid {
            RSA_ENCRYPTION => Ok(PublicKey::Rsa(
                RsaPublicKey::from_public_key_der(&der).map_err(invalid)?,
            )),
            ID_EC_PUBLIC_KEY => {
                let curve_oid = spki
                    .algorithm
                    .parameters
                    .as_ref()
                    .ok_or_else(|| {
                        CaError::DecodingError("EC public key without curve".to_string())
                    })?
                    .decode_as::<ObjectIdentifier>()?;
                Ok(match EcCurve::from_oid(curve_oid)? {
                    EcCurve::P224 => PublicKey::EcdsaP224(
                        p224::PublicKey::from_public_key_der(&der).map_err(invalid)?,
                    ),
                    EcCurve::P256 => PublicKey::EcdsaP256(
                        p256::PublicKey::from_public_key_der(&der).map_err(invalid)?,
                    ),
                    EcCurve::P384 => PublicKey::EcdsaP384(
                        p384::PublicKey::from_public_key_der(&der).map_err(invalid)?,
                    ),
                    EcCurve::P521 => PublicKey::EcdsaP521(
                        p521::PublicKey::from_public_key_der(&der).map_err(invalid)?,
                    ),
                })
            }
            other => Err(CaError::DecodingError(format!(
                "unsupported public key algorithm {other}"
            ))),
        }
    }

    /// Encodes the key as a SubjectPublicKeyInfo.
    pub fn to_x509spki(&self) -> Result<SubjectPublicKeyInfoOwned> {
        let doc = match self {
            PublicKey::Rsa(key) => key.to_public_key_der(),
            PublicKey::EcdsaP224(key) => key.to_public_key_der(),
            PublicKey::EcdsaP256(key) => key.to_public_key_der(),
            PublicKey::EcdsaP384(key) => key.to_public_key_der(),
            PublicKey::EcdsaP521(key) => key.to_public_key_der(),
        }
        .map_err(|e| CaError::EncodingError(format!("cannot marshal public key: {e}")))?;
        Ok(SubjectPublicKeyInfoOwned::from_der(doc.as_bytes())?)
    }

    /// Checks that `signature` is a valid signature of `msg` under `algorithm`.
    pub fn verify(
        &self,
        algorithm: &SignatureAlgorithm,
        msg: &[u8],
        signature: &[u8],
    ) -> Result<()> {
        let bad =
            |e: rsa::signature::Error| CaError::InvalidInput(format!("invalid signature: {e}"));
        match (self, algorithm) {
            (PublicKey::Rsa(key), SignatureAlgorithm::Sha256WithRSA) => {
                let verifying_key = rsa::pkcs1v15::VerifyingKey::<Sha256>::new(key.clone());
                let signature = rsa::pkcs1v15::Signature::try_from(signature).map_err(bad)?;
                verifying_key.verify(msg, &signature).map_err(bad)
            }
            (PublicKey::EcdsaP224(key), SignatureAlgorithm::Sha224WithECDSA) => {
                let verifying_key =
                    p224::ecdsa::VerifyingKey::from_sec1_bytes(&key.to_sec1_bytes()).map_err(bad)?;
                let signature = p224::ecdsa::Signature::from_der(signature).map_err(bad)?;
                verifying_key.verify(msg, &signature).map_err(bad)
            }
            (PublicKey::EcdsaP256(key), SignatureAlgorithm::Sha256WithECDSA) => {
                let verifying_key =
                    p256::ecdsa::VerifyingKey::from_sec1_bytes(&key.to_sec1_bytes()).map_err(bad)?;
                let signature = p256::ecdsa::Signature::from_der(signature).map_err(bad)?;
                verifying_key.verify(msg, &signature).map_err(bad)
            }
            (PublicKey::EcdsaP384(key), SignatureAlgorithm::Sha384WithECDSA) => {
                let verifying_key =
                    p384::ecdsa::VerifyingKey::from_sec1_bytes(&key.to_sec1_bytes()).map_err(bad)?;
                let signature = p384::ecdsa::Signature::from_der(signature).map_err(bad)?;
                verifying_key.verify(msg, &signature).map_err(bad)
            }
            (PublicKey::EcdsaP521(key), SignatureAlgorithm::Sha512WithECDSA) => {
                let verifying_key =
                    p521::ecdsa::VerifyingKey::from_sec1_bytes(&key.to_sec1_bytes()).map_err(bad)?;
                let signature = p521::ecdsa::Signature::from_der(signature).map_err(bad)?;
                verifying_key.verify(msg, &signature).map_err(bad)
            }
            (_, algorithm) => Err(CaError::InvalidInput(format!(
                "signature algorithm {algorithm:?} does not match the public key"
            ))),
        }
    }
}

/// Encodes `key` as an `RSA PRIVATE KEY` or `EC PRIVATE KEY` block.
pub fn marshal_key(key: &KeyPair) -> Result<Block> {
    let cannot = |e: String| CaError::EncodingError(format!("cannot marshal key: {e}"));
    match key {
        KeyPair::Rsa(private) => {
            let doc = private.to_pkcs1_der().map_err(|e| cannot(e.to_string()))?;
            Ok(Block::new(RSA_PRIVATE_KEY_TAG, doc.as_bytes()))
        }
        KeyPair::EcdsaP224(secret) => {
            let der = secret.to_sec1_der().map_err(|e| cannot(e.to_string()))?;
            Ok(Block::new(EC_PRIVATE_KEY_TAG, der.as_slice()))
        }
        KeyPair::EcdsaP256(secret) => {
            let der = secret.to_sec1_der().map_err(|e| cannot(e.to_string()))?;
            Ok(Block::new(EC_PRIVATE_KEY_TAG, der.as_slice()))
        }
        KeyPair::EcdsaP384(secret) => {
            let der = secret.to_sec1_der().map_err(|e| cannot(e.to_string()))?;
            Ok(Block::new(EC_PRIVATE_KEY_TAG, der.as_slice()))
        }
        KeyPair::EcdsaP521(secret) => {
            let der = secret.to_sec1_der().map_err(|e| cannot(e.to_string()))?;
            Ok(Block::new(EC_PRIVATE_KEY_TAG, der.as_slice()))
        }
    }
}

/// Decodes a private key block, dispatching on its tag.
pub fn unmarshal_key(block: &Block) -> Result<KeyPair> {
    let key = match block.tag.as_str() {
        EC_PRIVATE_KEY_TAG => parse_sec1(&block.contents),
        RSA_PRIVATE_KEY_TAG => RsaPrivateKey::from_pkcs1_der(&block.contents)
            .map(|private| KeyPair::Rsa(Box::new(private)))
            .map_err(|e| CaError::DecodingError(e.to_string())),
        PRIVATE_KEY_TAG => parse_pkcs8(&block.contents),
        other => {
            return Err(CaError::DecodingError(format!(
                "unsupported key type {other:?}"
            )));
        }
    };
    key.map_err(|e| e.context("invalid key"))
}

// SEC1 keys normally name their curve, but the parameters are optional, so
// each curve is tried in turn. A scalar only fits one field size.
fn parse_sec1(der: &[u8]) -> Result<KeyPair> {
    if let Ok(secret) = p224::SecretKey::from_sec1_der(der) {
        return Ok(KeyPair::EcdsaP224(secret));
    }
    if let Ok(secret) = p256::SecretKey::from_sec1_der(der) {
        return Ok(KeyPair::EcdsaP256(secret));
    }
    if let Ok(secret) = p384::SecretKey::from_sec1_der(der) {
        return Ok(KeyPair::EcdsaP384(secret));
    }
    if let Ok(secret) = p521::SecretKey::from_sec1_der(der) {
        return Ok(KeyPair::EcdsaP521(secret));
    }
    Err(CaError::DecodingError(
        "malformed EC private key or unsupported curve".to_string(),
    ))
}

fn parse_pkcs8(der: &[u8]) -> Result<KeyPair> {
    let invalid = |e: pkcs8::Error| CaError::DecodingError(e.to_string());
    let info = pkcs8::PrivateKeyInfo::try_from(der).map_err(invalid)?;
    match info.algorithm.oid {
        RSA_ENCRYPTION => Ok(KeyPair::Rsa(Box::new(
            RsaPrivateKey::from_pkcs8_der(der).map_err(invalid)?,
        ))),
        ID_EC_PUBLIC_KEY => {
            let curve_oid = info
                .algorithm
                .parameters_oid()
                .map_err(|e| CaError::DecodingError(e.to_string()))?;
            Ok(match EcCurve::from_oid(curve_oid)? {
                EcCurve::P224 => {
                    KeyPair::EcdsaP224(p224::SecretKey::from_pkcs8_der(der).map_err(invalid)?)
                }
                EcCurve::P256 => {
                    KeyPair::EcdsaP256(p256::SecretKey::from_pkcs8_der(der).map_err(invalid)?)
                }
                EcCurve::P384 => {
                    KeyPair::EcdsaP384(p384::SecretKey::from_pkcs8_der(der).map_err(invalid)?)
                }
                EcCurve::P521 => {
                    KeyPair::EcdsaP521(p521::SecretKey::from_pkcs8_der(der).map_err(invalid)?)
                }
            })
        }
        other => Err(CaError::DecodingError(format!(
            "PKCS#8 key with algorithm {other} is not a supported signing key"
        ))),
    }
}

/// Reads a possibly encrypted private key from `reader`.
pub fn read_key<R: Read>(reader: R, source: &dyn PassphraseSource) -> Result<KeyPair> {
    let block = pem_utils::read_encrypted_pem(reader, source)?;
    unmarshal_key(&block)
}

/// Reads a possibly encrypted private key from the file at `path`.
pub fn read_key_file(path: impl AsRef<Path>, source: &dyn PassphraseSource) -> Result<KeyPair> {
    let path = path.as_ref();
    debug!(path = %path.display(), "reading private key");
    let block = pem_utils::read_encrypted_pem_file(path, source)?;
    unmarshal_key(&block).map_err(|e| e.context(path.display()))
}

/// Writes `key` as PEM, encrypted with `cipher` if the source yields a
/// non-empty passphrase.
pub fn write_key<W: Write>(
    writer: W,
    key: &KeyPair,
    source: Option<&dyn PassphraseSource>,
    cipher: Option<PemCipher>,
) -> Result<()> {
    let block = marshal_key(key)?;
    pem_utils::write_encrypted_pem(writer, &block, source, cipher)
}
