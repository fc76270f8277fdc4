//! # pemca - A Small Pure Rust Certificate Authority
//!
//! pemca implements the operations of a minimal certificate authority on top of the
//! RustCrypto crates: generating keys, writing them as (optionally passphrase-encrypted)
//! PEM, producing certificate signing requests, and issuing self-signed and CA-signed
//! X.509 certificates.
//!
//! ## Supported Key Types
//!
//! - **RSA**: any size the `rsa` crate accepts, signed with SHA-256
//! - **ECDSA**: P-224, P-256, P-384 and P-521, signed with SHA-224, SHA-256, SHA-384 and
//!   SHA-512 respectively
//!
//! ## Key Features
//!
//! - **Template defaulting**: random serial numbers and subject key identifiers are filled in
//!   when a template leaves them unset
//! - **Identity merging**: a CA-signed certificate takes its subject and alternative names
//!   from the request wherever the template leaves them empty
//! - **Encrypted keys**: OpenSSL-compatible `Proc-Type`/`DEK-Info` PEM encryption with
//!   DES, 3DES and AES, with the passphrase fetched lazily from a [`passphrase::PassphraseSource`]
//! - **Strict PEM typing**: every reader checks the block's type tag
//!
//! ## Quick Start
//!
//! ### Generating a Self-Signed CA
//!
//! ```rust,no_run
//! use pemca::{
//!     cert::params::{CertificateTemplate, DistinguishedName},
//!     issuer::self_sign_certificate,
//!     key::{EcCurve, KeyPair, write_key},
//!     passphrase::ConstPassphrase,
//!     pem_utils::PemCipher,
//! };
//!
//! # fn main() -> Result<(), pemca::error::CaError> {
//! let key = KeyPair::generate_ecdsa(EcCurve::P256);
//!
//! let template = CertificateTemplate::builder()
//!     .subject(
//!         DistinguishedName::builder()
//!             .common_name("Example CA".to_string())
//!             .organization("Example Corp".to_string())
//!             .build(),
//!     )
//!     .is_ca(true)
//!     .build();
//!
//! let ca = self_sign_certificate(&template, &key)?;
//! println!("{}", ca.to_pem()?);
//!
//! // Write the key encrypted with AES-128.
//! let passphrase = ConstPassphrase::new("correct horse battery staple");
//! write_key(std::io::stdout(), &key, Some(&passphrase), Some(PemCipher::Aes128))?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Signing a Request
//!
//! ```rust,no_run
//! use pemca::{
//!     cert::{
//!         CertificateWithPrivateKey, read_certificate_file, read_certificate_request_file,
//!         params::CertificateTemplate,
//!     },
//!     key::read_key_file,
//!     passphrase::NoPassphrase,
//! };
//!
//! # fn main() -> Result<(), pemca::error::CaError> {
//! let ca = CertificateWithPrivateKey {
//!     cert: read_certificate_file("ca.crt")?,
//!     key: read_key_file("ca.key", &NoPassphrase)?,
//! };
//!
//! let csr = read_certificate_request_file("server.csr")?;
//! csr.check_signature()?;
//!
//! // Subject and names come from the request.
//! let server = ca.issue(&csr, &CertificateTemplate::default())?;
//! println!("{}", server.to_pem()?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Every fallible operation returns a [`error::CaError`]. Each layer adds context to the
//! message without changing the kind of error:
//!
//! ```rust
//! use pemca::{error::CaError, key::read_key, passphrase::NoPassphrase};
//!
//! match read_key(&b"invalid pem data"[..], &NoPassphrase) {
//!     Ok(_) => println!("Key imported successfully"),
//!     Err(CaError::DecodingError(msg)) => println!("Failed to decode key: {}", msg),
//!     Err(e) => println!("Other error: {}", e),
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`key`]: Key generation, PEM import/export, signing and verification
//! - [`cert`]: Parsed certificates and requests and their PEM codecs
//! - [`issuer`]: Certificate and request signing
//! - [`pem_utils`]: PEM blocks and legacy PEM encryption
//! - [`passphrase`]: Passphrase sources
//! - [`config`]: TOML configuration for key generation and issuance
//! - [`error`]: Error types
//! - [`tbs_certificate`]: Low-level certificate structure manipulation

pub mod cert;
pub mod config;
pub mod error;
pub mod issuer;
pub mod key;
pub mod passphrase;
pub mod pem_utils;
pub mod tbs_certificate;
