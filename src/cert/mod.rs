pub mod extensions;
pub mod params;
pub mod request;

use std::io::{Read, Write};
use std::path::Path;

use der::asn1::AnyRef;
use der::{Any, Decode, Encode};
use extensions::{
    AuthorityKeyIdentifier, BasicConstraints, SubjectAltName, SubjectKeyIdentifier,
    ToAndFromX509Extension,
};
use params::{CertificateTemplate, DistinguishedName, Validity};
use tracing::debug;
use x509_cert::certificate::CertificateInner;
use x509_cert::name::Name;
use x509_cert::spki::AlgorithmIdentifierOwned;

use crate::error::{CaError, Result};
use crate::key::{KeyPair, PublicKey};
use crate::pem_utils::{self, Block, CERTIFICATE_TAG};

pub use request::{
    CertificateRequest, marshal_certificate_request, read_certificate_request,
    read_certificate_request_file, unmarshal_certificate_request, write_certificate_request,
};

/// Represents the supported signature algorithms for certificates.
///
/// This enum provides a mapping to the corresponding OIDs for each algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// SHA-256 with RSA encryption.
    Sha256WithRSA,
    /// SHA-224 with ECDSA.
    Sha224WithECDSA,
    /// SHA-256 with ECDSA.
    Sha256WithECDSA,
    /// SHA-384 with ECDSA.
    Sha384WithECDSA,
    /// SHA-512 with ECDSA.
    Sha512WithECDSA,
}

impl SignatureAlgorithm {
    /// Maps an algorithm identifier back to a supported algorithm.
    pub fn from_algorithm_identifier(algorithm: &AlgorithmIdentifierOwned) -> Result<Self> {
        match algorithm.oid {
            const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION => Ok(Self::Sha256WithRSA),
            const_oid::db::rfc5912::ECDSA_WITH_SHA_224 => Ok(Self::Sha224WithECDSA),
            const_oid::db::rfc5912::ECDSA_WITH_SHA_256 => Ok(Self::Sha256WithECDSA),
            const_oid::db::rfc5912::ECDSA_WITH_SHA_384 => Ok(Self::Sha384WithECDSA),
            const_oid::db::rfc5912::ECDSA_WITH_SHA_512 => Ok(Self::Sha512WithECDSA),
            other => Err(CaError::DecodingError(format!(
                "unsupported signature algorithm {other}"
            ))),
        }
    }
}

impl From<SignatureAlgorithm> for AlgorithmIdentifierOwned {
    /// Converts a `SignatureAlgorithm` into an `AlgorithmIdentifierOwned`.
    ///
    /// RSA identifiers carry an explicit NULL parameter, ECDSA identifiers
    /// carry none (RFC 5758).
    fn from(value: SignatureAlgorithm) -> Self {
        match value {
            SignatureAlgorithm::Sha256WithRSA => AlgorithmIdentifierOwned {
                oid: const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
                parameters: Some(Any::from(AnyRef::NULL)),
            },
            SignatureAlgorithm::Sha224WithECDSA => AlgorithmIdentifierOwned {
                oid: const_oid::db::rfc5912::ECDSA_WITH_SHA_224,
                parameters: None,
            },
            SignatureAlgorithm::Sha256WithECDSA => AlgorithmIdentifierOwned {
                oid: const_oid::db::rfc5912::ECDSA_WITH_SHA_256,
                parameters: None,
            },
            SignatureAlgorithm::Sha384WithECDSA => AlgorithmIdentifierOwned {
                oid: const_oid::db::rfc5912::ECDSA_WITH_SHA_384,
                parameters: None,
            },
            SignatureAlgorithm::Sha512WithECDSA => AlgorithmIdentifierOwned {
                oid: const_oid::db::rfc5912::ECDSA_WITH_SHA_512,
                parameters: None,
            },
        }
    }
}

/// Represents a parsed X.509 certificate.
///
/// A `Certificate` is only obtained by parsing DER, either directly with
/// [`Certificate::from_der`] or as the output of the signing functions in
/// [`crate::issuer`]. The bytes it was parsed from are kept and are what
/// [`marshal_certificate`] writes back out.
#[derive(Debug, Clone)]
pub struct Certificate {
    /// The inner representation of the certificate.
    pub inner: CertificateInner,
    raw: Vec<u8>,
    subject_alt_name: SubjectAltName,
    subject_key_id: Option<Vec<u8>>,
    authority_key_id: Option<Vec<u8>>,
    basic_constraints: Option<BasicConstraints>,
}

impl Certificate {
    /// Parses a DER-encoded certificate.
    ///
    /// The SubjectAltName, key identifier and BasicConstraints extensions
    /// are decoded eagerly, so a malformed one is reported here.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let inner = CertificateInner::from_der(der)?;
        let subject_alt_name = find_extension::<SubjectAltName>(&inner)?.unwrap_or_default();
        let subject_key_id = find_extension::<SubjectKeyIdentifier>(&inner)?.map(|ski| ski.0);
        let authority_key_id =
            find_extension::<AuthorityKeyIdentifier>(&inner)?.and_then(|aki| aki.key_identifier);
        let basic_constraints = find_extension::<BasicConstraints>(&inner)?;
        Ok(Self {
            inner,
            raw: der.to_vec(),
            subject_alt_name,
            subject_key_id,
            authority_key_id,
            basic_constraints,
        })
    }

    /// The DER encoding the certificate was parsed from.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Encodes the certificate into DER format.
    ///
    /// # Returns
    /// A byte vector containing the DER-encoded certificate.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        Ok(marshal_certificate(self)?.contents)
    }

    /// Encodes the certificate into PEM format.
    ///
    /// # Returns
    /// A string containing the PEM-encoded certificate.
    pub fn to_pem(&self) -> Result<String> {
        marshal_certificate(self)?.to_pem_string()
    }

    pub fn subject(&self) -> DistinguishedName {
        DistinguishedName::from_x509_name(&self.inner.tbs_certificate.subject)
    }

    /// The subject exactly as encoded, including attributes
    /// [`DistinguishedName`] does not model.
    pub fn subject_name(&self) -> &Name {
        &self.inner.tbs_certificate.subject
    }

    pub fn issuer(&self) -> DistinguishedName {
        DistinguishedName::from_x509_name(&self.inner.tbs_certificate.issuer)
    }

    pub fn issuer_name(&self) -> &Name {
        &self.inner.tbs_certificate.issuer
    }

    /// Big-endian serial number, as encoded.
    pub fn serial_number(&self) -> &[u8] {
        self.inner.tbs_certificate.serial_number.as_bytes()
    }

    pub fn dns_names(&self) -> &[String] {
        &self.subject_alt_name.dns_names
    }

    pub fn email_addresses(&self) -> &[String] {
        &self.subject_alt_name.email_addresses
    }

    pub fn ip_addresses(&self) -> &[std::net::IpAddr] {
        &self.subject_alt_name.ip_addresses
    }

    pub fn subject_key_id(&self) -> Option<&[u8]> {
        self.subject_key_id.as_deref()
    }

    pub fn authority_key_id(&self) -> Option<&[u8]> {
        self.authority_key_id.as_deref()
    }

    /// Reports whether the certificate may sign other certificates.
    pub fn is_ca(&self) -> bool {
        self.basic_constraints.is_some_and(|bc| bc.is_ca)
    }

    pub fn max_path_len(&self) -> Option<u8> {
        self.basic_constraints.and_then(|bc| bc.max_path_length)
    }

    pub fn validity(&self) -> Validity {
        Validity::from_x509_validity(&self.inner.tbs_certificate.validity)
    }

    /// Decodes the subject public key.
    pub fn public_key(&self) -> Result<PublicKey> {
        PublicKey::from_x509spki(&self.inner.tbs_certificate.subject_public_key_info)
    }

    pub fn signature_algorithm(&self) -> Result<SignatureAlgorithm> {
        SignatureAlgorithm::from_algorithm_identifier(&self.inner.signature_algorithm)
    }

    /// Decodes the extension of type `E`, if the certificate carries one.
    pub fn extension<E: ToAndFromX509Extension>(&self) -> Result<Option<E>> {
        find_extension(&self.inner)
    }

    /// Checks that this certificate's signature was made by `parent`'s key.
    pub fn check_signature_from(&self, parent: &Certificate) -> Result<()> {
        let tbs = self.inner.tbs_certificate.to_der()?;
        parent.public_key()?.verify(
            &self.signature_algorithm()?,
            &tbs,
            self.inner.signature.raw_bytes(),
        )
    }
}

fn find_extension<E: ToAndFromX509Extension>(inner: &CertificateInner) -> Result<Option<E>> {
    let Some(extensions) = &inner.tbs_certificate.extensions else {
        return Ok(None);
    };
    extensions
        .iter()
        .find(|ext| ext.extn_id == E::OID)
        .map(|ext| {
            E::from_x509_extension_value(ext.extn_value.as_bytes())
                .map_err(|e| e.context(format!("invalid extension {}", E::OID)))
        })
        .transpose()
}

/// Encodes `cert` as a `CERTIFICATE` block.
pub fn marshal_certificate(cert: &Certificate) -> Result<Block> {
    if cert.raw.is_empty() {
        return Err(CaError::EncodingError(
            "certificate has no raw encoding".to_string(),
        ));
    }
    Ok(Block::new(CERTIFICATE_TAG, cert.raw.clone()))
}

/// Decodes a `CERTIFICATE` block. Blocks with any other tag are rejected.
pub fn unmarshal_certificate(block: &Block) -> Result<Certificate> {
    if block.tag != CERTIFICATE_TAG {
        return Err(CaError::DecodingError(format!(
            "unexpected block type {:?}, expected {CERTIFICATE_TAG:?}",
            block.tag
        )));
    }
    Certificate::from_der(&block.contents).map_err(|e| e.context("invalid certificate"))
}

/// Reads a PEM encoded certificate from `reader`.
pub fn read_certificate<R: Read>(reader: R) -> Result<Certificate> {
    let block = pem_utils::read_pem(reader)?;
    unmarshal_certificate(&block)
}

/// Reads a PEM encoded certificate from the file at `path`.
pub fn read_certificate_file(path: impl AsRef<Path>) -> Result<Certificate> {
    let path = path.as_ref();
    debug!(path = %path.display(), "reading certificate");
    let block = pem_utils::read_pem_file(path)?;
    unmarshal_certificate(&block).map_err(|e| e.context(path.display()))
}

/// Writes `cert` to `writer` as a PEM `CERTIFICATE` block.
pub fn write_certificate<W: Write>(writer: W, cert: &Certificate) -> Result<()> {
    pem_utils::write_pem(writer, &marshal_certificate(cert)?)
}

/// A CA certificate together with the private key that signs for it.
#[derive(Debug, Clone)]
pub struct CertificateWithPrivateKey {
    pub cert: Certificate,
    pub key: KeyPair,
}

impl CertificateWithPrivateKey {
    /// Issues a certificate for `csr`, signed by this CA.
    ///
    /// See [`crate::issuer::sign_certificate`].
    pub fn issue(
        &self,
        csr: &CertificateRequest,
        template: &CertificateTemplate,
    ) -> Result<Certificate> {
        crate::issuer::sign_certificate(csr, template, &self.cert, &self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issuer::self_sign_certificate;
    use crate::key::EcCurve;

    fn sample() -> Certificate {
        let key = KeyPair::generate_ecdsa(EcCurve::P256);
        let template = CertificateTemplate::builder()
            .subject(
                DistinguishedName::builder()
                    .common_name("crabs.crabs".to_string())
                    .build(),
            )
            .dns_names(vec!["crabs.crabs".to_string()])
            .build();
        self_sign_certificate(&template, &key).unwrap()
    }

    #[test]
    fn test_signature_algorithm_identifier_round_trip() {
        for algorithm in [
            SignatureAlgorithm::Sha256WithRSA,
            SignatureAlgorithm::Sha224WithECDSA,
            SignatureAlgorithm::Sha256WithECDSA,
            SignatureAlgorithm::Sha384WithECDSA,
            SignatureAlgorithm::Sha512WithECDSA,
        ] {
            let identifier = AlgorithmIdentifierOwned::from(algorithm);
            assert_eq!(
                SignatureAlgorithm::from_algorithm_identifier(&identifier).unwrap(),
                algorithm
            );
        }
    }

    #[test]
    fn test_rsa_identifier_has_null_parameters() {
        let identifier = AlgorithmIdentifierOwned::from(SignatureAlgorithm::Sha256WithRSA);
        let der = identifier.to_der().unwrap();
        assert_eq!(&der[der.len() - 2..], &[0x05, 0x00]);
    }

    #[test]
    fn test_marshal_is_raw() {
        let cert = sample();
        let block = marshal_certificate(&cert).unwrap();
        assert_eq!(block.tag, CERTIFICATE_TAG);
        assert_eq!(block.contents, cert.raw());
        let decoded = unmarshal_certificate(&block).unwrap();
        assert_eq!(decoded.raw(), cert.raw());
        assert_eq!(decoded.dns_names(), &["crabs.crabs".to_string()]);
    }

    #[test]
    fn test_unmarshal_rejects_other_tags() {
        let cert = sample();
        let block = Block::new("CERTIFICATE REQUEST", cert.raw().to_vec());
        let err = unmarshal_certificate(&block).unwrap_err();
        assert!(matches!(err, CaError::DecodingError(msg) if msg.contains("CERTIFICATE REQUEST")));
    }

    #[test]
    fn test_unmarshal_garbage() {
        let block = Block::new(CERTIFICATE_TAG, vec![0x30, 0x03, 0x01, 0x01]);
        let err = unmarshal_certificate(&block).unwrap_err();
        assert!(
            matches!(err, CaError::DecodingError(msg) if msg.starts_with("invalid certificate"))
        );
    }

    #[test]
    fn test_extension_lookup() {
        let cert = sample();
        let bc = cert.extension::<BasicConstraints>().unwrap().unwrap();
        assert!(!bc.is_ca);
        assert!(cert.extension::<AuthorityKeyIdentifier>().unwrap().is_none());
        assert!(cert.authority_key_id().is_none());
    }
}
