use der::Encode;
use der::asn1::{BitString, OctetString};
use x509_cert::Version;
use x509_cert::certificate::{CertificateInner, TbsCertificateInner};
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;

use crate::cert::SignatureAlgorithm;
use crate::cert::params::{ExtensionParam, Validity};
use crate::error::{CaError, Result};
use crate::key::{PublicKey, Signer};

/// Represents the "To Be Signed" (TBS) portion of an X.509 certificate.
/// This struct contains all the fields required to generate a valid X.509 certificate.
///
/// # Fields
/// * `serial_number` - The unique identifier for the certificate.
/// * `signature_algorithm` - The algorithm used to sign the certificate.
/// * `issuer` - The name of the certificate issuer.
/// * `validity` - The certificate's validity period.
/// * `subject` - The name of the certificate subject.
/// * `subject_public_key` - The public key of the certificate subject.
/// * `extensions` - X.509 extensions, in encoding order.
#[derive(Debug, Clone)]
pub struct TbsCertificate {
    /// Big-endian certificate serial number
    pub serial_number: Vec<u8>,
    pub signature_algorithm: SignatureAlgorithm,
    pub issuer: Name,
    pub validity: Validity,
    pub subject: Name,
    pub subject_public_key: PublicKey,
    pub extensions: Vec<ExtensionParam>,
}

impl TbsCertificate {
    /// Converts the `TbsCertificate` into a `TbsCertificateInner` for DER encoding.
    ///
    /// # Returns
    /// A version 3 `TbsCertificateInner`.
    pub fn to_tbs_certificate_inner(&self) -> Result<TbsCertificateInner> {
        let extensions = self
            .extensions
            .iter()
            .map(|ext| {
                Ok(x509_cert::ext::Extension {
                    extn_id: ext.oid,
                    critical: ext.critical,
                    extn_value: OctetString::new(ext.value.clone())?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let serial_number = SerialNumber::new(&positive_integer(&self.serial_number))
            .map_err(|e| CaError::InvalidInput(format!("invalid serial number: {e}")))?;

        Ok(TbsCertificateInner {
            version: Version::V3,
            serial_number,
            signature: self.signature_algorithm.into(),
            issuer: self.issuer.clone(),
            validity: self.validity.to_x509_validity()?,
            subject: self.subject.clone(),
            subject_public_key_info: self.subject_public_key.to_x509spki()?,
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: (!extensions.is_empty()).then_some(extensions),
        })
    }

    /// Signs the TBS certificate with `signer` and returns the DER encoding
    /// of the complete certificate.
    ///
    /// The signer's algorithm must be the one recorded in
    /// `signature_algorithm`.
    pub fn sign<S: Signer + ?Sized>(&self, signer: &S) -> Result<Vec<u8>> {
        if signer.signature_algorithm() != self.signature_algorithm {
            return Err(CaError::SigningError(format!(
                "signer produces {:?} signatures, certificate requires {:?}",
                signer.signature_algorithm(),
                self.signature_algorithm
            )));
        }
        let tbs_certificate = self.to_tbs_certificate_inner()?;
        let signature = signer.sign(&tbs_certificate.to_der()?)?;
        let cert = CertificateInner {
            tbs_certificate,
            signature_algorithm: self.signature_algorithm.into(),
            signature: BitString::from_bytes(&signature)?,
        };
        cert.to_der()
            .map_err(|e| CaError::EncodingError(format!("cannot encode certificate: {e}")))
    }
}

/// Minimal two's complement encoding of the unsigned big-endian `bytes`.
fn positive_integer(bytes: &[u8]) -> Vec<u8> {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    let digits = &bytes[start..];
    match digits.first() {
        None => vec![0],
        Some(&b) if b >= 0x80 => [&[0][..], digits].concat(),
        Some(_) => digits.to_vec(),
    }
}
