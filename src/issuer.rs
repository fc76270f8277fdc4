//! Certificate and certificate-request signing.
//!
//! Every call works on a copy of its template: unset fields are filled in
//! (serial number, subject key identifier, and for CA-signed certificates
//! the subject and alternative names from the request) before the
//! certificate is built and signed.

use const_oid::AssociatedOid;
use der::asn1::{BitString, OctetString, SetOfVec};
use der::flagset::FlagSet;
use der::{Any, Encode};
use rand_core::{OsRng, RngCore};
use sha1::{Digest, Sha1};
use tracing::{debug, info};
use x509_cert::attr::Attribute;
use x509_cert::name::Name;
use x509_cert::request::{CertReq, CertReqInfo, ExtensionReq};

use crate::cert::Certificate;
use crate::cert::extensions::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, ExtendedKeyUsageOption, KeyUsage,
    KeyUsages, SubjectAltName, SubjectKeyIdentifier, ToAndFromX509Extension,
};
use crate::cert::params::{CertificateRequestTemplate, CertificateTemplate, ExtensionParam};
use crate::cert::request::CertificateRequest;
use crate::error::{CaError, Result};
use crate::key::{PublicKey, Signer};
use crate::tbs_certificate::TbsCertificate;

/// Serial numbers are drawn from `[1, 2^SERIAL_BITS)`.
const SERIAL_BITS: usize = 159;

/// Creates a certificate for `signer`'s public key, signed by `signer`.
///
/// The issuer is the template's subject.
pub fn self_sign_certificate<S: Signer + ?Sized>(
    template: &CertificateTemplate,
    signer: &S,
) -> Result<Certificate> {
    let mut template = template.clone();
    let public_key = signer.public_key();
    fill_defaults(&mut template, &public_key)?;
    let subject = template.subject.as_x509_name()?;
    let cert = issue(&template, subject.clone(), subject, public_key, None, signer)?;
    info!(
        serial = %hex::encode(cert.serial_number()),
        subject = %cert.subject_name(),
        "self-signed certificate"
    );
    Ok(cert)
}

/// Creates a certificate for the key in `csr`, signed by `signer` on behalf
/// of `parent`.
///
/// The template's subject and alternative names take precedence. Each one
/// that is empty is copied from `csr`; the subject keeps the request's
/// encoding. `signer` must hold the private key of `parent`.
pub fn sign_certificate<S: Signer + ?Sized>(
    csr: &CertificateRequest,
    template: &CertificateTemplate,
    parent: &Certificate,
    signer: &S,
) -> Result<Certificate> {
    let signer_key = signer.public_key();
    let parent_key = parent
        .public_key()
        .map_err(|e| e.context("cannot read parent public key"))?;
    if signer_key != parent_key {
        return Err(CaError::SigningError(
            "signing key does not match the parent certificate".to_string(),
        ));
    }

    let mut template = template.clone();
    let subject = if template.subject.is_empty() {
        csr.subject_name().clone()
    } else {
        template.subject.as_x509_name()?
    };
    if template.dns_names.is_empty() {
        template.dns_names = csr.dns_names().to_vec();
    }
    if template.email_addresses.is_empty() {
        template.email_addresses = csr.email_addresses().to_vec();
    }
    if template.ip_addresses.is_empty() {
        template.ip_addresses = csr.ip_addresses().to_vec();
    }

    let public_key = csr
        .public_key()
        .map_err(|e| e.context("cannot read request public key"))?;
    fill_defaults(&mut template, &public_key)?;
    let cert = issue(
        &template,
        parent.subject_name().clone(),
        subject,
        public_key,
        parent.subject_key_id().map(<[u8]>::to_vec),
        signer,
    )?;
    info!(
        serial = %hex::encode(cert.serial_number()),
        subject = %cert.subject_name(),
        issuer = %cert.issuer_name(),
        "signed certificate"
    );
    Ok(cert)
}

/// Creates a certificate signing request for `signer`'s public key.
///
/// When the template names any DNS names, email addresses or IP addresses,
/// they are requested in a SubjectAltName extension.
pub fn sign_certificate_request<S: Signer + ?Sized>(
    template: &CertificateRequestTemplate,
    signer: &S,
) -> Result<CertificateRequest> {
    let san = SubjectAltName {
        dns_names: template.dns_names.clone(),
        email_addresses: template.email_addresses.clone(),
        ip_addresses: template.ip_addresses.clone(),
    };
    let mut generated = Vec::new();
    if !san.is_empty() {
        generated.push(ExtensionParam::from_extension(&san, false)?);
    }
    let requested = merge_extensions(generated, &template.extensions)?;

    let mut attributes = Vec::new();
    if !requested.is_empty() {
        let extensions = requested
            .iter()
            .map(|ext| {
                Ok(x509_cert::ext::Extension {
                    extn_id: ext.oid,
                    critical: ext.critical,
                    extn_value: OctetString::new(ext.value.clone())?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let value = Any::encode_from(&extensions)
            .map_err(|e| CaError::EncodingError(format!("cannot encode extension request: {e}")))?;
        attributes.push(Attribute {
            oid: ExtensionReq::OID,
            values: SetOfVec::try_from(vec![value])?,
        });
    }

    let info = CertReqInfo {
        version: x509_cert::request::Version::V1,
        subject: template.subject.as_x509_name()?,
        public_key: signer.public_key().to_x509spki()?,
        attributes: SetOfVec::try_from(attributes)?,
    };
    let signature = signer.sign(&info.to_der()?)?;
    let req = CertReq {
        info,
        algorithm: signer.signature_algorithm().into(),
        signature: BitString::from_bytes(&signature)?,
    };
    let der = req
        .to_der()
        .map_err(|e| CaError::EncodingError(format!("cannot encode certificate request: {e}")))?;

    // Whatever was just encoded must parse back.
    let csr = match CertificateRequest::from_der(&der) {
        Ok(csr) => csr,
        Err(e) => panic!("cannot parse generated certificate request: {e}"),
    };
    info!(subject = %csr.subject_name(), "signed certificate request");
    Ok(csr)
}

/// Fills in the serial number and subject key identifier when unset. A
/// serial of zero counts as unset.
fn fill_defaults(template: &mut CertificateTemplate, public_key: &PublicKey) -> Result<()> {
    let serial_is_zero = template
        .serial_number
        .as_deref()
        .is_none_or(|serial| serial.iter().all(|&b| b == 0));
    if serial_is_zero {
        template.serial_number = Some(random_serial()?);
    }
    if template.subject_key_id.is_none() {
        template.subject_key_id = match subject_key_id(public_key) {
            Ok(id) => Some(id),
            Err(e) => {
                debug!(error = %e, "leaving subject key identifier unset");
                None
            }
        };
    }
    Ok(())
}

fn random_serial() -> Result<Vec<u8>> {
    let mut serial = vec![0u8; SERIAL_BITS.div_ceil(8)];
    loop {
        OsRng
            .try_fill_bytes(&mut serial)
            .map_err(|e| CaError::SigningError(format!("cannot generate serial number: {e}")))?;
        serial[0] &= 0xff >> (8 * serial.len() - SERIAL_BITS);
        if serial.iter().any(|&b| b != 0) {
            return Ok(serial);
        }
    }
}

/// SHA-1 of the DER encoded SubjectPublicKeyInfo.
fn subject_key_id(public_key: &PublicKey) -> Result<Vec<u8>> {
    let spki = public_key.to_x509spki()?.to_der()?;
    Ok(Sha1::digest(&spki).to_vec())
}

fn extensions(
    template: &CertificateTemplate,
    authority_key_id: Option<Vec<u8>>,
) -> Result<Vec<ExtensionParam>> {
    if template.max_path_len.is_some() && !template.is_ca {
        return Err(CaError::SigningError(
            "path length constraint set on a non-CA certificate".to_string(),
        ));
    }

    let basic_constraints = BasicConstraints {
        is_ca: template.is_ca,
        max_path_length: template.max_path_len,
    };
    let mut extensions = vec![ExtensionParam::from_extension(&basic_constraints, true)?];

    let mut key_usage_flags: FlagSet<KeyUsages> = FlagSet::empty();
    if template.is_ca {
        key_usage_flags |= KeyUsages::KeyCertSign;
        key_usage_flags |= KeyUsages::CRLSign;
    }
    for usage in &template.usages {
        match usage {
            ExtendedKeyUsageOption::ClientAuth
            | ExtendedKeyUsageOption::ServerAuth
            | ExtendedKeyUsageOption::EmailProtection => {
                key_usage_flags |= KeyUsages::DigitalSignature;
                key_usage_flags |= KeyUsages::KeyEncipherment;
            }
            ExtendedKeyUsageOption::CodeSigning
            | ExtendedKeyUsageOption::TimeStamping
            | ExtendedKeyUsageOption::OcspSigning => {
                key_usage_flags |= KeyUsages::DigitalSignature;
            }
        }
    }
    if !key_usage_flags.is_empty() {
        extensions.push(ExtensionParam::from_extension(
            &KeyUsage(key_usage_flags),
            true,
        )?);
    }

    if !template.usages.is_empty() {
        let extended_key_usage = ExtendedKeyUsage {
            usage: template.usages.clone(),
        };
        extensions.push(ExtensionParam::from_extension(&extended_key_usage, false)?);
    }

    if let Some(id) = &template.subject_key_id {
        extensions.push(ExtensionParam::from_extension(
            &SubjectKeyIdentifier(id.clone()),
            false,
        )?);
    }

    if let Some(id) = authority_key_id {
        extensions.push(ExtensionParam::from_extension(
            &AuthorityKeyIdentifier {
                key_identifier: Some(id),
            },
            false,
        )?);
    }

    let san = SubjectAltName {
        dns_names: template.dns_names.clone(),
        email_addresses: template.email_addresses.clone(),
        ip_addresses: template.ip_addresses.clone(),
    };
    if !san.is_empty() {
        extensions.push(ExtensionParam::from_extension(&san, false)?);
    }

    merge_extensions(extensions, &template.extensions)
}

/// Appends the caller's extensions to the generated ones. A caller
/// extension replaces any generated extension with the same OID.
fn merge_extensions(
    mut generated: Vec<ExtensionParam>,
    extra: &[ExtensionParam],
) -> Result<Vec<ExtensionParam>> {
    check_extensions(extra)?;
    generated.retain(|ext| extra.iter().all(|other| other.oid != ext.oid));
    generated.extend(extra.iter().cloned());
    Ok(generated)
}

// Parsing a certificate or request decodes these, so a malformed value
// must be caught before it is signed.
fn check_extensions(extra: &[ExtensionParam]) -> Result<()> {
    for ext in extra {
        let decoded = if ext.oid == SubjectAltName::OID {
            ext.to_extension::<SubjectAltName>().map(drop)
        } else if ext.oid == BasicConstraints::OID {
            ext.to_extension::<BasicConstraints>().map(drop)
        } else if ext.oid == SubjectKeyIdentifier::OID {
            ext.to_extension::<SubjectKeyIdentifier>().map(drop)
        } else if ext.oid == AuthorityKeyIdentifier::OID {
            ext.to_extension::<AuthorityKeyIdentifier>().map(drop)
        } else {
            Ok(())
        };
        decoded.map_err(|e| {
            CaError::SigningError(format!("malformed extension {}: {e}", ext.oid))
        })?;
    }
    Ok(())
}

fn issue<S: Signer + ?Sized>(
    template: &CertificateTemplate,
    issuer: Name,
    subject: Name,
    subject_public_key: PublicKey,
    authority_key_id: Option<Vec<u8>>,
    signer: &S,
) -> Result<Certificate> {
    let serial_number = template
        .serial_number
        .clone()
        .ok_or_else(|| CaError::SigningError("no serial number".to_string()))?;
    let tbs = TbsCertificate {
        serial_number,
        signature_algorithm: signer.signature_algorithm(),
        issuer,
        validity: template.validity.clone(),
        subject,
        subject_public_key,
        extensions: extensions(template, authority_key_id)?,
    };
    let der = tbs.sign(signer).map_err(|e| e.context("cannot sign certificate"))?;

    // Whatever was just encoded must parse back.
    match Certificate::from_der(&der) {
        Ok(cert) => Ok(cert),
        Err(e) => panic!("cannot parse generated certificate: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::params::DistinguishedName;
    use crate::key::{EcCurve, KeyPair};

    #[test]
    fn test_random_serial_bounds() {
        for _ in 0..64 {
            let serial = random_serial().unwrap();
            assert_eq!(serial.len(), 20);
            assert!(serial[0] < 0x80);
            assert!(serial.iter().any(|&b| b != 0));
        }
    }

    #[test]
    fn test_subject_key_id_is_sha1_of_spki() {
        let key = KeyPair::generate_ecdsa(EcCurve::P256);
        let spki = key.public_key().to_x509spki().unwrap().to_der().unwrap();
        let id = subject_key_id(&key.public_key()).unwrap();
        assert_eq!(id, Sha1::digest(&spki).to_vec());
    }

    #[test]
    fn test_fill_defaults_keeps_explicit_values() {
        let key = KeyPair::generate_ecdsa(EcCurve::P256);
        let mut template = CertificateTemplate::builder()
            .serial_number(vec![42])
            .subject_key_id(vec![1, 2, 3])
            .build();
        fill_defaults(&mut template, &key.public_key()).unwrap();
        assert_eq!(template.serial_number, Some(vec![42]));
        assert_eq!(template.subject_key_id, Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_path_len_requires_ca() {
        let key = KeyPair::generate_ecdsa(EcCurve::P256);
        let template = CertificateTemplate::builder().max_path_len(1).build();
        let err = self_sign_certificate(&template, &key).unwrap_err();
        assert!(matches!(err, CaError::SigningError(_)));
    }

    #[test]
    fn test_ca_extensions() {
        let key = KeyPair::generate_ecdsa(EcCurve::P256);
        let template = CertificateTemplate::builder()
            .subject(
                DistinguishedName::builder()
                    .common_name("Crab Root".to_string())
                    .build(),
            )
            .is_ca(true)
            .max_path_len(0)
            .build();
        let cert = self_sign_certificate(&template, &key).unwrap();
        assert!(cert.is_ca());
        assert_eq!(cert.max_path_len(), Some(0));
        let usage = cert.extension::<KeyUsage>().unwrap().unwrap();
        assert!(usage.0.contains(KeyUsages::KeyCertSign));
        assert!(usage.0.contains(KeyUsages::CRLSign));
        assert!(cert.extension::<ExtendedKeyUsage>().unwrap().is_none());
    }

    #[test]
    fn test_extended_usages() {
        let key = KeyPair::generate_ecdsa(EcCurve::P256);
        let template = CertificateTemplate::builder()
            .usages(vec![ExtendedKeyUsageOption::ServerAuth])
            .build();
        let cert = self_sign_certificate(&template, &key).unwrap();
        let eku = cert.extension::<ExtendedKeyUsage>().unwrap().unwrap();
        assert_eq!(eku.usage, vec![ExtendedKeyUsageOption::ServerAuth]);
        let usage = cert.extension::<KeyUsage>().unwrap().unwrap();
        assert!(usage.0.contains(KeyUsages::DigitalSignature));
        assert!(!usage.0.contains(KeyUsages::KeyCertSign));
    }

    #[test]
    fn test_caller_extensions_come_last() {
        let key = KeyPair::generate_ecdsa(EcCurve::P256);
        let custom = ExtensionParam {
            oid: const_oid::ObjectIdentifier::new_unwrap("1.3.6.1.4.1.55555.1"),
            critical: false,
            value: vec![0x05, 0x00],
        };
        let template = CertificateTemplate::builder()
            .dns_names(vec!["crabs.crabs".to_string()])
            .extensions(vec![custom.clone()])
            .build();
        let cert = self_sign_certificate(&template, &key).unwrap();
        let extensions = cert.inner.tbs_certificate.extensions.as_ref().unwrap();
        let last = extensions.last().unwrap();
        assert_eq!(last.extn_id, custom.oid);
        assert_eq!(last.extn_value.as_bytes(), custom.value.as_slice());
        assert_eq!(extensions[0].extn_id, BasicConstraints::OID);
        assert!(extensions[0].critical);
    }

    #[test]
    fn test_zero_serial_is_replaced() {
        let key = KeyPair::generate_ecdsa(EcCurve::P256);
        for serial in [vec![], vec![0], vec![0, 0, 0]] {
            let template = CertificateTemplate::builder()
                .serial_number(serial.clone())
                .build();
            let cert = self_sign_certificate(&template, &key).unwrap();
            assert!(
                cert.serial_number().iter().any(|&b| b != 0),
                "serial {serial:?} was kept"
            );
        }
    }

    #[test]
    fn test_caller_extensions_replace_generated() {
        let key = KeyPair::generate_ecdsa(EcCurve::P256);
        let ca = BasicConstraints {
            is_ca: true,
            max_path_length: Some(2),
        };
        let san = SubjectAltName {
            dns_names: vec!["caller.crabs".to_string()],
            ..Default::default()
        };
        let template = CertificateTemplate::builder()
            .dns_names(vec!["generated.crabs".to_string()])
            .extensions(vec![
                ExtensionParam::from_extension(&ca, true).unwrap(),
                ExtensionParam::from_extension(&san, false).unwrap(),
            ])
            .build();
        let cert = self_sign_certificate(&template, &key).unwrap();

        let extensions = cert.inner.tbs_certificate.extensions.as_ref().unwrap();
        for oid in [BasicConstraints::OID, SubjectAltName::OID] {
            let count = extensions.iter().filter(|ext| ext.extn_id == oid).count();
            assert_eq!(count, 1, "{oid}");
        }
        assert!(cert.is_ca());
        assert_eq!(cert.max_path_len(), Some(2));
        assert_eq!(cert.dns_names(), ["caller.crabs".to_string()]);
        assert!(cert.subject_key_id().is_some());
    }

    #[test]
    fn test_request_extensions_replace_generated() {
        let key = KeyPair::generate_ecdsa(EcCurve::P256);
        let san = SubjectAltName {
            dns_names: vec!["caller.crabs".to_string()],
            ..Default::default()
        };
        let template = CertificateRequestTemplate::builder()
            .dns_names(vec!["generated.crabs".to_string()])
            .extensions(vec![ExtensionParam::from_extension(&san, false).unwrap()])
            .build();
        let csr = sign_certificate_request(&template, &key).unwrap();
        let requested = csr.extensions().unwrap();
        assert_eq!(requested.len(), 1);
        assert_eq!(csr.dns_names(), ["caller.crabs".to_string()]);
    }

    #[test]
    fn test_malformed_caller_extension_is_an_error() {
        let key = KeyPair::generate_ecdsa(EcCurve::P256);
        for oid in [SubjectAltName::OID, AuthorityKeyIdentifier::OID] {
            let broken = ExtensionParam {
                oid,
                critical: false,
                value: vec![0xde, 0xad],
            };
            let template = CertificateTemplate::builder()
                .extensions(vec![broken.clone()])
                .build();
            let err = self_sign_certificate(&template, &key).unwrap_err();
            assert!(matches!(err, CaError::SigningError(_)), "{oid}: {err}");

            let request = CertificateRequestTemplate::builder()
                .extensions(vec![broken])
                .build();
            let err = sign_certificate_request(&request, &key).unwrap_err();
            assert!(matches!(err, CaError::SigningError(_)), "{oid}: {err}");
        }
    }
}
