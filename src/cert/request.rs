//! PKCS#10 certificate signing requests.

use std::io::{Read, Write};
use std::net::IpAddr;
use std::path::Path;

use const_oid::AssociatedOid;
use der::{Decode, Encode};
use tracing::debug;
use x509_cert::ext::Extension;
use x509_cert::name::Name;
use x509_cert::request::{CertReq, ExtensionReq};

use super::SignatureAlgorithm;
use super::extensions::{SubjectAltName, ToAndFromX509Extension};
use super::params::{DistinguishedName, ExtensionParam};
use crate::error::{CaError, Result};
use crate::key::PublicKey;
use crate::pem_utils::{self, Block, CERTIFICATE_REQUEST_TAG};

/// A parsed certificate signing request.
///
/// Subject alternative names are read from the extension request
/// attribute, if present.
#[derive(Debug, Clone)]
pub struct CertificateRequest {
    pub inner: CertReq,
    raw: Vec<u8>,
    subject_alt_name: SubjectAltName,
}

impl CertificateRequest {
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let inner = CertReq::from_der(der)?;
        let subject_alt_name = requested_extensions(&inner)?
            .iter()
            .find(|ext| ext.oid == SubjectAltName::OID)
            .map(|ext| ext.to_extension::<SubjectAltName>())
            .transpose()?
            .unwrap_or_default();
        Ok(Self {
            inner,
            raw: der.to_vec(),
            subject_alt_name,
        })
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn to_der(&self) -> Result<Vec<u8>> {
        Ok(marshal_certificate_request(self)?.contents)
    }

    pub fn to_pem(&self) -> Result<String> {
        marshal_certificate_request(self)?.to_pem_string()
    }

    pub fn subject(&self) -> DistinguishedName {
        DistinguishedName::from_x509_name(&self.inner.info.subject)
    }

    pub fn subject_name(&self) -> &Name {
        &self.inner.info.subject
    }

    pub fn dns_names(&self) -> &[String] {
        &self.subject_alt_name.dns_names
    }

    pub fn email_addresses(&self) -> &[String] {
        &self.subject_alt_name.email_addresses
    }

    pub fn ip_addresses(&self) -> &[IpAddr] {
        &self.subject_alt_name.ip_addresses
    }

    pub fn public_key(&self) -> Result<PublicKey> {
        PublicKey::from_x509spki(&self.inner.info.public_key)
    }

    pub fn signature_algorithm(&self) -> Result<SignatureAlgorithm> {
        SignatureAlgorithm::from_algorithm_identifier(&self.inner.algorithm)
    }

    /// Every extension in the extension request attribute.
    pub fn extensions(&self) -> Result<Vec<ExtensionParam>> {
        requested_extensions(&self.inner)
    }

    /// Verifies the request's self-signature with its own public key.
    pub fn check_signature(&self) -> Result<()> {
        let info = self.inner.info.to_der()?;
        self.public_key()?
            .verify(
                &self.signature_algorithm()?,
                &info,
                self.inner.signature.raw_bytes(),
            )
            .map_err(|e| e.context("invalid certificate signing request"))
    }
}

fn requested_extensions(req: &CertReq) -> Result<Vec<ExtensionParam>> {
    let mut out = Vec::new();
    for attribute in req.info.attributes.iter() {
        if attribute.oid != ExtensionReq::OID {
            continue;
        }
        for value in attribute.values.iter() {
            let extensions: Vec<Extension> = value.decode_as()?;
            out.extend(extensions.into_iter().map(|ext| ExtensionParam {
                oid: ext.extn_id,
                critical: ext.critical,
                value: ext.extn_value.as_bytes().to_vec(),
            }));
        }
    }
    Ok(out)
}

/// Encodes `csr` as a `CERTIFICATE REQUEST` block.
pub fn marshal_certificate_request(csr: &CertificateRequest) -> Result<Block> {
    if csr.raw.is_empty() {
        return Err(CaError::EncodingError(
            "certificate request has no raw encoding".to_string(),
        ));
    }
    Ok(Block::new(CERTIFICATE_REQUEST_TAG, csr.raw.clone()))
}

/// Decodes a `CERTIFICATE REQUEST` block. Blocks with any other tag are rejected.
pub fn unmarshal_certificate_request(block: &Block) -> Result<CertificateRequest> {
    if block.tag != CERTIFICATE_REQUEST_TAG {
        return Err(CaError::DecodingError(format!(
            "unexpected block type {:?}, expected {CERTIFICATE_REQUEST_TAG:?}",
            block.tag
        )));
    }
    CertificateRequest::from_der(&block.contents)
        .map_err(|e| e.context("invalid certificate request"))
}

pub fn read_certificate_request<R: Read>(reader: R) -> Result<CertificateRequest> {
    let block = pem_utils::read_pem(reader)?;
    unmarshal_certificate_request(&block)
}

pub fn read_certificate_request_file(path: impl AsRef<Path>) -> Result<CertificateRequest> {
    let path = path.as_ref();
    debug!(path = %path.display(), "reading certificate request");
    let block = pem_utils::read_pem_file(path)?;
    unmarshal_certificate_request(&block).map_err(|e| e.context(path.display()))
}

pub fn write_certificate_request<W: Write>(writer: W, csr: &CertificateRequest) -> Result<()> {
    pem_utils::write_pem(writer, &marshal_certificate_request(csr)?)
}
