#![allow(dead_code)]

use pemca::cert::params::{CertificateRequestTemplate, CertificateTemplate, DistinguishedName};
use pemca::cert::{CertificateRequest, CertificateWithPrivateKey};
use pemca::issuer::{self_sign_certificate, sign_certificate_request};
use pemca::key::{EcCurve, KeyPair};

pub fn generate_ca_cert() -> CertificateWithPrivateKey {
    let ca_key = KeyPair::generate_ecdsa(EcCurve::P256);

    let subject_dn = DistinguishedName::builder()
        .common_name("myca.local".to_string())
        .organization("Crab widgits SE".to_string())
        .build();

    let template = CertificateTemplate::builder()
        .subject(subject_dn)
        .is_ca(true)
        .build();

    CertificateWithPrivateKey {
        cert: self_sign_certificate(&template, &ca_key).unwrap(),
        key: ca_key,
    }
}

/// A request from a fresh key for `common_name`, asking for `dns_names`.
pub fn generate_request(common_name: &str, dns_names: &[&str]) -> (KeyPair, CertificateRequest) {
    let key = KeyPair::generate_ecdsa(EcCurve::P256);
    let template = CertificateRequestTemplate::builder()
        .subject(
            DistinguishedName::builder()
                .common_name(common_name.to_string())
                .build(),
        )
        .dns_names(dns_names.iter().map(|s| s.to_string()).collect())
        .build();
    let csr = sign_certificate_request(&template, &key).unwrap();
    (key, csr)
}
