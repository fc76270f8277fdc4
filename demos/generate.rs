use pemca::cert::params::{CertificateRequestTemplate, CertificateTemplate, DistinguishedName};
use pemca::cert::{CertificateWithPrivateKey, write_certificate};
use pemca::config::CaConfig;
use pemca::error::CaError;
use pemca::issuer::{self_sign_certificate, sign_certificate_request};
use pemca::key::{EcCurve, KeyPair, write_key};
use pemca::passphrase::ConstPassphrase;

const CONFIG: &str = r#"
[key]
type = "ecdsa"
curve = "p384"
cipher = "aes256"

[certificate]
days = 3650
is_ca = true
max_path_len = 0
"#;

fn main() -> Result<(), CaError> {
    let config = CaConfig::from_toml_str(CONFIG)?;

    // Self-signed CA
    let ca_key = KeyPair::generate(config.key_type()?)?;
    let mut ca_template = CertificateTemplate::builder()
        .subject(
            DistinguishedName::builder()
                .common_name("My Test CA".to_string())
                .organization("Example Corp".to_string())
                .build(),
        )
        .build();
    config.apply(&mut ca_template)?;
    let ca = CertificateWithPrivateKey {
        cert: self_sign_certificate(&ca_template, &ca_key)?,
        key: ca_key,
    };

    println!("CA key (passphrase \"demo\"):");
    write_key(
        std::io::stdout(),
        &ca.key,
        Some(&ConstPassphrase::new("demo")),
        config.cipher()?,
    )?;
    println!("CA certificate:");
    write_certificate(std::io::stdout(), &ca.cert)?;

    // Server request, signed by the CA with its subject and names as requested
    let server_key = KeyPair::generate_ecdsa(EcCurve::P256);
    let csr = sign_certificate_request(
        &CertificateRequestTemplate::builder()
            .subject(
                DistinguishedName::builder()
                    .common_name("myserver.local".to_string())
                    .build(),
            )
            .dns_names(vec!["myserver.local".to_string()])
            .ip_addresses(vec!["127.0.0.1".parse().expect("valid address")])
            .build(),
        &server_key,
    )?;
    csr.check_signature()?;
    let server_cert = ca.issue(&csr, &CertificateTemplate::default())?;

    println!("Server certificate:");
    write_certificate(std::io::stdout(), &server_cert)?;
    Ok(())
}
