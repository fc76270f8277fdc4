//! Key-generation and issuance defaults loaded from TOML.
//!
//! ```toml
//! [key]
//! type = "ecdsa"
//! curve = "p384"
//! cipher = "aes256"
//!
//! [certificate]
//! days = 365
//! is_ca = true
//! max_path_len = 0
//! ```
//!
//! Every field is optional. An empty `cipher` writes keys unencrypted.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cert::params::{CertificateTemplate, DEFAULT_VALIDITY_DAYS, Validity};
use crate::error::{CaError, Result};
use crate::key::{EcCurve, KeyType};
use crate::pem_utils::PemCipher;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CaConfig {
    pub key: KeyConfig,
    pub certificate: CertificateConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyAlgorithm {
    #[default]
    Rsa,
    Ecdsa,
}

/// The `[key]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KeyConfig {
    #[serde(rename = "type")]
    pub algorithm: KeyAlgorithm,
    /// RSA modulus size.
    pub bits: usize,
    /// ECDSA curve name.
    pub curve: String,
    /// PEM cipher name, or empty for none.
    pub cipher: String,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            algorithm: KeyAlgorithm::Rsa,
            bits: 2048,
            curve: EcCurve::P256.name().to_string(),
            cipher: "aes128".to_string(),
        }
    }
}

/// The `[certificate]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CertificateConfig {
    pub days: i64,
    pub is_ca: bool,
    pub max_path_len: Option<u8>,
}

impl Default for CertificateConfig {
    fn default() -> Self {
        Self {
            days: DEFAULT_VALIDITY_DAYS,
            is_ca: false,
            max_path_len: None,
        }
    }
}

impl CaConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| CaError::InvalidInput(format!("invalid configuration: {e}")))
    }

    /// Reads the configuration file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| CaError::IoError(format!("cannot read {}: {e}", path.display())))?;
        let config = Self::from_toml_str(&content).map_err(|e| e.context(path.display()))?;
        debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// The kind of key to generate.
    pub fn key_type(&self) -> Result<KeyType> {
        match self.key.algorithm {
            KeyAlgorithm::Rsa => {
                if self.key.bits == 0 {
                    return Err(CaError::InvalidInput("RSA key size must be positive".to_string()));
                }
                Ok(KeyType::Rsa {
                    bits: self.key.bits,
                })
            }
            KeyAlgorithm::Ecdsa => Ok(KeyType::Ecdsa(self.key.curve.parse()?)),
        }
    }

    /// The cipher for writing keys; `None` when keys are written in the clear.
    pub fn cipher(&self) -> Result<Option<PemCipher>> {
        if self.key.cipher.is_empty() {
            return Ok(None);
        }
        self.key.cipher.parse().map(Some)
    }

    /// A validity window of the configured length, starting now.
    pub fn validity(&self) -> Result<Validity> {
        if self.certificate.days <= 0 {
            return Err(CaError::InvalidInput(format!(
                "certificate validity must be at least one day, got {}",
                self.certificate.days
            )));
        }
        Ok(Validity::for_days(self.certificate.days))
    }

    /// Copies the validity, CA flag and path length into `template`.
    pub fn apply(&self, template: &mut CertificateTemplate) -> Result<()> {
        if self.certificate.max_path_len.is_some() && !self.certificate.is_ca {
            return Err(CaError::InvalidInput(
                "max_path_len requires is_ca".to_string(),
            ));
        }
        template.validity = self.validity()?;
        template.is_ca = self.certificate.is_ca;
        template.max_path_len = self.certificate.max_path_len;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CaConfig::from_toml_str("").unwrap();
        assert_eq!(config, CaConfig::default());
        assert_eq!(config.key_type().unwrap(), KeyType::Rsa { bits: 2048 });
        assert_eq!(config.cipher().unwrap(), Some(PemCipher::Aes128));
        assert_eq!(config.certificate.days, 30);
        assert!(!config.certificate.is_ca);
    }

    #[test]
    fn test_ecdsa_without_cipher() {
        let config = CaConfig::from_toml_str(
            r#"
            [key]
            type = "ecdsa"
            curve = "p521"
            cipher = ""
            "#,
        )
        .unwrap();
        assert_eq!(config.key_type().unwrap(), KeyType::Ecdsa(EcCurve::P521));
        assert_eq!(config.cipher().unwrap(), None);
    }

    #[test]
    fn test_apply() {
        let config = CaConfig::from_toml_str(
            r#"
            [certificate]
            days = 10
            is_ca = true
            max_path_len = 2
            "#,
        )
        .unwrap();
        let mut template = CertificateTemplate::default();
        config.apply(&mut template).unwrap();
        assert!(template.is_ca);
        assert_eq!(template.max_path_len, Some(2));
        let span = template.validity.not_after - template.validity.not_before;
        assert_eq!(span.whole_days(), 10);
    }

    #[test]
    fn test_invalid_values() {
        let bad_type = CaConfig::from_toml_str("[key]\ntype = \"dsa\"\n");
        assert!(matches!(bad_type, Err(CaError::InvalidInput(_))));

        let unknown_field = CaConfig::from_toml_str("[key]\nsize = 4096\n");
        assert!(matches!(unknown_field, Err(CaError::InvalidInput(_))));

        let curve = CaConfig::from_toml_str("[key]\ntype = \"ecdsa\"\ncurve = \"p192\"\n").unwrap();
        assert!(matches!(curve.key_type(), Err(CaError::InvalidInput(_))));

        let cipher = CaConfig::from_toml_str("[key]\ncipher = \"rc4\"\n").unwrap();
        assert!(matches!(cipher.cipher(), Err(CaError::InvalidInput(_))));

        let days = CaConfig::from_toml_str("[certificate]\ndays = 0\n").unwrap();
        assert!(matches!(days.validity(), Err(CaError::InvalidInput(_))));

        let path_len = CaConfig::from_toml_str("[certificate]\nmax_path_len = 1\n").unwrap();
        let mut template = CertificateTemplate::default();
        assert!(matches!(
            path_len.apply(&mut template),
            Err(CaError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = CaConfig::load(dir.path().join("ca.toml")).unwrap_err();
        assert!(matches!(err, CaError::IoError(msg) if msg.contains("ca.toml")));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ca.toml");
        std::fs::write(&path, "[certificate]\ndays = 90\n").unwrap();
        let config = CaConfig::load(&path).unwrap();
        assert_eq!(config.certificate.days, 90);
    }
}
