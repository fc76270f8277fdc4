use std::net::IpAddr;
use std::time::Duration as StdDuration;

use bon::Builder;
use const_oid::ObjectIdentifier;
use der::Any;
use der::Tag;
use der::Tagged;
use der::DateTime;
use der::asn1::{GeneralizedTime, PrintableStringRef, SetOfVec, UtcTime, Utf8StringRef};
use time::Duration;
use time::OffsetDateTime;
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::name::{Name, RdnSequence, RelativeDistinguishedName};
use x509_cert::time::Time;

use super::extensions::ToAndFromX509Extension;
pub use crate::cert::extensions::ExtendedKeyUsage;
pub use crate::cert::extensions::ExtendedKeyUsageOption;
use crate::error::CaError;

/// Number of days a certificate is valid for when the template does not say.
pub const DEFAULT_VALIDITY_DAYS: i64 = 30;

const COUNTRY: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.6");
const STATE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.8");
const LOCALITY: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.7");
const ORGANIZATION: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.10");
const ORGANIZATION_UNIT: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.11");
const COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");

/// Parameters for building an X.509 certificate.
///
/// Unset fields are filled in at signing time: the serial number is drawn at
/// random and the subject key identifier is derived from the subject public
/// key. When a certificate is issued for a request, an empty subject or an
/// empty list of alternative names is taken from the request.
///
/// # Fields
/// * `subject` - The distinguished name of the certificate subject.
/// * `dns_names`, `email_addresses`, `ip_addresses` - Subject alternative names.
/// * `validity` - The validity window.
/// * `is_ca` - Indicates if the certificate may sign other certificates.
/// * `max_path_len` - Path length constraint, only allowed on CA certificates.
/// * `serial_number` - Big-endian serial number.
/// * `subject_key_id` - Subject key identifier.
/// * `usages` - A list of extended key usage options.
/// * `extensions` - Additional X.509 extensions.
#[derive(Clone, Debug, Builder)]
pub struct CertificateTemplate {
    #[builder(default)]
    pub subject: DistinguishedName,
    #[builder(default)]
    pub dns_names: Vec<String>,
    #[builder(default)]
    pub email_addresses: Vec<String>,
    #[builder(default)]
    pub ip_addresses: Vec<IpAddr>,
    #[builder(default = Validity::for_days(DEFAULT_VALIDITY_DAYS))]
    pub validity: Validity,
    #[builder(default)]
    pub is_ca: bool,
    pub max_path_len: Option<u8>,
    pub serial_number: Option<Vec<u8>>,
    pub subject_key_id: Option<Vec<u8>>,
    #[builder(default)]
    pub usages: Vec<ExtendedKeyUsageOption>,
    #[builder(default)]
    pub extensions: Vec<ExtensionParam>,
}

impl Default for CertificateTemplate {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Parameters for building a certificate signing request.
#[derive(Clone, Debug, Default, Builder)]
pub struct CertificateRequestTemplate {
    #[builder(default)]
    pub subject: DistinguishedName,
    #[builder(default)]
    pub dns_names: Vec<String>,
    #[builder(default)]
    pub email_addresses: Vec<String>,
    #[builder(default)]
    pub ip_addresses: Vec<IpAddr>,
    #[builder(default)]
    pub extensions: Vec<ExtensionParam>,
}

/// Distinguished name parameters for building an X.509 certificate.
///
/// This struct represents the subject or issuer name in a certificate.
///
/// # Fields
/// * `common_name` - The common name (CN).
/// * `country` - The country (C).
/// * `state` - The state or province (ST).
/// * `locality` - The locality or city (L).
/// * `organization` - The organization (O).
/// * `organization_unit` - The organizational unit (OU).
#[derive(Clone, Debug, Builder, Default, PartialEq, Eq)]
pub struct DistinguishedName {
    pub common_name: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub locality: Option<String>,
    pub organization: Option<String>,
    pub organization_unit: Option<String>,
}

impl DistinguishedName {
    /// Reports whether no attribute is set.
    pub fn is_empty(&self) -> bool {
        self.attributes().next().is_none()
    }

    // Same order as the RDN sequence the name encodes to.
    fn attributes(&self) -> impl Iterator<Item = (ObjectIdentifier, &str)> {
        [
            (COUNTRY, &self.country),
            (STATE, &self.state),
            (LOCALITY, &self.locality),
            (ORGANIZATION, &self.organization),
            (ORGANIZATION_UNIT, &self.organization_unit),
            (COMMON_NAME, &self.common_name),
        ]
        .into_iter()
        .filter_map(|(oid, value)| value.as_deref().map(|v| (oid, v)))
    }

    /// Converts the distinguished name to an X.509-compatible format.
    ///
    /// Unset attributes are omitted. The country is encoded as a
    /// PrintableString, everything else as UTF8String.
    pub fn as_x509_name(&self) -> Result<Name, CaError> {
        let invalid = |e: der::Error| CaError::InvalidInput(format!("invalid name attribute: {e}"));
        let mut rdns = Vec::new();
        for (oid, value) in self.attributes() {
            let value = if oid == COUNTRY {
                Any::encode_from(&PrintableStringRef::new(value).map_err(invalid)?)
            } else {
                Any::encode_from(&Utf8StringRef::new(value).map_err(invalid)?)
            }
            .map_err(invalid)?;
            let attribute = AttributeTypeAndValue { oid, value };
            rdns.push(RelativeDistinguishedName(
                SetOfVec::try_from(vec![attribute]).map_err(invalid)?,
            ));
        }
        Ok(RdnSequence(rdns))
    }

    /// Creates a `DistinguishedName` from an X.509-compatible format.
    ///
    /// Attributes other than the six named fields are ignored. When an
    /// attribute repeats, the last value wins.
    pub fn from_x509_name(x509dn: &Name) -> Self {
        let mut dn = DistinguishedName::default();
        for rdn in x509dn.0.iter() {
            for attr in rdn.0.iter() {
                let Some(value) = attribute_string(&attr.value) else {
                    continue;
                };
                let field = match attr.oid {
                    COMMON_NAME => &mut dn.common_name,
                    COUNTRY => &mut dn.country,
                    STATE => &mut dn.state,
                    LOCALITY => &mut dn.locality,
                    ORGANIZATION => &mut dn.organization,
                    ORGANIZATION_UNIT => &mut dn.organization_unit,
                    _ => continue,
                };
                *field = Some(value);
            }
        }
        dn
    }
}

fn attribute_string(value: &Any) -> Option<String> {
    match value.tag() {
        Tag::Utf8String | Tag::PrintableString | Tag::Ia5String | Tag::TeletexString => {
            String::from_utf8(value.value().to_vec()).ok()
        }
        _ => None,
    }
}

/// Certificate validity period.
///
/// This struct represents the `notBefore` and `notAfter` fields in a certificate.
///
/// # Fields
/// * `not_before` - The start of the validity period.
/// * `not_after` - The end of the validity period.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Validity {
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
}

impl Validity {
    /// Creates a validity period starting now for the given number of days.
    ///
    /// # Arguments
    /// * `days` - The number of days for the validity period.
    ///
    /// # Returns
    /// A `Validity` object.
    pub fn for_days(days: i64) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            not_before: now,
            not_after: now + Duration::days(days),
        }
    }

    /// Converts to the X.509 representation, truncated to whole seconds.
    pub(crate) fn to_x509_validity(&self) -> Result<x509_cert::time::Validity, CaError> {
        Ok(x509_cert::time::Validity {
            not_before: to_x509_time(self.not_before)?,
            not_after: to_x509_time(self.not_after)?,
        })
    }

    pub(crate) fn from_x509_validity(validity: &x509_cert::time::Validity) -> Self {
        Self {
            not_before: from_x509_time(&validity.not_before),
            not_after: from_x509_time(&validity.not_after),
        }
    }
}

// UTCTime through 2049, GeneralizedTime afterwards (RFC 5280, 4.1.2.5).
fn to_x509_time(t: OffsetDateTime) -> Result<Time, CaError> {
    let invalid = |e: der::Error| CaError::InvalidInput(format!("time {t} cannot be encoded: {e}"));
    let secs = u64::try_from(t.unix_timestamp())
        .map_err(|_| CaError::InvalidInput(format!("time {t} is before 1970")))?;
    let date_time = DateTime::from_unix_duration(StdDuration::from_secs(secs)).map_err(invalid)?;
    if date_time.year() < 2050 {
        Ok(Time::UtcTime(
            UtcTime::from_date_time(date_time).map_err(invalid)?,
        ))
    } else {
        Ok(Time::GeneralTime(GeneralizedTime::from_date_time(date_time)))
    }
}

fn from_x509_time(t: &Time) -> OffsetDateTime {
    match t {
        Time::UtcTime(ut) => OffsetDateTime::from(ut.to_system_time()),
        Time::GeneralTime(gt) => OffsetDateTime::from(gt.to_system_time()),
    }
}

/// Represents an X.509 extension.
///
/// This struct contains the OID, criticality, and value of an extension.
///
/// # Fields
/// * `oid` - The object identifier of the extension.
/// * `critical` - Indicates if the extension is critical.
/// * `value` - The DER-encoded value of the extension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtensionParam {
    pub oid: ObjectIdentifier,
    pub critical: bool,
    /// DER-encoded extension value
    pub value: Vec<u8>,
}

impl ExtensionParam {
    /// Creates an `ExtensionParam` from a specific extension.
    ///
    /// # Arguments
    /// * `extension` - The extension to encode.
    /// * `critical` - Indicates if the extension is critical.
    pub fn from_extension<E: ToAndFromX509Extension>(
        extension: &E,
        critical: bool,
    ) -> Result<Self, CaError> {
        Ok(Self {
            oid: E::OID,
            critical,
            value: extension.to_x509_extension_value()?,
        })
    }

    /// Decodes an `ExtensionParam` into a specific extension.
    ///
    /// # Returns
    /// A decoded extension object.
    pub fn to_extension<E: ToAndFromX509Extension>(&self) -> Result<E, CaError> {
        E::from_x509_extension_value(&self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_round_trip() {
        let dn = DistinguishedName::builder()
            .common_name("crabs.crabs".to_string())
            .organization("Crab widgits SE".to_string())
            .country("SE".to_string())
            .build();
        let name = dn.as_x509_name().unwrap();
        assert_eq!(name.0.len(), 3);
        assert_eq!(DistinguishedName::from_x509_name(&name), dn);
    }

    #[test]
    fn test_empty_name() {
        let dn = DistinguishedName::default();
        assert!(dn.is_empty());
        assert!(dn.as_x509_name().unwrap().0.is_empty());
    }

    #[test]
    fn test_country_must_be_printable() {
        let dn = DistinguishedName::builder().country("S@".to_string()).build();
        assert!(matches!(dn.as_x509_name(), Err(CaError::InvalidInput(_))));
    }

    #[test]
    fn test_validity_truncates_to_seconds() {
        let validity = Validity::for_days(1);
        let x509 = validity.to_x509_validity().unwrap();
        let back = Validity::from_x509_validity(&x509);
        assert_eq!(
            back.not_before.unix_timestamp(),
            validity.not_before.unix_timestamp()
        );
        assert_eq!(back.not_after - back.not_before, Duration::days(1));
    }

    #[test]
    fn test_template_defaults() {
        let template = CertificateTemplate::default();
        assert!(template.subject.is_empty());
        assert!(template.serial_number.is_none());
        assert!(!template.is_ca);
        assert_eq!(
            template.validity.not_after - template.validity.not_before,
            Duration::days(DEFAULT_VALIDITY_DAYS)
        );
    }
}
