use std::collections::BTreeSet;

use time::OffsetDateTime;
use x509_parser::certificate::X509Certificate;
use x509_parser::der_parser::ber::BerObject;
use x509_parser::der_parser::der::parse_der_sequence;
use x509_parser::extensions::ParsedExtension;
use x509_parser::oid_registry::{
    OID_X509_EXT_CERTIFICATE_POLICIES, OID_X509_EXT_EXTENDED_KEY_USAGE, OID_X509_EXT_KEY_USAGE,
};

use crate::model::certificate::{Certificate, CertificateError};

pub const QC_STATEMENTS_EXTENSION: &str = "1.3.6.1.5.5.7.1.3";
pub const QC_COMPLIANCE: &str = "0.4.0.1862.1.1";
pub const QC_SSCD: &str = "0.4.0.1862.1.4";
pub const QC_TYPE: &str = "0.4.0.1862.1.6";
pub const QC_TYPE_ESIGN: &str = "0.4.0.1862.1.6.1";
pub const QC_TYPE_ESEAL: &str = "0.4.0.1862.1.6.2";
pub const QC_TYPE_WEB: &str = "0.4.0.1862.1.6.3";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QcStatements {
    pub compliance: bool,
    pub sscd: bool,
    pub types: BTreeSet<String>,
}

/// Certificate content the qualification rules look at.
///
/// `None` means the extension is absent from the certificate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertificateAttributes {
    pub subject_attribute_oids: BTreeSet<String>,
    pub extended_key_usages: Option<BTreeSet<String>>,
    pub policy_ids: Option<BTreeSet<String>>,
    pub key_usage: Option<[bool; 9]>,
    pub qc_statements: QcStatements,
    pub not_before: OffsetDateTime,
}

impl CertificateAttributes {
    pub fn from_certificate(certificate: &Certificate) -> Result<Self, CertificateError> {
        let parsed = certificate.parse()?;

        Ok(Self {
            subject_attribute_oids: parsed
                .subject()
                .iter_attributes()
                .map(|attribute| attribute.attr_type().to_id_string())
                .collect(),
            extended_key_usages: extended_key_usages(&parsed)?,
            policy_ids: policy_ids(&parsed)?,
            key_usage: key_usage(&parsed)?,
            qc_statements: qc_statements(&parsed)?,
            not_before: parsed.validity().not_before.to_datetime(),
        })
    }
}

fn extension_error(name: &str, err: impl std::fmt::Display) -> CertificateError {
    CertificateError::ParsingFailed(format!("failed to get {name}: {err}"))
}

fn extended_key_usages(
    certificate: &X509Certificate,
) -> Result<Option<BTreeSet<String>>, CertificateError> {
    let Some(extension) = certificate
        .get_extension_unique(&OID_X509_EXT_EXTENDED_KEY_USAGE)
        .map_err(|err| extension_error("extended key usage", err))?
    else {
        return Ok(None);
    };

    let ParsedExtension::ExtendedKeyUsage(usage) = extension.parsed_extension() else {
        return Err(CertificateError::ParsingFailed(
            "Encountered unexpected extension while looking for extended key usage".to_string(),
        ));
    };

    let mut usages: BTreeSet<String> = usage.other.iter().map(|oid| oid.to_id_string()).collect();
    for (present, oid) in [
        (usage.any, "2.5.29.37.0"),
        (usage.server_auth, "1.3.6.1.5.5.7.3.1"),
        (usage.client_auth, "1.3.6.1.5.5.7.3.2"),
        (usage.code_signing, "1.3.6.1.5.5.7.3.3"),
        (usage.email_protection, "1.3.6.1.5.5.7.3.4"),
        (usage.time_stamping, "1.3.6.1.5.5.7.3.8"),
        (usage.ocsp_signing, "1.3.6.1.5.5.7.3.9"),
    ] {
        if present {
            usages.insert(oid.to_owned());
        }
    }
    Ok(Some(usages))
}

fn policy_ids(certificate: &X509Certificate) -> Result<Option<BTreeSet<String>>, CertificateError> {
    let Some(extension) = certificate
        .get_extension_unique(&OID_X509_EXT_CERTIFICATE_POLICIES)
        .map_err(|err| extension_error("certificate policies", err))?
    else {
        return Ok(None);
    };

    match extension.parsed_extension() {
        ParsedExtension::CertificatePolicies(policies) => Ok(Some(
            policies
                .iter()
                .map(|policy| policy.policy_id.to_id_string())
                .collect(),
        )),
        _ => Err(CertificateError::ParsingFailed(
            "Encountered unexpected extension while looking for certificate policies".to_string(),
        )),
    }
}

fn key_usage(certificate: &X509Certificate) -> Result<Option<[bool; 9]>, CertificateError> {
    let Some(extension) = certificate
        .get_extension_unique(&OID_X509_EXT_KEY_USAGE)
        .map_err(|err| extension_error("key usage", err))?
    else {
        return Ok(None);
    };

    match extension.parsed_extension() {
        ParsedExtension::KeyUsage(usage) => Ok(Some([
            usage.digital_signature(),
            usage.non_repudiation(),
            usage.key_encipherment(),
            usage.data_encipherment(),
            usage.key_agreement(),
            usage.key_cert_sign(),
            usage.crl_sign(),
            usage.encipher_only(),
            usage.decipher_only(),
        ])),
        _ => Err(CertificateError::ParsingFailed(
            "Encountered unexpected extension while looking for key usage".to_string(),
        )),
    }
}

/// Reads the ETSI EN 319 412-5 statements.
fn qc_statements(certificate: &X509Certificate) -> Result<QcStatements, CertificateError> {
    let mut result = QcStatements::default();
    let Some(extension) = certificate
        .extensions()
        .iter()
        .find(|extension| extension.oid.to_id_string() == QC_STATEMENTS_EXTENSION)
    else {
        return Ok(result);
    };

    let (_, statements) = parse_der_sequence(extension.value)
        .map_err(|err| extension_error("QC statements", err))?;

    for statement in sequence(&statements)? {
        let fields = sequence(statement)?;
        let Some(statement_id) = fields.first() else {
            continue;
        };
        let statement_id = statement_id
            .as_oid()
            .map_err(|err| extension_error("QC statement id", err))?
            .to_id_string();

        match statement_id.as_str() {
            QC_COMPLIANCE => result.compliance = true,
            QC_SSCD => result.sscd = true,
            QC_TYPE => {
                if let Some(types) = fields.get(1) {
                    for qc_type in sequence(types)? {
                        result.types.insert(
                            qc_type
                                .as_oid()
                                .map_err(|err| extension_error("QC type", err))?
                                .to_id_string(),
                        );
                    }
                }
            }
            _ => {}
        }
    }

    Ok(result)
}

fn sequence<'a, 'b>(object: &'b BerObject<'a>) -> Result<&'b Vec<BerObject<'a>>, CertificateError> {
    object
        .as_sequence()
        .map_err(|err| extension_error("QC statements sequence", err))
}
