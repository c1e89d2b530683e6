use serde::{Deserialize, Serialize};
use strum::Display;

pub const XML_SIGNATURE_CHECK: &str = "XML signature verification";
pub const LOTL_CHECK: &str = "LOTL validation";
pub const PIVOT_CHECK: &str = "Pivot validation";
pub const EU_RESOURCES_CHECK: &str = "EU Official Journal certificates";
pub const COUNTRY_LIST_CHECK: &str = "National trusted list validation";
pub const TRUSTED_STORE_CHECK: &str = "Trusted store certificate check";
pub const QUALIFICATION_CHECK: &str = "Qualification check";

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportItemStatus {
    Info,
    Invalid,
}

/// Stable identifier of a report message.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportCode {
    UnableToRetrieveLotl,
    LotlValidationUnsuccessful,
    LotlValidated,
    OfficialJournalCertificatesOutdated,
    OjTransitionPeriod,
    UnableToRetrievePivot,
    PivotValidated,
    XmlSignatureVerified,
    XmlSignatureVerificationFailed,
    XmlSignatureVerificationException,
    UnableToRetrieveCountryList,
    CountryListValidated,
    CountryListParsingFailed,
    CountryRefreshFailed,
    CertificateTrusted,
    CertificateNotYetValid,
    CertificateRevoked,
    ServiceTypeNotRecognized,
    ScopeSpecifiedWithInvalidTypes,
    QualificationConflict,
    QualificationDetermined,
    QualifiedServiceNotFound,
    UnreadableCertificate,
    TrustedListOutdated,
}

impl ReportCode {
    pub const fn msg(&self) -> &'static str {
        match self {
            ReportCode::UnableToRetrieveLotl => "Unable to retrieve the List of Trusted Lists",
            ReportCode::LotlValidationUnsuccessful => {
                "List of Trusted Lists validation was unsuccessful"
            }
            ReportCode::LotlValidated => "List of Trusted Lists signature is valid",
            ReportCode::OfficialJournalCertificatesOutdated => {
                "Official Journal certificates are outdated"
            }
            ReportCode::OjTransitionPeriod => {
                "A new Official Journal publication is in its transition period"
            }
            ReportCode::UnableToRetrievePivot => "Unable to retrieve pivot",
            ReportCode::PivotValidated => "Pivot signature is valid",
            ReportCode::XmlSignatureVerified => "XML signature is valid",
            ReportCode::XmlSignatureVerificationFailed => "XML signature verification failed",
            ReportCode::XmlSignatureVerificationException => {
                "Exception during XML signature verification"
            }
            ReportCode::UnableToRetrieveCountryList => "Unable to retrieve national trusted list",
            ReportCode::CountryListValidated => "National trusted list signature is valid",
            ReportCode::CountryListParsingFailed => "Unable to parse national trusted list",
            ReportCode::CountryRefreshFailed => "National trusted list refresh failed",
            ReportCode::CertificateTrusted => "Certificate is trusted",
            ReportCode::CertificateNotYetValid => "Trusted service is not yet valid",
            ReportCode::CertificateRevoked => "Trusted service is revoked",
            ReportCode::ServiceTypeNotRecognized => {
                "Service type is not recognized for the certificate usage"
            }
            ReportCode::ScopeSpecifiedWithInvalidTypes => {
                "Service scope is incompatible with the certificate usage"
            }
            ReportCode::QualificationConflict => "Conflicting qualification information",
            ReportCode::QualificationDetermined => "Qualification determined",
            ReportCode::QualifiedServiceNotFound => {
                "No trusted service issuing qualified certificates found"
            }
            ReportCode::UnreadableCertificate => "Unable to read certificate content",
            ReportCode::TrustedListOutdated => "Trusted list data is older than allowed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportItem {
    pub check_name: String,
    pub code: ReportCode,
    pub message: String,
    pub status: ReportItemStatus,
    pub cause: Option<String>,
}

impl ReportItem {
    pub fn info(check_name: &str, code: ReportCode) -> Self {
        Self::new(check_name, code, ReportItemStatus::Info)
    }

    pub fn invalid(check_name: &str, code: ReportCode) -> Self {
        Self::new(check_name, code, ReportItemStatus::Invalid)
    }

    fn new(check_name: &str, code: ReportCode, status: ReportItemStatus) -> Self {
        Self {
            check_name: check_name.to_owned(),
            code,
            message: code.msg().to_owned(),
            status,
            cause: None,
        }
    }

    /// Appends a detail (URL, subject, country) to the message.
    pub fn with_detail(mut self, detail: impl AsRef<str>) -> Self {
        self.message = format!("{}: {}", self.message, detail.as_ref());
        self
    }

    pub fn with_cause(mut self, cause: impl ToString) -> Self {
        self.cause = Some(cause.to_string());
        self
    }

    pub fn is_invalid(&self) -> bool {
        self.status == ReportItemStatus::Invalid
    }
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationResult {
    Valid,
    Invalid,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    items: Vec<ReportItem>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_report_item(&mut self, item: ReportItem) {
        self.items.push(item);
    }

    pub fn merge(&mut self, other: &ValidationReport) {
        self.items.extend(other.items.iter().cloned());
    }

    pub fn items(&self) -> &[ReportItem] {
        &self.items
    }

    pub fn failures(&self) -> impl Iterator<Item = &ReportItem> {
        self.items.iter().filter(|item| item.is_invalid())
    }

    pub fn validation_result(&self) -> ValidationResult {
        if self.items.iter().any(ReportItem::is_invalid) {
            ValidationResult::Invalid
        } else {
            ValidationResult::Valid
        }
    }

    pub fn is_valid(&self) -> bool {
        self.validation_result() == ValidationResult::Valid
    }

    pub fn contains(&self, code: ReportCode) -> bool {
        self.items.iter().any(|item| item.code == code)
    }

    pub fn first_failure(&self) -> Option<&ReportItem> {
        self.failures().next()
    }
}
