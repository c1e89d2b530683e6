use strum::Display;
use thiserror::Error;

use crate::config::ConfigValidationError;
use crate::model::report::{ReportCode, ValidationReport};
use crate::provider::lotl_cache::LotlCacheError;
use crate::provider::lotl_fetcher::FetcherError;
use crate::service::lotl::ServiceState;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Trusted list validation failed: `{code}`")]
    ValidationFailed {
        code: ReportCode,
        report: ValidationReport,
    },
    #[error("Cache error: `{0}`")]
    Cache(#[from] LotlCacheError),
    #[error("Fetcher error: `{0}`")]
    Fetcher(#[from] FetcherError),
    #[error("Config validation error `{0}`")]
    ConfigValidation(#[from] ConfigValidationError),
    #[error("Operation not allowed in state `{0}`")]
    InvalidState(ServiceState),
    #[error("Refresh of `{0}` failed")]
    CountryRefreshFailed(String),
    #[error("Refresh task failed: `{0}`")]
    RefreshTask(String),
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    UnableToRetrieveLotl,
    LotlValidationUnsuccessful,
    OfficialJournalCertificatesOutdated,
    UnableToRetrievePivot,
    TrustedListValidationFailed,
    StaleData,
    MissingData,
    UnsupportedSnapshotVersion,
    SnapshotEncoding,
    InvalidLotl,
    InvalidConfiguration,
    InvalidState,
    CountryRefreshFailed,
    RefreshTaskFailed,
}

impl ServiceError {
    /// Report failure that decides a failed validation.
    pub(crate) fn validation_failed(report: ValidationReport) -> Self {
        let code = report
            .first_failure()
            .map(|item| item.code)
            .unwrap_or(ReportCode::LotlValidationUnsuccessful);
        Self::ValidationFailed { code, report }
    }

    pub fn error_code(&self) -> ErrorCode {
        match self {
            ServiceError::ValidationFailed { code, .. } => match code {
                ReportCode::UnableToRetrieveLotl => ErrorCode::UnableToRetrieveLotl,
                ReportCode::LotlValidationUnsuccessful => ErrorCode::LotlValidationUnsuccessful,
                ReportCode::OfficialJournalCertificatesOutdated => {
                    ErrorCode::OfficialJournalCertificatesOutdated
                }
                ReportCode::UnableToRetrievePivot => ErrorCode::UnableToRetrievePivot,
                _ => ErrorCode::TrustedListValidationFailed,
            },
            ServiceError::Cache(error) => match error {
                LotlCacheError::StaleData { .. } => ErrorCode::StaleData,
                LotlCacheError::Missing(_) => ErrorCode::MissingData,
                LotlCacheError::UnsupportedVersion(_) => ErrorCode::UnsupportedSnapshotVersion,
                LotlCacheError::Encoding(_) => ErrorCode::SnapshotEncoding,
            },
            ServiceError::Fetcher(_) => ErrorCode::InvalidLotl,
            ServiceError::ConfigValidation(_) => ErrorCode::InvalidConfiguration,
            ServiceError::InvalidState(_) => ErrorCode::InvalidState,
            ServiceError::CountryRefreshFailed(_) => ErrorCode::CountryRefreshFailed,
            ServiceError::RefreshTask(_) => ErrorCode::RefreshTaskFailed,
        }
    }
}
