use thiserror::Error;

use crate::model::certificate::CertificateError;

pub mod lotl_config;


#[derive(Debug, Error)]
pub enum ConfigParsingError {
    #[error("Config parsing error: `{0}`")]
    GeneralParsingError(String),
}

#[derive(Debug, Error)]
pub enum ConfigValidationError {
    #[error("Cache staleness must be greater than zero")]
    NonPositiveStaleness,
    #[error("Refresh interval must be greater than zero")]
    NonPositiveRefreshInterval,
    #[error("Country allow-list and deny-list cannot be combined")]
    ConflictingCountryFilters,
    #[error("Invalid country code `{0}`")]
    InvalidCountryCode(String),
    #[error("Missing `{0}`")]
    MissingEntry(&'static str),
    #[error("Invalid official journal certificate: `{0}`")]
    InvalidCertificate(#[from] CertificateError),
}
