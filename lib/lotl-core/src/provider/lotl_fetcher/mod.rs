//! Fetchers for the four cached categories: the European LOTL, its pivot chain,
//! the Official Journal resources and the national trusted lists.

use std::collections::HashMap;

use thiserror::Error;

use crate::model::certificate::Certificate;
use crate::model::fetch_result::{
    CountryResult, EuropeanLotlResult, EuropeanResourcesResult, PivotResult,
};
use crate::provider::trust_list_parser::TrustListParseError;

pub mod country_specific;
pub mod european_lotl;
pub mod european_resource;
pub mod pivot;


#[derive(Debug, Error)]
pub enum FetcherError {
    #[error("LOTL content cannot be parsed: `{0}`")]
    LotlParsing(#[from] TrustListParseError),
}

#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait::async_trait]
pub trait EuropeanLotlFetcher: Send + Sync {
    async fn fetch(&self) -> EuropeanLotlResult;
}

#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait::async_trait]
pub trait PivotFetcher: Send + Sync {
    /// Walks the pivot chain announced by `lotl_xml`, starting from the Official Journal certificates.
    async fn fetch(
        &self,
        lotl_xml: &[u8],
        official_journal_certificates: &[Certificate],
    ) -> PivotResult;
}

#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait::async_trait]
pub trait EuropeanResourceFetcher: Send + Sync {
    async fn fetch(&self) -> EuropeanResourcesResult;
}

#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait::async_trait]
pub trait CountrySpecificFetcher: Send + Sync {
    /// Results keyed by [`crate::model::country_lotl::CountrySpecificLotl::create_unique_identifier`].
    async fn fetch(&self, lotl_xml: &[u8]) -> Result<HashMap<String, CountryResult>, FetcherError>;
}

/// Source of the Official Journal publication data.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
pub trait EuropeanTrustedListConfiguration: Send + Sync {
    fn trusted_list_uri(&self) -> String;
    fn currently_supported_publication(&self) -> String;
    fn certificates(&self) -> anyhow::Result<Vec<Certificate>>;
}
