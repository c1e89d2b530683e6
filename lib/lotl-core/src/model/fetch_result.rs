use serde::{Deserialize, Serialize};

use super::certificate::Certificate;
use super::country_lotl::CountrySpecificLotl;
use super::report::ValidationReport;
use super::service_context::ServiceContext;

/// Outcome of one fetcher run. `payload` is `None` when nothing usable was produced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResult<T> {
    pub payload: Option<T>,
    pub report: ValidationReport,
}

impl<T> FetchResult<T> {
    pub fn new(payload: Option<T>, report: ValidationReport) -> Self {
        Self { payload, report }
    }

    pub fn empty(report: ValidationReport) -> Self {
        Self {
            payload: None,
            report,
        }
    }

    /// A result that may replace a cached one.
    pub fn is_committable(&self) -> bool {
        self.payload.is_some() && self.report.is_valid()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EuropeanLotl {
    pub xml: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PivotChain {
    /// Pivot URLs processed, oldest first.
    pub pivot_urls: Vec<String>,
    /// Certificates that verified the main LOTL.
    pub lotl_signing_certificates: Vec<Certificate>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EuropeanResources {
    pub official_journal_certificates: Vec<Certificate>,
    pub currently_supported_publication: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryTrustList {
    pub pointer: CountrySpecificLotl,
    pub contexts: Vec<ServiceContext>,
}

pub type EuropeanLotlResult = FetchResult<EuropeanLotl>;
pub type PivotResult = FetchResult<PivotChain>;
pub type EuropeanResourcesResult = FetchResult<EuropeanResources>;
pub type CountryResult = FetchResult<CountryTrustList>;
