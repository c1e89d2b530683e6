use std::sync::Arc;

use super::{EuropeanResourceFetcher, EuropeanTrustedListConfiguration};
use crate::config::lotl_config::LotlConfig;
use crate::model::certificate::Certificate;
use crate::model::fetch_result::{EuropeanResources, EuropeanResourcesResult, FetchResult};
use crate::model::report::{EU_RESOURCES_CHECK, ReportCode, ReportItem, ValidationReport};

/// Official Journal data taken from [`LotlConfig`]. Certificates are decoded on access.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfiguredEuropeanTrustedList {
    trusted_list_uri: String,
    publication: String,
    certificates: Vec<String>,
}

impl ConfiguredEuropeanTrustedList {
    pub fn new(
        trusted_list_uri: impl Into<String>,
        publication: impl Into<String>,
        certificates: Vec<String>,
    ) -> Self {
        Self {
            trusted_list_uri: trusted_list_uri.into(),
            publication: publication.into(),
            certificates,
        }
    }
}

impl From<&LotlConfig> for ConfiguredEuropeanTrustedList {
    fn from(config: &LotlConfig) -> Self {
        Self::new(
            config.lotl_url.clone(),
            config.official_journal.publication.clone(),
            config.official_journal.certificates.clone(),
        )
    }
}

impl EuropeanTrustedListConfiguration for ConfiguredEuropeanTrustedList {
    fn trusted_list_uri(&self) -> String {
        self.trusted_list_uri.clone()
    }

    fn currently_supported_publication(&self) -> String {
        self.publication.clone()
    }

    fn certificates(&self) -> anyhow::Result<Vec<Certificate>> {
        Ok(self
            .certificates
            .iter()
            .map(|certificate| Certificate::from_base64(certificate))
            .collect::<Result<_, _>>()?)
    }
}

pub struct EuropeanResourceFetcherImpl {
    configuration: Arc<dyn EuropeanTrustedListConfiguration>,
}

impl EuropeanResourceFetcherImpl {
    pub fn new(configuration: Arc<dyn EuropeanTrustedListConfiguration>) -> Self {
        Self { configuration }
    }
}

#[async_trait::async_trait]
impl EuropeanResourceFetcher for EuropeanResourceFetcherImpl {
    async fn fetch(&self) -> EuropeanResourcesResult {
        match self.configuration.certificates() {
            Ok(official_journal_certificates) => FetchResult::new(
                Some(EuropeanResources {
                    official_journal_certificates,
                    currently_supported_publication: self
                        .configuration
                        .currently_supported_publication(),
                }),
                ValidationReport::new(),
            ),
            Err(err) => {
                tracing::warn!("Official Journal configuration unusable: {err:#}");
                let mut report = ValidationReport::new();
                report.add_report_item(
                    ReportItem::invalid(EU_RESOURCES_CHECK, ReportCode::LotlValidationUnsuccessful)
                        .with_cause(format!("{err:#}")),
                );
                FetchResult::empty(report)
            }
        }
    }
}
