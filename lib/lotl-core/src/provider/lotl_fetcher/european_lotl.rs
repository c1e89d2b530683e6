use std::sync::Arc;

use super::EuropeanLotlFetcher;
use crate::model::fetch_result::{EuropeanLotl, EuropeanLotlResult, FetchResult};
use crate::model::report::{LOTL_CHECK, ReportCode, ReportItem, ValidationReport};
use crate::proto::resource_retriever::ResourceRetriever;

pub struct EuropeanLotlFetcherImpl {
    retriever: Arc<dyn ResourceRetriever>,
    lotl_url: String,
}

impl EuropeanLotlFetcherImpl {
    pub fn new(retriever: Arc<dyn ResourceRetriever>, lotl_url: impl Into<String>) -> Self {
        Self {
            retriever,
            lotl_url: lotl_url.into(),
        }
    }
}

#[async_trait::async_trait]
impl EuropeanLotlFetcher for EuropeanLotlFetcherImpl {
    async fn fetch(&self) -> EuropeanLotlResult {
        let mut report = ValidationReport::new();
        let failure = ReportItem::invalid(LOTL_CHECK, ReportCode::UnableToRetrieveLotl)
            .with_detail(&self.lotl_url);

        match self.retriever.get_bytes_by_url(&self.lotl_url).await {
            Ok(Some(xml)) if !xml.is_empty() => {
                tracing::debug!("Fetched LOTL from {}", self.lotl_url);
                FetchResult::new(Some(EuropeanLotl { xml }), report)
            }
            Ok(_) => {
                tracing::warn!("LOTL not available at {}", self.lotl_url);
                report.add_report_item(failure);
                FetchResult::empty(report)
            }
            Err(err) => {
                tracing::warn!("LOTL retrieval from {} failed: {err:#}", self.lotl_url);
                report.add_report_item(failure.with_cause(format!("{err:#}")));
                FetchResult::empty(report)
            }
        }
    }
}
