use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;

use super::{CountrySpecificFetcher, FetcherError};
use crate::config::lotl_config::CountryFilter;
use crate::model::country_lotl::CountrySpecificLotl;
use crate::model::fetch_result::{CountryResult, CountryTrustList, FetchResult};
use crate::model::report::{COUNTRY_LIST_CHECK, ReportCode, ReportItem, ValidationReport};
use crate::proto::resource_retriever::ResourceRetriever;
use crate::proto::xml_signature::XmlSignatureValidator;
use crate::provider::trust_list_parser::{parse_lotl, parse_trust_list};

pub struct CountrySpecificFetcherImpl {
    retriever: Arc<dyn ResourceRetriever>,
    country_filter: CountryFilter,
}

impl CountrySpecificFetcherImpl {
    pub fn new(retriever: Arc<dyn ResourceRetriever>, country_filter: CountryFilter) -> Self {
        Self {
            retriever,
            country_filter,
        }
    }

    async fn fetch_country(&self, pointer: CountrySpecificLotl) -> CountryResult {
        let mut report = ValidationReport::new();
        let country = pointer.scheme_territory.clone();
        let location = format!("{country}: {}", pointer.tsl_location);
        let retrieval_failure =
            ReportItem::invalid(COUNTRY_LIST_CHECK, ReportCode::UnableToRetrieveCountryList)
                .with_detail(&location);

        let xml = match self.retriever.get_bytes_by_url(&pointer.tsl_location).await {
            Ok(Some(xml)) if !xml.is_empty() => xml,
            Ok(_) => {
                tracing::warn!("Trusted list of {location} not available");
                report.add_report_item(retrieval_failure);
                return FetchResult::empty(report);
            }
            Err(err) => {
                tracing::warn!("Trusted list of {location} retrieval failed: {err:#}");
                report.add_report_item(retrieval_failure.with_cause(format!("{err:#}")));
                return FetchResult::empty(report);
            }
        };

        let signature_report =
            XmlSignatureValidator::new(pointer.signing_certificates.clone()).validate(&xml);
        report.merge(&signature_report);
        if !signature_report.is_valid() {
            tracing::warn!("Trusted list of {location} has no trusted signature");
            return FetchResult::empty(report);
        }

        match parse_trust_list(&xml, &country) {
            Ok(trust_list) => {
                tracing::debug!(
                    "Trusted list of {country} provides {} service(s)",
                    trust_list.contexts.len()
                );
                report.add_report_item(
                    ReportItem::info(COUNTRY_LIST_CHECK, ReportCode::CountryListValidated)
                        .with_detail(&country),
                );
                FetchResult::new(
                    Some(CountryTrustList {
                        pointer,
                        contexts: trust_list.contexts,
                    }),
                    report,
                )
            }
            Err(err) => {
                report.add_report_item(
                    ReportItem::invalid(COUNTRY_LIST_CHECK, ReportCode::CountryListParsingFailed)
                        .with_detail(&location)
                        .with_cause(err),
                );
                FetchResult::empty(report)
            }
        }
    }
}

#[async_trait::async_trait]
impl CountrySpecificFetcher for CountrySpecificFetcherImpl {
    async fn fetch(&self, lotl_xml: &[u8]) -> Result<HashMap<String, CountryResult>, FetcherError> {
        let content = parse_lotl(lotl_xml)?;

        let pointers: Vec<CountrySpecificLotl> = content
            .country_pointers()
            .filter(CountrySpecificLotl::is_xml)
            .filter(|pointer| self.country_filter.accepts(&pointer.scheme_territory))
            .collect();

        let results = join_all(pointers.into_iter().map(|pointer| async move {
            let key = pointer.create_unique_identifier();
            (key, self.fetch_country(pointer).await)
        }))
        .await;

        Ok(results.into_iter().collect())
    }
}
