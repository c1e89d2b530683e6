//! Pivot LOTLs and Official Journal markers.
//!
//! The LOTL lists its scheme information URIs newest first. Official Journal
//! publications (`eur-lex.europa.eu`) announce the certificates allowed to sign
//! the LOTL. Pivot LOTLs published after the latest announcement carry the
//! certificate changes since then, each one signed with the certificates its
//! predecessor announced.

use std::sync::Arc;

use super::PivotFetcher;
use crate::model::certificate::Certificate;
use crate::model::fetch_result::{FetchResult, PivotChain, PivotResult};
use crate::model::report::{LOTL_CHECK, PIVOT_CHECK, ReportCode, ReportItem, ValidationReport};
use crate::proto::resource_retriever::ResourceRetriever;
use crate::proto::xml_signature::XmlSignatureValidator;
use crate::provider::trust_list_parser::parse_lotl;

const OFFICIAL_JOURNAL_MARKER: &str = "eur-lex.europa.eu";
const PIVOT_MARKER: &str = "eu-lotl-pivot";

pub fn is_official_journal_uri(uri: &str) -> bool {
    uri.contains(OFFICIAL_JOURNAL_MARKER)
}

pub fn is_pivot_uri(uri: &str) -> bool {
    uri.contains(PIVOT_MARKER)
}

/// Pivots published after the latest Official Journal publication, oldest first.
pub fn pivot_urls(scheme_information_uris: &[String]) -> Vec<String> {
    let mut urls: Vec<String> = scheme_information_uris
        .iter()
        .take_while(|uri| !is_official_journal_uri(uri))
        .filter(|uri| is_pivot_uri(uri))
        .cloned()
        .collect();
    urls.reverse();
    urls
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OfficialJournalStatus {
    /// No publication referenced.
    NotReferenced,
    /// The latest publication is the supported one.
    Current,
    /// Two publications are referenced back to back and the newer one is supported.
    TransitionPeriod { previous: String },
    Outdated { latest: String },
}

pub fn official_journal_status(
    scheme_information_uris: &[String],
    currently_supported_publication: &str,
) -> OfficialJournalStatus {
    let supported = currently_supported_publication.trim();
    let Some(position) = scheme_information_uris
        .iter()
        .position(|uri| is_official_journal_uri(uri))
    else {
        return OfficialJournalStatus::NotReferenced;
    };

    let latest = scheme_information_uris[position].trim();
    if latest != supported {
        return OfficialJournalStatus::Outdated {
            latest: latest.to_owned(),
        };
    }

    match scheme_information_uris.get(position + 1) {
        Some(previous) if is_official_journal_uri(previous) => {
            OfficialJournalStatus::TransitionPeriod {
                previous: previous.trim().to_owned(),
            }
        }
        _ => OfficialJournalStatus::Current,
    }
}

pub struct PivotFetcherImpl {
    retriever: Arc<dyn ResourceRetriever>,
}

impl PivotFetcherImpl {
    pub fn new(retriever: Arc<dyn ResourceRetriever>) -> Self {
        Self { retriever }
    }

    async fn verify_pivot(
        &self,
        url: &str,
        trusted_certificates: Vec<Certificate>,
        report: &mut ValidationReport,
    ) -> Option<Vec<Certificate>> {
        let retrieval_failure =
            ReportItem::invalid(PIVOT_CHECK, ReportCode::UnableToRetrievePivot).with_detail(url);

        let xml = match self.retriever.get_bytes_by_url(url).await {
            Ok(Some(xml)) if !xml.is_empty() => xml,
            Ok(_) => {
                report.add_report_item(retrieval_failure);
                return None;
            }
            Err(err) => {
                report.add_report_item(retrieval_failure.with_cause(format!("{err:#}")));
                return None;
            }
        };

        let signature_report = XmlSignatureValidator::new(trusted_certificates).validate(&xml);
        report.merge(&signature_report);
        if !signature_report.is_valid() {
            tracing::warn!("Pivot {url} signature is not trusted");
            return None;
        }

        match parse_lotl(&xml) {
            Ok(content) => {
                report.add_report_item(
                    ReportItem::info(PIVOT_CHECK, ReportCode::PivotValidated).with_detail(url),
                );
                Some(content.lotl_signing_certificates())
            }
            Err(err) => {
                report.add_report_item(
                    ReportItem::invalid(PIVOT_CHECK, ReportCode::LotlValidationUnsuccessful)
                        .with_detail(url)
                        .with_cause(err),
                );
                None
            }
        }
    }
}

#[async_trait::async_trait]
impl PivotFetcher for PivotFetcherImpl {
    async fn fetch(
        &self,
        lotl_xml: &[u8],
        official_journal_certificates: &[Certificate],
    ) -> PivotResult {
        let mut report = ValidationReport::new();

        let content = match parse_lotl(lotl_xml) {
            Ok(content) => content,
            Err(err) => {
                report.add_report_item(
                    ReportItem::invalid(LOTL_CHECK, ReportCode::LotlValidationUnsuccessful)
                        .with_cause(err),
                );
                return FetchResult::empty(report);
            }
        };

        let pivot_urls = pivot_urls(&content.scheme_information_uris);
        let mut trusted_certificates = official_journal_certificates.to_vec();

        for url in &pivot_urls {
            match self
                .verify_pivot(url, trusted_certificates, &mut report)
                .await
            {
                Some(announced) => trusted_certificates = announced,
                None => return FetchResult::empty(report),
            }
        }

        let signature_report =
            XmlSignatureValidator::new(trusted_certificates.clone()).validate(lotl_xml);
        report.merge(&signature_report);
        if !signature_report.is_valid() {
            report.add_report_item(ReportItem::invalid(
                LOTL_CHECK,
                ReportCode::LotlValidationUnsuccessful,
            ));
            return FetchResult::empty(report);
        }

        tracing::debug!("LOTL verified through {} pivot(s)", pivot_urls.len());
        report.add_report_item(ReportItem::info(LOTL_CHECK, ReportCode::LotlValidated));
        FetchResult::new(
            Some(PivotChain {
                pivot_urls,
                lotl_signing_certificates: trusted_certificates,
            }),
            report,
        )
    }
}
