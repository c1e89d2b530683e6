//! Aggregated validation of the European part of the cache and access to the
//! national trusted certificates.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::config::lotl_config::CountryFilter;
use crate::model::certificate::Certificate;
use crate::model::fetch_result::{
    CountryResult, EuropeanLotlResult, EuropeanResourcesResult, FetchResult, PivotResult,
};
use crate::model::report::{
    COUNTRY_LIST_CHECK, EU_RESOURCES_CHECK, LOTL_CHECK, PIVOT_CHECK, ReportCode, ReportItem, ValidationReport,
};
use crate::provider::lotl_cache::{LotlCache, LotlCacheError, LotlCacheUpdate};
use crate::provider::lotl_fetcher::pivot::{OfficialJournalStatus, official_journal_status};
use crate::provider::trust_list_parser::parse_lotl;


pub struct TrustListValidator {
    cache: Arc<LotlCache>,
    country_filter: CountryFilter,
}

impl TrustListValidator {
    pub fn new(cache: Arc<LotlCache>, country_filter: CountryFilter) -> Self {
        Self {
            cache,
            country_filter,
        }
    }

    /// Validates freshly fetched results before they are committed.
    pub fn validate_fetched_data(&self, update: &LotlCacheUpdate) -> ValidationReport {
        aggregate(
            Ok(&update.european_lotl),
            Ok(&update.european_resources),
            Ok(&update.pivot),
        )
    }

    /// Validates what the cache currently holds. Missing or stale data is reported as invalid,
    /// stale national lists with one item each.
    pub fn validate(&self) -> ValidationReport {
        let european_lotl = self.cache.get_european_lotl();
        let european_resources = self.cache.get_european_resources();
        let pivot = self.cache.get_pivot();

        let mut report = aggregate(
            european_lotl.as_ref(),
            european_resources.as_ref(),
            pivot.as_ref(),
        );
        for key in self.cache.get_country_results().stale {
            report.add_report_item(
                ReportItem::invalid(COUNTRY_LIST_CHECK, ReportCode::TrustedListOutdated)
                    .with_detail(&key),
            );
        }
        report
    }

    /// Certificates of all fresh national services of accepted countries,
    /// without duplicates and ordered by country key.
    ///
    /// Stale lists are skipped, so one outdated country does not hide the others.
    pub fn get_national_trusted_certificates(&self) -> Vec<Certificate> {
        let results = self.cache.get_country_results();
        for key in &results.stale {
            tracing::warn!("Skipping stale national trusted list {key}");
        }
        let countries: BTreeMap<String, CountryResult> = results.fresh.into_iter().collect();

        let mut seen = HashSet::new();
        countries
            .into_iter()
            .filter_map(|(_, result)| result.payload)
            .filter(|trust_list| {
                self.country_filter
                    .accepts(&trust_list.pointer.scheme_territory)
            })
            .flat_map(|trust_list| trust_list.contexts)
            .flat_map(|context| context.certificates().to_vec())
            .filter(|certificate| seen.insert(certificate.fingerprint()))
            .collect()
    }
}

fn aggregate(
    european_lotl: Result<&EuropeanLotlResult, &LotlCacheError>,
    european_resources: Result<&EuropeanResourcesResult, &LotlCacheError>,
    pivot: Result<&PivotResult, &LotlCacheError>,
) -> ValidationReport {
    let mut report = ValidationReport::new();

    let lotl_xml = match european_lotl {
        Ok(result) => {
            report.merge(&result.report);
            if result.payload.is_none() && !has_failure(result) {
                report.add_report_item(ReportItem::invalid(
                    LOTL_CHECK,
                    ReportCode::UnableToRetrieveLotl,
                ));
            }
            result.payload.as_ref().map(|lotl| lotl.xml.as_slice())
        }
        Err(error) => {
            report.add_report_item(
                ReportItem::invalid(LOTL_CHECK, ReportCode::UnableToRetrieveLotl).with_cause(error),
            );
            None
        }
    };

    let resources = match european_resources {
        Ok(result) => {
            report.merge(&result.report);
            match &result.payload {
                Some(resources) if resources.official_journal_certificates.is_empty() => {
                    report.add_report_item(ReportItem::invalid(
                        EU_RESOURCES_CHECK,
                        ReportCode::OfficialJournalCertificatesOutdated,
                    ));
                }
                Some(_) => {}
                None if has_failure(result) => {}
                None => report.add_report_item(ReportItem::invalid(
                    EU_RESOURCES_CHECK,
                    ReportCode::LotlValidationUnsuccessful,
                )),
            }
            result.payload.as_ref()
        }
        Err(error) => {
            report.add_report_item(
                ReportItem::invalid(EU_RESOURCES_CHECK, ReportCode::LotlValidationUnsuccessful)
                    .with_cause(error),
            );
            None
        }
    };

    if let (Some(xml), Some(resources)) = (lotl_xml, resources) {
        check_official_journal(&mut report, xml, &resources.currently_supported_publication);
    }

    match pivot {
        Ok(result) => {
            report.merge(&result.report);
            if result.payload.is_none() && !has_failure(result) {
                report.add_report_item(ReportItem::invalid(
                    PIVOT_CHECK,
                    ReportCode::LotlValidationUnsuccessful,
                ));
            }
        }
        Err(error) => report.add_report_item(
            ReportItem::invalid(PIVOT_CHECK, ReportCode::LotlValidationUnsuccessful)
                .with_cause(error),
        ),
    }

    report
}

fn has_failure<T>(result: &FetchResult<T>) -> bool {
    !result.report.is_valid()
}

fn check_official_journal(report: &mut ValidationReport, lotl_xml: &[u8], supported: &str) {
    let uris = match parse_lotl(lotl_xml) {
        Ok(content) => content.scheme_information_uris,
        Err(error) => {
            report.add_report_item(
                ReportItem::invalid(LOTL_CHECK, ReportCode::LotlValidationUnsuccessful)
                    .with_cause(error),
            );
            return;
        }
    };

    match official_journal_status(&uris, supported) {
        OfficialJournalStatus::NotReferenced | OfficialJournalStatus::Current => {}
        OfficialJournalStatus::TransitionPeriod { previous } => {
            tracing::info!("Official Journal transition from {previous} to {supported}");
            report.add_report_item(
                ReportItem::info(EU_RESOURCES_CHECK, ReportCode::OjTransitionPeriod)
                    .with_detail(supported),
            );
        }
        OfficialJournalStatus::Outdated { latest } => {
            tracing::warn!("LOTL references Official Journal {latest}, supported is {supported}");
            report.add_report_item(
                ReportItem::invalid(
                    EU_RESOURCES_CHECK,
                    ReportCode::OfficialJournalCertificatesOutdated,
                )
                .with_detail(latest),
            );
        }
    }
}
