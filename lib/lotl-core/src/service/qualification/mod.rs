//! Qualification of signing certificates against the trusted services they chain to.

use std::collections::BTreeSet;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use time::OffsetDateTime;

use self::rules::{ConflictingField, Qualification};
use crate::model::certificate::Certificate;
use crate::model::qualification::{QualificationConclusion, QualificationValidationResult};
use crate::model::report::{QUALIFICATION_CHECK, ReportCode, ReportItem, ValidationReport};
use crate::model::service_context::{ServiceContext, service_type};
use crate::service::trusted_store::{CertificateSource, TrustedStore};
use crate::util::x509::CertificateAttributes;

pub mod rules;


#[derive(Clone, Debug)]
pub struct SignatureQualificationRequest {
    pub signing_certificate: Certificate,
    /// Issuers of the signing certificate, closest first.
    pub certificate_chain: Vec<Certificate>,
    pub signing_time: OffsetDateTime,
}

/// Computes qualification conclusions and keeps them per signature id.
pub struct QualificationService {
    trusted_store: Arc<TrustedStore>,
    results: Mutex<IndexMap<String, QualificationValidationResult>>,
}

impl QualificationService {
    pub fn new(trusted_store: Arc<TrustedStore>) -> Self {
        Self {
            trusted_store,
            results: Mutex::new(IndexMap::new()),
        }
    }

    /// Determines the qualification of one signature and stores it under `signature_id`,
    /// replacing an earlier result for the same id.
    #[tracing::instrument(level = "debug", skip(self, request))]
    pub fn start_signature_validation(
        &self,
        signature_id: &str,
        request: &SignatureQualificationRequest,
    ) -> QualificationValidationResult {
        let result = self.determine(request);
        tracing::debug!("Qualification of {signature_id}: {}", result.conclusion);

        self.results
            .lock()
            .insert(signature_id.to_owned(), result.clone());
        result
    }

    pub fn obtain_qualification_validation_result_for_signature(
        &self,
        signature_id: &str,
    ) -> Option<QualificationValidationResult> {
        self.results.lock().get(signature_id).cloned()
    }

    /// All stored results in the order the signatures were first validated.
    pub fn obtain_all_results(&self) -> IndexMap<String, QualificationValidationResult> {
        self.results.lock().clone()
    }

    pub fn determine(&self, request: &SignatureQualificationRequest) -> QualificationValidationResult {
        let mut report = ValidationReport::new();

        let attributes = match CertificateAttributes::from_certificate(&request.signing_certificate)
        {
            Ok(attributes) => attributes,
            Err(error) => {
                report.add_report_item(
                    ReportItem::invalid(QUALIFICATION_CHECK, ReportCode::UnreadableCertificate)
                        .with_cause(error),
                );
                return QualificationValidationResult {
                    conclusion: QualificationConclusion::Unknown,
                    service_name: None,
                    report,
                };
            }
        };

        let services = self.qualified_services(&mut report, request);
        let Some(first_service) = services.first() else {
            let known = request
                .certificate_chain
                .iter()
                .any(|certificate| !self.trusted_store.contexts_for(certificate).is_empty());
            report.add_report_item(ReportItem::info(
                QUALIFICATION_CHECK,
                ReportCode::QualifiedServiceNotFound,
            ));
            return QualificationValidationResult {
                conclusion: if report.contains(ReportCode::TrustedListOutdated) {
                    QualificationConclusion::Unknown
                } else if known {
                    QualificationConclusion::NotQualified
                } else {
                    QualificationConclusion::NotApplicable
                },
                service_name: None,
                report,
            };
        };
        let service_name = first_service.service_name().map(ToOwned::to_owned);

        let baseline = rules::baseline(&attributes);
        let per_service: Vec<Qualification> = services
            .iter()
            .map(|service| {
                let qualifiers = matching_qualifiers(service, &attributes, request.signing_time);
                let (qualification, conflicts) = rules::apply_overrules(baseline, &qualifiers);
                add_conflicts(&mut report, service.service_name(), &conflicts);
                qualification
            })
            .collect();

        let (merged, conflicts) = rules::merge_services(&per_service);
        add_conflicts(&mut report, None, &conflicts);

        let conclusion = merged
            .as_ref()
            .map_or(QualificationConclusion::Unknown, rules::conclusion);
        report.add_report_item(
            ReportItem::info(QUALIFICATION_CHECK, ReportCode::QualificationDetermined)
                .with_detail(conclusion.to_string()),
        );

        QualificationValidationResult {
            conclusion,
            service_name,
            report,
        }
    }

    /// Trusted CA/QC services of the chain at signing time, without duplicates.
    fn qualified_services(
        &self,
        report: &mut ValidationReport,
        request: &SignatureQualificationRequest,
    ) -> Vec<ServiceContext> {
        let mut services: Vec<ServiceContext> = vec![];
        for certificate in &request.certificate_chain {
            let contexts = self.trusted_store.trusted_contexts(
                report,
                CertificateSource::SignatureChain,
                certificate,
                request.signing_time,
            );
            for context in contexts {
                let qualified = context.service_type().is_some_and(|service_type| {
                    [service_type::CA_QC, service_type::NATIONAL_ROOT_CA_QC]
                        .contains(&service_type.trim())
                });
                if qualified && !services.contains(&context) {
                    services.push(context);
                }
            }
        }
        services
    }
}

fn matching_qualifiers(
    service: &ServiceContext,
    attributes: &CertificateAttributes,
    time: OffsetDateTime,
) -> BTreeSet<String> {
    service
        .effective_info(time)
        .map(|info| {
            info.qualifier_extensions
                .iter()
                .filter(|extension| extension.criteria.matches(attributes))
                .flat_map(|extension| extension.qualifier_uris.iter().cloned())
                .collect()
        })
        .unwrap_or_default()
}

fn add_conflicts(
    report: &mut ValidationReport,
    service_name: Option<&str>,
    conflicts: &[ConflictingField],
) {
    if conflicts.is_empty() {
        return;
    }

    let detail = match service_name {
        Some(name) => format!("{conflicts:?} in {name}"),
        None => format!("{conflicts:?} across services"),
    };
    report.add_report_item(
        ReportItem::info(QUALIFICATION_CHECK, ReportCode::QualificationConflict).with_detail(detail),
    );
}
