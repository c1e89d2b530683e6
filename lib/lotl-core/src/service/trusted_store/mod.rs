//! Certificates of trusted services, indexed by certificate identity.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use strum::Display;
use time::OffsetDateTime;

use crate::model::certificate::Certificate;
use crate::model::report::{ReportCode, ReportItem, TRUSTED_STORE_CHECK, ValidationReport};
use crate::model::service_context::{ServiceContext, ServiceScope, service_type};
use crate::proto::clock::{Clock, DefaultClock, unix_millis};


/// Role of the certificate being checked.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CertificateSource {
    CertificateIssuer,
    SignatureChain,
    OcspIssuer,
    CrlIssuer,
    Timestamp,
}

impl CertificateSource {
    fn accepts_service_type(&self, service_type: &str) -> bool {
        let accepted: &[&str] = match self {
            Self::CertificateIssuer | Self::SignatureChain => &[
                service_type::CA_QC,
                service_type::CA_PKC,
                service_type::NATIONAL_ROOT_CA_QC,
            ],
            Self::OcspIssuer => &[service_type::OCSP, service_type::OCSP_QC],
            Self::CrlIssuer => &[service_type::CRL, service_type::CRL_QC],
            Self::Timestamp => &[
                service_type::TSA,
                service_type::TSA_QTST,
                service_type::TSA_TSS_QC,
                service_type::TSA_TSS_ADES_QC_AND_QES,
            ],
        };
        accepted.contains(&service_type.trim())
    }

    fn accepts_scope(&self, scope: ServiceScope) -> bool {
        match self {
            Self::CertificateIssuer | Self::SignatureChain => matches!(
                scope,
                ServiceScope::ForeSignatures | ServiceScope::ForeSeals
            ),
            Self::OcspIssuer | Self::CrlIssuer | Self::Timestamp => true,
        }
    }
}

#[derive(Clone, Debug)]
struct IndexedContext {
    context: ServiceContext,
    expires_at_millis: Option<u64>,
}

#[derive(Clone, Debug)]
struct StoreEntry {
    certificate: Certificate,
    contexts: Vec<IndexedContext>,
}

#[derive(Debug, Default)]
struct TrustedStoreData {
    /// Keyed by certificate fingerprint.
    entries: HashMap<String, StoreEntry>,
    previous_certificates: Vec<Certificate>,
}

/// Contexts taken from one trusted list, usable until `expires_at_millis` when set.
#[derive(Clone, Debug, Default)]
pub struct TrustedListContexts {
    pub contexts: Vec<ServiceContext>,
    pub expires_at_millis: Option<u64>,
}

pub struct TrustedStore {
    data: RwLock<TrustedStoreData>,
    clock: Arc<dyn Clock>,
}

impl Default for TrustedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TrustedStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(DefaultClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            data: RwLock::new(TrustedStoreData::default()),
            clock,
        }
    }

    /// Indexes every certificate of every context. A certificate may belong to several services.
    pub fn add_certificates_with_context(&self, contexts: Vec<ServiceContext>) {
        index_contexts(&mut self.data.write().entries, contexts, None);
    }

    /// Drops all known contexts, keeping the previous certificates.
    pub fn clear(&self) {
        self.data.write().entries.clear();
    }

    /// Replaces the store content in one step.
    pub fn replace_contexts(&self, contexts: Vec<ServiceContext>) {
        self.replace_trusted_lists(vec![TrustedListContexts {
            contexts,
            expires_at_millis: None,
        }]);
    }

    /// Replaces the store content in one step, keeping the expiry of each list.
    pub fn replace_trusted_lists(&self, lists: Vec<TrustedListContexts>) {
        let mut entries = HashMap::new();
        for list in lists {
            index_contexts(&mut entries, list.contexts, list.expires_at_millis);
        }
        self.data.write().entries = entries;
    }

    /// Certificates that are accepted on behalf of a store certificate with
    /// the same subject and public key.
    pub fn set_previous_certificates(&self, certificates: Vec<Certificate>) {
        self.data.write().previous_certificates = certificates;
    }

    pub fn len(&self) -> usize {
        self.data.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn certificates(&self) -> Vec<Certificate> {
        self.data
            .read()
            .entries
            .values()
            .map(|entry| entry.certificate.clone())
            .collect()
    }

    /// Contexts of the store certificate matching `certificate`, expired ones included.
    pub fn contexts_for(&self, certificate: &Certificate) -> Vec<ServiceContext> {
        self.indexed_contexts_for(certificate)
            .into_iter()
            .map(|indexed| indexed.context)
            .collect()
    }

    fn indexed_contexts_for(&self, certificate: &Certificate) -> Vec<IndexedContext> {
        let data = self.data.read();
        if let Some(entry) = data.entries.get(&certificate.fingerprint()) {
            return entry.contexts.clone();
        }

        if !data.previous_certificates.contains(certificate) {
            return vec![];
        }

        let Ok(public_key) = certificate.public_key_info() else {
            return vec![];
        };
        let subject = certificate.subject();
        data.entries
            .values()
            .filter(|entry| {
                entry.certificate.subject() == subject
                    && entry
                        .certificate
                        .public_key_info()
                        .is_ok_and(|key| key == public_key)
            })
            .flat_map(|entry| entry.contexts.iter().cloned())
            .collect()
    }

    /// Contexts under which `certificate` is trusted for `source` at `time`.
    ///
    /// Adds one INFO item when at least one context qualifies, otherwise one
    /// item per rejected context. Contexts of an expired trusted list are
    /// rejected as outdated. Unknown certificates add nothing.
    pub fn trusted_contexts(
        &self,
        report: &mut ValidationReport,
        source: CertificateSource,
        certificate: &Certificate,
        time: OffsetDateTime,
    ) -> Vec<ServiceContext> {
        let now_millis = unix_millis(self.clock.now_utc());
        let mut rejections = vec![];
        let mut trusted = vec![];

        for indexed in self.indexed_contexts_for(certificate) {
            if indexed
                .expires_at_millis
                .is_some_and(|expires_at| now_millis > expires_at)
            {
                rejections.push(
                    ReportItem::invalid(TRUSTED_STORE_CHECK, ReportCode::TrustedListOutdated)
                        .with_cause(outdated_cause(&indexed.context)),
                );
                continue;
            }

            match check_context(&indexed.context, source, time) {
                Ok(()) => trusted.push(indexed.context),
                Err(item) => rejections.push(item),
            }
        }

        if trusted.is_empty() {
            for item in rejections {
                report.add_report_item(item.with_detail(certificate.subject()));
            }
        } else {
            report.add_report_item(
                ReportItem::info(TRUSTED_STORE_CHECK, ReportCode::CertificateTrusted)
                    .with_detail(certificate.subject()),
            );
        }

        trusted
    }

    pub fn check_if_cert_is_trusted(
        &self,
        report: &mut ValidationReport,
        source: CertificateSource,
        certificate: &Certificate,
        time: OffsetDateTime,
    ) -> bool {
        !self
            .trusted_contexts(report, source, certificate, time)
            .is_empty()
    }
}

fn outdated_cause(context: &ServiceContext) -> String {
    match context {
        ServiceContext::Country(country) => {
            format!("trusted list of {} is past its staleness limit", country.country_code)
        }
        ServiceContext::Simple(_) => "trusted list is past its staleness limit".to_owned(),
    }
}

fn index_contexts(
    entries: &mut HashMap<String, StoreEntry>,
    contexts: Vec<ServiceContext>,
    expires_at_millis: Option<u64>,
) {
    for context in contexts {
        for certificate in context.certificates() {
            entries
                .entry(certificate.fingerprint())
                .or_insert_with(|| StoreEntry {
                    certificate: certificate.clone(),
                    contexts: vec![],
                })
                .contexts
                .push(IndexedContext {
                    context: context.clone(),
                    expires_at_millis,
                });
        }
    }
}

fn check_context(
    context: &ServiceContext,
    source: CertificateSource,
    time: OffsetDateTime,
) -> Result<(), ReportItem> {
    let ServiceContext::Country(country_context) = context else {
        return Ok(());
    };

    let info = context.effective_info(time).ok_or_else(|| {
        ReportItem::invalid(TRUSTED_STORE_CHECK, ReportCode::CertificateNotYetValid)
    })?;

    if !info.status.is_granted() {
        return Err(ReportItem::invalid(
            TRUSTED_STORE_CHECK,
            ReportCode::CertificateRevoked,
        ));
    }

    if !source.accepts_service_type(&country_context.service_type) {
        return Err(ReportItem::info(
            TRUSTED_STORE_CHECK,
            ReportCode::ServiceTypeNotRecognized,
        )
        .with_cause(&country_context.service_type));
    }

    let scopes: Vec<ServiceScope> = info
        .service_extensions
        .iter()
        .filter_map(|extension| extension.scope())
        .collect();
    if !scopes.is_empty() && !scopes.iter().any(|scope| source.accepts_scope(*scope)) {
        return Err(ReportItem::invalid(
            TRUSTED_STORE_CHECK,
            ReportCode::ScopeSpecifiedWithInvalidTypes,
        )
        .with_cause(format!("{scopes:?} for {source}")));
    }

    Ok(())
}
