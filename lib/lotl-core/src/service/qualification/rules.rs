//! Derivation of the qualification fields from certificate content and
//! trusted list qualifiers.

use std::collections::BTreeSet;

use time::OffsetDateTime;
use time::macros::datetime;

use crate::model::qualification::QualificationConclusion;
use crate::util::x509::{CertificateAttributes, QC_TYPE_ESEAL, QC_TYPE_ESIGN, QC_TYPE_WEB};

/// Certificates issued from this instant follow the eIDAS policy semantics.
pub const EIDAS_EFFECTIVE_DATE: OffsetDateTime = datetime!(2016-07-01 0:00 UTC);

pub mod policy {
    pub const QCP_PUBLIC_WITH_SSCD: &str = "0.4.0.1456.1.1";
    pub const QCP_PUBLIC: &str = "0.4.0.1456.1.2";
    pub const QCP_NATURAL: &str = "0.4.0.194112.1.0";
    pub const QCP_LEGAL: &str = "0.4.0.194112.1.1";
    pub const QCP_NATURAL_QSCD: &str = "0.4.0.194112.1.2";
    pub const QCP_LEGAL_QSCD: &str = "0.4.0.194112.1.3";
    pub const QCP_WEB: &str = "0.4.0.194112.1.4";
}

pub mod qualifier {
    pub const PREFIX: &str = "http://uri.etsi.org/TrstSvc/TrustedList/SvcInfoExt/";

    pub const QC_WITH_SSCD: &str = "QCWithSSCD";
    pub const QC_WITH_QSCD: &str = "QCWithQSCD";
    pub const QC_QSCD_MANAGED_ON_BEHALF: &str = "QCQSCDManagedOnBehalf";
    pub const QC_NO_SSCD: &str = "QCNoSSCD";
    pub const QC_NO_QSCD: &str = "QCNoQSCD";
    pub const QC_SSCD_STATUS_AS_IN_CERT: &str = "QCSSCDStatusAsInCert";
    pub const QC_QSCD_STATUS_AS_IN_CERT: &str = "QCQSCDStatusAsInCert";
    pub const QC_STATEMENT: &str = "QCStatement";
    pub const NOT_QUALIFIED: &str = "NotQualified";
    pub const QC_FOR_ESIG: &str = "QCForESig";
    pub const QC_FOR_ESEAL: &str = "QCForESeal";
    pub const QC_FOR_WSA: &str = "QCForWSA";
    pub const QC_FOR_LEGAL_PERSON: &str = "QCForLegalPerson";
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum CertificateType {
    ESig,
    ESeal,
    Web,
    Unknown,
}

/// `None` marks a field that could not be determined.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Qualification {
    pub qc: Option<bool>,
    pub certificate_type: CertificateType,
    pub qscd: Option<bool>,
}

pub fn baseline(attributes: &CertificateAttributes) -> Qualification {
    let policies = attributes.policy_ids.clone().unwrap_or_default();
    let has = |oid: &str| policies.contains(oid);
    let statements = &attributes.qc_statements;

    let (qc, qscd, policy_type) = if attributes.not_before >= EIDAS_EFFECTIVE_DATE {
        let natural = has(policy::QCP_NATURAL) || has(policy::QCP_NATURAL_QSCD);
        let legal = has(policy::QCP_LEGAL) || has(policy::QCP_LEGAL_QSCD);
        let web = has(policy::QCP_WEB);
        let policy_type = match (natural, legal, web) {
            (true, false, false) => Some(CertificateType::ESig),
            (false, true, false) => Some(CertificateType::ESeal),
            (false, false, true) => Some(CertificateType::Web),
            (false, false, false) => None,
            _ => Some(CertificateType::Unknown),
        };
        (
            statements.compliance || natural || legal || web,
            statements.sscd || has(policy::QCP_NATURAL_QSCD) || has(policy::QCP_LEGAL_QSCD),
            policy_type,
        )
    } else {
        let qc = statements.compliance
            || has(policy::QCP_PUBLIC_WITH_SSCD)
            || has(policy::QCP_PUBLIC);
        (
            qc,
            statements.sscd || has(policy::QCP_PUBLIC_WITH_SSCD),
            qc.then_some(CertificateType::ESig),
        )
    };

    let statement_type = match statements.types.len() {
        0 => None,
        1 => statements.types.first().map(|qc_type| match qc_type.as_str() {
            QC_TYPE_ESIGN => CertificateType::ESig,
            QC_TYPE_ESEAL => CertificateType::ESeal,
            QC_TYPE_WEB => CertificateType::Web,
            _ => CertificateType::Unknown,
        }),
        _ => Some(CertificateType::Unknown),
    };

    let certificate_type = statement_type.or(policy_type).unwrap_or(if qc {
        CertificateType::ESig
    } else {
        CertificateType::Unknown
    });

    Qualification {
        qc: Some(qc),
        certificate_type,
        qscd: Some(qscd),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConflictingField {
    Qc,
    CertificateType,
    Qscd,
}

/// Applies the qualifiers of all matching qualification elements of one service.
///
/// Disagreeing qualifiers: `NotQualified` wins for QC, the type becomes
/// unknown and QSCD stays as claimed by the certificate.
pub fn apply_overrules(
    baseline: Qualification,
    qualifier_uris: &BTreeSet<String>,
) -> (Qualification, Vec<ConflictingField>) {
    let names: BTreeSet<&str> = qualifier_uris
        .iter()
        .filter_map(|uri| uri.trim().strip_prefix(qualifier::PREFIX))
        .collect();
    let mut conflicts = vec![];

    let qc_yes = names.contains(qualifier::QC_STATEMENT);
    let qc_no = names.contains(qualifier::NOT_QUALIFIED);
    if qc_yes && qc_no {
        conflicts.push(ConflictingField::Qc);
    }
    let qc = match (qc_yes, qc_no) {
        (_, true) => Some(false),
        (true, false) => Some(true),
        (false, false) => baseline.qc,
    };

    let types: BTreeSet<_> = [
        (qualifier::QC_FOR_ESIG, CertificateType::ESig),
        (qualifier::QC_FOR_ESEAL, CertificateType::ESeal),
        (qualifier::QC_FOR_LEGAL_PERSON, CertificateType::ESeal),
        (qualifier::QC_FOR_WSA, CertificateType::Web),
    ]
    .into_iter()
    .filter(|(name, _)| names.contains(name))
    .map(|(_, certificate_type)| certificate_type)
    .collect();
    let certificate_type = match types.first() {
        None => baseline.certificate_type,
        Some(certificate_type) if types.len() == 1 => *certificate_type,
        Some(_) => {
            conflicts.push(ConflictingField::CertificateType);
            CertificateType::Unknown
        }
    };

    let qscd_yes = contains_any(
        &names,
        &[
            qualifier::QC_WITH_SSCD,
            qualifier::QC_WITH_QSCD,
            qualifier::QC_QSCD_MANAGED_ON_BEHALF,
        ],
    );
    let qscd_no = contains_any(&names, &[qualifier::QC_NO_SSCD, qualifier::QC_NO_QSCD]);
    let qscd = match (qscd_yes, qscd_no) {
        (true, false) => Some(true),
        (false, true) => Some(false),
        (true, true) => {
            conflicts.push(ConflictingField::Qscd);
            baseline.qscd
        }
        // covers the explicit "status as in certificate" qualifiers
        (false, false) => baseline.qscd,
    };

    (
        Qualification {
            qc,
            certificate_type,
            qscd,
        },
        conflicts,
    )
}

fn contains_any(names: &BTreeSet<&str>, candidates: &[&str]) -> bool {
    candidates.iter().any(|candidate| names.contains(candidate))
}

/// Combines the outcome of several matching services. Fields they disagree on become unknown.
pub fn merge_services(results: &[Qualification]) -> (Option<Qualification>, Vec<ConflictingField>) {
    let Some((first, rest)) = results.split_first() else {
        return (None, vec![]);
    };

    let mut merged = *first;
    let mut conflicts = vec![];
    for other in rest {
        if merged.qc != other.qc && merged.qc.is_some() {
            merged.qc = None;
            conflicts.push(ConflictingField::Qc);
        }
        if merged.certificate_type != other.certificate_type
            && merged.certificate_type != CertificateType::Unknown
        {
            merged.certificate_type = CertificateType::Unknown;
            conflicts.push(ConflictingField::CertificateType);
        }
        if merged.qscd != other.qscd && merged.qscd.is_some() {
            merged.qscd = None;
            conflicts.push(ConflictingField::Qscd);
        }
    }

    (Some(merged), conflicts)
}

pub fn conclusion(qualification: &Qualification) -> QualificationConclusion {
    use CertificateType::*;
    use QualificationConclusion as C;

    match (
        qualification.qc,
        qualification.certificate_type,
        qualification.qscd,
    ) {
        (None, _, _) => C::Unknown,
        (Some(false), ESig, _) => C::NotQualifiedEsig,
        (Some(false), ESeal, _) => C::NotQualifiedEseal,
        (Some(false), Web | Unknown, _) => C::NotQualified,
        (Some(true), Web, _) => C::NotQualified,
        (Some(true), ESig, Some(true)) => C::EsigWithQcAndQscd,
        (Some(true), ESig, Some(false)) => C::EsigWithQc,
        (Some(true), ESeal, Some(true)) => C::EsealWithQcAndQscd,
        (Some(true), ESeal, Some(false)) => C::EsealWithQc,
        (Some(true), Unknown, Some(true)) => C::UnknownQcAndQscd,
        (Some(true), _, _) => C::UnknownQc,
    }
}
