use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum::Display;
use time::OffsetDateTime;

use super::certificate::Certificate;
use super::criteria::CriteriaList;

pub mod service_type {
    pub const CA_QC: &str = "http://uri.etsi.org/TrstSvc/Svctype/CA/QC";
    pub const CA_PKC: &str = "http://uri.etsi.org/TrstSvc/Svctype/CA/PKC";
    pub const NATIONAL_ROOT_CA_QC: &str = "http://uri.etsi.org/TrstSvc/Svctype/NationalRootCA-QC";
    pub const OCSP: &str = "http://uri.etsi.org/TrstSvc/Svctype/Certstatus/OCSP";
    pub const OCSP_QC: &str = "http://uri.etsi.org/TrstSvc/Svctype/Certstatus/OCSP/QC";
    pub const CRL: &str = "http://uri.etsi.org/TrstSvc/Svctype/Certstatus/CRL";
    pub const CRL_QC: &str = "http://uri.etsi.org/TrstSvc/Svctype/Certstatus/CRL/QC";
    pub const TSA: &str = "http://uri.etsi.org/TrstSvc/Svctype/TSA";
    pub const TSA_QTST: &str = "http://uri.etsi.org/TrstSvc/Svctype/TSA/QTST";
    pub const TSA_TSS_QC: &str = "http://uri.etsi.org/TrstSvc/Svctype/TSA/TSS-QC";
    pub const TSA_TSS_ADES_QC_AND_QES: &str =
        "http://uri.etsi.org/TrstSvc/Svctype/TSA/TSS-AdESQCandQES";
}

const STATUS_PREFIX: &str = "http://uri.etsi.org/TrstSvc/TrustedList/Svcstatus/";

const GRANTED_STATUSES: [&str; 6] = [
    "granted",
    "undersupervision",
    "supervisionincessation",
    "accredited",
    "setbynationallaw",
    "recognisedatnationallevel",
];

const WITHDRAWN_STATUSES: [&str; 7] = [
    "withdrawn",
    "supervisionceased",
    "supervisionrevoked",
    "accreditationceased",
    "accreditationrevoked",
    "deprecatedbynationallaw",
    "deprecatedatnationallevel",
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceStatus {
    Granted,
    Withdrawn,
    Other(String),
}

impl ServiceStatus {
    pub fn from_uri(uri: &str) -> Self {
        let uri = uri.trim();
        match uri.strip_prefix(STATUS_PREFIX) {
            Some(status) if GRANTED_STATUSES.contains(&status) => Self::Granted,
            Some(status) if WITHDRAWN_STATUSES.contains(&status) => Self::Withdrawn,
            _ => Self::Other(uri.to_owned()),
        }
    }

    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceScope {
    ForeSignatures,
    ForeSeals,
    ForWebSiteAuthentication,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalServiceInformationExtension {
    pub uri: String,
}

impl AdditionalServiceInformationExtension {
    /// Usage scope declared by this extension, `None` for unrelated information.
    pub fn scope(&self) -> Option<ServiceScope> {
        match self.uri.rsplit('/').next()? {
            "ForeSignatures" => Some(ServiceScope::ForeSignatures),
            "ForeSeals" => Some(ServiceScope::ForeSeals),
            "ForWebSiteAuthentication" => Some(ServiceScope::ForWebSiteAuthentication),
            _ => None,
        }
    }
}

/// Overrule: when `criteria` match a certificate, `qualifier_uris` apply to it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualifierExtension {
    pub qualifier_uris: BTreeSet<String>,
    pub criteria: CriteriaList,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceChronologicalInfo {
    pub status: ServiceStatus,
    pub start_time: OffsetDateTime,
    pub qualifier_extensions: Vec<QualifierExtension>,
    pub service_extensions: Vec<AdditionalServiceInformationExtension>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryServiceContext {
    pub country_code: String,
    pub tsp_name: String,
    pub service_type: String,
    pub service_name: String,
    pub certificates: Vec<Certificate>,
    /// Ordered by `start_time`, oldest first.
    pub chronological_infos: Vec<ServiceChronologicalInfo>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleServiceContext {
    pub certificates: Vec<Certificate>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceContext {
    Country(CountryServiceContext),
    Simple(SimpleServiceContext),
}

impl ServiceContext {
    pub fn certificates(&self) -> &[Certificate] {
        match self {
            Self::Country(context) => &context.certificates,
            Self::Simple(context) => &context.certificates,
        }
    }

    pub fn chronological_infos(&self) -> &[ServiceChronologicalInfo] {
        match self {
            Self::Country(context) => &context.chronological_infos,
            Self::Simple(_) => &[],
        }
    }

    pub fn service_type(&self) -> Option<&str> {
        match self {
            Self::Country(context) => Some(&context.service_type),
            Self::Simple(_) => None,
        }
    }

    pub fn service_name(&self) -> Option<&str> {
        match self {
            Self::Country(context) => Some(&context.service_name),
            Self::Simple(_) => None,
        }
    }

    pub fn country_code(&self) -> Option<&str> {
        match self {
            Self::Country(context) => Some(&context.country_code),
            Self::Simple(_) => None,
        }
    }

    /// Latest chronological info starting at or before `time`.
    pub fn effective_info(&self, time: OffsetDateTime) -> Option<&ServiceChronologicalInfo> {
        self.chronological_infos()
            .iter()
            .filter(|info| info.start_time <= time)
            .max_by_key(|info| info.start_time)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use time::macros::datetime;

    use super::*;

    fn info(status: ServiceStatus, start_time: OffsetDateTime) -> ServiceChronologicalInfo {
        ServiceChronologicalInfo {
            status,
            start_time,
            qualifier_extensions: vec![],
            service_extensions: vec![],
        }
    }

    fn context(infos: Vec<ServiceChronologicalInfo>) -> ServiceContext {
        ServiceContext::Country(CountryServiceContext {
            country_code: "SK".to_owned(),
            tsp_name: "TSP".to_owned(),
            service_type: service_type::CA_QC.to_owned(),
            service_name: "CA".to_owned(),
            certificates: vec![],
            chronological_infos: infos,
        })
    }

    #[test]
    fn test_effective_info_picks_latest_started() {
        let context = context(vec![
            info(ServiceStatus::Granted, datetime!(2016-07-01 0:00 UTC)),
            info(ServiceStatus::Withdrawn, datetime!(2020-01-01 0:00 UTC)),
        ]);

        assert!(
            context
                .effective_info(datetime!(2010-01-01 0:00 UTC))
                .is_none()
        );
        assert_eq!(
            context
                .effective_info(datetime!(2018-01-01 0:00 UTC))
                .unwrap()
                .status,
            ServiceStatus::Granted
        );
        assert_eq!(
            context
                .effective_info(datetime!(2020-01-01 0:00 UTC))
                .unwrap()
                .status,
            ServiceStatus::Withdrawn
        );
    }

    #[rstest]
    #[case("http://uri.etsi.org/TrstSvc/TrustedList/Svcstatus/granted", ServiceStatus::Granted)]
    #[case(
        "http://uri.etsi.org/TrstSvc/TrustedList/Svcstatus/accredited",
        ServiceStatus::Granted
    )]
    #[case(
        "http://uri.etsi.org/TrstSvc/TrustedList/Svcstatus/withdrawn",
        ServiceStatus::Withdrawn
    )]
    #[case(
        "http://uri.etsi.org/TrstSvc/TrustedList/Svcstatus/supervisionrevoked",
        ServiceStatus::Withdrawn
    )]
    #[case("urn:custom", ServiceStatus::Other("urn:custom".to_owned()))]
    fn test_status_from_uri(#[case] uri: &str, #[case] expected: ServiceStatus) {
        assert_eq!(ServiceStatus::from_uri(uri), expected);
    }

    #[test]
    fn test_scope_from_additional_information() {
        let extension = AdditionalServiceInformationExtension {
            uri: "http://uri.etsi.org/TrstSvc/TrustedList/SvcInfoExt/ForWebSiteAuthentication"
                .to_owned(),
        };
        assert_eq!(
            extension.scope(),
            Some(ServiceScope::ForWebSiteAuthentication)
        );

        let extension = AdditionalServiceInformationExtension {
            uri: "http://uri.etsi.org/TrstSvc/TrustedList/SvcInfoExt/RootCA-QC".to_owned(),
        };
        assert_eq!(extension.scope(), None);
    }
}
