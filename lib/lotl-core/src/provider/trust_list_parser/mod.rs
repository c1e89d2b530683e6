//! Extraction of pointers, certificates and service history from trusted list XML.

use roxmltree::{Document, Node};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::model::certificate::{Certificate, CertificateError};
use crate::model::country_lotl::CountrySpecificLotl;
use crate::model::criteria::{Criteria, CriteriaAssert, CriteriaList, KeyUsageBit, KeyUsageBits};
use crate::model::service_context::{
    AdditionalServiceInformationExtension, CountryServiceContext, QualifierExtension,
    ServiceChronologicalInfo, ServiceContext, ServiceStatus,
};
use crate::util::xml::{child, child_text, children, descendants, oid_value, path, text};


pub const LOTL_TERRITORY: &str = "EU";
const LOTL_TSL_TYPE_SUFFIX: &str = "EUlistofthelists";

#[derive(Debug, Error)]
pub enum TrustListParseError {
    #[error("XML parsing failed: `{0}`")]
    Xml(String),
    #[error("Missing `{0}` element")]
    MissingElement(&'static str),
    #[error("Invalid value `{value}` in `{element}`")]
    InvalidValue { element: &'static str, value: String },
    #[error(transparent)]
    Certificate(#[from] CertificateError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OtherTslPointer {
    pub scheme_territory: Option<String>,
    pub tsl_location: String,
    pub mime_type: Option<String>,
    pub tsl_type: Option<String>,
    pub certificates: Vec<Certificate>,
}

impl OtherTslPointer {
    pub fn is_lotl_pointer(&self) -> bool {
        self.scheme_territory.as_deref() == Some(LOTL_TERRITORY)
            || self
                .tsl_type
                .as_deref()
                .is_some_and(|tsl_type| tsl_type.ends_with(LOTL_TSL_TYPE_SUFFIX))
    }

    pub fn to_country_lotl(&self) -> Option<CountrySpecificLotl> {
        Some(CountrySpecificLotl {
            scheme_territory: self.scheme_territory.clone()?.to_uppercase(),
            tsl_location: self.tsl_location.clone(),
            mime_type: self.mime_type.clone(),
            signing_certificates: self.certificates.clone(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LotlContent {
    /// In document order, newest first.
    pub scheme_information_uris: Vec<String>,
    pub pointers: Vec<OtherTslPointer>,
}

impl LotlContent {
    /// Certificates the LOTL announces for signing the LOTL itself.
    pub fn lotl_signing_certificates(&self) -> Vec<Certificate> {
        self.pointers
            .iter()
            .filter(|pointer| pointer.is_lotl_pointer())
            .flat_map(|pointer| pointer.certificates.iter().cloned())
            .collect()
    }

    pub fn country_pointers(&self) -> impl Iterator<Item = CountrySpecificLotl> + '_ {
        self.pointers
            .iter()
            .filter(|pointer| !pointer.is_lotl_pointer())
            .filter_map(OtherTslPointer::to_country_lotl)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrustList {
    pub scheme_territory: Option<String>,
    pub contexts: Vec<ServiceContext>,
}

fn parse_document(xml: &[u8]) -> Result<Document<'_>, TrustListParseError> {
    let text = std::str::from_utf8(xml).map_err(|err| TrustListParseError::Xml(err.to_string()))?;
    Document::parse(text).map_err(|err| TrustListParseError::Xml(err.to_string()))
}

pub fn parse_lotl(xml: &[u8]) -> Result<LotlContent, TrustListParseError> {
    let document = parse_document(xml)?;
    let scheme_information = child(document.root_element(), "SchemeInformation")
        .ok_or(TrustListParseError::MissingElement("SchemeInformation"))?;

    let scheme_information_uris = child(scheme_information, "SchemeInformationURI")
        .map(|uris| children(uris, "URI").filter_map(text).collect())
        .unwrap_or_default();

    let pointers = match child(scheme_information, "PointersToOtherTSL") {
        Some(pointers) => children(pointers, "OtherTSLPointer")
            .filter_map(|pointer| parse_pointer(pointer).transpose())
            .collect::<Result<Vec<_>, _>>()?,
        None => vec![],
    };

    Ok(LotlContent {
        scheme_information_uris,
        pointers,
    })
}

fn parse_pointer(pointer: Node<'_, '_>) -> Result<Option<OtherTslPointer>, TrustListParseError> {
    let Some(tsl_location) = child_text(pointer, "TSLLocation") else {
        tracing::warn!("Skipping TSL pointer without location");
        return Ok(None);
    };

    let certificates = match child(pointer, "ServiceDigitalIdentities") {
        Some(identities) => parse_certificates(identities)?,
        None => vec![],
    };

    let information = child(pointer, "AdditionalInformation");
    let other_information = |name: &'static str| {
        information.and_then(|information| descendants(information, name).find_map(text))
    };

    Ok(Some(OtherTslPointer {
        scheme_territory: other_information("SchemeTerritory"),
        tsl_location,
        mime_type: other_information("MimeType"),
        tsl_type: other_information("TSLType"),
        certificates,
    }))
}

fn parse_certificates(node: Node<'_, '_>) -> Result<Vec<Certificate>, TrustListParseError> {
    descendants(node, "X509Certificate")
        .filter_map(text)
        .map(|encoded| Certificate::from_base64(&encoded).map_err(Into::into))
        .collect()
}

/// Parses a national trusted list; `country_code` is used when the list does not name its territory.
pub fn parse_trust_list(xml: &[u8], country_code: &str) -> Result<TrustList, TrustListParseError> {
    let document = parse_document(xml)?;
    let root = document.root_element();
    let scheme_territory = path(root, &["SchemeInformation", "SchemeTerritory"]).and_then(text);
    let country_code = scheme_territory
        .clone()
        .unwrap_or_else(|| country_code.to_owned())
        .to_uppercase();

    let mut contexts = vec![];
    let Some(providers) = child(root, "TrustServiceProviderList") else {
        return Ok(TrustList {
            scheme_territory,
            contexts,
        });
    };

    for provider in children(providers, "TrustServiceProvider") {
        let tsp_name = path(provider, &["TSPInformation", "TSPName"])
            .and_then(localized_name)
            .unwrap_or_default();

        let Some(services) = child(provider, "TSPServices") else {
            continue;
        };
        for service in children(services, "TSPService") {
            contexts.push(ServiceContext::Country(parse_service(
                service,
                &country_code,
                &tsp_name,
            )?));
        }
    }

    Ok(TrustList {
        scheme_territory,
        contexts,
    })
}

fn parse_service(
    service: Node<'_, '_>,
    country_code: &str,
    tsp_name: &str,
) -> Result<CountryServiceContext, TrustListParseError> {
    let information = child(service, "ServiceInformation")
        .ok_or(TrustListParseError::MissingElement("ServiceInformation"))?;
    let history = child(service, "ServiceHistory")
        .map(|history| children(history, "ServiceHistoryInstance").collect::<Vec<_>>())
        .unwrap_or_default();

    let mut certificates: Vec<Certificate> = vec![];
    let mut chronological_infos = vec![];
    for instance in std::iter::once(information).chain(history) {
        if let Some(identity) = child(instance, "ServiceDigitalIdentity") {
            for certificate in parse_certificates(identity)? {
                if !certificates.contains(&certificate) {
                    certificates.push(certificate);
                }
            }
        }
        chronological_infos.push(parse_chronological_info(instance)?);
    }
    chronological_infos.sort_by_key(|info| info.start_time);

    Ok(CountryServiceContext {
        country_code: country_code.to_owned(),
        tsp_name: tsp_name.to_owned(),
        service_type: child_text(information, "ServiceTypeIdentifier")
            .ok_or(TrustListParseError::MissingElement("ServiceTypeIdentifier"))?,
        service_name: child(information, "ServiceName")
            .and_then(localized_name)
            .unwrap_or_default(),
        certificates,
        chronological_infos,
    })
}

fn localized_name(names: Node<'_, '_>) -> Option<String> {
    let english = children(names, "Name").find(|name| {
        name.attributes()
            .any(|attribute| attribute.name() == "lang" && attribute.value() == "en")
    });
    english
        .or_else(|| child(names, "Name"))
        .and_then(text)
}

fn parse_chronological_info(
    instance: Node<'_, '_>,
) -> Result<ServiceChronologicalInfo, TrustListParseError> {
    let status = child_text(instance, "ServiceStatus")
        .ok_or(TrustListParseError::MissingElement("ServiceStatus"))?;
    let start = child_text(instance, "StatusStartingTime")
        .ok_or(TrustListParseError::MissingElement("StatusStartingTime"))?;
    let start_time =
        OffsetDateTime::parse(&start, &Rfc3339).map_err(|_| TrustListParseError::InvalidValue {
            element: "StatusStartingTime",
            value: start.clone(),
        })?;

    let mut qualifier_extensions = vec![];
    let mut service_extensions = vec![];
    if let Some(extensions) = child(instance, "ServiceInformationExtensions") {
        for extension in children(extensions, "Extension") {
            if let Some(uri) = path(extension, &["AdditionalServiceInformation", "URI"]).and_then(text)
            {
                service_extensions.push(AdditionalServiceInformationExtension { uri });
            }
            if let Some(qualifications) = child(extension, "Qualifications") {
                for element in children(qualifications, "QualificationElement") {
                    qualifier_extensions.push(parse_qualification_element(element)?);
                }
            }
        }
    }

    Ok(ServiceChronologicalInfo {
        status: ServiceStatus::from_uri(&status),
        start_time,
        qualifier_extensions,
        service_extensions,
    })
}

fn parse_qualification_element(
    element: Node<'_, '_>,
) -> Result<QualifierExtension, TrustListParseError> {
    let qualifier_uris = child(element, "Qualifiers")
        .map(|qualifiers| {
            children(qualifiers, "Qualifier")
                .filter_map(|qualifier| qualifier.attribute("uri"))
                .map(|uri| uri.trim().to_owned())
                .collect()
        })
        .unwrap_or_default();
    let criteria = child(element, "CriteriaList")
        .ok_or(TrustListParseError::MissingElement("CriteriaList"))?;

    Ok(QualifierExtension {
        qualifier_uris,
        criteria: parse_criteria_list(criteria)?,
    })
}

fn parse_criteria_list(node: Node<'_, '_>) -> Result<CriteriaList, TrustListParseError> {
    let assert_value = node.attribute("assert").unwrap_or("all");
    let assert = assert_value
        .parse::<CriteriaAssert>()
        .map_err(|_| TrustListParseError::InvalidValue {
            element: "CriteriaList",
            value: assert_value.to_owned(),
        })?;

    let mut criteria = vec![];
    for element in node.children().filter(Node::is_element) {
        match element.tag_name().name() {
            "KeyUsage" => criteria.push(parse_key_usage(element)?),
            "PolicySet" => criteria.push(Criteria::PolicySet {
                required_policy_ids: descendants(element, "Identifier")
                    .filter_map(text)
                    .map(|value| oid_value(&value))
                    .collect(),
            }),
            "CriteriaList" => criteria.push(Criteria::List(parse_criteria_list(element)?)),
            "otherCriteriaList" => {
                for other in element.children().filter(Node::is_element) {
                    match other.tag_name().name() {
                        "ExtendedKeyUsage" => criteria.push(Criteria::ExtendedKeyUsage {
                            required_usages: identifiers(other),
                        }),
                        "CertSubjectDNAttribute" => {
                            criteria.push(Criteria::CertSubjectDnAttribute {
                                required_attribute_ids: identifiers(other),
                            })
                        }
                        name => criteria.push(unsupported_criteria(name)),
                    }
                }
            }
            name => criteria.push(unsupported_criteria(name)),
        }
    }

    Ok(CriteriaList { assert, criteria })
}

fn unsupported_criteria(name: &str) -> Criteria {
    tracing::debug!("Unsupported criteria `{name}` will not match any certificate");
    Criteria::Unsupported(name.to_owned())
}

fn identifiers(node: Node<'_, '_>) -> Vec<String> {
    descendants(node, "Identifier")
        .filter_map(text)
        .map(|value| oid_value(&value))
        .collect()
}

fn parse_key_usage(node: Node<'_, '_>) -> Result<Criteria, TrustListParseError> {
    let mut bits: KeyUsageBits = [None; 9];
    for bit in children(node, "KeyUsageBit") {
        let name = bit.attribute("name").unwrap_or_default();
        let index = name
            .parse::<KeyUsageBit>()
            .map_err(|_| TrustListParseError::InvalidValue {
                element: "KeyUsageBit",
                value: name.to_owned(),
            })?
            .index();
        let value = text(bit).unwrap_or_default();
        bits[index] = Some(match value.as_str() {
            "true" | "1" => true,
            "false" | "0" => false,
            _ => {
                return Err(TrustListParseError::InvalidValue {
                    element: "KeyUsageBit",
                    value,
                });
            }
        });
    }
    Ok(Criteria::KeyUsage { bits })
}
