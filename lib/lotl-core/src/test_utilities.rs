use std::collections::HashMap;
use std::sync::Arc;

use ct_codecs::{Base64, Encoder};
use lotl_crypto::HashAlgorithm;
use p256::ecdsa::SigningKey;
use p256::ecdsa::signature::Signer;
use p256::pkcs8::DecodePrivateKey;
use parking_lot::Mutex;
use rcgen::{
    BasicConstraints, CertificateParams, CustomExtension, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose,
};
use time::OffsetDateTime;
use time::macros::datetime;
use yasna::models::ObjectIdentifier;

use crate::model::certificate::Certificate;
use crate::model::country_lotl::XML_MIME_TYPE;
use crate::model::service_context::service_type;
use crate::proto::clock::Clock;
use crate::proto::resource_retriever::MockResourceRetriever;
use crate::proto::xml_signature::c14n::{Canonicalization, canonicalize};

pub const QC_COMPLIANCE: &str = "0.4.0.1862.1.1";
pub const QC_SSCD: &str = "0.4.0.1862.1.4";
pub const QC_TYPE_ESIGN: &str = "0.4.0.1862.1.6.1";
pub const QC_TYPE_ESEAL: &str = "0.4.0.1862.1.6.2";
pub const QC_TYPE_WEB: &str = "0.4.0.1862.1.6.3";

const SIGNATURE_PLACEHOLDER: &str = "SIGNATURE_VALUE_PLACEHOLDER";
const DIGEST_PLACEHOLDER: &str = "DIGEST_VALUE_PLACEHOLDER";

pub struct TestCertificate {
    pub certificate: Certificate,
    key_pair: KeyPair,
}

impl TestCertificate {
    pub fn builder(common_name: &str) -> TestCertificateBuilder {
        TestCertificateBuilder {
            common_name: common_name.to_owned(),
            ..Default::default()
        }
    }

    pub fn base64(&self) -> String {
        Base64::encode_to_string(self.certificate.der()).unwrap()
    }

    /// Adds an enveloped ECDSA P-256 signature over the whole document.
    ///
    /// The signature is inserted right before the closing tag of the document element.
    pub fn sign_xml(&self, unsigned: &str) -> String {
        let exclusive = Canonicalization::Exclusive {
            inclusive_prefixes: vec![],
        };
        let document = roxmltree::Document::parse(unsigned).unwrap();
        let digest = Base64::encode_to_string(
            HashAlgorithm::Sha256.digest(canonicalize(document.root(), &exclusive, None).as_bytes()),
        )
        .unwrap();

        let signature = format!(
            r#"<ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#" Id="signature"><ds:SignedInfo><ds:CanonicalizationMethod Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/><ds:SignatureMethod Algorithm="http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha256"/><ds:Reference URI=""><ds:Transforms><ds:Transform Algorithm="http://www.w3.org/2000/09/xmldsig#enveloped-signature"/><ds:Transform Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/></ds:Transforms><ds:DigestMethod Algorithm="http://www.w3.org/2001/04/xmlenc#sha256"/><ds:DigestValue>{digest}</ds:DigestValue></ds:Reference></ds:SignedInfo><ds:SignatureValue>{SIGNATURE_PLACEHOLDER}</ds:SignatureValue><ds:KeyInfo><ds:X509Data><ds:X509Certificate>{}</ds:X509Certificate></ds:X509Data></ds:KeyInfo></ds:Signature>"#,
            self.base64()
        );
        let position = unsigned.rfind("</").unwrap();
        let with_placeholder = format!(
            "{}{}{}",
            &unsigned[..position],
            signature,
            &unsigned[position..]
        );

        self.fill_signature_value(&with_placeholder)
    }

    /// Signs a `ds:Object` carried inside the signature by its ID, leaving the rest of the
    /// document unsigned.
    pub fn sign_xml_object(&self, unsigned: &str, object_content: &str) -> String {
        let signature = format!(
            r##"<ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#" Id="signature"><ds:SignedInfo><ds:CanonicalizationMethod Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/><ds:SignatureMethod Algorithm="http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha256"/><ds:Reference URI="#obj"><ds:Transforms><ds:Transform Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/></ds:Transforms><ds:DigestMethod Algorithm="http://www.w3.org/2001/04/xmlenc#sha256"/><ds:DigestValue>{DIGEST_PLACEHOLDER}</ds:DigestValue></ds:Reference></ds:SignedInfo><ds:SignatureValue>{SIGNATURE_PLACEHOLDER}</ds:SignatureValue><ds:KeyInfo><ds:X509Data><ds:X509Certificate>{}</ds:X509Certificate></ds:X509Data></ds:KeyInfo><ds:Object Id="obj">{object_content}</ds:Object></ds:Signature>"##,
            self.base64()
        );
        let position = unsigned.rfind("</").unwrap();
        let with_placeholders = format!(
            "{}{}{}",
            &unsigned[..position],
            signature,
            &unsigned[position..]
        );

        let document = roxmltree::Document::parse(&with_placeholders).unwrap();
        let object = document
            .descendants()
            .find(|node| node.tag_name().name() == "Object")
            .unwrap();
        let exclusive = Canonicalization::Exclusive {
            inclusive_prefixes: vec![],
        };
        let digest = Base64::encode_to_string(
            HashAlgorithm::Sha256.digest(canonicalize(object, &exclusive, None).as_bytes()),
        )
        .unwrap();

        self.fill_signature_value(&with_placeholders.replace(DIGEST_PLACEHOLDER, &digest))
    }

    fn fill_signature_value(&self, with_placeholder: &str) -> String {
        let exclusive = Canonicalization::Exclusive {
            inclusive_prefixes: vec![],
        };
        let document = roxmltree::Document::parse(with_placeholder).unwrap();
        let signed_info = document
            .descendants()
            .find(|node| node.tag_name().name() == "SignedInfo")
            .unwrap();
        let canonical = canonicalize(signed_info, &exclusive, None);

        let signing_key = SigningKey::from_pkcs8_der(&self.key_pair.serialize_der()).unwrap();
        let value: p256::ecdsa::Signature = signing_key.sign(canonical.as_bytes());

        with_placeholder.replace(
            SIGNATURE_PLACEHOLDER,
            &Base64::encode_to_string(value.to_bytes()).unwrap(),
        )
    }
}

#[derive(Default)]
pub struct TestCertificateBuilder {
    common_name: String,
    country: Option<String>,
    organization_identifier: Option<String>,
    not_before: Option<OffsetDateTime>,
    key_usages: Vec<KeyUsagePurpose>,
    extended_key_usages: Vec<ExtendedKeyUsagePurpose>,
    policies: Vec<String>,
    qc_statements: Vec<String>,
    qc_types: Vec<String>,
    ca: bool,
    key_pem: Option<String>,
}

impl TestCertificateBuilder {
    pub fn country(mut self, country: &str) -> Self {
        self.country = Some(country.to_owned());
        self
    }

    pub fn organization_identifier(mut self, value: &str) -> Self {
        self.organization_identifier = Some(value.to_owned());
        self
    }

    pub fn not_before(mut self, not_before: OffsetDateTime) -> Self {
        self.not_before = Some(not_before);
        self
    }

    pub fn key_usages(mut self, key_usages: Vec<KeyUsagePurpose>) -> Self {
        self.key_usages = key_usages;
        self
    }

    pub fn extended_key_usages(mut self, usages: Vec<ExtendedKeyUsagePurpose>) -> Self {
        self.extended_key_usages = usages;
        self
    }

    pub fn policies(mut self, policies: &[&str]) -> Self {
        self.policies = policies.iter().map(|p| p.to_string()).collect();
        self
    }

    /// Statement OIDs without parameters, e.g. [`QC_COMPLIANCE`], [`QC_SSCD`].
    pub fn qc_statements(mut self, statements: &[&str]) -> Self {
        self.qc_statements = statements.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn qc_types(mut self, types: &[&str]) -> Self {
        self.qc_types = types.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn ca(mut self) -> Self {
        self.ca = true;
        self
    }

    /// Reuses the key pair of `other`, e.g. for a reissued certificate.
    pub fn same_key_as(mut self, other: &TestCertificate) -> Self {
        self.key_pem = Some(other.key_pair.serialize_pem());
        self
    }

    pub fn build(self) -> TestCertificate {
        let mut params = CertificateParams::default();
        let mut distinguished_name = DistinguishedName::new();
        distinguished_name.push(DnType::CommonName, self.common_name.as_str());
        if let Some(country) = &self.country {
            distinguished_name.push(DnType::CountryName, country.as_str());
        }
        if let Some(identifier) = &self.organization_identifier {
            distinguished_name.push(DnType::CustomDnType(vec![2, 5, 4, 97]), identifier.as_str());
        }
        params.distinguished_name = distinguished_name;
        params.not_before = self.not_before.unwrap_or(datetime!(2020-01-01 0:00 UTC));
        params.not_after = datetime!(2045-01-01 0:00 UTC);
        params.key_usages = self.key_usages;
        params.extended_key_usages = self.extended_key_usages;
        if self.ca {
            params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        }

        if !self.policies.is_empty() {
            params.custom_extensions.push(CustomExtension::from_oid_content(
                &[2, 5, 29, 32],
                encode_policies(&self.policies),
            ));
        }
        if !self.qc_statements.is_empty() || !self.qc_types.is_empty() {
            params.custom_extensions.push(CustomExtension::from_oid_content(
                &[1, 3, 6, 1, 5, 5, 7, 1, 3],
                encode_qc_statements(&self.qc_statements, &self.qc_types),
            ));
        }

        let key_pair = match &self.key_pem {
            Some(pem) => KeyPair::from_pem(pem).unwrap(),
            None => KeyPair::generate().unwrap(),
        };
        let certificate = params.self_signed(&key_pair).unwrap();

        TestCertificate {
            certificate: Certificate::from_der(certificate.der().to_vec()).unwrap(),
            key_pair,
        }
    }
}

fn oid(value: &str) -> ObjectIdentifier {
    ObjectIdentifier::from_slice(
        &value
            .split('.')
            .map(|arc| arc.parse::<u64>().unwrap())
            .collect::<Vec<_>>(),
    )
}

fn encode_policies(policies: &[String]) -> Vec<u8> {
    yasna::construct_der(|writer| {
        writer.write_sequence_of(|writer| {
            for policy in policies {
                writer
                    .next()
                    .write_sequence(|writer| writer.next().write_oid(&oid(policy)));
            }
        })
    })
}

fn encode_qc_statements(statements: &[String], types: &[String]) -> Vec<u8> {
    yasna::construct_der(|writer| {
        writer.write_sequence_of(|writer| {
            for statement in statements {
                writer
                    .next()
                    .write_sequence(|writer| writer.next().write_oid(&oid(statement)));
            }
            if !types.is_empty() {
                writer.next().write_sequence(|writer| {
                    writer.next().write_oid(&oid("0.4.0.1862.1.6"));
                    writer.next().write_sequence_of(|writer| {
                        for qc_type in types {
                            writer.next().write_oid(&oid(qc_type));
                        }
                    });
                });
            }
        })
    })
}

/// Clock that only moves when told to.
pub struct TestClock {
    now: Mutex<OffsetDateTime>,
}

impl TestClock {
    pub fn new(now: OffsetDateTime) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(now),
        })
    }

    pub fn advance(&self, duration: time::Duration) {
        *self.now.lock() += duration;
    }
}

impl Clock for TestClock {
    fn now_utc(&self) -> OffsetDateTime {
        *self.now.lock()
    }
}

pub struct PointerFixture<'a> {
    pub territory: &'a str,
    pub location: &'a str,
    pub mime_type: &'a str,
    pub certificates: Vec<&'a TestCertificate>,
}

pub const LOTL_TSL_TYPE: &str = "http://uri.etsi.org/TrstSvc/TrustedList/TSLType/EUlistofthelists";
pub const GENERIC_TSL_TYPE: &str = "http://uri.etsi.org/TrstSvc/TrustedList/TSLType/EUgeneric";

/// Unsigned LOTL with the given scheme information URIs and pointers.
pub fn lotl_xml(scheme_information_uris: &[&str], pointers: &[PointerFixture<'_>]) -> String {
    let uris: String = scheme_information_uris
        .iter()
        .map(|uri| format!(r#"<tsl:URI xml:lang="en">{uri}</tsl:URI>"#))
        .collect();

    let pointers: String = pointers
        .iter()
        .map(|pointer| {
            let identities: String = pointer
                .certificates
                .iter()
                .map(|certificate| {
                    format!(
                        "<tsl:ServiceDigitalIdentity><tsl:DigitalId><tsl:X509Certificate>{}</tsl:X509Certificate></tsl:DigitalId></tsl:ServiceDigitalIdentity>",
                        certificate.base64()
                    )
                })
                .collect();
            let tsl_type = if pointer.territory == "EU" {
                LOTL_TSL_TYPE
            } else {
                GENERIC_TSL_TYPE
            };
            format!(
                "<tsl:OtherTSLPointer><tsl:ServiceDigitalIdentities>{identities}</tsl:ServiceDigitalIdentities><tsl:TSLLocation>{}</tsl:TSLLocation><tsl:AdditionalInformation><tsl:OtherInformation><tsl:TSLType>{tsl_type}</tsl:TSLType></tsl:OtherInformation><tsl:OtherInformation><tsl:SchemeTerritory>{}</tsl:SchemeTerritory></tsl:OtherInformation><tsl:OtherInformation><add:MimeType>{}</add:MimeType></tsl:OtherInformation></tsl:AdditionalInformation></tsl:OtherTSLPointer>",
                pointer.location, pointer.territory, pointer.mime_type
            )
        })
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<tsl:TrustServiceStatusList xmlns:tsl="http://uri.etsi.org/02231/v2#" xmlns:add="http://uri.etsi.org/02231/v2/additionaltypes#" Id="lotl">
  <tsl:SchemeInformation>
    <tsl:TSLVersionIdentifier>5</tsl:TSLVersionIdentifier>
    <tsl:SchemeTerritory>EU</tsl:SchemeTerritory>
    <tsl:SchemeInformationURI>{uris}</tsl:SchemeInformationURI>
    <tsl:PointersToOtherTSL>{pointers}</tsl:PointersToOtherTSL>
  </tsl:SchemeInformation>
</tsl:TrustServiceStatusList>"#
    )
}

pub const GRANTED: &str = "http://uri.etsi.org/TrstSvc/TrustedList/Svcstatus/granted";
pub const WITHDRAWN: &str = "http://uri.etsi.org/TrstSvc/TrustedList/Svcstatus/withdrawn";

pub struct StatusFixture<'a> {
    pub status: &'a str,
    pub start: &'a str,
    /// Raw `Extension` elements.
    pub extensions: Vec<String>,
}

pub struct ServiceFixture<'a> {
    pub service_type: &'a str,
    pub name: &'a str,
    pub certificate: &'a TestCertificate,
    pub current: StatusFixture<'a>,
    pub history: Vec<StatusFixture<'a>>,
}

pub fn additional_information_extension(uri: &str) -> String {
    format!(
        r#"<tsl:Extension Critical="false"><tsl:AdditionalServiceInformation><tsl:URI xml:lang="en">{uri}</tsl:URI></tsl:AdditionalServiceInformation></tsl:Extension>"#
    )
}

/// `criteria` is the raw content of the `CriteriaList` element.
pub fn qualification_extension(qualifiers: &[&str], assert: &str, criteria: &str) -> String {
    let qualifiers: String = qualifiers
        .iter()
        .map(|qualifier| {
            format!(
                r#"<ecc:Qualifier uri="http://uri.etsi.org/TrstSvc/TrustedList/SvcInfoExt/{qualifier}"/>"#
            )
        })
        .collect();
    format!(
        r#"<tsl:Extension Critical="true"><ecc:Qualifications><ecc:QualificationElement><ecc:Qualifiers>{qualifiers}</ecc:Qualifiers><ecc:CriteriaList assert="{assert}">{criteria}</ecc:CriteriaList></ecc:QualificationElement></ecc:Qualifications></tsl:Extension>"#
    )
}

fn service_information(
    element: &str,
    service: &ServiceFixture<'_>,
    status: &StatusFixture<'_>,
) -> String {
    let extensions = if status.extensions.is_empty() {
        String::new()
    } else {
        format!(
            "<tsl:ServiceInformationExtensions>{}</tsl:ServiceInformationExtensions>",
            status.extensions.concat()
        )
    };
    format!(
        r#"<tsl:{element}><tsl:ServiceTypeIdentifier>{}</tsl:ServiceTypeIdentifier><tsl:ServiceName><tsl:Name xml:lang="en">{}</tsl:Name></tsl:ServiceName><tsl:ServiceDigitalIdentity><tsl:DigitalId><tsl:X509Certificate>{}</tsl:X509Certificate></tsl:DigitalId></tsl:ServiceDigitalIdentity><tsl:ServiceStatus>{}</tsl:ServiceStatus><tsl:StatusStartingTime>{}</tsl:StatusStartingTime>{extensions}</tsl:{element}>"#,
        service.service_type,
        service.name,
        service.certificate.base64(),
        status.status,
        status.start,
    )
}

/// Unsigned national trusted list with one provider offering `services`.
pub fn country_tsl_xml(territory: &str, services: &[ServiceFixture<'_>]) -> String {
    let services: String = services
        .iter()
        .map(|service| {
            let history: String = service
                .history
                .iter()
                .map(|status| service_information("ServiceHistoryInstance", service, status))
                .collect();
            let history = if history.is_empty() {
                history
            } else {
                format!("<tsl:ServiceHistory>{history}</tsl:ServiceHistory>")
            };
            format!(
                "<tsl:TSPService>{}{history}</tsl:TSPService>",
                service_information("ServiceInformation", service, &service.current)
            )
        })
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<tsl:TrustServiceStatusList xmlns:tsl="http://uri.etsi.org/02231/v2#" xmlns:ecc="http://uri.etsi.org/TrstSvc/SvcInfoExt/eSigDir-1999-93-EC-TrustedList/#" xmlns:xades="http://uri.etsi.org/01903/v1.3.2#" xmlns:ext="http://uri.etsi.org/TrstSvc/SvcInfoExt/eSigDir-1999-93-EC-TrustedList/additionaltypes#" Id="tsl-{territory}">
  <tsl:SchemeInformation>
    <tsl:SchemeTerritory>{territory}</tsl:SchemeTerritory>
  </tsl:SchemeInformation>
  <tsl:TrustServiceProviderList>
    <tsl:TrustServiceProvider>
      <tsl:TSPInformation><tsl:TSPName><tsl:Name xml:lang="en">{territory} Trust Provider</tsl:Name></tsl:TSPName></tsl:TSPInformation>
      <tsl:TSPServices>{services}</tsl:TSPServices>
    </tsl:TrustServiceProvider>
  </tsl:TrustServiceProviderList>
</tsl:TrustServiceStatusList>"#
    )
}

pub const LOTL_URL: &str = "https://ec.europa.eu/tools/lotl/eu-lotl.xml";
pub const OJ_PUBLICATION: &str =
    "https://eur-lex.europa.eu/legal-content/EN/TXT/?uri=uriserv:OJ.C_.2019.276.01.0001.01.ENG";
pub const SK_TSL_URL: &str = "https://tl.example.sk/tsl.xml";
pub const AT_TSL_URL: &str = "https://tl.example.at/tsl.xml";
pub const SCOPE_ESIG: &str = "http://uri.etsi.org/TrstSvc/TrustedList/SvcInfoExt/ForeSignatures";
pub const SCOPE_WSA: &str =
    "http://uri.etsi.org/TrstSvc/TrustedList/SvcInfoExt/ForWebSiteAuthentication";

/// Retriever answering from a fixed URL map, `None` for anything else.
pub fn serving_retriever(resources: Vec<(&str, String)>) -> MockResourceRetriever {
    let resources: HashMap<String, Vec<u8>> = resources
        .into_iter()
        .map(|(url, body)| (url.to_owned(), body.into_bytes()))
        .collect();

    let mut retriever = MockResourceRetriever::new();
    retriever
        .expect_get_bytes_by_url()
        .returning(move |url| Ok(resources.get(url).cloned()));
    retriever
}

/// A signed LOTL announced by the Official Journal, pointing to signed Slovak and Austrian
/// lists with one granted CA/QC service each.
pub struct TrustedListEcosystem {
    pub lotl_signer: TestCertificate,
    pub sk_signer: TestCertificate,
    pub sk_ca: TestCertificate,
    pub at_signer: TestCertificate,
    pub at_ca: TestCertificate,
}

impl TrustedListEcosystem {
    pub fn new() -> Self {
        Self {
            lotl_signer: TestCertificate::builder("EU LOTL signer").build(),
            sk_signer: TestCertificate::builder("SK TL signer").country("SK").build(),
            sk_ca: TestCertificate::builder("SK Qualified CA")
                .country("SK")
                .ca()
                .build(),
            at_signer: TestCertificate::builder("AT TL signer").country("AT").build(),
            at_ca: TestCertificate::builder("AT Qualified CA")
                .country("AT")
                .ca()
                .build(),
        }
    }

    pub fn lotl(&self) -> String {
        self.lotl_signer.sign_xml(&lotl_xml(
            &[OJ_PUBLICATION],
            &[
                PointerFixture {
                    territory: "EU",
                    location: LOTL_URL,
                    mime_type: XML_MIME_TYPE,
                    certificates: vec![&self.lotl_signer],
                },
                PointerFixture {
                    territory: "SK",
                    location: SK_TSL_URL,
                    mime_type: XML_MIME_TYPE,
                    certificates: vec![&self.sk_signer],
                },
                PointerFixture {
                    territory: "AT",
                    location: AT_TSL_URL,
                    mime_type: XML_MIME_TYPE,
                    certificates: vec![&self.at_signer],
                },
            ],
        ))
    }

    pub fn sk_tsl(&self) -> String {
        national_tsl("SK", &self.sk_signer, &self.sk_ca)
    }

    pub fn at_tsl(&self) -> String {
        national_tsl("AT", &self.at_signer, &self.at_ca)
    }

    pub fn official_journal_certificates(&self) -> Vec<Certificate> {
        vec![self.lotl_signer.certificate.clone()]
    }

    pub fn retriever(&self) -> MockResourceRetriever {
        serving_retriever(vec![
            (LOTL_URL, self.lotl()),
            (SK_TSL_URL, self.sk_tsl()),
            (AT_TSL_URL, self.at_tsl()),
        ])
    }
}

fn national_tsl(territory: &str, signer: &TestCertificate, ca: &TestCertificate) -> String {
    let name = format!("{territory} Qualified CA service");
    signer.sign_xml(&country_tsl_xml(
        territory,
        &[ServiceFixture {
            service_type: service_type::CA_QC,
            name: &name,
            certificate: ca,
            current: StatusFixture {
                status: GRANTED,
                start: "2016-06-30T22:00:00Z",
                extensions: vec![additional_information_extension(SCOPE_ESIG)],
            },
            history: vec![],
        }],
    ))
}
