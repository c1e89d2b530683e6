use std::sync::Arc;

use lotl_crypto::signer::MockSignatureVerifier;
use similar_asserts::assert_eq;

use super::*;
use crate::model::report::{ReportItemStatus, ValidationResult};
use crate::test_utilities::{TestCertificate, lotl_xml};

const DOCUMENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<list xmlns="http://uri.etsi.org/02231/v2#" Id="list">
  <entry>first</entry>
  <entry>second &amp; third</entry>
</list>"#;

fn signer() -> TestCertificate {
    TestCertificate::builder("LOTL signer").country("EU").build()
}

fn single_item(report: &ValidationReport) -> &ReportItem {
    assert_eq!(report.items().len(), 1, "{report:?}");
    &report.items()[0]
}

#[test]
fn test_valid_signature() {
    let signer = signer();
    let signed = signer.sign_xml(DOCUMENT);

    let validator = XmlSignatureValidator::new(vec![signer.certificate.clone()]);
    let report = validator.validate(signed.as_bytes());

    let item = single_item(&report);
    assert_eq!(item.status, ReportItemStatus::Info);
    assert_eq!(item.code, ReportCode::XmlSignatureVerified);
    assert_eq!(
        validator.verify(signed.as_bytes()).unwrap(),
        SignatureVerdict::Valid {
            signing_certificate: signer.certificate
        }
    );
}

#[test]
fn test_valid_signature_on_generated_lotl() {
    let signer = signer();
    let signed = signer.sign_xml(&lotl_xml(&["https://example.com/pivot-1.xml"], &[]));

    let report = XmlSignatureValidator::new(vec![signer.certificate.clone()]).validate(signed.as_bytes());
    assert_eq!(report.validation_result(), ValidationResult::Valid);
}

#[test]
fn test_content_tampering_is_detected() {
    let signer = signer();
    let signed = signer.sign_xml(DOCUMENT).replace("first", "fir5t");

    let report = XmlSignatureValidator::new(vec![signer.certificate]).validate(signed.as_bytes());

    let item = single_item(&report);
    assert_eq!(item.status, ReportItemStatus::Invalid);
    assert_eq!(item.code, ReportCode::XmlSignatureVerificationFailed);
    assert!(item.cause.as_deref().unwrap().contains("digest"));
}

#[test]
fn test_signed_info_tampering_is_detected() {
    let signer = signer();
    let signed = signer
        .sign_xml(DOCUMENT)
        .replace(r#"Reference URI="""#, r#"Reference URI="" Type="x""#);

    let report = XmlSignatureValidator::new(vec![signer.certificate]).validate(signed.as_bytes());

    let item = single_item(&report);
    assert_eq!(item.code, ReportCode::XmlSignatureVerificationFailed);
    assert!(item.cause.as_deref().unwrap().contains("SignedInfo"));
}

#[test]
fn test_signature_value_tampering_is_detected() {
    let signer = signer();
    let signed = signer.sign_xml(DOCUMENT);
    let start = signed.find("<ds:SignatureValue>").unwrap() + "<ds:SignatureValue>".len();
    let replacement = if &signed[start..start + 1] == "A" { "B" } else { "A" };
    let tampered = format!("{}{}{}", &signed[..start], replacement, &signed[start + 1..]);

    let report = XmlSignatureValidator::new(vec![signer.certificate]).validate(tampered.as_bytes());

    let item = single_item(&report);
    assert_eq!(item.status, ReportItemStatus::Invalid);
    assert_eq!(item.code, ReportCode::XmlSignatureVerificationFailed);
}

#[test]
fn test_untrusted_signer() {
    let signer = signer();
    let other = TestCertificate::builder("Someone else").build();
    let signed = signer.sign_xml(DOCUMENT);

    let report = XmlSignatureValidator::new(vec![other.certificate]).validate(signed.as_bytes());

    let item = single_item(&report);
    assert_eq!(item.code, ReportCode::XmlSignatureVerificationFailed);
    assert!(item.cause.as_deref().unwrap().contains("not trusted"));
}

#[test]
fn test_missing_key_info_is_an_exception() {
    let signer = signer();
    let signed = signer.sign_xml(DOCUMENT);
    let start = signed.find("<ds:KeyInfo>").unwrap();
    let end = signed.find("</ds:KeyInfo>").unwrap() + "</ds:KeyInfo>".len();
    let stripped = format!("{}{}", &signed[..start], &signed[end..]);

    let report = XmlSignatureValidator::new(vec![signer.certificate]).validate(stripped.as_bytes());

    let item = single_item(&report);
    assert_eq!(item.status, ReportItemStatus::Invalid);
    assert_eq!(item.code, ReportCode::XmlSignatureVerificationException);
    assert!(item.cause.as_deref().unwrap().contains("Key info"));
}

#[test]
fn test_unsigned_and_malformed_documents_are_exceptions() {
    let validator = XmlSignatureValidator::new(vec![]);

    let item = single_item(&validator.validate(DOCUMENT.as_bytes())).clone();
    assert_eq!(item.code, ReportCode::XmlSignatureVerificationException);
    assert_eq!(item.cause.as_deref(), Some("Signature element not found"));

    let item = single_item(&validator.validate(b"<not-closed>")).clone();
    assert_eq!(item.code, ReportCode::XmlSignatureVerificationException);

    let item = single_item(&validator.validate(&[0xff, 0xfe, 0x00])).clone();
    assert_eq!(item.code, ReportCode::XmlSignatureVerificationException);
}

#[test]
fn test_duplicate_ids_are_rejected() {
    let signer = signer();
    let signed = signer
        .sign_xml(DOCUMENT)
        .replace("<entry>first</entry>", r#"<entry Id="list">first</entry>"#);

    let result = XmlSignatureValidator::new(vec![signer.certificate]).verify(signed.as_bytes());
    assert!(matches!(result, Err(XmlSignatureError::DuplicateId(id)) if id == "list"));
}

#[test]
fn test_unsupported_signature_method() {
    let signer = signer();
    let signed = signer.sign_xml(DOCUMENT).replace(
        "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha256",
        "http://www.w3.org/2001/04/xmldsig-more#hmac-sha256",
    );

    let result = XmlSignatureValidator::new(vec![signer.certificate]).verify(signed.as_bytes());
    assert!(matches!(
        result,
        Err(XmlSignatureError::UnsupportedAlgorithm(uri)) if uri.ends_with("hmac-sha256")
    ));
}

#[test]
fn test_verifier_receives_canonical_signed_info() {
    let signer = signer();
    let signed = signer.sign_xml(DOCUMENT);

    let mut verifier = MockSignatureVerifier::new();
    verifier
        .expect_verify()
        .once()
        .withf(|scheme, _, message, _| {
            *scheme == lotl_crypto::SignatureScheme::Ecdsa(lotl_crypto::HashAlgorithm::Sha256)
                && message.starts_with(
                    br#"<ds:SignedInfo xmlns:ds="http://www.w3.org/2000/09/xmldsig#">"#,
                )
        })
        .returning(|_, _, _, _| Err(SignerError::CouldNotExtractPublicKey("test".to_owned())));

    let validator =
        XmlSignatureValidator::with_verifier(vec![signer.certificate], Arc::new(verifier));
    let item = single_item(&validator.validate(signed.as_bytes())).clone();

    assert_eq!(item.code, ReportCode::XmlSignatureVerificationException);
}

#[test]
fn test_reference_by_id() {
    let signer = signer();
    let signed = signer.sign_xml(DOCUMENT);
    let document = roxmltree::Document::parse(&signed).unwrap();
    let list = document.root_element();
    let signature = list
        .children()
        .find(|node| node.tag_name().name() == "Signature")
        .unwrap();

    let ids = collect_ids(&document).unwrap();
    assert_eq!(ids.len(), 2);

    let reference = signature
        .descendants()
        .find(|node| node.tag_name().name() == "Reference")
        .unwrap();
    assert_eq!(check_reference(&document, &ids, signature, reference).unwrap(), None);
}

#[test]
fn test_signature_over_embedded_object_only_is_rejected() {
    let signer = signer();
    let forged = signer.sign_xml_object(
        &lotl_xml(&["https://attacker.example/eu-lotl-pivot-evil.xml"], &[]),
        "harmless",
    );

    let validator = XmlSignatureValidator::new(vec![signer.certificate]);
    let verdict = validator.verify(forged.as_bytes()).unwrap();
    assert!(matches!(
        verdict,
        SignatureVerdict::Invalid { reason } if reason.contains("document element")
    ));

    let item = single_item(&validator.validate(forged.as_bytes())).clone();
    assert_eq!(item.status, ReportItemStatus::Invalid);
    assert_eq!(item.code, ReportCode::XmlSignatureVerificationFailed);
}

#[test]
fn test_nested_signature_is_not_used() {
    let signer = signer();
    let signed = signer
        .sign_xml(DOCUMENT)
        .replace(r#"<?xml version="1.0" encoding="UTF-8"?>"#, "");
    let wrapped = format!("<wrapper><payload>forged</payload>{signed}</wrapper>");

    let result = XmlSignatureValidator::new(vec![signer.certificate]).verify(wrapped.as_bytes());
    assert!(matches!(result, Err(XmlSignatureError::MissingSignature)));
}

#[test]
fn test_reference_without_enveloped_transform_does_not_cover_document() {
    let signer = signer();
    let signed = signer.sign_xml(DOCUMENT);
    let document = roxmltree::Document::parse(&signed).unwrap();
    let reference = document
        .descendants()
        .find(|node| node.tag_name().name() == "Reference")
        .unwrap();
    assert!(is_enveloped_document_reference(&document, reference).unwrap());

    let stripped = signed.replace(
        r#"<ds:Transform Algorithm="http://www.w3.org/2000/09/xmldsig#enveloped-signature"/>"#,
        "",
    );
    let document = roxmltree::Document::parse(&stripped).unwrap();
    let reference = document
        .descendants()
        .find(|node| node.tag_name().name() == "Reference")
        .unwrap();
    assert!(!is_enveloped_document_reference(&document, reference).unwrap());
}

const INDEPENDENTLY_SIGNED_LOTL: &str = include_str!("test_data/independently_signed_lotl.xml");
const INDEPENDENT_SIGNER: &str = include_str!("test_data/independent_signer.der.b64");

#[test]
fn test_externally_signed_lotl_with_rsa_and_exclusive_c14n() {
    let signer = Certificate::from_base64(INDEPENDENT_SIGNER).unwrap();
    let validator = XmlSignatureValidator::new(vec![signer.clone()]);

    assert_eq!(
        validator.verify(INDEPENDENTLY_SIGNED_LOTL.as_bytes()).unwrap(),
        SignatureVerdict::Valid {
            signing_certificate: signer
        }
    );

    let content =
        crate::provider::trust_list_parser::parse_lotl(INDEPENDENTLY_SIGNED_LOTL.as_bytes())
            .unwrap();
    assert_eq!(content.scheme_information_uris.len(), 2);
    assert!(content.scheme_information_uris[1].ends_with("ENG&lang=en"));
}

#[test]
fn test_externally_signed_lotl_ignores_redundant_declarations_only() {
    let signer = Certificate::from_base64(INDEPENDENT_SIGNER).unwrap();
    let validator = XmlSignatureValidator::new(vec![signer]);

    let redeclared = INDEPENDENTLY_SIGNED_LOTL.replace(
        "<add:MimeType>",
        r#"<add:MimeType xmlns:tsl="http://uri.etsi.org/02231/v2#">"#,
    );
    let report = validator.validate(redeclared.as_bytes());
    assert_eq!(single_item(&report).code, ReportCode::XmlSignatureVerified);

    let extended = INDEPENDENTLY_SIGNED_LOTL.replace("<add:MimeType>", r#"<add:MimeType data="x">"#);
    let report = validator.validate(extended.as_bytes());
    let item = single_item(&report);
    assert_eq!(item.code, ReportCode::XmlSignatureVerificationFailed);
    assert!(item.cause.as_deref().unwrap().contains("digest"));
}
