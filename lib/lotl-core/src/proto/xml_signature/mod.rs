//! Enveloped XML-DSig verification of trusted list documents.

use std::collections::HashMap;
use std::sync::Arc;

use ct_codecs::{Base64, Decoder};
use lotl_crypto::{SignatureVerifier, SignatureVerifierImpl, SignerError};
use roxmltree::{Document, Node};
use thiserror::Error;

use self::c14n::canonicalize;
use crate::model::certificate::{Certificate, CertificateError};
use crate::model::report::{ReportCode, ReportItem, ValidationReport, XML_SIGNATURE_CHECK};

pub(crate) mod algorithm;
pub(crate) mod c14n;

#[cfg(test)]
mod test;

pub const DSIG_NAMESPACE: &str = "http://www.w3.org/2000/09/xmldsig#";
const INCLUSIVE_NAMESPACES: &str = "InclusiveNamespaces";

#[derive(Debug, Error)]
pub enum XmlSignatureError {
    #[error("XML parsing failed: `{0}`")]
    Parsing(String),
    #[error("Signature element not found")]
    MissingSignature,
    #[error("Missing `{0}` element")]
    MissingElement(&'static str),
    #[error("Missing `Algorithm` attribute on `{0}`")]
    MissingAlgorithm(String),
    #[error("Unsupported algorithm `{0}`")]
    UnsupportedAlgorithm(String),
    #[error("Unsupported reference URI `{0}`")]
    UnsupportedReference(String),
    #[error("Duplicate element ID `{0}`")]
    DuplicateId(String),
    #[error("Invalid base64 content in `{0}`")]
    InvalidBase64(&'static str),
    #[error("Key info with an X.509 certificate is missing")]
    MissingKeyInfo,
    #[error(transparent)]
    Certificate(#[from] CertificateError),
    #[error(transparent)]
    Signer(#[from] SignerError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignatureVerdict {
    Valid { signing_certificate: Certificate },
    Invalid { reason: String },
}

/// Verifies the signature of XML documents made with one of the trusted certificates.
#[derive(Clone)]
pub struct XmlSignatureValidator {
    trusted_certificates: Vec<Certificate>,
    signature_verifier: Arc<dyn SignatureVerifier>,
}

impl XmlSignatureValidator {
    pub fn new(trusted_certificates: Vec<Certificate>) -> Self {
        Self::with_verifier(trusted_certificates, Arc::new(SignatureVerifierImpl))
    }

    pub fn with_verifier(
        trusted_certificates: Vec<Certificate>,
        signature_verifier: Arc<dyn SignatureVerifier>,
    ) -> Self {
        Self {
            trusted_certificates,
            signature_verifier,
        }
    }

    /// Produces exactly one report item: INFO on success,
    /// `XML_SIGNATURE_VERIFICATION_FAILED` when the document or signature does not match,
    /// `XML_SIGNATURE_VERIFICATION_EXCEPTION` when verification could not be carried out.
    pub fn validate(&self, xml: &[u8]) -> ValidationReport {
        let item = match self.verify(xml) {
            Ok(SignatureVerdict::Valid {
                signing_certificate,
            }) => ReportItem::info(XML_SIGNATURE_CHECK, ReportCode::XmlSignatureVerified)
                .with_detail(signing_certificate.subject()),
            Ok(SignatureVerdict::Invalid { reason }) => {
                tracing::debug!("XML signature invalid: {reason}");
                ReportItem::invalid(
                    XML_SIGNATURE_CHECK,
                    ReportCode::XmlSignatureVerificationFailed,
                )
                .with_cause(reason)
            }
            Err(error) => {
                tracing::debug!("XML signature verification error: {error}");
                ReportItem::invalid(
                    XML_SIGNATURE_CHECK,
                    ReportCode::XmlSignatureVerificationException,
                )
                .with_cause(error)
            }
        };

        let mut report = ValidationReport::new();
        report.add_report_item(item);
        report
    }

    pub fn verify(&self, xml: &[u8]) -> Result<SignatureVerdict, XmlSignatureError> {
        let text =
            std::str::from_utf8(xml).map_err(|err| XmlSignatureError::Parsing(err.to_string()))?;
        let document =
            Document::parse(text).map_err(|err| XmlSignatureError::Parsing(err.to_string()))?;

        let ids = collect_ids(&document)?;
        let signature = find_signature(&document).ok_or(XmlSignatureError::MissingSignature)?;
        let signed_info = dsig_child(signature, "SignedInfo")
            .ok_or(XmlSignatureError::MissingElement("SignedInfo"))?;

        let canonicalization = canonicalization_method(
            dsig_child(signed_info, "CanonicalizationMethod")
                .ok_or(XmlSignatureError::MissingElement("CanonicalizationMethod"))?,
        )?;
        let scheme = algorithm::signature_scheme(algorithm_attribute(
            dsig_child(signed_info, "SignatureMethod")
                .ok_or(XmlSignatureError::MissingElement("SignatureMethod"))?,
        )?)?;
        let signature_value = decode_base64(
            dsig_child(signature, "SignatureValue")
                .ok_or(XmlSignatureError::MissingElement("SignatureValue"))?,
            "SignatureValue",
        )?;
        let signing_certificate = self.signing_certificate(signature)?;

        let references: Vec<_> = dsig_children(signed_info, "Reference").collect();
        if references.is_empty() {
            return Err(XmlSignatureError::MissingElement("Reference"));
        }
        let mut covers_document = false;
        for reference in references {
            if let Some(reason) = check_reference(&document, &ids, signature, reference)? {
                return Ok(SignatureVerdict::Invalid { reason });
            }
            covers_document |= is_enveloped_document_reference(&document, reference)?;
        }
        if !covers_document {
            return Ok(SignatureVerdict::Invalid {
                reason: "no enveloped reference covers the document element".to_owned(),
            });
        }

        let canonical_signed_info = canonicalize(signed_info, &canonicalization, None);
        let public_key = signing_certificate.public_key_info()?;
        match self.signature_verifier.verify(
            scheme,
            &public_key,
            canonical_signed_info.as_bytes(),
            &signature_value,
        ) {
            Ok(()) => {}
            Err(SignerError::InvalidSignature | SignerError::MalformedSignature(_)) => {
                return Ok(SignatureVerdict::Invalid {
                    reason: format!("{scheme} signature value does not match SignedInfo"),
                });
            }
            Err(error) => return Err(error.into()),
        }

        if !self.is_trusted(&signing_certificate) {
            return Ok(SignatureVerdict::Invalid {
                reason: format!(
                    "signing certificate `{}` is not trusted",
                    signing_certificate.subject()
                ),
            });
        }

        Ok(SignatureVerdict::Valid {
            signing_certificate,
        })
    }

    fn signing_certificate(&self, signature: Node<'_, '_>) -> Result<Certificate, XmlSignatureError> {
        let key_info = dsig_child(signature, "KeyInfo").ok_or(XmlSignatureError::MissingKeyInfo)?;
        let certificates = key_info
            .descendants()
            .filter(|node| is_dsig_element(*node, "X509Certificate"))
            .map(|node| Certificate::from_base64(node.text().unwrap_or_default()))
            .collect::<Result<Vec<_>, _>>()?;

        let preferred = certificates
            .iter()
            .position(|certificate| self.is_trusted(certificate))
            .unwrap_or(0);
        certificates
            .into_iter()
            .nth(preferred)
            .ok_or(XmlSignatureError::MissingKeyInfo)
    }

    fn is_trusted(&self, certificate: &Certificate) -> bool {
        let public_key = certificate.public_key_info().ok();
        self.trusted_certificates.iter().any(|trusted| {
            trusted == certificate
                || (public_key.is_some() && trusted.public_key_info().ok() == public_key)
        })
    }
}

fn check_reference(
    document: &Document<'_>,
    ids: &HashMap<&str, Node<'_, '_>>,
    signature: Node<'_, '_>,
    reference: Node<'_, '_>,
) -> Result<Option<String>, XmlSignatureError> {
    let uri = reference.attribute("URI").unwrap_or_default();
    let target = match uri {
        "" | "#xpointer(/)" => document.root(),
        _ => match uri.strip_prefix('#') {
            Some(id) => match ids.get(id) {
                Some(node) => *node,
                None => return Ok(Some(format!("referenced element `{id}` not found"))),
            },
            None => return Err(XmlSignatureError::UnsupportedReference(uri.to_owned())),
        },
    };

    let mut enveloped = false;
    let mut canonicalization = c14n::Canonicalization::Inclusive;
    if let Some(transforms) = dsig_child(reference, "Transforms") {
        for transform in dsig_children(transforms, "Transform") {
            if algorithm_attribute(transform)? == algorithm::ENVELOPED_SIGNATURE {
                enveloped = true;
            } else {
                canonicalization = canonicalization_method(transform)?;
            }
        }
    }

    let digest_algorithm = algorithm::digest_algorithm(algorithm_attribute(
        dsig_child(reference, "DigestMethod")
            .ok_or(XmlSignatureError::MissingElement("DigestMethod"))?,
    )?)?;
    let expected = decode_base64(
        dsig_child(reference, "DigestValue")
            .ok_or(XmlSignatureError::MissingElement("DigestValue"))?,
        "DigestValue",
    )?;

    let excluded = enveloped.then(|| signature.id());
    let canonical = canonicalize(target, &canonicalization, excluded);
    if digest_algorithm.digest(canonical.as_bytes()) != expected {
        return Ok(Some(format!("digest of reference `{uri}` does not match")));
    }

    Ok(None)
}

/// Whole-document references: the empty URI, `#xpointer(/)` or the ID of the document element.
fn is_enveloped_document_reference(
    document: &Document<'_>,
    reference: Node<'_, '_>,
) -> Result<bool, XmlSignatureError> {
    let uri = reference.attribute("URI").unwrap_or_default();
    let whole_document = match uri {
        "" | "#xpointer(/)" => true,
        _ => uri
            .strip_prefix('#')
            .is_some_and(|id| element_id(document.root_element()) == Some(id)),
    };
    if !whole_document {
        return Ok(false);
    }

    let Some(transforms) = dsig_child(reference, "Transforms") else {
        return Ok(false);
    };
    for transform in dsig_children(transforms, "Transform") {
        if algorithm_attribute(transform)? == algorithm::ENVELOPED_SIGNATURE {
            return Ok(true);
        }
    }
    Ok(false)
}

fn element_id<'a>(node: Node<'a, '_>) -> Option<&'a str> {
    ["Id", "ID", "id"]
        .into_iter()
        .find_map(|name| node.attribute(name))
}

fn collect_ids<'a, 'input>(
    document: &'a Document<'input>,
) -> Result<HashMap<&'a str, Node<'a, 'input>>, XmlSignatureError> {
    let mut ids = HashMap::new();
    for node in document.descendants().filter(Node::is_element) {
        for name in ["Id", "ID", "id"] {
            if let Some(id) = node.attribute(name) {
                if ids.insert(id, node).is_some() {
                    return Err(XmlSignatureError::DuplicateId(id.to_owned()));
                }
            }
        }
    }
    Ok(ids)
}

/// Only the enveloped signature placed directly under the document element is considered.
fn find_signature<'a, 'input>(document: &'a Document<'input>) -> Option<Node<'a, 'input>> {
    document
        .root_element()
        .children()
        .find(|node| is_dsig_element(*node, "Signature"))
}

fn canonicalization_method(
    node: Node<'_, '_>,
) -> Result<c14n::Canonicalization, XmlSignatureError> {
    let inclusive_prefixes = node
        .children()
        .find(|child| child.tag_name().name() == INCLUSIVE_NAMESPACES)
        .and_then(|child| child.attribute("PrefixList"))
        .map(|list| list.split_whitespace().map(ToOwned::to_owned).collect())
        .unwrap_or_default();

    algorithm::canonicalization(algorithm_attribute(node)?, inclusive_prefixes)
}

fn algorithm_attribute<'a>(node: Node<'a, '_>) -> Result<&'a str, XmlSignatureError> {
    node.attribute("Algorithm")
        .map(str::trim)
        .ok_or_else(|| XmlSignatureError::MissingAlgorithm(node.tag_name().name().to_owned()))
}

fn decode_base64(node: Node<'_, '_>, element: &'static str) -> Result<Vec<u8>, XmlSignatureError> {
    Base64::decode_to_vec(
        node.text().unwrap_or_default().trim(),
        Some(b" \n\r\t"),
    )
    .map_err(|_| XmlSignatureError::InvalidBase64(element))
}

fn is_dsig_element(node: Node<'_, '_>, name: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == name
        && node.tag_name().namespace() == Some(DSIG_NAMESPACE)
}

fn dsig_child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|child| is_dsig_element(*child, name))
}

fn dsig_children<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |child| is_dsig_element(*child, name))
}
