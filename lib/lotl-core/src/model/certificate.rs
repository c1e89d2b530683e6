use std::fmt::{Debug, Formatter};

use ct_codecs::{Base64, Decoder};
use lotl_crypto::HashAlgorithm;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;

#[derive(Debug, PartialEq, Eq, Error)]
pub enum CertificateError {
    #[error("Certificate parsing failed: `{0}`")]
    ParsingFailed(String),
    #[error("Certificate encoding is not valid base64")]
    InvalidEncoding,
}

/// DER encoded X.509 certificate.
///
/// Two certificates are the same when their encodings are byte-identical,
/// [`Certificate::fingerprint`] is the hex SHA-256 of that encoding.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Certificate {
    der: Vec<u8>,
}

impl Certificate {
    pub fn from_der(der: Vec<u8>) -> Result<Self, CertificateError> {
        X509Certificate::from_der(&der)
            .map_err(|err| CertificateError::ParsingFailed(err.to_string()))?;
        Ok(Self { der })
    }

    /// Decodes the base64 body of an `X509Certificate` element, whitespace allowed.
    pub fn from_base64(value: &str) -> Result<Self, CertificateError> {
        let der = Base64::decode_to_vec(value.trim(), Some(b" \n\r\t"))
            .map_err(|_| CertificateError::InvalidEncoding)?;
        Self::from_der(der)
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn fingerprint(&self) -> String {
        hex::encode(HashAlgorithm::Sha256.digest(&self.der))
    }

    pub fn parse(&self) -> Result<X509Certificate<'_>, CertificateError> {
        X509Certificate::from_der(&self.der)
            .map(|(_, certificate)| certificate)
            .map_err(|err| CertificateError::ParsingFailed(err.to_string()))
    }

    pub fn subject(&self) -> String {
        self.parse()
            .map(|certificate| certificate.subject().to_string())
            .unwrap_or_default()
    }

    /// DER encoded SubjectPublicKeyInfo.
    pub fn public_key_info(&self) -> Result<Vec<u8>, CertificateError> {
        Ok(self.parse()?.public_key().raw.to_vec())
    }
}

impl Debug for Certificate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject())
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utilities::TestCertificate;

    #[test]
    fn test_certificate_identity_and_subject() {
        let issued = TestCertificate::builder("Test CA").build();
        let certificate = issued.certificate.clone();

        assert_eq!(certificate.fingerprint().len(), 64);
        assert!(certificate.subject().contains("CN=Test CA"));
        assert_eq!(
            Certificate::from_der(certificate.der().to_vec()).unwrap(),
            certificate
        );
    }

    #[test]
    fn test_certificate_from_base64_with_whitespace() {
        let issued = TestCertificate::builder("Whitespace").build();
        let encoded = issued.base64();
        let wrapped = encoded
            .as_bytes()
            .chunks(64)
            .map(|chunk| std::str::from_utf8(chunk).unwrap())
            .collect::<Vec<_>>()
            .join("\n");

        assert_eq!(
            Certificate::from_base64(&format!("\n  {wrapped}\n")).unwrap(),
            issued.certificate
        );
    }

    #[test]
    fn test_certificate_rejects_garbage() {
        assert!(matches!(
            Certificate::from_der(vec![1, 2, 3]),
            Err(CertificateError::ParsingFailed(_))
        ));
        assert_eq!(
            Certificate::from_base64("@@@"),
            Err(CertificateError::InvalidEncoding)
        );
    }
}
