use std::fmt::Display;

use thiserror::Error;

use crate::hasher::HashAlgorithm;

mod dsa_verifier;
mod ecdsa_verifier;
mod rsa_verifier;


#[derive(Debug, PartialEq, Eq, Error)]
pub enum SignerError {
    #[error("Could not extract public key: `{0}`")]
    CouldNotExtractPublicKey(String),
    #[error("Malformed signature value: `{0}`")]
    MalformedSignature(String),
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Unsupported scheme `{0}`")]
    UnsupportedScheme(String),
}

/// Signature scheme together with the digest applied to the signed octets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SignatureScheme {
    RsaPkcs1(HashAlgorithm),
    RsaPss(HashAlgorithm),
    Dsa(HashAlgorithm),
    Ecdsa(HashAlgorithm),
}

impl Display for SignatureScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RsaPkcs1(hash) => write!(f, "RSA-PKCS1-v1_5 with {hash}"),
            Self::RsaPss(hash) => write!(f, "RSA-PSS with {hash}"),
            Self::Dsa(hash) => write!(f, "DSA with {hash}"),
            Self::Ecdsa(hash) => write!(f, "ECDSA with {hash}"),
        }
    }
}

impl SignatureScheme {
    pub fn hash_algorithm(&self) -> HashAlgorithm {
        match self {
            Self::RsaPkcs1(hash) | Self::RsaPss(hash) | Self::Dsa(hash) | Self::Ecdsa(hash) => {
                *hash
            }
        }
    }
}

#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
pub trait SignatureVerifier: Send + Sync {
    /// Verifies `signature` over `message`.
    ///
    /// `public_key` is a DER encoded SubjectPublicKeyInfo as found in X.509 certificates.
    fn verify(
        &self,
        scheme: SignatureScheme,
        public_key: &[u8],
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), SignerError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SignatureVerifierImpl;

impl SignatureVerifier for SignatureVerifierImpl {
    fn verify(
        &self,
        scheme: SignatureScheme,
        public_key: &[u8],
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), SignerError> {
        verify_signature(scheme, public_key, message, signature)
    }
}

pub fn verify_signature(
    scheme: SignatureScheme,
    public_key: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<(), SignerError> {
    let digest = scheme.hash_algorithm().digest(message);

    match scheme {
        SignatureScheme::RsaPkcs1(hash) => {
            rsa_verifier::verify_pkcs1v15(hash, public_key, &digest, signature)
        }
        SignatureScheme::RsaPss(hash) => {
            rsa_verifier::verify_pss(hash, public_key, &digest, signature)
        }
        SignatureScheme::Dsa(_) => {
            dsa_verifier::verify_prehashed(public_key, &digest, signature)
        }
        SignatureScheme::Ecdsa(_) => {
            ecdsa_verifier::verify_prehashed(public_key, &digest, signature)
        }
    }
}
