use p256::pkcs8::DecodePublicKey;
use signature::hazmat::PrehashVerifier;

use super::SignerError;

/// Verifies an ECDSA signature over an already computed digest.
///
/// The curve is taken from the key (P-256 or P-384). XML signatures carry `r || s`,
/// but DER encoded values are accepted as well.
pub(super) fn verify_prehashed(
    public_key: &[u8],
    digest: &[u8],
    signature: &[u8],
) -> Result<(), SignerError> {
    if let Ok(key) = p256::ecdsa::VerifyingKey::from_public_key_der(public_key) {
        let signature = p256::ecdsa::Signature::from_slice(signature)
            .or_else(|_| p256::ecdsa::Signature::from_der(signature))
            .map_err(|e| SignerError::MalformedSignature(e.to_string()))?;

        return key
            .verify_prehash(digest, &signature)
            .map_err(|_| SignerError::InvalidSignature);
    }

    if let Ok(key) = p384::ecdsa::VerifyingKey::from_public_key_der(public_key) {
        let signature = p384::ecdsa::Signature::from_slice(signature)
            .or_else(|_| p384::ecdsa::Signature::from_der(signature))
            .map_err(|e| SignerError::MalformedSignature(e.to_string()))?;

        return key
            .verify_prehash(digest, &signature)
            .map_err(|_| SignerError::InvalidSignature);
    }

    Err(SignerError::CouldNotExtractPublicKey(
        "unsupported or malformed EC public key".to_string(),
    ))
}
