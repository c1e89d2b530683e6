use dsa::pkcs8::DecodePublicKey;
use dsa::{BigUint, Signature, VerifyingKey};
use signature::hazmat::PrehashVerifier;

use super::SignerError;

/// XML-DSig encodes DSA signatures as `r || s`, both halves of equal length.
pub(super) fn verify_prehashed(
    public_key: &[u8],
    digest: &[u8],
    signature: &[u8],
) -> Result<(), SignerError> {
    let key = VerifyingKey::from_public_key_der(public_key)
        .map_err(|e| SignerError::CouldNotExtractPublicKey(e.to_string()))?;

    if signature.is_empty() || signature.len() % 2 != 0 {
        return Err(SignerError::MalformedSignature(format!(
            "DSA signature of odd length {}",
            signature.len()
        )));
    }

    let (r, s) = signature.split_at(signature.len() / 2);
    let signature = Signature::from_components(BigUint::from_bytes_be(r), BigUint::from_bytes_be(s))
        .map_err(|e| SignerError::MalformedSignature(e.to_string()))?;

    key.verify_prehash(digest, &signature)
        .map_err(|_| SignerError::InvalidSignature)
}
