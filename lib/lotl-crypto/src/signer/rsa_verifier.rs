use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Sign, Pss, RsaPublicKey};
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};

use super::SignerError;
use crate::hasher::HashAlgorithm;

fn public_key(public_key: &[u8]) -> Result<RsaPublicKey, SignerError> {
    RsaPublicKey::from_public_key_der(public_key)
        .map_err(|e| SignerError::CouldNotExtractPublicKey(e.to_string()))
}

pub(super) fn verify_pkcs1v15(
    hash: HashAlgorithm,
    key: &[u8],
    digest: &[u8],
    signature: &[u8],
) -> Result<(), SignerError> {
    let key = public_key(key)?;
    let padding = match hash {
        HashAlgorithm::Sha1 => Pkcs1v15Sign::new::<Sha1>(),
        HashAlgorithm::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
        HashAlgorithm::Sha384 => Pkcs1v15Sign::new::<Sha384>(),
        HashAlgorithm::Sha512 => Pkcs1v15Sign::new::<Sha512>(),
    };

    key.verify(padding, digest, signature)
        .map_err(|_| SignerError::InvalidSignature)
}

/// MGF1 uses the same digest as the message and the salt is as long as the digest.
pub(super) fn verify_pss(
    hash: HashAlgorithm,
    key: &[u8],
    digest: &[u8],
    signature: &[u8],
) -> Result<(), SignerError> {
    let key = public_key(key)?;
    let padding = match hash {
        HashAlgorithm::Sha1 => Pss::new::<Sha1>(),
        HashAlgorithm::Sha256 => Pss::new::<Sha256>(),
        HashAlgorithm::Sha384 => Pss::new::<Sha384>(),
        HashAlgorithm::Sha512 => Pss::new::<Sha512>(),
    };

    key.verify(padding, digest, signature)
        .map_err(|_| SignerError::InvalidSignature)
}
