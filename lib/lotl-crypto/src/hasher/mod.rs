use ct_codecs::{Base64, Encoder};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use strum::Display;
use thiserror::Error;

#[derive(Debug, PartialEq, Eq, Error)]
pub enum HasherError {
    #[error("Could not hash")]
    CouldNotHash,
}

#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
pub trait Hasher: Send + Sync {
    fn hash_base64(&self, input: &[u8]) -> Result<String, HasherError>;
    fn hash(&self, input: &[u8]) -> Result<Vec<u8>, HasherError>;
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    #[strum(serialize = "SHA-1")]
    Sha1,
    #[strum(serialize = "SHA-256")]
    Sha256,
    #[strum(serialize = "SHA-384")]
    Sha384,
    #[strum(serialize = "SHA-512")]
    Sha512,
}

impl HashAlgorithm {
    pub fn digest(&self, input: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha1 => Sha1::digest(input).to_vec(),
            Self::Sha256 => Sha256::digest(input).to_vec(),
            Self::Sha384 => Sha384::digest(input).to_vec(),
            Self::Sha512 => Sha512::digest(input).to_vec(),
        }
    }

    pub fn output_len(&self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }
}

impl Hasher for HashAlgorithm {
    fn hash_base64(&self, input: &[u8]) -> Result<String, HasherError> {
        Base64::encode_to_string(self.digest(input)).map_err(|_| HasherError::CouldNotHash)
    }

    fn hash(&self, input: &[u8]) -> Result<Vec<u8>, HasherError> {
        Ok(self.digest(input))
    }
}
