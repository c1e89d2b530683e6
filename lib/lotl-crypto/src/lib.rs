//! Hashing and raw signature verification primitives used to authenticate
//! trusted list documents.

pub mod hasher;
pub mod signer;

pub use hasher::{HashAlgorithm, Hasher, HasherError};
pub use signer::{
    SignatureScheme, SignatureVerifier, SignatureVerifierImpl, SignerError, verify_signature,
};
