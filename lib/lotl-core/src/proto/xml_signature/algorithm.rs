use lotl_crypto::{HashAlgorithm, SignatureScheme};

use super::XmlSignatureError;
use super::c14n::Canonicalization;

pub(crate) const ENVELOPED_SIGNATURE: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";
pub(crate) const EXCLUSIVE_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
pub(crate) const EXCLUSIVE_C14N_WITH_COMMENTS: &str =
    "http://www.w3.org/2001/10/xml-exc-c14n#WithComments";
pub(crate) const INCLUSIVE_C14N: &str = "http://www.w3.org/TR/2001/REC-xml-c14n-20010315";
pub(crate) const INCLUSIVE_C14N_WITH_COMMENTS: &str =
    "http://www.w3.org/TR/2001/REC-xml-c14n-20010315#WithComments";
pub(crate) const INCLUSIVE_C14N_11: &str = "http://www.w3.org/2006/12/xml-c14n11";
pub(crate) const INCLUSIVE_C14N_11_WITH_COMMENTS: &str =
    "http://www.w3.org/2006/12/xml-c14n11#WithComments";

pub(crate) fn canonicalization(
    uri: &str,
    inclusive_prefixes: Vec<String>,
) -> Result<Canonicalization, XmlSignatureError> {
    match uri {
        INCLUSIVE_C14N
        | INCLUSIVE_C14N_WITH_COMMENTS
        | INCLUSIVE_C14N_11
        | INCLUSIVE_C14N_11_WITH_COMMENTS => Ok(Canonicalization::Inclusive),
        EXCLUSIVE_C14N | EXCLUSIVE_C14N_WITH_COMMENTS => {
            Ok(Canonicalization::Exclusive { inclusive_prefixes })
        }
        other => Err(XmlSignatureError::UnsupportedAlgorithm(other.to_owned())),
    }
}

pub(crate) fn digest_algorithm(uri: &str) -> Result<HashAlgorithm, XmlSignatureError> {
    match uri {
        "http://www.w3.org/2000/09/xmldsig#sha1" => Ok(HashAlgorithm::Sha1),
        "http://www.w3.org/2001/04/xmlenc#sha256" => Ok(HashAlgorithm::Sha256),
        "http://www.w3.org/2001/04/xmldsig-more#sha384" => Ok(HashAlgorithm::Sha384),
        "http://www.w3.org/2001/04/xmlenc#sha512" => Ok(HashAlgorithm::Sha512),
        other => Err(XmlSignatureError::UnsupportedAlgorithm(other.to_owned())),
    }
}

pub(crate) fn signature_scheme(uri: &str) -> Result<SignatureScheme, XmlSignatureError> {
    use HashAlgorithm::*;

    let scheme = match uri {
        "http://www.w3.org/2000/09/xmldsig#rsa-sha1" => SignatureScheme::RsaPkcs1(Sha1),
        "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256" => SignatureScheme::RsaPkcs1(Sha256),
        "http://www.w3.org/2001/04/xmldsig-more#rsa-sha384" => SignatureScheme::RsaPkcs1(Sha384),
        "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512" => SignatureScheme::RsaPkcs1(Sha512),
        "http://www.w3.org/2007/05/xmldsig-more#sha1-rsa-MGF1" => SignatureScheme::RsaPss(Sha1),
        "http://www.w3.org/2007/05/xmldsig-more#sha256-rsa-MGF1" => SignatureScheme::RsaPss(Sha256),
        "http://www.w3.org/2007/05/xmldsig-more#sha384-rsa-MGF1" => SignatureScheme::RsaPss(Sha384),
        "http://www.w3.org/2007/05/xmldsig-more#sha512-rsa-MGF1" => SignatureScheme::RsaPss(Sha512),
        "http://www.w3.org/2000/09/xmldsig#dsa-sha1" => SignatureScheme::Dsa(Sha1),
        "http://www.w3.org/2009/xmldsig11#dsa-sha256" => SignatureScheme::Dsa(Sha256),
        "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha1" => SignatureScheme::Ecdsa(Sha1),
        "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha256" => SignatureScheme::Ecdsa(Sha256),
        "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha384" => SignatureScheme::Ecdsa(Sha384),
        "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha512" => SignatureScheme::Ecdsa(Sha512),
        other => return Err(XmlSignatureError::UnsupportedAlgorithm(other.to_owned())),
    };
    Ok(scheme)
}
