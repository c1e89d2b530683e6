use lotl_crypto::HashAlgorithm;
use serde::{Deserialize, Serialize};

use super::certificate::Certificate;

pub const XML_MIME_TYPE: &str = "application/vnd.etsi.tsl+xml";

/// Pointer from the LOTL to one national trusted list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountrySpecificLotl {
    pub scheme_territory: String,
    pub tsl_location: String,
    pub mime_type: Option<String>,
    /// Certificates the LOTL publishes for verifying this list.
    pub signing_certificates: Vec<Certificate>,
}

impl CountrySpecificLotl {
    pub fn create_unique_identifier(&self) -> String {
        create_unique_identifier(&self.scheme_territory, &self.tsl_location)
    }

    pub fn is_xml(&self) -> bool {
        self.mime_type
            .as_deref()
            .is_none_or(|mime_type| mime_type.trim() == XML_MIME_TYPE)
    }
}

pub fn create_unique_identifier(country_code: &str, url: &str) -> String {
    hex::encode(HashAlgorithm::Sha256.digest(format!("{country_code}:{url}").as_bytes()))
}
