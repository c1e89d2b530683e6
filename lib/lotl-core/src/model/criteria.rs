use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Key usage pattern, indexed like the X.509 KeyUsage bit string.
/// `None` means the bit is not constrained.
pub type KeyUsageBits = [Option<bool>; 9];

#[derive(Clone, Copy, Debug, Display, EnumString, PartialEq, Eq, Serialize, Deserialize)]
#[strum(serialize_all = "camelCase")]
pub enum KeyUsageBit {
    DigitalSignature = 0,
    #[strum(to_string = "nonRepudiation", serialize = "contentCommitment")]
    NonRepudiation = 1,
    KeyEncipherment = 2,
    DataEncipherment = 3,
    KeyAgreement = 4,
    KeyCertSign = 5,
    CrlSign = 6,
    EncipherOnly = 7,
    DecipherOnly = 8,
}

impl KeyUsageBit {
    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Clone, Copy, Debug, Display, EnumString, PartialEq, Eq, Serialize, Deserialize)]
pub enum CriteriaAssert {
    #[strum(serialize = "all")]
    All,
    #[strum(serialize = "atLeastOne")]
    AtLeastOne,
    #[strum(serialize = "none")]
    None,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriteriaList {
    pub assert: CriteriaAssert,
    pub criteria: Vec<Criteria>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Criteria {
    List(CriteriaList),
    CertSubjectDnAttribute { required_attribute_ids: Vec<String> },
    ExtendedKeyUsage { required_usages: Vec<String> },
    PolicySet { required_policy_ids: Vec<String> },
    KeyUsage { bits: KeyUsageBits },
    /// Criterion this crate cannot evaluate, kept by element name. Never matches.
    Unsupported(String),
}

impl From<CriteriaList> for Criteria {
    fn from(value: CriteriaList) -> Self {
        Self::List(value)
    }
}
