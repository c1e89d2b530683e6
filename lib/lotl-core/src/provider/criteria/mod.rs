//! Matching of trusted list criteria against certificate content.

use crate::model::criteria::{Criteria, CriteriaAssert, CriteriaList};
use crate::util::x509::CertificateAttributes;


impl CriteriaList {
    /// `All` over no criteria holds, `AtLeastOne` over no criteria does not.
    pub fn matches(&self, attributes: &CertificateAttributes) -> bool {
        let mut results = self
            .criteria
            .iter()
            .map(|criteria| criteria.matches(attributes));

        match self.assert {
            CriteriaAssert::All => results.all(|matched| matched),
            CriteriaAssert::AtLeastOne => results.any(|matched| matched),
            CriteriaAssert::None => !results.any(|matched| matched),
        }
    }
}

impl Criteria {
    /// Leaves that constrain nothing (no identifiers, no key usage bit) never match.
    pub fn matches(&self, attributes: &CertificateAttributes) -> bool {
        match self {
            Criteria::List(list) => list.matches(attributes),
            Criteria::CertSubjectDnAttribute {
                required_attribute_ids,
            } => {
                !required_attribute_ids.is_empty()
                    && required_attribute_ids
                        .iter()
                        .all(|id| attributes.subject_attribute_oids.contains(id))
            }
            Criteria::ExtendedKeyUsage { required_usages } => {
                !required_usages.is_empty()
                    && attributes.extended_key_usages.as_ref().is_some_and(|usages| {
                        required_usages.iter().all(|usage| usages.contains(usage))
                    })
            }
            Criteria::PolicySet {
                required_policy_ids,
            } => {
                !required_policy_ids.is_empty()
                    && attributes.policy_ids.as_ref().is_some_and(|policies| {
                        required_policy_ids
                            .iter()
                            .all(|policy| policies.contains(policy))
                    })
            }
            Criteria::KeyUsage { bits } => {
                bits.iter().any(Option::is_some)
                    && attributes.key_usage.is_some_and(|key_usage| {
                        bits.iter().zip(key_usage).all(|(expected, actual)| {
                            expected.is_none_or(|expected| expected == actual)
                        })
                    })
            }
            Criteria::Unsupported(_) => false,
        }
    }
}
