use serde::{Deserialize, Serialize};
use strum::Display;

use super::report::ValidationReport;

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum QualificationConclusion {
    EsigWithQcAndQscd,
    EsigWithQc,
    NotQualifiedEsig,
    EsealWithQcAndQscd,
    EsealWithQc,
    NotQualifiedEseal,
    Unknown,
    UnknownQc,
    UnknownQcAndQscd,
    NotApplicable,
    NotQualified,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualificationValidationResult {
    pub conclusion: QualificationConclusion,
    /// Name of the trusted service the conclusion is based on.
    pub service_name: Option<String>,
    pub report: ValidationReport,
}
