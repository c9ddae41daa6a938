//! Verification reports and violation records, in the wire format the
//! HTTP collaborator serializes verbatim.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

/// The outcome of verifying one text against one ontology.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    /// True iff no violations of any kind were produced.
    pub verified: bool,
    pub violations: Vec<Violation>,
    /// Snapshot of the extracted environment, for debugging.
    pub parsed_data: Json,
    pub ontology: OntologySummary,
    pub proof: ProofInfo,
    pub verification_id: Uuid,
    pub execution_time_ms: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OntologySummary {
    pub name: String,
    pub version: String,
    pub constraints_checked: usize,
}

/// Identity of the decision procedure that produced the verdicts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofInfo {
    pub method: String,
    pub version: String,
}

/// Why a constraint did not hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub constraint_id: String,
    pub kind: ViolationKind,
    pub message: String,
    pub formula_readable: String,
    /// The structural (JSON) form of the constraint's formula.
    pub formula: Json,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citation: Option<String>,
    /// Solver or compiler detail for `compile_error` / `indeterminate`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// The constraint's negation is satisfiable in the environment.
    Unsatisfied,
    /// The formula failed to compile against its declarations.
    CompileError,
    /// The solver returned unknown, timed out, or errored.
    Indeterminate,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn report_serializes_to_the_wire_shape() {
        let report = VerificationReport {
            verified: false,
            violations: vec![Violation {
                constraint_id: "MAX_DTI".into(),
                kind: ViolationKind::Unsatisfied,
                message: "DTI exceeds limit".into(),
                formula_readable: "dti <= 43".into(),
                formula: json!({"<=": ["dti", 43]}),
                citation: Some("CFPB ATR/QM".into()),
                reason: None,
            }],
            parsed_data: json!({"dti": 48.0}),
            ontology: OntologySummary {
                name: "mortgage-compliance-v1".into(),
                version: "1.0.0".into(),
                constraints_checked: 1,
            },
            proof: ProofInfo {
                method: "smt:ground-eval".into(),
                version: "0.1.0".into(),
            },
            verification_id: Uuid::nil(),
            execution_time_ms: 3,
            timestamp: DateTime::from_timestamp(0, 0).unwrap(),
            warnings: vec![],
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["verified"], json!(false));
        assert_eq!(json["violations"][0]["kind"], json!("unsatisfied"));
        assert_eq!(json["ontology"]["constraints_checked"], json!(1));
        assert_eq!(json["proof"]["method"], json!("smt:ground-eval"));
        // Empty warnings are omitted entirely.
        assert!(json.get("warnings").is_none());
        // Absent citation/reason fields are omitted from violations.
        assert!(json["violations"][0].get("reason").is_none());
    }
}
