//! End-to-end verification scenarios over realistic ontologies.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::json;
use verdict_engine::{
    CancelToken, GroundBackend, SatResult, SmtBackend, SmtContext, SolverError,
    VerificationReport, Verifier, ViolationKind,
};
use verdict_engine::smt::SmtExpr;
use verdict_ontology::{validate_document, Ontology, Sort};

fn verifier() -> Verifier {
    Verifier::new(Arc::new(GroundBackend))
}

fn verify(ontology: &Ontology, text: &str) -> VerificationReport {
    verifier()
        .verify(ontology, text, &CancelToken::new())
        .unwrap()
}

fn mortgage_ontology() -> Ontology {
    validate_document(json!({
        "name": "mortgage-compliance-v1",
        "version": "1.0.0",
        "description": "Mortgage origination constraints",
        "constraints": [
            {
                "id": "MAX_DTI",
                "category": "Underwriting",
                "description": "Debt-to-income ratio must not exceed 43%",
                "formula_readable": "dti <= 43",
                "formula": {"<=": ["dti", 43]},
                "variables": [{"name": "dti", "type": "real"}],
                "error_message": "DTI exceeds the qualified-mortgage limit",
                "citation": "12 CFR 1026.43(e)(2)(vi)",
            },
            {
                "id": "DTI_OR_COMPENSATING",
                "category": "Underwriting",
                "description": "High DTI requires compensating factors",
                "formula": {"or": [
                    {"<=": ["dti", 43]},
                    {">=": ["compensating_factors", 2]},
                ]},
                "variables": [
                    {"name": "dti", "type": "real"},
                    {"name": "compensating_factors", "type": "int"},
                ],
                "error_message": "High DTI without compensating factors",
            },
            {
                "id": "DENIAL_REASON_REQUIRED",
                "category": "Fair lending",
                "description": "A denial must state a specific reason",
                "formula": {"implies": [
                    {"==": ["is_denial", true]},
                    {"==": ["has_specific_reason", true]},
                ]},
                "variables": [
                    {"name": "is_denial", "type": "bool"},
                    {"name": "has_specific_reason", "type": "bool"},
                ],
                "error_message": "Denial without a specific reason",
                "citation": "12 CFR 1002.9",
            },
            {
                "id": "MAX_LOAN_AMOUNT",
                "category": "Limits",
                "description": "Loan amount must stay under program ceiling",
                "formula": {"<=": ["loan_amount", 100000]},
                "variables": [{"name": "loan_amount", "type": "int"}],
                "error_message": "Loan amount exceeds the program ceiling",
            },
        ],
        "extractors": {
            "dti": {"type": "percentage", "pattern": r"dti[^0-9%]*([\d.]+)"},
            "compensating_factors": {"type": "int", "pattern": r"(\d+)\s+compensating"},
            "is_denial": {"type": "boolean", "keywords": ["denied", "denial", "rejected"]},
            "has_specific_reason": {
                "type": "boolean",
                "keywords": ["due to", "because", "insufficient"],
            },
            "loan_amount": {"type": "money", "pattern": r"\$([\d,.]+)"},
        },
    }))
    .unwrap()
}

// ----------------------------------------------------------------------------
// Scenario matrix
// ----------------------------------------------------------------------------

#[test]
fn s1_compliant_dti_verifies() {
    let report = verify(&mortgage_ontology(), "DTI: 35%");
    assert!(report.verified, "violations: {:?}", report.violations);
    assert!(report.violations.is_empty());
    assert_eq!(report.parsed_data["dti"], json!(35.0));
}

#[test]
fn s2_excessive_dti_is_violated() {
    let report = verify(&mortgage_ontology(), "DTI: 48%");
    assert!(!report.verified);
    let max_dti = report
        .violations
        .iter()
        .find(|v| v.constraint_id == "MAX_DTI")
        .expect("MAX_DTI violation");
    assert_eq!(max_dti.kind, ViolationKind::Unsatisfied);
    assert_eq!(max_dti.message, "DTI exceeds the qualified-mortgage limit");
    assert_eq!(max_dti.citation.as_deref(), Some("12 CFR 1026.43(e)(2)(vi)"));
}

#[test]
fn s3_compensating_factors_satisfy_the_disjunction() {
    let report = verify(&mortgage_ontology(), "DTI 50%, 3 compensating factors.");
    let failed: Vec<&str> = report
        .violations
        .iter()
        .map(|v| v.constraint_id.as_str())
        .collect();
    assert!(
        !failed.contains(&"DTI_OR_COMPENSATING"),
        "violations: {:?}",
        failed
    );
    assert_eq!(report.parsed_data["compensating_factors"], json!(3));
}

#[test]
fn s4_denial_with_reason_verifies() {
    let report = verify(
        &mortgage_ontology(),
        "Application denied due to insufficient credit history.",
    );
    let failed: Vec<&str> = report
        .violations
        .iter()
        .map(|v| v.constraint_id.as_str())
        .collect();
    assert!(
        !failed.contains(&"DENIAL_REASON_REQUIRED"),
        "violations: {:?}",
        failed
    );
}

#[test]
fn s5_bare_denial_is_violated() {
    let report = verify(&mortgage_ontology(), "Application denied.");
    assert!(!report.verified);
    assert!(report
        .violations
        .iter()
        .any(|v| v.constraint_id == "DENIAL_REASON_REQUIRED"));
}

#[test]
fn s6_money_suffix_scales_and_violates_ceiling() {
    let report = verify(&mortgage_ontology(), "Approved for $1.5m.");
    assert!(!report.verified);
    assert_eq!(report.parsed_data["loan_amount"], json!(1_500_000));
    assert!(report
        .violations
        .iter()
        .any(|v| v.constraint_id == "MAX_LOAN_AMOUNT"));
}

// ----------------------------------------------------------------------------
// Universal invariants
// ----------------------------------------------------------------------------

#[test]
fn verified_flag_mirrors_violation_list() {
    let ontology = mortgage_ontology();
    for text in [
        "DTI: 35%",
        "DTI: 48%",
        "Application denied.",
        "Approved for $95k, DTI 30%.",
    ] {
        let report = verify(&ontology, text);
        assert_eq!(report.verified, report.violations.is_empty(), "{}", text);
    }
}

#[test]
fn verdicts_are_deterministic_across_runs() {
    let ontology = mortgage_ontology();
    let text = "Application denied, DTI 48%, loan of $500k.";
    let a = verify(&ontology, text);
    let b = verify(&ontology, text);
    assert_eq!(a.verified, b.verified);
    assert_eq!(a.parsed_data, b.parsed_data);
    assert_eq!(a.warnings, b.warnings);
    let ids = |r: &VerificationReport| -> Vec<String> {
        r.violations.iter().map(|v| v.constraint_id.clone()).collect()
    };
    assert_eq!(ids(&a), ids(&b));
}

#[test]
fn parsed_data_only_names_extractors() {
    let ontology = mortgage_ontology();
    let report = verify(&ontology, "DTI 50%, denied, $2m loan");
    let extractor_names: HashSet<&str> = ontology
        .extractors
        .iter()
        .map(|(n, _)| n.as_str())
        .collect();
    for name in report.parsed_data.as_object().unwrap().keys() {
        assert!(extractor_names.contains(name.as_str()), "{}", name);
    }
}

#[test]
fn literal_true_constraint_always_verifies() {
    let ontology = validate_document(json!({
        "name": "tautology",
        "version": "1.0.0",
        "constraints": [{"id": "ALWAYS", "formula": true}],
    }))
    .unwrap();
    let report = verify(&ontology, "anything at all");
    assert!(report.verified);
    assert!(report.violations.is_empty());
}

#[test]
fn literal_false_constraint_always_produces_one_violation() {
    let ontology = validate_document(json!({
        "name": "contradiction",
        "version": "1.0.0",
        "constraints": [{"id": "NEVER", "formula": false, "error_message": "impossible"}],
    }))
    .unwrap();
    let report = verify(&ontology, "anything at all");
    assert!(!report.verified);
    assert_eq!(report.violations.len(), 1);
    assert_eq!(report.violations[0].constraint_id, "NEVER");
}

// ----------------------------------------------------------------------------
// Boundary behaviors
// ----------------------------------------------------------------------------

#[test]
fn missing_extraction_defaults_and_warns() {
    // No dollar figure in the text: loan_amount defaults to 0, which
    // satisfies the ceiling, and the miss is reported as a warning.
    let report = verify(&mortgage_ontology(), "Routine approval at DTI 30%.");
    assert!(report
        .warnings
        .iter()
        .any(|w| w.contains("loan_amount")));
    assert_eq!(report.parsed_data["loan_amount"], json!(0));
    assert!(!report
        .violations
        .iter()
        .any(|v| v.constraint_id == "MAX_LOAN_AMOUNT"));
}

#[test]
fn undeclared_variable_confines_to_one_constraint() {
    // Built by hand: the loader would reject this document, but the
    // verifier must still confine the failure to the offending constraint.
    let mut ontology = validate_document(json!({
        "name": "partial",
        "version": "1.0.0",
        "constraints": [{
            "id": "GOOD",
            "formula": {"<=": ["value", 100]},
            "variables": [{"name": "value", "type": "real"}],
        }],
        "extractors": {
            "value": {"type": "float", "pattern": r"value[:\s]*(\d+)"},
        },
    }))
    .unwrap();
    let broken = verdict_ontology::Constraint {
        id: "BROKEN".into(),
        category: String::new(),
        description: String::new(),
        formula_readable: "ghost <= 1".into(),
        formula: verdict_ontology::Formula::parse(&json!({"<=": ["ghost", 1]})).unwrap(),
        formula_json: json!({"<=": ["ghost", 1]}),
        variables: vec![],
        error_message: "broken".into(),
        citation: None,
    };
    ontology.constraints.insert(0, broken);

    let report = verify(&ontology, "value: 50");
    assert!(!report.verified);
    assert_eq!(report.violations.len(), 1);
    assert_eq!(report.violations[0].constraint_id, "BROKEN");
    assert_eq!(report.violations[0].kind, ViolationKind::CompileError);
    assert!(report.violations[0]
        .reason
        .as_deref()
        .unwrap()
        .contains("ghost"));
}

#[test]
fn cancelled_request_stops_at_a_constraint_boundary() {
    let cancel = CancelToken::new();
    cancel.cancel();
    let err = verifier()
        .verify(&mortgage_ontology(), "DTI 30%", &cancel)
        .unwrap_err();
    assert!(matches!(err, verdict_engine::VerifyError::Cancelled));
}

// A backend that always times out, standing in for a slow solver.
struct StallingBackend;

struct StallingContext;

impl SmtContext for StallingContext {
    fn declare(&mut self, _name: &str, _sort: Sort) {}
    fn assert(&mut self, _expr: SmtExpr) {}
    fn check(&mut self) -> Result<SatResult, SolverError> {
        Ok(SatResult::Unknown("solver timed out after 250 ms".into()))
    }
    fn reset(&mut self) {}
}

impl SmtBackend for StallingBackend {
    fn method(&self) -> String {
        "smt:stall".into()
    }
    fn version(&self) -> String {
        "test".into()
    }
    fn fresh_context(&self) -> Box<dyn SmtContext> {
        Box::new(StallingContext)
    }
}

#[test]
fn solver_timeout_surfaces_as_indeterminate() {
    let verifier = Verifier::new(Arc::new(StallingBackend));
    let report = verifier
        .verify(&mortgage_ontology(), "DTI 30%", &CancelToken::new())
        .unwrap();
    assert!(!report.verified);
    assert_eq!(report.violations.len(), 4);
    for violation in &report.violations {
        assert_eq!(violation.kind, ViolationKind::Indeterminate);
        assert!(violation.reason.as_deref().unwrap().contains("timed out"));
    }
}

// ----------------------------------------------------------------------------
// Computed extractors end to end
// ----------------------------------------------------------------------------

#[test]
fn computed_extractor_feeds_a_constraint() {
    let ontology = validate_document(json!({
        "name": "computed",
        "version": "1.0.0",
        "constraints": [{
            "id": "ENOUGH_FACTORS",
            "formula": {">=": ["compensating_factors", 2]},
            "variables": [{"name": "compensating_factors", "type": "int"}],
            "error_message": "not enough compensating factors",
        }],
        "extractors": {
            "has_reserves": {"type": "boolean", "keywords": ["reserves"]},
            "low_ltv": {"type": "boolean", "keywords": ["low ltv", "80% ltv"]},
            "stable_income": {"type": "boolean", "keywords": ["stable income"]},
            "compensating_factors": {
                "type": "computed",
                "formula": {"count_true": ["has_reserves", "low_ltv", "stable_income"]},
            },
        },
    }))
    .unwrap();

    let report = verify(
        &ontology,
        "Borrower has 12 months reserves and stable income.",
    );
    assert!(report.verified, "violations: {:?}", report.violations);
    assert_eq!(report.parsed_data["compensating_factors"], json!(2));

    let report = verify(&ontology, "Nothing to see here.");
    assert!(!report.verified);
    assert_eq!(report.parsed_data["compensating_factors"], json!(0));
}
