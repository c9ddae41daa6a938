//! The verifier: decides every constraint of an ontology against one text.
//!
//! For each constraint, in declared order:
//!
//! 1. build the environment restriction — each declared variable's value,
//!    coerced to its sort, or the typed default plus a warning;
//! 2. compile the formula (a failure becomes a `compile_error` violation
//!    and the request continues);
//! 3. ask the oracle whether the negated formula is satisfiable under
//!    equalities pinning each free variable to its value;
//! 4. `unsat` means the constraint holds; `sat` records a violation;
//!    `unknown` or a solver error records an `indeterminate` violation.
//!
//! One solver context serves the whole request and is reset between
//! constraints. Cancellation is honored at constraint boundaries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;
use verdict_ontology::{CmpOp, Constraint, Ontology};

use crate::compile::compile;
use crate::extract::{extract, Environment};
use crate::report::{
    OntologySummary, ProofInfo, VerificationReport, Violation, ViolationKind,
};
use crate::smt::{SatResult, SmtBackend, SmtContext, SmtExpr};
use crate::value::Value;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("verification cancelled")]
    Cancelled,
}

/// Request-level cancellation flag, checked between constraints.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

pub struct Verifier {
    backend: Arc<dyn SmtBackend>,
}

impl Verifier {
    pub fn new(backend: Arc<dyn SmtBackend>) -> Self {
        Self { backend }
    }

    /// Identity of the underlying decision procedure.
    pub fn proof_info(&self) -> ProofInfo {
        ProofInfo {
            method: self.backend.method(),
            version: self.backend.version(),
        }
    }

    /// Extract an environment from `text` and verify every constraint.
    pub fn verify(
        &self,
        ontology: &Ontology,
        text: &str,
        cancel: &CancelToken,
    ) -> Result<VerificationReport, VerifyError> {
        let started = Instant::now();
        let verification_id = Uuid::new_v4();

        let mut env = extract(text, &ontology.extractors);
        let violations = self.check_constraints(ontology, &mut env, cancel)?;
        let verified = violations.is_empty();

        let report = VerificationReport {
            verified,
            parsed_data: env.to_json(),
            ontology: OntologySummary {
                name: ontology.name.clone(),
                version: ontology.version.clone(),
                constraints_checked: ontology.constraints.len(),
            },
            proof: self.proof_info(),
            verification_id,
            execution_time_ms: started.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
            warnings: env.warnings().to_vec(),
            violations,
        };

        info!(
            verification_id = %report.verification_id,
            ontology = %report.ontology.name,
            verified = report.verified,
            violations = report.violations.len(),
            execution_time_ms = report.execution_time_ms,
            "verification complete"
        );
        Ok(report)
    }

    fn check_constraints(
        &self,
        ontology: &Ontology,
        env: &mut Environment,
        cancel: &CancelToken,
    ) -> Result<Vec<Violation>, VerifyError> {
        let mut violations = Vec::new();
        let mut ctx = self.backend.fresh_context();

        for constraint in &ontology.constraints {
            if cancel.is_cancelled() {
                return Err(VerifyError::Cancelled);
            }
            if let Some(violation) = self.check_one(constraint, env, ctx.as_mut()) {
                violations.push(violation);
            }
        }
        Ok(violations)
    }

    fn check_one(
        &self,
        constraint: &Constraint,
        env: &mut Environment,
        ctx: &mut dyn SmtContext,
    ) -> Option<Violation> {
        let restriction = restrict(constraint, env);

        let compiled = match compile(&constraint.formula, &constraint.declarations()) {
            Ok(compiled) => compiled,
            Err(e) => {
                warn!(constraint = %constraint.id, error = %e, "formula failed to compile");
                return Some(violation(
                    constraint,
                    ViolationKind::CompileError,
                    Some(e.to_string()),
                ));
            }
        };

        ctx.reset();
        for (name, sort) in &compiled.free {
            ctx.declare(name, *sort);
        }
        for (name, sort) in &compiled.free {
            // Free variables always appear in the restriction: the compiler
            // rejects names outside the declaration list.
            if let Some(value) = restriction.get(name.as_str()) {
                ctx.assert(SmtExpr::Cmp(
                    CmpOp::Eq,
                    Box::new(SmtExpr::Var(name.clone(), *sort)),
                    Box::new(literal(value)),
                ));
            }
        }
        ctx.assert(SmtExpr::Not(Box::new(compiled.expr)));

        match ctx.check() {
            Ok(SatResult::Unsat) => None,
            Ok(SatResult::Sat) => Some(violation(constraint, ViolationKind::Unsatisfied, None)),
            Ok(SatResult::Unknown(reason)) => Some(violation(
                constraint,
                ViolationKind::Indeterminate,
                Some(reason),
            )),
            Err(e) => {
                warn!(constraint = %constraint.id, error = %e, "solver error");
                Some(violation(
                    constraint,
                    ViolationKind::Indeterminate,
                    Some(e.to_string()),
                ))
            }
        }
    }
}

/// Build the environment restriction for one constraint: every declared
/// variable, coerced to its sort, defaulting (with a warning) when missing
/// or incompatible.
fn restrict<'a>(constraint: &'a Constraint, env: &mut Environment) -> HashMap<&'a str, Value> {
    let mut out = HashMap::with_capacity(constraint.variables.len());
    for decl in &constraint.variables {
        let value = match env.get(&decl.name) {
            Some(found) => match found.coerce(decl.sort) {
                Some(coerced) => coerced,
                None => {
                    let kind = found.kind();
                    env.push_warning(format!(
                        "constraint `{}`: variable `{}` has {} value, expected {}; using default",
                        constraint.id, decl.name, kind, decl.sort
                    ));
                    Value::default_for(decl.sort)
                }
            },
            None => {
                env.push_warning(format!(
                    "constraint `{}`: variable `{}` was not extracted; using default",
                    constraint.id, decl.name
                ));
                Value::default_for(decl.sort)
            }
        };
        out.insert(decl.name.as_str(), value);
    }
    out
}

fn literal(value: &Value) -> SmtExpr {
    match value {
        Value::Bool(b) => SmtExpr::Bool(*b),
        Value::Int(i) => SmtExpr::Int(*i),
        Value::Real(r) => SmtExpr::Real(*r),
        // `restrict` only produces solver-sorted values.
        other => SmtExpr::Bool(other.truthy()),
    }
}

fn violation(
    constraint: &Constraint,
    kind: ViolationKind,
    reason: Option<String>,
) -> Violation {
    Violation {
        constraint_id: constraint.id.clone(),
        kind,
        message: constraint.error_message.clone(),
        formula_readable: constraint.formula_readable.clone(),
        formula: constraint.formula_json.clone(),
        citation: constraint.citation.clone(),
        reason,
    }
}
