//! The solver oracle.
//!
//! The verifier treats satisfiability checking as a black box behind
//! [`SmtBackend`] / [`SmtContext`]: acquire a context, declare the free
//! variables, assert the pinning equalities and the negated formula, ask
//! `check`, reset, repeat. Backends are never assumed thread-safe; a
//! context belongs to one request and all calls on it are serialized.
//!
//! Two families ship:
//!
//! - [`GroundBackend`] — always available. The verifier pins every free
//!   variable to a concrete value, so each query is ground: build the model
//!   from the pinned equalities and evaluate the remaining assertions under
//!   it. Anything non-ground comes back `Unknown`.
//! - [`ProcessBackend`] — drives a `z3` or `cvc5` binary over SMT-LIB2,
//!   one process per `check`, guarded by a wall-clock timeout on top of the
//!   solver's own time limit.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info};
use verdict_ontology::{CmpOp, Sort};

use super::expr::{sort_name, SmtExpr};

// ============================================================================
// Oracle interface
// ============================================================================

/// Outcome of a satisfiability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SatResult {
    Sat,
    Unsat,
    Unknown(String),
}

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("failed to run solver `{program}`: {reason}")]
    Process { program: String, reason: String },
    #[error("solver produced unexpected output: {0}")]
    Protocol(String),
}

/// One logical solver context, scoped to a single verification request.
pub trait SmtContext: Send {
    fn declare(&mut self, name: &str, sort: Sort);
    fn assert(&mut self, expr: SmtExpr);
    fn check(&mut self) -> Result<SatResult, SolverError>;
    /// Clear declarations and assertions between constraints.
    fn reset(&mut self);
}

/// A solver implementation that can mint fresh contexts.
pub trait SmtBackend: Send + Sync {
    /// Identity for the report's `proof.method` field, e.g. `smt:z3`.
    fn method(&self) -> String;
    fn version(&self) -> String;
    fn fresh_context(&self) -> Box<dyn SmtContext>;
}

// ============================================================================
// Ground-evaluation backend
// ============================================================================

/// Decides ground queries by direct evaluation. Requires every variable to
/// be pinned by an asserted equality; anything else is `Unknown`.
pub struct GroundBackend;

impl SmtBackend for GroundBackend {
    fn method(&self) -> String {
        "smt:ground-eval".to_string()
    }

    fn version(&self) -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }

    fn fresh_context(&self) -> Box<dyn SmtContext> {
        Box::new(GroundContext::default())
    }
}

#[derive(Default)]
struct GroundContext {
    decls: HashMap<String, Sort>,
    assertions: Vec<SmtExpr>,
}

impl SmtContext for GroundContext {
    fn declare(&mut self, name: &str, sort: Sort) {
        self.decls.insert(name.to_string(), sort);
    }

    fn assert(&mut self, expr: SmtExpr) {
        self.assertions.push(expr);
    }

    fn check(&mut self) -> Result<SatResult, SolverError> {
        // Model from the pinned equalities.
        let mut model: HashMap<&str, Ground> = HashMap::new();
        for assertion in &self.assertions {
            if let SmtExpr::Cmp(CmpOp::Eq, a, b) = assertion {
                match (a.as_ref(), b.as_ref()) {
                    (SmtExpr::Var(name, _), value) | (value, SmtExpr::Var(name, _)) => {
                        if let Some(ground) = Ground::literal(value) {
                            model.entry(name.as_str()).or_insert(ground);
                        }
                    }
                    _ => {}
                }
            }
        }

        for name in self.decls.keys() {
            if !model.contains_key(name.as_str()) {
                return Ok(SatResult::Unknown(format!(
                    "variable `{}` is not pinned to a value",
                    name
                )));
            }
        }

        // Evaluate every assertion (the pins trivially re-check) under it.
        for assertion in &self.assertions {
            match eval(assertion, &model) {
                Ok(Ground::Bool(true)) => {}
                Ok(Ground::Bool(false)) => return Ok(SatResult::Unsat),
                Ok(_) => {
                    return Ok(SatResult::Unknown(
                        "non-boolean assertion".to_string(),
                    ))
                }
                Err(reason) => return Ok(SatResult::Unknown(reason)),
            }
        }
        Ok(SatResult::Sat)
    }

    fn reset(&mut self) {
        self.decls.clear();
        self.assertions.clear();
    }
}

/// A ground value during evaluation. Numerics unify as `f64`; integer
/// division consults the expression's static sort.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Ground {
    Bool(bool),
    Num(f64),
}

impl Ground {
    fn literal(expr: &SmtExpr) -> Option<Ground> {
        match expr {
            SmtExpr::Bool(b) => Some(Ground::Bool(*b)),
            SmtExpr::Int(i) => Some(Ground::Num(*i as f64)),
            SmtExpr::Real(r) => Some(Ground::Num(*r)),
            _ => None,
        }
    }

    fn num(self) -> Result<f64, String> {
        match self {
            Ground::Num(n) => Ok(n),
            Ground::Bool(_) => Err("expected a numeric operand".to_string()),
        }
    }

    fn truth(self) -> Result<bool, String> {
        match self {
            Ground::Bool(b) => Ok(b),
            Ground::Num(_) => Err("expected a boolean operand".to_string()),
        }
    }
}

fn eval(expr: &SmtExpr, model: &HashMap<&str, Ground>) -> Result<Ground, String> {
    match expr {
        SmtExpr::Bool(b) => Ok(Ground::Bool(*b)),
        SmtExpr::Int(i) => Ok(Ground::Num(*i as f64)),
        SmtExpr::Real(r) => Ok(Ground::Num(*r)),
        SmtExpr::Var(name, _) => model
            .get(name.as_str())
            .copied()
            .ok_or_else(|| format!("variable `{}` is not pinned to a value", name)),
        SmtExpr::Not(a) => Ok(Ground::Bool(!eval(a, model)?.truth()?)),
        SmtExpr::And(items) => {
            for item in items {
                if !eval(item, model)?.truth()? {
                    return Ok(Ground::Bool(false));
                }
            }
            Ok(Ground::Bool(true))
        }
        SmtExpr::Or(items) => {
            for item in items {
                if eval(item, model)?.truth()? {
                    return Ok(Ground::Bool(true));
                }
            }
            Ok(Ground::Bool(false))
        }
        SmtExpr::Implies(a, b) => {
            let a = eval(a, model)?.truth()?;
            let b = eval(b, model)?.truth()?;
            Ok(Ground::Bool(!a || b))
        }
        SmtExpr::Cmp(op, a, b) => {
            let left = eval(a, model)?;
            let right = eval(b, model)?;
            let result = match (op, left, right) {
                (CmpOp::Eq, Ground::Bool(l), Ground::Bool(r)) => l == r,
                (CmpOp::Ne, Ground::Bool(l), Ground::Bool(r)) => l != r,
                (op, l, r) => {
                    let (l, r) = (l.num()?, r.num()?);
                    match op {
                        CmpOp::Eq => l == r,
                        CmpOp::Ne => l != r,
                        CmpOp::Lt => l < r,
                        CmpOp::Le => l <= r,
                        CmpOp::Gt => l > r,
                        CmpOp::Ge => l >= r,
                    }
                }
            };
            Ok(Ground::Bool(result))
        }
        SmtExpr::Add(items) => fold(items, model, 0.0, |a, b| a + b),
        SmtExpr::Mul(items) => fold(items, model, 1.0, |a, b| a * b),
        SmtExpr::Sub(a, b) => Ok(Ground::Num(eval(a, model)?.num()? - eval(b, model)?.num()?)),
        SmtExpr::Div(a, b) => {
            let left = eval(a, model)?.num()?;
            let right = eval(b, model)?.num()?;
            if right == 0.0 {
                return Err("division by zero".to_string());
            }
            if expr.sort() == Sort::Int {
                Ok(Ground::Num(left.div_euclid(right)))
            } else {
                Ok(Ground::Num(left / right))
            }
        }
        SmtExpr::Min(a, b) => {
            let (l, r) = (eval(a, model)?.num()?, eval(b, model)?.num()?);
            Ok(Ground::Num(l.min(r)))
        }
        SmtExpr::Max(a, b) => {
            let (l, r) = (eval(a, model)?.num()?, eval(b, model)?.num()?);
            Ok(Ground::Num(l.max(r)))
        }
        SmtExpr::Ite(c, t, e) => {
            if eval(c, model)?.truth()? {
                eval(t, model)
            } else {
                eval(e, model)
            }
        }
        SmtExpr::ToReal(a) => eval(a, model),
    }
}

fn fold(
    items: &[SmtExpr],
    model: &HashMap<&str, Ground>,
    init: f64,
    op: impl Fn(f64, f64) -> f64,
) -> Result<Ground, String> {
    let mut acc = init;
    for item in items {
        acc = op(acc, eval(item, model)?.num()?);
    }
    Ok(Ground::Num(acc))
}

// ============================================================================
// External process backend (z3 / cvc5 over SMT-LIB2)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverFlavor {
    Z3,
    Cvc5,
}

impl SolverFlavor {
    fn program(self) -> &'static str {
        match self {
            SolverFlavor::Z3 => "z3",
            SolverFlavor::Cvc5 => "cvc5",
        }
    }
}

pub struct ProcessBackend {
    flavor: SolverFlavor,
    version: String,
    timeout: Duration,
}

impl ProcessBackend {
    /// Probe for the solver binary on `PATH`; `None` when unavailable.
    pub fn discover(flavor: SolverFlavor, timeout: Duration) -> Option<Self> {
        let output = Command::new(flavor.program())
            .arg("--version")
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let version = String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or("unknown")
            .trim()
            .to_string();
        Some(Self {
            flavor,
            version,
            timeout,
        })
    }
}

impl SmtBackend for ProcessBackend {
    fn method(&self) -> String {
        format!("smt:{}", self.flavor.program())
    }

    fn version(&self) -> String {
        self.version.clone()
    }

    fn fresh_context(&self) -> Box<dyn SmtContext> {
        Box::new(ProcessContext {
            flavor: self.flavor,
            timeout: self.timeout,
            decls: Vec::new(),
            assertions: Vec::new(),
        })
    }
}

struct ProcessContext {
    flavor: SolverFlavor,
    timeout: Duration,
    decls: Vec<(String, Sort)>,
    assertions: Vec<SmtExpr>,
}

impl ProcessContext {
    fn script(&self) -> String {
        let mut script = String::from("(set-logic ALL)\n");
        if self.flavor == SolverFlavor::Z3 {
            script.push_str(&format!(
                "(set-option :timeout {})\n",
                self.timeout.as_millis()
            ));
        }
        for (name, sort) in &self.decls {
            script.push_str(&format!("(declare-const {} {})\n", name, sort_name(*sort)));
        }
        for assertion in &self.assertions {
            script.push_str(&format!("(assert {})\n", assertion.to_smtlib2()));
        }
        script.push_str("(check-sat)\n");
        script
    }
}

impl SmtContext for ProcessContext {
    fn declare(&mut self, name: &str, sort: Sort) {
        self.decls.push((name.to_string(), sort));
    }

    fn assert(&mut self, expr: SmtExpr) {
        self.assertions.push(expr);
    }

    fn check(&mut self) -> Result<SatResult, SolverError> {
        let program = self.flavor.program();
        let mut command = Command::new(program);
        match self.flavor {
            // z3 needs -in to read SMT-LIB2 from stdin; cvc5 does so by
            // default but takes its time limit on the command line.
            SolverFlavor::Z3 => {
                command.arg("-in");
            }
            SolverFlavor::Cvc5 => {
                command.arg(format!("--tlimit={}", self.timeout.as_millis()));
            }
        }
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SolverError::Process {
                program: program.to_string(),
                reason: e.to_string(),
            })?;

        let script = self.script();
        debug!(solver = program, script = %script, "dispatching check-sat");
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(script.as_bytes())
                .map_err(|e| SolverError::Process {
                    program: program.to_string(),
                    reason: e.to_string(),
                })?;
        }

        // Wall-clock guard on top of the solver's own time limit.
        let deadline = Instant::now() + self.timeout + Duration::from_millis(250);
        loop {
            match child.try_wait() {
                Ok(Some(_)) => break,
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Ok(SatResult::Unknown(format!(
                            "solver timed out after {} ms",
                            self.timeout.as_millis()
                        )));
                    }
                    std::thread::sleep(Duration::from_millis(2));
                }
                Err(e) => {
                    return Err(SolverError::Process {
                        program: program.to_string(),
                        reason: e.to_string(),
                    })
                }
            }
        }

        let mut stdout = String::new();
        if let Some(mut pipe) = child.stdout.take() {
            let _ = pipe.read_to_string(&mut stdout);
        }
        match stdout.lines().find(|l| !l.trim().is_empty()).map(str::trim) {
            Some("sat") => Ok(SatResult::Sat),
            Some("unsat") => Ok(SatResult::Unsat),
            Some("unknown") => Ok(SatResult::Unknown("solver returned unknown".to_string())),
            other => Err(SolverError::Protocol(
                other.unwrap_or("<empty output>").to_string(),
            )),
        }
    }

    fn reset(&mut self) {
        self.decls.clear();
        self.assertions.clear();
    }
}

// ============================================================================
// Backend selection
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverChoice {
    /// Prefer an external solver, fall back to ground evaluation.
    #[default]
    Auto,
    Ground,
    Z3,
    Cvc5,
}

impl FromStr for SolverChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(SolverChoice::Auto),
            "ground" => Ok(SolverChoice::Ground),
            "z3" => Ok(SolverChoice::Z3),
            "cvc5" => Ok(SolverChoice::Cvc5),
            other => Err(format!(
                "unknown solver `{}` (expected auto|ground|z3|cvc5)",
                other
            )),
        }
    }
}

/// Build the best backend for the given choice.
pub fn backend_for(choice: SolverChoice, timeout: Duration) -> Arc<dyn SmtBackend> {
    let backend: Arc<dyn SmtBackend> = match choice {
        SolverChoice::Ground => Arc::new(GroundBackend),
        SolverChoice::Z3 => match ProcessBackend::discover(SolverFlavor::Z3, timeout) {
            Some(b) => Arc::new(b),
            None => Arc::new(GroundBackend),
        },
        SolverChoice::Cvc5 => match ProcessBackend::discover(SolverFlavor::Cvc5, timeout) {
            Some(b) => Arc::new(b),
            None => Arc::new(GroundBackend),
        },
        SolverChoice::Auto => ProcessBackend::discover(SolverFlavor::Z3, timeout)
            .map(|b| Arc::new(b) as Arc<dyn SmtBackend>)
            .or_else(|| {
                ProcessBackend::discover(SolverFlavor::Cvc5, timeout)
                    .map(|b| Arc::new(b) as Arc<dyn SmtBackend>)
            })
            .unwrap_or_else(|| Arc::new(GroundBackend)),
    };
    info!(
        method = %backend.method(),
        version = %backend.version(),
        "solver backend selected"
    );
    backend
}

// ============================================================================
// Tests
// ============================================================================
