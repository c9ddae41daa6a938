//! Verdict engine: extraction, compilation, and SMT verification.
//!
//! The pipeline, left to right:
//!
//! ```text
//! raw text ──► extract ──► typed environment
//!                                  │
//! ontology ──► registry ───────────┤
//!                │                 ▼
//!                └──► compile ──► SMT formula ──► verify ──► report
//! ```
//!
//! The core is a pure function of `(text, ontology)`: no durable state, no
//! async suspension points. Each verification request owns one solver
//! context for its lifetime; the oracle behind [`smt::SmtBackend`] is never
//! assumed thread-safe, and scaling across cores means running independent
//! verifier instances, not sharing one.

pub mod compile;
pub mod extract;
pub mod report;
pub mod smt;
pub mod value;
pub mod verify;

pub use compile::{compile as compile_formula, CompileError, CompiledFormula};
pub use extract::{extract, Environment};
pub use report::{
    OntologySummary, ProofInfo, VerificationReport, Violation, ViolationKind,
};
pub use smt::{
    backend_for, GroundBackend, SatResult, SmtBackend, SmtContext, SmtExpr, SolverChoice,
    SolverError,
};
pub use value::Value;
pub use verify::{CancelToken, Verifier, VerifyError};
