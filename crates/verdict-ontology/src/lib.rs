//! Verdict ontology layer: documents, formulas, loader, registry.
//!
//! An *ontology* is a JSON document bundling three things:
//!
//! - **constraints** — logical assertions over typed variables, written as
//!   JSON formula trees;
//! - **variable declarations** — the solver sort (`bool` / `int` / `real`)
//!   of every free name a constraint's formula uses;
//! - **extractors** — declarative rules that lift typed values out of raw
//!   text to populate those variables.
//!
//! This crate owns everything that happens before a verification request
//! exists: parsing documents into tagged ASTs, validating them (arity and
//! sort checks, unique ids, acyclic computed-extractor graphs), and caching
//! the validated representation in a directory-backed registry. Evaluation —
//! running extractors against text and discharging constraints with a
//! solver — lives in `verdict-engine`.

pub mod computed;
pub mod document;
pub mod error;
pub mod formula;
pub mod registry;
pub mod validate;

pub use computed::{Computed, ComputedCmp, ComputedError};
pub use document::{
    Constraint, ConstraintDoc, EnumChoice, Extractor, ExtractorDoc, ItemSort, Ontology,
    OntologyDoc, OntologyMetadata, VariableDecl,
};
pub use error::OntologyError;
pub use formula::{CmpOp, Formula, FormulaError, Sort};
pub use registry::OntologyRegistry;
pub use validate::validate_document;
