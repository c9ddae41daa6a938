//! SMT expressions and the solver oracle.

mod expr;
mod solver;

pub use expr::{sort_name, SmtExpr};
pub use solver::{
    backend_for, GroundBackend, ProcessBackend, SatResult, SmtBackend, SmtContext, SolverChoice,
    SolverError, SolverFlavor,
};
