//! The formula compiler: constraint trees to solver expressions.
//!
//! Compilation is a pure function of the formula tree and the constraint's
//! declaration table. Every name must resolve to a declaration; operand
//! sorts are checked as the tree lowers, and `Int` operands meeting `Real`
//! ones get explicit `to_real` casts so the emitted expression is
//! well-sorted under strict SMT-LIB2. The root must come out Boolean.
//!
//! A failure here is attributed to the offending constraint by the
//! verifier and becomes a `compile_error` violation; it never aborts the
//! rest of the request.

use std::collections::HashMap;

use thiserror::Error;
use verdict_ontology::{CmpOp, Formula, Sort};

use crate::smt::SmtExpr;

/// A compiled constraint: the Boolean expression plus the free variables
/// (with their declared sorts) the verifier must pin.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFormula {
    pub expr: SmtExpr,
    pub free: Vec<(String, Sort)>,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CompileError {
    #[error("variable `{0}` is not declared")]
    UndeclaredVariable(String),
    #[error("`{op}` expects {expected} operands, found {found}")]
    SortMismatch {
        op: &'static str,
        expected: &'static str,
        found: Sort,
    },
    #[error("`ite` branches must agree: then-branch is {then_sort}, else-branch is {else_sort}")]
    BranchMismatch { then_sort: Sort, else_sort: Sort },
    #[error("formula root must be bool, found {0}")]
    NonBooleanRoot(Sort),
}

/// Compile a formula against its constraint's declarations.
pub fn compile(
    formula: &Formula,
    decls: &HashMap<String, Sort>,
) -> Result<CompiledFormula, CompileError> {
    let (expr, sort) = lower(formula, decls)?;
    if sort != Sort::Bool {
        return Err(CompileError::NonBooleanRoot(sort));
    }
    let free = expr.free_vars();
    Ok(CompiledFormula { expr, free })
}

fn lower(
    formula: &Formula,
    decls: &HashMap<String, Sort>,
) -> Result<(SmtExpr, Sort), CompileError> {
    match formula {
        Formula::Bool(b) => Ok((SmtExpr::Bool(*b), Sort::Bool)),
        Formula::Int(i) => Ok((SmtExpr::Int(*i), Sort::Int)),
        Formula::Real(r) => Ok((SmtExpr::Real(*r), Sort::Real)),
        Formula::Var(name) => {
            let sort = decls
                .get(name)
                .copied()
                .ok_or_else(|| CompileError::UndeclaredVariable(name.clone()))?;
            Ok((SmtExpr::Var(name.clone(), sort), sort))
        }

        Formula::Not(inner) => {
            let expr = lower_bool("not", inner, decls)?;
            Ok((SmtExpr::Not(Box::new(expr)), Sort::Bool))
        }
        Formula::And(items) => {
            let lowered = lower_all_bool("and", items, decls)?;
            Ok((SmtExpr::And(lowered), Sort::Bool))
        }
        Formula::Or(items) => {
            let lowered = lower_all_bool("or", items, decls)?;
            Ok((SmtExpr::Or(lowered), Sort::Bool))
        }
        Formula::Implies(a, b) => {
            let a = lower_bool("implies", a, decls)?;
            let b = lower_bool("implies", b, decls)?;
            Ok((SmtExpr::Implies(Box::new(a), Box::new(b)), Sort::Bool))
        }

        Formula::Cmp(op, a, b) => {
            let (ea, sa) = lower(a, decls)?;
            let (eb, sb) = lower(b, decls)?;
            match (sa, sb) {
                (Sort::Bool, Sort::Bool) if op.allows_bool() => Ok((
                    SmtExpr::Cmp(*op, Box::new(ea), Box::new(eb)),
                    Sort::Bool,
                )),
                (sa, sb) if sa.is_numeric() && sb.is_numeric() => {
                    let (ea, eb, _) = unify(ea, sa, eb, sb);
                    Ok((
                        SmtExpr::Cmp(*op, Box::new(ea), Box::new(eb)),
                        Sort::Bool,
                    ))
                }
                (sa, sb) => Err(CompileError::SortMismatch {
                    op: op.symbol(),
                    expected: if op.allows_bool() {
                        "two numeric or two bool"
                    } else {
                        "numeric"
                    },
                    found: if sa.is_numeric() { sb } else { sa },
                }),
            }
        }

        Formula::Add(items) => {
            let (lowered, sort) = lower_all_numeric("+", items, decls)?;
            Ok((SmtExpr::Add(lowered), sort))
        }
        Formula::Mul(items) => {
            let (lowered, sort) = lower_all_numeric("*", items, decls)?;
            Ok((SmtExpr::Mul(lowered), sort))
        }
        Formula::Sub(a, b) => {
            let (ea, eb, sort) = lower_numeric_pair("-", a, b, decls)?;
            Ok((SmtExpr::Sub(Box::new(ea), Box::new(eb)), sort))
        }
        Formula::Div(a, b) => {
            let (ea, eb, sort) = lower_numeric_pair("/", a, b, decls)?;
            Ok((SmtExpr::Div(Box::new(ea), Box::new(eb)), sort))
        }
        Formula::Min(a, b) => {
            let (ea, eb, sort) = lower_numeric_pair("min", a, b, decls)?;
            Ok((SmtExpr::Min(Box::new(ea), Box::new(eb)), sort))
        }
        Formula::Max(a, b) => {
            let (ea, eb, sort) = lower_numeric_pair("max", a, b, decls)?;
            Ok((SmtExpr::Max(Box::new(ea), Box::new(eb)), sort))
        }

        Formula::Ite(cond, then, els) => {
            let cond = lower_bool("ite", cond, decls)?;
            let (et, st) = lower(then, decls)?;
            let (ee, se) = lower(els, decls)?;
            match (st, se) {
                (Sort::Bool, Sort::Bool) => Ok((
                    SmtExpr::Ite(Box::new(cond), Box::new(et), Box::new(ee)),
                    Sort::Bool,
                )),
                (st, se) if st.is_numeric() && se.is_numeric() => {
                    let (et, ee, sort) = unify(et, st, ee, se);
                    Ok((
                        SmtExpr::Ite(Box::new(cond), Box::new(et), Box::new(ee)),
                        sort,
                    ))
                }
                (st, se) => Err(CompileError::BranchMismatch {
                    then_sort: st,
                    else_sort: se,
                }),
            }
        }
    }
}

fn lower_bool(
    op: &'static str,
    formula: &Formula,
    decls: &HashMap<String, Sort>,
) -> Result<SmtExpr, CompileError> {
    let (expr, sort) = lower(formula, decls)?;
    if sort != Sort::Bool {
        return Err(CompileError::SortMismatch {
            op,
            expected: "bool",
            found: sort,
        });
    }
    Ok(expr)
}

fn lower_all_bool(
    op: &'static str,
    items: &[Formula],
    decls: &HashMap<String, Sort>,
) -> Result<Vec<SmtExpr>, CompileError> {
    items.iter().map(|f| lower_bool(op, f, decls)).collect()
}

/// Lower n-ary arithmetic operands; if any comes out `Real`, cast the
/// `Int` ones.
fn lower_all_numeric(
    op: &'static str,
    items: &[Formula],
    decls: &HashMap<String, Sort>,
) -> Result<(Vec<SmtExpr>, Sort), CompileError> {
    let mut lowered = Vec::with_capacity(items.len());
    let mut sort = Sort::Int;
    for item in items {
        let (expr, s) = lower(item, decls)?;
        if !s.is_numeric() {
            return Err(CompileError::SortMismatch {
                op,
                expected: "numeric",
                found: s,
            });
        }
        sort = sort.promote(s);
        lowered.push((expr, s));
    }
    let exprs = lowered
        .into_iter()
        .map(|(expr, s)| cast(expr, s, sort))
        .collect();
    Ok((exprs, sort))
}

fn lower_numeric_pair(
    op: &'static str,
    a: &Formula,
    b: &Formula,
    decls: &HashMap<String, Sort>,
) -> Result<(SmtExpr, SmtExpr, Sort), CompileError> {
    let (ea, sa) = lower(a, decls)?;
    let (eb, sb) = lower(b, decls)?;
    for s in [sa, sb] {
        if !s.is_numeric() {
            return Err(CompileError::SortMismatch {
                op,
                expected: "numeric",
                found: s,
            });
        }
    }
    Ok(unify(ea, sa, eb, sb))
}

/// Bring two numeric operands to a common sort, casting as needed.
fn unify(ea: SmtExpr, sa: Sort, eb: SmtExpr, sb: Sort) -> (SmtExpr, SmtExpr, Sort) {
    let sort = sa.promote(sb);
    (cast(ea, sa, sort), cast(eb, sb, sort), sort)
}

fn cast(expr: SmtExpr, from: Sort, to: Sort) -> SmtExpr {
    if from == Sort::Int && to == Sort::Real {
        // Fold literal casts immediately.
        if let SmtExpr::Int(i) = expr {
            return SmtExpr::Real(i as f64);
        }
        return SmtExpr::ToReal(Box::new(expr));
    }
    expr
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decls(pairs: &[(&str, Sort)]) -> HashMap<String, Sort> {
        pairs.iter().map(|(n, s)| (n.to_string(), *s)).collect()
    }

    fn formula(json: serde_json::Value) -> Formula {
        Formula::parse(&json).unwrap()
    }

    #[test]
    fn compiles_comparison_and_collects_free_vars() {
        let compiled = compile(
            &formula(json!({"<=": ["dti", 43]})),
            &decls(&[("dti", Sort::Real)]),
        )
        .unwrap();
        assert_eq!(compiled.free, vec![("dti".to_string(), Sort::Real)]);
        assert_eq!(compiled.expr.to_smtlib2(), "(<= dti 43.0)");
    }

    #[test]
    fn int_literal_against_real_var_is_cast() {
        let compiled = compile(
            &formula(json!({"<": [{"+": ["dti", 1]}, 50]})),
            &decls(&[("dti", Sort::Real)]),
        )
        .unwrap();
        assert_eq!(compiled.expr.to_smtlib2(), "(< (+ dti 1.0) 50.0)");
    }

    #[test]
    fn int_var_meeting_real_var_gets_to_real() {
        let compiled = compile(
            &formula(json!({"==": ["n", "x"]})),
            &decls(&[("n", Sort::Int), ("x", Sort::Real)]),
        )
        .unwrap();
        assert_eq!(compiled.expr.to_smtlib2(), "(= (to_real n) x)");
    }

    #[test]
    fn undeclared_variable_is_rejected() {
        let err = compile(&formula(json!({"<=": ["ghost", 1]})), &HashMap::new()).unwrap_err();
        assert_eq!(err, CompileError::UndeclaredVariable("ghost".into()));
    }

    #[test]
    fn arithmetic_over_bool_is_rejected() {
        let err = compile(
            &formula(json!({"==": [{"+": ["flag", 1]}, 2]})),
            &decls(&[("flag", Sort::Bool)]),
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::SortMismatch { op: "+", .. }));
    }

    #[test]
    fn numeric_root_is_rejected() {
        let err = compile(&formula(json!({"+": [1, 2]})), &HashMap::new()).unwrap_err();
        assert_eq!(err, CompileError::NonBooleanRoot(Sort::Int));
    }

    #[test]
    fn compilation_is_idempotent() {
        let f = formula(json!({"or": [{"<=": ["dti", 43]}, {">=": ["n", 2]}]}));
        let d = decls(&[("dti", Sort::Real), ("n", Sort::Int)]);
        assert_eq!(compile(&f, &d).unwrap(), compile(&f, &d).unwrap());
    }
}
