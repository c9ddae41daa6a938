//! Constraint formula trees.
//!
//! Formulas arrive as JSON objects keyed by a single operator, e.g.
//!
//! ```json
//! { "or": [ { "<=": ["dti", 43] }, { ">=": ["compensating_factors", 2] } ] }
//! ```
//!
//! The dynamic operator-key dispatch of the original engine becomes a tagged
//! variant here: parsing resolves every operator and checks arity up front,
//! and [`Formula::infer_sort`] checks operand sorts against the constraint's
//! variable declarations, so a loaded formula can no longer fail structurally
//! at verification time.
//!
//! Bare operands are sugar: a string is a variable reference, a number is an
//! `Int` or `Real` literal, and a boolean is a `Bool` literal. The explicit
//! forms `{"var": name}` and `{"const": v}` are accepted as well.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use thiserror::Error;

// ============================================================================
// Sorts
// ============================================================================

/// The solver sorts a constraint variable may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sort {
    Bool,
    Int,
    Real,
}

impl Sort {
    pub fn is_numeric(self) -> bool {
        matches!(self, Sort::Int | Sort::Real)
    }

    /// Join two numeric sorts; any `Real` operand promotes the result.
    pub fn promote(self, other: Sort) -> Sort {
        if self == Sort::Real || other == Sort::Real {
            Sort::Real
        } else {
            Sort::Int
        }
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sort::Bool => write!(f, "bool"),
            Sort::Int => write!(f, "int"),
            Sort::Real => write!(f, "real"),
        }
    }
}

// ============================================================================
// Operators
// ============================================================================

/// Binary comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }

    /// `==` and `!=` also apply to Booleans; the orderings are numeric only.
    pub fn allows_bool(self) -> bool {
        matches!(self, CmpOp::Eq | CmpOp::Ne)
    }
}

// ============================================================================
// Formula tree
// ============================================================================

/// A parsed constraint formula.
///
/// `And`, `Or`, `Add`, and `Mul` are n-ary with at least one operand;
/// everything else has fixed arity, enforced at parse time.
#[derive(Debug, Clone, PartialEq)]
pub enum Formula {
    Bool(bool),
    Int(i64),
    Real(f64),
    Var(String),
    Not(Box<Formula>),
    And(Vec<Formula>),
    Or(Vec<Formula>),
    Implies(Box<Formula>, Box<Formula>),
    Ite(Box<Formula>, Box<Formula>, Box<Formula>),
    Cmp(CmpOp, Box<Formula>, Box<Formula>),
    Add(Vec<Formula>),
    Sub(Box<Formula>, Box<Formula>),
    Mul(Vec<Formula>),
    Div(Box<Formula>, Box<Formula>),
    Min(Box<Formula>, Box<Formula>),
    Max(Box<Formula>, Box<Formula>),
}

/// Errors raised while parsing or sort-checking a formula tree.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FormulaError {
    #[error("unknown operator `{0}`")]
    UnknownOperator(String),
    #[error("operator object must have exactly one key, found {0}")]
    AmbiguousOperator(usize),
    #[error("`{op}` expects {expected} operand(s), got {got}")]
    Arity {
        op: &'static str,
        expected: &'static str,
        got: usize,
    },
    #[error("`{op}` operands must be an array")]
    ExpectedArray { op: &'static str },
    #[error("invalid operand: {0}")]
    InvalidOperand(String),
    #[error("invalid `const` value: {0}")]
    InvalidConst(String),
    #[error("variable `{0}` is not declared by this constraint")]
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

impl Formula {
    // ------------------------------------------------------------------
    // Parsing
    // ------------------------------------------------------------------

    /// Parse a JSON formula tree, checking operator arity as we go.
    pub fn parse(json: &Json) -> Result<Formula, FormulaError> {
        match json {
            Json::Bool(b) => Ok(Formula::Bool(*b)),
            Json::Number(n) => Ok(Self::number(n)),
            Json::String(name) => Ok(Formula::Var(name.clone())),
            Json::Object(map) => Self::parse_object(map),
            other => Err(FormulaError::InvalidOperand(other.to_string())),
        }
    }

    fn number(n: &serde_json::Number) -> Formula {
        match n.as_i64() {
            Some(i) => Formula::Int(i),
            None => Formula::Real(n.as_f64().unwrap_or(f64::MAX)),
        }
    }

    fn parse_object(map: &serde_json::Map<String, Json>) -> Result<Formula, FormulaError> {
        if map.len() != 1 {
            return Err(FormulaError::AmbiguousOperator(map.len()));
        }
        let (key, operands) = map.iter().next().unwrap();
        match key.as_str() {
            "and" => Ok(Formula::And(Self::nary("and", operands)?)),
            "or" => Ok(Formula::Or(Self::nary("or", operands)?)),
            "not" => Ok(Formula::Not(Box::new(Self::parse(operands)?))),
            "implies" => {
                let [a, b] = Self::binary("implies", operands)?;
                Ok(Formula::Implies(Box::new(a), Box::new(b)))
            }
            "ite" | "if" => {
                let [c, t, e] = Self::ternary("ite", operands)?;
                Ok(Formula::Ite(Box::new(c), Box::new(t), Box::new(e)))
            }
            "==" => Self::cmp(CmpOp::Eq, operands),
            "!=" => Self::cmp(CmpOp::Ne, operands),
            "<" => Self::cmp(CmpOp::Lt, operands),
            "<=" => Self::cmp(CmpOp::Le, operands),
            ">" => Self::cmp(CmpOp::Gt, operands),
            ">=" => Self::cmp(CmpOp::Ge, operands),
            "+" => Ok(Formula::Add(Self::nary("+", operands)?)),
            "*" => Ok(Formula::Mul(Self::nary("*", operands)?)),
            "-" => {
                let [a, b] = Self::binary("-", operands)?;
                Ok(Formula::Sub(Box::new(a), Box::new(b)))
            }
            "/" => {
                let [a, b] = Self::binary("/", operands)?;
                Ok(Formula::Div(Box::new(a), Box::new(b)))
            }
            "min" => {
                let [a, b] = Self::binary("min", operands)?;
                Ok(Formula::Min(Box::new(a), Box::new(b)))
            }
            "max" => {
                let [a, b] = Self::binary("max", operands)?;
                Ok(Formula::Max(Box::new(a), Box::new(b)))
            }
            "var" => match operands {
                Json::String(name) => Ok(Formula::Var(name.clone())),
                other => Err(FormulaError::InvalidOperand(other.to_string())),
            },
            "const" => match operands {
                Json::Bool(b) => Ok(Formula::Bool(*b)),
                Json::String(s) if s == "true" => Ok(Formula::Bool(true)),
                Json::String(s) if s == "false" => Ok(Formula::Bool(false)),
                Json::Number(n) => Ok(Self::number(n)),
                other => Err(FormulaError::InvalidConst(other.to_string())),
            },
            other => Err(FormulaError::UnknownOperator(other.to_string())),
        }
    }

    fn cmp(op: CmpOp, operands: &Json) -> Result<Formula, FormulaError> {
        let [a, b] = Self::binary(op.symbol(), operands)?;
        Ok(Formula::Cmp(op, Box::new(a), Box::new(b)))
    }

    fn operand_array<'a>(op: &'static str, json: &'a Json) -> Result<&'a [Json], FormulaError> {
        json.as_array()
            .map(Vec::as_slice)
            .ok_or(FormulaError::ExpectedArray { op })
    }

    fn nary(op: &'static str, json: &Json) -> Result<Vec<Formula>, FormulaError> {
        let items = Self::operand_array(op, json)?;
        if items.is_empty() {
            return Err(FormulaError::Arity {
                op,
                expected: "at least 1",
                got: 0,
            });
        }
        items.iter().map(Self::parse).collect()
    }

    fn binary(op: &'static str, json: &Json) -> Result<[Formula; 2], FormulaError> {
        let items = Self::operand_array(op, json)?;
        if items.len() != 2 {
            return Err(FormulaError::Arity {
                op,
                expected: "2",
                got: items.len(),
            });
        }
        Ok([Self::parse(&items[0])?, Self::parse(&items[1])?])
    }

    fn ternary(op: &'static str, json: &Json) -> Result<[Formula; 3], FormulaError> {
        let items = Self::operand_array(op, json)?;
        if items.len() != 3 {
            return Err(FormulaError::Arity {
                op,
                expected: "3",
                got: items.len(),
            });
        }
        Ok([
            Self::parse(&items[0])?,
            Self::parse(&items[1])?,
            Self::parse(&items[2])?,
        ])
    }

    // ------------------------------------------------------------------
    // Sort checking
    // ------------------------------------------------------------------

    /// Infer the sort of this formula under the given declarations.
    ///
    /// This is the load-time dry-run compile: it visits every node, resolves
    /// every variable against the declaration table, and checks that operand
    /// sorts match their operators. Mixed `Int`/`Real` arithmetic promotes
    /// to `Real`.
    pub fn infer_sort(&self, decls: &HashMap<String, Sort>) -> Result<Sort, FormulaError> {
        match self {
            Formula::Bool(_) => Ok(Sort::Bool),
            Formula::Int(_) => Ok(Sort::Int),
            Formula::Real(_) => Ok(Sort::Real),
            Formula::Var(name) => decls
                .get(name)
                .copied()
                .ok_or_else(|| FormulaError::UndeclaredVariable(name.clone())),
            Formula::Not(inner) => {
                Self::expect_bool("not", inner.infer_sort(decls)?)?;
                Ok(Sort::Bool)
            }
            Formula::And(items) => Self::all_bool("and", items, decls),
            Formula::Or(items) => Self::all_bool("or", items, decls),
            Formula::Implies(a, b) => {
                Self::expect_bool("implies", a.infer_sort(decls)?)?;
                Self::expect_bool("implies", b.infer_sort(decls)?)?;
                Ok(Sort::Bool)
            }
            Formula::Ite(cond, then, els) => {
                Self::expect_bool("ite", cond.infer_sort(decls)?)?;
                let t = then.infer_sort(decls)?;
                let e = els.infer_sort(decls)?;
                match (t, e) {
                    (Sort::Bool, Sort::Bool) => Ok(Sort::Bool),
                    (t, e) if t.is_numeric() && e.is_numeric() => Ok(t.promote(e)),
                    _ => Err(FormulaError::BranchMismatch {
                        then_sort: t,
                        else_sort: e,
                    }),
                }
            }
            Formula::Cmp(op, a, b) => {
                let sa = a.infer_sort(decls)?;
                let sb = b.infer_sort(decls)?;
                match (sa, sb) {
                    (Sort::Bool, Sort::Bool) if op.allows_bool() => Ok(Sort::Bool),
                    (sa, sb) if sa.is_numeric() && sb.is_numeric() => Ok(Sort::Bool),
                    _ => Err(FormulaError::SortMismatch {
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
            Formula::Add(items) => Self::all_numeric("+", items, decls),
            Formula::Mul(items) => Self::all_numeric("*", items, decls),
            Formula::Sub(a, b) => Self::numeric_pair("-", a, b, decls),
            Formula::Div(a, b) => Self::numeric_pair("/", a, b, decls),
            Formula::Min(a, b) => Self::numeric_pair("min", a, b, decls),
            Formula::Max(a, b) => Self::numeric_pair("max", a, b, decls),
        }
    }

    fn expect_bool(op: &'static str, sort: Sort) -> Result<(), FormulaError> {
        if sort == Sort::Bool {
            Ok(())
        } else {
            Err(FormulaError::SortMismatch {
                op,
                expected: "bool",
                found: sort,
            })
        }
    }

    fn all_bool(
        op: &'static str,
        items: &[Formula],
        decls: &HashMap<String, Sort>,
    ) -> Result<Sort, FormulaError> {
        for item in items {
            Self::expect_bool(op, item.infer_sort(decls)?)?;
        }
        Ok(Sort::Bool)
    }

    fn all_numeric(
        op: &'static str,
        items: &[Formula],
        decls: &HashMap<String, Sort>,
    ) -> Result<Sort, FormulaError> {
        let mut sort = Sort::Int;
        for item in items {
            let s = item.infer_sort(decls)?;
            if !s.is_numeric() {
                return Err(FormulaError::SortMismatch {
                    op,
                    expected: "numeric",
                    found: s,
                });
            }
            sort = sort.promote(s);
        }
        Ok(sort)
    }

    fn numeric_pair(
        op: &'static str,
        a: &Formula,
        b: &Formula,
        decls: &HashMap<String, Sort>,
    ) -> Result<Sort, FormulaError> {
        let sa = a.infer_sort(decls)?;
        let sb = b.infer_sort(decls)?;
        for s in [sa, sb] {
            if !s.is_numeric() {
                return Err(FormulaError::SortMismatch {
                    op,
                    expected: "numeric",
                    found: s,
                });
            }
        }
        Ok(sa.promote(sb))
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Collect every variable name referenced anywhere in the tree.
    pub fn variables(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Formula::Var(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Formula::Bool(_) | Formula::Int(_) | Formula::Real(_) => {}
            Formula::Not(inner) => inner.collect_variables(out),
            Formula::And(items) | Formula::Or(items) | Formula::Add(items) | Formula::Mul(items) => {
                for item in items {
                    item.collect_variables(out);
                }
            }
            Formula::Implies(a, b)
            | Formula::Cmp(_, a, b)
            | Formula::Sub(a, b)
            | Formula::Div(a, b)
            | Formula::Min(a, b)
            | Formula::Max(a, b) => {
                a.collect_variables(out);
                b.collect_variables(out);
            }
            Formula::Ite(c, t, e) => {
                c.collect_variables(out);
                t.collect_variables(out);
                e.collect_variables(out);
            }
        }
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, items: &[Formula], sep: &str) -> fmt::Result {
            write!(f, "(")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, " {} ", sep)?;
                }
                write!(f, "{}", item)?;
            }
            write!(f, ")")
        }

        match self {
            Formula::Bool(b) => write!(f, "{}", b),
            Formula::Int(i) => write!(f, "{}", i),
            Formula::Real(r) => write!(f, "{}", r),
            Formula::Var(name) => write!(f, "{}", name),
            Formula::Not(inner) => write!(f, "not {}", inner),
            Formula::And(items) => join(f, items, "and"),
            Formula::Or(items) => join(f, items, "or"),
            Formula::Implies(a, b) => write!(f, "({} => {})", a, b),
            Formula::Ite(c, t, e) => write!(f, "(if {} then {} else {})", c, t, e),
            Formula::Cmp(op, a, b) => write!(f, "({} {} {})", a, op.symbol(), b),
            Formula::Add(items) => join(f, items, "+"),
            Formula::Mul(items) => join(f, items, "*"),
            Formula::Sub(a, b) => write!(f, "({} - {})", a, b),
            Formula::Div(a, b) => write!(f, "({} / {})", a, b),
            Formula::Min(a, b) => write!(f, "min({}, {})", a, b),
            Formula::Max(a, b) => write!(f, "max({}, {})", a, b),
        }
    }
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

    #[test]
    fn parses_comparison_with_variable_and_literal() {
        let f = Formula::parse(&json!({"<=": ["dti", 43]})).unwrap();
        assert_eq!(
            f,
            Formula::Cmp(
                CmpOp::Le,
                Box::new(Formula::Var("dti".into())),
                Box::new(Formula::Int(43)),
            )
        );
    }

    #[test]
    fn parses_nested_disjunction() {
        let f = Formula::parse(&json!({
            "or": [
                {"<=": ["dti", 43]},
                {">=": ["compensating_factors", 2]},
            ]
        }))
        .unwrap();
        match f {
            Formula::Or(items) => assert_eq!(items.len(), 2),
            other => panic!("expected Or, got {:?}", other),
        }
    }

    #[test]
    fn parses_const_and_var_escape_hatches() {
        assert_eq!(
            Formula::parse(&json!({"const": true})).unwrap(),
            Formula::Bool(true)
        );
        assert_eq!(
            Formula::parse(&json!({"const": "false"})).unwrap(),
            Formula::Bool(false)
        );
        assert_eq!(
            Formula::parse(&json!({"var": "x"})).unwrap(),
            Formula::Var("x".into())
        );
    }

    #[test]
    fn fractional_literals_become_real() {
        assert_eq!(Formula::parse(&json!(1.5)).unwrap(), Formula::Real(1.5));
        assert_eq!(Formula::parse(&json!(42)).unwrap(), Formula::Int(42));
    }

    #[test]
    fn rejects_unknown_operator() {
        let err = Formula::parse(&json!({"xor": [true, false]})).unwrap_err();
        assert_eq!(err, FormulaError::UnknownOperator("xor".into()));
    }

    #[test]
    fn rejects_implies_with_three_operands() {
        let err = Formula::parse(&json!({"implies": [true, false, true]})).unwrap_err();
        assert!(matches!(err, FormulaError::Arity { op: "implies", .. }));
    }

    #[test]
    fn rejects_empty_conjunction() {
        let err = Formula::parse(&json!({"and": []})).unwrap_err();
        assert!(matches!(err, FormulaError::Arity { op: "and", got: 0, .. }));
    }

    #[test]
    fn rejects_object_with_two_operator_keys() {
        let err =
            Formula::parse(&json!({"and": [true], "or": [false]})).unwrap_err();
        assert_eq!(err, FormulaError::AmbiguousOperator(2));
    }

    #[test]
    fn infers_bool_for_comparison_over_reals() {
        let f = Formula::parse(&json!({"<=": ["dti", 43]})).unwrap();
        let sort = f.infer_sort(&decls(&[("dti", Sort::Real)])).unwrap();
        assert_eq!(sort, Sort::Bool);
    }

    #[test]
    fn undeclared_variable_is_an_error() {
        let f = Formula::parse(&json!({"<=": ["dti", 43]})).unwrap();
        let err = f.infer_sort(&HashMap::new()).unwrap_err();
        assert_eq!(err, FormulaError::UndeclaredVariable("dti".into()));
    }

    #[test]
    fn ordering_over_bools_is_rejected() {
        let f = Formula::parse(&json!({"<": ["flag", true]})).unwrap();
        let err = f.infer_sort(&decls(&[("flag", Sort::Bool)])).unwrap_err();
        assert!(matches!(err, FormulaError::SortMismatch { op: "<", .. }));
    }

    #[test]
    fn bool_equality_is_allowed() {
        let f = Formula::parse(&json!({"==": ["flag", true]})).unwrap();
        let sort = f.infer_sort(&decls(&[("flag", Sort::Bool)])).unwrap();
        assert_eq!(sort, Sort::Bool);
    }

    #[test]
    fn mixed_arithmetic_promotes_to_real() {
        let f = Formula::parse(&json!({"+": ["n", 1.5]})).unwrap();
        let sort = f.infer_sort(&decls(&[("n", Sort::Int)])).unwrap();
        assert_eq!(sort, Sort::Real);
    }

    #[test]
    fn ite_with_bool_and_numeric_branches_is_rejected() {
        let f = Formula::parse(&json!({"ite": [true, true, 1]})).unwrap();
        let err = f.infer_sort(&HashMap::new()).unwrap_err();
        assert!(matches!(err, FormulaError::BranchMismatch { .. }));
    }

    #[test]
    fn collects_each_variable_once() {
        let f = Formula::parse(&json!({
            "and": [{"<": ["a", "b"]}, {"<": ["a", 10]}]
        }))
        .unwrap();
        assert_eq!(f.variables(), vec!["a", "b"]);
    }

    #[test]
    fn renders_readable_form() {
        let f = Formula::parse(&json!({"implies": [{"==": ["is_denial", true]},
                                                   {"==": ["has_specific_reason", true]}]}))
            .unwrap();
        assert_eq!(
            f.to_string(),
            "((is_denial == true) => (has_specific_reason == true))"
        );
    }
}
