//! The computed-extractor formula dialect.
//!
//! Computed extractors derive a value from fields the pattern extractors
//! already produced, e.g.
//!
//! ```json
//! { "type": "computed", "formula": {"count_true": ["has_reserves", "low_ltv"]} }
//! ```
//!
//! The dialect deliberately stays separate from the constraint formula
//! language: it evaluates eagerly over arbitrary extracted values (including
//! strings, dates, and lists), while constraint formulas are restricted to
//! the solver sorts. Operands are variable names (bare strings), literals,
//! or nested expressions.
//!
//! This module owns the AST and its dependency analysis so the loader can
//! reject cyclic computed graphs; evaluation lives in the engine crate.

use serde_json::Value as Json;
use thiserror::Error;

/// Comparison operators available to computed formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputedCmp {
    Gt,
    Gte,
    Lt,
    Lte,
}

/// A parsed computed-extractor expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Computed {
    Var(String),
    Bool(bool),
    Int(i64),
    Real(f64),
    /// Number of operands that evaluate to boolean `true`.
    CountTrue(Vec<Computed>),
    /// Number of referenced fields that were extracted to a non-null value.
    CountFields(Vec<Computed>),
    Sum(Vec<Computed>),
    Any(Vec<Computed>),
    All(Vec<Computed>),
    Cmp(ComputedCmp, Box<Computed>, Box<Computed>),
    Add(Vec<Computed>),
    Mul(Vec<Computed>),
    If(Box<Computed>, Box<Computed>, Box<Computed>),
    Not(Box<Computed>),
    And(Vec<Computed>),
    Or(Vec<Computed>),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ComputedError {
    #[error("unknown computed operator `{0}`")]
    UnknownOperator(String),
    #[error("computed operator object must have exactly one key, found {0}")]
    AmbiguousOperator(usize),
    #[error("computed `{op}` expects {expected} operand(s), got {got}")]
    Arity {
        op: &'static str,
        expected: &'static str,
        got: usize,
    },
    #[error("computed `{op}` operands must be an array")]
    ExpectedArray { op: &'static str },
    #[error("invalid computed operand: {0}")]
    InvalidOperand(String),
}

impl Computed {
    pub fn parse(json: &Json) -> Result<Computed, ComputedError> {
        match json {
            Json::String(name) => Ok(Computed::Var(name.clone())),
            Json::Bool(b) => Ok(Computed::Bool(*b)),
            Json::Number(n) => Ok(match n.as_i64() {
                Some(i) => Computed::Int(i),
                None => Computed::Real(n.as_f64().unwrap_or(0.0)),
            }),
            Json::Object(map) => {
                if map.len() != 1 {
                    return Err(ComputedError::AmbiguousOperator(map.len()));
                }
                let (key, operands) = map.iter().next().unwrap();
                match key.as_str() {
                    "count_true" => Ok(Computed::CountTrue(Self::nary("count_true", operands)?)),
                    "count_fields" => {
                        Ok(Computed::CountFields(Self::nary("count_fields", operands)?))
                    }
                    "sum" => Ok(Computed::Sum(Self::nary("sum", operands)?)),
                    "any" => Ok(Computed::Any(Self::nary("any", operands)?)),
                    "all" => Ok(Computed::All(Self::nary("all", operands)?)),
                    "add" => Ok(Computed::Add(Self::nary("add", operands)?)),
                    "mul" => Ok(Computed::Mul(Self::nary("mul", operands)?)),
                    "and" => Ok(Computed::And(Self::nary("and", operands)?)),
                    "or" => Ok(Computed::Or(Self::nary("or", operands)?)),
                    "gt" => Self::cmp(ComputedCmp::Gt, "gt", operands),
                    "gte" => Self::cmp(ComputedCmp::Gte, "gte", operands),
                    "lt" => Self::cmp(ComputedCmp::Lt, "lt", operands),
                    "lte" => Self::cmp(ComputedCmp::Lte, "lte", operands),
                    "not" => Ok(Computed::Not(Box::new(Self::parse(operands)?))),
                    "if" => {
                        let items = Self::exactly("if", operands, 3)?;
                        Ok(Computed::If(
                            Box::new(Self::parse(&items[0])?),
                            Box::new(Self::parse(&items[1])?),
                            Box::new(Self::parse(&items[2])?),
                        ))
                    }
                    other => Err(ComputedError::UnknownOperator(other.to_string())),
                }
            }
            other => Err(ComputedError::InvalidOperand(other.to_string())),
        }
    }

    fn cmp(op: ComputedCmp, name: &'static str, operands: &Json) -> Result<Computed, ComputedError> {
        let items = Self::exactly(name, operands, 2)?;
        Ok(Computed::Cmp(
            op,
            Box::new(Self::parse(&items[0])?),
            Box::new(Self::parse(&items[1])?),
        ))
    }

    fn exactly<'a>(
        op: &'static str,
        json: &'a Json,
        n: usize,
    ) -> Result<&'a [Json], ComputedError> {
        let items = json
            .as_array()
            .map(Vec::as_slice)
            .ok_or(ComputedError::ExpectedArray { op })?;
        if items.len() != n {
            return Err(ComputedError::Arity {
                op,
                expected: if n == 2 { "2" } else { "3" },
                got: items.len(),
            });
        }
        Ok(items)
    }

    fn nary(op: &'static str, json: &Json) -> Result<Vec<Computed>, ComputedError> {
        let items = json
            .as_array()
            .map(Vec::as_slice)
            .ok_or(ComputedError::ExpectedArray { op })?;
        if items.is_empty() {
            return Err(ComputedError::Arity {
                op,
                expected: "at least 1",
                got: 0,
            });
        }
        items.iter().map(Self::parse).collect()
    }

    /// Names of the extracted fields this expression reads.
    ///
    /// Used by the loader to order computed extractors and to reject cycles.
    pub fn dependencies(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_deps(&mut out);
        out
    }

    fn collect_deps<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Computed::Var(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Computed::Bool(_) | Computed::Int(_) | Computed::Real(_) => {}
            Computed::Not(inner) => inner.collect_deps(out),
            Computed::CountTrue(items)
            | Computed::CountFields(items)
            | Computed::Sum(items)
            | Computed::Any(items)
            | Computed::All(items)
            | Computed::Add(items)
            | Computed::Mul(items)
            | Computed::And(items)
            | Computed::Or(items) => {
                for item in items {
                    item.collect_deps(out);
                }
            }
            Computed::Cmp(_, a, b) => {
                a.collect_deps(out);
                b.collect_deps(out);
            }
            Computed::If(c, t, e) => {
                c.collect_deps(out);
                t.collect_deps(out);
                e.collect_deps(out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_count_true_over_fields() {
        let c = Computed::parse(&json!({"count_true": ["a", "b", "c"]})).unwrap();
        assert_eq!(
            c,
            Computed::CountTrue(vec![
                Computed::Var("a".into()),
                Computed::Var("b".into()),
                Computed::Var("c".into()),
            ])
        );
        assert_eq!(c.dependencies(), vec!["a", "b", "c"]);
    }

    #[test]
    fn parses_nested_condition() {
        let c = Computed::parse(&json!({
            "if": [{"gte": ["score", 700]}, 1, 0]
        }))
        .unwrap();
        assert_eq!(c.dependencies(), vec!["score"]);
    }

    #[test]
    fn rejects_unknown_operator() {
        let err = Computed::parse(&json!({"median": ["a"]})).unwrap_err();
        assert_eq!(err, ComputedError::UnknownOperator("median".into()));
    }

    #[test]
    fn rejects_binary_comparison_with_one_operand() {
        let err = Computed::parse(&json!({"gt": ["a"]})).unwrap_err();
        assert!(matches!(err, ComputedError::Arity { op: "gt", got: 1, .. }));
    }
}
