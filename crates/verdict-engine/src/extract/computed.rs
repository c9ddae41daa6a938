//! Evaluation of computed-extractor formulas.
//!
//! Computed formulas run over the environment the pattern extractors built,
//! in the dependency order the loader established. Evaluation is eager and
//! total: a reference to a name that was never extracted reads as `Null`,
//! and a type error surfaces as an `Err` the caller turns into a warning
//! plus a `Null` result.

use verdict_ontology::{Computed, ComputedCmp};

use super::Environment;
use crate::value::Value;

pub fn eval(formula: &Computed, env: &Environment) -> Result<Value, String> {
    match formula {
        Computed::Var(name) => Ok(env.get(name).cloned().unwrap_or(Value::Null)),
        Computed::Bool(b) => Ok(Value::Bool(*b)),
        Computed::Int(i) => Ok(Value::Int(*i)),
        Computed::Real(r) => Ok(Value::Real(*r)),

        Computed::CountTrue(items) => {
            let mut count = 0;
            for item in items {
                if eval(item, env)?.truthy() {
                    count += 1;
                }
            }
            Ok(Value::Int(count))
        }

        Computed::CountFields(items) => {
            let mut count = 0;
            for item in items {
                let present = match item {
                    Computed::Var(name) => {
                        matches!(env.get(name), Some(v) if *v != Value::Null)
                    }
                    other => eval(other, env)? != Value::Null,
                };
                if present {
                    count += 1;
                }
            }
            Ok(Value::Int(count))
        }

        Computed::Sum(items) | Computed::Add(items) => fold_numeric(items, env, 0.0, |a, b| a + b),
        Computed::Mul(items) => fold_numeric(items, env, 1.0, |a, b| a * b),

        Computed::Any(items) => {
            for item in items {
                if eval(item, env)?.truthy() {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        Computed::All(items) => {
            for item in items {
                if !eval(item, env)?.truthy() {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }

        Computed::Cmp(op, a, b) => {
            let left = number(&eval(a, env)?)?;
            let right = number(&eval(b, env)?)?;
            let result = match op {
                ComputedCmp::Gt => left > right,
                ComputedCmp::Gte => left >= right,
                ComputedCmp::Lt => left < right,
                ComputedCmp::Lte => left <= right,
            };
            Ok(Value::Bool(result))
        }

        Computed::If(cond, then, els) => {
            if eval(cond, env)?.truthy() {
                eval(then, env)
            } else {
                eval(els, env)
            }
        }

        Computed::Not(inner) => Ok(Value::Bool(!eval(inner, env)?.truthy())),
        Computed::And(items) => {
            for item in items {
                if !eval(item, env)?.truthy() {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }
        Computed::Or(items) => {
            for item in items {
                if eval(item, env)?.truthy() {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
    }
}

fn number(value: &Value) -> Result<f64, String> {
    value
        .as_number()
        .ok_or_else(|| format!("expected a numeric value, found {}", value.kind()))
}

/// Fold numeric operands; the result stays an integer unless any operand
/// was a real.
fn fold_numeric(
    items: &[Computed],
    env: &Environment,
    init: f64,
    op: impl Fn(f64, f64) -> f64,
) -> Result<Value, String> {
    let mut acc = init;
    let mut integral = true;
    for item in items {
        let value = eval(item, env)?;
        if matches!(value, Value::Real(_)) {
            integral = false;
        }
        acc = op(acc, number(&value)?);
    }
    if integral && acc.fract() == 0.0 && acc.abs() <= i64::MAX as f64 {
        Ok(Value::Int(acc as i64))
    } else {
        Ok(Value::Real(acc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn env(pairs: &[(&str, Value)]) -> Environment {
        let mut env = Environment::new();
        for (name, value) in pairs {
            env.insert(name.to_string(), value.clone());
        }
        env
    }

    fn parse(json: serde_json::Value) -> Computed {
        Computed::parse(&json).unwrap()
    }

    #[test]
    fn count_true_counts_boolean_fields() {
        let formula = parse(json!({"count_true": ["a", "b", "c"]}));
        let env = env(&[
            ("a", Value::Bool(true)),
            ("b", Value::Bool(false)),
            ("c", Value::Bool(true)),
        ]);
        assert_eq!(eval(&formula, &env).unwrap(), Value::Int(2));
    }

    #[test]
    fn count_fields_ignores_null_and_missing() {
        let formula = parse(json!({"count_fields": ["a", "b", "c"]}));
        let env = env(&[("a", Value::Int(1)), ("b", Value::Null)]);
        assert_eq!(eval(&formula, &env).unwrap(), Value::Int(1));
    }

    #[test]
    fn sum_stays_integral_for_integer_inputs() {
        let formula = parse(json!({"sum": ["a", "b", 3]}));
        let env = env(&[("a", Value::Int(1)), ("b", Value::Int(2))]);
        assert_eq!(eval(&formula, &env).unwrap(), Value::Int(6));
    }

    #[test]
    fn sum_widens_when_a_real_appears() {
        let formula = parse(json!({"sum": ["a", 0.5]}));
        let env = env(&[("a", Value::Int(1))]);
        assert_eq!(eval(&formula, &env).unwrap(), Value::Real(1.5));
    }

    #[test]
    fn nested_if_over_comparison() {
        let formula = parse(json!({"if": [{"gte": ["score", 700]}, 1, 0]}));
        let high = env(&[("score", Value::Int(720))]);
        let low = env(&[("score", Value::Int(650))]);
        assert_eq!(eval(&formula, &high).unwrap(), Value::Int(1));
        assert_eq!(eval(&formula, &low).unwrap(), Value::Int(0));
    }

    #[test]
    fn comparison_over_string_is_an_error() {
        let formula = parse(json!({"gt": ["name", 1]}));
        let env = env(&[("name", Value::Str("x".into()))]);
        let err = eval(&formula, &env).unwrap_err();
        assert!(err.contains("string"));
    }

    #[test]
    fn missing_reference_reads_as_null() {
        let formula = parse(json!({"any": ["ghost"]}));
        let env = Environment::new();
        assert_eq!(eval(&formula, &env).unwrap(), Value::Bool(false));
    }
}
