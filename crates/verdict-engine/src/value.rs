//! Extracted values and sort coercion.

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{json, Value as Json};
use verdict_ontology::Sort;

/// A typed value produced by an extractor.
///
/// Only `Bool`, `Int`, and `Real` can reach the solver; the rest exist for
/// the environment snapshot and for computed extractors.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Real(f64),
    Str(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    /// A matched `enum` extractor label.
    Label(String),
    List(Vec<Value>),
    Null,
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Real(_) => "real",
            Value::Str(_) => "string",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
            Value::Label(_) => "enum",
            Value::List(_) => "list",
            Value::Null => "null",
        }
    }

    /// The typed default a declared variable falls back to when extraction
    /// missed or produced an incompatible value.
    pub fn default_for(sort: Sort) -> Value {
        match sort {
            Sort::Bool => Value::Bool(false),
            Sort::Int => Value::Int(0),
            Sort::Real => Value::Real(0.0),
        }
    }

    /// Coerce to a solver sort.
    ///
    /// bool → Bool; int → Int (reals truncate, bools become 0/1);
    /// real → Real (ints widen, bools become 0/1). Strings, dates, labels,
    /// lists, and nulls have no path to the solver and return `None`.
    pub fn coerce(&self, sort: Sort) -> Option<Value> {
        match (sort, self) {
            (Sort::Bool, Value::Bool(b)) => Some(Value::Bool(*b)),
            (Sort::Int, Value::Int(i)) => Some(Value::Int(*i)),
            (Sort::Int, Value::Real(r)) => Some(Value::Int(r.trunc() as i64)),
            (Sort::Int, Value::Bool(b)) => Some(Value::Int(i64::from(*b))),
            (Sort::Real, Value::Real(r)) => Some(Value::Real(*r)),
            (Sort::Real, Value::Int(i)) => Some(Value::Real(*i as f64)),
            (Sort::Real, Value::Bool(b)) => Some(Value::Real(if *b { 1.0 } else { 0.0 })),
            _ => None,
        }
    }

    /// JSON rendering for the report's environment snapshot.
    pub fn to_json(&self) -> Json {
        match self {
            Value::Bool(b) => json!(b),
            Value::Int(i) => json!(i),
            Value::Real(r) => json!(r),
            Value::Str(s) => json!(s),
            Value::Date(d) => json!(d.format("%Y-%m-%d").to_string()),
            Value::DateTime(dt) => json!(dt.format("%Y-%m-%dT%H:%M:%S").to_string()),
            Value::Label(l) => json!(l),
            Value::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Null => Json::Null,
        }
    }

    /// Truthiness for the computed-extractor dialect: booleans are
    /// themselves, numbers are non-zero, everything else is false.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Real(r) => *r != 0.0,
            _ => false,
        }
    }

    /// Numeric view for the computed-extractor dialect.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Real(r) => Some(*r),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerces_between_numeric_sorts() {
        assert_eq!(Value::Real(35.7).coerce(Sort::Int), Some(Value::Int(35)));
        assert_eq!(Value::Int(35).coerce(Sort::Real), Some(Value::Real(35.0)));
        assert_eq!(Value::Bool(true).coerce(Sort::Int), Some(Value::Int(1)));
        assert_eq!(Value::Bool(false).coerce(Sort::Real), Some(Value::Real(0.0)));
    }

    #[test]
    fn strings_and_dates_have_no_solver_coercion() {
        assert_eq!(Value::Str("x".into()).coerce(Sort::Real), None);
        assert_eq!(Value::Null.coerce(Sort::Bool), None);
        assert_eq!(
            Value::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()).coerce(Sort::Int),
            None
        );
    }

    #[test]
    fn typed_defaults_match_sorts() {
        assert_eq!(Value::default_for(Sort::Bool), Value::Bool(false));
        assert_eq!(Value::default_for(Sort::Int), Value::Int(0));
        assert_eq!(Value::default_for(Sort::Real), Value::Real(0.0));
    }

    #[test]
    fn dates_snapshot_as_iso_strings() {
        let d = Value::Date(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
        assert_eq!(d.to_json(), json!("2024-03-15"));
    }
}
