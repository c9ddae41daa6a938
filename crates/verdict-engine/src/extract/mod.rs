//! The extraction engine: raw text in, typed environment out.
//!
//! Every extractor kind is a case of [`Extractor`]; this module dispatches
//! on the tag and applies the kind's contract. Extraction never fails a
//! request: a pattern that finds nothing, a value that cannot be parsed, or
//! a computed formula that hits a type error all degrade to the kind's
//! default plus a warning in the environment.
//!
//! Pattern extractors run first, in document order. Computed extractors run
//! in a second pass, in the dependency order the loader established.

mod computed;

use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::{Regex, RegexBuilder};
use serde_json::Value as Json;
use tracing::debug;
use verdict_ontology::{EnumChoice, Extractor, ItemSort};

use crate::value::Value;

// ============================================================================
// Environment
// ============================================================================

/// The per-request binding from variable names to extracted values.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    values: BTreeMap<String, Value>,
    warnings: Vec<String>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn push_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Snapshot for the report's `parsed_data` field.
    pub fn to_json(&self) -> Json {
        let mut map = serde_json::Map::new();
        for (name, value) in &self.values {
            map.insert(name.clone(), value.to_json());
        }
        Json::Object(map)
    }
}

// ============================================================================
// Extraction
// ============================================================================

/// Run every extractor against the text and build the environment.
pub fn extract(text: &str, extractors: &[(String, Extractor)]) -> Environment {
    let mut env = Environment::new();
    let lower = text.to_lowercase();

    for (name, extractor) in extractors.iter().filter(|(_, e)| !e.is_computed()) {
        let value = run_pattern_extractor(name, extractor, text, &lower, &mut env);
        debug!(extractor = %name, kind = extractor.kind(), value = ?value, "extracted");
        env.insert(name.clone(), value);
    }

    for (name, extractor) in extractors.iter().filter(|(_, e)| e.is_computed()) {
        if let Extractor::Computed { formula } = extractor {
            let value = match computed::eval(formula, &env) {
                Ok(v) => v,
                Err(reason) => {
                    env.push_warning(format!("computed `{}` failed: {}", name, reason));
                    Value::Null
                }
            };
            debug!(extractor = %name, kind = "computed", value = ?value, "extracted");
            env.insert(name.clone(), value);
        }
    }

    env
}

fn run_pattern_extractor(
    name: &str,
    extractor: &Extractor,
    text: &str,
    lower: &str,
    env: &mut Environment,
) -> Value {
    match extractor {
        Extractor::Int { pattern } => match first_capture(pattern, text) {
            Some((group, _)) => parse_int(name, &group, env),
            None => miss(name, env, Value::Int(0)),
        },
        Extractor::Float { pattern } => match first_capture(pattern, text) {
            Some((group, _)) => match parse_decimal(&group) {
                Some(v) => Value::Real(v),
                None => miss(name, env, Value::Real(0.0)),
            },
            None => miss(name, env, Value::Real(0.0)),
        },
        Extractor::Money { pattern } => match first_capture(pattern, text) {
            Some((group, end)) => parse_money(name, &group, text, end, env),
            None => miss(name, env, Value::Int(0)),
        },
        Extractor::Percentage { pattern } => match first_capture(pattern, text) {
            Some((group, _)) => {
                let trimmed = group.trim().trim_end_matches('%');
                match parse_decimal(trimmed) {
                    Some(v) => Value::Real(v),
                    None => miss(name, env, Value::Real(0.0)),
                }
            }
            None => miss(name, env, Value::Real(0.0)),
        },
        Extractor::Boolean {
            keywords,
            negation_words,
            check_negation,
        } => {
            let mut found = keywords.iter().any(|k| lower.contains(&k.to_lowercase()));
            if *check_negation
                && negation_words
                    .iter()
                    .any(|k| lower.contains(&k.to_lowercase()))
            {
                found = false;
            }
            Value::Bool(found)
        }
        Extractor::Text { pattern } => match first_capture(pattern, text) {
            Some((group, _)) => Value::Str(group),
            None => miss(name, env, Value::Str(String::new())),
        },
        Extractor::Date { pattern, keywords } => {
            if !keywords.is_empty()
                && !keywords.iter().any(|k| lower.contains(&k.to_lowercase()))
            {
                return miss(name, env, Value::Null);
            }
            let candidate = match pattern {
                Some(re) => capture_or_match(re, text),
                None => generic_date(text),
            };
            match candidate.as_deref().and_then(parse_date) {
                Some(date) => Value::Date(date),
                None => miss(name, env, Value::Null),
            }
        }
        Extractor::DateTime { pattern } => {
            match capture_or_match(pattern, text).as_deref().and_then(parse_datetime) {
                Some(dt) => Value::DateTime(dt),
                None => miss(name, env, Value::Null),
            }
        }
        Extractor::List { pattern, item_type } => {
            let mut items = Vec::new();
            for cap in pattern.captures_iter(text) {
                if let Some(group) = cap.get(1) {
                    match parse_item(group.as_str(), *item_type) {
                        Some(v) => items.push(v),
                        None => env.push_warning(format!(
                            "`{}`: skipped list item `{}`",
                            name,
                            group.as_str()
                        )),
                    }
                }
            }
            if items.is_empty() {
                return miss(name, env, Value::List(Vec::new()));
            }
            Value::List(items)
        }
        Extractor::Enum { choices, default } => match match_enum(choices, lower) {
            Some(label) => Value::Label(label),
            None => match default {
                Some(label) => Value::Label(label.clone()),
                None => miss(name, env, Value::Null),
            },
        },
        Extractor::Computed { .. } => unreachable!("computed extractors run in the second pass"),
    }
}

fn miss(name: &str, env: &mut Environment, default: Value) -> Value {
    env.push_warning(format!("could not extract `{}`; using default", name));
    default
}

// ============================================================================
// Match helpers
// ============================================================================

/// First match of the pattern; returns group 1 and its end offset.
fn first_capture(pattern: &Regex, text: &str) -> Option<(String, usize)> {
    let cap = pattern.captures(text)?;
    let group = cap.get(1)?;
    Some((group.as_str().to_string(), group.end()))
}

/// Group 1 of the first match, or the whole match when the pattern has no
/// capture group.
fn capture_or_match(pattern: &Regex, text: &str) -> Option<String> {
    let cap = pattern.captures(text)?;
    let m = cap.get(1).or_else(|| cap.get(0))?;
    Some(m.as_str().to_string())
}

fn match_enum(choices: &[EnumChoice], lower: &str) -> Option<String> {
    for choice in choices {
        if choice
            .keywords
            .iter()
            .any(|k| lower.contains(&k.to_lowercase()))
        {
            return Some(choice.label.clone());
        }
    }
    None
}

// ============================================================================
// Numeric parsing
// ============================================================================

fn parse_decimal(s: &str) -> Option<f64> {
    s.trim().replace([',', '$'], "").parse::<f64>().ok()
}

/// Base-10 integer parse with commas stripped; out-of-range values saturate
/// at the representable extreme and record a warning.
fn parse_int(name: &str, group: &str, env: &mut Environment) -> Value {
    let cleaned = group.trim().replace(',', "");
    if let Ok(v) = cleaned.parse::<i64>() {
        return Value::Int(v);
    }
    if let Ok(wide) = cleaned.parse::<i128>() {
        env.push_warning(format!(
            "`{}`: value `{}` exceeds integer range; saturated",
            name, group
        ));
        let clamped = wide.clamp(i64::MIN as i128, i64::MAX as i128) as i64;
        return Value::Int(clamped);
    }
    miss(name, env, Value::Int(0))
}

/// Parse a monetary amount, applying a `k`/`m`/`b` scale suffix found either
/// at the end of the captured group or immediately after it in the text.
fn parse_money(name: &str, group: &str, text: &str, group_end: usize, env: &mut Environment) -> Value {
    let trimmed = group.trim();
    let (digits, inline_suffix) = split_money_suffix(trimmed);
    let Some(base) = parse_decimal(digits) else {
        return miss(name, env, Value::Int(0));
    };

    let suffix = inline_suffix.or_else(|| {
        text.get(group_end..)
            .and_then(|rest| rest.chars().next())
            .filter(|c| matches!(c, 'k' | 'K' | 'm' | 'M' | 'b' | 'B'))
    });
    let scale = match suffix {
        Some('k') | Some('K') => 1_000.0,
        Some('m') | Some('M') => 1_000_000.0,
        Some('b') | Some('B') => 1_000_000_000.0,
        _ => 1.0,
    };

    let amount = base * scale;
    if amount.fract() != 0.0 {
        return Value::Real(amount);
    }
    if amount > i64::MAX as f64 || amount < i64::MIN as f64 {
        env.push_warning(format!(
            "`{}`: amount `{}` exceeds integer range; saturated",
            name, group
        ));
        return Value::Int(if amount > 0.0 { i64::MAX } else { i64::MIN });
    }
    Value::Int(amount as i64)
}

fn split_money_suffix(s: &str) -> (&str, Option<char>) {
    match s.chars().last() {
        Some(c @ ('k' | 'K' | 'm' | 'M' | 'b' | 'B')) => (&s[..s.len() - c.len_utf8()], Some(c)),
        _ => (s, None),
    }
}

fn parse_item(s: &str, item_type: ItemSort) -> Option<Value> {
    let trimmed = s.trim();
    match item_type {
        ItemSort::Int => trimmed.replace(',', "").parse::<i64>().ok().map(Value::Int),
        ItemSort::Float => parse_decimal(trimmed).map(Value::Real),
        ItemSort::String => Some(Value::Str(trimmed.to_string())),
        ItemSort::Boolean => match trimmed.to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(Value::Bool(true)),
            "false" | "no" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
    }
}

// ============================================================================
// Date parsing
// ============================================================================

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%B %d, %Y",
    "%B %d %Y",
    "%d %B %Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M",
];

fn parse_date(s: &str) -> Option<NaiveDate> {
    let trimmed = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let trimmed = s.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
}

/// First thing in the text that looks like a date, for `date` extractors
/// authored without a pattern.
fn generic_date(text: &str) -> Option<String> {
    static GENERIC: OnceLock<Regex> = OnceLock::new();
    let re = GENERIC.get_or_init(|| {
        const MONTHS: &str = "january|february|march|april|may|june|july|august|september|october|november|december";
        RegexBuilder::new(&format!(
            r"\b(\d{{4}}[-/]\d{{1,2}}[-/]\d{{1,2}}|\d{{1,2}}[-/]\d{{1,2}}[-/]\d{{4}}|(?:{m})\s+\d{{1,2}},?\s+\d{{4}}|\d{{1,2}}\s+(?:{m})\s+\d{{4}})\b",
            m = MONTHS
        ))
        .case_insensitive(true)
        .build()
        .expect("generic date pattern compiles")
    });
    re.find(text).map(|m| m.as_str().to_string())
}

// ============================================================================
// Tests
// ============================================================================
