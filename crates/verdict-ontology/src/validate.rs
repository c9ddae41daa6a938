//! Document validation.
//!
//! Everything that can be rejected before a request arrives is rejected
//! here: missing fields, duplicate constraint ids, duplicate or undeclared
//! variables, malformed formulas (a full dry-run sort inference), unknown
//! extractor kinds, uncompilable patterns, and cyclic computed-extractor
//! graphs. Validation collects every issue it finds rather than stopping at
//! the first, so a broken document reports all of its problems at once.

use std::collections::{HashMap, HashSet};

use regex::{Regex, RegexBuilder};
use serde_json::Value as Json;

use crate::computed::Computed;
use crate::document::{
    Constraint, EnumChoice, Extractor, ExtractorDoc, Ontology, OntologyDoc,
};
use crate::formula::{Formula, FormulaError, Sort};

/// Validate a raw JSON document into an [`Ontology`].
///
/// On failure, returns every issue found. The caller (the registry) wraps
/// the list into [`crate::OntologyError::Invalid`].
pub fn validate_document(document: Json) -> Result<Ontology, Vec<String>> {
    let doc: OntologyDoc = match serde_json::from_value(document.clone()) {
        Ok(doc) => doc,
        Err(e) => return Err(vec![e.to_string()]),
    };

    let mut issues = Vec::new();

    let constraints = validate_constraints(&doc, &mut issues);
    let extractors = validate_extractors(&doc, &mut issues);

    if !issues.is_empty() {
        return Err(issues);
    }

    Ok(Ontology {
        name: doc.name,
        version: doc.version,
        description: doc.description,
        constraints,
        extractors,
        document,
    })
}

// ============================================================================
// Constraints
// ============================================================================

fn validate_constraints(doc: &OntologyDoc, issues: &mut Vec<String>) -> Vec<Constraint> {
    let mut seen_ids = HashSet::new();
    let mut out = Vec::with_capacity(doc.constraints.len());

    for c in &doc.constraints {
        if !seen_ids.insert(c.id.clone()) {
            issues.push(format!("duplicate constraint id `{}`", c.id));
        }

        let mut decls: HashMap<String, Sort> = HashMap::new();
        for v in &c.variables {
            if decls.insert(v.name.clone(), v.sort).is_some() {
                issues.push(format!(
                    "constraint `{}` declares variable `{}` more than once",
                    c.id, v.name
                ));
            }
        }

        let formula = match Formula::parse(&c.formula) {
            Ok(f) => f,
            Err(e) => {
                issues.push(format!("constraint `{}`: {}", c.id, e));
                continue;
            }
        };

        // Dry-run compile: resolves every name and checks operator sorts.
        match formula.infer_sort(&decls) {
            Ok(Sort::Bool) => {}
            Ok(sort) => issues.push(format!(
                "constraint `{}`: {}",
                c.id,
                FormulaError::NonBooleanRoot(sort)
            )),
            Err(e) => issues.push(format!("constraint `{}`: {}", c.id, e)),
        }

        let formula_readable = c
            .formula_readable
            .clone()
            .unwrap_or_else(|| formula.to_string());

        out.push(Constraint {
            id: c.id.clone(),
            category: c.category.clone(),
            description: c.description.clone(),
            formula_readable,
            formula,
            formula_json: c.formula.clone(),
            variables: c.variables.clone(),
            error_message: c
                .error_message
                .clone()
                .unwrap_or_else(|| format!("constraint `{}` violated", c.id)),
            citation: c.citation.clone(),
        });
    }

    out
}

// ============================================================================
// Extractors
// ============================================================================

fn validate_extractors(doc: &OntologyDoc, issues: &mut Vec<String>) -> Vec<(String, Extractor)> {
    let mut pattern_extractors = Vec::new();
    let mut computed = Vec::new();

    for (name, spec) in &doc.extractors {
        let parsed: ExtractorDoc = match serde_json::from_value(spec.clone()) {
            Ok(p) => p,
            Err(e) => {
                issues.push(format!("extractor `{}`: {}", name, e));
                continue;
            }
        };
        match build_extractor(name, parsed, issues) {
            Some(e @ Extractor::Computed { .. }) => computed.push((name.clone(), e)),
            Some(e) => pattern_extractors.push((name.clone(), e)),
            None => {}
        }
    }

    match order_computed(computed) {
        Ok(ordered) => pattern_extractors.extend(ordered),
        Err(cycle) => issues.push(format!(
            "computed extractors form a cycle: {}",
            cycle.join(" -> ")
        )),
    }

    pattern_extractors
}

fn build_extractor(
    name: &str,
    doc: ExtractorDoc,
    issues: &mut Vec<String>,
) -> Option<Extractor> {
    match doc {
        ExtractorDoc::Int { pattern } => Some(Extractor::Int {
            pattern: capture_pattern(name, &pattern, issues)?,
        }),
        ExtractorDoc::Float { pattern } => Some(Extractor::Float {
            pattern: capture_pattern(name, &pattern, issues)?,
        }),
        ExtractorDoc::Money { pattern } => Some(Extractor::Money {
            pattern: capture_pattern(name, &pattern, issues)?,
        }),
        ExtractorDoc::Percentage { pattern } => Some(Extractor::Percentage {
            pattern: capture_pattern(name, &pattern, issues)?,
        }),
        ExtractorDoc::String { pattern } => Some(Extractor::Text {
            pattern: capture_pattern(name, &pattern, issues)?,
        }),
        ExtractorDoc::List { pattern, item_type } => Some(Extractor::List {
            pattern: capture_pattern(name, &pattern, issues)?,
            item_type,
        }),
        ExtractorDoc::Datetime { pattern } => Some(Extractor::DateTime {
            pattern: compile_pattern(name, &pattern, issues)?,
        }),
        ExtractorDoc::Date { pattern, keywords } => {
            let pattern = match pattern {
                Some(p) => Some(compile_pattern(name, &p, issues)?),
                None => None,
            };
            Some(Extractor::Date { pattern, keywords })
        }
        ExtractorDoc::Boolean {
            keywords,
            negation_words,
            check_negation,
        } => Some(Extractor::Boolean {
            keywords,
            negation_words,
            check_negation,
        }),
        ExtractorDoc::Enum { choices, default } => {
            let mut parsed = Vec::with_capacity(choices.len());
            for (label, kws) in &choices {
                match keyword_list(kws) {
                    Some(keywords) => parsed.push(EnumChoice {
                        label: label.clone(),
                        keywords,
                    }),
                    None => issues.push(format!(
                        "extractor `{}`: choice `{}` must map to an array of strings",
                        name, label
                    )),
                }
            }
            Some(Extractor::Enum {
                choices: parsed,
                default,
            })
        }
        ExtractorDoc::Computed { formula } => match Computed::parse(&formula) {
            Ok(formula) => Some(Extractor::Computed { formula }),
            Err(e) => {
                issues.push(format!("extractor `{}`: {}", name, e));
                None
            }
        },
    }
}

fn keyword_list(json: &Json) -> Option<Vec<String>> {
    json.as_array()?
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

/// Compile a pattern case-insensitively.
fn compile_pattern(name: &str, pattern: &str, issues: &mut Vec<String>) -> Option<Regex> {
    match RegexBuilder::new(pattern).case_insensitive(true).build() {
        Ok(re) => Some(re),
        Err(e) => {
            issues.push(format!("extractor `{}`: invalid pattern: {}", name, e));
            None
        }
    }
}

/// Compile a pattern that must contain at least one capture group.
fn capture_pattern(name: &str, pattern: &str, issues: &mut Vec<String>) -> Option<Regex> {
    let re = compile_pattern(name, pattern, issues)?;
    if re.captures_len() < 2 {
        issues.push(format!(
            "extractor `{}`: pattern must contain a capture group",
            name
        ));
        return None;
    }
    Some(re)
}

// ============================================================================
// Computed-extractor ordering
// ============================================================================

/// Order computed extractors so dependencies evaluate first.
///
/// Only edges between computed extractors matter; references to pattern
/// extractors are always satisfied by the time the computed pass runs.
/// Returns the members of a cycle if one exists.
fn order_computed(
    computed: Vec<(String, Extractor)>,
) -> Result<Vec<(String, Extractor)>, Vec<String>> {
    let names: HashSet<&str> = computed.iter().map(|(n, _)| n.as_str()).collect();
    let deps: HashMap<&str, Vec<&str>> = computed
        .iter()
        .map(|(n, e)| {
            let ds = match e {
                Extractor::Computed { formula } => formula
                    .dependencies()
                    .into_iter()
                    .filter(|d| names.contains(d))
                    .collect(),
                _ => Vec::new(),
            };
            (n.as_str(), ds)
        })
        .collect();

    let mut order: Vec<String> = Vec::with_capacity(computed.len());
    let mut state: HashMap<&str, u8> = HashMap::new(); // 0 unvisited, 1 in-progress, 2 done

    fn visit<'a>(
        node: &'a str,
        deps: &HashMap<&'a str, Vec<&'a str>>,
        state: &mut HashMap<&'a str, u8>,
        order: &mut Vec<String>,
    ) -> bool {
        match state.get(node) {
            Some(2) => return true,
            Some(1) => return false,
            _ => {}
        }
        state.insert(node, 1);
        for dep in deps.get(node).into_iter().flatten().copied() {
            if !visit(dep, deps, state, order) {
                return false;
            }
        }
        state.insert(node, 2);
        order.push(node.to_string());
        true
    }

    for (name, _) in &computed {
        if !visit(name.as_str(), &deps, &mut state, &mut order) {
            let cycle: Vec<String> = state
                .iter()
                .filter(|(_, s)| **s == 1)
                .map(|(n, _)| n.to_string())
                .collect();
            return Err(cycle);
        }
    }

    let mut by_name: HashMap<String, Extractor> = computed.into_iter().collect();
    Ok(order
        .into_iter()
        .map(|n| {
            let e = by_name.remove(&n).expect("topo order covers each node once");
            (n, e)
        })
        .collect())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_doc() -> Json {
        json!({
            "name": "test",
            "version": "1.0.0",
            "constraints": [{
                "id": "MAX_VALUE",
                "formula": {"<=": ["value", 100]},
                "variables": [{"name": "value", "type": "real"}],
                "error_message": "too large",
            }],
            "extractors": {
                "value": {"type": "float", "pattern": r"value[:\s]*(\d+(?:\.\d+)?)"},
            },
        })
    }

    #[test]
    fn accepts_minimal_document() {
        let ontology = validate_document(minimal_doc()).unwrap();
        assert_eq!(ontology.name, "test");
        assert_eq!(ontology.constraints.len(), 1);
        assert_eq!(ontology.extractors.len(), 1);
    }

    #[test]
    fn missing_version_is_rejected() {
        let mut doc = minimal_doc();
        doc.as_object_mut().unwrap().remove("version");
        let issues = validate_document(doc).unwrap_err();
        assert!(issues[0].contains("version"), "{:?}", issues);
    }

    #[test]
    fn duplicate_constraint_ids_are_rejected() {
        let mut doc = minimal_doc();
        let c = doc["constraints"][0].clone();
        doc["constraints"].as_array_mut().unwrap().push(c);
        let issues = validate_document(doc).unwrap_err();
        assert!(issues.iter().any(|i| i.contains("duplicate constraint id")));
    }

    #[test]
    fn duplicate_variable_declaration_is_rejected() {
        let mut doc = minimal_doc();
        doc["constraints"][0]["variables"] = json!([
            {"name": "value", "type": "real"},
            {"name": "value", "type": "int"},
        ]);
        let issues = validate_document(doc).unwrap_err();
        assert!(issues.iter().any(|i| i.contains("more than once")));
    }

    #[test]
    fn undeclared_formula_variable_is_rejected() {
        let mut doc = minimal_doc();
        doc["constraints"][0]["variables"] = json!([]);
        let issues = validate_document(doc).unwrap_err();
        assert!(issues.iter().any(|i| i.contains("not declared")));
    }

    #[test]
    fn numeric_root_formula_is_rejected() {
        let mut doc = minimal_doc();
        doc["constraints"][0]["formula"] = json!({"+": ["value", 1]});
        let issues = validate_document(doc).unwrap_err();
        assert!(issues.iter().any(|i| i.contains("must be bool")));
    }

    #[test]
    fn unknown_extractor_kind_is_rejected() {
        let mut doc = minimal_doc();
        doc["extractors"]["value"] = json!({"type": "tf_idf", "pattern": "(x)"});
        let issues = validate_document(doc).unwrap_err();
        assert!(issues.iter().any(|i| i.contains("extractor `value`")));
    }

    #[test]
    fn capture_group_is_required_for_numeric_patterns() {
        let mut doc = minimal_doc();
        doc["extractors"]["value"] = json!({"type": "float", "pattern": r"\d+"});
        let issues = validate_document(doc).unwrap_err();
        assert!(issues.iter().any(|i| i.contains("capture group")));
    }

    #[test]
    fn computed_cycle_is_rejected() {
        let mut doc = minimal_doc();
        doc["extractors"]["a"] = json!({"type": "computed", "formula": {"add": ["b", 1]}});
        doc["extractors"]["b"] = json!({"type": "computed", "formula": {"add": ["a", 1]}});
        let issues = validate_document(doc).unwrap_err();
        assert!(issues.iter().any(|i| i.contains("cycle")));
    }

    #[test]
    fn computed_extractors_are_ordered_after_dependencies() {
        let mut doc = minimal_doc();
        doc["extractors"]["total"] =
            json!({"type": "computed", "formula": {"add": ["base", 1]}});
        doc["extractors"]["base"] =
            json!({"type": "computed", "formula": {"sum": ["value"]}});
        let ontology = validate_document(doc).unwrap();
        let names: Vec<&str> = ontology
            .extractors
            .iter()
            .map(|(n, _)| n.as_str())
            .collect();
        let base = names.iter().position(|n| *n == "base").unwrap();
        let total = names.iter().position(|n| *n == "total").unwrap();
        assert!(base < total);
    }
}
