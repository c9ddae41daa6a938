//! Ontology document model.
//!
//! Two layers live here. The `*Doc` types mirror the on-disk JSON exactly
//! and are what serde sees; [`Ontology`] and friends are the validated
//! in-memory representation the rest of the engine consumes, produced by
//! [`crate::validate`]. Extractor kinds are an explicit sum type, so a
//! document naming an unknown kind is rejected when it is loaded, not when
//! it is first used.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::computed::Computed;
use crate::formula::{Formula, Sort};

// ============================================================================
// Raw documents (exact JSON shape)
// ============================================================================

/// An ontology document as authored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OntologyDoc {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    pub constraints: Vec<ConstraintDoc>,
    /// Extractor specs keyed by output name. Order is meaningful: pattern
    /// extractors run in document order, and `enum` choice tables match
    /// first-label-wins.
    #[serde(default)]
    pub extractors: serde_json::Map<String, Json>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintDoc {
    pub id: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub formula_readable: Option<String>,
    pub formula: Json,
    #[serde(default)]
    pub variables: Vec<VariableDecl>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub citation: Option<String>,
}

/// Declares the sort of one free name inside a constraint's formula.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub sort: Sort,
}

/// The spec of a single extractor, tagged by its `type` field.
///
/// Deserialization fails on an unknown kind, which is exactly the load-time
/// rejection the registry wants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExtractorDoc {
    Int {
        pattern: String,
    },
    Float {
        pattern: String,
    },
    Money {
        pattern: String,
    },
    Percentage {
        pattern: String,
    },
    Boolean {
        #[serde(default)]
        keywords: Vec<String>,
        #[serde(default)]
        negation_words: Vec<String>,
        #[serde(default)]
        check_negation: bool,
    },
    String {
        pattern: String,
    },
    Date {
        #[serde(default)]
        pattern: Option<String>,
        #[serde(default)]
        keywords: Vec<String>,
    },
    Datetime {
        pattern: String,
    },
    List {
        pattern: String,
        item_type: ItemSort,
    },
    Enum {
        choices: serde_json::Map<String, Json>,
        #[serde(default)]
        default: Option<String>,
    },
    Computed {
        formula: Json,
    },
}

/// Element type for `list` extractors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemSort {
    Int,
    Float,
    String,
    Boolean,
}

// ============================================================================
// Validated representation
// ============================================================================

/// A validated, immutable ontology.
///
/// Everything is resolved: formulas are parsed trees, patterns are compiled
/// regexes, computed extractors are ordered so dependencies come first. The
/// verbatim source document is retained for the `get_ontology` surface.
#[derive(Debug, Clone)]
pub struct Ontology {
    pub name: String,
    pub version: String,
    pub description: String,
    pub constraints: Vec<Constraint>,
    /// Extractors in evaluation order: pattern extractors in document
    /// order, then computed extractors in dependency order.
    pub extractors: Vec<(String, Extractor)>,
    /// The document exactly as loaded from disk.
    pub document: Json,
}

impl Ontology {
    pub fn metadata(&self) -> OntologyMetadata {
        OntologyMetadata {
            name: self.name.clone(),
            version: self.version.clone(),
            description: self.description.clone(),
            constraints: self.constraints.len(),
        }
    }
}

/// Summary row returned by the registry's `list` operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OntologyMetadata {
    pub name: String,
    pub version: String,
    pub description: String,
    pub constraints: usize,
}

/// A validated constraint.
#[derive(Debug, Clone)]
pub struct Constraint {
    pub id: String,
    pub category: String,
    pub description: String,
    /// Human-readable rendering; authored if present, otherwise derived
    /// from the parsed formula.
    pub formula_readable: String,
    pub formula: Formula,
    /// The structural (JSON) form, carried into violation records.
    pub formula_json: Json,
    pub variables: Vec<VariableDecl>,
    pub error_message: String,
    pub citation: Option<String>,
}

impl Constraint {
    /// The declaration table used for sort inference and compilation.
    pub fn declarations(&self) -> HashMap<String, Sort> {
        self.variables
            .iter()
            .map(|v| (v.name.clone(), v.sort))
            .collect()
    }
}

/// A validated extractor, ready to run against text.
#[derive(Debug, Clone)]
pub enum Extractor {
    Int {
        pattern: Regex,
    },
    Float {
        pattern: Regex,
    },
    Money {
        pattern: Regex,
    },
    Percentage {
        pattern: Regex,
    },
    Boolean {
        keywords: Vec<String>,
        negation_words: Vec<String>,
        check_negation: bool,
    },
    Text {
        pattern: Regex,
    },
    Date {
        pattern: Option<Regex>,
        keywords: Vec<String>,
    },
    DateTime {
        pattern: Regex,
    },
    List {
        pattern: Regex,
        item_type: ItemSort,
    },
    Enum {
        choices: Vec<EnumChoice>,
        default: Option<String>,
    },
    Computed {
        formula: Computed,
    },
}

impl Extractor {
    pub fn is_computed(&self) -> bool {
        matches!(self, Extractor::Computed { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Extractor::Int { .. } => "int",
            Extractor::Float { .. } => "float",
            Extractor::Money { .. } => "money",
            Extractor::Percentage { .. } => "percentage",
            Extractor::Boolean { .. } => "boolean",
            Extractor::Text { .. } => "string",
            Extractor::Date { .. } => "date",
            Extractor::DateTime { .. } => "datetime",
            Extractor::List { .. } => "list",
            Extractor::Enum { .. } => "enum",
            Extractor::Computed { .. } => "computed",
        }
    }
}

/// One label of an `enum` extractor; the first label whose keyword list
/// matches wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumChoice {
    pub label: String,
    pub keywords: Vec<String>,
}
